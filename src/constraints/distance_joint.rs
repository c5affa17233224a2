use crate::common::error::{PhysicsError, PhysicsResult};
use crate::common::settings::LINEAR_SLOP;
use crate::constraints::{apply_impulse, apply_position_impulse, relative_velocity, soft_constraint, JointBodies};
use crate::integration::SolverData;
use crate::math::vec2::Vec2;
use crate::objects::BodyHandle;
use crate::world::World;

/// Keeps two anchor points at a fixed distance, optionally as a damped spring.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Rest length. Must be non-negative.
    pub length: f64,
    /// Mass-spring frequency in hertz. Zero makes the joint rigid.
    pub frequency_hz: f64,
    pub damping_ratio: f64,
}

impl DistanceJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        DistanceJointDef {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 1.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    /// Anchors given in world coordinates; the rest length is their current distance.
    pub fn from_world_anchors(
        world: &World,
        body_a: BodyHandle,
        body_b: BodyHandle,
        anchor_a: Vec2,
        anchor_b: Vec2,
    ) -> PhysicsResult<Self> {
        Ok(DistanceJointDef {
            local_anchor_a: world.body(body_a)?.local_point(anchor_a),
            local_anchor_b: world.body(body_b)?.local_point(anchor_b),
            length: anchor_a.distance(anchor_b),
            ..DistanceJointDef::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistanceJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    length: f64,
    frequency_hz: f64,
    damping_ratio: f64,
    impulse: f64,
    gamma: f64,
    bias: f64,
    bodies: JointBodies,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f64,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> PhysicsResult<Self> {
        if !def.length.is_finite() || def.length < 0.0 {
            return Err(PhysicsError::InvalidJoint("distance joint length must be non-negative"));
        }
        if def.frequency_hz < 0.0 || def.damping_ratio < 0.0 {
            return Err(PhysicsError::InvalidJoint("spring frequency and damping must be non-negative"));
        }
        Ok(DistanceJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
            bodies: JointBodies::default(),
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        })
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn set_length(&mut self, length: f64) {
        self.length = length.max(0.0);
    }

    pub fn frequency(&self) -> f64 {
        self.frequency_hz
    }

    pub fn set_frequency(&mut self, hz: f64) {
        self.frequency_hz = hz.max(0.0);
    }

    pub fn damping_ratio(&self) -> f64 {
        self.damping_ratio
    }

    pub fn set_damping_ratio(&mut self, ratio: f64) {
        self.damping_ratio = ratio.max(0.0);
    }

    pub fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        self.u * (inv_dt * self.impulse)
    }

    pub(crate) fn init_velocity_constraints(&mut self, data: &mut SolverData, bodies: JointBodies) {
        self.bodies = bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);
        self.r_a = r_a;
        self.r_b = r_b;

        let (u, length) = (pb.c + r_b - pa.c - r_a).normalize_with_length();
        self.u = if length > LINEAR_SLOP { u } else { Vec2::ZERO };

        let cr_a = r_a.cross(self.u);
        let cr_b = r_b.cross(self.u);
        let mut inv_mass =
            bodies.inv_mass_a + bodies.inv_i_a * cr_a * cr_a + bodies.inv_mass_b + bodies.inv_i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = length - self.length;
            let (gamma, bias_factor) = soft_constraint(self.mass, self.frequency_hz, self.damping_ratio, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;
            inv_mass += gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            apply_impulse(data, &bodies, r_a, r_b, self.u * self.impulse, 0.0);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let cdot = self.u.dot(relative_velocity(data, &self.bodies, self.r_a, self.r_b));
        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;
        apply_impulse(data, &self.bodies, self.r_a, self.r_b, self.u * impulse, 0.0);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        if self.frequency_hz > 0.0 {
            return true;
        }
        let bodies = self.bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);

        let (u, length) = (pb.c + r_b - pa.c - r_a).normalize_with_length();
        let max_correction = data.settings.max_linear_correction;
        let c = (length - self.length).clamp(-max_correction, max_correction);
        let impulse = -self.mass * c;
        apply_position_impulse(data, &bodies, r_a, r_b, u * impulse, 0.0);

        c.abs() < LINEAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::settings::WorldSettings;
    use crate::integration::{Position, TimeStep, Velocity};
    use slotmap::KeyData;

    const EPSILON: f64 = 1e-9;

    fn handles() -> (BodyHandle, BodyHandle) {
        (
            BodyHandle::from(KeyData::from_ffi(1)),
            BodyHandle::from(KeyData::from_ffi(2)),
        )
    }

    fn ground_and_ball() -> JointBodies {
        JointBodies {
            index_a: 0,
            index_b: 1,
            inv_mass_b: 1.0,
            inv_i_b: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_negative_length() {
        let (a, b) = handles();
        let def = DistanceJointDef {
            length: -1.0,
            ..DistanceJointDef::new(a, b)
        };
        assert!(DistanceJoint::new(&def).is_err());
    }

    #[test]
    fn test_rigid_rod_removes_radial_velocity() {
        let (a, b) = handles();
        let def = DistanceJointDef {
            length: 2.0,
            ..DistanceJointDef::new(a, b)
        };
        let mut joint = DistanceJoint::new(&def).expect("valid joint");
        let settings = WorldSettings::default();
        let mut positions = [Position::default(), Position { c: Vec2::new(2.0, 0.0), a: 0.0 }];
        let mut velocities = [Velocity::default(), Velocity { v: Vec2::new(3.0, 1.0), w: 0.0 }];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0, 8, 3),
            settings: &settings,
            positions: &mut positions,
            velocities: &mut velocities,
        };

        joint.init_velocity_constraints(&mut data, ground_and_ball());
        joint.solve_velocity_constraints(&mut data);

        assert!(data.velocities[1].v.x.abs() < EPSILON);
        assert!((data.velocities[1].v.y - 1.0).abs() < EPSILON);
        assert_eq!(data.velocities[0], Velocity::default());
        assert!(joint.reaction_force(60.0).x < 0.0);
    }

    #[test]
    fn test_position_solver_restores_length() {
        let (a, b) = handles();
        let def = DistanceJointDef {
            length: 1.0,
            ..DistanceJointDef::new(a, b)
        };
        let mut joint = DistanceJoint::new(&def).expect("valid joint");
        let settings = WorldSettings::default();
        let mut positions = [Position::default(), Position { c: Vec2::new(1.1, 0.0), a: 0.0 }];
        let mut velocities = [Velocity::default(); 2];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0, 8, 3),
            settings: &settings,
            positions: &mut positions,
            velocities: &mut velocities,
        };
        joint.init_velocity_constraints(&mut data, ground_and_ball());

        let mut solved = false;
        for _ in 0..3 {
            solved = joint.solve_position_constraints(&mut data);
        }
        assert!(solved);
        assert!((data.positions[1].c.x - 1.0).abs() < LINEAR_SLOP);
    }

    #[test]
    fn test_spring_skips_position_correction() {
        let (a, b) = handles();
        let def = DistanceJointDef {
            frequency_hz: 4.0,
            damping_ratio: 0.5,
            ..DistanceJointDef::new(a, b)
        };
        let mut joint = DistanceJoint::new(&def).expect("valid joint");
        let settings = WorldSettings::default();
        let mut positions = [Position::default(), Position { c: Vec2::new(3.0, 0.0), a: 0.0 }];
        let mut velocities = [Velocity::default(); 2];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0, 8, 3),
            settings: &settings,
            positions: &mut positions,
            velocities: &mut velocities,
        };
        joint.init_velocity_constraints(&mut data, ground_and_ball());
        assert!(joint.solve_position_constraints(&mut data));
        joint.solve_velocity_constraints(&mut data);
        // Stretched spring pulls the ball back toward the anchor.
        assert!(data.velocities[1].v.x < 0.0);
    }

    #[test]
    fn test_coincident_anchors_apply_no_impulse() {
        let (a, b) = handles();
        let def = DistanceJointDef {
            length: 0.0,
            ..DistanceJointDef::new(a, b)
        };
        let mut joint = DistanceJoint::new(&def).expect("valid joint");
        let settings = WorldSettings::default();
        let mut positions = [Position::default(), Position::default()];
        let mut velocities = [Velocity::default(), Velocity { v: Vec2::new(1.0, 2.0), w: 0.5 }];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0, 8, 3),
            settings: &settings,
            positions: &mut positions,
            velocities: &mut velocities,
        };

        joint.init_velocity_constraints(&mut data, ground_and_ball());
        joint.solve_velocity_constraints(&mut data);

        assert_eq!(data.velocities[1], Velocity { v: Vec2::new(1.0, 2.0), w: 0.5 });
        assert!(joint.reaction_force(60.0).is_valid());
        assert!(joint.solve_position_constraints(&mut data));
        assert_eq!(data.positions[1], Position::default());
    }
}
