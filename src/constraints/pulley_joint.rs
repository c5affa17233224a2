use crate::common::error::{PhysicsError, PhysicsResult};
use crate::common::settings::LINEAR_SLOP;
use crate::constraints::JointBodies;
use crate::integration::SolverData;
use crate::math::vec2::Vec2;
use crate::objects::{Body, BodyHandle};
use crate::world::World;

/// Connects two bodies over two fixed ground points so that
/// `length_a + ratio * length_b` stays constant.
#[derive(Debug, Clone, PartialEq)]
pub struct PulleyJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub ground_anchor_a: Vec2,
    pub ground_anchor_b: Vec2,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub length_a: f64,
    pub length_b: f64,
    /// Block-and-tackle ratio. Must be positive.
    pub ratio: f64,
}

impl PulleyJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        PulleyJointDef {
            body_a,
            body_b,
            collide_connected: true,
            user_data: 0,
            ground_anchor_a: Vec2::new(-1.0, 1.0),
            ground_anchor_b: Vec2::new(1.0, 1.0),
            local_anchor_a: Vec2::new(-1.0, 0.0),
            local_anchor_b: Vec2::new(1.0, 0.0),
            length_a: 0.0,
            length_b: 0.0,
            ratio: 1.0,
        }
    }

    /// Builds the pulley from world ground anchors and world body anchors.
    #[allow(clippy::too_many_arguments)]
    pub fn from_world_anchors(
        world: &World,
        body_a: BodyHandle,
        body_b: BodyHandle,
        ground_anchor_a: Vec2,
        ground_anchor_b: Vec2,
        anchor_a: Vec2,
        anchor_b: Vec2,
        ratio: f64,
    ) -> PhysicsResult<Self> {
        Ok(PulleyJointDef {
            ground_anchor_a,
            ground_anchor_b,
            local_anchor_a: world.body(body_a)?.local_point(anchor_a),
            local_anchor_b: world.body(body_b)?.local_point(anchor_b),
            length_a: anchor_a.distance(ground_anchor_a),
            length_b: anchor_b.distance(ground_anchor_b),
            ratio,
            ..PulleyJointDef::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PulleyJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    ground_anchor_a: Vec2,
    ground_anchor_b: Vec2,
    length_a: f64,
    length_b: f64,
    ratio: f64,
    constant: f64,
    impulse: f64,

    bodies: JointBodies,
    u_a: Vec2,
    u_b: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f64,
}

/// Unit rope direction, zeroed while the rope is too short to define one.
fn rope_direction(u: Vec2) -> (Vec2, f64) {
    let length = u.magnitude();
    if length > 10.0 * LINEAR_SLOP {
        (u * (1.0 / length), length)
    } else {
        (Vec2::ZERO, length)
    }
}

impl PulleyJoint {
    pub(crate) fn new(def: &PulleyJointDef) -> PhysicsResult<Self> {
        if !(def.ratio > f64::EPSILON) {
            return Err(PhysicsError::InvalidJoint("pulley ratio must be positive"));
        }
        Ok(PulleyJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            ground_anchor_a: def.ground_anchor_a,
            ground_anchor_b: def.ground_anchor_b,
            length_a: def.length_a,
            length_b: def.length_b,
            ratio: def.ratio,
            constant: def.length_a + def.ratio * def.length_b,
            impulse: 0.0,
            bodies: JointBodies::default(),
            u_a: Vec2::ZERO,
            u_b: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        })
    }

    pub fn ground_anchor_a(&self) -> Vec2 {
        self.ground_anchor_a
    }

    pub fn ground_anchor_b(&self) -> Vec2 {
        self.ground_anchor_b
    }

    /// Rest lengths of both segments.
    pub fn lengths(&self) -> (f64, f64) {
        (self.length_a, self.length_b)
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Current length of the segment on body A's side.
    pub fn current_length_a(&self, body_a: &Body) -> f64 {
        body_a.world_point(self.local_anchor_a).distance(self.ground_anchor_a)
    }

    pub fn current_length_b(&self, body_b: &Body) -> f64 {
        body_b.world_point(self.local_anchor_b).distance(self.ground_anchor_b)
    }

    pub fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        self.u_b * (inv_dt * self.impulse)
    }

    /// Pulley impulses pull both bodies toward their ground anchors.
    fn apply(&self, data: &mut SolverData, impulse: f64) {
        let bodies = &self.bodies;
        let p_a = self.u_a * -impulse;
        let p_b = self.u_b * (-self.ratio * impulse);
        let va = &mut data.velocities[bodies.index_a];
        va.v += p_a * bodies.inv_mass_a;
        va.w += bodies.inv_i_a * self.r_a.cross(p_a);
        let vb = &mut data.velocities[bodies.index_b];
        vb.v += p_b * bodies.inv_mass_b;
        vb.w += bodies.inv_i_b * self.r_b.cross(p_b);
    }

    fn effective_mass(&self, bodies: &JointBodies, r_a: Vec2, r_b: Vec2, u_a: Vec2, u_b: Vec2) -> f64 {
        let ru_a = r_a.cross(u_a);
        let ru_b = r_b.cross(u_b);
        let m_a = bodies.inv_mass_a + bodies.inv_i_a * ru_a * ru_a;
        let m_b = bodies.inv_mass_b + bodies.inv_i_b * ru_b * ru_b;
        let mass = m_a + self.ratio * self.ratio * m_b;
        if mass > 0.0 {
            1.0 / mass
        } else {
            mass
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, data: &mut SolverData, bodies: JointBodies) {
        self.bodies = bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);
        self.r_a = r_a;
        self.r_b = r_b;

        self.u_a = rope_direction(pa.c + r_a - self.ground_anchor_a).0;
        self.u_b = rope_direction(pb.c + r_b - self.ground_anchor_b).0;
        self.mass = self.effective_mass(&bodies, r_a, r_b, self.u_a, self.u_b);

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.apply(data, self.impulse);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let va = data.velocities[self.bodies.index_a];
        let vb = data.velocities[self.bodies.index_b];
        let vp_a = va.v + Vec2::scalar_cross(va.w, self.r_a);
        let vp_b = vb.v + Vec2::scalar_cross(vb.w, self.r_b);

        let cdot = -self.u_a.dot(vp_a) - self.ratio * self.u_b.dot(vp_b);
        let impulse = -self.mass * cdot;
        self.impulse += impulse;
        self.apply(data, impulse);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let bodies = self.bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);

        let (u_a, length_a) = rope_direction(pa.c + r_a - self.ground_anchor_a);
        let (u_b, length_b) = rope_direction(pb.c + r_b - self.ground_anchor_b);
        let mass = self.effective_mass(&bodies, r_a, r_b, u_a, u_b);

        let c = self.constant - length_a - self.ratio * length_b;
        let impulse = -mass * c;

        let p_a = u_a * -impulse;
        let p_b = u_b * (-self.ratio * impulse);
        let pa = &mut data.positions[bodies.index_a];
        pa.c += p_a * bodies.inv_mass_a;
        pa.a += bodies.inv_i_a * r_a.cross(p_a);
        let pb = &mut data.positions[bodies.index_b];
        pb.c += p_b * bodies.inv_mass_b;
        pb.a += bodies.inv_i_b * r_b.cross(p_b);

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

    fn balanced_pulley() -> PulleyJointDef {
        PulleyJointDef {
            ground_anchor_a: Vec2::new(-1.0, 2.0),
            ground_anchor_b: Vec2::new(1.0, 2.0),
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length_a: 2.0,
            length_b: 2.0,
            ..PulleyJointDef::new(BodyHandle::from(KeyData::from_ffi(1)), BodyHandle::from(KeyData::from_ffi(2)))
        }
    }

    #[test]
    fn test_rejects_zero_ratio() {
        let def = PulleyJointDef {
            ratio: 0.0,
            ..balanced_pulley()
        };
        assert!(PulleyJoint::new(&def).is_err());
    }

    #[test]
    fn test_falling_side_lifts_other_side() {
        let mut joint = PulleyJoint::new(&balanced_pulley()).expect("valid joint");
        let settings = WorldSettings::default();
        let mut positions = [
            Position { c: Vec2::new(-1.0, 0.0), a: 0.0 },
            Position { c: Vec2::new(1.0, 0.0), a: 0.0 },
        ];
        let mut velocities = [Velocity { v: Vec2::new(0.0, -1.0), w: 0.0 }, Velocity::default()];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0, 8, 3),
            settings: &settings,
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let bodies = JointBodies {
            index_a: 0,
            index_b: 1,
            inv_mass_a: 1.0,
            inv_mass_b: 1.0,
            ..Default::default()
        };

        joint.init_velocity_constraints(&mut data, bodies);
        joint.solve_velocity_constraints(&mut data);

        // Equal masses split the momentum: A slows to -0.5, B rises at 0.5.
        assert!((data.velocities[0].v.y + 0.5).abs() < EPSILON);
        assert!((data.velocities[1].v.y - 0.5).abs() < EPSILON);
        assert!(joint.solve_position_constraints(&mut data));
    }
}
