use crate::common::error::{PhysicsError, PhysicsResult};
use crate::common::settings::LINEAR_SLOP;
use crate::constraints::{apply_impulse, apply_position_impulse, relative_velocity, JointBodies, LimitState};
use crate::integration::SolverData;
use crate::math::vec2::Vec2;
use crate::objects::BodyHandle;

/// Caps the distance between two anchors without resisting compression.
#[derive(Debug, Clone, PartialEq)]
pub struct RopeJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub max_length: f64,
}

impl RopeJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        RopeJointDef {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::new(-1.0, 0.0),
            local_anchor_b: Vec2::new(1.0, 0.0),
            max_length: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RopeJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    max_length: f64,
    length: f64,
    impulse: f64,
    state: LimitState,

    bodies: JointBodies,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f64,
}

impl RopeJoint {
    pub(crate) fn new(def: &RopeJointDef) -> PhysicsResult<Self> {
        if !def.max_length.is_finite() || def.max_length < 0.0 {
            return Err(PhysicsError::InvalidJoint("rope length must be non-negative"));
        }
        Ok(RopeJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_length: def.max_length,
            length: 0.0,
            impulse: 0.0,
            state: LimitState::Inactive,
            bodies: JointBodies::default(),
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        })
    }

    pub fn max_length(&self) -> f64 {
        self.max_length
    }

    pub fn set_max_length(&mut self, length: f64) {
        self.max_length = length.max(0.0);
    }

    /// `AtUpper` while the rope is taut.
    pub fn limit_state(&self) -> LimitState {
        self.state
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
        self.length = length;
        self.state = if length - self.max_length > 0.0 {
            LimitState::AtUpper
        } else {
            LimitState::Inactive
        };

        if length <= LINEAR_SLOP {
            self.u = Vec2::ZERO;
            self.mass = 0.0;
            self.impulse = 0.0;
            return;
        }
        self.u = u;

        let cr_a = r_a.cross(u);
        let cr_b = r_b.cross(u);
        let inv_mass =
            bodies.inv_mass_a + bodies.inv_i_a * cr_a * cr_a + bodies.inv_mass_b + bodies.inv_i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            apply_impulse(data, &bodies, r_a, r_b, u * self.impulse, 0.0);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let c = self.length - self.max_length;
        let mut cdot = self.u.dot(relative_velocity(data, &self.bodies, self.r_a, self.r_b));

        // Slack rope: only stop the motion that would overshoot this step.
        if c < 0.0 {
            cdot += data.step.inv_dt * c;
        }

        let impulse = -self.mass * cdot;
        let old = self.impulse;
        self.impulse = (self.impulse + impulse).min(0.0);
        let impulse = self.impulse - old;

        apply_impulse(data, &self.bodies, self.r_a, self.r_b, self.u * impulse, 0.0);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let bodies = self.bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);

        let (u, length) = (pb.c + r_b - pa.c - r_a).normalize_with_length();
        let c = (length - self.max_length).clamp(0.0, data.settings.max_linear_correction);
        let impulse = -self.mass * c;
        apply_position_impulse(data, &bodies, r_a, r_b, u * impulse, 0.0);

        length - self.max_length < LINEAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::settings::WorldSettings;
    use crate::integration::{Position, TimeStep, Velocity};
    use slotmap::KeyData;

    const EPSILON: f64 = 1e-9;

    fn def() -> RopeJointDef {
        RopeJointDef {
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_length: 2.0,
            ..RopeJointDef::new(BodyHandle::from(KeyData::from_ffi(1)), BodyHandle::from(KeyData::from_ffi(2)))
        }
    }

    fn bodies() -> JointBodies {
        JointBodies {
            index_a: 0,
            index_b: 1,
            inv_mass_b: 1.0,
            inv_i_b: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_slack_rope_allows_approach() {
        let mut joint = RopeJoint::new(&def()).expect("valid joint");
        let settings = WorldSettings::default();
        let mut positions = [Position::default(), Position { c: Vec2::new(1.0, 0.0), a: 0.0 }];
        let mut velocities = [Velocity::default(), Velocity { v: Vec2::new(-1.0, 0.0), w: 0.0 }];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0, 8, 3),
            settings: &settings,
            positions: &mut positions,
            velocities: &mut velocities,
        };

        joint.init_velocity_constraints(&mut data, bodies());
        joint.solve_velocity_constraints(&mut data);

        assert_eq!(joint.limit_state(), LimitState::Inactive);
        assert!((data.velocities[1].v.x + 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_taut_rope_stops_separation() {
        let mut joint = RopeJoint::new(&def()).expect("valid joint");
        let settings = WorldSettings::default();
        let mut positions = [Position::default(), Position { c: Vec2::new(2.1, 0.0), a: 0.0 }];
        let mut velocities = [Velocity::default(), Velocity { v: Vec2::new(1.0, 0.0), w: 0.0 }];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0, 8, 3),
            settings: &settings,
            positions: &mut positions,
            velocities: &mut velocities,
        };

        joint.init_velocity_constraints(&mut data, bodies());
        joint.solve_velocity_constraints(&mut data);
        assert_eq!(joint.limit_state(), LimitState::AtUpper);
        assert!(data.velocities[1].v.x.abs() < EPSILON);

        let solved = (0..5).any(|_| joint.solve_position_constraints(&mut data));
        assert!(solved);
        assert!(data.positions[1].c.x < 2.0 + LINEAR_SLOP);
    }

    #[test]
    fn test_rejects_negative_length() {
        let bad = RopeJointDef {
            max_length: -1.0,
            ..def()
        };
        assert!(RopeJoint::new(&bad).is_err());
    }
}
