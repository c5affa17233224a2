//! Joints: constraints between two bodies, solved alongside contacts.
//!
//! Every joint is one [`Joint`] carrying the shared bookkeeping and a
//! [`JointKind`] with the type-specific parameters and accumulated impulses.
//! The solver dispatches on the kind with a `match`.

pub mod distance_joint;
pub mod friction_joint;
pub mod mouse_joint;
pub mod prismatic_joint;
pub mod pulley_joint;
pub mod revolute_joint;
pub mod rope_joint;
pub mod weld_joint;

pub use distance_joint::{DistanceJoint, DistanceJointDef};
pub use friction_joint::{FrictionJoint, FrictionJointDef};
pub use mouse_joint::{MouseJoint, MouseJointDef};
pub use prismatic_joint::{PrismaticJoint, PrismaticJointDef};
pub use pulley_joint::{PulleyJoint, PulleyJointDef};
pub use revolute_joint::{RevoluteJoint, RevoluteJointDef};
pub use rope_joint::{RopeJoint, RopeJointDef};
pub use weld_joint::{WeldJoint, WeldJointDef};

use crate::common::error::{PhysicsError, PhysicsResult};
use crate::integration::{Position, SolverData};
use crate::math::transform::Rot;
use crate::math::vec2::Vec2;
use crate::objects::{Body, BodyHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointType {
    Distance,
    Friction,
    Mouse,
    Prismatic,
    Pulley,
    Revolute,
    Rope,
    Weld,
}

/// State of a translation or angle limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    Equal,
}

/// Solver copy of the two bodies' mass properties, cached at the start of a step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct JointBodies {
    pub index_a: usize,
    pub index_b: usize,
    pub local_center_a: Vec2,
    pub local_center_b: Vec2,
    pub inv_mass_a: f64,
    pub inv_mass_b: f64,
    pub inv_i_a: f64,
    pub inv_i_b: f64,
}

impl JointBodies {
    pub fn new(body_a: &Body, body_b: &Body) -> Self {
        JointBodies {
            index_a: body_a.island_index,
            index_b: body_b.island_index,
            local_center_a: body_a.sweep.local_center,
            local_center_b: body_b.sweep.local_center,
            inv_mass_a: body_a.inv_mass,
            inv_mass_b: body_b.inv_mass,
            inv_i_a: body_a.inv_inertia,
            inv_i_b: body_b.inv_inertia,
        }
    }

    /// Lever arms of the two anchors at the given solver positions.
    pub fn lever_arms(&self, local_anchor_a: Vec2, local_anchor_b: Vec2, pa: &Position, pb: &Position) -> (Vec2, Vec2) {
        let r_a = Rot::new(pa.a).apply(local_anchor_a - self.local_center_a);
        let r_b = Rot::new(pb.a).apply(local_anchor_b - self.local_center_b);
        (r_a, r_b)
    }
}

/// Converts a stiffness given as frequency and damping ratio into the soft
/// constraint coefficients `(gamma, bias_factor)` for effective mass `mass`.
pub(crate) fn soft_constraint(mass: f64, frequency_hz: f64, damping_ratio: f64, h: f64) -> (f64, f64) {
    let omega = 2.0 * std::f64::consts::PI * frequency_hz;
    let d = 2.0 * mass * damping_ratio * omega;
    let k = mass * omega * omega;
    let gamma = h * (d + h * k);
    let gamma = if gamma != 0.0 { 1.0 / gamma } else { 0.0 };
    (gamma, h * k * gamma)
}

/// Description of any supported joint. Build one from the per-type definition
/// with `.into()`.
#[derive(Debug, Clone, PartialEq)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Friction(FrictionJointDef),
    Mouse(MouseJointDef),
    Prismatic(PrismaticJointDef),
    Pulley(PulleyJointDef),
    Revolute(RevoluteJointDef),
    Rope(RopeJointDef),
    Weld(WeldJointDef),
}

macro_rules! joint_def_from {
    ($($variant:ident => $def:ty),* $(,)?) => {
        $(
            impl From<$def> for JointDef {
                fn from(def: $def) -> Self {
                    JointDef::$variant(def)
                }
            }
        )*
    };
}

joint_def_from! {
    Distance => DistanceJointDef,
    Friction => FrictionJointDef,
    Mouse => MouseJointDef,
    Prismatic => PrismaticJointDef,
    Pulley => PulleyJointDef,
    Revolute => RevoluteJointDef,
    Rope => RopeJointDef,
    Weld => WeldJointDef,
}

impl JointDef {
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        match self {
            JointDef::Distance(d) => (d.body_a, d.body_b),
            JointDef::Friction(d) => (d.body_a, d.body_b),
            JointDef::Mouse(d) => (d.body_a, d.body_b),
            JointDef::Prismatic(d) => (d.body_a, d.body_b),
            JointDef::Pulley(d) => (d.body_a, d.body_b),
            JointDef::Revolute(d) => (d.body_a, d.body_b),
            JointDef::Rope(d) => (d.body_a, d.body_b),
            JointDef::Weld(d) => (d.body_a, d.body_b),
        }
    }

    pub fn collide_connected(&self) -> bool {
        match self {
            JointDef::Distance(d) => d.collide_connected,
            JointDef::Friction(d) => d.collide_connected,
            JointDef::Mouse(d) => d.collide_connected,
            JointDef::Prismatic(d) => d.collide_connected,
            JointDef::Pulley(d) => d.collide_connected,
            JointDef::Revolute(d) => d.collide_connected,
            JointDef::Rope(d) => d.collide_connected,
            JointDef::Weld(d) => d.collide_connected,
        }
    }

    fn user_data(&self) -> u64 {
        match self {
            JointDef::Distance(d) => d.user_data,
            JointDef::Friction(d) => d.user_data,
            JointDef::Mouse(d) => d.user_data,
            JointDef::Prismatic(d) => d.user_data,
            JointDef::Pulley(d) => d.user_data,
            JointDef::Revolute(d) => d.user_data,
            JointDef::Rope(d) => d.user_data,
            JointDef::Weld(d) => d.user_data,
        }
    }
}

/// Type-specific joint state.
#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    Distance(DistanceJoint),
    Friction(FrictionJoint),
    Mouse(MouseJoint),
    Prismatic(PrismaticJoint),
    Pulley(PulleyJoint),
    Revolute(RevoluteJoint),
    Rope(RopeJoint),
    Weld(WeldJoint),
}

/// A constraint between two bodies owned by a [`World`](crate::world::World).
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) collide_connected: bool,
    pub(crate) island: bool,
    pub(crate) kind: JointKind,
    pub user_data: u64,
}

impl Joint {
    pub(crate) fn new(def: JointDef) -> PhysicsResult<Self> {
        let (body_a, body_b) = def.bodies();
        if body_a == body_b {
            return Err(PhysicsError::InvalidJoint("a joint must connect two different bodies"));
        }
        let collide_connected = def.collide_connected();
        let user_data = def.user_data();

        let kind = match def {
            JointDef::Distance(d) => JointKind::Distance(DistanceJoint::new(&d)?),
            JointDef::Friction(d) => JointKind::Friction(FrictionJoint::new(&d)?),
            JointDef::Mouse(d) => JointKind::Mouse(MouseJoint::new(&d)?),
            JointDef::Prismatic(d) => JointKind::Prismatic(PrismaticJoint::new(&d)?),
            JointDef::Pulley(d) => JointKind::Pulley(PulleyJoint::new(&d)?),
            JointDef::Revolute(d) => JointKind::Revolute(RevoluteJoint::new(&d)?),
            JointDef::Rope(d) => JointKind::Rope(RopeJoint::new(&d)?),
            JointDef::Weld(d) => JointKind::Weld(WeldJoint::new(&d)?),
        };

        Ok(Joint {
            body_a,
            body_b,
            collide_connected,
            island: false,
            kind,
            user_data,
        })
    }

    pub fn joint_type(&self) -> JointType {
        match self.kind {
            JointKind::Distance(_) => JointType::Distance,
            JointKind::Friction(_) => JointType::Friction,
            JointKind::Mouse(_) => JointType::Mouse,
            JointKind::Prismatic(_) => JointType::Prismatic,
            JointKind::Pulley(_) => JointType::Pulley,
            JointKind::Revolute(_) => JointType::Revolute,
            JointKind::Rope(_) => JointType::Rope,
            JointKind::Weld(_) => JointType::Weld,
        }
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Mutable access to motor, limit and target parameters. Changing them does
    /// not wake the bodies.
    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// World anchor on body A. For a mouse joint this is the target point.
    pub fn anchor_a(&self, body_a: &Body) -> Vec2 {
        match &self.kind {
            JointKind::Distance(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Friction(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Mouse(j) => j.target,
            JointKind::Prismatic(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Pulley(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Revolute(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Rope(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Weld(j) => body_a.world_point(j.local_anchor_a),
        }
    }

    /// World anchor on body B.
    pub fn anchor_b(&self, body_b: &Body) -> Vec2 {
        let local = match &self.kind {
            JointKind::Distance(j) => j.local_anchor_b,
            JointKind::Friction(j) => j.local_anchor_b,
            JointKind::Mouse(j) => j.local_anchor_b,
            JointKind::Prismatic(j) => j.local_anchor_b,
            JointKind::Pulley(j) => j.local_anchor_b,
            JointKind::Revolute(j) => j.local_anchor_b,
            JointKind::Rope(j) => j.local_anchor_b,
            JointKind::Weld(j) => j.local_anchor_b,
        };
        body_b.world_point(local)
    }

    /// Reaction force on body B at the joint anchor, in newtons.
    pub fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        match &self.kind {
            JointKind::Distance(j) => j.reaction_force(inv_dt),
            JointKind::Friction(j) => j.reaction_force(inv_dt),
            JointKind::Mouse(j) => j.reaction_force(inv_dt),
            JointKind::Prismatic(j) => j.reaction_force(inv_dt),
            JointKind::Pulley(j) => j.reaction_force(inv_dt),
            JointKind::Revolute(j) => j.reaction_force(inv_dt),
            JointKind::Rope(j) => j.reaction_force(inv_dt),
            JointKind::Weld(j) => j.reaction_force(inv_dt),
        }
    }

    /// Reaction torque on body B, in newton-meters.
    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        match &self.kind {
            JointKind::Distance(_) | JointKind::Mouse(_) | JointKind::Pulley(_) | JointKind::Rope(_) => 0.0,
            JointKind::Friction(j) => j.reaction_torque(inv_dt),
            JointKind::Prismatic(j) => j.reaction_torque(inv_dt),
            JointKind::Revolute(j) => j.reaction_torque(inv_dt),
            JointKind::Weld(j) => j.reaction_torque(inv_dt),
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, data: &mut SolverData, body_a: &Body, body_b: &Body) {
        let bodies = JointBodies::new(body_a, body_b);
        match &mut self.kind {
            JointKind::Distance(j) => j.init_velocity_constraints(data, bodies),
            JointKind::Friction(j) => j.init_velocity_constraints(data, bodies),
            JointKind::Mouse(j) => j.init_velocity_constraints(data, bodies, body_b.mass),
            JointKind::Prismatic(j) => j.init_velocity_constraints(data, bodies),
            JointKind::Pulley(j) => j.init_velocity_constraints(data, bodies),
            JointKind::Revolute(j) => j.init_velocity_constraints(data, bodies),
            JointKind::Rope(j) => j.init_velocity_constraints(data, bodies),
            JointKind::Weld(j) => j.init_velocity_constraints(data, bodies),
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        match &mut self.kind {
            JointKind::Distance(j) => j.solve_velocity_constraints(data),
            JointKind::Friction(j) => j.solve_velocity_constraints(data),
            JointKind::Mouse(j) => j.solve_velocity_constraints(data),
            JointKind::Prismatic(j) => j.solve_velocity_constraints(data),
            JointKind::Pulley(j) => j.solve_velocity_constraints(data),
            JointKind::Revolute(j) => j.solve_velocity_constraints(data),
            JointKind::Rope(j) => j.solve_velocity_constraints(data),
            JointKind::Weld(j) => j.solve_velocity_constraints(data),
        }
    }

    /// Returns true when the joint's position error is within tolerance.
    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        match &mut self.kind {
            JointKind::Distance(j) => j.solve_position_constraints(data),
            JointKind::Friction(_) | JointKind::Mouse(_) => true,
            JointKind::Prismatic(j) => j.solve_position_constraints(data),
            JointKind::Pulley(j) => j.solve_position_constraints(data),
            JointKind::Revolute(j) => j.solve_position_constraints(data),
            JointKind::Rope(j) => j.solve_position_constraints(data),
            JointKind::Weld(j) => j.solve_position_constraints(data),
        }
    }
}

/// Applies an impulse `p` (plus an angular impulse) at the lever arms of both bodies.
pub(crate) fn apply_impulse(data: &mut SolverData, bodies: &JointBodies, r_a: Vec2, r_b: Vec2, p: Vec2, angular: f64) {
    let va = &mut data.velocities[bodies.index_a];
    va.v -= p * bodies.inv_mass_a;
    va.w -= bodies.inv_i_a * (r_a.cross(p) + angular);
    let vb = &mut data.velocities[bodies.index_b];
    vb.v += p * bodies.inv_mass_b;
    vb.w += bodies.inv_i_b * (r_b.cross(p) + angular);
}

/// Position counterpart of [`apply_impulse`].
pub(crate) fn apply_position_impulse(
    data: &mut SolverData,
    bodies: &JointBodies,
    r_a: Vec2,
    r_b: Vec2,
    p: Vec2,
    angular: f64,
) {
    let pa = &mut data.positions[bodies.index_a];
    pa.c -= p * bodies.inv_mass_a;
    pa.a -= bodies.inv_i_a * (r_a.cross(p) + angular);
    let pb = &mut data.positions[bodies.index_b];
    pb.c += p * bodies.inv_mass_b;
    pb.a += bodies.inv_i_b * (r_b.cross(p) + angular);
}

/// Relative velocity of the anchor on B with respect to the anchor on A.
pub(crate) fn relative_velocity(data: &SolverData, bodies: &JointBodies, r_a: Vec2, r_b: Vec2) -> Vec2 {
    let va = data.velocities[bodies.index_a];
    let vb = data.velocities[bodies.index_b];
    vb.v + Vec2::scalar_cross(vb.w, r_b) - va.v - Vec2::scalar_cross(va.w, r_a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn handles() -> (BodyHandle, BodyHandle) {
        (
            BodyHandle::from(KeyData::from_ffi(1)),
            BodyHandle::from(KeyData::from_ffi(2)),
        )
    }

    #[test]
    fn test_joint_rejects_same_body() {
        let (a, _) = handles();
        let def = RopeJointDef {
            max_length: 1.0,
            ..RopeJointDef::new(a, a)
        };
        assert!(matches!(
            Joint::new(def.into()),
            Err(PhysicsError::InvalidJoint(_))
        ));
    }

    #[test]
    fn test_joint_def_conversion_keeps_bodies() {
        let (a, b) = handles();
        let mut def = RevoluteJointDef::new(a, b);
        def.collide_connected = true;
        let joint_def: JointDef = def.into();
        assert_eq!(joint_def.bodies(), (a, b));
        assert!(joint_def.collide_connected());
        let joint = Joint::new(joint_def).expect("valid joint");
        assert_eq!(joint.joint_type(), JointType::Revolute);
    }

    #[test]
    fn test_soft_constraint_zero_frequency_is_rigid() {
        let (gamma, bias) = soft_constraint(1.0, 0.0, 0.5, 1.0 / 60.0);
        assert_eq!(gamma, 0.0);
        assert_eq!(bias, 0.0);
    }
}
