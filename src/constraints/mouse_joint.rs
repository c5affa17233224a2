use crate::common::error::{PhysicsError, PhysicsResult};
use crate::constraints::{soft_constraint, JointBodies};
use crate::integration::SolverData;
use crate::math::matrix::Mat22;
use crate::math::transform::Rot;
use crate::math::vec2::Vec2;
use crate::objects::BodyHandle;
use crate::world::World;

/// Drags a point on body B toward a world target with a soft spring, for
/// interactive picking. Body A is only used as the reference and is usually
/// the ground.
#[derive(Debug, Clone, PartialEq)]
pub struct MouseJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub target: Vec2,
    pub local_anchor_b: Vec2,
    pub max_force: f64,
    pub frequency_hz: f64,
    pub damping_ratio: f64,
}

impl MouseJointDef {
    /// Grabs `body` at the world point `target`.
    pub fn new(world: &World, ground: BodyHandle, body: BodyHandle, target: Vec2) -> PhysicsResult<Self> {
        Ok(MouseJointDef {
            body_a: ground,
            body_b: body,
            collide_connected: false,
            user_data: 0,
            target,
            local_anchor_b: world.body(body)?.local_point(target),
            max_force: 0.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MouseJoint {
    pub(crate) target: Vec2,
    pub(crate) local_anchor_b: Vec2,
    max_force: f64,
    frequency_hz: f64,
    damping_ratio: f64,
    impulse: Vec2,
    gamma: f64,
    bodies: JointBodies,
    r_b: Vec2,
    mass: Mat22,
    c: Vec2,
}

impl MouseJoint {
    pub(crate) fn new(def: &MouseJointDef) -> PhysicsResult<Self> {
        if !def.target.is_valid() {
            return Err(PhysicsError::InvalidJoint("mouse joint target must be finite"));
        }
        if !(def.max_force >= 0.0 && def.frequency_hz >= 0.0 && def.damping_ratio >= 0.0) {
            return Err(PhysicsError::InvalidJoint("mouse joint force and spring must be non-negative"));
        }
        Ok(MouseJoint {
            target: def.target,
            local_anchor_b: def.local_anchor_b,
            max_force: def.max_force,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: Vec2::ZERO,
            gamma: 0.0,
            bodies: JointBodies::default(),
            r_b: Vec2::ZERO,
            mass: Mat22::default(),
            c: Vec2::ZERO,
        })
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    /// Moves the target. The dragged body must be woken separately if asleep.
    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    pub fn max_force(&self) -> f64 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: f64) {
        self.max_force = force.max(0.0);
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
        self.impulse * inv_dt
    }

    pub(crate) fn init_velocity_constraints(&mut self, data: &mut SolverData, bodies: JointBodies, mass_b: f64) {
        self.bodies = bodies;
        let pb = data.positions[bodies.index_b];

        let h = data.step.dt;
        let (gamma, beta) = soft_constraint(mass_b, self.frequency_hz, self.damping_ratio, h);
        self.gamma = gamma;

        let r_b = Rot::new(pb.a).apply(self.local_anchor_b - bodies.local_center_b);
        self.r_b = r_b;

        let (m_b, i_b) = (bodies.inv_mass_b, bodies.inv_i_b);
        let k = Mat22::new(
            Vec2::new(m_b + i_b * r_b.y * r_b.y + gamma, -i_b * r_b.x * r_b.y),
            Vec2::new(-i_b * r_b.x * r_b.y, m_b + i_b * r_b.x * r_b.x + gamma),
        );
        self.mass = k.inverse();

        self.c = (pb.c + r_b - self.target) * beta;

        let vb = &mut data.velocities[bodies.index_b];
        // Light rotational damping on the dragged body.
        vb.w *= 0.98;

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            vb.v += self.impulse * m_b;
            vb.w += i_b * r_b.cross(self.impulse);
        } else {
            self.impulse = Vec2::ZERO;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let bodies = self.bodies;
        let vb = &mut data.velocities[bodies.index_b];

        let cdot = vb.v + Vec2::scalar_cross(vb.w, self.r_b);
        let impulse = self.mass.mul_vec(-(cdot + self.c + self.impulse * self.gamma));

        let old = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        if self.impulse.magnitude_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.magnitude();
        }
        let impulse = self.impulse - old;

        vb.v += impulse * bodies.inv_mass_b;
        vb.w += bodies.inv_i_b * self.r_b.cross(impulse);
    }
}
