use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::common::error::{PhysicsError, PhysicsResult};
use crate::math::sweep::Sweep;
use crate::math::transform::{Rot, Transform};
use crate::math::vec2::Vec2;
use crate::objects::{BodyHandle, ContactHandle, Fixture, FixtureHandle, JointHandle};
use crate::shapes::MassData;

/// How a body takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// Zero mass, zero velocity, moved only by the user.
    #[default]
    Static,
    /// Zero mass, velocity set by the user, moved by the solver.
    Kinematic,
    /// Positive mass, velocity determined by forces, moved by the solver.
    Dynamic,
}

/// Everything needed to construct a body. Bodies are created through
/// [`World::create_body`](crate::world::World::create_body).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// World position of the body origin.
    pub position: Vec2,
    /// World angle in radians.
    pub angle: f64,
    /// Linear velocity of the body origin in world coordinates.
    pub linear_velocity: Vec2,
    pub angular_velocity: f64,
    pub linear_damping: f64,
    pub angular_damping: f64,
    /// Set false if this body should never fall asleep.
    pub allow_sleep: bool,
    pub awake: bool,
    /// Prevents rotation, useful for characters.
    pub fixed_rotation: bool,
    /// Fast moving body that must not tunnel through other dynamic bodies.
    pub bullet: bool,
    pub active: bool,
    pub gravity_scale: f64,
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        BodyDef {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            active: true,
            gravity_scale: 1.0,
            user_data: 0,
        }
    }
}

impl BodyDef {
    pub fn dynamic(position: Vec2) -> Self {
        BodyDef {
            body_type: BodyType::Dynamic,
            position,
            ..Default::default()
        }
    }

    pub fn kinematic(position: Vec2) -> Self {
        BodyDef {
            body_type: BodyType::Kinematic,
            position,
            ..Default::default()
        }
    }

    pub fn static_body(position: Vec2) -> Self {
        BodyDef {
            position,
            ..Default::default()
        }
    }

    /// Rejects non-finite kinematic state and negative damping.
    pub fn validate(&self) -> PhysicsResult<()> {
        if !(self.position.is_valid() && self.angle.is_finite()) {
            return Err(PhysicsError::Precondition("body position and angle must be finite"));
        }
        if !(self.linear_velocity.is_valid() && self.angular_velocity.is_finite()) {
            return Err(PhysicsError::Precondition("body velocity must be finite"));
        }
        let damping_valid = |d: f64| d.is_finite() && d >= 0.0;
        if !(damping_valid(self.linear_damping) && damping_valid(self.angular_damping)) {
            return Err(PhysicsError::Precondition("body damping must be finite and non-negative"));
        }
        if !self.gravity_scale.is_finite() {
            return Err(PhysicsError::Precondition("gravity scale must be finite"));
        }
        Ok(())
    }
}

/// Link from a body to a joint and the body on its other end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointEdge {
    pub joint: JointHandle,
    pub other: BodyHandle,
    pub collide_connected: bool,
}

/// Link from a body to a contact and the body on its other end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEdge {
    pub contact: ContactHandle,
    pub other: BodyHandle,
}

/// A rigid body. Bodies carry fixtures and are moved by the world.
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) body_type: BodyType,

    pub(crate) island: bool,
    pub(crate) awake: bool,
    pub(crate) auto_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) active: bool,

    pub(crate) island_index: usize,

    /// Body origin transform.
    pub(crate) xf: Transform,
    /// Swept motion of the center of mass, for continuous collision.
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f64,

    // Accumulators for forces/torques applied during a time step
    pub(crate) force: Vec2,
    pub(crate) torque: f64,

    pub(crate) fixtures: Vec<FixtureHandle>,
    pub(crate) joint_edges: Vec<JointEdge>,
    pub(crate) contact_edges: Vec<ContactEdge>,

    pub(crate) mass: f64,
    pub(crate) inv_mass: f64,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f64,
    pub(crate) inv_inertia: f64,

    pub(crate) linear_damping: f64,
    pub(crate) angular_damping: f64,
    pub(crate) gravity_scale: f64,

    pub(crate) sleep_time: f64,

    pub user_data: u64,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: xf.position,
            c: xf.position,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = if def.body_type == BodyType::Dynamic {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        };
        let (linear_velocity, angular_velocity) = if def.body_type == BodyType::Static {
            (Vec2::ZERO, 0.0)
        } else {
            (def.linear_velocity, def.angular_velocity)
        };

        Body {
            body_type: def.body_type,
            island: false,
            awake: def.awake,
            auto_sleep: def.allow_sleep,
            bullet: def.bullet,
            fixed_rotation: def.fixed_rotation,
            active: def.active,
            island_index: 0,
            xf,
            sweep,
            linear_velocity,
            angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            fixtures: Vec::new(),
            joint_edges: Vec::new(),
            contact_edges: Vec::new(),
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            user_data: def.user_data,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// World transform of the body origin.
    pub fn transform(&self) -> Transform {
        self.xf
    }

    /// World position of the body origin.
    pub fn position(&self) -> Vec2 {
        self.xf.position
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f64 {
        self.sweep.a
    }

    /// World position of the center of mass.
    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    /// Center of mass relative to the body origin.
    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    /// Linear velocity of the center of mass.
    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity
    }

    pub fn force(&self) -> Vec2 {
        self.force
    }

    pub fn torque(&self) -> f64 {
        self.torque
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> f64 {
        self.inertia + self.mass * self.sweep.local_center.magnitude_squared()
    }

    pub fn inv_inertia(&self) -> f64 {
        self.inv_inertia
    }

    pub fn linear_damping(&self) -> f64 {
        self.linear_damping
    }

    pub fn angular_damping(&self) -> f64 {
        self.angular_damping
    }

    pub fn gravity_scale(&self) -> f64 {
        self.gravity_scale
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.auto_sleep
    }

    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.joint_edges
    }

    pub fn contact_edges(&self) -> &[ContactEdge] {
        &self.contact_edges
    }

    /// Converts a body-local point to world coordinates.
    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.xf.apply(local_point)
    }

    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.xf.rotation.apply(local_vector)
    }

    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.xf.apply_inverse(world_point)
    }

    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.xf.rotation.apply_inverse(world_vector)
    }

    /// Velocity of a world point attached to this body.
    pub fn linear_velocity_at_world_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + Vec2::scalar_cross(self.angular_velocity, world_point - self.sweep.c)
    }

    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.magnitude_squared() > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    pub fn set_angular_velocity(&mut self, w: f64) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Applies a force at a world point. Off-center forces also produce torque.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.force += force;
        self.torque += (point - self.sweep.c).cross(force);
    }

    /// Applies a force at the center of mass.
    pub fn apply_force_to_center(&mut self, force: Vec2, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f64, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.torque += torque;
    }

    /// Applies an impulse at a world point, changing velocity immediately.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * (point - self.sweep.c).cross(impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f64, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.angular_velocity += self.inv_inertia * impulse;
    }

    /// Forces and impulses only act on awake dynamic bodies.
    fn accepts_input(&mut self, wake: bool) -> bool {
        if self.body_type != BodyType::Dynamic {
            return false;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        self.awake
    }

    /// Putting a body to sleep zeroes its velocity and accumulated forces.
    pub fn set_awake(&mut self, flag: bool) {
        if flag {
            if !self.awake {
                self.awake = true;
                self.sleep_time = 0.0;
            }
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn set_sleeping_allowed(&mut self, flag: bool) {
        self.auto_sleep = flag;
        if !flag {
            self.set_awake(true);
        }
    }

    /// Enables continuous collision against dynamic bodies.
    pub fn set_bullet(&mut self, flag: bool) {
        self.bullet = flag;
    }

    pub fn set_linear_damping(&mut self, damping: f64) {
        self.linear_damping = damping;
    }

    pub fn set_angular_damping(&mut self, damping: f64) {
        self.angular_damping = damping;
    }

    pub fn set_gravity_scale(&mut self, scale: f64) {
        self.gravity_scale = scale;
    }

    /// Clears the force and torque accumulators.
    pub fn clear_forces(&mut self) {
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    /// Recomputes mass, center of mass and rotational inertia from the
    /// fixtures. Static and kinematic bodies end up with zero mass.
    pub(crate) fn reset_mass_data(&mut self, fixtures: &SlotMap<FixtureHandle, Fixture>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;
        self.sweep.local_center = Vec2::ZERO;

        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.xf.position;
            self.sweep.c = self.xf.position;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        let mut local_center = Vec2::ZERO;
        for fixture in self.fixtures.iter().filter_map(|handle| fixtures.get(*handle)) {
            let mass_data = fixture.mass_data();
            self.mass += mass_data.mass;
            local_center += mass_data.center * mass_data.mass;
            self.inertia += mass_data.inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center *= self.inv_mass;
        } else {
            // Dynamic bodies always have positive mass.
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        self.apply_rotational_inertia(local_center);
        self.move_center(local_center);
    }

    /// Overrides the mass properties computed from the fixtures.
    pub(crate) fn set_mass_data(&mut self, mass_data: &MassData) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.inv_inertia = 0.0;
        self.mass = if mass_data.mass > 0.0 { mass_data.mass } else { 1.0 };
        self.inv_mass = 1.0 / self.mass;
        self.inertia = mass_data.inertia;

        self.apply_rotational_inertia(mass_data.center);
        self.move_center(mass_data.center);
    }

    /// Shifts `self.inertia`, given about the origin, to the center of mass.
    fn apply_rotational_inertia(&mut self, local_center: Vec2) {
        if self.inertia > 0.0 && !self.fixed_rotation {
            self.inertia -= self.mass * local_center.dot(local_center);
            debug_assert!(self.inertia > 0.0);
            self.inv_inertia = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }
    }

    /// Moves the center of mass, keeping the velocity of the origin.
    fn move_center(&mut self, local_center: Vec2) {
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.apply(local_center);
        self.sweep.c0 = self.sweep.c;
        self.linear_velocity += Vec2::scalar_cross(self.angular_velocity, self.sweep.c - old_center);
    }

    /// Recomputes the origin transform from the swept center of mass.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.rotation = Rot::new(self.sweep.a);
        self.xf.position = self.sweep.c - self.xf.rotation.apply(self.sweep.local_center);
    }

    /// Moves the body back to `alpha` of the step and snaps the sweep there.
    pub(crate) fn advance(&mut self, alpha: f64) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Joint-based collision filtering: bodies joined without `collide_connected`
    /// never collide.
    pub(crate) fn should_collide(&self, other_handle: BodyHandle, other: &Body) -> bool {
        if self.body_type != BodyType::Dynamic && other.body_type != BodyType::Dynamic {
            return false;
        }
        !self
            .joint_edges
            .iter()
            .any(|edge| edge.other == other_handle && !edge.collide_connected)
    }
}
