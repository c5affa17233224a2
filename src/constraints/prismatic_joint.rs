use crate::common::error::{PhysicsError, PhysicsResult};
use crate::common::settings::{ANGULAR_SLOP, LINEAR_SLOP};
use crate::constraints::{JointBodies, LimitState};
use crate::integration::SolverData;
use crate::math::matrix::{Mat22, Mat33, Vec3};
use crate::math::transform::Rot;
use crate::math::vec2::Vec2;
use crate::objects::{Body, BodyHandle};
use crate::world::World;

/// Lets body B slide along an axis fixed in body A, without relative rotation.
/// Supports a translation limit and a linear motor.
#[derive(Debug, Clone, PartialEq)]
pub struct PrismaticJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Translation axis in body A's frame. Normalized on construction.
    pub local_axis_a: Vec2,
    /// `angle_b - angle_a` in the rest configuration.
    pub reference_angle: f64,
    pub enable_limit: bool,
    pub lower_translation: f64,
    pub upper_translation: f64,
    pub enable_motor: bool,
    pub max_motor_force: f64,
    pub motor_speed: f64,
}

impl PrismaticJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        PrismaticJointDef {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis_a: Vec2::X,
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            max_motor_force: 0.0,
            motor_speed: 0.0,
        }
    }

    /// Uses a world anchor and a world axis in the current configuration.
    pub fn from_world_anchor(
        world: &World,
        body_a: BodyHandle,
        body_b: BodyHandle,
        anchor: Vec2,
        axis: Vec2,
    ) -> PhysicsResult<Self> {
        let a = world.body(body_a)?;
        let b = world.body(body_b)?;
        Ok(PrismaticJointDef {
            local_anchor_a: a.local_point(anchor),
            local_anchor_b: b.local_point(anchor),
            local_axis_a: a.local_vector(axis),
            reference_angle: b.angle() - a.angle(),
            ..PrismaticJointDef::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrismaticJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    local_x_axis_a: Vec2,
    local_y_axis_a: Vec2,
    reference_angle: f64,
    impulse: Vec3,
    motor_impulse: f64,
    lower_translation: f64,
    upper_translation: f64,
    max_motor_force: f64,
    motor_speed: f64,
    enable_limit: bool,
    enable_motor: bool,
    limit_state: LimitState,

    bodies: JointBodies,
    axis: Vec2,
    perp: Vec2,
    s1: f64,
    s2: f64,
    a1: f64,
    a2: f64,
    k: Mat33,
    motor_mass: f64,
}

/// Constraint mass matrix shared by the velocity and position passes. `k22`
/// falls back to 1 when neither body can rotate.
fn effective_mass(bodies: &JointBodies, s1: f64, s2: f64, a1: f64, a2: f64) -> Mat33 {
    let (m_a, m_b, i_a, i_b) = (bodies.inv_mass_a, bodies.inv_mass_b, bodies.inv_i_a, bodies.inv_i_b);
    let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
    let k12 = i_a * s1 + i_b * s2;
    let k13 = i_a * s1 * a1 + i_b * s2 * a2;
    let mut k22 = i_a + i_b;
    if k22 == 0.0 {
        k22 = 1.0;
    }
    let k23 = i_a * a1 + i_b * a2;
    let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
    Mat33 {
        ex: Vec3::new(k11, k12, k13),
        ey: Vec3::new(k12, k22, k23),
        ez: Vec3::new(k13, k23, k33),
    }
}

impl PrismaticJoint {
    pub(crate) fn new(def: &PrismaticJointDef) -> PhysicsResult<Self> {
        let axis = def.local_axis_a.normalize();
        if axis == Vec2::ZERO {
            return Err(PhysicsError::InvalidJoint("prismatic axis must be non-zero"));
        }
        if def.lower_translation > def.upper_translation {
            return Err(PhysicsError::InvalidJoint("lower translation exceeds upper translation"));
        }
        if def.max_motor_force < 0.0 {
            return Err(PhysicsError::InvalidJoint("motor force must be non-negative"));
        }
        Ok(PrismaticJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_x_axis_a: axis,
            local_y_axis_a: Vec2::scalar_cross(1.0, axis),
            reference_angle: def.reference_angle,
            impulse: Vec3::ZERO,
            motor_impulse: 0.0,
            lower_translation: def.lower_translation,
            upper_translation: def.upper_translation,
            max_motor_force: def.max_motor_force,
            motor_speed: def.motor_speed,
            enable_limit: def.enable_limit,
            enable_motor: def.enable_motor,
            limit_state: LimitState::Inactive,
            bodies: JointBodies::default(),
            axis: Vec2::ZERO,
            perp: Vec2::ZERO,
            s1: 0.0,
            s2: 0.0,
            a1: 0.0,
            a2: 0.0,
            k: Mat33::default(),
            motor_mass: 0.0,
        })
    }

    pub fn local_axis_a(&self) -> Vec2 {
        self.local_x_axis_a
    }

    pub fn reference_angle(&self) -> f64 {
        self.reference_angle
    }

    /// Current translation of B's anchor along the axis.
    pub fn joint_translation(&self, body_a: &Body, body_b: &Body) -> f64 {
        let p_a = body_a.world_point(self.local_anchor_a);
        let p_b = body_b.world_point(self.local_anchor_b);
        let axis = body_a.world_vector(self.local_x_axis_a);
        (p_b - p_a).dot(axis)
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.enable_limit
    }

    pub fn enable_limit(&mut self, flag: bool) {
        if flag != self.enable_limit {
            self.enable_limit = flag;
            self.impulse.z = 0.0;
        }
    }

    pub fn limits(&self) -> (f64, f64) {
        (self.lower_translation, self.upper_translation)
    }

    pub fn set_limits(&mut self, lower: f64, upper: f64) -> PhysicsResult<()> {
        if lower > upper {
            return Err(PhysicsError::InvalidJoint("lower translation exceeds upper translation"));
        }
        if lower != self.lower_translation || upper != self.upper_translation {
            self.impulse.z = 0.0;
            self.lower_translation = lower;
            self.upper_translation = upper;
        }
        Ok(())
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn enable_motor(&mut self, flag: bool) {
        self.enable_motor = flag;
    }

    pub fn motor_speed(&self) -> f64 {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: f64) {
        self.motor_speed = speed;
    }

    pub fn max_motor_force(&self) -> f64 {
        self.max_motor_force
    }

    pub fn set_max_motor_force(&mut self, force: f64) {
        self.max_motor_force = force.max(0.0);
    }

    pub fn motor_force(&self, inv_dt: f64) -> f64 {
        inv_dt * self.motor_impulse
    }

    pub fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        (self.perp * self.impulse.x + self.axis * (self.motor_impulse + self.impulse.z)) * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.impulse.y
    }

    fn apply(&self, data: &mut SolverData, p: Vec2, l_a: f64, l_b: f64) {
        let bodies = &self.bodies;
        let va = &mut data.velocities[bodies.index_a];
        va.v -= p * bodies.inv_mass_a;
        va.w -= bodies.inv_i_a * l_a;
        let vb = &mut data.velocities[bodies.index_b];
        vb.v += p * bodies.inv_mass_b;
        vb.w += bodies.inv_i_b * l_b;
    }

    pub(crate) fn init_velocity_constraints(&mut self, data: &mut SolverData, bodies: JointBodies) {
        self.bodies = bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);
        let q_a = Rot::new(pa.a);
        let d = pb.c - pa.c + r_b - r_a;

        let (m_a, m_b, i_a, i_b) = (bodies.inv_mass_a, bodies.inv_mass_b, bodies.inv_i_a, bodies.inv_i_b);

        self.axis = q_a.apply(self.local_x_axis_a);
        self.a1 = (d + r_a).cross(self.axis);
        self.a2 = r_b.cross(self.axis);
        self.motor_mass = m_a + m_b + i_a * self.a1 * self.a1 + i_b * self.a2 * self.a2;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        self.perp = q_a.apply(self.local_y_axis_a);
        self.s1 = (d + r_a).cross(self.perp);
        self.s2 = r_b.cross(self.perp);
        self.k = effective_mass(&bodies, self.s1, self.s2, self.a1, self.a2);

        if self.enable_limit {
            let translation = self.axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * LINEAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if translation <= self.lower_translation {
                if self.limit_state != LimitState::AtLower {
                    self.limit_state = LimitState::AtLower;
                    self.impulse.z = 0.0;
                }
            } else if translation >= self.upper_translation {
                if self.limit_state != LimitState::AtUpper {
                    self.limit_state = LimitState::AtUpper;
                    self.impulse.z = 0.0;
                }
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
            self.impulse.z = 0.0;
        }

        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            self.impulse = self.impulse * data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let axial = self.motor_impulse + self.impulse.z;
            let p = self.perp * self.impulse.x + self.axis * axial;
            let l_a = self.impulse.x * self.s1 + self.impulse.y + axial * self.a1;
            let l_b = self.impulse.x * self.s2 + self.impulse.y + axial * self.a2;
            self.apply(data, p, l_a, l_b);
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (ia, ib) = (self.bodies.index_a, self.bodies.index_b);

        if self.enable_motor && self.limit_state != LimitState::Equal {
            let (va, vb) = (data.velocities[ia], data.velocities[ib]);
            let cdot = self.axis.dot(vb.v - va.v) + self.a2 * vb.w - self.a1 * va.w;
            let impulse = self.motor_mass * (self.motor_speed - cdot);
            let old = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_force;
            self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old;

            self.apply(data, self.axis * impulse, impulse * self.a1, impulse * self.a2);
        }

        let (va, vb) = (data.velocities[ia], data.velocities[ib]);
        let cdot1 = Vec2::new(self.perp.dot(vb.v - va.v) + self.s2 * vb.w - self.s1 * va.w, vb.w - va.w);

        if self.enable_limit && self.limit_state != LimitState::Inactive {
            let cdot2 = self.axis.dot(vb.v - va.v) + self.a2 * vb.w - self.a1 * va.w;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let f1 = self.impulse;
            self.impulse += self.k.solve33(-cdot);

            match self.limit_state {
                LimitState::AtLower => self.impulse.z = self.impulse.z.max(0.0),
                LimitState::AtUpper => self.impulse.z = self.impulse.z.min(0.0),
                _ => {}
            }

            // Re-solve the point part with the clamped axial impulse.
            let b = -cdot1 - Vec2::new(self.k.ez.x, self.k.ez.y) * (self.impulse.z - f1.z);
            let f2r = self.k.solve22(b) + Vec2::new(f1.x, f1.y);
            self.impulse.x = f2r.x;
            self.impulse.y = f2r.y;

            let df = self.impulse - f1;
            let p = self.perp * df.x + self.axis * df.z;
            let l_a = df.x * self.s1 + df.y + df.z * self.a1;
            let l_b = df.x * self.s2 + df.y + df.z * self.a2;
            self.apply(data, p, l_a, l_b);
        } else {
            let df = self.k.solve22(-cdot1);
            self.impulse.x += df.x;
            self.impulse.y += df.y;

            let p = self.perp * df.x;
            let l_a = df.x * self.s1 + df.y;
            let l_b = df.x * self.s2 + df.y;
            self.apply(data, p, l_a, l_b);
        }
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let bodies = self.bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);
        let q_a = Rot::new(pa.a);
        let d = pb.c + r_b - pa.c - r_a;

        let axis = q_a.apply(self.local_x_axis_a);
        let a1 = (d + r_a).cross(axis);
        let a2 = r_b.cross(axis);
        let perp = q_a.apply(self.local_y_axis_a);
        let s1 = (d + r_a).cross(perp);
        let s2 = r_b.cross(perp);

        let c1 = Vec2::new(perp.dot(d), pb.a - pa.a - self.reference_angle);
        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let max_correction = data.settings.max_linear_correction;
        let mut active = false;
        let mut c2 = 0.0;
        if self.enable_limit {
            let translation = axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * LINEAR_SLOP {
                c2 = translation.clamp(-max_correction, max_correction);
                linear_error = linear_error.max(translation.abs());
                active = true;
            } else if translation <= self.lower_translation {
                c2 = (translation - self.lower_translation + LINEAR_SLOP).clamp(-max_correction, 0.0);
                linear_error = linear_error.max(self.lower_translation - translation);
                active = true;
            } else if translation >= self.upper_translation {
                c2 = (translation - self.upper_translation - LINEAR_SLOP).clamp(0.0, max_correction);
                linear_error = linear_error.max(translation - self.upper_translation);
                active = true;
            }
        }

        let k = effective_mass(&bodies, s1, s2, a1, a2);
        let impulse = if active {
            k.solve33(-Vec3::new(c1.x, c1.y, c2))
        } else {
            let k2 = Mat22::new(Vec2::new(k.ex.x, k.ex.y), Vec2::new(k.ey.x, k.ey.y));
            let impulse1 = k2.solve(-c1);
            Vec3::new(impulse1.x, impulse1.y, 0.0)
        };

        let p = perp * impulse.x + axis * impulse.z;
        let l_a = impulse.x * s1 + impulse.y + impulse.z * a1;
        let l_b = impulse.x * s2 + impulse.y + impulse.z * a2;

        let pa = &mut data.positions[bodies.index_a];
        pa.c -= p * bodies.inv_mass_a;
        pa.a -= bodies.inv_i_a * l_a;
        let pb = &mut data.positions[bodies.index_b];
        pb.c += p * bodies.inv_mass_b;
        pb.a += bodies.inv_i_b * l_b;

        linear_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}
