use crate::common::error::{PhysicsError, PhysicsResult};
use crate::common::settings::{ANGULAR_SLOP, LINEAR_SLOP};
use crate::constraints::{apply_impulse, apply_position_impulse, relative_velocity, JointBodies, LimitState};
use crate::integration::SolverData;
use crate::math::matrix::{Mat22, Mat33, Vec3};
use crate::math::vec2::Vec2;
use crate::objects::{Body, BodyHandle};
use crate::world::World;

/// A hinge: both anchors share one point, bodies rotate freely about it.
/// Supports an angle limit and a rotational motor.
#[derive(Debug, Clone, PartialEq)]
pub struct RevoluteJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// `angle_b - angle_a` at the zero joint angle.
    pub reference_angle: f64,
    pub enable_limit: bool,
    pub lower_angle: f64,
    pub upper_angle: f64,
    pub enable_motor: bool,
    pub motor_speed: f64,
    pub max_motor_torque: f64,
}

impl RevoluteJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        RevoluteJointDef {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
        }
    }

    /// Hinge at a world point, using the bodies' current angles as reference.
    pub fn from_world_anchor(world: &World, body_a: BodyHandle, body_b: BodyHandle, anchor: Vec2) -> PhysicsResult<Self> {
        let a = world.body(body_a)?;
        let b = world.body(body_b)?;
        Ok(RevoluteJointDef {
            local_anchor_a: a.local_point(anchor),
            local_anchor_b: b.local_point(anchor),
            reference_angle: b.angle() - a.angle(),
            ..RevoluteJointDef::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    reference_angle: f64,
    impulse: Vec3,
    motor_impulse: f64,
    enable_motor: bool,
    max_motor_torque: f64,
    motor_speed: f64,
    enable_limit: bool,
    lower_angle: f64,
    upper_angle: f64,
    limit_state: LimitState,

    bodies: JointBodies,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat33,
    motor_mass: f64,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> PhysicsResult<Self> {
        if def.lower_angle > def.upper_angle {
            return Err(PhysicsError::InvalidJoint("lower angle exceeds upper angle"));
        }
        if def.max_motor_torque < 0.0 {
            return Err(PhysicsError::InvalidJoint("motor torque must be non-negative"));
        }
        Ok(RevoluteJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            impulse: Vec3::ZERO,
            motor_impulse: 0.0,
            enable_motor: def.enable_motor,
            max_motor_torque: def.max_motor_torque,
            motor_speed: def.motor_speed,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            limit_state: LimitState::Inactive,
            bodies: JointBodies::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat33::default(),
            motor_mass: 0.0,
        })
    }

    pub fn reference_angle(&self) -> f64 {
        self.reference_angle
    }

    pub fn joint_angle(&self, body_a: &Body, body_b: &Body) -> f64 {
        body_b.sweep.a - body_a.sweep.a - self.reference_angle
    }

    pub fn joint_speed(&self, body_a: &Body, body_b: &Body) -> f64 {
        body_b.angular_velocity - body_a.angular_velocity
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
        (self.lower_angle, self.upper_angle)
    }

    pub fn set_limits(&mut self, lower: f64, upper: f64) -> PhysicsResult<()> {
        if lower > upper {
            return Err(PhysicsError::InvalidJoint("lower angle exceeds upper angle"));
        }
        if lower != self.lower_angle || upper != self.upper_angle {
            self.impulse.z = 0.0;
            self.lower_angle = lower;
            self.upper_angle = upper;
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

    pub fn max_motor_torque(&self) -> f64 {
        self.max_motor_torque
    }

    pub fn set_max_motor_torque(&mut self, torque: f64) {
        self.max_motor_torque = torque.max(0.0);
    }

    pub fn motor_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.motor_impulse
    }

    pub fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        Vec2::new(self.impulse.x, self.impulse.y) * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.impulse.z
    }

    fn fixed_rotation(&self) -> bool {
        self.bodies.inv_i_a + self.bodies.inv_i_b == 0.0
    }

    pub(crate) fn init_velocity_constraints(&mut self, data: &mut SolverData, bodies: JointBodies) {
        self.bodies = bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);
        self.r_a = r_a;
        self.r_b = r_b;

        let (m_a, m_b, i_a, i_b) = (bodies.inv_mass_a, bodies.inv_mass_b, bodies.inv_i_a, bodies.inv_i_b);
        let k12 = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
        let k13 = -r_a.y * i_a - r_b.y * i_b;
        let k23 = r_a.x * i_a + r_b.x * i_b;
        self.mass = Mat33 {
            ex: Vec3::new(m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b, k12, k13),
            ey: Vec3::new(k12, m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b, k23),
            ez: Vec3::new(k13, k23, i_a + i_b),
        };

        self.motor_mass = i_a + i_b;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        let fixed_rotation = self.fixed_rotation();
        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = pb.a - pa.a - self.reference_angle;
            if (self.upper_angle - self.lower_angle).abs() < 2.0 * ANGULAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if data.step.warm_starting {
            self.impulse = self.impulse * data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;
            let p = Vec2::new(self.impulse.x, self.impulse.y);
            apply_impulse(data, &bodies, r_a, r_b, p, self.motor_impulse + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let bodies = self.bodies;
        let fixed_rotation = self.fixed_rotation();

        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let cdot = data.velocities[bodies.index_b].w - data.velocities[bodies.index_a].w - self.motor_speed;
            let impulse = -self.motor_mass * cdot;
            let old = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old;

            data.velocities[bodies.index_a].w -= bodies.inv_i_a * impulse;
            data.velocities[bodies.index_b].w += bodies.inv_i_b * impulse;
        }

        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let cdot1 = relative_velocity(data, &bodies, self.r_a, self.r_b);
            let cdot2 = data.velocities[bodies.index_b].w - data.velocities[bodies.index_a].w;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let mut impulse = -self.mass.solve33(cdot);
            match self.limit_state {
                LimitState::Equal => self.impulse += impulse,
                LimitState::AtLower | LimitState::AtUpper => {
                    let new_impulse = self.impulse.z + impulse.z;
                    let violates = match self.limit_state {
                        LimitState::AtLower => new_impulse < 0.0,
                        _ => new_impulse > 0.0,
                    };
                    if violates {
                        // Drop the limit row and solve the point constraint alone.
                        let rhs = -cdot1 + Vec2::new(self.mass.ez.x, self.mass.ez.y) * self.impulse.z;
                        let reduced = self.mass.solve22(rhs);
                        impulse.x = reduced.x;
                        impulse.y = reduced.y;
                        impulse.z = -self.impulse.z;
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = 0.0;
                    } else {
                        self.impulse += impulse;
                    }
                }
                LimitState::Inactive => {}
            }

            let p = Vec2::new(impulse.x, impulse.y);
            apply_impulse(data, &bodies, self.r_a, self.r_b, p, impulse.z);
        } else {
            let cdot = relative_velocity(data, &bodies, self.r_a, self.r_b);
            let impulse = self.mass.solve22(-cdot);
            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;
            apply_impulse(data, &bodies, self.r_a, self.r_b, impulse, 0.0);
        }
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let bodies = self.bodies;
        let (i_a, i_b) = (bodies.inv_i_a, bodies.inv_i_b);
        let mut angular_error = 0.0;

        if self.enable_limit && self.limit_state != LimitState::Inactive && !self.fixed_rotation() {
            let angle = data.positions[bodies.index_b].a - data.positions[bodies.index_a].a - self.reference_angle;
            let max_correction = data.settings.max_angular_correction;

            let c = match self.limit_state {
                LimitState::Equal => {
                    let c = (angle - self.lower_angle).clamp(-max_correction, max_correction);
                    angular_error = c.abs();
                    c
                }
                LimitState::AtLower => {
                    let c = angle - self.lower_angle;
                    angular_error = -c;
                    (c + ANGULAR_SLOP).clamp(-max_correction, 0.0)
                }
                LimitState::AtUpper => {
                    let c = angle - self.upper_angle;
                    angular_error = c;
                    (c - ANGULAR_SLOP).clamp(0.0, max_correction)
                }
                LimitState::Inactive => 0.0,
            };
            let limit_impulse = -self.motor_mass * c;
            data.positions[bodies.index_a].a -= i_a * limit_impulse;
            data.positions[bodies.index_b].a += i_b * limit_impulse;
        }

        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);
        let c = pb.c + r_b - pa.c - r_a;
        let position_error = c.magnitude();

        let (m_a, m_b) = (bodies.inv_mass_a, bodies.inv_mass_b);
        let off = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
        let k = Mat22::new(
            Vec2::new(m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y, off),
            Vec2::new(off, m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x),
        );
        let impulse = -k.solve(c);
        apply_position_impulse(data, &bodies, r_a, r_b, impulse, 0.0);

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}
