use crate::common::error::{PhysicsError, PhysicsResult};
use crate::common::settings::{ANGULAR_SLOP, LINEAR_SLOP};
use crate::constraints::{apply_impulse, apply_position_impulse, relative_velocity, soft_constraint, JointBodies};
use crate::integration::SolverData;
use crate::math::matrix::{Mat33, Vec3};
use crate::math::vec2::Vec2;
use crate::objects::BodyHandle;
use crate::world::World;

/// Glues two bodies together. With a non-zero frequency the angular part
/// becomes a soft spring.
#[derive(Debug, Clone, PartialEq)]
pub struct WeldJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f64,
    pub frequency_hz: f64,
    pub damping_ratio: f64,
}

impl WeldJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        WeldJointDef {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    pub fn from_world_anchor(world: &World, body_a: BodyHandle, body_b: BodyHandle, anchor: Vec2) -> PhysicsResult<Self> {
        let a = world.body(body_a)?;
        let b = world.body(body_b)?;
        Ok(WeldJointDef {
            local_anchor_a: a.local_point(anchor),
            local_anchor_b: b.local_point(anchor),
            reference_angle: b.angle() - a.angle(),
            ..WeldJointDef::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeldJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    reference_angle: f64,
    frequency_hz: f64,
    damping_ratio: f64,
    bias: f64,
    gamma: f64,
    impulse: Vec3,

    bodies: JointBodies,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat33,
}

fn weld_mass(bodies: &JointBodies, r_a: Vec2, r_b: Vec2) -> Mat33 {
    let (m_a, m_b, i_a, i_b) = (bodies.inv_mass_a, bodies.inv_mass_b, bodies.inv_i_a, bodies.inv_i_b);
    let k12 = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
    let k13 = -r_a.y * i_a - r_b.y * i_b;
    let k23 = r_a.x * i_a + r_b.x * i_b;
    Mat33 {
        ex: Vec3::new(m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b, k12, k13),
        ey: Vec3::new(k12, m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b, k23),
        ez: Vec3::new(k13, k23, i_a + i_b),
    }
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> PhysicsResult<Self> {
        if def.frequency_hz < 0.0 || def.damping_ratio < 0.0 {
            return Err(PhysicsError::InvalidJoint("spring frequency and damping must be non-negative"));
        }
        Ok(WeldJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            bias: 0.0,
            gamma: 0.0,
            impulse: Vec3::ZERO,
            bodies: JointBodies::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat33::default(),
        })
    }

    pub fn reference_angle(&self) -> f64 {
        self.reference_angle
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
        Vec2::new(self.impulse.x, self.impulse.y) * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.impulse.z
    }

    pub(crate) fn init_velocity_constraints(&mut self, data: &mut SolverData, bodies: JointBodies) {
        self.bodies = bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);
        self.r_a = r_a;
        self.r_b = r_b;

        let k = weld_mass(&bodies, r_a, r_b);

        if self.frequency_hz > 0.0 {
            self.mass = k.inverse22();

            let mut inv_m = bodies.inv_i_a + bodies.inv_i_b;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };
            let c = pb.a - pa.a - self.reference_angle;
            let (gamma, bias_factor) = soft_constraint(m, self.frequency_hz, self.damping_ratio, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;

            inv_m += gamma;
            self.mass.ez.z = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else {
            self.mass = if k.ez.z == 0.0 { k.inverse22() } else { k.sym_inverse33() };
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse = self.impulse * data.step.dt_ratio;
            let p = Vec2::new(self.impulse.x, self.impulse.y);
            apply_impulse(data, &bodies, r_a, r_b, p, self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let bodies = self.bodies;

        if self.frequency_hz > 0.0 {
            let cdot2 = data.velocities[bodies.index_b].w - data.velocities[bodies.index_a].w;
            let impulse2 = -self.mass.ez.z * (cdot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;
            data.velocities[bodies.index_a].w -= bodies.inv_i_a * impulse2;
            data.velocities[bodies.index_b].w += bodies.inv_i_b * impulse2;

            let cdot1 = relative_velocity(data, &bodies, self.r_a, self.r_b);
            let impulse1 = -self.mass.mul22(cdot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;
            apply_impulse(data, &bodies, self.r_a, self.r_b, impulse1, 0.0);
        } else {
            let cdot1 = relative_velocity(data, &bodies, self.r_a, self.r_b);
            let cdot2 = data.velocities[bodies.index_b].w - data.velocities[bodies.index_a].w;
            let impulse = -self.mass.mul_vec(Vec3::new(cdot1.x, cdot1.y, cdot2));
            self.impulse += impulse;
            apply_impulse(data, &bodies, self.r_a, self.r_b, Vec2::new(impulse.x, impulse.y), impulse.z);
        }
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let bodies = self.bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);
        let k = weld_mass(&bodies, r_a, r_b);

        let c1 = pb.c + r_b - pa.c - r_a;
        let position_error = c1.magnitude();

        let (impulse, angular_error) = if self.frequency_hz > 0.0 {
            let p = -k.solve22(c1);
            (Vec3::new(p.x, p.y, 0.0), 0.0)
        } else {
            let c2 = pb.a - pa.a - self.reference_angle;
            let impulse = if k.ez.z > 0.0 {
                -k.solve33(Vec3::new(c1.x, c1.y, c2))
            } else {
                let p = -k.solve22(c1);
                Vec3::new(p.x, p.y, 0.0)
            };
            (impulse, c2.abs())
        };

        apply_position_impulse(data, &bodies, r_a, r_b, Vec2::new(impulse.x, impulse.y), impulse.z);

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}
