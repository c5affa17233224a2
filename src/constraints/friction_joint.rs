use crate::common::error::{PhysicsError, PhysicsResult};
use crate::constraints::{apply_impulse, relative_velocity, JointBodies};
use crate::integration::SolverData;
use crate::math::matrix::Mat22;
use crate::math::vec2::Vec2;
use crate::objects::BodyHandle;
use crate::world::World;

/// Top-down friction: resists relative translation and rotation up to a
/// maximum force and torque.
#[derive(Debug, Clone, PartialEq)]
pub struct FrictionJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub max_force: f64,
    pub max_torque: f64,
}

impl FrictionJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        FrictionJointDef {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_force: 0.0,
            max_torque: 0.0,
        }
    }

    pub fn from_world_anchor(world: &World, body_a: BodyHandle, body_b: BodyHandle, anchor: Vec2) -> PhysicsResult<Self> {
        Ok(FrictionJointDef {
            local_anchor_a: world.body(body_a)?.local_point(anchor),
            local_anchor_b: world.body(body_b)?.local_point(anchor),
            ..FrictionJointDef::new(body_a, body_b)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrictionJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    max_force: f64,
    max_torque: f64,
    linear_impulse: Vec2,
    angular_impulse: f64,
    bodies: JointBodies,
    r_a: Vec2,
    r_b: Vec2,
    linear_mass: Mat22,
    angular_mass: f64,
}

impl FrictionJoint {
    pub(crate) fn new(def: &FrictionJointDef) -> PhysicsResult<Self> {
        if !(def.max_force >= 0.0 && def.max_torque >= 0.0) {
            return Err(PhysicsError::InvalidJoint("friction joint limits must be non-negative"));
        }
        Ok(FrictionJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_force: def.max_force,
            max_torque: def.max_torque,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            bodies: JointBodies::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            linear_mass: Mat22::default(),
            angular_mass: 0.0,
        })
    }

    pub fn max_force(&self) -> f64 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: f64) {
        self.max_force = force.max(0.0);
    }

    pub fn max_torque(&self) -> f64 {
        self.max_torque
    }

    pub fn set_max_torque(&mut self, torque: f64) {
        self.max_torque = torque.max(0.0);
    }

    pub fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        self.linear_impulse * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.angular_impulse
    }

    pub(crate) fn init_velocity_constraints(&mut self, data: &mut SolverData, bodies: JointBodies) {
        self.bodies = bodies;
        let pa = data.positions[bodies.index_a];
        let pb = data.positions[bodies.index_b];
        let (r_a, r_b) = bodies.lever_arms(self.local_anchor_a, self.local_anchor_b, &pa, &pb);
        self.r_a = r_a;
        self.r_b = r_b;

        let (m_a, m_b, i_a, i_b) = (bodies.inv_mass_a, bodies.inv_mass_b, bodies.inv_i_a, bodies.inv_i_b);
        let k = Mat22::new(
            Vec2::new(
                m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
            ),
            Vec2::new(
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
            ),
        );
        self.linear_mass = k.inverse();

        self.angular_mass = i_a + i_b;
        if self.angular_mass > 0.0 {
            self.angular_mass = 1.0 / self.angular_mass;
        }

        if data.step.warm_starting {
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;
            apply_impulse(data, &bodies, r_a, r_b, self.linear_impulse, self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let h = data.step.dt;
        let bodies = self.bodies;

        {
            let cdot = data.velocities[bodies.index_b].w - data.velocities[bodies.index_a].w;
            let impulse = -self.angular_mass * cdot;
            let old = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.angular_impulse - old;
            data.velocities[bodies.index_a].w -= bodies.inv_i_a * impulse;
            data.velocities[bodies.index_b].w += bodies.inv_i_b * impulse;
        }

        {
            let cdot = relative_velocity(data, &bodies, self.r_a, self.r_b);
            let impulse = -self.linear_mass.mul_vec(cdot);
            let old = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = h * self.max_force;
            if self.linear_impulse.magnitude_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize() * max_impulse;
            }

            let impulse = self.linear_impulse - old;
            apply_impulse(data, &bodies, self.r_a, self.r_b, impulse, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::settings::WorldSettings;
    use crate::integration::{Position, TimeStep, Velocity};
    use slotmap::KeyData;

    const EPSILON: f64 = 1e-9;

    fn def() -> FrictionJointDef {
        FrictionJointDef {
            max_force: 6.0,
            max_torque: 0.0,
            ..FrictionJointDef::new(BodyHandle::from(KeyData::from_ffi(1)), BodyHandle::from(KeyData::from_ffi(2)))
        }
    }

    #[test]
    fn test_rejects_negative_limits() {
        let bad = FrictionJointDef { max_force: -1.0, ..def() };
        assert!(FrictionJoint::new(&bad).is_err());
    }

    #[test]
    fn test_friction_impulse_is_capped() {
        let mut joint = FrictionJoint::new(&def()).expect("valid joint");
        let settings = WorldSettings::default();
        let mut positions = [Position::default(); 2];
        let mut velocities = [Velocity::default(), Velocity { v: Vec2::new(10.0, 0.0), w: 2.0 }];
        let mut data = SolverData {
            step: TimeStep::new(0.5, 8, 3),
            settings: &settings,
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let bodies = JointBodies {
            index_a: 0,
            index_b: 1,
            inv_mass_b: 1.0,
            inv_i_b: 1.0,
            ..Default::default()
        };

        joint.init_velocity_constraints(&mut data, bodies);
        joint.solve_velocity_constraints(&mut data);

        // At most max_force * dt = 3 of momentum is removed per step.
        assert!((data.velocities[1].v.x - 7.0).abs() < EPSILON);
        // Zero max torque leaves the spin alone.
        assert!((data.velocities[1].w - 2.0).abs() < EPSILON);
        assert!((joint.reaction_force(2.0).x + 6.0).abs() < EPSILON);
    }
}
