use crate::common::settings::WorldSettings;
use crate::math::vec2::Vec2;
use crate::objects::body::{Body, BodyType};

/// Parameters of one solver pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    pub dt: f64,
    /// Inverse time step, 0 when `dt` is 0.
    pub inv_dt: f64,
    /// `dt * inv_dt0`, scales warm-start impulses under a variable time step.
    pub dt_ratio: f64,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub warm_starting: bool,
}

impl TimeStep {
    pub fn new(dt: f64, velocity_iterations: usize, position_iterations: usize) -> Self {
        TimeStep {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: 1.0,
            velocity_iterations,
            position_iterations,
            warm_starting: true,
        }
    }
}

/// Solver copy of a body's center of mass and angle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub c: Vec2,
    pub a: f64,
}

/// Solver copy of a body's velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub v: Vec2,
    pub w: f64,
}

/// State shared by the contact and joint solvers over one island.
/// Both slices are indexed by a body's island index.
pub struct SolverData<'a> {
    pub step: TimeStep,
    pub settings: &'a WorldSettings,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}

/// Applies gravity, accumulated forces and damping to a body's velocity.
///
/// Damping uses the Padé approximation `v *= 1 / (1 + h * c)`, which stays
/// stable for large coefficients.
pub fn integrate_velocity(body: &Body, velocity: &mut Velocity, gravity: Vec2, h: f64) {
    if body.body_type != BodyType::Dynamic {
        return;
    }

    velocity.v += (gravity * body.gravity_scale + body.force * body.inv_mass) * h;
    velocity.w += h * body.inv_inertia * body.torque;

    velocity.v *= 1.0 / (1.0 + h * body.linear_damping);
    velocity.w *= 1.0 / (1.0 + h * body.angular_damping);
}

/// Moves a solver position by its velocity, clamping very large motions.
pub fn integrate_position(position: &mut Position, velocity: &mut Velocity, settings: &WorldSettings, h: f64) {
    let translation = velocity.v * h;
    if translation.magnitude_squared() > settings.max_translation * settings.max_translation {
        let ratio = settings.max_translation / translation.magnitude();
        velocity.v *= ratio;
    }

    let rotation = h * velocity.w;
    if rotation * rotation > settings.max_rotation * settings.max_rotation {
        let ratio = settings.max_rotation / rotation.abs();
        velocity.w *= ratio;
    }

    position.c += velocity.v * h;
    position.a += h * velocity.w;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::body::BodyDef;
    const EPSILON: f64 = 1e-9;

    fn dynamic_body() -> Body {
        Body::new(&BodyDef::dynamic(Vec2::ZERO))
    }

    #[test]
    fn test_time_step_inverse() {
        let step = TimeStep::new(0.5, 8, 3);
        assert!((step.inv_dt - 2.0).abs() < EPSILON);
        assert_eq!(TimeStep::new(0.0, 8, 3).inv_dt, 0.0);
    }

    #[test]
    fn test_integrate_linear_motion_no_force() {
        let body = dynamic_body();
        let mut position = Position::default();
        let mut velocity = Velocity {
            v: Vec2::new(10.0, -5.0),
            w: 0.0,
        };
        let dt = 0.1;

        integrate_velocity(&body, &mut velocity, Vec2::ZERO, dt);
        integrate_position(&mut position, &mut velocity, &WorldSettings::default(), dt);

        assert!((position.c.x - 1.0).abs() < EPSILON);
        assert!((position.c.y - -0.5).abs() < EPSILON);
        assert_eq!(velocity.v, Vec2::new(10.0, -5.0));
    }

    #[test]
    fn test_integrate_linear_motion_constant_force() {
        let mut body = dynamic_body();
        body.mass = 2.0;
        body.inv_mass = 0.5;
        body.apply_force_to_center(Vec2::new(10.0, 0.0), true);
        let mut velocity = Velocity::default();

        integrate_velocity(&body, &mut velocity, Vec2::ZERO, 0.1);

        // v = a * dt = (5, 0) * 0.1
        assert!((velocity.v.x - 0.5).abs() < EPSILON);
        assert!(velocity.v.y.abs() < EPSILON);
    }

    #[test]
    fn test_integrate_gravity_scale() {
        let mut body = dynamic_body();
        body.gravity_scale = 0.5;
        let mut velocity = Velocity::default();
        integrate_velocity(&body, &mut velocity, Vec2::new(0.0, -10.0), 0.1);
        assert!((velocity.v.y + 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_integrate_angular_motion_constant_torque() {
        let mut body = dynamic_body();
        body.inertia = 0.5;
        body.inv_inertia = 2.0;
        body.apply_torque(5.0, true);
        let mut position = Position::default();
        let mut velocity = Velocity::default();
        let dt = 0.1;

        integrate_velocity(&body, &mut velocity, Vec2::ZERO, dt);
        integrate_position(&mut position, &mut velocity, &WorldSettings::default(), dt);

        // omega = T / I * dt = 10 * 0.1
        assert!((velocity.w - 1.0).abs() < EPSILON);
        assert!((position.a - 0.1).abs() < EPSILON);
    }

    #[test]
    fn test_damping_slows_body() {
        let mut body = dynamic_body();
        body.linear_damping = 1.0;
        let mut velocity = Velocity {
            v: Vec2::new(2.0, 0.0),
            w: 0.0,
        };
        integrate_velocity(&body, &mut velocity, Vec2::ZERO, 1.0);
        assert!((velocity.v.x - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_integrate_static_body_ignores_gravity() {
        let body = Body::new(&BodyDef::static_body(Vec2::ZERO));
        let mut velocity = Velocity::default();
        integrate_velocity(&body, &mut velocity, Vec2::new(0.0, -10.0), 0.1);
        assert_eq!(velocity, Velocity::default());
    }

    #[test]
    fn test_translation_is_clamped() {
        let settings = WorldSettings::default();
        let mut position = Position::default();
        let mut velocity = Velocity {
            v: Vec2::new(1000.0, 0.0),
            w: 1000.0,
        };
        integrate_position(&mut position, &mut velocity, &settings, 0.1);
        assert!((position.c.x - settings.max_translation).abs() < EPSILON);
        assert!((position.a - settings.max_rotation).abs() < EPSILON);
    }
}
