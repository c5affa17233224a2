use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::collision::aabb::{RayCastInput, RayCastOutput, AABB};
use crate::common::error::{PhysicsError, PhysicsResult};
use crate::math::transform::Transform;
use crate::math::vec2::Vec2;
use crate::shapes::MassData;

/// A solid disc. Deserialization goes through [`Circle::with_position`], so a
/// decoded circle is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CircleDef", into = "CircleDef")]
pub struct Circle {
    pub(crate) radius: f64,
    /// Center in body-local coordinates.
    pub(crate) position: Vec2,
}

/// Serialized form of a [`Circle`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CircleDef {
    radius: f64,
    #[serde(default)]
    position: Vec2,
}

impl TryFrom<CircleDef> for Circle {
    type Error = PhysicsError;

    fn try_from(def: CircleDef) -> PhysicsResult<Self> {
        Circle::with_position(def.radius, def.position)
    }
}

impl From<Circle> for CircleDef {
    fn from(c: Circle) -> Self {
        CircleDef {
            radius: c.radius,
            position: c.position,
        }
    }
}

impl Circle {
    pub fn new(radius: f64) -> PhysicsResult<Self> {
        Self::with_position(radius, Vec2::ZERO)
    }

    /// A circle whose center is offset from the body origin.
    pub fn with_position(radius: f64, position: Vec2) -> PhysicsResult<Self> {
        let circle = Self { radius, position };
        circle.validate()?;
        Ok(circle)
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(PhysicsError::InvalidRadius(self.radius));
        }
        if !self.position.is_valid() {
            return Err(PhysicsError::Precondition("circle center must be finite"));
        }
        Ok(())
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let p = xf.apply(self.position);
        let r = Vec2::new(self.radius, self.radius);
        AABB {
            min: p - r,
            max: p + r,
        }
    }

    pub fn compute_mass(&self, density: f64) -> MassData {
        let mass = density * PI * self.radius * self.radius;
        MassData {
            mass,
            center: self.position,
            // Inertia about the body origin via the parallel axis theorem.
            inertia: mass * (0.5 * self.radius * self.radius + self.position.magnitude_squared()),
        }
    }

    pub fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        let center = xf.apply(self.position);
        center.distance_squared(point) <= self.radius * self.radius
    }

    /// Solves `|p1 + t d - c| = r` for the smallest non-negative `t`.
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let center = xf.apply(self.position);
        let s = input.p1 - center;
        let b = s.magnitude_squared() - self.radius * self.radius;

        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.magnitude_squared();
        let sigma = c * c - rr * b;

        if sigma < 0.0 || rr < f64::EPSILON {
            return None;
        }

        let a = -(c + sigma.sqrt());
        if 0.0 <= a && a <= input.max_fraction * rr {
            let fraction = a / rr;
            Some(RayCastOutput {
                normal: (s + r * fraction).normalize(),
                fraction,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_circle_new() {
        let c = Circle::new(5.0).expect("valid radius");
        assert_eq!(c.radius, 5.0);
        assert_eq!(c.position, Vec2::ZERO);
    }

    #[test]
    fn test_circle_new_rejects_bad_radius() {
        assert!(matches!(Circle::new(-1.0), Err(PhysicsError::InvalidRadius(_))));
        assert!(matches!(Circle::new(0.0), Err(PhysicsError::InvalidRadius(_))));
        assert!(Circle::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_circle_json_goes_through_validation() {
        let c: Circle = serde_json::from_str(r#"{"radius": 0.25}"#).expect("valid circle");
        assert_eq!(c.radius(), 0.25);
        assert_eq!(c.position(), Vec2::ZERO);

        assert!(serde_json::from_str::<Circle>(r#"{"radius": -1.0}"#).is_err());
        assert!(serde_json::from_str::<Circle>(r#"{"radius": 0.0, "position": {"x": 1.0, "y": 0.0}}"#).is_err());
    }

    #[test]
    fn test_circle_validate_catches_tampering() {
        let mut c = Circle::new(1.0).expect("valid");
        c.radius = -1.0;
        assert!(matches!(c.validate(), Err(PhysicsError::InvalidRadius(_))));
    }

    #[test]
    fn test_circle_mass_offset_center() {
        let c = Circle::with_position(1.0, Vec2::new(2.0, 0.0)).expect("valid");
        let md = c.compute_mass(2.0);
        assert!((md.mass - 2.0 * PI).abs() < EPSILON);
        assert_eq!(md.center, Vec2::new(2.0, 0.0));
        assert!((md.inertia - md.mass * (0.5 + 4.0)).abs() < EPSILON);
    }

    #[test]
    fn test_circle_aabb_and_point() {
        let c = Circle::new(0.5).expect("valid");
        let xf = Transform::new(Vec2::new(1.0, 1.0), 0.3);
        let aabb = c.compute_aabb(&xf);
        assert!((aabb.min.x - 0.5).abs() < EPSILON);
        assert!((aabb.max.y - 1.5).abs() < EPSILON);
        assert!(c.test_point(&xf, Vec2::new(1.2, 1.2)));
        assert!(!c.test_point(&xf, Vec2::new(2.0, 1.0)));
    }

    #[test]
    fn test_circle_ray_cast() {
        let c = Circle::new(1.0).expect("valid");
        let input = RayCastInput {
            p1: Vec2::new(-3.0, 0.0),
            p2: Vec2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = c.ray_cast(&input, &Transform::identity()).expect("hit");
        assert!((hit.fraction - 2.0 / 6.0).abs() < EPSILON);
        assert!((hit.normal.x + 1.0).abs() < EPSILON);
    }
}
