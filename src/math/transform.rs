use super::vec2::Vec2;
use serde::{Deserialize, Serialize};

/// A rotation stored as its sine and cosine so that repeated transforms
/// never call into trigonometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rot {
    pub s: f64,
    pub c: f64,
}

impl Rot {
    pub const IDENTITY: Rot = Rot { s: 0.0, c: 1.0 };

    /// Creates a rotation from an angle in radians.
    pub fn new(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    /// Returns the angle in radians, in `[-PI, PI]`.
    pub fn angle(self) -> f64 {
        self.s.atan2(self.c)
    }

    pub fn x_axis(self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    pub fn y_axis(self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotates a vector.
    pub fn apply(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse-rotates a vector.
    pub fn apply_inverse(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// `self * other`: rotate by `other` then by `self`.
    pub fn mul(self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// `self^T * other`.
    pub fn mul_t(self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec2,
    pub rotation: Rot,
}

impl Transform {
    /// Creates a new transform from a translation and an angle in radians.
    pub fn new(position: Vec2, angle: f64) -> Self {
        Self {
            position,
            rotation: Rot::new(angle),
        }
    }

    /// Creates an identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: Rot::IDENTITY,
        }
    }

    /// Applies the transform (rotation then translation) to a point.
    pub fn apply(self, point: Vec2) -> Vec2 {
        self.rotation.apply(point) + self.position
    }

    /// Applies the inverse transform (inverse translation then inverse rotation) to a point.
    pub fn apply_inverse(self, point: Vec2) -> Vec2 {
        self.rotation.apply_inverse(point - self.position)
    }

    /// Composes two transforms: `self * other`.
    pub fn mul(self, other: Transform) -> Transform {
        Transform {
            position: self.rotation.apply(other.position) + self.position,
            rotation: self.rotation.mul(other.rotation),
        }
    }

    /// `self^-1 * other`, i.e. `other` expressed in the frame of `self`.
    pub fn mul_t(self, other: Transform) -> Transform {
        Transform {
            position: self.rotation.apply_inverse(other.position - self.position),
            rotation: self.rotation.mul_t(other.rotation),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_rot_angle_round_trip() {
        for angle in [0.0, 0.3, -1.2, PI / 2.0, 3.0] {
            assert!((Rot::new(angle).angle() - angle).abs() < EPSILON);
        }
    }

    #[test]
    fn test_transform_apply_combined() {
        // Rotate (1, 0) by 90 degrees to (0, 1), then translate by (10, 5).
        let t = Transform::new(Vec2::new(10.0, 5.0), PI / 2.0);
        let tp = t.apply(Vec2::new(1.0, 0.0));
        assert!((tp.x - 10.0).abs() < EPSILON);
        assert!((tp.y - 6.0).abs() < EPSILON);
    }

    #[test]
    fn test_transform_apply_inverse_combined() {
        let t = Transform::new(Vec2::new(10.0, 5.0), PI / 4.0);
        let p_local = Vec2::new(1.0, 1.0);
        let p_local_again = t.apply_inverse(t.apply(p_local));
        assert!((p_local_again.x - p_local.x).abs() < EPSILON);
        assert!((p_local_again.y - p_local.y).abs() < EPSILON);
    }

    #[test]
    fn test_transform_mul_t_is_relative_frame() {
        let a = Transform::new(Vec2::new(1.0, 2.0), 0.4);
        let b = Transform::new(Vec2::new(-3.0, 0.5), -1.1);
        let rel = a.mul_t(b);
        let p = Vec2::new(0.7, -0.2);
        // Going through b directly or through a * (a^-1 * b) must agree.
        let direct = b.apply(p);
        let composed = a.mul(rel).apply(p);
        assert!((direct - composed).magnitude() < EPSILON);
    }

    #[test]
    fn test_rot_axes_are_orthonormal() {
        let q = Rot::new(0.8);
        assert!(q.x_axis().dot(q.y_axis()).abs() < EPSILON);
        assert!((q.x_axis().magnitude() - 1.0).abs() < EPSILON);
        assert_eq!(Rot::default(), Rot::IDENTITY);
    }
}
