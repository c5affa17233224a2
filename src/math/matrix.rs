//! Small dense matrices used by the joint solvers.

use super::vec2::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;
    fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl std::ops::AddAssign for Vec3 {
    fn add_assign(&mut self, o: Vec3) {
        self.x += o.x;
        self.y += o.y;
        self.z += o.z;
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// A 2x2 matrix stored as two column vectors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Mat22 {
    pub ex: Vec2,
    pub ey: Vec2,
}

impl Mat22 {
    pub fn new(ex: Vec2, ey: Vec2) -> Self {
        Self { ex, ey }
    }

    pub fn mul_vec(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }

    /// Inverse of the matrix. A singular matrix inverts to zero, which turns the
    /// corresponding constraint into a no-op instead of producing NaN.
    pub fn inverse(&self) -> Mat22 {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Mat22 {
            ex: Vec2::new(det * d, -det * c),
            ey: Vec2::new(-det * b, det * a),
        }
    }

    /// Solves `A * x = b`. Returns zero for a singular matrix.
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }
}

/// A 3x3 matrix stored as three column vectors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Mat33 {
    pub ex: Vec3,
    pub ey: Vec3,
    pub ez: Vec3,
}

impl Mat33 {
    pub fn mul_vec(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            v.x * self.ex.x + v.y * self.ey.x + v.z * self.ez.x,
            v.x * self.ex.y + v.y * self.ey.y + v.z * self.ez.y,
            v.x * self.ex.z + v.y * self.ey.z + v.z * self.ez.z,
        )
    }

    /// Multiplies by the upper 2x2 block.
    pub fn mul22(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.ex.x * v.x + self.ey.x * v.y, self.ex.y * v.x + self.ey.y * v.y)
    }

    /// Solves `A * x = b` for the full 3x3 system. Returns zero if singular.
    pub fn solve33(&self, b: Vec3) -> Vec3 {
        let mut det = self.ex.dot(self.ey.cross(self.ez));
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec3::new(
            det * b.dot(self.ey.cross(self.ez)),
            det * self.ex.dot(b.cross(self.ez)),
            det * self.ex.dot(self.ey.cross(b)),
        )
    }

    /// Solves only the upper 2x2 block. Returns zero if singular.
    pub fn solve22(&self, b: Vec2) -> Vec2 {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }

    /// Inverse of the upper 2x2 block embedded in a 3x3 matrix (the rest zeroed).
    pub fn inverse22(&self) -> Mat33 {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Mat33 {
            ex: Vec3::new(det * d, -det * c, 0.0),
            ey: Vec3::new(-det * b, det * a, 0.0),
            ez: Vec3::ZERO,
        }
    }

    /// Inverse of a symmetric 3x3 matrix. Returns zero if singular.
    pub fn sym_inverse33(&self) -> Mat33 {
        let mut det = self.ex.dot(self.ey.cross(self.ez));
        if det != 0.0 {
            det = 1.0 / det;
        }
        let (a11, a12, a13) = (self.ex.x, self.ey.x, self.ez.x);
        let (a22, a23) = (self.ey.y, self.ez.y);
        let a33 = self.ez.z;

        let ex = Vec3::new(
            det * (a22 * a33 - a23 * a23),
            det * (a13 * a23 - a12 * a33),
            det * (a12 * a23 - a13 * a22),
        );
        let ey = Vec3::new(ex.y, det * (a11 * a33 - a13 * a13), det * (a13 * a12 - a11 * a23));
        let ez = Vec3::new(ex.z, ey.z, det * (a11 * a22 - a12 * a12));
        Mat33 { ex, ey, ez }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_mat22_solve() {
        let m = Mat22::new(Vec2::new(2.0, 1.0), Vec2::new(1.0, 3.0));
        let x = Vec2::new(0.5, -2.0);
        let b = m.mul_vec(x);
        let solved = m.solve(b);
        assert!((solved - x).magnitude() < EPSILON);
        let inv = m.inverse();
        assert!((inv.mul_vec(b) - x).magnitude() < EPSILON);
    }

    #[test]
    fn test_mat22_singular_solves_to_zero() {
        let m = Mat22::new(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(m.solve(Vec2::new(1.0, 1.0)), Vec2::ZERO);
        assert_eq!(m.inverse(), Mat22::default());
    }

    #[test]
    fn test_mat33_solve_and_sym_inverse() {
        let m = Mat33 {
            ex: Vec3::new(4.0, 1.0, 0.5),
            ey: Vec3::new(1.0, 3.0, 0.2),
            ez: Vec3::new(0.5, 0.2, 2.0),
        };
        let x = Vec3::new(1.0, -1.0, 2.0);
        let b = m.mul_vec(x);
        let solved = m.solve33(b);
        assert!((solved - x).dot(solved - x) < EPSILON);

        let inv = m.sym_inverse33();
        let back = inv.mul_vec(b);
        assert!((back - x).dot(back - x) < EPSILON);

        let x2 = m.solve22(Vec2::new(b.x - 0.5 * x.z, b.y - 0.2 * x.z));
        assert!((x2 - Vec2::new(x.x, x.y)).magnitude() < 1e-9);
    }

    #[test]
    fn test_mat33_singular_solves_to_zero() {
        // Point constraint rows only, as for a static body and a fixed-rotation body.
        let m = Mat33 {
            ex: Vec3::new(1.0, 0.0, 0.0),
            ey: Vec3::new(0.0, 1.0, 0.0),
            ez: Vec3::ZERO,
        };
        assert_eq!(m.solve33(Vec3::new(1.0, 2.0, 3.0)), Vec3::ZERO);
        assert_eq!(m.sym_inverse33(), Mat33::default());
        assert_eq!(m.solve22(Vec2::new(1.0, 2.0)), Vec2::new(1.0, 2.0));

        let zero = Mat33::default();
        assert_eq!(zero.solve22(Vec2::new(1.0, 2.0)), Vec2::ZERO);
        assert_eq!(zero.inverse22(), Mat33::default());
        assert_eq!(Mat22::default().inverse(), Mat22::default());
        assert_eq!(Mat22::default().solve(Vec2::new(3.0, -1.0)), Vec2::ZERO);
    }
}
