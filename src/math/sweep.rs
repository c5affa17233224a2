use super::transform::{Rot, Transform};
use super::vec2::Vec2;
use std::f64::consts::PI;

/// Describes the motion of a body over one time step for continuous collision.
/// Positions are of the center of mass; `local_center` converts back to the
/// body origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sweep {
    pub local_center: Vec2,
    /// Center of mass at the start of the sweep interval.
    pub c0: Vec2,
    /// Center of mass at the end of the step.
    pub c: Vec2,
    pub a0: f64,
    pub a: f64,
    /// Fraction of the current step already consumed; `c0`/`a0` correspond to it.
    pub alpha0: f64,
}

impl Sweep {
    /// Interpolated body transform at `beta` in `[0, 1]` of the remaining interval.
    pub fn transform_at(&self, beta: f64) -> Transform {
        let c = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = self.a0 * (1.0 - beta) + self.a * beta;
        let rotation = Rot::new(angle);
        Transform {
            position: c - rotation.apply(self.local_center),
            rotation,
        }
    }

    /// Moves the start of the sweep forward to `alpha`.
    pub fn advance(&mut self, alpha: f64) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Shifts both angles into `[-PI, PI]` around `a0` to keep the root finder stable.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-10;

    fn moving_sweep() -> Sweep {
        Sweep {
            local_center: Vec2::new(0.5, 0.0),
            c0: Vec2::new(0.0, 0.0),
            c: Vec2::new(4.0, 2.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        }
    }

    #[test]
    fn test_sweep_endpoints() {
        let sweep = moving_sweep();
        let start = sweep.transform_at(0.0);
        let end = sweep.transform_at(1.0);
        // The center of mass is the body origin plus the rotated local center.
        assert!((start.apply(sweep.local_center) - sweep.c0).magnitude() < EPSILON);
        assert!((end.apply(sweep.local_center) - sweep.c).magnitude() < EPSILON);
        assert!((end.rotation.angle() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_sweep_advance_keeps_endpoint() {
        let mut sweep = moving_sweep();
        let mid = sweep.transform_at(0.5);
        sweep.advance(0.5);
        assert!((sweep.alpha0 - 0.5).abs() < EPSILON);
        let start = sweep.transform_at(0.0);
        assert!((start.position - mid.position).magnitude() < EPSILON);
        assert!((sweep.c - Vec2::new(4.0, 2.0)).magnitude() < EPSILON);
    }

    #[test]
    fn test_sweep_normalize() {
        let mut sweep = Sweep {
            a0: 7.0,
            a: 7.5,
            ..moving_sweep()
        };
        sweep.normalize();
        assert!(sweep.a0 >= 0.0 && sweep.a0 < 2.0 * PI);
        assert!((sweep.a - sweep.a0 - 0.5).abs() < EPSILON);
    }
}
