//! Time of impact between two moving convex shapes.
//!
//! Conservative advancement on a separating axis: GJK supplies the closest
//! features at the current time, a separation function built from them is
//! driven to the target distance with a mixed secant/bisection root finder,
//! and the process repeats until the shapes touch or provably stay apart.

use log::warn;

use crate::collision::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::common::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, MAX_TOI_ITERATIONS};
use crate::math::sweep::Sweep;
use crate::math::vec2::Vec2;

const MAX_ROOT_ITERATIONS: usize = 50;

pub struct ToiInput<'a> {
    pub proxy_a: &'a DistanceProxy,
    pub proxy_b: &'a DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Upper bound of the sweep interval, usually 1.
    pub t_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToiState {
    Unknown,
    Failed,
    Overlapped,
    Touching,
    Separated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    /// Builds the separating axis from the GJK simplex at time `t1`.
    fn new(cache: &SimplexCache, proxy_a: &'a DistanceProxy, sweep_a: Sweep, proxy_b: &'a DistanceProxy, sweep_b: Sweep, t1: f64) -> Self {
        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        let mut f = SeparationFunction {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        if cache.count == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            f.axis = (point_b - point_a).normalize();
        } else if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A.
            f.kind = SeparationKind::FaceB;
            let b1 = proxy_b.vertex(cache.index_b[0]);
            let b2 = proxy_b.vertex(cache.index_b[1]);
            f.axis = (b2 - b1).cross_scalar(1.0).normalize();
            let normal = xf_b.rotation.apply(f.axis);
            f.local_point = (b1 + b2) * 0.5;
            let point_b = xf_b.apply(f.local_point);
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        } else {
            // Two points on A and one or two points on B.
            f.kind = SeparationKind::FaceA;
            let a1 = proxy_a.vertex(cache.index_a[0]);
            let a2 = proxy_a.vertex(cache.index_a[1]);
            f.axis = (a2 - a1).cross_scalar(1.0).normalize();
            let normal = xf_a.rotation.apply(f.axis);
            f.local_point = (a1 + a2) * 0.5;
            let point_a = xf_a.apply(f.local_point);
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            if (point_b - point_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        }
        f
    }

    /// Deepest points along the axis at time `t`: `(separation, index_a, index_b)`.
    fn find_min_separation(&self, t: f64) -> (f64, usize, usize) {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let axis_a = xf_a.rotation.apply_inverse(self.axis);
                let axis_b = xf_b.rotation.apply_inverse(-self.axis);
                let index_a = self.proxy_a.support(axis_a);
                let index_b = self.proxy_b.support(axis_b);
                (self.evaluate(index_a, index_b, t), index_a, index_b)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.rotation.apply(self.axis);
                let axis_b = xf_b.rotation.apply_inverse(-normal);
                let index_b = self.proxy_b.support(axis_b);
                (self.evaluate(0, index_b, t), 0, index_b)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.rotation.apply(self.axis);
                let axis_a = xf_a.rotation.apply_inverse(-normal);
                let index_a = self.proxy_a.support(axis_a);
                (self.evaluate(index_a, 0, t), index_a, 0)
            }
        }
    }

    /// Separation of the given features at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f64) -> f64 {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.rotation.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.rotation.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Computes the upper bound on time before two shapes penetrate. Time is
/// expressed as a fraction of `[0, t_max]`.
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: input.t_max,
    };

    let proxy_a = input.proxy_a;
    let proxy_b = input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;
    // Large rotations make the root finder struggle.
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;
    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0;
    let mut iter = 0;
    let mut cache = SimplexCache::default();

    loop {
        let distance_input = DistanceInput {
            proxy_a,
            proxy_b,
            transform_a: sweep_a.transform_at(t1),
            transform_b: sweep_b.transform_at(t1),
            use_radii: false,
        };
        // Closest features at t1, without radii.
        let distance_output = distance(&mut cache, &distance_input);

        if distance_output.distance <= 0.0 {
            output.state = ToiState::Overlapped;
            output.t = 0.0;
            break;
        }

        if distance_output.distance < target + tolerance {
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest point, pushing the separation back each time a
        // new deepest point appears. At most one push-back per vertex.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iter = 0;
        loop {
            let (mut s2, index_a, index_b) = fcn.find_min_separation(t2);

            // Final configuration is separated.
            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            // Separation reaches the target: advance the sweep.
            if s2 > target - tolerance {
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            // Initial separation already below target: the root finder cannot help.
            if s1 < target - tolerance {
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // 1D root of f(t) - target = 0 on [t1, t2].
            let mut root_iter = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                // Alternate secant and bisection for guaranteed progress.
                let t = if root_iter & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iter += 1;

                let s = fcn.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iter == MAX_ROOT_ITERATIONS {
                    break;
                }
            }

            push_back_iter += 1;
            if push_back_iter == MAX_POLYGON_VERTICES {
                break;
            }
        }

        iter += 1;

        if done {
            break;
        }

        if iter == MAX_TOI_ITERATIONS {
            // Root finder got stuck; report the best known safe time.
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    if output.state == ToiState::Failed {
        warn!("time of impact did not converge after {} iterations, t = {}", iter, output.t);
    }
    output
}
