//! Sequential impulse solver for contact constraints.
//!
//! Velocity constraints are solved with accumulated, clamped impulses. Two-point
//! manifolds use a block solver that treats both normal impulses as one small LCP.
//! Penetration left over after integration is removed by a non-linear
//! Gauss-Seidel position pass.

use slotmap::SlotMap;

use crate::collision::manifold::{Manifold, ManifoldType, WorldManifold};
use crate::common::settings::{WorldSettings, LINEAR_SLOP, MAX_MANIFOLD_POINTS};
use crate::integration::{Position, TimeStep, Velocity};
use crate::math::matrix::Mat22;
use crate::math::transform::{Rot, Transform};
use crate::math::vec2::Vec2;
use crate::objects::{Body, BodyHandle, ContactHandle, Fixture, FixtureHandle};
use crate::world::contact::Contact;

/// Ill-conditioned two-point manifolds fall back to single point solving.
const MAX_CONDITION_NUMBER: f64 = 1000.0;

/// Impulses applied at each manifold point during the last solve, reported to
/// [`ContactListener::post_solve`](crate::world::ContactListener::post_solve).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactImpulse {
    pub normal_impulses: [f64; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f64; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f64,
    tangent_impulse: f64,
    normal_mass: f64,
    tangent_mass: f64,
    velocity_bias: f64,
}

#[derive(Debug, Clone, Copy)]
struct BodyTerms {
    index: usize,
    inv_mass: f64,
    inv_inertia: f64,
    local_center: Vec2,
}

impl BodyTerms {
    fn of(body: &Body) -> Self {
        BodyTerms {
            index: body.island_index,
            inv_mass: body.inv_mass,
            inv_inertia: body.inv_inertia,
            local_center: body.sweep.local_center,
        }
    }

    fn transform(&self, position: &Position) -> Transform {
        let rotation = Rot::new(position.a);
        Transform {
            position: position.c - rotation.apply(self.local_center),
            rotation,
        }
    }
}

#[derive(Debug, Clone)]
struct ContactConstraint {
    contact: ContactHandle,
    manifold: Manifold,
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    point_count: usize,
    normal: Vec2,
    normal_mass: Mat22,
    k: Mat22,
    body_a: BodyTerms,
    body_b: BodyTerms,
    radius_a: f64,
    radius_b: f64,
    friction: f64,
    restitution: f64,
    tangent_speed: f64,
}

/// Contact point evaluated for position correction.
struct SeparationPoint {
    normal: Vec2,
    point: Vec2,
    separation: f64,
}

fn separation_point(
    constraint: &ContactConstraint,
    xf_a: &Transform,
    xf_b: &Transform,
    index: usize,
) -> SeparationPoint {
    let manifold = &constraint.manifold;
    let radii = constraint.radius_a + constraint.radius_b;
    match manifold.kind {
        ManifoldType::Circles => {
            let point_a = xf_a.apply(manifold.local_point);
            let point_b = xf_b.apply(manifold.points[0].local_point);
            let normal = (point_b - point_a).normalize();
            SeparationPoint {
                normal,
                point: (point_a + point_b) * 0.5,
                separation: (point_b - point_a).dot(normal) - radii,
            }
        }
        ManifoldType::FaceA => {
            let normal = xf_a.rotation.apply(manifold.local_normal);
            let plane_point = xf_a.apply(manifold.local_point);
            let clip_point = xf_b.apply(manifold.points[index].local_point);
            SeparationPoint {
                normal,
                point: clip_point,
                separation: (clip_point - plane_point).dot(normal) - radii,
            }
        }
        ManifoldType::FaceB => {
            let normal = xf_b.rotation.apply(manifold.local_normal);
            let plane_point = xf_b.apply(manifold.local_point);
            let clip_point = xf_a.apply(manifold.points[index].local_point);
            // Keep the normal pointing from A to B.
            SeparationPoint {
                normal: -normal,
                point: clip_point,
                separation: (clip_point - plane_point).dot(normal) - radii,
            }
        }
    }
}

/// Solver state for the contacts of one island.
#[derive(Debug, Default)]
pub struct ContactSolver {
    constraints: Vec<ContactConstraint>,
}

impl ContactSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the island's contacts into solver constraints. Bodies must already
    /// carry their island index.
    pub(crate) fn init(
        &mut self,
        step: TimeStep,
        island_contacts: &[ContactHandle],
        contacts: &SlotMap<ContactHandle, Contact>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        bodies: &SlotMap<BodyHandle, Body>,
    ) {
        self.constraints.clear();

        for &handle in island_contacts {
            let Some(contact) = contacts.get(handle) else {
                continue;
            };
            let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
            else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
                continue;
            };
            debug_assert!(contact.manifold.point_count > 0);

            let mut points = [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS];
            for (vcp, mp) in points.iter_mut().zip(contact.manifold.points()) {
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * mp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * mp.tangent_impulse;
                }
            }

            self.constraints.push(ContactConstraint {
                contact: handle,
                manifold: contact.manifold,
                points,
                point_count: contact.manifold.point_count,
                normal: Vec2::ZERO,
                normal_mass: Mat22::default(),
                k: Mat22::default(),
                body_a: BodyTerms::of(body_a),
                body_b: BodyTerms::of(body_b),
                radius_a: fixture_a.shape.radius(),
                radius_b: fixture_b.shape.radius(),
                friction: contact.friction,
                restitution: contact.restitution,
                tangent_speed: contact.tangent_speed,
            });
        }
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Computes anchors, effective masses and restitution bias from the
    /// current positions and velocities.
    pub fn initialize_velocity_constraints(
        &mut self,
        positions: &[Position],
        velocities: &[Velocity],
        settings: &WorldSettings,
    ) {
        for vc in &mut self.constraints {
            let (a, b) = (vc.body_a, vc.body_b);
            let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);

            let c_a = positions[a.index].c;
            let c_b = positions[b.index].c;
            let Velocity { v: v_a, w: w_a } = velocities[a.index];
            let Velocity { v: v_b, w: w_b } = velocities[b.index];

            let xf_a = a.transform(&positions[a.index]);
            let xf_b = b.transform(&positions[b.index]);
            let wm = WorldManifold::new(&vc.manifold, &xf_a, vc.radius_a, &xf_b, vc.radius_b);

            vc.normal = wm.normal;
            let tangent = vc.normal.cross_scalar(1.0);

            for (j, vcp) in vc.points[..vc.point_count].iter_mut().enumerate() {
                vcp.r_a = wm.points[j] - c_a;
                vcp.r_b = wm.points[j] - c_b;

                let rn_a = vcp.r_a.cross(vc.normal);
                let rn_b = vcp.r_b.cross(vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = vcp.r_a.cross(tangent);
                let rt_b = vcp.r_b.cross(tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Restitution only kicks in above the threshold so resting stacks stay put.
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    v_b + Vec2::scalar_cross(w_b, vcp.r_b) - v_a - Vec2::scalar_cross(w_a, vcp.r_a),
                );
                if v_rel < -settings.velocity_threshold {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            if vc.point_count == 2 {
                let (p1, p2) = (vc.points[0], vc.points[1]);
                let rn1_a = p1.r_a.cross(vc.normal);
                let rn1_b = p1.r_b.cross(vc.normal);
                let rn2_a = p2.r_a.cross(vc.normal);
                let rn2_b = p2.r_b.cross(vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Mat22::new(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = vc.k.inverse();
                } else {
                    // Nearly redundant constraints, keep only the first point.
                    vc.point_count = 1;
                }
            }
        }
    }

    /// Applies last frame's impulses as a starting guess.
    pub fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.constraints {
            let (a, b) = (vc.body_a, vc.body_b);
            let tangent = vc.normal.cross_scalar(1.0);
            let mut va = velocities[a.index];
            let mut vb = velocities[b.index];

            for vcp in &vc.points[..vc.point_count] {
                let p = vc.normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                va.w -= a.inv_inertia * vcp.r_a.cross(p);
                va.v -= p * a.inv_mass;
                vb.w += b.inv_inertia * vcp.r_b.cross(p);
                vb.v += p * b.inv_mass;
            }

            velocities[a.index] = va;
            velocities[b.index] = vb;
        }
    }

    /// One Gauss-Seidel sweep over all contacts: friction first, then normal impulses.
    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.constraints {
            let (a, b) = (vc.body_a, vc.body_b);
            let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);
            let Velocity { v: mut v_a, w: mut w_a } = velocities[a.index];
            let Velocity { v: mut v_b, w: mut w_b } = velocities[b.index];

            let normal = vc.normal;
            let tangent = normal.cross_scalar(1.0);

            // Friction is solved first because non-penetration matters more.
            for vcp in &mut vc.points[..vc.point_count] {
                let dv = v_b + Vec2::scalar_cross(w_b, vcp.r_b) - v_a - Vec2::scalar_cross(w_a, vcp.r_a);
                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * (-vt);

                let max_friction = vc.friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = tangent * lambda;
                v_a -= p * m_a;
                w_a -= i_a * vcp.r_a.cross(p);
                v_b += p * m_b;
                w_b += i_b * vcp.r_b.cross(p);
            }

            if vc.point_count == 1 {
                let vcp = &mut vc.points[0];
                let dv = v_b + Vec2::scalar_cross(w_b, vcp.r_b) - v_a - Vec2::scalar_cross(w_a, vcp.r_a);
                let vn = dv.dot(normal);
                let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;

                let p = normal * lambda;
                v_a -= p * m_a;
                w_a -= i_a * vcp.r_a.cross(p);
                v_b += p * m_b;
                w_b += i_b * vcp.r_b.cross(p);
            } else {
                // Block solver. Solves the 2x2 mixed LCP
                //   vn = K * x + b, vn >= 0, x >= 0, vn_i * x_i = 0
                // by enumerating the four complementarity cases.
                let (cp1, cp2) = (vc.points[0], vc.points[1]);
                let a_old = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);
                debug_assert!(a_old.x >= 0.0 && a_old.y >= 0.0);

                let dv1 = v_b + Vec2::scalar_cross(w_b, cp1.r_b) - v_a - Vec2::scalar_cross(w_a, cp1.r_a);
                let dv2 = v_b + Vec2::scalar_cross(w_b, cp2.r_b) - v_a - Vec2::scalar_cross(w_a, cp2.r_a);
                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let b_vec = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias) - vc.k.mul_vec(a_old);

                let candidates = [
                    // Both points active.
                    -vc.normal_mass.mul_vec(b_vec),
                    // Only the first point active.
                    Vec2::new(-cp1.normal_mass * b_vec.x, 0.0),
                    // Only the second point active.
                    Vec2::new(0.0, -cp2.normal_mass * b_vec.y),
                    // Neither point active.
                    Vec2::ZERO,
                ];

                let solution = candidates.into_iter().enumerate().find_map(|(case, x)| {
                    let feasible = match case {
                        0 => x.x >= 0.0 && x.y >= 0.0,
                        1 => x.x >= 0.0 && vc.k.ex.y * x.x + b_vec.y >= 0.0,
                        2 => x.y >= 0.0 && vc.k.ey.x * x.y + b_vec.x >= 0.0,
                        _ => b_vec.x >= 0.0 && b_vec.y >= 0.0,
                    };
                    feasible.then_some(x)
                });

                // No feasible case means a degenerate configuration; keep the old impulses.
                if let Some(x) = solution {
                    let d = x - a_old;
                    let p1 = normal * d.x;
                    let p2 = normal * d.y;
                    v_a -= (p1 + p2) * m_a;
                    w_a -= i_a * (cp1.r_a.cross(p1) + cp2.r_a.cross(p2));
                    v_b += (p1 + p2) * m_b;
                    w_b += i_b * (cp1.r_b.cross(p1) + cp2.r_b.cross(p2));

                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                }
            }

            velocities[a.index] = Velocity { v: v_a, w: w_a };
            velocities[b.index] = Velocity { v: v_b, w: w_b };
        }
    }

    /// Writes accumulated impulses back to the contacts' manifolds for warm starting.
    pub(crate) fn store_impulses(&self, contacts: &mut SlotMap<ContactHandle, Contact>) {
        for vc in &self.constraints {
            let Some(contact) = contacts.get_mut(vc.contact) else {
                continue;
            };
            for (mp, vcp) in contact.manifold.points_mut().iter_mut().zip(&vc.points[..vc.point_count]) {
                mp.normal_impulse = vcp.normal_impulse;
                mp.tangent_impulse = vcp.tangent_impulse;
            }
        }
    }

    /// Impulses per contact, in island order.
    pub(crate) fn impulses(&self) -> impl Iterator<Item = (ContactHandle, ContactImpulse)> + '_ {
        self.constraints.iter().map(|vc| {
            let mut impulse = ContactImpulse {
                count: vc.point_count,
                ..Default::default()
            };
            for (j, vcp) in vc.points[..vc.point_count].iter().enumerate() {
                impulse.normal_impulses[j] = vcp.normal_impulse;
                impulse.tangent_impulses[j] = vcp.tangent_impulse;
            }
            (vc.contact, impulse)
        })
    }

    /// Pushes overlapping bodies apart. Returns true when the deepest remaining
    /// penetration is within tolerance.
    pub fn solve_position_constraints(&self, positions: &mut [Position], settings: &WorldSettings) -> bool {
        let min_separation = self.solve_positions(positions, settings.baumgarte, settings.max_linear_correction, None);
        min_separation >= -3.0 * LINEAR_SLOP
    }

    /// Position pass for a TOI sub-step. Only the two TOI bodies move, everything
    /// else in the sub-island is treated as static.
    pub fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        settings: &WorldSettings,
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let min_separation = self.solve_positions(
            positions,
            settings.toi_baumgarte,
            settings.max_linear_correction,
            Some((toi_index_a, toi_index_b)),
        );
        min_separation >= -1.5 * LINEAR_SLOP
    }

    fn solve_positions(
        &self,
        positions: &mut [Position],
        baumgarte: f64,
        max_correction: f64,
        toi_bodies: Option<(usize, usize)>,
    ) -> f64 {
        let movable = |index: usize| match toi_bodies {
            Some((ta, tb)) => index == ta || index == tb,
            None => true,
        };

        let mut min_separation: f64 = 0.0;

        for pc in &self.constraints {
            let (a, b) = (pc.body_a, pc.body_b);
            let (m_a, i_a) = if movable(a.index) { (a.inv_mass, a.inv_inertia) } else { (0.0, 0.0) };
            let (m_b, i_b) = if movable(b.index) { (b.inv_mass, b.inv_inertia) } else { (0.0, 0.0) };

            let mut pos_a = positions[a.index];
            let mut pos_b = positions[b.index];

            for j in 0..pc.manifold.point_count {
                let xf_a = a.transform(&pos_a);
                let xf_b = b.transform(&pos_b);
                let sp = separation_point(pc, &xf_a, &xf_b, j);

                let r_a = sp.point - pos_a.c;
                let r_b = sp.point - pos_b.c;

                min_separation = min_separation.min(sp.separation);

                // Prevent large corrections and allow slop.
                let c = (baumgarte * (sp.separation + LINEAR_SLOP)).clamp(-max_correction, 0.0);

                let rn_a = r_a.cross(sp.normal);
                let rn_b = r_b.cross(sp.normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = sp.normal * impulse;

                pos_a.c -= p * m_a;
                pos_a.a -= i_a * r_a.cross(p);
                pos_b.c += p * m_b;
                pos_b.a += i_b * r_b.cross(p);
            }

            positions[a.index] = pos_a;
            positions[b.index] = pos_b;
        }

        min_separation
    }
}
