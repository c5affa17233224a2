use crate::common::settings::MAX_MANIFOLD_POINTS;
use crate::math::transform::Transform;
use crate::math::vec2::Vec2;

/// Whether a contact feature is a vertex or a face of its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContactFeatureType {
    #[default]
    Vertex,
    Face,
}

/// The features that intersect to form a contact point. Two points with equal ids
/// in consecutive frames are the same physical contact, which is what lets the
/// solver warm start from last frame's impulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContactId {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: ContactFeatureType,
    pub type_b: ContactFeatureType,
}

impl ContactId {
    /// Same features seen from the other shape.
    pub fn flipped(self) -> ContactId {
        ContactId {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// A contact point belonging to a manifold.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldPoint {
    /// Meaning depends on the manifold kind:
    /// `Circles` - local center of circle B,
    /// `FaceA` - local center of circle B or the clip point of polygon B,
    /// `FaceB` - the clip point of polygon A.
    pub local_point: Vec2,
    /// Accumulated non-penetration impulse.
    pub normal_impulse: f64,
    /// Accumulated friction impulse.
    pub tangent_impulse: f64,
    pub id: ContactId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// Contact points for two touching convex shapes, stored in local coordinates so
/// that the manifold stays valid while the bodies move between solver iterations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Not used for `Circles`.
    pub local_normal: Vec2,
    /// `Circles` - center of circle A, `FaceA`/`FaceB` - center of the reference face.
    pub local_point: Vec2,
    pub kind: ManifoldType,
    pub point_count: usize,
}

impl Manifold {
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.point_count]
    }

    /// Copies accumulated impulses from `old` into points whose id matches.
    /// Unmatched points start from zero.
    pub fn carry_impulses_from(&mut self, old: &Manifold) {
        for point in self.points_mut() {
            point.normal_impulse = 0.0;
            point.tangent_impulse = 0.0;
            if let Some(previous) = old.points().iter().find(|p| p.id == point.id) {
                point.normal_impulse = previous.normal_impulse;
                point.tangent_impulse = previous.tangent_impulse;
            }
        }
    }
}

/// A manifold evaluated in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldManifold {
    /// Points from A to B.
    pub normal: Vec2,
    /// Midpoints between the two surfaces.
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when overlapping.
    pub separations: [f64; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    pub fn new(manifold: &Manifold, xf_a: &Transform, radius_a: f64, xf_b: &Transform, radius_b: f64) -> Self {
        let mut wm = WorldManifold::default();
        wm.initialize(manifold, xf_a, radius_a, xf_b, radius_b);
        wm
    }

    pub fn initialize(&mut self, manifold: &Manifold, xf_a: &Transform, radius_a: f64, xf_b: &Transform, radius_b: f64) {
        if manifold.point_count == 0 {
            return;
        }

        match manifold.kind {
            ManifoldType::Circles => {
                self.normal = Vec2::new(1.0, 0.0);
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                if point_a.distance_squared(point_b) > f64::EPSILON * f64::EPSILON {
                    self.normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + self.normal * radius_a;
                let c_b = point_b - self.normal * radius_b;
                self.points[0] = (c_a + c_b) * 0.5;
                self.separations[0] = (c_b - c_a).dot(self.normal);
            }
            ManifoldType::FaceA => {
                self.normal = xf_a.rotation.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = xf_b.apply(mp.local_point);
                    let c_a = clip_point + self.normal * (radius_a - (clip_point - plane_point).dot(self.normal));
                    let c_b = clip_point - self.normal * radius_b;
                    self.points[i] = (c_a + c_b) * 0.5;
                    self.separations[i] = (c_b - c_a).dot(self.normal);
                }
            }
            ManifoldType::FaceB => {
                let normal = xf_b.rotation.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = xf_a.apply(mp.local_point);
                    let c_b = clip_point + normal * (radius_b - (clip_point - plane_point).dot(normal));
                    let c_a = clip_point - normal * radius_a;
                    self.points[i] = (c_a + c_b) * 0.5;
                    self.separations[i] = (c_a - c_b).dot(normal);
                }
                // Ensure normal points from A to B.
                self.normal = -normal;
            }
        }
    }
}
