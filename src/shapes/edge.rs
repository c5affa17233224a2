use serde::{Deserialize, Serialize};

use crate::collision::aabb::{RayCastInput, RayCastOutput, AABB};
use crate::common::error::{PhysicsError, PhysicsResult};
use crate::common::settings::{LINEAR_SLOP, POLYGON_RADIUS};
use crate::math::transform::Transform;
use crate::math::vec2::Vec2;
use crate::shapes::MassData;

/// A two-sided line segment. Edges have no mass and only collide with circles
/// and polygons.
///
/// The optional ghost vertices `vertex0` (before `v1`) and `vertex3` (after
/// `v2`) describe neighbouring segments. The narrow phase uses them to keep
/// shapes from catching on the shared corners of connected edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EdgeDef", into = "EdgeDef")]
pub struct Edge {
    pub(crate) v1: Vec2,
    pub(crate) v2: Vec2,
    pub(crate) vertex0: Option<Vec2>,
    pub(crate) vertex3: Option<Vec2>,
    pub(crate) radius: f64,
}

/// Serialized form of an [`Edge`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct EdgeDef {
    v1: Vec2,
    v2: Vec2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vertex0: Option<Vec2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vertex3: Option<Vec2>,
}

impl TryFrom<EdgeDef> for Edge {
    type Error = PhysicsError;

    fn try_from(def: EdgeDef) -> PhysicsResult<Self> {
        let edge = Edge {
            vertex0: def.vertex0,
            vertex3: def.vertex3,
            ..Edge::new(def.v1, def.v2)?
        };
        edge.validate()?;
        Ok(edge)
    }
}

impl From<Edge> for EdgeDef {
    fn from(e: Edge) -> Self {
        EdgeDef {
            v1: e.v1,
            v2: e.v2,
            vertex0: e.vertex0,
            vertex3: e.vertex3,
        }
    }
}

impl Edge {
    pub fn new(v1: Vec2, v2: Vec2) -> PhysicsResult<Self> {
        let edge = Self {
            v1,
            v2,
            vertex0: None,
            vertex3: None,
            radius: POLYGON_RADIUS,
        };
        edge.validate()?;
        Ok(edge)
    }

    /// Connects the edge to a neighbouring vertex that precedes `v1`.
    pub fn with_vertex0(mut self, vertex0: Vec2) -> PhysicsResult<Self> {
        self.vertex0 = Some(vertex0);
        self.validate()?;
        Ok(self)
    }

    /// Connects the edge to a neighbouring vertex that follows `v2`.
    pub fn with_vertex3(mut self, vertex3: Vec2) -> PhysicsResult<Self> {
        self.vertex3 = Some(vertex3);
        self.validate()?;
        Ok(self)
    }

    pub fn v1(&self) -> Vec2 {
        self.v1
    }

    pub fn v2(&self) -> Vec2 {
        self.v2
    }

    pub fn vertex0(&self) -> Option<Vec2> {
        self.vertex0
    }

    pub fn vertex3(&self) -> Option<Vec2> {
        self.vertex3
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        let ghosts_valid = self.vertex0.map_or(true, Vec2::is_valid) && self.vertex3.map_or(true, Vec2::is_valid);
        if !(self.v1.is_valid() && self.v2.is_valid() && ghosts_valid)
            || self.v1.distance_squared(self.v2) <= LINEAR_SLOP * LINEAR_SLOP
        {
            return Err(PhysicsError::DegenerateEdge);
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(PhysicsError::InvalidRadius(self.radius));
        }
        Ok(())
    }

    /// Calculates the length of the edge.
    pub fn length(&self) -> f64 {
        self.v1.distance(self.v2)
    }

    /// Returns the direction vector of the edge (from v1 to v2).
    pub fn direction(&self) -> Vec2 {
        self.v2 - self.v1
    }

    /// Unit normal on the right of `v1 -> v2`.
    pub fn normal(&self) -> Vec2 {
        let e = self.direction();
        Vec2::new(e.y, -e.x).normalize()
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let a = xf.apply(self.v1);
        let b = xf.apply(self.v2);
        AABB::new(a, b).fattened(self.radius)
    }

    pub fn compute_mass(&self) -> MassData {
        MassData {
            mass: 0.0,
            center: (self.v1 + self.v2) * 0.5,
            inertia: 0.0,
        }
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.rotation.apply_inverse(input.p1 - xf.position);
        let p2 = xf.rotation.apply_inverse(input.p2 - xf.position);
        let d = p2 - p1;

        let normal = self.normal();
        let numerator = normal.dot(self.v1 - p1);
        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + d * t;
        let r = self.direction();
        let rr = r.magnitude_squared();
        if rr == 0.0 {
            return None;
        }
        let s = (q - self.v1).dot(r) / rr;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        let world_normal = xf.rotation.apply(normal);
        Some(RayCastOutput {
            normal: if numerator > 0.0 { -world_normal } else { world_normal },
            fraction: t,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_edge_new_and_length() {
        let e = Edge::new(Vec2::new(1.0, 2.0), Vec2::new(4.0, 6.0)).expect("valid edge");
        assert!((e.length() - 5.0).abs() < EPSILON);
        assert_eq!(e.direction(), Vec2::new(3.0, 4.0));
        assert_eq!(e.radius, POLYGON_RADIUS);
    }

    #[test]
    fn test_edge_rejects_coincident_points() {
        let p = Vec2::new(1.0, 1.0);
        assert!(matches!(Edge::new(p, p), Err(PhysicsError::DegenerateEdge)));
    }

    #[test]
    fn test_edge_json_goes_through_validation() {
        let e: Edge = serde_json::from_str(r#"{"v1": {"x": 0.0, "y": 0.0}, "v2": {"x": 2.0, "y": 0.0}}"#)
            .expect("valid edge");
        assert_eq!(e.radius(), POLYGON_RADIUS);
        assert_eq!(e.vertex0(), None);

        let zero_length = r#"{"v1": {"x": 1.0, "y": 1.0}, "v2": {"x": 1.0, "y": 1.0}}"#;
        assert!(serde_json::from_str::<Edge>(zero_length).is_err());
    }

    #[test]
    fn test_edge_ghost_vertices_survive_serde() {
        let e = Edge::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0))
            .and_then(|e| e.with_vertex0(Vec2::new(-1.0, 0.0)))
            .and_then(|e| e.with_vertex3(Vec2::new(2.0, 0.5)))
            .expect("valid edge");
        let json = serde_json::to_string(&e).expect("serialize");
        let back: Edge = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, e);
        assert!(e.with_vertex3(Vec2::new(f64::NAN, 0.0)).is_err());
    }

    #[test]
    fn test_edge_has_no_mass() {
        let e = Edge::new(Vec2::new(-1.0, 0.0), Vec2::new(3.0, 0.0)).expect("valid edge");
        let md = e.compute_mass();
        assert_eq!(md.mass, 0.0);
        assert_eq!(md.center, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_edge_ray_cast_from_both_sides() {
        let e = Edge::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)).expect("valid edge");
        let xf = Transform::identity();
        let down = RayCastInput {
            p1: Vec2::new(0.0, 2.0),
            p2: Vec2::new(0.0, -2.0),
            max_fraction: 1.0,
        };
        let hit = e.ray_cast(&down, &xf).expect("hit from above");
        assert!((hit.fraction - 0.5).abs() < EPSILON);
        assert!((hit.normal.y - 1.0).abs() < EPSILON);

        let up = RayCastInput {
            p1: Vec2::new(0.0, -2.0),
            p2: Vec2::new(0.0, 2.0),
            max_fraction: 1.0,
        };
        let hit = e.ray_cast(&up, &xf).expect("hit from below");
        assert!((hit.normal.y + 1.0).abs() < EPSILON);
    }
}
