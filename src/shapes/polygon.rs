use serde::{Deserialize, Serialize};

use crate::collision::aabb::{RayCastInput, RayCastOutput, AABB};
use crate::common::error::{PhysicsError, PhysicsResult};
use crate::common::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};
use crate::math::transform::{Rot, Transform};
use crate::math::vec2::Vec2;
use crate::shapes::MassData;

/// A convex polygon in local space with counter-clockwise winding and
/// precomputed outward edge normals.
///
/// Only the outline is serialized. Deserialization rebuilds the polygon
/// through [`Polygon::new`], so a decoded polygon is always valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolygonDef", into = "PolygonDef")]
pub struct Polygon {
    vertices: Vec<Vec2>,
    normals: Vec<Vec2>,
    centroid: Vec2,
    /// Skin radius used by the narrow phase.
    pub(crate) radius: f64,
}

/// Serialized form of a [`Polygon`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PolygonDef {
    vertices: Vec<Vec2>,
}

impl TryFrom<PolygonDef> for Polygon {
    type Error = PhysicsError;

    fn try_from(def: PolygonDef) -> PhysicsResult<Self> {
        Polygon::new(def.vertices)
    }
}

impl From<Polygon> for PolygonDef {
    fn from(p: Polygon) -> Self {
        PolygonDef { vertices: p.vertices }
    }
}

impl Polygon {
    /// Creates a validated polygon.
    ///
    /// Clockwise input is reversed. Fewer than 3 or more than
    /// [`MAX_POLYGON_VERTICES`] vertices, zero area, near-coincident vertices and
    /// non-convex outlines are rejected.
    pub fn new(vertices: Vec<Vec2>) -> PhysicsResult<Self> {
        check_vertex_count(vertices.len())?;
        if vertices.iter().any(|v| !v.is_valid()) {
            return Err(PhysicsError::DegeneratePolygon);
        }

        let mut vertices = vertices;
        if signed_area(&vertices) < 0.0 {
            vertices.reverse();
        }
        check_outline(&vertices)?;

        let count = vertices.len();
        let normals = (0..count)
            .map(|i| {
                let edge = vertices[(i + 1) % count] - vertices[i];
                Vec2::new(edge.y, -edge.x).normalize()
            })
            .collect();
        let centroid = compute_centroid(&vertices);

        Ok(Polygon {
            vertices,
            normals,
            centroid,
            radius: POLYGON_RADIUS,
        })
    }

    /// An axis-aligned box with the given half extents, centered on the body origin.
    pub fn new_box(half_width: f64, half_height: f64) -> PhysicsResult<Self> {
        Self::new_oriented_box(half_width, half_height, Vec2::ZERO, 0.0)
    }

    /// A box with half extents, rotated by `angle` and centered at `center` in body space.
    pub fn new_oriented_box(half_width: f64, half_height: f64, center: Vec2, angle: f64) -> PhysicsResult<Self> {
        let xf = Transform {
            position: center,
            rotation: Rot::new(angle),
        };
        let corners = [
            Vec2::new(-half_width, -half_height),
            Vec2::new(half_width, -half_height),
            Vec2::new(half_width, half_height),
            Vec2::new(-half_width, half_height),
        ];
        Self::new(corners.iter().map(|c| xf.apply(*c)).collect())
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Re-checks the invariants [`Polygon::new`] establishes.
    pub fn validate(&self) -> PhysicsResult<()> {
        check_vertex_count(self.vertices.len())?;
        if self.normals.len() != self.vertices.len() || self.vertices.iter().any(|v| !v.is_valid()) {
            return Err(PhysicsError::DegeneratePolygon);
        }
        check_outline(&self.vertices)?;
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(PhysicsError::InvalidRadius(self.radius));
        }
        Ok(())
    }

    /// Outward-facing unit normals; `normals()[i]` belongs to edge `i -> i + 1`.
    pub fn normals(&self) -> &[Vec2] {
        &self.normals
    }

    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Calculates the area of the polygon using the Shoelace formula.
    pub fn area(&self) -> f64 {
        signed_area(&self.vertices)
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let mut lower = xf.apply(self.vertices[0]);
        let mut upper = lower;
        for v in self.vertices.iter().skip(1) {
            let p = xf.apply(*v);
            lower = lower.min(p);
            upper = upper.max(p);
        }
        AABB {
            min: lower,
            max: upper,
        }
        .fattened(self.radius)
    }

    /// Mass, centroid and rotational inertia about the body origin.
    ///
    /// Integrates over a triangle fan rooted at the vertex average, which keeps
    /// round-off low for polygons far from the origin.
    pub fn compute_mass(&self, density: f64) -> MassData {
        let count = self.vertices.len() as f64;
        let s = self.vertices.iter().fold(Vec2::ZERO, |acc, v| acc + *v) / count;

        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;
        const INV3: f64 = 1.0 / 3.0;

        let n = self.vertices.len();
        for i in 0..n {
            let e1 = self.vertices[i] - s;
            let e2 = self.vertices[(i + 1) % n] - s;
            let d = e1.cross(e2);

            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += (e1 + e2) * (triangle_area * INV3);

            let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * INV3 * d) * (int_x2 + int_y2);
        }

        let mass = density * area;
        center = center / area;
        let world_center = center + s;
        // Shift from the fan root to the body origin.
        let inertia = density * inertia
            + mass * (world_center.magnitude_squared() - center.magnitude_squared());

        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }

    pub fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        let local = xf.apply_inverse(point);
        self.vertices
            .iter()
            .zip(&self.normals)
            .all(|(v, n)| n.dot(local - *v) <= 0.0)
    }

    /// Clips the ray against every edge half-plane.
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.rotation.apply_inverse(input.p1 - xf.position);
        let p2 = xf.rotation.apply_inverse(input.p2 - xf.position);
        let d = p2 - p1;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for (i, (v, n)) in self.vertices.iter().zip(&self.normals).enumerate() {
            let numerator = n.dot(*v - p1);
            let denominator = n.dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // Entering this half-plane.
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            normal: xf.rotation.apply(self.normals[i]),
            fraction: lower,
        })
    }
}

fn check_vertex_count(count: usize) -> PhysicsResult<()> {
    if count < 3 {
        return Err(PhysicsError::TooFewVertices(count));
    }
    if count > MAX_POLYGON_VERTICES {
        return Err(PhysicsError::TooManyVertices {
            count,
            max: MAX_POLYGON_VERTICES,
        });
    }
    Ok(())
}

/// Checks a counter-clockwise outline for positive area, vertex spacing and
/// strict convexity.
fn check_outline(vertices: &[Vec2]) -> PhysicsResult<()> {
    let count = vertices.len();
    if signed_area(vertices) <= f64::EPSILON {
        return Err(PhysicsError::DegeneratePolygon);
    }

    let slop_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
    for i in 0..count {
        let next = vertices[(i + 1) % count];
        if vertices[i].distance_squared(next) <= slop_sq {
            return Err(PhysicsError::DegeneratePolygon);
        }
    }

    // Every vertex must lie strictly left of every edge.
    for i in 0..count {
        let v1 = vertices[i];
        let edge = vertices[(i + 1) % count] - v1;
        for (j, v) in vertices.iter().enumerate() {
            if j == i || j == (i + 1) % count {
                continue;
            }
            if edge.cross(*v - v1) <= 0.0 {
                return Err(PhysicsError::NonConvexPolygon);
            }
        }
    }
    Ok(())
}

fn signed_area(vertices: &[Vec2]) -> f64 {
    let n = vertices.len();
    let mut area = 0.0;
    for i in 0..n {
        area += vertices[i].cross(vertices[(i + 1) % n]);
    }
    area * 0.5
}

fn compute_centroid(vertices: &[Vec2]) -> Vec2 {
    let origin = vertices[0];
    let mut centroid = Vec2::ZERO;
    let mut area_sum = 0.0;

    for i in 1..(vertices.len() - 1) {
        let e1 = vertices[i] - origin;
        let e2 = vertices[i + 1] - origin;
        let triangle_area = 0.5 * e1.cross(e2);
        area_sum += triangle_area;
        centroid += (e1 + e2) * (triangle_area / 3.0);
    }
    origin + centroid / area_sum
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn unit_square() -> Vec<Vec2> {
        vec![
            Vec2::new(-0.5, -0.5),
            Vec2::new(0.5, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
        ]
    }

    #[test]
    fn test_polygon_new() {
        let vertices = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)];
        let polygon = Polygon::new(vertices).expect("valid triangle");
        assert_eq!(polygon.vertex_count(), 3);
        assert_eq!(polygon.normals().len(), 3);
    }

    #[test]
    fn test_polygon_new_too_few_vertices() {
        let vertices = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)];
        assert!(matches!(Polygon::new(vertices), Err(PhysicsError::TooFewVertices(2))));
    }

    #[test]
    fn test_polygon_new_too_many_vertices() {
        let vertices = (0..9)
            .map(|i| Vec2::new(1.0, 0.0).rotate(i as f64 * std::f64::consts::TAU / 9.0))
            .collect();
        assert!(matches!(
            Polygon::new(vertices),
            Err(PhysicsError::TooManyVertices { count: 9, .. })
        ));
    }

    #[test]
    fn test_polygon_rejects_non_convex() {
        let arrow = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.5),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        assert!(matches!(Polygon::new(arrow), Err(PhysicsError::NonConvexPolygon)));
    }

    #[test]
    fn test_polygon_rejects_collinear_points() {
        let line = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(2.0, 2.0)];
        assert!(matches!(Polygon::new(line), Err(PhysicsError::DegeneratePolygon)));
    }

    #[test]
    fn test_polygon_clockwise_input_is_reordered() {
        let mut cw = unit_square();
        cw.reverse();
        let polygon = Polygon::new(cw).expect("valid square");
        assert!(polygon.area() > 0.0);
        for n in polygon.normals() {
            assert!((n.magnitude() - 1.0).abs() < EPSILON);
        }
        // The first edge of a CCW square walks +x along the bottom, so its normal points down.
        let bottom = polygon
            .normals()
            .iter()
            .any(|n| (n.y + 1.0).abs() < EPSILON);
        assert!(bottom);
    }

    #[test]
    fn test_polygon_json_goes_through_validation() {
        let json = r#"{"vertices": [{"x": 0.0, "y": 0.0}, {"x": 0.0, "y": 1.0}, {"x": 1.0, "y": 0.0}]}"#;
        let polygon: Polygon = serde_json::from_str(json).expect("valid triangle");
        // Clockwise input is rewound on the way in.
        assert!(polygon.area() > 0.0);
        assert_eq!(polygon.normals().len(), 3);

        let two = r#"{"vertices": [{"x": 0.0, "y": 0.0}, {"x": 1.0, "y": 0.0}]}"#;
        assert!(serde_json::from_str::<Polygon>(two).is_err());
        assert!(serde_json::from_str::<Polygon>(r#"{"vertices": []}"#).is_err());
    }

    #[test]
    fn test_polygon_validate_catches_tampering() {
        let mut polygon = Polygon::new(unit_square()).expect("valid");
        polygon.validate().expect("fresh polygon is valid");
        polygon.vertices.swap(0, 1);
        assert!(polygon.validate().is_err());

        let mut emptied = Polygon::new(unit_square()).expect("valid");
        emptied.vertices.clear();
        assert!(matches!(emptied.validate(), Err(PhysicsError::TooFewVertices(0))));
    }

    #[test]
    fn test_polygon_area_square() {
        let polygon = Polygon::new(unit_square()).expect("valid");
        assert!((polygon.area() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_polygon_centroid_square_offset() {
        let offset = Vec2::new(10.0, -5.0);
        let polygon = Polygon::new_oriented_box(0.5, 0.5, offset + Vec2::new(0.5, 0.5), 0.0).expect("valid");
        let expected = offset + Vec2::new(0.5, 0.5);
        assert!((polygon.centroid().x - expected.x).abs() < EPSILON);
        assert!((polygon.centroid().y - expected.y).abs() < EPSILON);
    }

    #[test]
    fn test_polygon_centroid_triangle() {
        let vertices = vec![Vec2::new(0.0, 0.0), Vec2::new(3.0, 0.0), Vec2::new(0.0, 3.0)];
        let polygon = Polygon::new(vertices).expect("valid");
        assert!((polygon.centroid().x - 1.0).abs() < EPSILON);
        assert!((polygon.centroid().y - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_polygon_mass_square_centered() {
        let polygon = Polygon::new(unit_square()).expect("valid");
        let md = polygon.compute_mass(1.0);
        assert!((md.mass - 1.0).abs() < EPSILON);
        // Rectangle about its centroid: m (w^2 + h^2) / 12.
        assert!((md.inertia - 1.0 / 6.0).abs() < EPSILON);
    }

    #[test]
    fn test_polygon_mass_square_offset() {
        let center = Vec2::new(10.0, 0.0);
        let polygon = Polygon::new_oriented_box(0.5, 0.5, center, 0.3).expect("valid");
        let md = polygon.compute_mass(2.0);
        assert!((md.mass - 2.0).abs() < EPSILON);
        assert!((md.center.x - 10.0).abs() < EPSILON);
        // About the body origin: I_c + m d^2.
        let expected = 2.0 / 6.0 + 2.0 * 100.0;
        assert!((md.inertia - expected).abs() < 1e-6);
    }

    #[test]
    fn test_polygon_test_point() {
        let polygon = Polygon::new_box(1.0, 1.0).expect("valid");
        let xf = Transform::new(Vec2::new(5.0, 0.0), std::f64::consts::FRAC_PI_4);
        assert!(polygon.test_point(&xf, Vec2::new(5.0, 1.3)));
        assert!(!polygon.test_point(&xf, Vec2::new(6.0, 1.0)));
    }

    #[test]
    fn test_polygon_ray_cast() {
        let polygon = Polygon::new_box(1.0, 1.0).expect("valid");
        let input = RayCastInput {
            p1: Vec2::new(-5.0, 0.0),
            p2: Vec2::new(5.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = polygon.ray_cast(&input, &Transform::identity()).expect("hit");
        assert!((hit.fraction - 0.4).abs() < EPSILON);
        assert!((hit.normal.x + 1.0).abs() < EPSILON);

        let from_inside = RayCastInput {
            p1: Vec2::ZERO,
            p2: Vec2::new(5.0, 0.0),
            max_fraction: 1.0,
        };
        assert!(polygon.ray_cast(&from_inside, &Transform::identity()).is_none());
    }
}
