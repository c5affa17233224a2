//! Narrow-phase manifold generation for every supported shape pair.
//!
//! Each routine takes shape A in the canonical pair order (see
//! [`crate::world::contact`]) and returns a manifold with zero points when the
//! shapes are separated by more than their combined skin radius.

use crate::collision::manifold::{ContactFeatureType, ContactId, Manifold, ManifoldType};
use crate::common::settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_MANIFOLD_POINTS, MAX_POLYGON_VERTICES};
use crate::math::transform::Transform;
use crate::math::vec2::Vec2;
use crate::shapes::{Circle, Edge, Polygon};

/// Borrowed convex outline of a polygon, as seen by the clipping routines.
#[derive(Debug, Clone, Copy)]
struct ConvexOutline<'a> {
    vertices: &'a [Vec2],
    normals: &'a [Vec2],
    radius: f64,
}

impl<'a> From<&'a Polygon> for ConvexOutline<'a> {
    fn from(p: &'a Polygon) -> Self {
        ConvexOutline {
            vertices: p.vertices(),
            normals: p.normals(),
            radius: p.radius,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ClipVertex {
    v: Vec2,
    id: ContactId,
}

/// Checks two circles for contact.
pub fn collide_circles(circle_a: &Circle, xf_a: &Transform, circle_b: &Circle, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = xf_a.apply(circle_a.position);
    let p_b = xf_b.apply(circle_b.position);
    let radius = circle_a.radius + circle_b.radius;
    if p_a.distance_squared(p_b) > radius * radius {
        return manifold;
    }

    manifold.kind = ManifoldType::Circles;
    manifold.local_point = circle_a.position;
    manifold.local_normal = Vec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.position;
    manifold.points[0].id = ContactId::default();
    manifold
}

/// Polygon A against circle B: find the face of least penetration, then decide
/// between the face region and the two vertex regions.
pub fn collide_polygon_and_circle(polygon_a: &Polygon, xf_a: &Transform, circle_b: &Circle, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the polygon's frame.
    let c = xf_b.apply(circle_b.position);
    let c_local = xf_a.apply_inverse(c);

    let radius = polygon_a.radius + circle_b.radius;
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();
    let count = vertices.len();

    let mut normal_index = 0;
    let mut separation = f64::MIN;
    for i in 0..count {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            // Early out.
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % count];

    manifold.kind = ManifoldType::FaceA;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.position;
    manifold.points[0].id = ContactId::default();

    // Center inside the polygon.
    if separation < f64::EPSILON {
        manifold.local_normal = normals[normal_index];
        manifold.local_point = (v1 + v2) * 0.5;
        return manifold;
    }

    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            manifold.point_count = 0;
            return manifold;
        }
        manifold.local_normal = (c_local - v1).normalize();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            manifold.point_count = 0;
            return manifold;
        }
        manifold.local_normal = (c_local - v2).normalize();
        manifold.local_point = v2;
    } else {
        let face_center = (v1 + v2) * 0.5;
        if (c_local - face_center).dot(normals[normal_index]) > radius {
            manifold.point_count = 0;
            return manifold;
        }
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }
    manifold
}

/// Separating-axis test followed by reference/incident edge clipping.
pub fn collide_polygons(polygon_a: &Polygon, xf_a: &Transform, polygon_b: &Polygon, xf_b: &Transform) -> Manifold {
    collide_outlines(polygon_a.into(), xf_a, polygon_b.into(), xf_b)
}

/// Edge A against circle B using the Voronoi regions of the segment.
///
/// When the edge has a ghost neighbour past the touched end vertex and the
/// circle lies in that neighbour's face region, the neighbour owns the
/// contact and this edge reports none.
pub fn collide_edge_and_circle(edge_a: &Edge, xf_a: &Transform, circle_b: &Circle, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::default();

    let q = xf_a.apply_inverse(xf_b.apply(circle_b.position));
    let a = edge_a.v1;
    let b = edge_a.v2;
    let e = b - a;

    // Barycentric coordinates of q along the edge.
    let u = e.dot(b - q);
    let v = e.dot(q - a);
    let radius = edge_a.radius + circle_b.radius;

    let mut id = ContactId {
        index_b: 0,
        type_b: ContactFeatureType::Vertex,
        ..Default::default()
    };

    let vertex_region = if v <= 0.0 {
        let owned_by_previous = edge_a.vertex0.is_some_and(|v0| (a - v0).dot(a - q) > 0.0);
        Some((a, 0, owned_by_previous))
    } else if u <= 0.0 {
        let owned_by_next = edge_a.vertex3.is_some_and(|v3| (v3 - b).dot(q - b) > 0.0);
        Some((b, 1, owned_by_next))
    } else {
        None
    };

    if let Some((p, index, owned_by_neighbour)) = vertex_region {
        if q.distance_squared(p) > radius * radius || owned_by_neighbour {
            return manifold;
        }
        id.index_a = index;
        id.type_a = ContactFeatureType::Vertex;
        manifold.kind = ManifoldType::Circles;
        manifold.local_normal = Vec2::ZERO;
        manifold.local_point = p;
        manifold.point_count = 1;
        manifold.points[0].id = id;
        manifold.points[0].local_point = circle_b.position;
        return manifold;
    }

    // Face region.
    let den = e.magnitude_squared();
    let p = (a * u + b * v) * (1.0 / den);
    if q.distance_squared(p) > radius * radius {
        return manifold;
    }

    let mut n = Vec2::new(-e.y, e.x);
    if n.dot(q - a) < 0.0 {
        n = -n;
    }

    id.index_a = 0;
    id.type_a = ContactFeatureType::Face;
    manifold.kind = ManifoldType::FaceA;
    manifold.local_normal = n.normalize();
    manifold.local_point = a;
    manifold.point_count = 1;
    manifold.points[0].id = id;
    manifold.points[0].local_point = circle_b.position;
    manifold
}

/// Candidate separating axis for the edge/polygon collider.
#[derive(Debug, Clone, Copy)]
enum EdgeAxis {
    /// The (possibly flipped) edge normal.
    Edge { separation: f64 },
    /// A polygon face normal.
    Polygon { index: usize, separation: f64 },
}

impl EdgeAxis {
    fn separation(self) -> f64 {
        match self {
            EdgeAxis::Edge { separation } | EdgeAxis::Polygon { separation, .. } => separation,
        }
    }
}

/// Collision normal and the range it may swing through, picked from the
/// side of the edge the polygon is on and from the neighbouring segments.
#[derive(Debug, Clone, Copy)]
struct EdgeNormalWindow {
    front: bool,
    normal: Vec2,
    lower: Vec2,
    upper: Vec2,
}

impl EdgeNormalWindow {
    fn new(edge: &Edge, centroid: Vec2) -> Self {
        let (v1, v2) = (edge.v1, edge.v2);
        let edge1 = (v2 - v1).normalize();
        let normal1 = Vec2::new(edge1.y, -edge1.x);
        let offset1 = normal1.dot(centroid - v1);

        let previous = edge.vertex0.map(|v0| {
            let edge0 = (v1 - v0).normalize();
            let normal0 = Vec2::new(edge0.y, -edge0.x);
            (normal0, edge0.cross(edge1) >= 0.0, normal0.dot(centroid - v0))
        });
        let next = edge.vertex3.map(|v3| {
            let edge2 = (v3 - v2).normalize();
            let normal2 = Vec2::new(edge2.y, -edge2.x);
            (normal2, edge1.cross(edge2) > 0.0, normal2.dot(centroid - v2))
        });

        let window = |front: bool, lower: Vec2, upper: Vec2| EdgeNormalWindow {
            front,
            normal: if front { normal1 } else { -normal1 },
            lower,
            upper,
        };

        match (previous, next) {
            (Some((normal0, convex1, offset0)), Some((normal2, convex2, offset2))) => match (convex1, convex2) {
                (true, true) => {
                    let front = offset0 >= 0.0 || offset1 >= 0.0 || offset2 >= 0.0;
                    if front {
                        window(true, normal0, normal2)
                    } else {
                        window(false, -normal1, -normal1)
                    }
                }
                (true, false) => {
                    let front = offset0 >= 0.0 || (offset1 >= 0.0 && offset2 >= 0.0);
                    if front {
                        window(true, normal0, normal1)
                    } else {
                        window(false, -normal2, -normal1)
                    }
                }
                (false, true) => {
                    let front = offset2 >= 0.0 || (offset0 >= 0.0 && offset1 >= 0.0);
                    if front {
                        window(true, normal1, normal2)
                    } else {
                        window(false, -normal1, -normal0)
                    }
                }
                (false, false) => {
                    let front = offset0 >= 0.0 && offset1 >= 0.0 && offset2 >= 0.0;
                    if front {
                        window(true, normal1, normal1)
                    } else {
                        window(false, -normal2, -normal0)
                    }
                }
            },
            (Some((normal0, convex1, offset0)), None) => {
                if convex1 {
                    let front = offset0 >= 0.0 || offset1 >= 0.0;
                    if front {
                        window(true, normal0, -normal1)
                    } else {
                        window(false, normal1, -normal1)
                    }
                } else {
                    let front = offset0 >= 0.0 && offset1 >= 0.0;
                    if front {
                        window(true, normal1, -normal1)
                    } else {
                        window(false, normal1, -normal0)
                    }
                }
            }
            (None, Some((normal2, convex2, offset2))) => {
                if convex2 {
                    let front = offset1 >= 0.0 || offset2 >= 0.0;
                    if front {
                        window(true, -normal1, normal2)
                    } else {
                        window(false, -normal1, normal1)
                    }
                } else {
                    let front = offset1 >= 0.0 && offset2 >= 0.0;
                    if front {
                        window(true, -normal1, normal1)
                    } else {
                        window(false, -normal2, normal1)
                    }
                }
            }
            (None, None) => {
                if offset1 >= 0.0 {
                    window(true, -normal1, -normal1)
                } else {
                    window(false, normal1, normal1)
                }
            }
        }
    }
}

/// Edge A against polygon B.
///
/// The edge is two-sided; the side facing the polygon's centroid is used.
/// Ghost vertices restrict which polygon faces may act as the separating
/// axis, so a polygon sliding over connected segments is never pushed back
/// by the shared corner.
pub fn collide_edge_and_polygon(edge_a: &Edge, xf_a: &Transform, polygon_b: &Polygon, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::default();

    // Work in the frame of the edge.
    let xf = xf_a.mul_t(*xf_b);
    let window = EdgeNormalWindow::new(edge_a, xf.apply(polygon_b.centroid()));
    let count = polygon_b.vertex_count();
    let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
    let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
    for i in 0..count {
        vertices[i] = xf.apply(polygon_b.vertices()[i]);
        normals[i] = xf.rotation.apply(polygon_b.normals()[i]);
    }
    let (vertices, normals) = (&vertices[..count], &normals[..count]);
    let (v1, v2) = (edge_a.v1, edge_a.v2);
    let radius = edge_a.radius + polygon_b.radius;

    let edge_separation = vertices
        .iter()
        .map(|v| window.normal.dot(*v - v1))
        .fold(f64::MAX, f64::min);
    if edge_separation > radius {
        return manifold;
    }
    let edge_axis = EdgeAxis::Edge {
        separation: edge_separation,
    };

    // Best polygon face within the normal window.
    let perp = Vec2::new(-window.normal.y, window.normal.x);
    let mut polygon_axis: Option<EdgeAxis> = None;
    for i in 0..count {
        let n = -normals[i];
        let separation = n.dot(vertices[i] - v1).min(n.dot(vertices[i] - v2));
        if separation > radius {
            return manifold;
        }

        let limit = if n.dot(perp) >= 0.0 { window.upper } else { window.lower };
        if (n - limit).dot(window.normal) < -ANGULAR_SLOP {
            continue;
        }
        if polygon_axis.map_or(true, |axis| separation > axis.separation()) {
            polygon_axis = Some(EdgeAxis::Polygon { index: i, separation });
        }
    }

    // Hysteresis keeps the reference face from flip-flopping.
    const RELATIVE_TOL: f64 = 0.98;
    const ABSOLUTE_TOL: f64 = 0.001;
    let primary = match polygon_axis {
        Some(axis) if axis.separation() > RELATIVE_TOL * edge_separation + ABSOLUTE_TOL => axis,
        _ => edge_axis,
    };

    // Incident segment, reference face (i1, i2, v1, v2, normal).
    let (incident, i1, i2, ref_v1, ref_v2, ref_normal) = match primary {
        EdgeAxis::Edge { .. } => {
            manifold.kind = ManifoldType::FaceA;
            let mut best = 0;
            for i in 1..count {
                if window.normal.dot(normals[i]) < window.normal.dot(normals[best]) {
                    best = i;
                }
            }
            let next = (best + 1) % count;
            let make = |i: usize| ClipVertex {
                v: vertices[i],
                id: ContactId {
                    index_a: 0,
                    index_b: i as u8,
                    type_a: ContactFeatureType::Face,
                    type_b: ContactFeatureType::Vertex,
                },
            };
            let incident = [make(best), make(next)];
            if window.front {
                (incident, 0, 1, v1, v2, window.normal)
            } else {
                (incident, 1, 0, v2, v1, window.normal)
            }
        }
        EdgeAxis::Polygon { index, .. } => {
            manifold.kind = ManifoldType::FaceB;
            let make = |v: Vec2| ClipVertex {
                v,
                id: ContactId {
                    index_a: 0,
                    index_b: index as u8,
                    type_a: ContactFeatureType::Vertex,
                    type_b: ContactFeatureType::Face,
                },
            };
            let next = (index + 1) % count;
            ([make(v1), make(v2)], index, next, vertices[index], vertices[next], normals[index])
        }
    };

    let side_normal1 = Vec2::new(ref_normal.y, -ref_normal.x);
    let side_normal2 = -side_normal1;
    let side_offset1 = side_normal1.dot(ref_v1);
    let side_offset2 = side_normal2.dot(ref_v2);

    let (clip_points1, np) = clip_segment_to_line(&incident, side_normal1, side_offset1, i1);
    if np < MAX_MANIFOLD_POINTS {
        return manifold;
    }
    let (clip_points2, np) = clip_segment_to_line(&clip_points1, side_normal2, side_offset2, i2);
    if np < MAX_MANIFOLD_POINTS {
        return manifold;
    }

    match primary {
        EdgeAxis::Edge { .. } => {
            manifold.local_normal = ref_normal;
            manifold.local_point = ref_v1;
        }
        EdgeAxis::Polygon { index, .. } => {
            manifold.local_normal = polygon_b.normals()[index];
            manifold.local_point = polygon_b.vertices()[index];
        }
    }

    let mut point_count = 0;
    for clip in &clip_points2 {
        if ref_normal.dot(clip.v - ref_v1) <= radius {
            let cp = &mut manifold.points[point_count];
            match primary {
                EdgeAxis::Edge { .. } => {
                    cp.local_point = xf.apply_inverse(clip.v);
                    cp.id = clip.id;
                }
                EdgeAxis::Polygon { .. } => {
                    cp.local_point = clip.v;
                    cp.id = clip.id.flipped();
                }
            }
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
}

/// Finds the face of `poly1` with the largest separation from `poly2`.
fn find_max_separation(poly1: ConvexOutline, xf1: &Transform, poly2: ConvexOutline, xf2: &Transform) -> (usize, f64) {
    // Work in the frame of poly2.
    let xf = xf2.mul_t(*xf1);

    let mut best_index = 0;
    let mut max_separation = f64::MIN;
    for (i, (n1, v1)) in poly1.normals.iter().zip(poly1.vertices).enumerate() {
        let n = xf.rotation.apply(*n1);
        let v1 = xf.apply(*v1);

        let si = poly2
            .vertices
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .fold(f64::MAX, f64::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// The edge of `poly2` most anti-parallel to the reference normal, in world space.
fn find_incident_edge(poly1: ConvexOutline, xf1: &Transform, edge1: usize, poly2: ConvexOutline, xf2: &Transform) -> [ClipVertex; 2] {
    let normal1 = xf2.rotation.apply_inverse(xf1.rotation.apply(poly1.normals[edge1]));

    let mut index = 0;
    let mut min_dot = f64::MAX;
    for (i, n2) in poly2.normals.iter().enumerate() {
        let dot = normal1.dot(*n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % poly2.vertices.len();
    let make = |i: usize| ClipVertex {
        v: xf2.apply(poly2.vertices[i]),
        id: ContactId {
            index_a: edge1 as u8,
            index_b: i as u8,
            type_a: ContactFeatureType::Face,
            type_b: ContactFeatureType::Vertex,
        },
    };
    [make(i1), make(i2)]
}

/// Sutherland-Hodgman clipping of a segment against the half-plane `normal . x <= offset`.
fn clip_segment_to_line(v_in: &[ClipVertex; 2], normal: Vec2, offset: f64, vertex_index_a: usize) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // The points straddle the plane.
    if distance0 * distance1 < 0.0 && count < 2 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count] = ClipVertex {
            v: v_in[0].v + (v_in[1].v - v_in[0].v) * interp,
            id: ContactId {
                index_a: vertex_index_a as u8,
                index_b: v_in[0].id.index_b,
                type_a: ContactFeatureType::Vertex,
                type_b: ContactFeatureType::Face,
            },
        };
        count += 1;
    }

    (v_out, count)
}

fn collide_outlines(poly_a: ConvexOutline, xf_a: &Transform, poly_b: ConvexOutline, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    // Prefer A as the reference unless B is clearly better, to avoid flip-flopping.
    const TOLERANCE: f64 = 0.1 * LINEAR_SLOP;
    let (poly1, xf1, poly2, xf2, edge1, flip) = if separation_b > separation_a + TOLERANCE {
        manifold.kind = ManifoldType::FaceB;
        (poly_b, xf_b, poly_a, xf_a, edge_b, true)
    } else {
        manifold.kind = ManifoldType::FaceA;
        (poly_a, xf_a, poly_b, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.vertices.len();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;

    let local_v11 = poly1.vertices[iv1];
    let local_v12 = poly1.vertices[iv2];

    let local_tangent = (local_v12 - local_v11).normalize();
    let local_normal = local_tangent.cross_scalar(1.0);
    let plane_point = (local_v11 + local_v12) * 0.5;

    let tangent = xf1.rotation.apply(local_tangent);
    let normal = tangent.cross_scalar(1.0);

    let v11 = xf1.apply(local_v11);
    let v12 = xf1.apply(local_v12);

    // Face offset and side planes.
    let front_offset = normal.dot(v11);
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let (clip_points1, np) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if np < 2 {
        return manifold;
    }
    let (clip_points2, np) = clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2);
    if np < 2 {
        return manifold;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for clip in &clip_points2 {
        let separation = normal.dot(clip.v) - front_offset;
        if separation <= total_radius {
            let cp = &mut manifold.points[point_count];
            cp.local_point = xf2.apply_inverse(clip.v);
            cp.id = if flip { clip.id.flipped() } else { clip.id };
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::WorldManifold;

    const EPSILON: f64 = 1e-9;

    fn at(x: f64, y: f64) -> Transform {
        Transform::new(Vec2::new(x, y), 0.0)
    }

    #[test]
    fn test_circles_touching_and_apart() {
        let c = Circle::new(1.0).expect("valid");
        let m = collide_circles(&c, &at(0.0, 0.0), &c, &at(1.5, 0.0));
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::Circles);

        let wm = WorldManifold::new(&m, &at(0.0, 0.0), 1.0, &at(1.5, 0.0), 1.0);
        assert!((wm.separations[0] + 0.5).abs() < EPSILON);

        let apart = collide_circles(&c, &at(0.0, 0.0), &c, &at(2.5, 0.0));
        assert_eq!(apart.point_count, 0);
    }

    #[test]
    fn test_polygon_circle_face_region() {
        let square = Polygon::new_box(1.0, 1.0).expect("valid");
        let ball = Circle::new(0.5).expect("valid");
        let m = collide_polygon_and_circle(&square, &at(0.0, 0.0), &ball, &at(0.0, 1.4));
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::FaceA);
        assert!((m.local_normal.y - 1.0).abs() < EPSILON);

        let wm = WorldManifold::new(&m, &at(0.0, 0.0), square.radius, &at(0.0, 1.4), 0.5);
        assert!(wm.separations[0] < 0.0);
    }

    #[test]
    fn test_polygon_circle_vertex_region() {
        let square = Polygon::new_box(1.0, 1.0).expect("valid");
        let ball = Circle::new(0.5).expect("valid");
        let m = collide_polygon_and_circle(&square, &at(0.0, 0.0), &ball, &at(1.3, 1.3));
        assert_eq!(m.point_count, 1);
        let diagonal = Vec2::new(1.0, 1.0).normalize();
        assert!((m.local_normal - diagonal).magnitude() < EPSILON);

        let far = collide_polygon_and_circle(&square, &at(0.0, 0.0), &ball, &at(1.5, 1.5));
        assert_eq!(far.point_count, 0);
    }

    #[test]
    fn test_box_resting_on_box_gives_two_points() {
        let ground = Polygon::new_box(5.0, 0.5).expect("valid");
        let crate_box = Polygon::new_box(0.5, 0.5).expect("valid");
        let xf_a = at(0.0, 0.0);
        let xf_b = at(0.0, 0.99);
        let m = collide_polygons(&ground, &xf_a, &crate_box, &xf_b);
        assert_eq!(m.point_count, 2);

        let wm = WorldManifold::new(&m, &xf_a, ground.radius, &xf_b, crate_box.radius);
        assert!((wm.normal.y - 1.0).abs() < EPSILON);
        for s in &wm.separations {
            assert!((s - (-0.01 - 2.0 * crate_box.radius)).abs() < 1e-6);
        }
        assert_ne!(m.points[0].id, m.points[1].id);
    }

    #[test]
    fn test_separated_boxes_have_no_points() {
        let a = Polygon::new_box(0.5, 0.5).expect("valid");
        let m = collide_polygons(&a, &at(0.0, 0.0), &a, &at(1.2, 0.0));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_point_ids_stable_under_small_motion() {
        let ground = Polygon::new_box(5.0, 0.5).expect("valid");
        let b = Polygon::new_box(0.5, 0.5).expect("valid");
        let m1 = collide_polygons(&ground, &at(0.0, 0.0), &b, &at(0.0, 0.99));
        let m2 = collide_polygons(&ground, &at(0.0, 0.0), &b, &at(0.01, 0.985));
        assert_eq!(m1.point_count, m2.point_count);
        for (p1, p2) in m1.points().iter().zip(m2.points()) {
            assert_eq!(p1.id, p2.id);
        }
    }

    #[test]
    fn test_edge_circle_regions() {
        let edge = Edge::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)).expect("valid");
        let ball = Circle::new(0.5).expect("valid");

        let face = collide_edge_and_circle(&edge, &at(0.0, 0.0), &ball, &at(0.2, 0.4));
        assert_eq!(face.kind, ManifoldType::FaceA);
        assert!((face.local_normal.y - 1.0).abs() < EPSILON);

        let below = collide_edge_and_circle(&edge, &at(0.0, 0.0), &ball, &at(0.2, -0.4));
        assert!((below.local_normal.y + 1.0).abs() < EPSILON);

        let corner = collide_edge_and_circle(&edge, &at(0.0, 0.0), &ball, &at(1.3, 0.1));
        assert_eq!(corner.kind, ManifoldType::Circles);
        assert_eq!(corner.points[0].id.index_a, 1);

        let miss = collide_edge_and_circle(&edge, &at(0.0, 0.0), &ball, &at(0.0, 2.0));
        assert_eq!(miss.point_count, 0);
    }

    #[test]
    fn test_edge_polygon_box_on_ground_edge() {
        let edge = Edge::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)).expect("valid");
        let b = Polygon::new_box(0.5, 0.5).expect("valid");
        let xf_b = at(0.0, 0.49);
        let m = collide_edge_and_polygon(&edge, &at(0.0, 0.0), &b, &xf_b);
        assert_eq!(m.point_count, 2);
        let wm = WorldManifold::new(&m, &at(0.0, 0.0), edge.radius, &xf_b, b.radius);
        assert!((wm.normal.y - 1.0).abs() < EPSILON);
        assert!(wm.separations[0] < 0.0);
    }

    #[test]
    fn test_box_crossing_segment_joint_does_not_snag() {
        // Box sliding right, its lower right corner just past the joint at x = 0.
        let b = Polygon::new_box(0.5, 0.5).expect("valid");
        let xf_b = at(-0.49, 0.47);
        let isolated = Edge::new(Vec2::new(0.0, 0.0), Vec2::new(5.0, 0.0)).expect("valid");

        let m = collide_edge_and_polygon(&isolated, &at(0.0, 0.0), &b, &xf_b);
        assert_eq!(m.kind, ManifoldType::FaceB);
        let wm = WorldManifold::new(&m, &at(0.0, 0.0), isolated.radius, &xf_b, b.radius);
        assert!(wm.normal.x < -0.9, "isolated edge pushes the box back: {:?}", wm.normal);

        let connected = isolated.with_vertex0(Vec2::new(-5.0, 0.0)).expect("valid");
        let m = collide_edge_and_polygon(&connected, &at(0.0, 0.0), &b, &xf_b);
        assert_eq!(m.kind, ManifoldType::FaceA);
        assert_eq!(m.point_count, 2);
        let wm = WorldManifold::new(&m, &at(0.0, 0.0), connected.radius, &xf_b, b.radius);
        assert!((wm.normal.y - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_edge_polygon_side_follows_centroid() {
        let edge = Edge::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)).expect("valid");
        let b = Polygon::new_box(0.5, 0.5).expect("valid");
        let xf_b = at(0.0, -0.49);
        let m = collide_edge_and_polygon(&edge, &at(0.0, 0.0), &b, &xf_b);
        assert_eq!(m.point_count, 2);
        let wm = WorldManifold::new(&m, &at(0.0, 0.0), edge.radius, &xf_b, b.radius);
        assert!((wm.normal.y + 1.0).abs() < EPSILON);

        let far = collide_edge_and_polygon(&edge, &at(0.0, 0.0), &b, &at(0.0, 2.0));
        assert_eq!(far.point_count, 0);
    }

    #[test]
    fn test_shared_vertex_contact_belongs_to_one_edge() {
        let ball = Circle::new(0.5).expect("valid");
        let xf_ball = at(-0.1, 0.4);
        let right = Edge::new(Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0)).expect("valid");

        let isolated = collide_edge_and_circle(&right, &at(0.0, 0.0), &ball, &xf_ball);
        assert_eq!(isolated.kind, ManifoldType::Circles);

        let connected = right.with_vertex0(Vec2::new(-2.0, 0.0)).expect("valid");
        let m = collide_edge_and_circle(&connected, &at(0.0, 0.0), &ball, &xf_ball);
        assert_eq!(m.point_count, 0);

        let left = Edge::new(Vec2::new(-2.0, 0.0), Vec2::new(0.0, 0.0))
            .and_then(|e| e.with_vertex3(Vec2::new(2.0, 0.0)))
            .expect("valid");
        let m = collide_edge_and_circle(&left, &at(0.0, 0.0), &ball, &xf_ball);
        assert_eq!(m.kind, ManifoldType::FaceA);
        assert!((m.local_normal.y - 1.0).abs() < EPSILON);
    }
}
