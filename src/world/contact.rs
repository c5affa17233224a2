//! Persistent contact between two fixture children whose fat AABBs overlap.

use crate::collision::detection::{
    collide_circles, collide_edge_and_circle, collide_edge_and_polygon, collide_polygon_and_circle, collide_polygons,
};
use crate::collision::distance::test_overlap;
use crate::collision::manifold::{Manifold, WorldManifold};
use crate::common::material::{mix_friction, mix_restitution};
use crate::math::transform::Transform;
use crate::objects::{BodyHandle, Fixture, FixtureHandle};
use crate::shapes::{Shape, ShapeType};

/// A potential or actual touch between two fixtures.
///
/// Contacts exist while the broad-phase reports the fixtures' fat AABBs as
/// overlapping; `is_touching` tells whether the shapes actually touch.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) fixture_a: FixtureHandle,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) child_a: usize,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) manifold: Manifold,

    pub(crate) touching: bool,
    pub(crate) enabled: bool,
    /// Set when the fixtures' filters changed and the pair must be re-checked.
    pub(crate) filter: bool,
    pub(crate) island: bool,
    pub(crate) toi_valid: bool,
    pub(crate) toi: f64,
    pub(crate) toi_count: u32,
    pub(crate) sensor: bool,

    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    pub(crate) tangent_speed: f64,
}

/// What changed during [`Contact::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ContactUpdate {
    pub began: bool,
    pub ended: bool,
    pub old_manifold: Manifold,
}

impl ContactUpdate {
    pub fn touching_changed(&self) -> bool {
        self.began || self.ended
    }
}

/// Shape pairs are stored with the "larger" shape first so the narrow phase
/// only needs one function per unordered pair. Chain children collide as
/// edges. Pairs of edges and chains have no collider.
fn needs_swap(a: ShapeType, b: ShapeType) -> Option<bool> {
    use ShapeType::*;
    match (a, b) {
        (Circle, Circle) | (Polygon, Circle) | (Polygon, Polygon) => Some(false),
        (Edge | Chain, Circle | Polygon) => Some(false),
        (Circle, Polygon) => Some(true),
        (Circle | Polygon, Edge | Chain) => Some(true),
        (Edge | Chain, Edge | Chain) => None,
    }
}

impl Contact {
    /// Creates a contact for the pair, or `None` when no collider exists for
    /// the two shape types.
    pub(crate) fn new(
        (fixture_a, child_a): (FixtureHandle, usize),
        a: &Fixture,
        (fixture_b, child_b): (FixtureHandle, usize),
        b: &Fixture,
    ) -> Option<Contact> {
        let swap = needs_swap(a.shape.shape_type(), b.shape.shape_type())?;
        let ((fixture_a, child_a, a), (fixture_b, child_b, b)) = if swap {
            ((fixture_b, child_b, b), (fixture_a, child_a, a))
        } else {
            ((fixture_a, child_a, a), (fixture_b, child_b, b))
        };

        Some(Contact {
            fixture_a,
            fixture_b,
            child_a,
            child_b,
            body_a: a.body,
            body_b: b.body,
            manifold: Manifold::default(),
            touching: false,
            enabled: true,
            filter: false,
            island: false,
            toi_valid: false,
            toi: 0.0,
            toi_count: 0,
            sensor: a.is_sensor || b.is_sensor,
            friction: mix_friction(a.material.friction, b.material.friction),
            restitution: mix_restitution(a.material.restitution, b.material.restitution),
            tangent_speed: 0.0,
        })
    }

    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    /// Which child of fixture A's shape this contact is for; 0 unless it is a chain.
    pub fn child_index_a(&self) -> usize {
        self.child_a
    }

    pub fn child_index_b(&self) -> usize {
        self.child_b
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Manifold in world coordinates for the given body transforms and skin radii.
    pub fn world_manifold(&self, xf_a: &Transform, radius_a: f64, xf_b: &Transform, radius_b: f64) -> WorldManifold {
        WorldManifold::new(&self.manifold, xf_a, radius_a, xf_b, radius_b)
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disables the contact for the current step only. Call from
    /// [`ContactListener::pre_solve`](crate::world::ContactListener::pre_solve).
    pub fn set_enabled(&mut self, flag: bool) {
        self.enabled = flag;
    }

    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Overrides the mixed friction. Persists until the contact is destroyed.
    pub fn set_friction(&mut self, friction: f64) {
        self.friction = friction;
    }

    pub fn reset_friction(&mut self, a: &Fixture, b: &Fixture) {
        self.friction = mix_friction(a.material.friction, b.material.friction);
    }

    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f64) {
        self.restitution = restitution;
    }

    pub fn reset_restitution(&mut self, a: &Fixture, b: &Fixture) {
        self.restitution = mix_restitution(a.material.restitution, b.material.restitution);
    }

    /// Surface speed along the tangent, for conveyor belts.
    pub fn tangent_speed(&self) -> f64 {
        self.tangent_speed
    }

    pub fn set_tangent_speed(&mut self, speed: f64) {
        self.tangent_speed = speed;
    }

    /// Flags the contact so the next collide pass re-runs the filter on it.
    pub(crate) fn flag_for_filtering(&mut self) {
        self.filter = true;
    }

    fn evaluate(shape_a: &Shape, child_a: usize, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> Manifold {
        match (shape_a, shape_b) {
            (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(a, xf_a, b, xf_b),
            (Shape::Chain(a), Shape::Circle(b)) => collide_edge_and_circle(&a.child_edge(child_a), xf_a, b, xf_b),
            (Shape::Chain(a), Shape::Polygon(b)) => collide_edge_and_polygon(&a.child_edge(child_a), xf_a, b, xf_b),
            _ => Manifold::default(),
        }
    }

    /// Re-evaluates the manifold at the given transforms and carries matching
    /// impulses over for warm starting. Sensors only track overlap.
    pub(crate) fn update(
        &mut self,
        fixture_a: &Fixture,
        xf_a: &Transform,
        fixture_b: &Fixture,
        xf_b: &Transform,
    ) -> ContactUpdate {
        let old_manifold = self.manifold;

        // Re-enable every step; pre-solve may disable it again.
        self.enabled = true;

        let was_touching = self.touching;
        self.sensor = fixture_a.is_sensor || fixture_b.is_sensor;

        if self.sensor {
            self.touching = test_overlap(
                &fixture_a.shape,
                self.child_a,
                xf_a,
                &fixture_b.shape,
                self.child_b,
                xf_b,
            );
            self.manifold.point_count = 0;
        } else {
            self.manifold = Self::evaluate(&fixture_a.shape, self.child_a, xf_a, &fixture_b.shape, xf_b);
            self.touching = self.manifold.point_count > 0;
            self.manifold.carry_impulses_from(&old_manifold);
        }

        ContactUpdate {
            began: !was_touching && self.touching,
            ended: was_touching && !self.touching,
            old_manifold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::vec2::Vec2;
    use crate::objects::FixtureDef;
    use crate::shapes::{Chain, Circle, Edge, Polygon};
    use slotmap::{KeyData, SlotMap};

    fn fixtures(
        shape_a: impl Into<Shape>,
        shape_b: impl Into<Shape>,
    ) -> (SlotMap<FixtureHandle, Fixture>, FixtureHandle, FixtureHandle) {
        let body_a = BodyHandle::from(KeyData::from_ffi(1));
        let body_b = BodyHandle::from(KeyData::from_ffi(2));
        let mut arena = SlotMap::with_key();
        let fa = arena.insert(Fixture::new(body_a, &FixtureDef::new(shape_a).with_friction(0.4)).expect("fixture"));
        let fb = arena.insert(
            Fixture::new(body_b, &FixtureDef::new(shape_b).with_friction(0.9).with_restitution(0.5)).expect("fixture"),
        );
        (arena, fa, fb)
    }

    #[test]
    fn test_circle_polygon_pair_is_reordered() {
        let circle = Circle::new(0.5).expect("circle");
        let polygon = Polygon::new_box(1.0, 1.0).expect("box");
        let (arena, fa, fb) = fixtures(circle, polygon);
        let contact = Contact::new((fa, 0), &arena[fa], (fb, 0), &arena[fb]).expect("supported pair");
        assert_eq!(contact.fixture_a(), fb);
        assert_eq!(contact.fixture_b(), fa);
        assert_eq!(contact.body_a(), arena[fb].body);
    }

    #[test]
    fn test_edge_pair_is_unsupported() {
        let edge = Edge::new(Vec2::ZERO, Vec2::new(1.0, 0.0)).expect("edge");
        let (arena, fa, fb) = fixtures(edge.clone(), edge);
        assert!(Contact::new((fa, 0), &arena[fa], (fb, 0), &arena[fb]).is_none());
    }

    #[test]
    fn test_chain_child_pairs_with_circle() {
        let chain = Chain::new(vec![Vec2::new(-4.0, 0.0), Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0)]).expect("chain");
        let ball = Circle::new(0.5).expect("circle");
        let (arena, fa, fb) = fixtures(ball, chain.clone());
        let mut contact = Contact::new((fa, 0), &arena[fa], (fb, 1), &arena[fb]).expect("supported pair");
        assert_eq!(contact.fixture_a(), fb);
        assert_eq!(contact.child_index_a(), 1);
        assert_eq!(contact.child_index_b(), 0);

        // Resting on the second segment.
        let update = contact.update(&arena[fb], &Transform::identity(), &arena[fa], &Transform::new(Vec2::new(2.0, 0.45), 0.0));
        assert!(update.began);
        assert!((contact.manifold().local_normal.y - 1.0).abs() < 1e-12);

        let (arena, fa, fb) = fixtures(chain.clone(), chain);
        assert!(Contact::new((fa, 0), &arena[fa], (fb, 0), &arena[fb]).is_none());
    }

    #[test]
    fn test_material_mixing() {
        let circle = Circle::new(0.5).expect("circle");
        let (arena, fa, fb) = fixtures(circle.clone(), circle);
        let contact = Contact::new((fa, 0), &arena[fa], (fb, 0), &arena[fb]).expect("supported pair");
        assert!((contact.friction() - (0.4f64 * 0.9).sqrt()).abs() < 1e-12);
        assert_eq!(contact.restitution(), 0.5);
    }

    #[test]
    fn test_update_reports_begin_and_end() {
        let circle = Circle::new(0.5).expect("circle");
        let (arena, fa, fb) = fixtures(circle.clone(), circle);
        let mut contact = Contact::new((fa, 0), &arena[fa], (fb, 0), &arena[fb]).expect("supported pair");

        let xf_a = Transform::identity();
        let near = Transform::new(Vec2::new(0.9, 0.0), 0.0);
        let far = Transform::new(Vec2::new(2.0, 0.0), 0.0);

        let update = contact.update(&arena[fa], &xf_a, &arena[fb], &near);
        assert!(update.began);
        assert!(contact.is_touching());
        contact.manifold.points_mut()[0].normal_impulse = 3.0;

        let update = contact.update(&arena[fa], &xf_a, &arena[fb], &near);
        assert!(!update.touching_changed());
        assert_eq!(contact.manifold.points()[0].normal_impulse, 3.0);

        let update = contact.update(&arena[fa], &xf_a, &arena[fb], &far);
        assert!(update.ended);
        assert!(!contact.is_touching());
    }

    #[test]
    fn test_sensor_has_no_manifold() {
        let circle = Circle::new(0.5).expect("circle");
        let (mut arena, fa, fb) = fixtures(circle.clone(), circle);
        arena[fa].set_sensor(true);
        let mut contact = Contact::new((fa, 0), &arena[fa], (fb, 0), &arena[fb]).expect("supported pair");
        let near = Transform::new(Vec2::new(0.5, 0.0), 0.0);
        contact.update(&arena[fa], &Transform::identity(), &arena[fb], &near);
        assert!(contact.is_touching());
        assert!(contact.is_sensor());
        assert_eq!(contact.manifold().point_count, 0);
    }
}
