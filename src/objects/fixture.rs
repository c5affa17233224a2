use serde::{Deserialize, Serialize};

use crate::collision::aabb::AABB;
use crate::collision::broad_phase::BroadPhase;
use crate::collision::dynamic_tree::ProxyId;
use crate::common::error::{PhysicsError, PhysicsResult};
use crate::common::material::Material;
use crate::math::transform::Transform;
use crate::math::vec2::Vec2;
use crate::objects::{BodyHandle, FixtureHandle};
use crate::shapes::{MassData, Shape};

/// Collision filtering data.
///
/// Two fixtures in the same non-zero group always collide when the group is
/// positive and never collide when it is negative. Otherwise each fixture's
/// category must be accepted by the other's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Filter {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (self.category_bits & other.mask_bits) != 0
    }
}

/// Everything needed to attach a shape to a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureDef {
    pub shape: Shape,
    #[serde(default)]
    pub material: Material,
    /// Sensors detect overlap but never generate a collision response.
    #[serde(default)]
    pub is_sensor: bool,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub user_data: u64,
}

impl FixtureDef {
    pub fn new(shape: impl Into<Shape>) -> Self {
        FixtureDef {
            shape: shape.into(),
            material: Material::default(),
            is_sensor: false,
            filter: Filter::default(),
            user_data: 0,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_density(mut self, density: f64) -> Self {
        self.material.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f64) -> Self {
        self.material.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.material.restitution = restitution;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

/// What the broad-phase stores per proxy: the fixture and which of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProxyKey {
    pub fixture: FixtureHandle,
    pub child: usize,
}

/// Broad-phase entry for one child of a fixture's shape.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixtureProxy {
    /// Last true AABB pushed to the broad-phase.
    pub aabb: AABB,
    pub id: ProxyId,
}

/// A shape attached to a body, with material and filtering data.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: BodyHandle,
    pub(crate) shape: Shape,
    pub(crate) material: Material,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    /// One proxy per shape child, empty while the body is inactive.
    pub(crate) proxies: Vec<FixtureProxy>,
    pub user_data: u64,
}

impl Fixture {
    /// Validates the shape, then the material.
    pub(crate) fn new(body: BodyHandle, def: &FixtureDef) -> PhysicsResult<Self> {
        def.shape.validate()?;
        def.material.validate()?;
        Ok(Fixture {
            body,
            shape: def.shape.clone(),
            material: def.material,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::new(),
            user_data: def.user_data,
        })
    }

    pub(crate) fn create_proxies(&mut self, broad_phase: &mut BroadPhase<ProxyKey>, xf: &Transform, handle: FixtureHandle) {
        debug_assert!(self.proxies.is_empty());
        self.proxies = (0..self.shape.child_count())
            .map(|child| {
                let aabb = self.shape.compute_aabb(xf, child);
                let id = broad_phase.create_proxy(aabb, ProxyKey { fixture: handle, child });
                FixtureProxy { aabb, id }
            })
            .collect();
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase<ProxyKey>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.id);
        }
    }

    /// Moves every proxy to cover the swept shape between `xf1` and `xf2`.
    pub(crate) fn synchronize(&mut self, broad_phase: &mut BroadPhase<ProxyKey>, xf1: &Transform, xf2: &Transform) {
        let displacement = xf2.position - xf1.position;
        for (child, proxy) in self.proxies.iter_mut().enumerate() {
            let aabb1 = self.shape.compute_aabb(xf1, child);
            let aabb2 = self.shape.compute_aabb(xf2, child);
            proxy.aabb = aabb1.combine(&aabb2);
            broad_phase.move_proxy(proxy.id, proxy.aabb, displacement);
        }
    }

    /// Queues every proxy for pair search on the next step.
    pub(crate) fn touch_proxies(&self, broad_phase: &mut BroadPhase<ProxyKey>) {
        for proxy in &self.proxies {
            broad_phase.touch_proxy(proxy.id);
        }
    }

    pub(crate) fn proxy_id(&self, child: usize) -> Option<ProxyId> {
        self.proxies.get(child).map(|p| p.id)
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn material(&self) -> Material {
        self.material
    }

    pub fn density(&self) -> f64 {
        self.material.density
    }

    pub fn friction(&self) -> f64 {
        self.material.friction
    }

    pub fn restitution(&self) -> f64 {
        self.material.restitution
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Number of shape children, each with its own broad-phase proxy.
    pub fn child_count(&self) -> usize {
        self.shape.child_count()
    }

    /// World AABB of one child as of the last broad-phase synchronization,
    /// `None` while the body is inactive.
    pub fn aabb(&self, child: usize) -> Option<AABB> {
        self.proxies.get(child).map(|p| p.aabb)
    }

    /// Affects contacts created or updated after this call.
    pub fn set_friction(&mut self, friction: f64) -> PhysicsResult<()> {
        if !friction.is_finite() || friction < 0.0 {
            return Err(PhysicsError::InvalidFriction(friction));
        }
        self.material.friction = friction;
        Ok(())
    }

    pub fn set_restitution(&mut self, restitution: f64) -> PhysicsResult<()> {
        if !(0.0..=1.0).contains(&restitution) {
            return Err(PhysicsError::InvalidRestitution(restitution));
        }
        self.material.restitution = restitution;
        Ok(())
    }

    pub fn set_sensor(&mut self, flag: bool) {
        self.is_sensor = flag;
    }

    pub fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        self.shape.test_point(xf, point)
    }

    pub(crate) fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.material.density)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::vec2::Vec2;
    use crate::shapes::{Chain, Circle, Polygon};
    use slotmap::KeyData;

    fn handle() -> BodyHandle {
        BodyHandle::from(KeyData::from_ffi(1))
    }

    #[test]
    fn test_filter_default_collides() {
        assert!(Filter::default().should_collide(&Filter::default()));
    }

    #[test]
    fn test_filter_groups_override_masks() {
        let negative = Filter {
            group_index: -2,
            ..Default::default()
        };
        assert!(!negative.should_collide(&negative));

        let positive = Filter {
            group_index: 3,
            mask_bits: 0,
            ..Default::default()
        };
        assert!(positive.should_collide(&positive));
    }

    #[test]
    fn test_filter_masks() {
        let player = Filter {
            category_bits: 0x0002,
            mask_bits: 0x0001,
            group_index: 0,
        };
        let other_player = player;
        let ground = Filter::default();
        assert!(player.should_collide(&ground));
        assert!(!player.should_collide(&other_player));
    }

    #[test]
    fn test_fixture_rejects_bad_material() {
        let circle = Circle::new(1.0).expect("circle");
        let def = FixtureDef::new(circle).with_density(-1.0);
        assert!(matches!(
            Fixture::new(handle(), &def),
            Err(PhysicsError::InvalidDensity(_))
        ));
    }

    #[test]
    fn test_fixture_setters_validate() {
        let circle = Circle::new(1.0).expect("circle");
        let mut fixture = Fixture::new(handle(), &FixtureDef::new(circle)).expect("fixture");
        assert!(fixture.set_friction(-0.1).is_err());
        assert!(fixture.set_restitution(1.5).is_err());
        fixture.set_restitution(0.5).expect("valid");
        assert_eq!(fixture.restitution(), 0.5);
        assert!(fixture.proxies.is_empty());
        assert_eq!(fixture.aabb(0), None);
    }

    #[test]
    fn test_fixture_mass_uses_density() {
        let circle = Circle::new(1.0).expect("circle");
        let fixture = Fixture::new(handle(), &FixtureDef::new(circle).with_density(2.0)).expect("fixture");
        let mass = fixture.mass_data();
        assert!((mass.mass - 2.0 * std::f64::consts::PI).abs() < 1e-10);
    }

    #[test]
    fn test_fixture_revalidates_assembled_shapes() {
        let mut circle = Circle::new(1.0).expect("circle");
        circle.radius = -1.0;
        let def = FixtureDef::new(circle);
        assert!(matches!(Fixture::new(handle(), &def), Err(PhysicsError::InvalidRadius(_))));
    }

    #[test]
    fn test_fixture_def_json_goes_through_shape_validation() {
        let json = r#"{"shape": {"Polygon": {"vertices": [{"x": 0.0, "y": 0.0}, {"x": 1.0, "y": 0.0}]}}}"#;
        assert!(serde_json::from_str::<FixtureDef>(json).is_err());

        let json = r#"{"shape": {"Circle": {"radius": 0.5}}, "material": {"density": 2.0, "friction": 0.3, "restitution": 0.0}}"#;
        let def: FixtureDef = serde_json::from_str(json).expect("valid definition");
        let fixture = Fixture::new(handle(), &def).expect("fixture");
        assert_eq!(fixture.density(), 2.0);
    }

    #[test]
    fn test_chain_fixture_has_proxy_per_segment() {
        let chain = Chain::new_loop(vec![Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), Vec2::new(4.0, 4.0)]).expect("chain");
        let mut fixture = Fixture::new(handle(), &FixtureDef::new(chain)).expect("fixture");
        let mut broad_phase = BroadPhase::new();
        let fixture_handle = FixtureHandle::from(KeyData::from_ffi(7));

        fixture.create_proxies(&mut broad_phase, &Transform::identity(), fixture_handle);
        assert_eq!(fixture.child_count(), 3);
        assert_eq!(broad_phase.proxy_count(), 3);
        let key = broad_phase.user_data(fixture.proxy_id(2).expect("proxy")).expect("key");
        assert_eq!(key, ProxyKey { fixture: fixture_handle, child: 2 });

        let moved = Transform::new(Vec2::new(10.0, 0.0), 0.0);
        fixture.synchronize(&mut broad_phase, &Transform::identity(), &moved);
        let swept = fixture.aabb(0).expect("active");
        assert!(swept.min.x < 0.0 && swept.max.x > 14.0);

        fixture.destroy_proxies(&mut broad_phase);
        assert_eq!(broad_phase.proxy_count(), 0);
        assert_eq!(fixture.aabb(0), None);
    }

    #[test]
    fn test_fixture_mass_of_polygon() {
        let square = Polygon::new_box(0.5, 0.5).expect("box");
        let fixture = Fixture::new(handle(), &FixtureDef::new(square).with_density(3.0)).expect("fixture");
        assert!((fixture.mass_data().mass - 3.0).abs() < 1e-10);
    }
}
