//! Integration tests for impulse2d
//!
//! End-to-end behaviour of the world through the public API: stepping,
//! contacts, sleeping, callbacks, continuous collision and error reporting.

use std::cell::RefCell;
use std::rc::Rc;

use impulse2d::collision::AABB;
use impulse2d::common::settings::LINEAR_SLOP;
use impulse2d::solver::ContactImpulse;
use impulse2d::{
    BodyDef, BodyHandle, BodyType, Chain, Circle, CommandBuffer, Contact, ContactEvent, ContactListener, Edge,
    FixtureDef, HandleKind, Material, PhysicsError, Polygon, Vec2, World,
};

const DT: f64 = 1.0 / 60.0;

// ============================================================================
// Helpers
// ============================================================================

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn run(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT, 8, 3).expect("step");
    }
}

fn add_ground(world: &mut World) -> BodyHandle {
    let ground = world.create_body(&BodyDef::static_body(Vec2::ZERO)).expect("body");
    let edge = Edge::new(Vec2::new(-40.0, 0.0), Vec2::new(40.0, 0.0)).expect("edge");
    world.create_fixture(ground, &FixtureDef::new(edge)).expect("ground fixture");
    ground
}

fn add_ball(world: &mut World, position: Vec2, radius: f64, restitution: f64) -> BodyHandle {
    let body = world.create_body(&BodyDef::dynamic(position)).expect("body");
    let circle = Circle::new(radius).expect("circle");
    world
        .create_fixture(body, &FixtureDef::new(circle).with_restitution(restitution))
        .expect("ball fixture");
    body
}

fn add_box(world: &mut World, position: Vec2, half_extent: f64) -> BodyHandle {
    let body = world.create_body(&BodyDef::dynamic(position)).expect("body");
    let shape = Polygon::new_box(half_extent, half_extent).expect("box");
    world.create_fixture(body, &FixtureDef::new(shape)).expect("box fixture");
    body
}

// ============================================================================
// Free motion
// ============================================================================

#[test]
fn test_velocity_unchanged_without_gravity() {
    init_logger();
    let mut world = World::new(Vec2::ZERO);
    let body = world
        .create_body(&BodyDef {
            linear_velocity: Vec2::new(3.0, -2.0),
            angular_velocity: 1.5,
            ..BodyDef::dynamic(Vec2::ZERO)
        })
        .expect("body");
    world
        .create_fixture(body, &FixtureDef::new(Polygon::new_box(0.5, 0.25).expect("box")))
        .expect("fixture");

    run(&mut world, 30);

    let body = world.body(body).expect("body");
    assert!((body.linear_velocity() - Vec2::new(3.0, -2.0)).magnitude() < 1e-12);
    assert!((body.angular_velocity() - 1.5).abs() < 1e-12);
    assert!((body.position().x - 3.0 * 30.0 * DT).abs() < 1e-9);
}

#[test]
fn test_forces_are_cleared_after_step() {
    init_logger();
    let mut world = World::new(Vec2::ZERO);
    let body = add_ball(&mut world, Vec2::ZERO, 0.5, 0.0);
    world
        .body_mut(body)
        .expect("body")
        .apply_force_to_center(Vec2::new(10.0, 0.0), true);

    run(&mut world, 1);
    let after_one = world.body(body).expect("body").linear_velocity();
    assert!(after_one.x > 0.0);
    assert_eq!(world.body(body).expect("body").force(), Vec2::ZERO);

    run(&mut world, 1);
    assert_eq!(world.body(body).expect("body").linear_velocity(), after_one);
}

// ============================================================================
// Contacts
// ============================================================================

#[test]
fn test_overlapping_circles_separate() {
    init_logger();
    let mut world = World::new(Vec2::ZERO);
    let a = add_ball(&mut world, Vec2::ZERO, 0.5, 0.0);
    let b = add_ball(&mut world, Vec2::new(0.5, 0.0), 0.5, 0.0);

    run(&mut world, 120);

    let distance = world
        .body(a)
        .expect("a")
        .position()
        .distance(world.body(b).expect("b").position());
    assert!(distance >= 1.0 - 3.0 * LINEAR_SLOP - 1e-6, "distance = {}", distance);
}

struct ImpulseRecorder {
    min_normal: Rc<RefCell<f64>>,
    reports: Rc<RefCell<usize>>,
}

impl ContactListener for ImpulseRecorder {
    fn post_solve(&mut self, _contact: &Contact, impulse: &ContactImpulse) {
        let mut min = self.min_normal.borrow_mut();
        for &normal in &impulse.normal_impulses[..impulse.count] {
            *min = min.min(normal);
        }
        *self.reports.borrow_mut() += 1;
    }
}

#[test]
fn test_normal_impulses_never_pull() {
    init_logger();
    let mut world = World::default();
    add_ground(&mut world);
    for i in 0..4 {
        add_box(&mut world, Vec2::new(0.0, 0.5 + 1.0 * i as f64), 0.5);
    }

    let min_normal = Rc::new(RefCell::new(f64::MAX));
    let reports = Rc::new(RefCell::new(0));
    world.set_contact_listener(Box::new(ImpulseRecorder {
        min_normal: Rc::clone(&min_normal),
        reports: Rc::clone(&reports),
    }));

    run(&mut world, 90);

    assert!(*reports.borrow() > 0);
    assert!(*min_normal.borrow() >= 0.0);
}

fn max_rebound_speed(restitution: f64) -> f64 {
    let mut world = World::default();
    let mut ground_def = FixtureDef::new(Edge::new(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)).expect("edge"));
    ground_def.material = Material::new(1.0, 0.2, restitution).expect("material");
    let ground = world.create_body(&BodyDef::static_body(Vec2::ZERO)).expect("body");
    world.create_fixture(ground, &ground_def).expect("ground");
    let ball = add_ball(&mut world, Vec2::new(0.0, 5.0), 0.5, restitution);

    let mut max_up: f64 = 0.0;
    for _ in 0..90 {
        world.step(DT, 8, 3).expect("step");
        max_up = max_up.max(world.body(ball).expect("ball").linear_velocity().y);
    }
    max_up
}

#[test]
fn test_restitution_controls_rebound() {
    init_logger();
    // Free fall over 4.5 m hits at about 9.5 m/s.
    let impact_speed = (2.0 * 10.0 * 4.5f64).sqrt();

    let inelastic = max_rebound_speed(0.0);
    let elastic = max_rebound_speed(1.0);

    assert!(inelastic < 0.5, "inelastic rebound {}", inelastic);
    assert!(elastic > 0.85 * impact_speed, "elastic rebound {}", elastic);
    assert!(elastic < 1.1 * impact_speed, "elastic rebound {}", elastic);
}

#[test]
fn test_sensor_reports_overlap_without_response() {
    init_logger();
    let mut world = World::new(Vec2::ZERO);
    let zone = world.create_body(&BodyDef::static_body(Vec2::ZERO)).expect("body");
    world
        .create_fixture(zone, &FixtureDef::new(Circle::new(1.0).expect("circle")).sensor())
        .expect("sensor");

    let body = world
        .create_body(&BodyDef {
            linear_velocity: Vec2::new(2.0, 0.0),
            ..BodyDef::dynamic(Vec2::new(-3.0, 0.0))
        })
        .expect("body");
    world
        .create_fixture(body, &FixtureDef::new(Circle::new(0.25).expect("circle")))
        .expect("fixture");

    run(&mut world, 60);

    let body = world.body(body).expect("body");
    assert!((body.linear_velocity().x - 2.0).abs() < 1e-12);
    assert!(world.contacts().all(|(_, contact)| contact.manifold().point_count == 0));
}

// ============================================================================
// Body definitions
// ============================================================================

#[test]
fn test_body_def_flags_round_trip() {
    init_logger();
    let mut world = World::default();
    let def = BodyDef {
        body_type: BodyType::Dynamic,
        position: Vec2::new(1.0, 2.0),
        angle: 0.25,
        linear_velocity: Vec2::new(0.5, 0.0),
        angular_velocity: -0.5,
        linear_damping: 0.1,
        angular_damping: 0.2,
        allow_sleep: false,
        awake: false,
        fixed_rotation: true,
        bullet: true,
        active: false,
        gravity_scale: 2.0,
        user_data: 42,
    };
    let handle = world.create_body(&def).expect("body");
    let body = world.body(handle).expect("body");

    assert_eq!(body.body_type(), BodyType::Dynamic);
    assert_eq!(body.position(), Vec2::new(1.0, 2.0));
    assert_eq!(body.angle(), 0.25);
    assert_eq!(body.linear_velocity(), Vec2::new(0.5, 0.0));
    assert_eq!(body.angular_velocity(), -0.5);
    assert_eq!(body.linear_damping(), 0.1);
    assert_eq!(body.angular_damping(), 0.2);
    assert!(!body.is_sleeping_allowed());
    assert!(!body.is_awake());
    assert!(body.is_fixed_rotation());
    assert!(body.is_bullet());
    assert!(!body.is_active());
    assert_eq!(body.gravity_scale(), 2.0);
    assert_eq!(body.user_data, 42);
}

#[test]
fn test_body_def_from_json() {
    let def: BodyDef =
        serde_json::from_str(r#"{ "body_type": "Dynamic", "position": { "x": 1.0, "y": 3.0 }, "bullet": true }"#)
            .expect("body def");
    assert_eq!(def.body_type, BodyType::Dynamic);
    assert_eq!(def.position, Vec2::new(1.0, 3.0));
    assert!(def.bullet);
    assert!(def.active);
    assert_eq!(def.gravity_scale, 1.0);
}

#[test]
fn test_fixture_def_json_rejects_bad_geometry() {
    let rejected = [
        r#"{ "shape": { "Circle": { "radius": -2.0 } } }"#,
        r#"{ "shape": { "Edge": { "v1": { "x": 1.0, "y": 1.0 }, "v2": { "x": 1.0, "y": 1.0 } } } }"#,
        r#"{ "shape": { "Polygon": { "vertices": [{ "x": 0.0, "y": 0.0 }, { "x": 1.0, "y": 0.0 }, { "x": 2.0, "y": 0.0 }] } } }"#,
        r#"{ "shape": { "Chain": { "vertices": [{ "x": 0.0, "y": 0.0 }, { "x": 0.0, "y": 0.0 }] } } }"#,
    ];
    for json in rejected {
        assert!(serde_json::from_str::<FixtureDef>(json).is_err(), "accepted {}", json);
    }

    let json = r#"{ "shape": { "Chain": { "closed": true, "vertices": [
        { "x": -5.0, "y": 0.0 }, { "x": 5.0, "y": 0.0 }, { "x": 5.0, "y": 5.0 }, { "x": -5.0, "y": 5.0 }
    ] } } }"#;
    let def: FixtureDef = serde_json::from_str(json).expect("chain fixture");
    let mut world = World::default();
    let ground = world.create_body(&BodyDef::static_body(Vec2::ZERO)).expect("body");
    let fixture = world.create_fixture(ground, &def).expect("fixture");
    assert_eq!(world.fixture(fixture).expect("fixture").child_count(), 4);
    assert_eq!(world.proxy_count(), 4);
}

// ============================================================================
// Chains
// ============================================================================

#[test]
fn test_box_slides_across_chain_joints() {
    init_logger();
    let mut world = World::default();
    let ground = world.create_body(&BodyDef::static_body(Vec2::ZERO)).expect("body");
    let floor: Vec<Vec2> = (-20..=20).map(|x| Vec2::new(x as f64, 0.0)).collect();
    let chain = Chain::new(floor).expect("chain");
    world
        .create_fixture(ground, &FixtureDef::new(chain).with_friction(0.0))
        .expect("chain fixture");

    let body = world
        .create_body(&BodyDef {
            linear_velocity: Vec2::new(6.0, 0.0),
            ..BodyDef::dynamic(Vec2::new(-15.0, 0.5))
        })
        .expect("body");
    let shape = Polygon::new_box(0.5, 0.5).expect("box");
    world
        .create_fixture(body, &FixtureDef::new(shape).with_friction(0.0))
        .expect("box fixture");

    for _ in 0..120 {
        world.step(DT, 8, 3).expect("step");
        let body = world.body(body).expect("body");
        assert!(body.linear_velocity().x > 5.5, "snagged at {:?}", body.position());
    }

    let body = world.body(body).expect("body");
    assert!(body.position().x > -5.0);
    assert!((body.position().y - 0.5).abs() < 0.05);
    assert!(body.angle().abs() < 0.01);
}

#[test]
fn test_chain_loop_keeps_ball_inside() {
    init_logger();
    let mut world = World::default();
    let walls = world.create_body(&BodyDef::static_body(Vec2::ZERO)).expect("body");
    let outline = vec![
        Vec2::new(-5.0, 0.0),
        Vec2::new(5.0, 0.0),
        Vec2::new(5.0, 10.0),
        Vec2::new(-5.0, 10.0),
    ];
    let chain = Chain::new_loop(outline).expect("chain");
    world.create_fixture(walls, &FixtureDef::new(chain)).expect("chain fixture");

    let ball = world
        .create_body(&BodyDef {
            linear_velocity: Vec2::new(25.0, 10.0),
            ..BodyDef::dynamic(Vec2::new(0.0, 5.0))
        })
        .expect("body");
    world
        .create_fixture(ball, &FixtureDef::new(Circle::new(0.25).expect("circle")).with_restitution(0.8))
        .expect("ball fixture");

    run(&mut world, 300);

    let position = world.body(ball).expect("ball").position();
    assert!(position.x.abs() < 5.0 && position.y > 0.0 && position.y < 10.0, "ball escaped to {:?}", position);
}

// ============================================================================
// Sleeping
// ============================================================================

#[test]
fn test_resting_stack_sleeps_and_wakes_together() {
    init_logger();
    let mut world = World::default();
    add_ground(&mut world);
    let bottom = add_box(&mut world, Vec2::new(0.0, 0.5), 0.5);
    let top = add_box(&mut world, Vec2::new(0.0, 1.5), 0.5);

    let mut steps = 0;
    while world.body(bottom).expect("bottom").is_awake() || world.body(top).expect("top").is_awake() {
        world.step(DT, 8, 3).expect("step");
        steps += 1;
        assert!(steps < 600, "stack never fell asleep");
    }

    world.body_mut(top).expect("top").set_awake(true);
    world.step(DT, 8, 3).expect("step");

    assert!(world.body(top).expect("top").is_awake());
    assert!(world.body(bottom).expect("bottom").is_awake());
}

#[test]
fn test_disallowing_sleep_wakes_everything() {
    init_logger();
    let mut world = World::default();
    add_ground(&mut world);
    let ball = add_ball(&mut world, Vec2::new(0.0, 0.5), 0.5, 0.0);
    run(&mut world, 300);
    assert!(!world.body(ball).expect("ball").is_awake());

    world.set_allow_sleep(false);
    assert!(world.body(ball).expect("ball").is_awake());
    run(&mut world, 120);
    assert!(world.body(ball).expect("ball").is_awake());
}

// ============================================================================
// Callbacks
// ============================================================================

struct Destroyer {
    target: BodyHandle,
    begins: Rc<RefCell<usize>>,
}

impl ContactListener for Destroyer {
    fn begin_contact(&mut self, world: &World, event: &ContactEvent, commands: &mut CommandBuffer) {
        *self.begins.borrow_mut() += 1;
        assert!(world.fixture(event.fixture_a).is_ok());
        if event.body_a == self.target || event.body_b == self.target {
            commands.destroy_body(self.target);
            // Queued twice on purpose: the second request finds a stale handle.
            commands.destroy_body(self.target);
        }
    }
}

#[test]
fn test_destroy_body_inside_begin_contact() {
    init_logger();
    let mut world = World::default();
    let ground = add_ground(&mut world);
    let ball = add_ball(&mut world, Vec2::new(0.0, 2.0), 0.5, 0.0);
    let begins = Rc::new(RefCell::new(0));
    world.set_contact_listener(Box::new(Destroyer {
        target: ball,
        begins: Rc::clone(&begins),
    }));

    run(&mut world, 120);

    assert_eq!(*begins.borrow(), 1);
    assert!(matches!(world.body(ball), Err(PhysicsError::InvalidHandle(HandleKind::Body))));
    assert_eq!(world.body_count(), 1);
    assert_eq!(world.contact_count(), 0);
    assert!(world.body(ground).expect("ground").contact_edges().is_empty());
}

struct EndCounter {
    ends: Rc<RefCell<usize>>,
}

impl ContactListener for EndCounter {
    fn end_contact(&mut self, _world: &World, _event: &ContactEvent, _commands: &mut CommandBuffer) {
        *self.ends.borrow_mut() += 1;
    }
}

#[test]
fn test_destroying_touching_body_reports_end() {
    init_logger();
    let mut world = World::default();
    add_ground(&mut world);
    let ball = add_ball(&mut world, Vec2::new(0.0, 0.45), 0.5, 0.0);
    let ends = Rc::new(RefCell::new(0));
    world.set_contact_listener(Box::new(EndCounter { ends: Rc::clone(&ends) }));

    run(&mut world, 2);
    world.destroy_body(ball).expect("destroy");
    run(&mut world, 1);
    assert_eq!(*ends.borrow(), 1);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_invalid_construction_is_rejected() {
    assert!(matches!(Circle::new(-1.0), Err(PhysicsError::InvalidRadius(_))));
    assert!(matches!(
        Polygon::new(vec![Vec2::ZERO, Vec2::new(1.0, 0.0)]),
        Err(PhysicsError::TooFewVertices(2))
    ));
    assert!(matches!(
        Edge::new(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0)),
        Err(PhysicsError::DegenerateEdge)
    ));
    assert!(matches!(Material::new(1.0, -0.1, 0.0), Err(PhysicsError::InvalidFriction(_))));
    assert!(matches!(Material::new(1.0, 0.2, 1.5), Err(PhysicsError::InvalidRestitution(_))));

    let mut world = World::default();
    let body = world.create_body(&BodyDef::dynamic(Vec2::ZERO)).expect("body");
    let mut def = FixtureDef::new(Circle::new(0.5).expect("circle"));
    def.material.density = -1.0;
    assert!(matches!(world.create_fixture(body, &def), Err(PhysicsError::InvalidDensity(_))));
    assert_eq!(world.fixture_count(), 0);
}

#[test]
fn test_stale_handles_error_out() {
    let mut world = World::default();
    let a = add_ball(&mut world, Vec2::ZERO, 0.5, 0.0);
    let b = add_ball(&mut world, Vec2::new(3.0, 0.0), 0.5, 0.0);
    let fixture = world.body(a).expect("a").fixtures()[0];
    world.destroy_body(a).expect("destroy");

    assert!(matches!(world.body(a), Err(PhysicsError::InvalidHandle(HandleKind::Body))));
    assert!(matches!(world.body_mut(a), Err(PhysicsError::InvalidHandle(HandleKind::Body))));
    assert!(matches!(world.destroy_body(a), Err(PhysicsError::InvalidHandle(HandleKind::Body))));
    assert!(matches!(world.fixture(fixture), Err(PhysicsError::InvalidHandle(HandleKind::Fixture))));
    assert!(matches!(
        world.create_fixture(a, &FixtureDef::new(Circle::new(0.5).expect("circle"))),
        Err(PhysicsError::InvalidHandle(HandleKind::Body))
    ));
    assert!(matches!(
        world.create_joint(impulse2d::constraints::DistanceJointDef::new(a, b)),
        Err(PhysicsError::InvalidHandle(HandleKind::Body))
    ));
    assert!(matches!(
        world.create_joint(impulse2d::constraints::DistanceJointDef::new(b, b)),
        Err(PhysicsError::InvalidJoint(_))
    ));
}

#[test]
fn test_zero_iterations_is_a_precondition_error() {
    let mut world = World::default();
    add_ball(&mut world, Vec2::ZERO, 0.5, 0.0);
    assert!(matches!(world.step(DT, 0, 3), Err(PhysicsError::Precondition(_))));
    assert!(matches!(world.step(DT, 8, 0), Err(PhysicsError::Precondition(_))));
    assert!(world.step(0.0, 8, 3).is_ok());
}

// ============================================================================
// Continuous collision
// ============================================================================

#[test]
fn test_bullet_does_not_tunnel_through_thin_wall() {
    init_logger();
    let mut world = World::new(Vec2::ZERO);
    let wall = world.create_body(&BodyDef::static_body(Vec2::ZERO)).expect("body");
    world
        .create_fixture(wall, &FixtureDef::new(Polygon::new_box(5.0, 0.05).expect("wall")))
        .expect("wall fixture");

    let bullet = world
        .create_body(&BodyDef {
            bullet: true,
            linear_velocity: Vec2::new(0.0, -300.0),
            ..BodyDef::dynamic(Vec2::new(0.0, 5.0))
        })
        .expect("body");
    world
        .create_fixture(bullet, &FixtureDef::new(Circle::new(0.1).expect("circle")))
        .expect("bullet fixture");

    run(&mut world, 20);

    let y = world.body(bullet).expect("bullet").position().y;
    assert!(y > 0.0, "bullet tunnelled to y = {}", y);
}

#[test]
fn test_fast_body_stops_on_edge_ground() {
    init_logger();
    let mut world = World::default();
    add_ground(&mut world);
    let body = world
        .create_body(&BodyDef {
            linear_velocity: Vec2::new(0.0, -200.0),
            ..BodyDef::dynamic(Vec2::new(0.0, 4.0))
        })
        .expect("body");
    world
        .create_fixture(body, &FixtureDef::new(Polygon::new_box(0.2, 0.2).expect("box")))
        .expect("fixture");

    run(&mut world, 30);

    let y = world.body(body).expect("body").position().y;
    assert!(y > 0.0, "body fell through the ground to y = {}", y);
}

// ============================================================================
// Broad-phase
// ============================================================================

#[test]
fn test_broad_phase_stays_balanced_and_enclosing() {
    init_logger();
    let mut world = World::default();
    add_ground(&mut world);
    for i in 0..10 {
        for j in 0..10 {
            add_ball(&mut world, Vec2::new(i as f64 * 1.5 - 7.0, 1.0 + j as f64 * 1.2), 0.4, 0.0);
        }
    }

    for _ in 0..60 {
        world.step(DT, 8, 3).expect("step");
        assert!(world.validate_broad_phase());
    }

    assert_eq!(world.proxy_count(), 101);
    // 101 leaves: a degenerate list would be 100 deep.
    assert!(world.tree_height() < 20, "tree height {}", world.tree_height());
    assert!(world.tree_quality() >= 1.0);
}

#[test]
fn test_query_and_ray_cast_see_moved_bodies() {
    init_logger();
    let mut world = World::new(Vec2::ZERO);
    let body = add_ball(&mut world, Vec2::ZERO, 0.5, 0.0);
    world.set_transform(body, Vec2::new(0.0, 20.0), 0.0).expect("transform");
    run(&mut world, 1);

    let mut hits = 0;
    world.query_aabb(&AABB::new(Vec2::new(-1.0, 19.0), Vec2::new(1.0, 21.0)), |_| {
        hits += 1;
        true
    });
    assert_eq!(hits, 1);

    let mut fraction = None;
    world.ray_cast(Vec2::new(0.0, 10.0), Vec2::new(0.0, 30.0), |hit| {
        fraction = Some(hit.fraction);
        hit.fraction
    });
    let fraction = fraction.expect("ray hit");
    assert!((fraction - 0.475).abs() < 1e-9);
}
