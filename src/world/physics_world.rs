use std::fmt;

use log::{debug, trace, warn};
use slotmap::SlotMap;

use crate::collision::aabb::{RayCastInput, AABB};
use crate::collision::broad_phase::BroadPhase;
use crate::collision::distance::DistanceProxy;
use crate::collision::time_of_impact::{time_of_impact, ToiInput, ToiState};
use crate::common::error::{HandleKind, PhysicsError, PhysicsResult};
use crate::common::settings::{WorldSettings, TOI_POSITION_ITERATIONS};
use crate::constraints::{Joint, JointDef};
use crate::integration::TimeStep;
use crate::math::transform::Transform;
use crate::math::vec2::Vec2;
use crate::objects::{
    Body, BodyDef, BodyHandle, BodyType, ContactHandle, Filter, Fixture, FixtureDef, FixtureHandle, JointEdge,
    JointHandle, ProxyKey,
};
use crate::shapes::MassData;
use crate::solver::island::Island;
use crate::world::callbacks::{
    Command, CommandBuffer, ContactEventKind, ContactFilter, ContactListener, RayCastHit,
};
use crate::world::contact::Contact;
use crate::world::contact_manager::{ContactManager, Listener};

/// Owns every body, fixture, joint and contact, and advances them in time.
pub struct World {
    bodies: SlotMap<BodyHandle, Body>,
    fixtures: SlotMap<FixtureHandle, Fixture>,
    joints: SlotMap<JointHandle, Joint>,
    contact_manager: ContactManager,
    settings: WorldSettings,
    listener: Listener,

    island: Island,
    stack: Vec<BodyHandle>,
    commands: CommandBuffer,

    /// A fixture was added since the last step; new pairs must be found first.
    new_fixture: bool,
    /// False while a sub-stepped TOI pass is still in progress.
    step_complete: bool,
    /// Inverse of the previous time step, for warm-start scaling.
    inv_dt0: f64,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("bodies", &self.bodies.len())
            .field("fixtures", &self.fixtures.len())
            .field("joints", &self.joints.len())
            .field("contacts", &self.contact_manager.contacts.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        World::with_settings(WorldSettings::default())
    }
}

/// Recomputes the fat AABBs of a body's proxies from its swept motion.
fn synchronize_fixtures(
    body: &Body,
    fixtures: &mut SlotMap<FixtureHandle, Fixture>,
    broad_phase: &mut BroadPhase<ProxyKey>,
) {
    let xf1 = body.sweep.transform_at(0.0);
    let xf2 = body.xf;

    for &handle in &body.fixtures {
        if let Some(fixture) = fixtures.get_mut(handle) {
            fixture.synchronize(broad_phase, &xf1, &xf2);
        }
    }
}

impl World {
    /// Creates an empty world with default settings and the given gravity.
    pub fn new(gravity: Vec2) -> Self {
        World::with_settings(WorldSettings::default().with_gravity(gravity))
    }

    pub fn with_settings(settings: WorldSettings) -> Self {
        World {
            bodies: SlotMap::with_key(),
            fixtures: SlotMap::with_key(),
            joints: SlotMap::with_key(),
            contact_manager: ContactManager::default(),
            settings,
            listener: None,
            island: Island::default(),
            stack: Vec::new(),
            commands: CommandBuffer::default(),
            new_fixture: false,
            step_complete: true,
            inv_dt0: 0.0,
        }
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn gravity(&self) -> Vec2 {
        self.settings.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.settings.gravity = gravity;
    }

    /// Disallowing sleep wakes every body.
    pub fn set_allow_sleep(&mut self, flag: bool) {
        if flag == self.settings.allow_sleep {
            return;
        }
        self.settings.allow_sleep = flag;
        if !flag {
            for body in self.bodies.values_mut() {
                body.set_awake(true);
            }
        }
    }

    pub fn set_warm_starting(&mut self, flag: bool) {
        self.settings.warm_starting = flag;
    }

    pub fn set_continuous_physics(&mut self, flag: bool) {
        self.settings.continuous_physics = flag;
    }

    /// Ends each step after the first TOI event. For debugging continuous collision.
    pub fn set_sub_stepping(&mut self, flag: bool) {
        self.settings.sub_stepping = flag;
    }

    pub fn set_auto_clear_forces(&mut self, flag: bool) {
        self.settings.auto_clear_forces = flag;
    }

    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.listener = Some(listener);
    }

    pub fn clear_contact_listener(&mut self) {
        self.listener = None;
    }

    /// Replaces the category/mask/group filter.
    pub fn set_contact_filter(&mut self, filter: Box<dyn ContactFilter>) {
        self.contact_manager.filter = filter;
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    /// Fails with [`PhysicsError::Precondition`] if the definition holds non-finite state.
    pub fn create_body(&mut self, def: &BodyDef) -> PhysicsResult<BodyHandle> {
        def.validate()?;
        let handle = self.bodies.insert(Body::new(def));
        debug!("created {:?} body {:?} at {:?}", def.body_type, handle, def.position);
        Ok(handle)
    }

    /// Destroys a body together with its joints, contacts and fixtures.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> PhysicsResult<()> {
        let body = self.bodies.get(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Body))?;
        let joints: Vec<JointHandle> = body.joint_edges.iter().map(|edge| edge.joint).collect();
        let contacts: Vec<ContactHandle> = body.contact_edges.iter().map(|edge| edge.contact).collect();

        for joint in joints {
            self.remove_joint(joint);
        }
        for contact in contacts {
            self.contact_manager.destroy(contact, &mut self.bodies);
        }

        if let Some(body) = self.bodies.remove(handle) {
            for fixture in body.fixtures {
                if let Some(mut fixture) = self.fixtures.remove(fixture) {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
        }
        debug!("destroyed body {:?}", handle);
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> PhysicsResult<&Body> {
        self.bodies.get(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Body))
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> PhysicsResult<&mut Body> {
        self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Body))
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleports a body. Contacts are updated on the next step.
    pub fn set_transform(&mut self, handle: BodyHandle, position: Vec2, angle: f64) -> PhysicsResult<()> {
        if !(position.is_valid() && angle.is_finite()) {
            return Err(PhysicsError::Precondition("body transform must be finite"));
        }
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Body))?;
        body.xf = Transform::new(position, angle);
        body.sweep.c = body.xf.apply(body.sweep.local_center);
        body.sweep.a = angle;
        body.sweep.c0 = body.sweep.c;
        body.sweep.a0 = angle;

        synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        self.new_fixture = true;
        Ok(())
    }

    /// Inactive bodies have no proxies and no contacts, and are skipped by the solver.
    pub fn set_active(&mut self, handle: BodyHandle, flag: bool) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Body))?;
        if body.active == flag {
            return Ok(());
        }
        body.active = flag;

        if flag {
            let xf = body.xf;
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.create_proxies(&mut self.contact_manager.broad_phase, &xf, fixture_handle);
                }
            }
            self.new_fixture = true;
        } else {
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
            self.destroy_contacts_of(handle);
        }
        Ok(())
    }

    pub fn set_body_type(&mut self, handle: BodyHandle, body_type: BodyType) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Body))?;
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        body.reset_mass_data(&self.fixtures);

        if body_type == BodyType::Static {
            body.linear_velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }

        body.set_awake(true);
        body.clear_forces();

        let fixtures: Vec<FixtureHandle> = body.fixtures.clone();
        self.destroy_contacts_of(handle);
        for fixture in fixtures {
            if let Some(fixture) = self.fixtures.get(fixture) {
                fixture.touch_proxies(&mut self.contact_manager.broad_phase);
            }
        }
        Ok(())
    }

    pub fn set_fixed_rotation(&mut self, handle: BodyHandle, flag: bool) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Body))?;
        if body.fixed_rotation == flag {
            return Ok(());
        }
        body.fixed_rotation = flag;
        body.angular_velocity = 0.0;
        body.reset_mass_data(&self.fixtures);
        Ok(())
    }

    /// Recomputes mass properties from the body's fixtures.
    pub fn reset_mass_data(&mut self, handle: BodyHandle) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Body))?;
        body.reset_mass_data(&self.fixtures);
        Ok(())
    }

    /// Overrides the mass properties of a dynamic body. `inertia` is about the body origin.
    pub fn set_mass_data(&mut self, handle: BodyHandle, mass_data: &MassData) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Body))?;
        body.set_mass_data(mass_data);
        Ok(())
    }

    fn destroy_contacts_of(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get(handle) else {
            return;
        };
        let contacts: Vec<ContactHandle> = body.contact_edges.iter().map(|edge| edge.contact).collect();
        for contact in contacts {
            self.contact_manager.destroy(contact, &mut self.bodies);
        }
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    /// Attaches a shape to a body and updates the body's mass.
    pub fn create_fixture(&mut self, body_handle: BodyHandle, def: &FixtureDef) -> PhysicsResult<FixtureHandle> {
        let body = self
            .bodies
            .get_mut(body_handle)
            .ok_or(PhysicsError::InvalidHandle(HandleKind::Body))?;
        let fixture = Fixture::new(body_handle, def)?;

        let handle = self.fixtures.insert(fixture);
        if body.active {
            let xf = body.xf;
            self.fixtures[handle].create_proxies(&mut self.contact_manager.broad_phase, &xf, handle);
        }

        body.fixtures.push(handle);
        body.reset_mass_data(&self.fixtures);

        self.new_fixture = true;
        Ok(handle)
    }

    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> PhysicsResult<()> {
        let body_handle = self
            .fixtures
            .get(handle)
            .ok_or(PhysicsError::InvalidHandle(HandleKind::Fixture))?
            .body;

        if let Some(body) = self.bodies.get(body_handle) {
            let contacts: Vec<ContactHandle> = body
                .contact_edges
                .iter()
                .map(|edge| edge.contact)
                .filter(|&contact| {
                    self.contact_manager
                        .contacts
                        .get(contact)
                        .is_some_and(|c| c.fixture_a == handle || c.fixture_b == handle)
                })
                .collect();
            for contact in contacts {
                self.contact_manager.destroy(contact, &mut self.bodies);
            }
        }

        if let Some(mut fixture) = self.fixtures.remove(handle) {
            fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
        }
        if let Some(body) = self.bodies.get_mut(body_handle) {
            body.fixtures.retain(|&f| f != handle);
            body.reset_mass_data(&self.fixtures);
        }
        Ok(())
    }

    pub fn fixture(&self, handle: FixtureHandle) -> PhysicsResult<&Fixture> {
        self.fixtures.get(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Fixture))
    }

    pub fn fixture_mut(&mut self, handle: FixtureHandle) -> PhysicsResult<&mut Fixture> {
        self.fixtures.get_mut(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Fixture))
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Changes collision filtering. Existing contacts are re-checked on the next step.
    pub fn set_filter_data(&mut self, handle: FixtureHandle, filter: Filter) -> PhysicsResult<()> {
        let fixture = self
            .fixtures
            .get_mut(handle)
            .ok_or(PhysicsError::InvalidHandle(HandleKind::Fixture))?;
        fixture.filter = filter;
        let body_handle = fixture.body;

        if let Some(body) = self.bodies.get(body_handle) {
            for edge in &body.contact_edges {
                if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                    if contact.fixture_a == handle || contact.fixture_b == handle {
                        contact.flag_for_filtering();
                    }
                }
            }
        }
        if let Some(fixture) = self.fixtures.get(handle) {
            fixture.touch_proxies(&mut self.contact_manager.broad_phase);
        }
        Ok(())
    }

    /// Turns a fixture into a sensor or back, waking its body.
    pub fn set_sensor(&mut self, handle: FixtureHandle, flag: bool) -> PhysicsResult<()> {
        let fixture = self
            .fixtures
            .get_mut(handle)
            .ok_or(PhysicsError::InvalidHandle(HandleKind::Fixture))?;
        if fixture.is_sensor != flag {
            fixture.is_sensor = flag;
            if let Some(body) = self.bodies.get_mut(fixture.body) {
                body.set_awake(true);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Joints
    // ------------------------------------------------------------------

    pub fn create_joint(&mut self, def: impl Into<JointDef>) -> PhysicsResult<JointHandle> {
        let def = def.into();
        let (body_a, body_b) = def.bodies();
        if !self.bodies.contains_key(body_a) || !self.bodies.contains_key(body_b) {
            return Err(PhysicsError::InvalidHandle(HandleKind::Body));
        }
        let joint = Joint::new(def)?;
        let joint_type = joint.joint_type();
        let collide_connected = joint.collide_connected;
        let handle = self.joints.insert(joint);

        for (body, other) in [(body_a, body_b), (body_b, body_a)] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.joint_edges.push(JointEdge {
                    joint: handle,
                    other,
                    collide_connected,
                });
                body.set_awake(true);
            }
        }

        if !collide_connected {
            self.flag_contacts_between(body_a, body_b);
        }
        debug!("created {:?} joint {:?}", joint_type, handle);
        Ok(handle)
    }

    pub fn destroy_joint(&mut self, handle: JointHandle) -> PhysicsResult<()> {
        if !self.remove_joint(handle) {
            return Err(PhysicsError::InvalidHandle(HandleKind::Joint));
        }
        Ok(())
    }

    fn remove_joint(&mut self, handle: JointHandle) -> bool {
        let Some(joint) = self.joints.remove(handle) else {
            return false;
        };
        for body in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.joint_edges.retain(|edge| edge.joint != handle);
                body.set_awake(true);
            }
        }
        if !joint.collide_connected {
            self.flag_contacts_between(joint.body_a, joint.body_b);
        }
        debug!("destroyed joint {:?}", handle);
        true
    }

    /// Makes the next collide pass re-run filtering between two bodies.
    fn flag_contacts_between(&mut self, body_a: BodyHandle, body_b: BodyHandle) {
        let Some(body) = self.bodies.get(body_b) else {
            return;
        };
        for edge in body.contact_edges.iter().filter(|edge| edge.other == body_a) {
            if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                contact.flag_for_filtering();
            }
        }
    }

    pub fn joint(&self, handle: JointHandle) -> PhysicsResult<&Joint> {
        self.joints.get(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Joint))
    }

    pub fn joint_mut(&mut self, handle: JointHandle) -> PhysicsResult<&mut Joint> {
        self.joints.get_mut(handle).ok_or(PhysicsError::InvalidHandle(HandleKind::Joint))
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // ------------------------------------------------------------------
    // Contacts and queries
    // ------------------------------------------------------------------

    pub fn contact(&self, handle: ContactHandle) -> Option<&Contact> {
        self.contact_manager.contacts.get(handle)
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactHandle, &Contact)> {
        self.contact_manager.contacts.iter()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contacts.len()
    }

    pub fn proxy_count(&self) -> usize {
        self.contact_manager.broad_phase.proxy_count()
    }

    /// Height of the broad-phase tree.
    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.tree().height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.contact_manager.broad_phase.tree().max_balance()
    }

    /// Sum of node perimeters over the root perimeter. Lower is better.
    pub fn tree_quality(&self) -> f64 {
        self.contact_manager.broad_phase.tree().area_ratio()
    }

    /// Checks the broad-phase tree structure, and that every proxy's fat AABB
    /// encloses its fixture's AABB.
    pub fn validate_broad_phase(&self) -> bool {
        let tree = self.contact_manager.broad_phase.tree();
        tree.validate()
            && self.fixtures.values().all(|fixture| {
                fixture
                    .proxies
                    .iter()
                    .all(|proxy| tree.fat_aabb(proxy.id).contains(&proxy.aabb))
            })
    }

    /// Reports every fixture whose fat AABB overlaps `aabb`. Return false to stop.
    /// A chain is reported once per overlapping segment.
    pub fn query_aabb<F: FnMut(FixtureHandle) -> bool>(&self, aabb: &AABB, mut callback: F) {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy| match broad_phase.user_data(proxy) {
            Some(key) => callback(key.fixture),
            None => true,
        });
    }

    /// Casts a ray from `p1` to `p2`. The callback returns the new max fraction:
    /// 0 terminates, the hit's fraction finds the closest hit, 1 finds all hits,
    /// and -1 ignores the fixture.
    pub fn ray_cast<F: FnMut(RayCastHit) -> f64>(&self, p1: Vec2, p2: Vec2, mut callback: F) {
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.ray_cast(&input, |sub_input, proxy| {
            let Some(key) = broad_phase.user_data(proxy) else {
                return sub_input.max_fraction;
            };
            let handle = key.fixture;
            let Some(fixture) = self.fixtures.get(handle) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                return sub_input.max_fraction;
            };
            match fixture.shape.ray_cast(sub_input, &body.xf, key.child) {
                Some(output) => callback(RayCastHit {
                    fixture: handle,
                    point: p1 * (1.0 - output.fraction) + p2 * output.fraction,
                    normal: output.normal,
                    fraction: output.fraction,
                }),
                None => sub_input.max_fraction,
            }
        });
    }

    /// Zeroes the force and torque of every body. Called after each step unless
    /// `auto_clear_forces` is off.
    pub fn clear_forces(&mut self) {
        for body in self.bodies.values_mut() {
            body.clear_forces();
        }
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advances the world by `dt` seconds.
    ///
    /// Collects contacts, solves every awake island, resolves time of impact
    /// for fast bodies, then delivers begin/end contact events and applies the
    /// destruction requests queued from them.
    pub fn step(&mut self, dt: f64, velocity_iterations: usize, position_iterations: usize) -> PhysicsResult<()> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(PhysicsError::Precondition("time step must be finite and non-negative"));
        }
        if velocity_iterations == 0 || position_iterations == 0 {
            warn!(
                "step rejected: {} velocity and {} position iterations",
                velocity_iterations, position_iterations
            );
            return Err(PhysicsError::Precondition("iteration counts must be positive"));
        }

        // New fixtures need their contacts before the narrow phase runs.
        if self.new_fixture {
            self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures);
            self.new_fixture = false;
        }

        let mut step = TimeStep::new(dt, velocity_iterations, position_iterations);
        step.dt_ratio = self.inv_dt0 * dt;
        step.warm_starting = self.settings.warm_starting;

        self.contact_manager
            .collide(&mut self.bodies, &self.fixtures, &mut self.listener);
        trace!("{} contacts after collide", self.contact_manager.contacts.len());

        if self.step_complete && step.dt > 0.0 {
            self.solve(&step);
        }

        if self.settings.continuous_physics && step.dt > 0.0 {
            self.solve_toi(&step);
        }

        if step.dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }

        if self.settings.auto_clear_forces {
            self.clear_forces();
        }

        self.dispatch_events();
        self.flush_commands();
        Ok(())
    }

    /// Builds islands from awake bodies and solves each of them.
    fn solve(&mut self, step: &TimeStep) {
        for body in self.bodies.values_mut() {
            body.island = false;
        }
        for contact in self.contact_manager.contacts.values_mut() {
            contact.island = false;
        }
        for joint in self.joints.values_mut() {
            joint.island = false;
        }

        let seeds: Vec<BodyHandle> = self.bodies.keys().collect();
        let mut island_count = 0;
        for seed in seeds {
            {
                let body = &self.bodies[seed];
                if body.island || !body.awake || !body.active || body.body_type == BodyType::Static {
                    continue;
                }
            }

            self.island.clear();
            self.stack.clear();
            self.stack.push(seed);
            self.bodies[seed].island = true;

            // Depth first search over the constraint graph.
            while let Some(handle) = self.stack.pop() {
                let body = &mut self.bodies[handle];
                debug_assert!(body.active);
                self.island.add_body(handle, body);
                body.set_awake(true);

                // Static bodies do not propagate islands.
                if body.body_type == BodyType::Static {
                    continue;
                }

                for i in 0..self.bodies[handle].contact_edges.len() {
                    let edge = self.bodies[handle].contact_edges[i];
                    let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) else {
                        continue;
                    };
                    if contact.island || !contact.enabled || !contact.touching || contact.sensor {
                        continue;
                    }
                    contact.island = true;
                    self.island.add_contact(edge.contact);

                    let other = &mut self.bodies[edge.other];
                    if other.island {
                        continue;
                    }
                    other.island = true;
                    self.stack.push(edge.other);
                }

                for i in 0..self.bodies[handle].joint_edges.len() {
                    let edge = self.bodies[handle].joint_edges[i];
                    let Some(joint) = self.joints.get_mut(edge.joint) else {
                        continue;
                    };
                    if joint.island {
                        continue;
                    }
                    let other = &mut self.bodies[edge.other];
                    if !other.active {
                        continue;
                    }
                    joint.island = true;
                    self.island.add_joint(edge.joint);
                    if other.island {
                        continue;
                    }
                    other.island = true;
                    self.stack.push(edge.other);
                }
            }

            self.island.solve(
                step,
                &self.settings,
                &mut self.bodies,
                &self.fixtures,
                &mut self.contact_manager.contacts,
                &mut self.joints,
                &mut self.listener,
            );
            island_count += 1;

            // Static bodies may take part in other islands.
            for &handle in &self.island.bodies {
                let body = &mut self.bodies[handle];
                if body.body_type == BodyType::Static {
                    body.island = false;
                }
            }
        }
        trace!("solved {} islands", island_count);

        // Bodies that were not in an island did not move.
        for body in self.bodies.values() {
            if body.island && body.body_type != BodyType::Static {
                synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
            }
        }

        self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures);
    }

    /// Time of impact for a contact that needs continuous collision, or `None`
    /// when the pair is handled by the regular solver alone.
    fn compute_toi(&mut self, handle: ContactHandle) -> Option<f64> {
        let contact = &self.contact_manager.contacts[handle];
        let (fixture_a, fixture_b) = (self.fixtures.get(contact.fixture_a)?, self.fixtures.get(contact.fixture_b)?);
        if fixture_a.is_sensor || fixture_b.is_sensor {
            return None;
        }
        let (handle_a, handle_b) = (contact.body_a, contact.body_b);
        let (child_a, child_b) = (contact.child_a, contact.child_b);
        let (body_a, body_b) = (self.bodies.get(handle_a)?, self.bodies.get(handle_b)?);

        let active_a = body_a.awake && body_a.body_type != BodyType::Static;
        let active_b = body_b.awake && body_b.body_type != BodyType::Static;
        if !active_a && !active_b {
            return None;
        }
        let collide_a = body_a.bullet || body_a.body_type != BodyType::Dynamic;
        let collide_b = body_b.bullet || body_b.body_type != BodyType::Dynamic;
        if !collide_a && !collide_b {
            return None;
        }

        // Put both sweeps on the same time interval.
        let alpha0_a = body_a.sweep.alpha0;
        let alpha0_b = body_b.sweep.alpha0;
        let alpha0 = alpha0_a.max(alpha0_b);
        if alpha0_a < alpha0_b {
            self.bodies[handle_a].sweep.advance(alpha0);
        } else if alpha0_b < alpha0_a {
            self.bodies[handle_b].sweep.advance(alpha0);
        }
        debug_assert!(alpha0 < 1.0);

        let proxy_a = DistanceProxy::new(&fixture_a.shape, child_a);
        let proxy_b = DistanceProxy::new(&fixture_b.shape, child_b);
        let output = time_of_impact(&ToiInput {
            proxy_a: &proxy_a,
            proxy_b: &proxy_b,
            sweep_a: self.bodies[handle_a].sweep,
            sweep_b: self.bodies[handle_b].sweep,
            t_max: 1.0,
        });

        // Beta is the fraction of the remaining portion of the step.
        Some(if output.state == ToiState::Touching {
            (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
        } else {
            1.0
        })
    }

    /// Finds the earliest time of impact, moves the bodies back to it, solves
    /// the sub-island around the impact and repeats.
    fn solve_toi(&mut self, step: &TimeStep) {
        if self.step_complete {
            for body in self.bodies.values_mut() {
                body.island = false;
                body.sweep.alpha0 = 0.0;
            }
            for contact in self.contact_manager.contacts.values_mut() {
                contact.toi_valid = false;
                contact.island = false;
                contact.toi_count = 0;
                contact.toi = 1.0;
            }
        }

        let mut toi_events = 0;
        loop {
            let mut min_contact = None;
            let mut min_alpha = 1.0;

            let handles: Vec<ContactHandle> = self.contact_manager.contacts.keys().collect();
            for handle in handles {
                let contact = &self.contact_manager.contacts[handle];
                if !contact.enabled || contact.toi_count > self.settings.max_sub_steps {
                    continue;
                }

                let alpha = if contact.toi_valid {
                    contact.toi
                } else {
                    let Some(alpha) = self.compute_toi(handle) else {
                        continue;
                    };
                    let contact = &mut self.contact_manager.contacts[handle];
                    contact.toi = alpha;
                    contact.toi_valid = true;
                    alpha
                };

                if alpha < min_alpha {
                    min_contact = Some(handle);
                    min_alpha = alpha;
                }
            }

            let Some(min_handle) = min_contact else {
                self.step_complete = true;
                break;
            };
            if min_alpha > 1.0 - 10.0 * f64::EPSILON {
                self.step_complete = true;
                break;
            }

            let (handle_a, handle_b) = {
                let contact = &self.contact_manager.contacts[min_handle];
                (contact.body_a, contact.body_b)
            };
            let backup_a = self.bodies[handle_a].sweep;
            let backup_b = self.bodies[handle_b].sweep;
            self.bodies[handle_a].advance(min_alpha);
            self.bodies[handle_b].advance(min_alpha);

            // The TOI contact likely has some new contact points.
            self.contact_manager
                .update_contact(min_handle, &mut self.bodies, &self.fixtures, &mut self.listener);
            let contact = &mut self.contact_manager.contacts[min_handle];
            contact.toi_valid = false;
            contact.toi_count += 1;

            // Is the contact solid?
            if !contact.enabled || !contact.touching {
                // Restore the sweeps.
                contact.enabled = false;
                for (handle, backup) in [(handle_a, backup_a), (handle_b, backup_b)] {
                    let body = &mut self.bodies[handle];
                    body.sweep = backup;
                    body.synchronize_transform();
                }
                continue;
            }
            contact.island = true;

            self.bodies[handle_a].set_awake(true);
            self.bodies[handle_b].set_awake(true);

            self.island.clear();
            for handle in [handle_a, handle_b] {
                let body = &mut self.bodies[handle];
                self.island.add_body(handle, body);
                body.island = true;
            }
            self.island.add_contact(min_handle);

            self.grow_toi_island(handle_a, min_alpha);
            self.grow_toi_island(handle_b, min_alpha);

            let dt = (1.0 - min_alpha) * step.dt;
            let sub_step = TimeStep {
                dt,
                inv_dt: 1.0 / dt,
                dt_ratio: 1.0,
                velocity_iterations: step.velocity_iterations,
                position_iterations: TOI_POSITION_ITERATIONS,
                warm_starting: false,
            };
            let (index_a, index_b) = (self.bodies[handle_a].island_index, self.bodies[handle_b].island_index);
            self.island.solve_toi(
                &sub_step,
                index_a,
                index_b,
                &self.settings,
                &mut self.bodies,
                &self.fixtures,
                &mut self.contact_manager.contacts,
                &mut self.listener,
            );
            toi_events += 1;

            // Reset island flags and synchronize broad-phase proxies.
            for &handle in &self.island.bodies {
                let body = &mut self.bodies[handle];
                body.island = false;
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);

                // Moved bodies invalidate the TOI of every contact they touch.
                for edge in &body.contact_edges {
                    if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                        contact.toi_valid = false;
                        contact.island = false;
                    }
                }
            }

            // Also creates contacts for any new overlaps the sub-step produced.
            self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures);

            if self.settings.sub_stepping {
                self.step_complete = false;
                break;
            }
        }
        if toi_events > 0 {
            trace!("resolved {} time of impact events", toi_events);
        }
    }

    /// Adds the static, kinematic and bullet neighbours of a TOI body to the island.
    fn grow_toi_island(&mut self, handle: BodyHandle, min_alpha: f64) {
        let (body_type, bullet) = {
            let body = &self.bodies[handle];
            (body.body_type, body.bullet)
        };
        if body_type != BodyType::Dynamic {
            return;
        }

        let contact_capacity = self.settings.max_toi_contacts;
        let body_capacity = 2 * self.settings.max_toi_contacts;

        for i in 0..self.bodies[handle].contact_edges.len() {
            if self.island.bodies.len() == body_capacity || self.island.contacts.len() == contact_capacity {
                break;
            }
            let Some(&edge) = self.bodies[handle].contact_edges.get(i) else {
                break;
            };
            let Some(contact) = self.contact_manager.contacts.get(edge.contact) else {
                continue;
            };
            if contact.island || contact.sensor {
                continue;
            }

            let other = &mut self.bodies[edge.other];
            // Dynamic neighbours only matter for bullets.
            if other.body_type == BodyType::Dynamic && !bullet && !other.bullet {
                continue;
            }

            let backup = other.sweep;
            if !other.island {
                other.advance(min_alpha);
            }

            self.contact_manager
                .update_contact(edge.contact, &mut self.bodies, &self.fixtures, &mut self.listener);

            let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) else {
                continue;
            };
            if !contact.enabled || !contact.touching {
                let other = &mut self.bodies[edge.other];
                other.sweep = backup;
                other.synchronize_transform();
                continue;
            }

            contact.island = true;
            self.island.add_contact(edge.contact);

            let other = &mut self.bodies[edge.other];
            if other.island {
                continue;
            }
            other.island = true;
            if other.body_type != BodyType::Static {
                other.set_awake(true);
            }
            self.island.add_body(edge.other, other);
        }
    }

    /// Delivers the begin/end events collected during the step.
    fn dispatch_events(&mut self) {
        if self.contact_manager.events.is_empty() {
            return;
        }
        let mut events = std::mem::take(&mut self.contact_manager.events);
        trace!("dispatching {} contact events", events.len());

        if let Some(mut listener) = self.listener.take() {
            let mut commands = std::mem::take(&mut self.commands);
            for event in &events {
                match event.kind {
                    ContactEventKind::Begin => listener.begin_contact(self, event, &mut commands),
                    ContactEventKind::End => listener.end_contact(self, event, &mut commands),
                }
            }
            self.commands = commands;
            self.listener = Some(listener);
        }

        events.clear();
        self.contact_manager.events = events;
    }

    /// Applies destruction queued from callbacks. Stale handles are skipped.
    fn flush_commands(&mut self) {
        if self.commands.is_empty() {
            return;
        }
        let mut commands = std::mem::take(&mut self.commands);
        debug!("applying {} deferred commands", commands.len());

        for command in commands.drain() {
            let result = match command {
                Command::DestroyBody(handle) => self.destroy_body(handle),
                Command::DestroyFixture(handle) => self.destroy_fixture(handle),
                Command::DestroyJoint(handle) => self.destroy_joint(handle),
            };
            if let Err(err) = result {
                debug!("skipped deferred {:?}: {}", command, err);
            }
        }
        self.commands = commands;
    }
}
