//! Owns the broad-phase and the contact arena: creates contacts for new
//! broad-phase pairs of fixture children, keeps their manifolds current and
//! destroys them once their proxies drift apart.

use slotmap::SlotMap;

use crate::collision::broad_phase::BroadPhase;
use crate::objects::{Body, BodyHandle, BodyType, ContactEdge, ContactHandle, Fixture, FixtureHandle, ProxyKey};
use crate::world::callbacks::{ContactEvent, ContactEventKind, ContactFilter, ContactListener, DefaultContactFilter};
use crate::world::contact::Contact;

pub(crate) type Listener = Option<Box<dyn ContactListener>>;

pub(crate) struct ContactManager {
    pub broad_phase: BroadPhase<ProxyKey>,
    pub contacts: SlotMap<ContactHandle, Contact>,
    pub filter: Box<dyn ContactFilter>,
    /// Begin/end events waiting to be delivered at the end of the step.
    pub events: Vec<ContactEvent>,
    pairs: Vec<(ProxyKey, ProxyKey)>,
}

impl Default for ContactManager {
    fn default() -> Self {
        ContactManager {
            broad_phase: BroadPhase::new(),
            contacts: SlotMap::with_key(),
            filter: Box::new(DefaultContactFilter),
            events: Vec::new(),
            pairs: Vec::new(),
        }
    }
}

fn wake(bodies: &mut SlotMap<BodyHandle, Body>, handle: BodyHandle) {
    if let Some(body) = bodies.get_mut(handle) {
        body.set_awake(true);
    }
}

impl ContactManager {
    /// Creates contacts for every new pair the broad-phase reports.
    pub fn find_new_contacts(
        &mut self,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
    ) {
        let mut pairs = std::mem::take(&mut self.pairs);
        pairs.clear();
        self.broad_phase.update_pairs(|a, b| pairs.push((a, b)));
        for &(a, b) in &pairs {
            self.add_pair(bodies, fixtures, a, b);
        }
        self.pairs = pairs;
    }

    fn add_pair(
        &mut self,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        key_a: ProxyKey,
        key_b: ProxyKey,
    ) {
        let (handle_a, handle_b) = (key_a.fixture, key_b.fixture);
        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(handle_a), fixtures.get(handle_b)) else {
            return;
        };
        let (body_handle_a, body_handle_b) = (fixture_a.body, fixture_b.body);
        if body_handle_a == body_handle_b {
            return;
        }
        let (Some(body_a), Some(body_b)) = (bodies.get(body_handle_a), bodies.get(body_handle_b)) else {
            return;
        };

        // Already connected by a contact for these two children?
        let exists = body_b.contact_edges.iter().any(|edge| {
            edge.other == body_handle_a
                && self.contacts.get(edge.contact).is_some_and(|c| {
                    let a = (c.fixture_a, c.child_a);
                    let b = (c.fixture_b, c.child_b);
                    let (ka, kb) = ((key_a.fixture, key_a.child), (key_b.fixture, key_b.child));
                    (a == ka && b == kb) || (a == kb && b == ka)
                })
        });
        if exists {
            return;
        }

        if !body_b.should_collide(body_handle_a, body_a) || !self.filter.should_collide(fixture_a, fixture_b) {
            return;
        }

        let Some(contact) = Contact::new((handle_a, key_a.child), fixture_a, (handle_b, key_b.child), fixture_b) else {
            return;
        };
        let (body_a, body_b, sensor) = (contact.body_a, contact.body_b, contact.sensor);
        let handle = self.contacts.insert(contact);

        if let Some(body) = bodies.get_mut(body_a) {
            body.contact_edges.push(ContactEdge { contact: handle, other: body_b });
        }
        if let Some(body) = bodies.get_mut(body_b) {
            body.contact_edges.push(ContactEdge { contact: handle, other: body_a });
        }

        if !sensor {
            wake(bodies, body_a);
            wake(bodies, body_b);
        }
    }

    /// Removes a contact and its body edges. A touching contact reports an end event.
    pub fn destroy(&mut self, handle: ContactHandle, bodies: &mut SlotMap<BodyHandle, Body>) {
        let Some(contact) = self.contacts.remove(handle) else {
            return;
        };
        if contact.touching {
            self.events.push(ContactEvent::new(ContactEventKind::End, handle, &contact));
        }

        for body_handle in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(body_handle) {
                body.contact_edges.retain(|edge| edge.contact != handle);
            }
        }

        if contact.manifold.point_count > 0 && !contact.sensor {
            wake(bodies, contact.body_a);
            wake(bodies, contact.body_b);
        }
    }

    /// Re-evaluates one contact at the bodies' current transforms, records
    /// begin/end events and runs the pre-solve hook.
    pub fn update_contact(
        &mut self,
        handle: ContactHandle,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        listener: &mut Listener,
    ) {
        let Some(contact) = self.contacts.get_mut(handle) else {
            return;
        };
        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
        else {
            return;
        };
        let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
            return;
        };
        let (xf_a, xf_b) = (body_a.xf, body_b.xf);

        let update = contact.update(fixture_a, &xf_a, fixture_b, &xf_b);
        if update.began {
            self.events.push(ContactEvent::new(ContactEventKind::Begin, handle, contact));
        } else if update.ended {
            self.events.push(ContactEvent::new(ContactEventKind::End, handle, contact));
        }

        // Sensors report overlap without disturbing sleeping bodies.
        if update.touching_changed() && !contact.sensor {
            let (a, b) = (contact.body_a, contact.body_b);
            wake(bodies, a);
            wake(bodies, b);
        }

        if contact.touching && !contact.sensor {
            if let Some(listener) = listener.as_mut() {
                listener.pre_solve(contact, &update.old_manifold);
            }
        }
    }

    /// Narrow-phase pass over every contact.
    pub fn collide(
        &mut self,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        listener: &mut Listener,
    ) {
        let handles: Vec<ContactHandle> = self.contacts.keys().collect();
        for handle in handles {
            let Some(contact) = self.contacts.get(handle) else {
                continue;
            };
            let (child_a, child_b) = (contact.child_a, contact.child_b);
            let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
            else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
                continue;
            };

            if contact.filter {
                if !body_b.should_collide(contact.body_a, body_a) || !self.filter.should_collide(fixture_a, fixture_b) {
                    self.destroy(handle, bodies);
                    continue;
                }
                if let Some(contact) = self.contacts.get_mut(handle) {
                    contact.filter = false;
                }
            }

            let active_a = body_a.awake && body_a.body_type != BodyType::Static;
            let active_b = body_b.awake && body_b.body_type != BodyType::Static;
            // Sleeping and static bodies keep their contacts as they are.
            if !active_a && !active_b {
                continue;
            }

            let overlap = match (fixture_a.proxy_id(child_a), fixture_b.proxy_id(child_b)) {
                (Some(proxy_a), Some(proxy_b)) => self.broad_phase.test_overlap(proxy_a, proxy_b),
                _ => false,
            };
            if !overlap {
                self.destroy(handle, bodies);
                continue;
            }

            self.update_contact(handle, bodies, fixtures, listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::transform::Transform;
    use crate::math::vec2::Vec2;
    use crate::objects::{BodyDef, FixtureDef};
    use crate::shapes::{Chain, Circle};

    struct Scene {
        manager: ContactManager,
        bodies: SlotMap<BodyHandle, Body>,
        fixtures: SlotMap<FixtureHandle, Fixture>,
        body_b: BodyHandle,
        fixture_b: FixtureHandle,
    }

    fn scene(offset: f64) -> Scene {
        let mut manager = ContactManager::default();
        let mut bodies: SlotMap<BodyHandle, Body> = SlotMap::with_key();
        let mut fixtures: SlotMap<FixtureHandle, Fixture> = SlotMap::with_key();
        let circle = Circle::new(0.5).expect("circle");

        let mut handles = Vec::new();
        for x in [0.0, offset] {
            let body_handle = bodies.insert(Body::new(&BodyDef::dynamic(Vec2::new(x, 0.0))));
            let fixture = Fixture::new(body_handle, &FixtureDef::new(circle)).expect("fixture");
            let fixture_handle = fixtures.insert(fixture);
            let xf = bodies[body_handle].xf;
            fixtures[fixture_handle].create_proxies(&mut manager.broad_phase, &xf, fixture_handle);
            bodies[body_handle].fixtures.push(fixture_handle);
            handles.push((body_handle, fixture_handle));
        }

        Scene {
            manager,
            bodies,
            fixtures,
            body_b: handles[1].0,
            fixture_b: handles[1].1,
        }
    }

    #[test]
    fn test_overlapping_pair_creates_one_contact() {
        let mut s = scene(0.9);
        s.manager.find_new_contacts(&mut s.bodies, &s.fixtures);
        assert_eq!(s.manager.contacts.len(), 1);
        assert_eq!(s.bodies[s.body_b].contact_edges.len(), 1);

        // Re-touching the proxy must not duplicate the contact.
        s.fixtures[s.fixture_b].touch_proxies(&mut s.manager.broad_phase);
        s.manager.find_new_contacts(&mut s.bodies, &s.fixtures);
        assert_eq!(s.manager.contacts.len(), 1);
    }

    #[test]
    fn test_collide_reports_begin_and_destroy_reports_end() {
        let mut s = scene(0.9);
        let mut listener: Listener = None;
        s.manager.find_new_contacts(&mut s.bodies, &s.fixtures);
        s.manager.collide(&mut s.bodies, &s.fixtures, &mut listener);

        assert_eq!(s.manager.events.len(), 1);
        assert_eq!(s.manager.events[0].kind, ContactEventKind::Begin);

        let handle = s.manager.contacts.keys().next().expect("contact");
        s.manager.destroy(handle, &mut s.bodies);
        assert_eq!(s.manager.events.len(), 2);
        assert_eq!(s.manager.events[1].kind, ContactEventKind::End);
        assert!(s.bodies[s.body_b].contact_edges.is_empty());
    }

    #[test]
    fn test_negative_group_blocks_pair() {
        let mut s = scene(0.9);
        for fixture in s.fixtures.values_mut() {
            fixture.filter.group_index = -1;
        }
        s.manager.find_new_contacts(&mut s.bodies, &s.fixtures);
        assert!(s.manager.contacts.is_empty());
    }

    #[test]
    fn test_separated_fat_aabbs_destroy_contact() {
        let mut s = scene(0.9);
        let mut listener: Listener = None;
        s.manager.find_new_contacts(&mut s.bodies, &s.fixtures);

        let from = Transform::new(Vec2::new(0.9, 0.0), 0.0);
        let to = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        // Two synchronizations so the swept box no longer reaches back to the start.
        s.fixtures[s.fixture_b].synchronize(&mut s.manager.broad_phase, &from, &to);
        s.fixtures[s.fixture_b].synchronize(&mut s.manager.broad_phase, &to, &to);
        s.manager.collide(&mut s.bodies, &s.fixtures, &mut listener);
        assert!(s.manager.contacts.is_empty());
    }

    #[test]
    fn test_sensor_touch_leaves_sleeping_bodies_asleep() {
        let mut s = scene(0.9);
        let mut listener: Listener = None;
        for fixture in s.fixtures.values_mut() {
            fixture.set_sensor(true);
        }
        s.manager.find_new_contacts(&mut s.bodies, &s.fixtures);
        let handle = s.manager.contacts.keys().next().expect("contact");

        let body_a = s.manager.contacts[handle].body_a;
        s.bodies[body_a].set_awake(false);
        s.bodies[s.body_b].set_awake(true);
        s.manager.update_contact(handle, &mut s.bodies, &s.fixtures, &mut listener);

        assert!(s.manager.contacts[handle].is_touching());
        assert_eq!(s.manager.events.len(), 1);
        assert!(!s.bodies[body_a].is_awake());
    }

    #[test]
    fn test_chain_segments_get_separate_contacts() {
        let mut s = scene(10.0);
        let mut listener: Listener = None;
        // Static chain whose middle vertex sits just left of the ball's lowest point.
        let ground = s.bodies.insert(Body::new(&BodyDef::static_body(Vec2::new(-0.1, -0.45))));
        let chain = Chain::new(vec![Vec2::new(-2.0, 0.0), Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0)]).expect("chain");
        let handle = s.fixtures.insert(Fixture::new(ground, &FixtureDef::new(chain)).expect("fixture"));
        let xf = s.bodies[ground].xf;
        s.fixtures[handle].create_proxies(&mut s.manager.broad_phase, &xf, handle);
        s.bodies[ground].fixtures.push(handle);

        s.manager.find_new_contacts(&mut s.bodies, &s.fixtures);
        let children: Vec<usize> = s
            .manager
            .contacts
            .values()
            .filter(|c| c.fixture_a == handle)
            .map(|c| c.child_a)
            .collect();
        assert_eq!(children.len(), 2);
        assert!(children.contains(&0) && children.contains(&1));

        // The shared vertex is owned by one segment only.
        s.manager.collide(&mut s.bodies, &s.fixtures, &mut listener);
        let touching = s
            .manager
            .contacts
            .values()
            .filter(|c| c.fixture_a == handle && c.is_touching())
            .count();
        assert_eq!(touching, 1);
    }
}
