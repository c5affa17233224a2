//! Hooks through which the host observes and steers collisions.

use log::debug;

use crate::collision::manifold::Manifold;
use crate::math::vec2::Vec2;
use crate::objects::{BodyHandle, ContactHandle, Fixture, FixtureHandle, JointHandle};
use crate::solver::ContactImpulse;
use crate::world::contact::Contact;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEventKind {
    Begin,
    End,
}

/// Two fixtures started or stopped touching during a step.
///
/// Events are collected while the step runs and delivered once it is done,
/// so the contact itself may already be gone by the time the listener sees
/// the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEvent {
    pub kind: ContactEventKind,
    pub contact: ContactHandle,
    pub fixture_a: FixtureHandle,
    pub fixture_b: FixtureHandle,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
}

impl ContactEvent {
    pub(crate) fn new(kind: ContactEventKind, handle: ContactHandle, contact: &Contact) -> Self {
        ContactEvent {
            kind,
            contact: handle,
            fixture_a: contact.fixture_a,
            fixture_b: contact.fixture_b,
            body_a: contact.body_a,
            body_b: contact.body_b,
        }
    }

    /// True if either side of the event is `fixture`.
    pub fn involves(&self, fixture: FixtureHandle) -> bool {
        self.fixture_a == fixture || self.fixture_b == fixture
    }
}

/// Receives contact notifications. All methods default to doing nothing.
///
/// `begin_contact` and `end_contact` run after the step has finished and may
/// queue destruction through the [`CommandBuffer`]. `pre_solve` and
/// `post_solve` run inside the step and only see the contact involved.
pub trait ContactListener {
    fn begin_contact(&mut self, _world: &World, _event: &ContactEvent, _commands: &mut CommandBuffer) {}

    fn end_contact(&mut self, _world: &World, _event: &ContactEvent, _commands: &mut CommandBuffer) {}

    /// Called after the manifold was updated and before the solver runs.
    /// Disabling the contact here skips it for this step.
    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {}

    /// Impulses the solver applied to a contact, for damage or sound effects.
    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {}
}

/// Decides whether two fixtures may ever generate a contact.
pub trait ContactFilter {
    fn should_collide(&self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool;
}

/// Category, mask and group filtering.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContactFilter;

impl ContactFilter for DefaultContactFilter {
    fn should_collide(&self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool {
        fixture_a.filter.should_collide(&fixture_b.filter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    DestroyBody(BodyHandle),
    DestroyFixture(FixtureHandle),
    DestroyJoint(JointHandle),
}

/// Destruction requests queued from callbacks and applied once the step is done.
/// Handles that are already gone by then are skipped.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn destroy_body(&mut self, body: BodyHandle) {
        debug!("queued destruction of body {:?}", body);
        self.commands.push(Command::DestroyBody(body));
    }

    pub fn destroy_fixture(&mut self, fixture: FixtureHandle) {
        self.commands.push(Command::DestroyFixture(fixture));
    }

    pub fn destroy_joint(&mut self, joint: JointHandle) {
        self.commands.push(Command::DestroyJoint(joint));
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, Command> {
        self.commands.drain(..)
    }
}

/// A fixture hit by [`World::ray_cast`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastHit {
    pub fixture: FixtureHandle,
    /// World point where the ray entered the fixture.
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction along the ray from `p1` to `p2`.
    pub fraction: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    #[test]
    fn test_command_buffer_queues_in_order() {
        let mut commands = CommandBuffer::default();
        assert!(commands.is_empty());
        let body = BodyHandle::from(KeyData::from_ffi(3));
        let joint = JointHandle::from(KeyData::from_ffi(4));
        commands.destroy_joint(joint);
        commands.destroy_body(body);
        assert_eq!(commands.len(), 2);

        let drained: Vec<Command> = commands.drain().collect();
        assert_eq!(drained, vec![Command::DestroyJoint(joint), Command::DestroyBody(body)]);
        assert!(commands.is_empty());
    }
}
