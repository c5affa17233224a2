pub mod body;
pub mod fixture;

pub use body::{Body, BodyDef, BodyType, ContactEdge, JointEdge};
pub use fixture::{Filter, Fixture, FixtureDef};
pub(crate) use fixture::ProxyKey;

use slotmap::new_key_type;

new_key_type! {
    /// Generational handle to a body owned by a [`World`](crate::world::World).
    pub struct BodyHandle;
    /// Generational handle to a fixture. Fixtures die with their body.
    pub struct FixtureHandle;
    /// Generational handle to a joint.
    pub struct JointHandle;
    /// Handle to a contact. Contacts are created and destroyed by the world.
    pub struct ContactHandle;
}
