pub mod callbacks;
pub mod contact;
pub(crate) mod contact_manager;
mod physics_world;

pub use callbacks::{
    CommandBuffer, ContactEvent, ContactEventKind, ContactFilter, ContactListener, DefaultContactFilter, RayCastHit,
};
pub use contact::Contact;
pub use physics_world::World;
