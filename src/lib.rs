//! A 2D rigid-body physics engine with persistent contacts, an impulse
//! based solver, joints, sleeping and continuous collision for fast bodies.
//!
//! Everything lives in a [`World`]: create bodies, attach fixtures, connect
//! bodies with joints and call [`World::step`] at a fixed rate.

pub mod collision;
pub mod common;
pub mod constraints;
pub mod integration;
pub mod math;
pub mod objects;
pub mod shapes;
pub mod solver;
pub mod world;

// Re-export key types for easier use
pub use common::{HandleKind, Material, PhysicsError, PhysicsResult, WorldSettings};
pub use constraints::{Joint, JointDef, JointType};
pub use math::vec2::Vec2;
pub use objects::{
    Body, BodyDef, BodyHandle, BodyType, ContactHandle, Filter, Fixture, FixtureDef, FixtureHandle, JointHandle,
};
pub use shapes::{Chain, Circle, Edge, MassData, Polygon, Shape};
pub use world::{CommandBuffer, Contact, ContactEvent, ContactEventKind, ContactListener, World};
