pub mod contact_solver;
pub(crate) mod island;

pub use contact_solver::{ContactImpulse, ContactSolver};
