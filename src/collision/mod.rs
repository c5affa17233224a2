pub mod aabb;
pub mod broad_phase;
pub mod detection;
pub mod distance;
pub mod dynamic_tree;
pub mod manifold;
pub mod time_of_impact;

// Re-export key types
pub use aabb::{RayCastInput, RayCastOutput, AABB};
pub use broad_phase::BroadPhase;
pub use detection::*;
pub use distance::{distance, test_overlap, DistanceInput, DistanceOutput, DistanceProxy, SimplexCache};
pub use dynamic_tree::{DynamicTree, ProxyId};
pub use manifold::*;
pub use time_of_impact::{time_of_impact, ToiInput, ToiOutput, ToiState};
