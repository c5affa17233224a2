pub mod matrix;
pub mod sweep;
pub mod transform;
pub mod vec2;

pub use matrix::{Mat22, Mat33, Vec3};
pub use sweep::Sweep;
pub use transform::{Rot, Transform};
pub use vec2::Vec2;
