pub mod error;
pub mod material;
pub mod settings;

pub use error::{HandleKind, PhysicsError, PhysicsResult};
pub use material::Material;
pub use settings::WorldSettings;
