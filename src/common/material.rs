//! Physical material properties of fixtures and how two of them combine at a contact.

use serde::{Deserialize, Serialize};

use crate::common::error::{PhysicsError, PhysicsResult};

/// Surface response of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Mass per unit area, kg/m^2. Must be positive.
    pub density: f64,
    /// Coulomb friction coefficient. Range [0, infinity).
    pub friction: f64,
    /// Coefficient of restitution (bounciness). Range [0, 1].
    /// 0 = perfectly inelastic (no bounce), 1 = perfectly elastic.
    pub restitution: f64,
}

impl Material {
    /// Creates a validated material. Out-of-range values are rejected, never clamped.
    pub fn new(density: f64, friction: f64, restitution: f64) -> PhysicsResult<Self> {
        let material = Material {
            density,
            friction,
            restitution,
        };
        material.validate()?;
        Ok(material)
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        if !(self.density.is_finite() && self.density > 0.0) {
            return Err(PhysicsError::InvalidDensity(self.density));
        }
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(PhysicsError::InvalidFriction(self.friction));
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(PhysicsError::InvalidRestitution(self.restitution));
        }
        Ok(())
    }
}

impl Default for Material {
    fn default() -> Self {
        Material {
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
        }
    }
}

/// Friction mixing law: geometric mean, so a frictionless surface always slides.
pub fn mix_friction(friction_a: f64, friction_b: f64) -> f64 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixing law: the bouncier surface wins.
pub fn mix_restitution(restitution_a: f64, restitution_b: f64) -> f64 {
    restitution_a.max(restitution_b)
}
