//! Engine tolerances and world configuration.
//!
//! Geometric tolerances are compile-time constants because shapes and the
//! broad-phase bake them in at construction time. Solver and sleep tunables live
//! in [`WorldSettings`], which can be loaded from a JSON document.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::common::error::PhysicsResult;
use crate::math::vec2::Vec2;

/// The maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// The maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Fattening margin for proxies in the dynamic tree, in meters.
pub const AABB_EXTENSION: f64 = 0.1;

/// Multiplier applied to a proxy's displacement to predict its next position.
pub const AABB_MULTIPLIER: f64 = 2.0;

/// Collision and constraint tolerance, numerically significant but visually not.
pub const LINEAR_SLOP: f64 = 0.005;

/// Angular counterpart of [`LINEAR_SLOP`].
pub const ANGULAR_SLOP: f64 = 2.0 / 180.0 * PI;

/// Skin radius of polygons and edges.
pub const POLYGON_RADIUS: f64 = 2.0 * LINEAR_SLOP;

/// Iteration cap for the time of impact root finder.
pub const MAX_TOI_ITERATIONS: usize = 20;

/// Position iterations used when solving a TOI sub-step.
pub const TOI_POSITION_ITERATIONS: usize = 20;

/// Runtime configuration of a [`World`](crate::world::World).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub gravity: Vec2,
    pub allow_sleep: bool,
    pub warm_starting: bool,
    pub continuous_physics: bool,
    /// Stop after each TOI event instead of finishing the step (debugging aid).
    pub sub_stepping: bool,
    pub auto_clear_forces: bool,
    /// Relative normal speed below which collisions are treated as inelastic.
    pub velocity_threshold: f64,
    pub max_linear_correction: f64,
    pub max_angular_correction: f64,
    /// Largest translation a body may make in one step.
    pub max_translation: f64,
    /// Largest rotation a body may make in one step.
    pub max_rotation: f64,
    pub baumgarte: f64,
    pub toi_baumgarte: f64,
    pub time_to_sleep: f64,
    pub linear_sleep_tolerance: f64,
    pub angular_sleep_tolerance: f64,
    pub max_sub_steps: u32,
    pub max_toi_contacts: usize,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -10.0),
            allow_sleep: true,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            auto_clear_forces: true,
            velocity_threshold: 1.0,
            max_linear_correction: 0.2,
            max_angular_correction: 8.0 / 180.0 * PI,
            max_translation: 2.0,
            max_rotation: 0.5 * PI,
            baumgarte: 0.2,
            toi_baumgarte: 0.75,
            time_to_sleep: 0.5,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 / 180.0 * PI,
            max_sub_steps: 8,
            max_toi_contacts: 32,
        }
    }
}

impl WorldSettings {
    /// Parses settings from JSON. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> PhysicsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> PhysicsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }
}
