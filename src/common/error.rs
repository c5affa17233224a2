//! Error type shared by every fallible engine operation.

use std::fmt;
use thiserror::Error;

/// Which arena a stale handle was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Body,
    Fixture,
    Joint,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Body => write!(f, "body"),
            HandleKind::Fixture => write!(f, "fixture"),
            HandleKind::Joint => write!(f, "joint"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PhysicsError {
    /// The handle was destroyed or never belonged to this world.
    #[error("invalid {0} handle")]
    InvalidHandle(HandleKind),

    #[error("density must be positive and finite, got {0}")]
    InvalidDensity(f64),

    #[error("friction must be non-negative and finite, got {0}")]
    InvalidFriction(f64),

    #[error("restitution must be within [0, 1], got {0}")]
    InvalidRestitution(f64),

    #[error("radius must be positive and finite, got {0}")]
    InvalidRadius(f64),

    #[error("polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),

    #[error("polygon supports at most {max} vertices, got {count}")]
    TooManyVertices { count: usize, max: usize },

    #[error("polygon has zero area or coincident vertices")]
    DegeneratePolygon,

    #[error("polygon is not convex")]
    NonConvexPolygon,

    #[error("edge endpoints coincide")]
    DegenerateEdge,

    #[error("chain needs at least {min} vertices, got {count}")]
    TooFewChainVertices { count: usize, min: usize },

    #[error("chain has neighbouring vertices closer than the linear slop")]
    DegenerateChain,

    #[error("invalid joint: {0}")]
    InvalidJoint(&'static str),

    /// The caller broke an API contract (for example stepping with zero iterations).
    #[error("precondition violated: {0}")]
    Precondition(&'static str),

    #[error("invalid settings document: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type PhysicsResult<T> = Result<T, PhysicsError>;
