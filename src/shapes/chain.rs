use serde::{Deserialize, Serialize};

use crate::collision::aabb::{RayCastInput, RayCastOutput, AABB};
use crate::common::error::{PhysicsError, PhysicsResult};
use crate::common::settings::{LINEAR_SLOP, POLYGON_RADIUS};
use crate::math::transform::Transform;
use crate::math::vec2::Vec2;
use crate::shapes::{Edge, MassData};

/// A free-form sequence of connected segments, either open or closed into a loop.
///
/// Every segment is a child with its own broad-phase proxy. Child edges carry
/// their neighbours as ghost vertices, so shapes slide across the joints
/// between segments instead of catching on them. Chains are two-sided, have
/// no mass and may wind either way. Self-intersecting chains do not collide
/// correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChainDef", into = "ChainDef")]
pub struct Chain {
    /// A loop repeats its first vertex at the end.
    vertices: Vec<Vec2>,
    closed: bool,
    prev_vertex: Option<Vec2>,
    next_vertex: Option<Vec2>,
    pub(crate) radius: f64,
}

/// Serialized form of a [`Chain`]. Loops list each vertex once.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainDef {
    vertices: Vec<Vec2>,
    #[serde(default)]
    closed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prev_vertex: Option<Vec2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_vertex: Option<Vec2>,
}

impl TryFrom<ChainDef> for Chain {
    type Error = PhysicsError;

    fn try_from(def: ChainDef) -> PhysicsResult<Self> {
        let chain = if def.closed {
            Chain::new_loop(def.vertices)?
        } else {
            Chain::new(def.vertices)?
        };
        let chain = Chain {
            prev_vertex: def.prev_vertex,
            next_vertex: def.next_vertex,
            ..chain
        };
        chain.validate()?;
        Ok(chain)
    }
}

impl From<Chain> for ChainDef {
    fn from(c: Chain) -> Self {
        let mut vertices = c.vertices;
        if c.closed {
            vertices.pop();
        }
        ChainDef {
            vertices,
            closed: c.closed,
            prev_vertex: c.prev_vertex,
            next_vertex: c.next_vertex,
        }
    }
}

fn check_spacing(vertices: &[Vec2]) -> PhysicsResult<()> {
    if vertices.iter().any(|v| !v.is_valid()) {
        return Err(PhysicsError::DegenerateChain);
    }
    if vertices
        .windows(2)
        .any(|pair| pair[0].distance_squared(pair[1]) < LINEAR_SLOP * LINEAR_SLOP)
    {
        return Err(PhysicsError::DegenerateChain);
    }
    Ok(())
}

impl Chain {
    /// An open chain with isolated end vertices. Needs at least 2 vertices.
    pub fn new(vertices: Vec<Vec2>) -> PhysicsResult<Self> {
        if vertices.len() < 2 {
            return Err(PhysicsError::TooFewChainVertices {
                count: vertices.len(),
                min: 2,
            });
        }
        check_spacing(&vertices)?;
        Ok(Chain {
            vertices,
            closed: false,
            prev_vertex: None,
            next_vertex: None,
            radius: POLYGON_RADIUS,
        })
    }

    /// A closed loop through at least 3 vertices; the last connects back to the first.
    pub fn new_loop(vertices: Vec<Vec2>) -> PhysicsResult<Self> {
        if vertices.len() < 3 {
            return Err(PhysicsError::TooFewChainVertices {
                count: vertices.len(),
                min: 3,
            });
        }
        let mut vertices = vertices;
        vertices.push(vertices[0]);
        check_spacing(&vertices)?;
        Ok(Chain {
            vertices,
            closed: true,
            prev_vertex: None,
            next_vertex: None,
            radius: POLYGON_RADIUS,
        })
    }

    /// Connects an open chain to a vertex before its first one, e.g. the end
    /// of another chain.
    pub fn with_prev_vertex(mut self, vertex: Vec2) -> PhysicsResult<Self> {
        self.prev_vertex = Some(vertex);
        self.validate()?;
        Ok(self)
    }

    /// Connects an open chain to a vertex after its last one.
    pub fn with_next_vertex(mut self, vertex: Vec2) -> PhysicsResult<Self> {
        self.next_vertex = Some(vertex);
        self.validate()?;
        Ok(self)
    }

    /// Chain vertices. A loop ends with a copy of its first vertex.
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn is_loop(&self) -> bool {
        self.closed
    }

    pub fn prev_vertex(&self) -> Option<Vec2> {
        self.prev_vertex
    }

    pub fn next_vertex(&self) -> Option<Vec2> {
        self.next_vertex
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Number of segments.
    pub fn child_count(&self) -> usize {
        self.vertices.len().saturating_sub(1)
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        let min = if self.closed { 4 } else { 2 };
        if self.vertices.len() < min {
            return Err(PhysicsError::TooFewChainVertices {
                count: self.vertices.len(),
                min,
            });
        }
        check_spacing(&self.vertices)?;
        if self.closed {
            if self.vertices.first() != self.vertices.last() {
                return Err(PhysicsError::DegenerateChain);
            }
            if self.prev_vertex.is_some() || self.next_vertex.is_some() {
                return Err(PhysicsError::Precondition("a loop is already connected at both ends"));
            }
        }
        let ghosts_valid = self.prev_vertex.map_or(true, Vec2::is_valid) && self.next_vertex.map_or(true, Vec2::is_valid);
        if !ghosts_valid {
            return Err(PhysicsError::DegenerateChain);
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(PhysicsError::InvalidRadius(self.radius));
        }
        Ok(())
    }

    /// Segment `index` with its neighbours attached as ghost vertices.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.child_count()`.
    pub fn child_edge(&self, index: usize) -> Edge {
        let n = self.vertices.len();
        let vertex0 = if index > 0 {
            Some(self.vertices[index - 1])
        } else if self.closed {
            Some(self.vertices[n - 2])
        } else {
            self.prev_vertex
        };
        let vertex3 = if index + 2 < n {
            Some(self.vertices[index + 2])
        } else if self.closed {
            Some(self.vertices[1])
        } else {
            self.next_vertex
        };

        Edge {
            v1: self.vertices[index],
            v2: self.vertices[index + 1],
            vertex0,
            vertex3,
            radius: self.radius,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child: usize) -> AABB {
        self.child_edge(child).compute_aabb(xf)
    }

    pub fn compute_mass(&self) -> MassData {
        MassData::default()
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform, child: usize) -> Option<RayCastOutput> {
        self.child_edge(child).ray_cast(input, xf)
    }
}
