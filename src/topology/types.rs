//! Type definitions for the planar half-edge graph.

use bevy::math::DVec2;
use geo::{Line, Polygon};
use smallvec::SmallVec;

/// Type-safe node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Type-safe half-edge identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HalfEdgeId(pub u32);

/// Type-safe face identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub u32);

/// A snapped boundary coordinate shared by every polygon that touches it.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub position: DVec2,
    /// Half-edges leaving this node.
    pub outgoing: SmallVec<[HalfEdgeId; 4]>,
    /// Half-edges arriving at this node.
    pub incoming: SmallVec<[HalfEdgeId; 4]>,
}

/// A directed boundary segment of one face.
#[derive(Debug, Clone)]
pub struct HalfEdge {
    pub id: HalfEdgeId,
    pub origin: NodeId,
    pub target: NodeId,
    /// The face this half-edge bounds (counter-clockwise).
    pub face: FaceId,
    /// The opposite half-edge of the neighbouring face (None on the outer boundary)
    pub twin: Option<HalfEdgeId>,
    pub next: HalfEdgeId,
    pub prev: HalfEdgeId,
}

/// What a face stands for in a decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FaceKind {
    #[default]
    Parcel,
    /// Generated or existing street surface.
    Street,
    /// Shared access corridor of a flag split.
    Driveway,
}

/// One input polygon with its boundary cycle.
#[derive(Debug, Clone)]
pub struct Face {
    pub id: FaceId,
    pub half_edge: HalfEdgeId,
    pub polygon: Polygon<f64>,
    pub kind: FaceKind,
    /// Number of half-edges on the cycle, after noding.
    pub vertex_count: usize,
}

/// Result of a path query along boundary chains.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePath {
    pub edges: Vec<HalfEdgeId>,
    /// Positive when walked forward along `next`, negative backward.
    pub signed_length: f64,
}

impl EdgePath {
    pub fn length(&self) -> f64 {
        self.signed_length.abs()
    }

    pub fn is_forward(&self) -> bool {
        self.signed_length >= 0.0
    }
}

/// One undirected edge of the exported network layer.
#[derive(Debug, Clone)]
pub struct EdgeFeature {
    pub line: Line<f64>,
    pub left: FaceId,
    /// `None` on the outer boundary.
    pub right: Option<FaceId>,
}
