//! Topology query methods for Graph.

use bevy::math::DVec2;
use geo::Line;

use super::types::{EdgeFeature, EdgePath, Face, FaceId, HalfEdge, HalfEdgeId, Node, NodeId};
use super::Graph;
use crate::error::FabricError;
use crate::geometry::to_coord;

impl Graph {
    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub fn half_edge(&self, id: HalfEdgeId) -> Option<&HalfEdge> {
        self.half_edges.get(id.0 as usize)
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(id.0 as usize)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn half_edges(&self) -> &[HalfEdge] {
        &self.half_edges
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn half_edge_count(&self) -> usize {
        self.half_edges.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Number of undirected edges (twinned pairs count once)
    pub fn edge_count(&self) -> usize {
        let paired = self.half_edges.iter().filter(|he| he.twin.is_some()).count();
        let boundary = self.half_edges.len() - paired;
        paired / 2 + boundary
    }

    /// Node at `position`, within the snap tolerance.
    pub fn node_at(&self, position: DVec2) -> Option<NodeId> {
        let tol = self.snap_tolerance.max(1e-9);
        self.node_index
            .locate_within_distance([position.x, position.y], tol * tol)
            .next()
            .map(|entry| entry.data)
    }

    // ========================================================================
    // Topology Queries
    // ========================================================================

    /// Half-edges leaving `node`; empty for unknown nodes.
    pub fn outgoing(&self, node: NodeId) -> &[HalfEdgeId] {
        self.node(node).map(|n| n.outgoing.as_slice()).unwrap_or(&[])
    }

    /// Half-edges leaving or arriving at `node`.
    pub fn edges_of(&self, node: NodeId) -> Vec<HalfEdgeId> {
        match self.node(node) {
            Some(n) => n.outgoing.iter().chain(n.incoming.iter()).copied().collect(),
            None => Vec::new(),
        }
    }

    /// Node shared by two half-edges, if any.
    pub fn common_node(&self, first: HalfEdgeId, second: HalfEdgeId) -> Option<NodeId> {
        let (a, b) = (self.half_edge(first)?, self.half_edge(second)?);
        [a.target, a.origin]
            .into_iter()
            .find(|n| *n == b.origin || *n == b.target)
    }

    pub fn edge_length(&self, edge: HalfEdgeId) -> Option<f64> {
        let he = self.half_edge(edge)?;
        Some(self.position(he.origin).distance(self.position(he.target)))
    }

    pub fn edge_line(&self, edge: HalfEdgeId) -> Option<Line<f64>> {
        let he = self.half_edge(edge)?;
        Some(Line::new(
            to_coord(self.position(he.origin)),
            to_coord(self.position(he.target)),
        ))
    }

    fn position(&self, node: NodeId) -> DVec2 {
        self.nodes[node.0 as usize].position
    }

    /// The boundary cycle of a face, starting at its anchor half-edge.
    pub fn face_edges(&self, face: FaceId) -> Vec<HalfEdgeId> {
        let Some(f) = self.face(face) else {
            return Vec::new();
        };
        let mut edges = Vec::with_capacity(f.vertex_count);
        let mut current = f.half_edge;
        loop {
            edges.push(current);
            current = self.half_edges[current.0 as usize].next;
            if current == f.half_edge || edges.len() > self.half_edges.len() {
                break;
            }
        }
        edges
    }

    pub fn boundary_length(&self, face: FaceId) -> f64 {
        self.face_edges(face)
            .into_iter()
            .filter_map(|e| self.edge_length(e))
            .sum()
    }

    /// Faces sharing at least one edge with `face`, in cycle order.
    pub fn adjacent_faces(&self, face: FaceId) -> Vec<FaceId> {
        let mut neighbours = Vec::new();
        for edge in self.face_edges(face) {
            if let Some(twin) = self.half_edges[edge.0 as usize].twin {
                let other = self.half_edges[twin.0 as usize].face;
                if !neighbours.contains(&other) {
                    neighbours.push(other);
                }
            }
        }
        neighbours
    }

    /// Length of the boundary two faces share.
    pub fn shared_length(&self, a: FaceId, b: FaceId) -> f64 {
        self.frontage(a, |other| matches!(other, Some(f) if f.id == b))
    }

    /// Length of the boundary of `face` whose opposite side satisfies `predicate`.
    ///
    /// The predicate sees the neighbouring face, or `None` on the outer boundary.
    pub fn frontage<P>(&self, face: FaceId, predicate: P) -> f64
    where
        P: Fn(Option<&Face>) -> bool,
    {
        self.face_edges(face)
            .into_iter()
            .filter(|e| {
                let opposite = self.half_edges[e.0 as usize]
                    .twin
                    .and_then(|t| self.face(self.half_edges[t.0 as usize].face));
                predicate(opposite)
            })
            .filter_map(|e| self.edge_length(e))
            .sum()
    }

    /// Successor along the single-outgoing chain.
    ///
    /// On the outer boundary the chain follows the unique outgoing boundary
    /// edge at the target node, crossing from face to face; elsewhere it is
    /// `next`.
    fn chain_next(&self, edge: HalfEdgeId) -> HalfEdgeId {
        let he = &self.half_edges[edge.0 as usize];
        if he.twin.is_none() {
            let mut boundary = self.nodes[he.target.0 as usize]
                .outgoing
                .iter()
                .filter(|o| self.half_edges[o.0 as usize].twin.is_none());
            if let (Some(&only), None) = (boundary.next(), boundary.next()) {
                return only;
            }
        }
        he.next
    }

    fn chain_prev(&self, edge: HalfEdgeId) -> HalfEdgeId {
        let he = &self.half_edges[edge.0 as usize];
        if he.twin.is_none() {
            let mut boundary = self.nodes[he.origin.0 as usize]
                .incoming
                .iter()
                .filter(|i| self.half_edges[i.0 as usize].twin.is_none());
            if let (Some(&only), None) = (boundary.next(), boundary.next()) {
                return only;
            }
        }
        he.prev
    }

    fn walk<F>(&self, start: HalfEdgeId, end: HalfEdgeId, step: F) -> Option<(Vec<HalfEdgeId>, f64)>
    where
        F: Fn(HalfEdgeId) -> HalfEdgeId,
    {
        let mut edges = vec![start];
        let mut length = self.edge_length(start)?;
        let mut current = start;
        while current != end {
            current = step(current);
            if current == start || edges.len() > self.half_edges.len() {
                return None;
            }
            edges.push(current);
            length += self.edge_length(current)?;
        }
        Some((edges, length))
    }

    /// Shortest chain from `start` to `end`, both edges included.
    ///
    /// Walks forward and backward and keeps the shorter total length; a tie
    /// goes to the forward walk. Returns `None` when either edge is unknown
    /// or no chain connects them.
    pub fn shortest_path(&self, start: HalfEdgeId, end: HalfEdgeId) -> Option<EdgePath> {
        self.half_edge(start)?;
        self.half_edge(end)?;

        let forward = self.walk(start, end, |e| self.chain_next(e));
        let backward = self.walk(start, end, |e| self.chain_prev(e));

        match (forward, backward) {
            (Some((edges, len)), Some((_, back_len))) if len <= back_len => Some(EdgePath {
                edges,
                signed_length: len,
            }),
            (_, Some((edges, len))) => Some(EdgePath {
                edges,
                signed_length: -len,
            }),
            (Some((edges, len)), None) => Some(EdgePath {
                edges,
                signed_length: len,
            }),
            (None, None) => None,
        }
    }

    /// The edge network as a line layer, one feature per undirected edge.
    pub fn export_edges(&self) -> Vec<EdgeFeature> {
        self.half_edges
            .iter()
            .filter(|he| he.twin.map_or(true, |t| he.id < t))
            .filter_map(|he| {
                Some(EdgeFeature {
                    line: self.edge_line(he.id)?,
                    left: he.face,
                    right: he.twin.map(|t| self.half_edges[t.0 as usize].face),
                })
            })
            .collect()
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check twin symmetry and that every face cycle closes after its vertex count.
    pub fn validate(&self) -> Result<(), FabricError> {
        for he in &self.half_edges {
            if let Some(twin) = he.twin {
                let other = self.half_edge(twin).ok_or_else(|| {
                    FabricError::TopologyMismatch(format!("{:?} has a dangling twin", he.id))
                })?;
                if other.twin != Some(he.id) || other.origin != he.target || other.target != he.origin {
                    return Err(FabricError::TopologyMismatch(format!(
                        "{:?} and {:?} are not mutual twins",
                        he.id, twin
                    )));
                }
            }
            if self.half_edges[he.next.0 as usize].prev != he.id {
                return Err(FabricError::TopologyMismatch(format!(
                    "{:?}.next.prev does not point back",
                    he.id
                )));
            }
        }
        for face in &self.faces {
            let cycle = self.face_edges(face.id);
            if cycle.len() != face.vertex_count {
                return Err(FabricError::TopologyMismatch(format!(
                    "{:?} cycle has {} edges, expected {}",
                    face.id,
                    cycle.len(),
                    face.vertex_count
                )));
            }
        }
        Ok(())
    }
}
