//! Construction of a Graph from polygons.

use std::collections::HashMap;

use bevy::log::debug;
use bevy::math::DVec2;
use geo::orient::{Direction, Orient};
use geo::Polygon;
use rstar::{RTree, AABB};
use smallvec::SmallVec;

use super::types::{Face, FaceId, FaceKind, HalfEdge, HalfEdgeId, Node, NodeId};
use super::{Graph, NodeEntry};
use crate::error::FabricError;
use crate::geometry::{ring_points, validate_polygon};

impl Graph {
    /// Build a graph whose faces are all parcels.
    pub fn build(polygons: &[Polygon<f64>], snap_tolerance: f64) -> Result<Self, FabricError> {
        Self::build_with_kinds(polygons.iter().map(|p| (p, FaceKind::Parcel)), snap_tolerance)
    }

    /// Build a graph from polygons tagged with their face kind.
    ///
    /// Face ids follow input order. Polygons with holes are rejected.
    pub fn build_with_kinds<'a, I>(faces: I, snap_tolerance: f64) -> Result<Self, FabricError>
    where
        I: IntoIterator<Item = (&'a Polygon<f64>, FaceKind)>,
    {
        let mut graph = Self {
            nodes: Vec::new(),
            half_edges: Vec::new(),
            faces: Vec::new(),
            edge_map: HashMap::new(),
            node_index: RTree::new(),
            snap_tolerance: snap_tolerance.max(0.0),
        };

        let mut rings: Vec<(Polygon<f64>, FaceKind, Vec<NodeId>)> = Vec::new();
        for (polygon, kind) in faces {
            validate_polygon(polygon, false)?;
            let polygon = polygon.orient(Direction::Default);
            let ring = ring_points(&polygon)
                .into_iter()
                .map(|p| graph.snap_or_create(p))
                .collect();
            rings.push((polygon, kind, ring));
        }

        // Nodes are all known now; split segments at nodes lying on them.
        let mut noded = 0;
        for (polygon, kind, ring) in rings {
            let ring = graph.node_ring(&ring);
            if ring.len() < 3 {
                return Err(FabricError::Geometry(
                    "ring collapsed below three nodes after snapping".to_string(),
                ));
            }
            noded += ring.len();
            graph.add_face(polygon, kind, &ring)?;
        }

        debug!(
            "topology: {} nodes, {} half-edges, {} faces ({} ring vertices)",
            graph.nodes.len(),
            graph.half_edges.len(),
            graph.faces.len(),
            noded
        );
        Ok(graph)
    }

    /// Snap a position to an existing node within tolerance, or create one.
    fn snap_or_create(&mut self, position: DVec2) -> NodeId {
        let tol2 = self.snap_tolerance * self.snap_tolerance;
        let nearest = self
            .node_index
            .locate_within_distance([position.x, position.y], tol2)
            .min_by(|a, b| {
                let da = DVec2::from_array(*a.geom()).distance_squared(position);
                let db = DVec2::from_array(*b.geom()).distance_squared(position);
                da.total_cmp(&db)
            })
            .map(|entry| entry.data);
        if let Some(existing) = nearest {
            return existing;
        }

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            position,
            outgoing: SmallVec::new(),
            incoming: SmallVec::new(),
        });
        self.node_index.insert(NodeEntry::new([position.x, position.y], id));
        id
    }

    /// Remove repeated nodes and insert nodes lying on each segment.
    fn node_ring(&self, ring: &[NodeId]) -> Vec<NodeId> {
        let mut deduped: Vec<NodeId> = ring.to_vec();
        deduped.dedup();
        while deduped.len() > 1 && deduped.first() == deduped.last() {
            deduped.pop();
        }

        let tol = self.snap_tolerance.max(1e-9);
        let n = deduped.len();
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let (a, b) = (deduped[i], deduped[(i + 1) % n]);
            out.push(a);

            let (pa, pb) = (self.nodes[a.0 as usize].position, self.nodes[b.0 as usize].position);
            let len = pa.distance(pb);
            if len <= tol {
                continue;
            }
            let dir = (pb - pa) / len;
            let envelope = AABB::from_corners(
                [pa.x.min(pb.x) - tol, pa.y.min(pb.y) - tol],
                [pa.x.max(pb.x) + tol, pa.y.max(pb.y) + tol],
            );
            let mut on_segment: Vec<(f64, NodeId)> = self
                .node_index
                .locate_in_envelope(&envelope)
                .filter(|entry| entry.data != a && entry.data != b)
                .filter_map(|entry| {
                    let p = DVec2::from_array(*entry.geom());
                    let t = dir.dot(p - pa);
                    (t > tol && t < len - tol && dir.perp_dot(p - pa).abs() <= tol)
                        .then_some((t, entry.data))
                })
                .collect();
            on_segment.sort_by(|x, y| x.0.total_cmp(&y.0));
            out.extend(on_segment.into_iter().map(|(_, id)| id));
        }
        out.dedup();
        out
    }

    fn add_face(
        &mut self,
        polygon: Polygon<f64>,
        kind: FaceKind,
        ring: &[NodeId],
    ) -> Result<(), FabricError> {
        let face_id = FaceId(self.faces.len() as u32);
        let base = self.half_edges.len() as u32;
        let n = ring.len() as u32;

        for (i, &origin) in ring.iter().enumerate() {
            let i = i as u32;
            let target = ring[((i + 1) % n) as usize];
            let id = HalfEdgeId(base + i);

            if self.edge_map.contains_key(&(origin, target)) {
                return Err(FabricError::Geometry(format!(
                    "faces overlap along a directed edge at {:?}",
                    self.nodes[origin.0 as usize].position
                )));
            }

            let twin = self.edge_map.get(&(target, origin)).copied();
            self.half_edges.push(HalfEdge {
                id,
                origin,
                target,
                face: face_id,
                twin,
                next: HalfEdgeId(base + (i + 1) % n),
                prev: HalfEdgeId(base + (i + n - 1) % n),
            });
            if let Some(twin_id) = twin {
                self.half_edges[twin_id.0 as usize].twin = Some(id);
            }
            self.edge_map.insert((origin, target), id);
            self.nodes[origin.0 as usize].outgoing.push(id);
            self.nodes[target.0 as usize].incoming.push(id);
        }

        self.faces.push(Face {
            id: face_id,
            half_edge: HalfEdgeId(base),
            polygon,
            kind,
            vertex_count: ring.len(),
        });
        Ok(())
    }
}
