//! Planar half-edge topology over a set of polygons.
//!
//! Coordinates are snapped into shared nodes, coincident opposite
//! segments become twins, and every polygon becomes a face with a closed
//! `next` cycle. Graphs live for a single decomposition or recompose call.

mod construction;
mod query;
mod types;

use std::collections::HashMap;

use rstar::primitives::GeomWithData;
use rstar::RTree;

pub use types::{EdgeFeature, EdgePath, Face, FaceId, FaceKind, HalfEdge, HalfEdgeId, Node, NodeId};

pub(crate) type NodeEntry = GeomWithData<[f64; 2], NodeId>;

/// Arena-backed half-edge graph.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) half_edges: Vec<HalfEdge>,
    pub(crate) faces: Vec<Face>,
    /// Map from (origin, target) node pair to half-edge
    pub(crate) edge_map: HashMap<(NodeId, NodeId), HalfEdgeId>,
    pub(crate) node_index: RTree<NodeEntry>,
    pub(crate) snap_tolerance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FabricError;
    use crate::geometry::tests::rect;
    use bevy::math::DVec2;
    use geo::Polygon;

    fn two_by_one() -> Graph {
        Graph::build(&[rect(0.0, 0.0, 10.0, 10.0), rect(10.0, 0.0, 20.0, 10.0)], 1e-6).unwrap()
    }

    #[test]
    fn adjacent_squares_share_nodes_and_twins() {
        let graph = two_by_one();

        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.face_count(), 2);
        assert_eq!(graph.half_edge_count(), 8);
        assert_eq!(graph.edge_count(), 7);
        assert!(graph.validate().is_ok());

        let paired = graph.half_edges().iter().filter(|he| he.twin.is_some()).count();
        assert_eq!(paired, 2);
        for he in graph.half_edges() {
            if let Some(twin) = he.twin {
                assert_eq!(graph.half_edge(twin).unwrap().twin, Some(he.id));
            }
        }
    }

    #[test]
    fn walking_next_closes_after_vertex_count() {
        let graph = two_by_one();
        for face in graph.faces() {
            let start = face.half_edge;
            let mut current = start;
            let mut steps = 0;
            loop {
                current = graph.half_edge(current).unwrap().next;
                steps += 1;
                if current == start {
                    break;
                }
            }
            assert_eq!(steps, face.vertex_count);
        }
    }

    #[test]
    fn t_junctions_are_noded() {
        // One tall parcel against two short ones: the middle vertex splits the long edge.
        let graph = Graph::build(
            &[
                rect(0.0, 0.0, 10.0, 20.0),
                rect(10.0, 0.0, 20.0, 10.0),
                rect(10.0, 10.0, 20.0, 20.0),
            ],
            1e-6,
        )
        .unwrap();

        let tall = graph.face(FaceId(0)).unwrap();
        assert_eq!(tall.vertex_count, 5);
        assert!((graph.shared_length(FaceId(0), FaceId(1)) - 10.0).abs() < 1e-9);
        assert!((graph.shared_length(FaceId(0), FaceId(2)) - 10.0).abs() < 1e-9);
        assert_eq!(graph.adjacent_faces(FaceId(0)), vec![FaceId(1), FaceId(2)]);
    }

    #[test]
    fn snapping_merges_nearby_coordinates() {
        let graph = Graph::build(
            &[rect(0.0, 0.0, 10.0, 10.0), rect(10.004, 0.0, 20.0, 10.0)],
            0.01,
        )
        .unwrap();
        assert_eq!(graph.node_count(), 6);
        assert!((graph.shared_length(FaceId(0), FaceId(1)) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn polygon_with_hole_is_rejected() {
        let outer = rect(0.0, 0.0, 10.0, 10.0);
        let hole = rect(2.0, 2.0, 4.0, 4.0);
        let with_hole = Polygon::new(outer.exterior().clone(), vec![hole.exterior().clone()]);

        let err = Graph::build(&[with_hole], 1e-6).unwrap_err();
        assert_eq!(err, FabricError::Geometry("holes unsupported".to_string()));
    }

    #[test]
    fn node_queries() {
        let graph = two_by_one();
        let shared = graph.node_at(DVec2::new(10.0, 0.0)).unwrap();

        assert_eq!(graph.outgoing(shared).len(), 2);
        assert_eq!(graph.edges_of(shared).len(), 4);
        assert!(graph.node_at(DVec2::new(5.0, 5.0)).is_none());

        let missing = NodeId(999);
        assert!(graph.outgoing(missing).is_empty());
        assert!(graph.edges_of(missing).is_empty());
    }

    #[test]
    fn common_node_of_consecutive_edges() {
        let graph = two_by_one();
        let first = graph.face(FaceId(0)).unwrap().half_edge;
        let second = graph.half_edge(first).unwrap().next;

        let common = graph.common_node(first, second).unwrap();
        assert_eq!(common, graph.half_edge(first).unwrap().target);
        assert!(graph.common_node(first, HalfEdgeId(999)).is_none());
    }

    #[test]
    fn shortest_path_prefers_shorter_direction() {
        let graph = Graph::build(&[rect(0.0, 0.0, 10.0, 10.0)], 1e-6).unwrap();
        let cycle = graph.face_edges(FaceId(0));
        assert_eq!(cycle.len(), 4);

        let forward = graph.shortest_path(cycle[0], cycle[1]).unwrap();
        assert_eq!(forward.edges, vec![cycle[0], cycle[1]]);
        assert!((forward.signed_length - 20.0).abs() < 1e-9);

        let backward = graph.shortest_path(cycle[0], cycle[3]).unwrap();
        assert_eq!(backward.edges, vec![cycle[0], cycle[3]]);
        assert!((backward.signed_length + 20.0).abs() < 1e-9);
        assert!(!backward.is_forward());

        // Opposite edge: both ways are 30 long, forward wins the tie.
        let tie = graph.shortest_path(cycle[0], cycle[2]).unwrap();
        assert!(tie.is_forward());
        assert!((tie.length() - 30.0).abs() < 1e-9);

        assert!(graph.shortest_path(cycle[0], HalfEdgeId(42)).is_none());
    }

    #[test]
    fn outer_boundary_chain_crosses_faces() {
        let graph = two_by_one();
        let bottom_left = graph
            .half_edges()
            .iter()
            .find(|he| {
                he.twin.is_none()
                    && graph.node(he.origin).unwrap().position == DVec2::new(0.0, 0.0)
            })
            .unwrap()
            .id;
        let bottom_right = graph
            .half_edges()
            .iter()
            .find(|he| {
                he.twin.is_none()
                    && graph.node(he.origin).unwrap().position == DVec2::new(10.0, 0.0)
            })
            .unwrap()
            .id;

        let path = graph.shortest_path(bottom_left, bottom_right).unwrap();
        assert_eq!(path.edges.len(), 2);
        assert!((path.signed_length - 20.0).abs() < 1e-9);
    }

    #[test]
    fn frontage_counts_street_and_outer_edges() {
        let graph = Graph::build_with_kinds(
            [
                (&rect(0.0, 0.0, 10.0, 10.0), FaceKind::Parcel),
                (&rect(10.0, 0.0, 14.0, 10.0), FaceKind::Street),
            ],
            1e-6,
        )
        .unwrap();

        let on_street = graph.frontage(FaceId(0), |face| {
            matches!(face, Some(f) if f.kind == FaceKind::Street)
        });
        assert!((on_street - 10.0).abs() < 1e-9);

        let on_outer = graph.frontage(FaceId(0), |face| face.is_none());
        assert!((on_outer - 30.0).abs() < 1e-9);
        assert!((graph.boundary_length(FaceId(0)) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn export_lists_each_edge_once() {
        let graph = two_by_one();
        let layer = graph.export_edges();
        assert_eq!(layer.len(), graph.edge_count());
        assert_eq!(layer.iter().filter(|e| e.right.is_some()).count(), 1);
    }
}
