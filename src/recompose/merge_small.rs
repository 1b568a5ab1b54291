//! Absorbing undersized parcels into their neighbours.

use bevy::log::{debug, warn};
use geo::Polygon;

use crate::geometry::{polygon_area, union_all};
use crate::parcel::{Parcel, SizeFlag};
use crate::topology::{FaceId, Graph};

#[derive(Clone, Debug, Default)]
pub struct MergeOutcome {
    pub parcels: Vec<Parcel>,
    /// Parcels absorbed by a neighbour.
    pub merged: usize,
    /// Parcels still under the minimal area, flagged `Undersized`.
    pub undersized: usize,
}

/// Repeatedly union the smallest parcel under `minimal_area` into its
/// largest neighbour sharing a boundary.
///
/// Adjacency comes from the topology of `parcels` alone, so parcels
/// separated by a street never merge. The neighbour keeps its attributes.
/// Parcels without a neighbour are kept and flagged.
pub fn merge_small(parcels: Vec<Parcel>, minimal_area: f64, snap_tolerance: f64) -> MergeOutcome {
    let mut parcels = parcels;
    let mut merged = 0;

    loop {
        let polygons: Vec<Polygon<f64>> = parcels.iter().map(|p| p.polygon.clone()).collect();
        let graph = match Graph::build(&polygons, snap_tolerance) {
            Ok(graph) => graph,
            Err(err) => {
                warn!("skipping small parcel merge: {err}");
                break;
            }
        };

        let mut small: Vec<usize> = (0..polygons.len())
            .filter(|&i| polygon_area(&polygons[i]) < minimal_area)
            .collect();
        small.sort_by(|&a, &b| polygon_area(&polygons[a]).total_cmp(&polygon_area(&polygons[b])));

        let Some((from, into, union)) = small.into_iter().find_map(|i| {
            let into = largest_neighbour(&graph, &polygons, i, snap_tolerance)?;
            match union_all(&[polygons[i].clone(), polygons[into].clone()]) {
                Ok(mut fused) if fused.len() == 1 => Some((i, into, fused.remove(0))),
                _ => None,
            }
        }) else {
            break;
        };

        debug!(
            "merging a {:.1} parcel into its {:.1} neighbour",
            polygon_area(&polygons[from]),
            polygon_area(&polygons[into])
        );
        parcels[into].polygon = union;
        parcels.remove(from);
        merged += 1;
    }

    let mut undersized = 0;
    for parcel in parcels.iter_mut().filter(|p| p.area() < minimal_area) {
        parcel.size_flag = Some(SizeFlag::Undersized);
        undersized += 1;
    }
    if undersized > 0 {
        debug!("{undersized} parcels remain under {minimal_area:.1} with no neighbour to merge into");
    }
    MergeOutcome {
        parcels,
        merged,
        undersized,
    }
}

fn largest_neighbour(
    graph: &Graph,
    parcels: &[Polygon<f64>],
    index: usize,
    tolerance: f64,
) -> Option<usize> {
    let face = FaceId(index as u32);
    graph
        .adjacent_faces(face)
        .into_iter()
        .filter(|&other| graph.shared_length(face, other) > tolerance)
        .map(|other| other.0 as usize)
        .max_by(|&a, &b| polygon_area(&parcels[a]).total_cmp(&polygon_area(&parcels[b])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::Termination;
    use crate::geometry::tests::rect;

    fn parcels(polygons: Vec<Polygon<f64>>) -> Vec<Parcel> {
        polygons.into_iter().map(Parcel::new).collect()
    }

    #[test]
    fn small_parcel_joins_largest_neighbour() {
        let mut input = parcels(vec![
            rect(0.0, 0.0, 20.0, 10.0),
            rect(20.0, 0.0, 22.0, 10.0),
            rect(22.0, 0.0, 32.0, 10.0),
        ]);
        input[0].size_flag = Some(SizeFlag::Oversized(Termination::TooNarrow));
        let outcome = merge_small(input, 50.0, 1e-3);

        assert_eq!(outcome.merged, 1);
        assert_eq!(outcome.undersized, 0);
        assert_eq!(outcome.parcels.len(), 2);
        assert!((outcome.parcels[0].area() - 220.0).abs() < 1e-6);
        assert!((outcome.parcels[1].area() - 100.0).abs() < 1e-6);
        // The absorbing parcel keeps its own flag.
        assert_eq!(
            outcome.parcels[0].size_flag,
            Some(SizeFlag::Oversized(Termination::TooNarrow))
        );
        assert_eq!(outcome.parcels[1].size_flag, None);
    }

    #[test]
    fn isolated_small_parcel_is_kept_and_flagged() {
        let polygons = vec![rect(0.0, 0.0, 20.0, 10.0), rect(25.0, 0.0, 27.0, 10.0)];
        let outcome = merge_small(parcels(polygons.clone()), 50.0, 1e-3);

        assert_eq!(outcome.merged, 0);
        assert_eq!(outcome.undersized, 1);
        let kept: Vec<_> = outcome.parcels.iter().map(|p| p.polygon.clone()).collect();
        assert_eq!(kept, polygons);
        assert_eq!(outcome.parcels[0].size_flag, None);
        assert_eq!(outcome.parcels[1].size_flag, Some(SizeFlag::Undersized));
    }

    #[test]
    fn chains_of_small_parcels_collapse() {
        let input = parcels(vec![
            rect(0.0, 0.0, 3.0, 10.0),
            rect(3.0, 0.0, 6.0, 10.0),
            rect(6.0, 0.0, 30.0, 10.0),
        ]);
        // The first union is still too small and merges again.
        let outcome = merge_small(input, 70.0, 1e-3);

        assert_eq!(outcome.parcels.len(), 1);
        assert_eq!(outcome.merged, 2);
        assert!((outcome.parcels[0].area() - 300.0).abs() < 1e-6);
        assert_eq!(outcome.parcels[0].size_flag, None);
    }
}
