//! Recursive OBB bisection of a block into parcels and streets.
//!
//! Each level cuts the current polygon across the long side of its
//! oriented bounding box. The first levels leave a street strip between
//! the two halves; the last `max_depth_without_street` levels share a
//! plain boundary.

use bevy::log::{debug, warn};
use geo::orient::{Direction, Orient};
use geo::Polygon;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{DecomposedParcel, Decomposition, DecompositionConfig, Deadline, Termination};
use crate::error::FabricError;
use crate::geometry::{
    contact_length, polygon_area, reduce_precision, split_by_line, validate_polygon, CutLine,
    OrientedBoundingBox, SplitParts,
};
use crate::topology::{FaceId, FaceKind, Graph};

/// OBB extents below this are treated as collapsed.
const MIN_EXTENT: f64 = 1e-3;

/// Number of halvings needed to bring `area` under `max_area`.
pub fn required_depth(area: f64, max_area: f64) -> u32 {
    if max_area <= 0.0 || area <= max_area {
        return 0;
    }
    (area / max_area).log2().ceil() as u32
}

/// Decompose `polygon` into parcels separated by generated streets.
///
/// Branch-level problems (slivers, clipping failures, lost road access)
/// keep the branch as a flagged leaf. Errors are returned only for an
/// invalid input polygon, an invalid configuration or an exceeded deadline.
pub fn split_parcel(
    polygon: &Polygon<f64>,
    config: &DecompositionConfig,
) -> Result<Decomposition, FabricError> {
    config.validate()?;
    validate_polygon(polygon, false)?;

    let block = polygon.orient(Direction::Default);
    let depth = required_depth(polygon_area(&block), config.max_area);
    let mut splitter = Splitter::new(config, vec![block.clone()], depth);
    splitter.split(block, 0)?;

    let Splitter { leaves, streets, .. } = splitter;
    let mut decomposition = Decomposition {
        parcels: leaves
            .into_iter()
            .filter_map(|(polygon, depth, termination)| {
                Some(DecomposedParcel {
                    polygon: reduce_precision(&polygon, config.precision)?,
                    depth,
                    termination,
                    street_frontage: 0.0,
                    outline_frontage: 0.0,
                })
            })
            .collect(),
        streets: streets
            .iter()
            .filter_map(|s| reduce_precision(s, config.precision))
            .collect(),
        required_depth: depth,
    };
    measure_frontage(&mut decomposition, config.precision);

    debug!(
        "decomposed block of {:.1} into {} parcels and {} street pieces (required depth {})",
        polygon_area(polygon),
        decomposition.parcels.len(),
        decomposition.streets.len(),
        depth
    );
    Ok(decomposition)
}

/// Fill the frontage of each leaf from the topology of leaves + streets.
fn measure_frontage(decomposition: &mut Decomposition, precision: f64) {
    let faces = decomposition
        .parcels
        .iter()
        .map(|p| (&p.polygon, FaceKind::Parcel))
        .chain(decomposition.streets.iter().map(|s| (s, FaceKind::Street)));
    let graph = match Graph::build_with_kinds(faces, (precision * 0.5).max(1e-6)) {
        Ok(graph) => graph,
        Err(err) => {
            debug!("frontage not measured: {err}");
            return;
        }
    };

    for (i, parcel) in decomposition.parcels.iter_mut().enumerate() {
        let face = FaceId(i as u32);
        parcel.street_frontage =
            graph.frontage(face, |other| matches!(other, Some(f) if f.kind == FaceKind::Street));
        parcel.outline_frontage = graph.frontage(face, |other| other.is_none());
    }
}

/// Which way a candidate cut runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CutAxis {
    /// Across the long side (the default bisection).
    AcrossMajor,
    /// Across the short side (the harmony / access retry).
    AcrossMinor,
}

struct Candidate {
    parts: SplitParts,
    /// Smallest short/long ratio among the pieces.
    worst_ratio: f64,
    accessible: bool,
}

struct Splitter<'a> {
    config: &'a DecompositionConfig,
    rng: StdRng,
    deadline: Deadline,
    outline: Vec<Polygon<f64>>,
    street_limit: u32,
    depth_cap: u32,
    leaves: Vec<(Polygon<f64>, u32, Termination)>,
    streets: Vec<Polygon<f64>>,
}

impl<'a> Splitter<'a> {
    /// `outline` is what counts as the block boundary for road access.
    fn new(config: &'a DecompositionConfig, outline: Vec<Polygon<f64>>, required_depth: u32) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(config.seed),
            deadline: Deadline::after(config.deadline),
            outline,
            street_limit: required_depth.saturating_sub(config.max_depth_without_street),
            depth_cap: required_depth.saturating_add(config.max_extra_depth),
            leaves: Vec::new(),
            streets: Vec::new(),
        }
    }

    fn leaf(&mut self, polygon: Polygon<f64>, depth: u32, termination: Termination) {
        self.leaves.push((polygon, depth, termination));
    }

    fn street_at(&self, depth: u32) -> bool {
        self.config.max_depth_without_street == 0 || depth < self.street_limit
    }

    fn split(&mut self, polygon: Polygon<f64>, depth: u32) -> Result<(), FabricError> {
        self.deadline.check()?;

        let area = polygon_area(&polygon);
        if area <= self.config.max_area {
            self.leaf(polygon, depth, Termination::AreaReached);
            return Ok(());
        }
        let Some(obb) = OrientedBoundingBox::of_polygon(&polygon) else {
            self.leaf(polygon, depth, Termination::Degenerate);
            return Ok(());
        };
        if obb.short_side() < MIN_EXTENT {
            self.leaf(polygon, depth, Termination::Degenerate);
            return Ok(());
        }
        if obb.short_side() < self.config.min_frontage_width {
            self.leaf(polygon, depth, Termination::TooNarrow);
            return Ok(());
        }
        if depth >= self.depth_cap {
            warn!("depth cap {} reached with {:.1} left to split", self.depth_cap, area);
            self.leaf(polygon, depth, Termination::DepthExhausted);
            return Ok(());
        }

        let gap = if self.street_at(depth) {
            self.config.street_width(depth)
        } else {
            0.0
        };
        let offset = self.noise_offset(&obb);

        let mut candidates = Vec::with_capacity(2);
        for axis in [CutAxis::AcrossMajor, CutAxis::AcrossMinor] {
            let shift = if axis == CutAxis::AcrossMajor { offset } else { 0.0 };
            match self.try_cut(&polygon, &obb, axis, shift, gap) {
                Ok(Some(candidate)) => {
                    let settled = candidate.accessible
                        && candidate.worst_ratio >= self.config.harmony_coeff;
                    candidates.push(candidate);
                    if settled {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => debug!("{axis:?} cut abandoned at depth {depth}: {err}"),
            }
        }

        if candidates.is_empty() {
            debug!("no usable cut for a {area:.1} piece at depth {depth}");
            self.leaf(polygon, depth, Termination::Degenerate);
            return Ok(());
        }
        if !candidates.iter().any(|c| c.accessible) {
            warn!("keeping a {area:.1} piece whole at depth {depth}: a cut would cut off road access");
            self.leaf(polygon, depth, Termination::RoadAccessFallback);
            return Ok(());
        }

        // Accessible candidates only; the first wins unless another is more harmonious.
        let chosen = candidates
            .into_iter()
            .filter(|c| c.accessible)
            .reduce(|best, next| {
                if best.worst_ratio < self.config.harmony_coeff && next.worst_ratio > best.worst_ratio {
                    next
                } else {
                    best
                }
            })
            .map(|c| c.parts)
            .unwrap_or_default();

        self.streets.extend(chosen.strip);
        for child in chosen.left.into_iter().chain(chosen.right) {
            self.split(child, depth + 1)?;
        }
        Ok(())
    }

    /// Random shift of the cut along the long axis, at most a quarter of it.
    fn noise_offset(&mut self, obb: &OrientedBoundingBox) -> f64 {
        if self.config.noise <= 0.0 {
            return 0.0;
        }
        let bound = self.config.noise.min(obb.long_side() * 0.25);
        self.rng.gen_range(-bound..=bound)
    }

    fn try_cut(
        &self,
        polygon: &Polygon<f64>,
        obb: &OrientedBoundingBox,
        axis: CutAxis,
        shift: f64,
        gap: f64,
    ) -> Result<Option<Candidate>, FabricError> {
        let (across, along) = match axis {
            CutAxis::AcrossMajor => (obb.major_axis(), obb.minor_axis()),
            CutAxis::AcrossMinor => (obb.minor_axis(), obb.major_axis()),
        };
        let line = CutLine::new(obb.center + across * shift, along);
        let parts = split_by_line(polygon, &line, gap)?;

        if parts.left.is_empty() || parts.right.is_empty() {
            return Ok(None);
        }
        let pieces = || parts.left.iter().chain(parts.right.iter());
        if pieces().any(|p| polygon_area(p) < self.config.sliver_area) {
            return Ok(None);
        }

        let worst_ratio = pieces()
            .map(|p| OrientedBoundingBox::of_polygon(p).map_or(0.0, |o| o.aspect_ratio()))
            .fold(f64::MAX, f64::min);
        let accessible = !self.config.force_road_access
            || pieces().all(|p| self.has_access(p, &parts.strip));

        Ok(Some(Candidate {
            parts,
            worst_ratio,
            accessible,
        }))
    }

    /// Whether `piece` touches the block outline, a street or an existing road.
    fn has_access(&self, piece: &Polygon<f64>, new_strips: &[Polygon<f64>]) -> bool {
        let tol = self.config.precision.max(1e-6);
        contact_length(piece, &self.outline, tol) > tol
            || contact_length(piece, new_strips, tol) > tol
            || contact_length(piece, &self.streets, tol) > tol
            || contact_length(piece, &self.config.existing_roads, tol) > tol
    }
}
