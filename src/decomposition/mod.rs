//! Block decomposition engines.
//!
//! - OBB bisection with generated streets for consolidated blocks
//! - Flag splits for densifying a built lot behind a shared driveway

use std::time::{Duration, Instant};

use geo::Polygon;

use crate::error::FabricError;

pub mod flag_split;
pub mod obb_split;

pub use flag_split::{flag_split, FlagOutcome, FlagSplit, FlagSplitConfig};
pub use obb_split::{required_depth, split_parcel};

/// Parameters of one OBB decomposition call.
#[derive(Clone, Debug)]
pub struct DecompositionConfig {
    /// Leaves stop splitting at or below this area.
    pub max_area: f64,
    /// Polygons whose OBB short side is below this are not split.
    pub min_frontage_width: f64,
    /// Minimum short/long ratio of each child (0 disables the check).
    pub harmony_coeff: f64,
    /// Maximum offset of a cut from the OBB midpoint, in map units.
    pub noise: f64,
    pub small_street_width: f64,
    /// Cuts at depths below this level get `large_street_width`.
    pub large_street_level: u32,
    pub large_street_width: f64,
    /// Every leaf must touch a street, an existing road or the block outline.
    pub force_road_access: bool,
    /// Trailing levels of the required depth that split without a street.
    pub max_depth_without_street: u32,
    pub existing_roads: Vec<Polygon<f64>>,
    /// Output coordinates are snapped to this grid.
    pub precision: f64,
    /// A cut producing a piece smaller than this is abandoned.
    pub sliver_area: f64,
    /// Seed for the noise generator, so runs are repeatable.
    pub seed: u64,
    /// Levels allowed beyond the required depth before giving up.
    pub max_extra_depth: u32,
    /// Wall-clock budget for the whole call.
    pub deadline: Option<Duration>,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            max_area: 800.0,
            min_frontage_width: 10.0,
            harmony_coeff: 0.0,
            noise: 0.0,
            small_street_width: 5.0,
            large_street_level: 0,
            large_street_width: 10.0,
            force_road_access: true,
            max_depth_without_street: 1,
            existing_roads: Vec::new(),
            precision: 0.01,
            sliver_area: 5.0,
            seed: 42,
            max_extra_depth: 4,
            deadline: None,
        }
    }
}

impl DecompositionConfig {
    pub fn validate(&self) -> Result<(), FabricError> {
        let invalid = |what: &str| Err(FabricError::Infeasible(format!("invalid configuration: {what}")));
        if !(self.max_area > 0.0) {
            return invalid("max_area must be positive");
        }
        if !(self.min_frontage_width > 0.0) {
            return invalid("min_frontage_width must be positive");
        }
        if !(0.0..=1.0).contains(&self.harmony_coeff) {
            return invalid("harmony_coeff must lie in [0, 1]");
        }
        if self.noise < 0.0 || self.small_street_width < 0.0 || self.large_street_width < 0.0 {
            return invalid("noise and street widths must not be negative");
        }
        Ok(())
    }

    /// Street width for a cut at `depth`.
    pub fn street_width(&self, depth: u32) -> f64 {
        if depth < self.large_street_level {
            self.large_street_width
        } else {
            self.small_street_width
        }
    }
}

/// Why a branch stopped splitting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Termination {
    /// Area fell under `max_area`.
    AreaReached,
    /// OBB short side under `min_frontage_width`.
    TooNarrow,
    /// Depth cap reached with the area still too large.
    DepthExhausted,
    /// No usable cut (zero extent, sliver pieces or clipping failure).
    Degenerate,
    /// Every cut would have left a piece without road access.
    RoadAccessFallback,
}

/// A leaf of the decomposition.
#[derive(Clone, Debug)]
pub struct DecomposedParcel {
    pub polygon: Polygon<f64>,
    pub depth: u32,
    pub termination: Termination,
    /// Boundary length on generated streets.
    pub street_frontage: f64,
    /// Boundary length on the block outline.
    pub outline_frontage: f64,
}

impl DecomposedParcel {
    /// Leaves that may exceed `max_area` because splitting stopped early.
    pub fn is_flagged(&self) -> bool {
        self.termination != Termination::AreaReached
    }
}

/// Output of one decomposition call.
#[derive(Clone, Debug, Default)]
pub struct Decomposition {
    pub parcels: Vec<DecomposedParcel>,
    pub streets: Vec<Polygon<f64>>,
    /// Halvings needed to bring the block under `max_area`.
    pub required_depth: u32,
}

impl Decomposition {
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        self.parcels.iter().map(|p| p.polygon.clone()).collect()
    }
}

/// Wall-clock guard checked during long recursions.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn after(budget: Option<Duration>) -> Self {
        Self(budget.map(|b| Instant::now() + b))
    }

    pub(crate) fn check(&self) -> Result<(), FabricError> {
        match self.0 {
            Some(at) if Instant::now() >= at => {
                Err(FabricError::Infeasible("deadline exceeded".to_string()))
            }
            _ => Ok(()),
        }
    }
}
