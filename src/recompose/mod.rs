//! Merge and redivide selected parcels.
//!
//! A run goes through the stages of [`RecomposeStage`] in order: selected
//! parcels are fused into islets, each islet is handed to a decomposition
//! engine, undersized results are merged into a neighbour, the new parcels
//! are numbered and the untouched parcels are appended back.

use std::time::Duration;

use bevy::log::{debug, info, warn};
use geo::Polygon;

use crate::decomposition::{DecompositionConfig, FlagSplitConfig};
use crate::error::FabricError;
use crate::parcel::{IdentityScheme, Parcel, SizeFlag};

pub mod dispatch;
pub mod islets;
pub mod merge_small;
pub mod plugin;
pub mod renumber;
pub mod zone;

pub use dispatch::{dispatch, IsletOutcome, OutcomeKind};
pub use islets::{build_islets, section_name, Islet};
pub use merge_small::{merge_small, MergeOutcome};
pub use plugin::{ParcelFabric, RecomposeFinished, RecomposePlugin, RecomposeRequest, RecomposeSettings};
pub use renumber::renumber;
pub use zone::recompose_zone;

/// Which engine redivides the islets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Workflow {
    /// OBB bisection with generated streets.
    #[default]
    ConsolidationDivision,
    /// OBB bisection restricted to an operating zone.
    ZoneDivision,
    /// Flag splits behind existing buildings.
    Densification,
}

/// Stages of one run, in execution order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RecomposeStage {
    #[default]
    Select,
    UnionToIslets,
    Dispatch,
    MergeSmall,
    Renumber,
    Reattach,
    Done,
}

#[derive(Clone, Debug)]
pub struct RecomposeOptions {
    pub workflow: Workflow,
    /// Appended to generated section names, e.g. `newSection1densify`.
    pub workflow_name: Option<String>,
    pub decomposition: DecompositionConfig,
    pub flag_split: FlagSplitConfig,
    /// Existing buildings, used by densification.
    pub buildings: Vec<Polygon<f64>>,
    /// Keep flag lots that are undersized or lack driveway frontage.
    pub allow_isolated: bool,
    /// Parcels below this area are merged into a neighbour.
    pub minimal_area: f64,
    pub identity_scheme: IdentityScheme,
    /// Per-islet wall-clock budget. Overrides the decomposition deadline.
    pub islet_deadline: Option<Duration>,
    /// Dispatch islets on the compute task pool.
    pub parallel: bool,
    /// Node snapping distance for the topology built while merging.
    pub snap_tolerance: f64,
}

impl Default for RecomposeOptions {
    fn default() -> Self {
        Self {
            workflow: Workflow::default(),
            workflow_name: None,
            decomposition: DecompositionConfig::default(),
            flag_split: FlagSplitConfig::default(),
            buildings: Vec::new(),
            allow_isolated: false,
            minimal_area: 100.0,
            identity_scheme: IdentityScheme::default(),
            islet_deadline: None,
            parallel: true,
            snap_tolerance: 0.005,
        }
    }
}

impl RecomposeOptions {
    /// Islets above this area are redivided; smaller ones are kept whole.
    pub fn max_area(&self) -> f64 {
        match self.workflow {
            Workflow::Densification => self.flag_split.max_area,
            _ => self.decomposition.max_area,
        }
    }
}

/// An islet that could not be redivided and was kept whole.
#[derive(Clone, Debug, PartialEq)]
pub struct IsletFailure {
    pub section: String,
    pub area: f64,
    pub error: FabricError,
}

/// Statistics of one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecomposeReport {
    /// Last stage reached.
    pub stage: RecomposeStage,
    pub selected: usize,
    pub islets: usize,
    pub decomposed: usize,
    pub kept_whole: usize,
    pub failures: Vec<IsletFailure>,
    /// Undersized parcels absorbed by a neighbour.
    pub merged_small: usize,
    /// Undersized parcels left without a neighbour, flagged `Undersized`.
    pub undersized: usize,
    /// New parcels above the maximal area, each carrying its `SizeFlag`.
    pub oversized: usize,
    pub attribute_failures: Vec<FabricError>,
    /// New parcels emitted.
    pub created: usize,
    /// Unselected parcels reattached unchanged.
    pub kept: usize,
}

/// Output of one run: new parcels first, then the reattached ones.
#[derive(Clone, Debug, Default)]
pub struct Recomposition {
    pub parcels: Vec<Parcel>,
    pub streets: Vec<Polygon<f64>>,
    pub report: RecomposeReport,
}

/// Receives intermediate layers for debugging.
pub trait LayerSink {
    fn layer(&mut self, name: &str, polygons: &[Polygon<f64>]);
}

impl LayerSink for () {
    fn layer(&mut self, _name: &str, _polygons: &[Polygon<f64>]) {}
}

/// Merge and redivide the marked parcels.
///
/// Failures are isolated: an islet that cannot be divided is emitted whole
/// and listed in the report, and a parcel whose code cannot be built is
/// kept without one.
pub fn recompose(parcels: &[Parcel], options: &RecomposeOptions) -> Recomposition {
    recompose_with_layers(parcels, options, &mut ())
}

pub fn recompose_with_layers(
    parcels: &[Parcel],
    options: &RecomposeOptions,
    layers: &mut dyn LayerSink,
) -> Recomposition {
    let mut report = RecomposeReport::default();

    enter(&mut report, RecomposeStage::Select);
    let (selected, saved): (Vec<Parcel>, Vec<Parcel>) =
        parcels.iter().cloned().partition(|p| p.selection_mark);
    report.selected = selected.len();
    if selected.is_empty() {
        info!("nothing selected, {} parcels left untouched", parcels.len());
        report.kept = parcels.len();
        report.stage = RecomposeStage::Done;
        return Recomposition {
            parcels: parcels.to_vec(),
            streets: Vec::new(),
            report,
        };
    }

    enter(&mut report, RecomposeStage::UnionToIslets);
    let islets = match build_islets(&selected, options.workflow_name.as_deref()) {
        Ok(islets) => islets,
        Err(err) => {
            warn!("could not fuse the selection into islets, leaving it untouched: {err}");
            report.failures.push(IsletFailure {
                section: String::new(),
                area: selected.iter().map(Parcel::area).sum(),
                error: err,
            });
            report.kept = parcels.len();
            return Recomposition {
                parcels: parcels.to_vec(),
                streets: Vec::new(),
                report,
            };
        }
    };
    report.islets = islets.len();
    layers.layer("islets", &islets.iter().map(|i| i.polygon.clone()).collect::<Vec<_>>());

    enter(&mut report, RecomposeStage::Dispatch);
    let outcomes = dispatch(&islets, options);
    let mut streets = Vec::new();
    for (islet, outcome) in islets.iter().zip(&outcomes) {
        match &outcome.kind {
            OutcomeKind::Decomposed => report.decomposed += 1,
            OutcomeKind::KeptWhole => report.kept_whole += 1,
            OutcomeKind::Failed(error) => report.failures.push(IsletFailure {
                section: islet.section.clone(),
                area: islet.area(),
                error: error.clone(),
            }),
        }
        streets.extend(outcome.streets.iter().cloned());
    }
    layers.layer(
        "decomposed",
        &outcomes.iter().flat_map(|o| o.parcels.iter().cloned()).collect::<Vec<_>>(),
    );
    layers.layer("streets", &streets);

    enter(&mut report, RecomposeStage::MergeSmall);
    let mut created = Vec::new();
    for (islet, outcome) in islets.iter().zip(outcomes) {
        let parcels: Vec<Parcel> = outcome
            .parcels
            .into_iter()
            .zip(outcome.flags)
            .map(|(polygon, flag)| {
                let mut parcel = islet.new_parcel(polygon);
                parcel.size_flag = flag;
                parcel
            })
            .collect();
        if outcome.kind == OutcomeKind::Decomposed {
            let merged = merge_small(parcels, options.minimal_area, options.snap_tolerance);
            report.merged_small += merged.merged;
            report.undersized += merged.undersized;
            created.extend(merged.parcels);
        } else {
            created.extend(parcels);
        }
    }
    report.oversized = created
        .iter()
        .filter(|p| p.size_flag.is_some_and(SizeFlag::is_oversized))
        .count();
    if report.oversized > 0 || report.undersized > 0 {
        info!(
            "{} new parcels above the maximal area, {} below the minimal area",
            report.oversized, report.undersized
        );
    }

    enter(&mut report, RecomposeStage::Renumber);
    report.attribute_failures = renumber(&mut created, &islets, options.identity_scheme);
    report.created = created.len();

    enter(&mut report, RecomposeStage::Reattach);
    report.kept = saved.len();
    created.extend(saved);

    enter(&mut report, RecomposeStage::Done);
    info!(
        "recomposed {} islets into {} parcels ({} failures, {} kept)",
        report.islets,
        report.created,
        report.failures.len(),
        report.kept
    );
    Recomposition {
        parcels: created,
        streets,
        report,
    }
}

fn enter(report: &mut RecomposeReport, stage: RecomposeStage) {
    debug!("recompose stage {stage:?}");
    report.stage = stage;
}
