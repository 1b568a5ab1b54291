//! Handing islets to the decomposition engines.

use std::panic::{catch_unwind, AssertUnwindSafe};

use bevy::log::{debug, error, info, warn};
use bevy::tasks::{ComputeTaskPool, TaskPool};
use geo::Polygon;

use super::{Islet, RecomposeOptions, Workflow};
use crate::decomposition::{flag_split, split_parcel, DecompositionConfig, FlagOutcome, FlagSplitConfig};
use crate::error::FabricError;
use crate::geometry::polygon_area;
use crate::parcel::SizeFlag;

#[derive(Clone, Debug, PartialEq)]
pub enum OutcomeKind {
    Decomposed,
    /// Already under the area threshold.
    KeptWhole,
    /// The engine failed; the islet is emitted whole.
    Failed(FabricError),
}

#[derive(Clone, Debug)]
pub struct IsletOutcome {
    pub parcels: Vec<Polygon<f64>>,
    /// Size exception of each parcel, in the order of `parcels`.
    pub flags: Vec<Option<SizeFlag>>,
    pub streets: Vec<Polygon<f64>>,
    pub kind: OutcomeKind,
}

impl IsletOutcome {
    fn whole(islet: &Islet, kind: OutcomeKind) -> Self {
        let flag = match kind {
            OutcomeKind::Failed(_) => Some(SizeFlag::Undivided),
            _ => None,
        };
        Self {
            parcels: vec![islet.polygon.clone()],
            flags: vec![flag],
            streets: Vec::new(),
            kind,
        }
    }
}

/// Run the workflow's engine on every islet, one outcome per islet in order.
///
/// Islets share no state, so with `parallel` set they are processed on the
/// compute task pool.
pub fn dispatch(islets: &[Islet], options: &RecomposeOptions) -> Vec<IsletOutcome> {
    if options.parallel && islets.len() > 1 {
        let pool = ComputeTaskPool::get_or_init(TaskPool::default);
        pool.scope(|scope| {
            for islet in islets {
                scope.spawn(async move { run_isolated(islet, options) });
            }
        })
    } else {
        islets.iter().map(|islet| run_isolated(islet, options)).collect()
    }
}

fn run_isolated(islet: &Islet, options: &RecomposeOptions) -> IsletOutcome {
    let result = catch_unwind(AssertUnwindSafe(|| process(islet, options))).unwrap_or_else(|_| {
        Err(FabricError::Geometry("decomposition panicked".to_string()))
    });
    match result {
        Ok(outcome) => outcome,
        Err(err) if err.is_recoverable() => {
            warn!(
                "islet {} ({:.1}) kept whole: {}",
                islet.section,
                islet.area(),
                err
            );
            IsletOutcome::whole(islet, OutcomeKind::Failed(err))
        }
        Err(err) => {
            error!("islet {} kept whole after an unexpected error: {err}", islet.section);
            IsletOutcome::whole(islet, OutcomeKind::Failed(err))
        }
    }
}

fn process(islet: &Islet, options: &RecomposeOptions) -> Result<IsletOutcome, FabricError> {
    if islet.area() <= options.max_area() {
        debug!("islet {} is small enough to keep", islet.section);
        return Ok(IsletOutcome::whole(islet, OutcomeKind::KeptWhole));
    }

    match options.workflow {
        Workflow::ConsolidationDivision | Workflow::ZoneDivision => {
            let config = DecompositionConfig {
                deadline: options.islet_deadline.or(options.decomposition.deadline),
                ..options.decomposition.clone()
            };
            let decomposition = split_parcel(&islet.polygon, &config)?;
            let flags: Vec<Option<SizeFlag>> = decomposition
                .parcels
                .iter()
                .map(|p| p.is_flagged().then_some(SizeFlag::Oversized(p.termination)))
                .collect();
            let flagged = flags.iter().flatten().count();
            if flagged > 0 {
                info!("islet {}: {flagged} parcels stopped above the maximal area", islet.section);
            }
            Ok(IsletOutcome {
                parcels: decomposition.polygons(),
                flags,
                streets: decomposition.streets,
                kind: OutcomeKind::Decomposed,
            })
        }
        Workflow::Densification => {
            let config = FlagSplitConfig {
                deadline: options.islet_deadline.or(options.flag_split.deadline),
                ..options.flag_split.clone()
            };
            let allow = options.allow_isolated;
            let split = flag_split(&islet.polygon, &options.buildings, &config, |_| allow);
            match split.outcome {
                FlagOutcome::Split => {
                    // Rear lots are bounded; only the front lot can be too large.
                    let flags = split
                        .parcels
                        .iter()
                        .enumerate()
                        .map(|(i, p)| {
                            (i == 0 && polygon_area(p) > config.max_area).then_some(SizeFlag::WideFront)
                        })
                        .collect();
                    Ok(IsletOutcome {
                        parcels: split.parcels,
                        flags,
                        streets: split.driveway.into_iter().collect(),
                        kind: OutcomeKind::Decomposed,
                    })
                }
                FlagOutcome::Reverted(reason) => Err(reason),
            }
        }
    }
}
