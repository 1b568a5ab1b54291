//! Parcel fabric - cadastral parcel recomposition.
//!
//! Selected parcels are fused into islets, redivided by OBB bisection with
//! generated streets or by flag splits behind existing buildings, cleaned
//! of undersized pieces and renumbered. A half-edge topology over the
//! results answers frontage and driveway queries.

use bevy::prelude::*;

pub mod decomposition;
pub mod error;
pub mod geometry;
pub mod parcel;
pub mod recompose;
pub mod topology;

pub use decomposition::{flag_split, split_parcel, DecompositionConfig, FlagSplitConfig};
pub use error::FabricError;
pub use parcel::{Parcel, ParcelIdentity, SizeFlag, Zone, ZoneType};
pub use recompose::{
    recompose, recompose_zone, ParcelFabric, RecomposeFinished, RecomposeOptions, RecomposePlugin,
    RecomposeRequest, RecomposeSettings, Recomposition, Workflow,
};
pub use topology::Graph;

/// Adds recomposition to an app, configured with `options`.
#[derive(Default)]
pub struct ParcelFabricPlugin {
    pub options: RecomposeOptions,
}

impl Plugin for ParcelFabricPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(RecomposeSettings {
            options: self.options.clone(),
        })
        .add_plugins(RecomposePlugin);
    }
}
