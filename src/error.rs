//! Error taxonomy shared by the engines and the orchestrator.

/// Errors raised while building, splitting, or recomposing parcels.
///
/// `Geometry` and `Infeasible` are recovered by the orchestrator (the unit
/// is emitted unchanged). Topology queries answer `None` rather than
/// `TopologyMismatch`; the variant reports broken graphs and parcels that
/// fall outside every islet. `AttributeMissing` is fatal for one record only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FabricError {
    #[error("Invalid geometry: {0}")]
    Geometry(String),
    #[error("Decomposition infeasible: {0}")]
    Infeasible(String),
    #[error("Topology mismatch: {0}")]
    TopologyMismatch(String),
    #[error("Missing attribute `{field}` on parcel {parcel}")]
    AttributeMissing { field: &'static str, parcel: String },
}

impl FabricError {
    /// Whether the orchestrator should fall back to emitting the unit unchanged.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Geometry(_) | Self::Infeasible(_))
    }
}
