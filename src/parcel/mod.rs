//! Parcel and zone records exchanged with the I/O layer.

use geo::Polygon;

use crate::decomposition::Termination;
use crate::geometry::polygon_area;

pub mod identity;
pub mod selection;

pub use identity::IdentityScheme;
pub use selection::{assign_zone_flags, mark_built, mark_in_zones, mark_larger_than};

/// Cadastral identity. `None` means "not yet computed".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParcelIdentity {
    pub department: Option<String>,
    pub commune: Option<String>,
    /// Absorbed-commune prefix, "000" when the commune was never merged.
    pub commune_sub_code: Option<String>,
    pub section: Option<String>,
    pub number: Option<String>,
    /// Composite code naming the parcel within its commune.
    pub code: Option<String>,
}

/// Which planning zones a parcel overlaps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ZoneFlags {
    pub urbanized: bool,
    pub to_be_urbanized: bool,
    pub not_urbanizable: bool,
}

impl ZoneFlags {
    pub fn set(&mut self, zone_type: ZoneType) {
        match zone_type {
            ZoneType::Urbanized => self.urbanized = true,
            ZoneType::ToBeUrbanized => self.to_be_urbanized = true,
            ZoneType::NotUrbanizable => self.not_urbanizable = true,
        }
    }
}

/// Why a parcel created by a run falls outside the run's area bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizeFlag {
    /// Splitting stopped above the maximal area.
    Oversized(Termination),
    /// Flag-split front lot above the maximal area.
    WideFront,
    /// Islet emitted whole after its decomposition failed.
    Undivided,
    /// Under the minimal area with no neighbour to absorb it.
    Undersized,
}

impl SizeFlag {
    pub fn is_oversized(self) -> bool {
        self != SizeFlag::Undersized
    }
}

/// A land parcel: one polygon plus its cadastral identity and simulation attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Parcel {
    pub polygon: Polygon<f64>,
    pub identity: ParcelIdentity,
    /// Selected for merging and redivision.
    pub selection_mark: bool,
    /// Produced by a simulation run.
    pub simulate: bool,
    pub evaluation_score: Option<f64>,
    pub is_built: bool,
    pub zones: ZoneFlags,
    /// Set on new parcels that break the area bounds of their run.
    pub size_flag: Option<SizeFlag>,
}

impl Parcel {
    pub fn new(polygon: Polygon<f64>) -> Self {
        Self {
            polygon,
            identity: ParcelIdentity::default(),
            selection_mark: false,
            simulate: false,
            evaluation_score: None,
            is_built: false,
            zones: ZoneFlags::default(),
            size_flag: None,
        }
    }

    pub fn with_identity(mut self, identity: ParcelIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn marked(mut self) -> Self {
        self.selection_mark = true;
        self
    }

    pub fn area(&self) -> f64 {
        polygon_area(&self.polygon)
    }

    /// Human-readable reference for logs.
    pub fn label(&self) -> String {
        let id = &self.identity;
        match (&id.code, &id.section, &id.number) {
            (Some(code), _, _) => code.clone(),
            (None, Some(section), Some(number)) => format!("{section}/{number}"),
            (None, Some(section), None) => format!("{section}/?"),
            _ => "<unnamed>".to_string(),
        }
    }
}

/// Generic planning-zone classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZoneType {
    Urbanized,
    ToBeUrbanized,
    NotUrbanizable,
}

impl ZoneType {
    /// Parse a French land-use plan code (`U`, `AU`, `N`, `A`, with sub-suffixes).
    pub fn from_plan_code(code: &str) -> Option<Self> {
        let code = code
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .to_ascii_uppercase();
        if code.starts_with("AU") {
            Some(Self::ToBeUrbanized)
        } else if code.starts_with('U') {
            Some(Self::Urbanized)
        } else if code.starts_with('N') || code.starts_with('A') {
            Some(Self::NotUrbanizable)
        } else {
            None
        }
    }
}

/// A planning zone. Read-only input to selection.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    pub polygon: Polygon<f64>,
    pub generic_type: ZoneType,
    /// Plan-specific label such as "UA" or "1AUb".
    pub precise_type: Option<String>,
    pub commune: Option<String>,
}

impl Zone {
    pub fn new(polygon: Polygon<f64>, generic_type: ZoneType) -> Self {
        Self {
            polygon,
            generic_type,
            precise_type: None,
            commune: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::rect;

    #[test]
    fn plan_codes_map_to_generic_types() {
        assert_eq!(ZoneType::from_plan_code("UA"), Some(ZoneType::Urbanized));
        assert_eq!(ZoneType::from_plan_code("1AUb"), Some(ZoneType::ToBeUrbanized));
        assert_eq!(ZoneType::from_plan_code("X"), None);
        assert_eq!(ZoneType::from_plan_code("AUc"), Some(ZoneType::ToBeUrbanized));
        assert_eq!(ZoneType::from_plan_code("Nh"), Some(ZoneType::NotUrbanizable));
        assert_eq!(ZoneType::from_plan_code("A"), Some(ZoneType::NotUrbanizable));
    }

    #[test]
    fn label_prefers_code() {
        let mut parcel = Parcel::new(rect(0.0, 0.0, 1.0, 1.0));
        assert_eq!(parcel.label(), "<unnamed>");

        parcel.identity.section = Some("AB".to_string());
        parcel.identity.number = Some("12".to_string());
        assert_eq!(parcel.label(), "AB/12");

        parcel.identity.code = Some("25056000AB0012".to_string());
        assert_eq!(parcel.label(), "25056000AB0012");
    }
}
