//! Recomposition restricted to an operating zone.

use bevy::log::{debug, info};
use geo::{Contains, Intersects, Polygon};

use super::{recompose, Recomposition, RecomposeOptions};
use crate::error::FabricError;
use crate::geometry::{difference, intersection, polygon_area, validate_polygon};
use crate::parcel::Parcel;

/// Redivide the part of the fabric lying inside `zone`.
///
/// Parcels crossing the zone boundary are cut: the inside part is selected
/// and the outside fragments go back with their original attributes.
/// Fragments under the sliver area are dropped. Marks on parcels outside
/// the zone are ignored.
pub fn recompose_zone(
    parcels: &[Parcel],
    zone: &Polygon<f64>,
    options: &RecomposeOptions,
) -> Result<Recomposition, FabricError> {
    validate_polygon(zone, false)?;
    let sliver = options.decomposition.sliver_area;

    let mut prepared = Vec::with_capacity(parcels.len());
    let mut cut = 0;
    for parcel in parcels {
        let mut parcel = parcel.clone();
        parcel.selection_mark = false;
        if !parcel.polygon.intersects(zone) {
            prepared.push(parcel);
            continue;
        }
        if zone.contains(&parcel.polygon) {
            parcel.selection_mark = true;
            prepared.push(parcel);
            continue;
        }

        let inside = intersection(&parcel.polygon, zone)?;
        let outside = difference(&parcel.polygon, zone)?;
        if inside.iter().all(|p| polygon_area(p) < sliver) {
            // Touches the zone without a usable part inside.
            prepared.push(parcel);
            continue;
        }

        cut += 1;
        for polygon in inside.into_iter().filter(|p| polygon_area(p) >= sliver) {
            prepared.push(Parcel {
                polygon,
                selection_mark: true,
                ..parcel.clone()
            });
        }
        for polygon in outside {
            if polygon_area(&polygon) < sliver {
                debug!("dropping a {:.2} fragment of {}", polygon_area(&polygon), parcel.label());
                continue;
            }
            prepared.push(Parcel {
                polygon,
                ..parcel.clone()
            });
        }
    }

    info!(
        "operating zone selects {} parcels, {} cut at its boundary",
        prepared.iter().filter(|p| p.selection_mark).count(),
        cut
    );
    Ok(recompose(&prepared, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::DecompositionConfig;
    use crate::geometry::tests::rect;
    use crate::geometry::total_area;
    use crate::parcel::ParcelIdentity;

    fn options() -> RecomposeOptions {
        RecomposeOptions {
            decomposition: DecompositionConfig {
                max_area: 1000.0,
                min_frontage_width: 5.0,
                ..Default::default()
            },
            parallel: false,
            ..Default::default()
        }
    }

    fn named(polygon: Polygon<f64>, number: &str) -> Parcel {
        Parcel::new(polygon).with_identity(ParcelIdentity {
            department: Some("25".to_string()),
            commune: Some("056".to_string()),
            section: Some("AB".to_string()),
            number: Some(number.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn crossing_parcel_keeps_its_outside_fragment() {
        let parcels = vec![
            named(rect(0.0, 0.0, 60.0, 40.0), "1"),
            named(rect(100.0, 0.0, 120.0, 20.0), "2").marked(),
        ];
        let zone = rect(20.0, -10.0, 80.0, 50.0);
        let mut opts = options();
        opts.decomposition.max_area = 2000.0;
        let result = recompose_zone(&parcels, &zone, &opts).unwrap();

        // The inside part (40x40) is under max_area and is kept whole.
        assert_eq!(result.report.selected, 1);
        assert_eq!(result.report.created, 1);
        assert!((result.parcels[0].area() - 1600.0).abs() < 1e-6);
        assert_eq!(result.parcels[0].identity.section.as_deref(), Some("New1Section"));

        let fragment = result
            .parcels
            .iter()
            .find(|p| p.identity.section.as_deref() == Some("AB") && p.identity.number.as_deref() == Some("1"))
            .unwrap();
        assert!((fragment.area() - 800.0).abs() < 1e-6);
        assert!(!fragment.simulate);

        // The marked parcel outside the zone is left alone.
        assert!(result.parcels.iter().any(|p| p.identity.number.as_deref() == Some("2")));
        let total = total_area(&result.parcels.iter().map(|p| p.polygon.clone()).collect::<Vec<_>>())
            + total_area(&result.streets);
        assert!((total - 2800.0).abs() < 1.0);
    }

    #[test]
    fn slivers_outside_the_zone_are_dropped() {
        let parcels = vec![named(rect(0.0, 0.0, 50.0, 50.0), "1")];
        let zone = rect(0.05, -1.0, 60.0, 60.0);
        let result = recompose_zone(&parcels, &zone, &options()).unwrap();

        assert!(result.parcels.iter().all(|p| p.identity.section.as_deref() != Some("AB")));
        let total = total_area(&result.parcels.iter().map(|p| p.polygon.clone()).collect::<Vec<_>>())
            + total_area(&result.streets);
        assert!((total - 2497.5).abs() < 1.0);
    }

    #[test]
    fn invalid_zone_is_an_error() {
        let parcels = vec![named(rect(0.0, 0.0, 50.0, 50.0), "1")];
        let zone = Polygon::new(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)].into(), vec![]);
        assert!(matches!(
            recompose_zone(&parcels, &zone, &options()),
            Err(FabricError::Geometry(_))
        ));
    }
}
