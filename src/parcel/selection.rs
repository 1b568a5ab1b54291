//! Marking parcels for a run and deriving their zone/built attributes.

use bevy::log::debug;
use geo::{Intersects, Polygon};

use super::{Parcel, Zone, ZoneType};
use crate::error::FabricError;
use crate::geometry::{intersection, total_area, PolygonIndex};

/// Overlap area between `polygon` and the indexed layer entries.
fn overlap_area(
    polygon: &Polygon<f64>,
    layer: &[Polygon<f64>],
    index: &PolygonIndex,
) -> Result<f64, FabricError> {
    let mut area = 0.0;
    for i in index.candidates(polygon, 0.0) {
        if polygon.intersects(&layer[i]) {
            area += total_area(&intersection(polygon, &layer[i])?);
        }
    }
    Ok(area)
}

/// Mark parcels lying at least `min_share` (0..=1) inside zones of `zone_type`.
///
/// When `precise_type` is given only zones with that label count. Returns
/// how many parcels were newly marked.
pub fn mark_in_zones(
    parcels: &mut [Parcel],
    zones: &[Zone],
    zone_type: ZoneType,
    precise_type: Option<&str>,
    min_share: f64,
) -> Result<usize, FabricError> {
    let layer: Vec<Polygon<f64>> = zones
        .iter()
        .filter(|z| z.generic_type == zone_type)
        .filter(|z| precise_type.map_or(true, |p| z.precise_type.as_deref() == Some(p)))
        .map(|z| z.polygon.clone())
        .collect();
    let index = PolygonIndex::new(&layer);

    let mut marked = 0;
    for parcel in parcels.iter_mut().filter(|p| !p.selection_mark) {
        let area = parcel.area();
        if area <= 0.0 {
            continue;
        }
        if overlap_area(&parcel.polygon, &layer, &index)? / area >= min_share {
            parcel.selection_mark = true;
            marked += 1;
        }
    }
    debug!("marked {marked} parcels in {zone_type:?} zones");
    Ok(marked)
}

/// Mark every parcel larger than `min_area`.
pub fn mark_larger_than(parcels: &mut [Parcel], min_area: f64) -> usize {
    let mut marked = 0;
    for parcel in parcels.iter_mut() {
        if !parcel.selection_mark && parcel.area() > min_area {
            parcel.selection_mark = true;
            marked += 1;
        }
    }
    marked
}

/// Set each parcel's zone flags from the zones it overlaps by more than `min_overlap` area.
pub fn assign_zone_flags(
    parcels: &mut [Parcel],
    zones: &[Zone],
    min_overlap: f64,
) -> Result<(), FabricError> {
    let index = PolygonIndex::new(zones.iter().map(|z| &z.polygon));
    for parcel in parcels.iter_mut() {
        for i in index.candidates(&parcel.polygon, 0.0) {
            let zone = &zones[i];
            if !parcel.polygon.intersects(&zone.polygon) {
                continue;
            }
            let shared = total_area(&intersection(&parcel.polygon, &zone.polygon)?);
            if shared > min_overlap {
                parcel.zones.set(zone.generic_type);
            }
        }
    }
    Ok(())
}

/// Flag parcels covered by building footprints totalling more than `min_footprint` area.
pub fn mark_built(
    parcels: &mut [Parcel],
    buildings: &[Polygon<f64>],
    min_footprint: f64,
) -> Result<usize, FabricError> {
    let index = PolygonIndex::new(buildings);
    let mut built = 0;
    for parcel in parcels.iter_mut() {
        parcel.is_built = overlap_area(&parcel.polygon, buildings, &index)? > min_footprint;
        if parcel.is_built {
            built += 1;
        }
    }
    Ok(built)
}
