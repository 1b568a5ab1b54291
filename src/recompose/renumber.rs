//! Numbering new parcels within their islet's section.

use bevy::log::warn;
use geo::{Contains, Point};

use super::Islet;
use crate::error::FabricError;
use crate::geometry::{inner_point, PolygonIndex};
use crate::parcel::{IdentityScheme, Parcel};

/// Give each parcel the section of the islet containing it and the next
/// number in that section, then build its code.
///
/// A parcel whose code cannot be built keeps its section and number; the
/// error is returned and the run goes on.
pub fn renumber(parcels: &mut [Parcel], islets: &[Islet], scheme: IdentityScheme) -> Vec<FabricError> {
    let index = PolygonIndex::new(islets.iter().map(|i| &i.polygon));
    let mut next_number = vec![1usize; islets.len()];
    let mut failures = Vec::new();

    for parcel in parcels.iter_mut() {
        let point = inner_point(&parcel.polygon);
        let containing = index
            .at_point(point)
            .into_iter()
            .find(|&i| islets[i].polygon.contains(&Point::new(point.x, point.y)));
        let Some(at) = containing else {
            let err = FabricError::TopologyMismatch(format!(
                "parcel at ({:.2}, {:.2}) lies in no islet",
                point.x, point.y
            ));
            warn!("{err}");
            failures.push(err);
            continue;
        };

        let number = next_number[at];
        next_number[at] += 1;
        let label = format!("{}/{}", islets[at].section, number);
        if let Err(err) = scheme.assign(&mut parcel.identity, &islets[at].section, number, &label) {
            warn!("parcel {label} left without a code: {err}");
            failures.push(err);
        }
    }
    failures
}
