//! Fusing selected parcels into islets.

use std::collections::HashMap;

use bevy::log::debug;
use geo::{Intersects, Polygon};
use petgraph::unionfind::UnionFind;

use crate::error::FabricError;
use crate::geometry::{polygon_area, union_all, PolygonIndex};
use crate::parcel::{Parcel, ParcelIdentity, ZoneFlags};

/// A connected group of selected parcels, fused into one polygon.
#[derive(Clone, Debug)]
pub struct Islet {
    pub polygon: Polygon<f64>,
    /// Section given to every parcel cut from this islet.
    pub section: String,
    /// Department, commune and sub-code of the largest contributing parcel.
    pub identity: ParcelIdentity,
    /// Zones any contributing parcel overlapped.
    pub zones: ZoneFlags,
    /// Indices of the contributing parcels in the selection.
    pub sources: Vec<usize>,
}

impl Islet {
    pub fn area(&self) -> f64 {
        polygon_area(&self.polygon)
    }

    /// A fresh, unnumbered parcel cut from this islet.
    pub fn new_parcel(&self, polygon: Polygon<f64>) -> Parcel {
        let mut parcel = Parcel::new(polygon);
        parcel.simulate = true;
        parcel.zones = self.zones;
        parcel.identity = ParcelIdentity {
            department: self.identity.department.clone(),
            commune: self.identity.commune.clone(),
            commune_sub_code: self.identity.commune_sub_code.clone(),
            ..Default::default()
        };
        parcel
    }
}

/// Section name of the `k`-th islet of a run (1-based).
pub fn section_name(k: usize, workflow_name: Option<&str>) -> String {
    match workflow_name {
        Some(name) => format!("newSection{k}{name}"),
        None => format!("New{k}Section"),
    }
}

/// Group touching parcels and union each group.
///
/// A group whose union falls apart into several polygons yields one islet
/// per polygon. Islets follow the order of their first parcel.
pub fn build_islets(
    parcels: &[Parcel],
    workflow_name: Option<&str>,
) -> Result<Vec<Islet>, FabricError> {
    let polygons: Vec<Polygon<f64>> = parcels.iter().map(|p| p.polygon.clone()).collect();
    let index = PolygonIndex::new(&polygons);

    let mut groups = UnionFind::<usize>::new(polygons.len());
    for (i, polygon) in polygons.iter().enumerate() {
        for j in index.candidates(polygon, 0.0) {
            if j > i && polygon.intersects(&polygons[j]) {
                groups.union(i, j);
            }
        }
    }

    let mut order: Vec<Vec<usize>> = Vec::new();
    let mut slot: HashMap<usize, usize> = HashMap::new();
    for i in 0..polygons.len() {
        let root = groups.find(i);
        let at = *slot.entry(root).or_insert_with(|| {
            order.push(Vec::new());
            order.len() - 1
        });
        order[at].push(i);
    }

    let mut islets = Vec::new();
    for members in order {
        let group: Vec<Polygon<f64>> = members.iter().map(|&i| polygons[i].clone()).collect();
        for polygon in union_all(&group)? {
            let sources: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&i| polygons[i].intersects(&polygon))
                .collect();
            let Some(&largest) = sources
                .iter()
                .max_by(|&&a, &&b| parcels[a].area().total_cmp(&parcels[b].area()))
            else {
                continue;
            };

            let mut zones = ZoneFlags::default();
            for &i in &sources {
                let flags = parcels[i].zones;
                zones.urbanized |= flags.urbanized;
                zones.to_be_urbanized |= flags.to_be_urbanized;
                zones.not_urbanizable |= flags.not_urbanizable;
            }

            islets.push(Islet {
                polygon,
                section: section_name(islets.len() + 1, workflow_name),
                identity: parcels[largest].identity.clone(),
                zones,
                sources,
            });
        }
    }

    debug!("{} selected parcels fused into {} islets", parcels.len(), islets.len());
    Ok(islets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::rect;

    fn parcel(x0: f64, y0: f64, x1: f64, y1: f64, commune: &str) -> Parcel {
        Parcel::new(rect(x0, y0, x1, y1)).with_identity(ParcelIdentity {
            commune: Some(commune.to_string()),
            section: Some("ZA".to_string()),
            number: Some("1".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn touching_parcels_fuse() {
        let parcels = vec![
            parcel(0.0, 0.0, 10.0, 10.0, "001"),
            parcel(50.0, 0.0, 60.0, 10.0, "003"),
            parcel(10.0, 0.0, 30.0, 10.0, "002"),
        ];
        let islets = build_islets(&parcels, None).unwrap();

        assert_eq!(islets.len(), 2);
        assert!((islets[0].area() - 300.0).abs() < 1e-6);
        assert_eq!(islets[0].sources, vec![0, 2]);
        assert_eq!(islets[0].section, "New1Section");
        // Largest contributor wins.
        assert_eq!(islets[0].identity.commune.as_deref(), Some("002"));
        assert_eq!(islets[1].sources, vec![1]);
        assert_eq!(islets[1].section, "New2Section");
    }

    #[test]
    fn workflow_name_changes_sections() {
        assert_eq!(section_name(3, Some("zone")), "newSection3zone");
        assert_eq!(section_name(1, None), "New1Section");
    }

    #[test]
    fn new_parcels_carry_location_but_no_number() {
        let mut source = parcel(0.0, 0.0, 10.0, 10.0, "001");
        source.zones.urbanized = true;
        let islets = build_islets(&[source], Some("x")).unwrap();
        let fresh = islets[0].new_parcel(rect(0.0, 0.0, 5.0, 5.0));

        assert!(fresh.simulate && !fresh.selection_mark);
        assert!(fresh.zones.urbanized);
        assert_eq!(fresh.identity.commune.as_deref(), Some("001"));
        assert!(fresh.identity.section.is_none() && fresh.identity.number.is_none());
    }
}
