//! Running recompositions inside a bevy app.

use bevy::prelude::*;
use geo::Polygon;

use super::{recompose, recompose_zone, RecomposeOptions, RecomposeReport};
use crate::parcel::Parcel;

pub struct RecomposePlugin;

impl Plugin for RecomposePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RecomposeSettings>()
            .init_resource::<ParcelFabric>()
            .add_event::<RecomposeRequest>()
            .add_event::<RecomposeFinished>()
            .add_systems(Update, run_recompose_requests);
    }
}

/// Options applied to every requested run.
#[derive(Resource, Clone, Debug, Default)]
pub struct RecomposeSettings {
    pub options: RecomposeOptions,
}

/// The current parcel set and the streets generated so far.
#[derive(Resource, Clone, Debug, Default)]
pub struct ParcelFabric {
    pub parcels: Vec<Parcel>,
    pub streets: Vec<Polygon<f64>>,
    pub last_report: Option<RecomposeReport>,
}

/// Ask for a run over the fabric.
#[derive(Event, Clone, Debug, Default)]
pub struct RecomposeRequest {
    /// Parcel indices to select, replacing the stored marks.
    pub selection: Option<Vec<usize>>,
    /// Operating zone; when set the zone decides the selection.
    pub zone: Option<Polygon<f64>>,
}

/// Sent once a requested run has replaced the fabric.
#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecomposeFinished {
    pub created: usize,
    pub kept: usize,
    pub failures: usize,
}

fn run_recompose_requests(
    mut requests: EventReader<RecomposeRequest>,
    settings: Res<RecomposeSettings>,
    mut fabric: ResMut<ParcelFabric>,
    mut finished: EventWriter<RecomposeFinished>,
) {
    for request in requests.read() {
        let mut parcels = fabric.parcels.clone();
        if let Some(selection) = &request.selection {
            for (i, parcel) in parcels.iter_mut().enumerate() {
                parcel.selection_mark = selection.contains(&i);
            }
        }

        let result = match &request.zone {
            Some(zone) => match recompose_zone(&parcels, zone, &settings.options) {
                Ok(result) => result,
                Err(err) => {
                    warn!("operating zone rejected: {err}");
                    continue;
                }
            },
            None => recompose(&parcels, &settings.options),
        };

        let report = result.report;
        info!(
            "fabric now holds {} parcels ({} new, {} islets failed)",
            result.parcels.len(),
            report.created,
            report.failures.len()
        );
        finished.send(RecomposeFinished {
            created: report.created,
            kept: report.kept,
            failures: report.failures.len(),
        });

        fabric.parcels = result.parcels;
        fabric.streets.extend(result.streets);
        fabric.last_report = Some(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::DecompositionConfig;
    use crate::geometry::tests::rect;
    use crate::parcel::ParcelIdentity;

    fn app_with_fabric() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, RecomposePlugin));
        app.insert_resource(RecomposeSettings {
            options: RecomposeOptions {
                decomposition: DecompositionConfig {
                    max_area: 1000.0,
                    min_frontage_width: 5.0,
                    ..Default::default()
                },
                ..Default::default()
            },
        });

        let identity = ParcelIdentity {
            department: Some("25".to_string()),
            commune: Some("056".to_string()),
            ..Default::default()
        };
        app.insert_resource(ParcelFabric {
            parcels: vec![
                Parcel::new(rect(0.0, 0.0, 50.0, 100.0)).with_identity(identity.clone()),
                Parcel::new(rect(50.0, 0.0, 100.0, 100.0)).with_identity(identity.clone()),
                Parcel::new(rect(200.0, 0.0, 220.0, 20.0)).with_identity(identity),
            ],
            ..Default::default()
        });
        app
    }

    fn finished(app: &App) -> Vec<RecomposeFinished> {
        app.world()
            .resource::<Events<RecomposeFinished>>()
            .iter_current_update_events()
            .copied()
            .collect()
    }

    #[test]
    fn selection_request_replaces_the_fabric() {
        let mut app = app_with_fabric();
        app.world_mut().send_event(RecomposeRequest {
            selection: Some(vec![0, 1]),
            zone: None,
        });
        app.update();

        assert_eq!(
            finished(&app),
            vec![RecomposeFinished {
                created: 16,
                kept: 1,
                failures: 0
            }]
        );
        let fabric = app.world().resource::<ParcelFabric>();
        assert_eq!(fabric.parcels.len(), 17);
        assert!(!fabric.streets.is_empty());
        assert!(fabric.last_report.is_some());
    }

    #[test]
    fn rejected_zone_leaves_the_fabric_alone() {
        let mut app = app_with_fabric();
        app.world_mut().send_event(RecomposeRequest {
            selection: None,
            zone: Some(Polygon::new(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)].into(), vec![])),
        });
        app.update();

        assert!(finished(&app).is_empty());
        let fabric = app.world().resource::<ParcelFabric>();
        assert_eq!(fabric.parcels.len(), 3);
        assert!(fabric.last_report.is_none());
    }

    #[test]
    fn no_request_no_run() {
        let mut app = app_with_fabric();
        app.update();
        assert!(app.world().resource::<ParcelFabric>().last_report.is_none());
    }
}
