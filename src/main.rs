//! Parcel fabric demo - recomposes a small consolidated block headlessly
//! and logs the resulting parcels.

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::math::DVec2;
use bevy::prelude::*;

use parcel_fabric::decomposition::DecompositionConfig;
use parcel_fabric::geometry::polygon_from_points;
use parcel_fabric::{
    Parcel, ParcelFabric, ParcelFabricPlugin, ParcelIdentity, RecomposeFinished, RecomposeOptions,
    RecomposeRequest, Workflow,
};

fn main() {
    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_once()))
        .add_plugins(LogPlugin::default())
        .add_plugins(ParcelFabricPlugin {
            options: RecomposeOptions {
                workflow: Workflow::ConsolidationDivision,
                decomposition: DecompositionConfig {
                    max_area: 600.0,
                    min_frontage_width: 8.0,
                    noise: 2.0,
                    ..default()
                },
                minimal_area: 150.0,
                ..default()
            },
        })
        .add_systems(Startup, seed_fabric)
        .add_systems(PostUpdate, log_results)
        .run();
}

/// A 3x2 grid of 40x30 parcels; the four left ones get consolidated.
fn seed_fabric(mut fabric: ResMut<ParcelFabric>, mut requests: EventWriter<RecomposeRequest>) {
    let identity = ParcelIdentity {
        department: Some("25".to_string()),
        commune: Some("056".to_string()),
        section: Some("AB".to_string()),
        ..default()
    };

    let mut number = 1;
    for row in 0..2 {
        for col in 0..3 {
            let origin = DVec2::new(col as f64 * 40.0, row as f64 * 30.0);
            let polygon = polygon_from_points(&[
                origin,
                origin + DVec2::new(40.0, 0.0),
                origin + DVec2::new(40.0, 30.0),
                origin + DVec2::new(0.0, 30.0),
            ]);
            fabric.parcels.push(Parcel::new(polygon).with_identity(ParcelIdentity {
                number: Some(number.to_string()),
                ..identity.clone()
            }));
            number += 1;
        }
    }
    info!("seeded {} parcels", fabric.parcels.len());

    requests.send(RecomposeRequest {
        selection: Some(vec![0, 1, 3, 4]),
        zone: None,
    });
}

fn log_results(mut finished: EventReader<RecomposeFinished>, fabric: Res<ParcelFabric>) {
    for event in finished.read() {
        info!(
            "{} parcels created, {} kept, {} failures",
            event.created, event.kept, event.failures
        );
        for parcel in &fabric.parcels {
            match parcel.size_flag {
                Some(flag) => info!("  {} : {:.1} ({flag:?})", parcel.label(), parcel.area()),
                None => info!("  {} : {:.1}", parcel.label(), parcel.area()),
            }
        }
        info!("{} street pieces", fabric.streets.len());
    }
}
