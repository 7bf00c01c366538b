use anyhow::Context;
use nalgebra::Point3;
use std::f64::consts::PI;
use std::time::{Duration, Instant};
use tilestream::prelude::*;

const FRAMES: u32 = 600;
const FRAME_TIME: Duration = Duration::from_millis(33);

/// Streams tiles for a camera descending onto a fixed location and logs what
/// the engine does. Pass a JSON config path as the first argument to override
/// the defaults.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tilestream::init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => TileStreamConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => TileStreamConfig::default(),
    };
    let world_size = config.world_size;

    let mut engine = TileEngine::builder()
        .with_config(config)
        .with_spawner(TokioSpawner::shared()?)
        .build()?;

    // San Francisco
    let target = world_position(LatLng::new(37.7749, -122.4194), world_size);
    let mut altitude = world_size;
    let mut interval = tokio::time::interval(FRAME_TIME);

    for frame in 0..FRAMES {
        interval.tick().await;
        altitude = (altitude * 0.98).max(0.05);

        let eye = Point3::new(target.x, altitude, target.z + altitude * 0.5);
        let camera = PerspectiveCamera::look_at(eye, target, 1280.0, 720.0, 60.0);
        let report = engine.update(&camera, Instant::now());

        if report.release_unused_resources {
            log::info!("frame {}: released {} bitmaps", frame, report.reclaimed);
        }
        if frame % 30 == 0 {
            let stats = engine.stats();
            log::info!(
                "frame {} altitude {:.2}: {} visible, {} loaded, {} loading, {} queued, {} records",
                frame,
                altitude,
                stats.visible,
                stats.loaded,
                stats.loading,
                stats.queued,
                stats.records
            );
        }
    }

    let stats = engine.stats();
    log::info!("final: {:?}", stats);
    if let Some(error) = engine.diagnostics().last_error() {
        log::warn!(
            "{} load errors, most recent: {}",
            engine.diagnostics().error_count(),
            error
        );
    }
    engine.shutdown()?;
    Ok(())
}

/// Web Mercator position on the ground plane of a `world_size` square map
fn world_position(lat_lng: LatLng, world_size: f64) -> Point3<f64> {
    let lat = LatLng::clamp_lat(lat_lng.lat).to_radians();
    let x = (lat_lng.lng + 180.0) / 360.0 * world_size;
    let z = (1.0 - lat.tan().asinh() / PI) / 2.0 * world_size;
    Point3::new(x, 0.0, z)
}
