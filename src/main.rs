// This file is an example of how to use the `loi_vision` library.
// It plays a synthetic depth recording of a person walking from one room into
// another at sensor frame rate, and prints every confirmed location change.

use env_logger::Env;
use futures::StreamExt;
use loi_vision::core_modules::depth_frame::DepthFrame;
use loi_vision::core_modules::utils::image_helper;
use loi_vision::core_modules::voi::{Voi, VoiShape};
use loi_vision::{LocationService, PipelineConfig};
use std::time::Duration;

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

const WALL_DEPTH: u8 = 230;
const PERSON_DEPTH: u8 = 140;

/// A frame with a 24x40 "person" in front of a flat wall, left edge at `x`.
fn person_at(x: u32) -> Result<DepthFrame, loi_vision::LocationError> {
    let mut data = vec![WALL_DEPTH; (WIDTH * HEIGHT) as usize];
    for py in 40..80 {
        for px in x..(x + 24).min(WIDTH) {
            data[(py * WIDTH + px) as usize] = PERSON_DEPTH;
        }
    }
    DepthFrame::new(data, WIDTH, HEIGHT)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = PipelineConfig {
        frame_width: WIDTH,
        frame_height: HEIGHT,
        volumes: vec![
            Voi::new("kitchen", VoiShape::cuboid(0.0, 0.0, 220.0, 80.0, 120.0, 150.0)),
            Voi::new("living_room", VoiShape::cuboid(80.0, 0.0, 220.0, 80.0, 120.0, 150.0)),
        ],
        ..PipelineConfig::default()
    };
    let service = LocationService::new(config)?;

    let mut location = service.watch_location();
    let printer = tokio::spawn(async move {
        while location.changed().await.is_ok() {
            let current = location.borrow_and_update().clone();
            println!("Current location: {}", current.as_deref().unwrap_or("none"));
        }
    });

    // Walk right two pixels per frame, pausing in each room long enough to be confirmed.
    let mut path: Vec<u32> = vec![20; 30];
    path.extend((20..110).step_by(2));
    path.extend(std::iter::repeat_n(110, 30));
    let frames = path
        .into_iter()
        .map(person_at)
        .collect::<Result<Vec<_>, _>>()?;

    let stream = futures::stream::iter(frames).then(|frame| async move {
        tokio::time::sleep(FRAME_INTERVAL).await;
        frame
    });
    let stats = service.run(Box::pin(stream)).await?;
    println!(
        "Processed {} frames ({} skipped, {} rejected)",
        stats.processed, stats.skipped, stats.rejected
    );

    // Give a pending location its window before shutting down.
    tokio::time::sleep(Duration::from_millis(600)).await;
    service.poll();

    let snapshot = std::env::temp_dir().join("loi_vision_locations.png");
    let rendered = service.pipeline().lock().render_locations()?;
    image_helper::save_rgb(&snapshot, &rendered)?;
    println!("Saved location snapshot to {}", snapshot.display());

    drop(service);
    printer.await?;
    Ok(())
}
