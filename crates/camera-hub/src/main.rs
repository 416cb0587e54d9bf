mod camera;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camera_core::config::load_config;
use camera_core::overlay::DefaultAnnotator;
use clap::Parser;
use tracing::{error, info, warn};

use crate::camera::Camera;

#[derive(Parser, Debug)]
#[command(name = "camera-hub", about = "Multi-camera capture, MJPEG streaming and motion-event recording engine")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let _logging_guard = camera_core::logging::init_logging(&config.logs);

    let annotator: Arc<dyn camera_core::overlay::FrameAnnotator> =
        Arc::new(DefaultAnnotator::from_system_font()?);

    let mut cameras = Vec::new();
    for camera_config in &config.cameras {
        match Camera::start(camera_config, &config.recordings, &config.motion, annotator.clone()) {
            Ok(camera) => cameras.push(camera),
            Err(e) => warn!(camera = %camera_config.raw.name, error = %e, "failed to start camera, skipping"),
        }
    }

    if cameras.is_empty() {
        anyhow::bail!("no camera started successfully");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        shutdown_handler.store(true, Ordering::Relaxed);
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    for camera in &cameras {
        let hub = camera.stream_hub();
        let port = camera.port();
        let name = camera.name().to_string();
        runtime.spawn(async move {
            if let Err(e) = camera_core::stream_hub::serve(hub, port).await {
                error!(camera = %name, error = %e, "stream hub exited");
            }
        });
    }

    while !shutdown.load(Ordering::Relaxed) {
        let mut i = 0;
        while i < cameras.len() {
            if cameras[i].is_fatal() {
                let camera = cameras.swap_remove(i);
                warn!(camera = %camera.name(), "camera reported a fatal capture error, stopping it");
                camera.stop();
            } else {
                i += 1;
            }
        }

        if cameras.is_empty() {
            warn!("no cameras left running, shutting down");
            break;
        }

        std::thread::sleep(Duration::from_millis(200));
    }

    info!("stopping all cameras");
    for camera in cameras {
        camera.stop();
    }

    Ok(())
}
