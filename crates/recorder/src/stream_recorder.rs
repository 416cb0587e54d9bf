use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use camera_core::frame::EncodedFrame;
use chrono::{Datelike, Local, Timelike};
use crossbeam_channel::Receiver;
use tracing::{info, warn};

use crate::recorder_base::{spawn_transcode, sweep_retention, unique_path, RecorderBase};
use crate::types::{RecorderConfig, TranscodeMode};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Consumes encoded frames and continuously archives them, rotating to a
/// new file at every local-time hour boundary. Rotation is evaluated
/// inside the consumer loop itself, not by an external timer, so a
/// recorder that starts mid-hour immediately produces a file for that
/// hour.
pub struct StreamRecorder {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl StreamRecorder {
    pub fn spawn(camera_name: String, norm_name: String, config: RecorderConfig, rx: Receiver<EncodedFrame>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name(format!("stream-recorder-{camera_name}"))
            .spawn(move || run(camera_name, norm_name, config, rx, worker_stop))
            .expect("failed to spawn stream recorder thread");

        Self {
            handle: Some(handle),
            stop,
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    camera_name: String,
    norm_name: String,
    config: RecorderConfig,
    rx: Receiver<EncodedFrame>,
    stop: Arc<AtomicBool>,
) {
    let dir = PathBuf::from(&config.output_dir).join(&norm_name);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(camera = %camera_name, error = %e, "failed to create recording directory");
        return;
    }

    let mut recorder = RecorderBase::new(config.clone());
    let mut current_hour: Option<u32> = None;

    while !stop.load(Ordering::Relaxed) {
        let hour_now = Local::now().hour();
        if current_hour != Some(hour_now) {
            rotate(&camera_name, &dir, &norm_name, &config, &mut recorder, hour_now);
            current_hour = Some(hour_now);
        }

        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(frame) => recorder.write_frame(&frame.bytes),
            Err(_) => continue,
        }
    }

    if let Some(closed) = recorder.stop() {
        maybe_transcode(&config, closed);
    }
}

fn rotate(
    camera_name: &str,
    dir: &PathBuf,
    norm_name: &str,
    config: &RecorderConfig,
    recorder: &mut RecorderBase,
    hour_now: u32,
) {
    if let Some(closed) = recorder.stop() {
        maybe_transcode(config, closed);
        sweep_retention(dir, config.max_days_to_save);
    }

    let now = Local::now();
    let next_hour = (hour_now + 1) % 24;
    let stem = format!(
        "{norm_name}_{hour_now:02}-{next_hour:02}_{day:02}-{month:02}-{year}",
        day = now.day(),
        month = now.month(),
        year = now.year()
    );
    let path = unique_path(dir, &stem, config.mode.container_ext());

    if let Err(e) = recorder.start(path) {
        warn!(camera = %camera_name, error = %e, "failed to start hourly recorder");
    } else {
        info!(camera = %camera_name, hour = hour_now, "hourly recording rotated");
    }
}

fn maybe_transcode(config: &RecorderConfig, closed_path: PathBuf) {
    if config.mode == TranscodeMode::AviThenTranscode {
        spawn_transcode(closed_path, config.encoder.clone(), config.bitrate_kbps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_format_matches_spec() {
        let stem = format!("{}_{:02}-{:02}_{:02}-{:02}-{}", "front_door", 9, 10, 28, 7, 2026);
        assert_eq!(stem, "front_door_09-10_28-07-2026");
    }
}
