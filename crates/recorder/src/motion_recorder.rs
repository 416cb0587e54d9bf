use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use camera_core::motion::MotionCommand;
use chrono::Local;
use crossbeam_channel::Receiver;
use tracing::{info, warn};

use crate::recorder_base::{spawn_transcode, unique_path, RecorderBase};
use crate::types::{RecorderConfig, TranscodeMode};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives one `RecorderBase` through `start_event`/`stop_event` lifecycles
/// as `MotionCommand`s arrive from the motion detector. Unlike
/// `StreamRecorder` there is no hourly rotation; a recording exists only
/// while an event is open.
pub struct MotionRecorder {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl MotionRecorder {
    pub fn spawn(
        camera_name: String,
        norm_name: String,
        config: RecorderConfig,
        rx: Receiver<MotionCommand>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name(format!("motion-recorder-{camera_name}"))
            .spawn(move || run(camera_name, norm_name, config, rx, worker_stop))
            .expect("failed to spawn motion recorder thread");

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
    rx: Receiver<MotionCommand>,
    stop: Arc<AtomicBool>,
) {
    let dir = PathBuf::from(&config.output_dir).join(&norm_name);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(camera = %camera_name, error = %e, "failed to create motion directory");
        return;
    }

    let mut recorder = RecorderBase::new(config.clone());

    while !stop.load(Ordering::Relaxed) {
        let cmd = match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(cmd) => cmd,
            Err(_) => continue,
        };

        match cmd {
            MotionCommand::StartEvent { capture_time: _, preroll } => {
                start_event(&camera_name, &dir, &norm_name, &config, &mut recorder);
                for frame in preroll {
                    recorder.write_frame(&frame.bytes);
                }
            }
            MotionCommand::Frame(frame) => {
                recorder.write_frame(&frame.bytes);
            }
            MotionCommand::StopEvent => {
                drain_then_stop(&camera_name, &rx, &mut recorder, &config);
            }
        }
    }

    if recorder.is_recording() {
        drain_then_stop(&camera_name, &rx, &mut recorder, &config);
    }
}

fn start_event(camera_name: &str, dir: &PathBuf, norm_name: &str, config: &RecorderConfig, recorder: &mut RecorderBase) {
    let now = Local::now();
    let stem = format!("{norm_name}_{}", now.format("%d-%m-%Y_%H:%M:%S%.3f"));
    let path = unique_path(dir, &stem, config.mode.container_ext());

    if let Err(e) = recorder.start(path) {
        warn!(camera = %camera_name, error = %e, "failed to start motion event recorder");
    } else {
        info!(camera = %camera_name, "motion event recording started");
    }
}

/// Drains (bounded, 10s) any frames still queued behind this `StopEvent`,
/// writing each to the subprocess before closing it, matching the source's
/// `stop_event` drain loop. This thread is the queue's only consumer, so
/// draining means pulling and writing frames ourselves, not just waiting
/// for the queue to empty on its own.
fn drain_then_stop(camera_name: &str, rx: &Receiver<MotionCommand>, recorder: &mut RecorderBase, config: &RecorderConfig) {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    loop {
        match rx.try_recv() {
            Ok(MotionCommand::Frame(frame)) => recorder.write_frame(&frame.bytes),
            Ok(MotionCommand::StartEvent { preroll, .. }) => {
                for frame in preroll {
                    recorder.write_frame(&frame.bytes);
                }
            }
            Ok(MotionCommand::StopEvent) => {}
            Err(crossbeam_channel::TryRecvError::Empty) => break,
            Err(crossbeam_channel::TryRecvError::Disconnected) => break,
        }
        if Instant::now() >= deadline {
            warn!(camera = %camera_name, "motion queue did not drain within 10s, closing recorder anyway");
            break;
        }
    }

    if let Some(closed) = recorder.stop() {
        info!(camera = %camera_name, "motion event recording closed");
        if config.mode == TranscodeMode::AviThenTranscode {
            spawn_transcode(closed, config.encoder.clone(), config.bitrate_kbps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_filename_format_matches_spec() {
        let stem = format!("{}_{}", "front_door", "28-07-2026_09:15:03.120");
        assert_eq!(stem, "front_door_28-07-2026_09:15:03.120");
    }
}
