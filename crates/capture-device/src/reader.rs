use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use camera_core::frame::RawFrame;
use camera_core::queue::QueueSender;
use linuxvideo::format::{PixFormat, Pixelformat};
use linuxvideo::Device;
use tracing::{error, info, warn};

use crate::error::{CaptureError, Result};

pub struct ReaderConfig {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    pub source_format: String,
    pub target_fps: u32,
    pub source_fps: u32,
}

/// Opens a V4L2 device and pulls frames on its own thread, applying the
/// same time-based throttle as the pipeline this engine replaces: a frame
/// is only forwarded once `now >= next_emit`, and `next_emit` advances by a
/// fixed `1/target_fps` step rather than resetting to `now`, so the
/// long-run average rate holds even under jitter.
pub struct Reader {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl Reader {
    pub fn spawn(
        camera_name: String,
        config: ReaderConfig,
        raw_tx: QueueSender<RawFrame>,
        on_fatal: Arc<AtomicBool>,
    ) -> Result<Self> {
        let device = Device::open(&config.device_path)
            .map_err(|e| CaptureError::DeviceOpen(format!("{}: {e}", config.device_path)))?;

        let pixelformat = parse_pixelformat(&config.source_format)?;
        let format = PixFormat::new(config.width, config.height, pixelformat);
        let mut capture = device
            .video_capture(format)
            .map_err(|e| CaptureError::DeviceOpen(e.to_string()))?;

        if config.source_fps > 0 {
            let _ = capture.set_frame_interval(linuxvideo::Fract::new(1, config.source_fps));
        }

        let actual = capture.format();
        info!(
            camera = %camera_name,
            requested_w = config.width,
            requested_h = config.height,
            actual_w = actual.width(),
            actual_h = actual.height(),
            "capture device opened"
        );

        let mut stream = capture
            .into_stream()
            .map_err(|e| CaptureError::DeviceOpen(e.to_string()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();
        let target_fps = config.target_fps.max(1);
        let source_fps = config.source_fps.max(1);
        let decode_mjpeg = pixelformat == Pixelformat::MJPG;

        let handle = std::thread::Builder::new()
            .name(format!("reader-{camera_name}"))
            .spawn(move || {
                let target_interval = 1.0 / target_fps as f64;
                let poll_sleep = Duration::from_secs_f64((1.0 / source_fps as f64 / 2.0).min(0.005));
                let mut next_emit: Option<f64> = None;
                let mut window_start = Instant::now();
                let mut window_count: u32 = 0u32;
                let mut measured_fps: Option<f32> = None;

                while !worker_stop.load(Ordering::Relaxed) {
                    let buffer = match stream.dequeue(|view| view.data().to_vec()) {
                        Ok(data) => data,
                        Err(e) => {
                            error!(camera = %camera_name, error = %e, "device read failed, stopping camera");
                            on_fatal.store(true, Ordering::Relaxed);
                            break;
                        }
                    };

                    let now = now_secs();

                    window_count += 1;
                    if window_start.elapsed() >= Duration::from_secs(1) {
                        measured_fps = Some(window_count as f32 / window_start.elapsed().as_secs_f32());
                        window_count = 0;
                        window_start = Instant::now();
                    }

                    let emit_at = *next_emit.get_or_insert(now);
                    if should_emit(now, emit_at) {
                        next_emit = Some(emit_at + target_interval);

                        let decoded = if decode_mjpeg {
                            decode_mjpeg_to_bgr(&buffer, config.width, config.height)
                        } else {
                            Ok(buffer)
                        };

                        match decoded {
                            Ok(data) => {
                                let mut frame = RawFrame::new(config.width, config.height, data, now);
                                frame.measured_fps = measured_fps;
                                if !raw_tx.push(frame) {
                                    warn!(camera = %camera_name, "raw queue full, dropping frame");
                                }
                            }
                            Err(e) => {
                                warn!(camera = %camera_name, error = %e, "frame decode failed, dropping frame");
                            }
                        }
                    }

                    std::thread::sleep(poll_sleep);
                }
            })
            .expect("failed to spawn reader thread");

        Ok(Self {
            handle: Some(handle),
            stop,
        })
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A frame is forwarded once `now` reaches the scheduled emission time.
/// Kept as a free function so the throttle boundary (`target_fps ==
/// source_fps`, `target_fps > source_fps`) is testable without a real
/// device or a running thread.
fn should_emit(now: f64, next_emit: f64) -> bool {
    now >= next_emit
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs_f64()
}

fn parse_pixelformat(name: &str) -> Result<Pixelformat> {
    match name.to_uppercase().as_str() {
        "MJPG" | "MJPEG" => Ok(Pixelformat::MJPG),
        "YUYV" => Ok(Pixelformat::YUYV),
        other => Err(CaptureError::UnsupportedFormat(other.to_string())),
    }
}

fn decode_mjpeg_to_bgr(jpeg: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut decompressor =
        turbojpeg::Decompressor::new().map_err(|e| CaptureError::DeviceRead(e.to_string()))?;
    let header = decompressor
        .read_header(jpeg)
        .map_err(|e| CaptureError::DeviceRead(e.to_string()))?;

    let mut buffer = vec![0u8; (width * height * 3) as usize];
    let image = turbojpeg::Image {
        pixels: &mut buffer[..],
        width: header.width,
        pitch: width as usize * 3,
        height: header.height,
        format: turbojpeg::PixelFormat::BGR,
    };
    decompressor
        .decompress(jpeg, image)
        .map_err(|e| CaptureError::DeviceRead(e.to_string()))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pixelformat_accepts_known_names() {
        assert_eq!(parse_pixelformat("mjpg").unwrap(), Pixelformat::MJPG);
        assert_eq!(parse_pixelformat("MJPEG").unwrap(), Pixelformat::MJPG);
        assert_eq!(parse_pixelformat("yuyv").unwrap(), Pixelformat::YUYV);
    }

    #[test]
    fn parse_pixelformat_rejects_unknown_names() {
        assert!(parse_pixelformat("H264").is_err());
    }

    #[test]
    fn throttle_emits_every_captured_frame_when_rates_match() {
        let target_interval = 1.0 / 10.0;
        let mut next_emit = 0.0;
        let mut emitted = 0;
        for i in 0..10 {
            let now = i as f64 * target_interval;
            if should_emit(now, next_emit) {
                next_emit += target_interval;
                emitted += 1;
            }
        }
        assert_eq!(emitted, 10);
    }

    #[test]
    fn throttle_caps_emission_at_source_rate_when_target_exceeds_it() {
        // source delivers at 5fps, target asks for 30fps: every captured
        // frame clears the `now >= next_emit` test, so emission rate
        // equals source rate rather than synthesizing extra frames.
        let source_interval = 1.0 / 5.0;
        let target_interval = 1.0 / 30.0;
        let mut next_emit = 0.0;
        let mut emitted = 0;
        for i in 0..5 {
            let now = i as f64 * source_interval;
            if should_emit(now, next_emit) {
                next_emit += target_interval;
                emitted += 1;
            }
        }
        assert_eq!(emitted, 5);
    }
}
