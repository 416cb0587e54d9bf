use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use opencv::core::{Mat, Mat_AUTO_STEP, Size, CV_8UC1, CV_8UC3};
use opencv::prelude::*;
use tracing::{debug, info, warn};

use crate::frame::{EncodedFrame, RawFrame};
use crate::queue::QueueSender;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const PROCESSED_MAX_WIDTH: i32 = 640;
const PROCESSED_MAX_HEIGHT: i32 = 480;

/// Tuning knobs resolved from `MotionCameraConfig` plus the camera's
/// `target_fps` (used to convert `event_gap` seconds to frames).
#[derive(Debug, Clone)]
pub struct MotionConfig {
    pub noise_level: u8,
    pub pixel_threshold_pct: f32,
    pub object_threshold_pct: f32,
    pub minimum_motion_frames: u32,
    pub pre_capture: u32,
    pub post_capture: u32,
    pub event_gap_frames: u32,
}

/// The motion state machine's tagged states, matching the transition table
/// this module implements.
#[derive(Debug, Clone, PartialEq)]
enum MotionState {
    Idle,
    Candidate { streak: u32 },
    InMotion,
    PostRoll { idle_streak: u32 },
    EventCoolDown { idle_streak: u32 },
}

/// Commands the motion detector sends to its motion recorder; kept separate
/// from the recorder crate so `camera-core` has no dependency on it.
pub enum MotionCommand {
    StartEvent { capture_time: f64, preroll: Vec<EncodedFrame> },
    Frame(EncodedFrame),
    StopEvent,
}

struct PreRollRing {
    capacity: usize,
    buf: VecDeque<EncodedFrame>,
}

impl PreRollRing {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, frame: EncodedFrame) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(frame);
    }

    fn drain(&mut self) -> Vec<EncodedFrame> {
        self.buf.drain(..).collect()
    }
}

pub struct MotionDetector {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl MotionDetector {
    pub fn spawn(
        camera_name: String,
        config: MotionConfig,
        input_rx: Receiver<(RawFrame, EncodedFrame)>,
        recorder_tx: QueueSender<MotionCommand>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name(format!("motion-{camera_name}"))
            .spawn(move || run(camera_name, config, input_rx, recorder_tx, worker_stop))
            .expect("failed to spawn motion detector thread");

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
    config: MotionConfig,
    input_rx: Receiver<(RawFrame, EncodedFrame)>,
    recorder_tx: QueueSender<MotionCommand>,
    stop: Arc<AtomicBool>,
) {
    let mut state = MotionState::Idle;
    let mut pre_roll = PreRollRing::new(config.pre_capture as usize);
    let mut min_window: Vec<EncodedFrame> = Vec::new();
    let mut previous: Option<Mat> = None;
    let mut processed_size: Option<Size> = None;
    let mut pixel_threshold = 0f64;
    let mut object_threshold = 0f64;

    while !stop.load(Ordering::Relaxed) {
        let (raw, encoded) = match input_rx.recv_timeout(RECV_TIMEOUT) {
            Ok(pair) => pair,
            Err(_) => continue,
        };

        let size = *processed_size.get_or_insert_with(|| {
            let (w, h) = processed_dimensions(raw.width as i32, raw.height as i32);
            pixel_threshold = config.pixel_threshold_pct as f64 / 100.0 * (w * h) as f64;
            object_threshold = config.object_threshold_pct as f64 / 100.0 * (w * h) as f64;
            Size::new(w, h)
        });

        let processed = match preprocess(&raw, size) {
            Ok(mat) => mat,
            Err(e) => {
                warn!(camera = %camera_name, error = %e, "motion preprocessing failed, skipping frame");
                continue;
            }
        };

        let motion = match previous.as_ref() {
            Some(prev) => match detect_motion(prev, &processed, config.noise_level, pixel_threshold, object_threshold) {
                Ok(m) => m,
                Err(e) => {
                    warn!(camera = %camera_name, error = %e, "motion diff failed, treating as no motion");
                    false
                }
            },
            None => false,
        };
        previous = Some(processed);

        state = step(
            &camera_name,
            state,
            motion,
            &config,
            encoded,
            raw.capture_time,
            &mut pre_roll,
            &mut min_window,
            &recorder_tx,
        );
    }

    if matches!(
        state,
        MotionState::InMotion | MotionState::PostRoll { .. } | MotionState::EventCoolDown { .. }
    ) {
        let _ = recorder_tx.push(MotionCommand::StopEvent);
    }
}

#[allow(clippy::too_many_arguments)]
fn step(
    camera_name: &str,
    state: MotionState,
    motion: bool,
    config: &MotionConfig,
    encoded: EncodedFrame,
    capture_time: f64,
    pre_roll: &mut PreRollRing,
    min_window: &mut Vec<EncodedFrame>,
    recorder_tx: &QueueSender<MotionCommand>,
) -> MotionState {
    match state {
        MotionState::Idle => {
            if motion {
                min_window.clear();
                min_window.push(encoded);
                MotionState::Candidate { streak: 1 }
            } else {
                pre_roll.push(encoded);
                MotionState::Idle
            }
        }
        MotionState::Candidate { streak } => {
            if motion {
                let streak = streak + 1;
                min_window.push(encoded);
                if streak >= config.minimum_motion_frames {
                    info!(camera = %camera_name, "motion confirmed, starting event");
                    let preroll = pre_roll.drain();
                    let frames = std::mem::take(min_window);
                    let _ = recorder_tx.push(MotionCommand::StartEvent {
                        capture_time,
                        preroll,
                    });
                    for f in frames {
                        let _ = recorder_tx.push(MotionCommand::Frame(f));
                    }
                    MotionState::InMotion
                } else {
                    MotionState::Candidate { streak }
                }
            } else {
                min_window.clear();
                pre_roll.push(encoded);
                MotionState::Idle
            }
        }
        MotionState::InMotion => {
            let _ = recorder_tx.push(MotionCommand::Frame(encoded));
            if motion {
                MotionState::InMotion
            } else {
                MotionState::PostRoll { idle_streak: 1 }
            }
        }
        MotionState::PostRoll { idle_streak } => {
            if motion {
                let _ = recorder_tx.push(MotionCommand::Frame(encoded));
                MotionState::InMotion
            } else if idle_streak + 1 <= config.post_capture {
                let _ = recorder_tx.push(MotionCommand::Frame(encoded));
                MotionState::PostRoll {
                    idle_streak: idle_streak + 1,
                }
            } else if idle_streak + 1 <= config.post_capture + config.event_gap_frames {
                MotionState::EventCoolDown {
                    idle_streak: idle_streak + 1,
                }
            } else {
                info!(camera = %camera_name, "motion event closed");
                let _ = recorder_tx.push(MotionCommand::StopEvent);
                pre_roll.push(encoded);
                MotionState::Idle
            }
        }
        MotionState::EventCoolDown { idle_streak } => {
            if motion {
                debug!(camera = %camera_name, "motion resumed during cooldown, same event");
                let _ = recorder_tx.push(MotionCommand::Frame(encoded));
                MotionState::InMotion
            } else if idle_streak + 1 <= config.post_capture + config.event_gap_frames {
                pre_roll.push(encoded);
                MotionState::EventCoolDown {
                    idle_streak: idle_streak + 1,
                }
            } else {
                info!(camera = %camera_name, "motion event closed");
                let _ = recorder_tx.push(MotionCommand::StopEvent);
                pre_roll.push(encoded);
                MotionState::Idle
            }
        }
    }
}

fn processed_dimensions(width: i32, height: i32) -> (i32, i32) {
    if width <= PROCESSED_MAX_WIDTH && height <= PROCESSED_MAX_HEIGHT {
        return (width, height);
    }
    let scale = (PROCESSED_MAX_WIDTH as f64 / width as f64).min(PROCESSED_MAX_HEIGHT as f64 / height as f64);
    (
        (width as f64 * scale).round() as i32,
        (height as f64 * scale).round() as i32,
    )
}

fn preprocess(raw: &RawFrame, target: Size) -> opencv::Result<Mat> {
    let bgr = unsafe {
        Mat::new_rows_cols_with_data_unsafe(
            raw.height as i32,
            raw.width as i32,
            CV_8UC3,
            raw.data.as_ptr() as *mut std::ffi::c_void,
            Mat_AUTO_STEP,
        )?
    };

    let resized = if target.width != raw.width as i32 || target.height != raw.height as i32 {
        let mut out = Mat::default();
        opencv::imgproc::resize(&bgr, &mut out, target, 0.0, 0.0, opencv::imgproc::INTER_LINEAR)?;
        out
    } else {
        bgr.try_clone()?
    };

    let mut gray = Mat::default();
    opencv::imgproc::cvt_color(&resized, &mut gray, opencv::imgproc::COLOR_BGR2GRAY, 0)?;

    let mut blurred = Mat::default();
    opencv::imgproc::gaussian_blur(
        &gray,
        &mut blurred,
        Size::new(5, 5),
        0.0,
        0.0,
        opencv::core::BORDER_DEFAULT,
    )?;

    Ok(blurred)
}

fn detect_motion(
    previous: &Mat,
    current: &Mat,
    noise_level: u8,
    pixel_threshold: f64,
    object_threshold: f64,
) -> opencv::Result<bool> {
    let mut diff = Mat::default();
    opencv::core::absdiff(previous, current, &mut diff)?;

    let mut thresholded = Mat::default();
    opencv::imgproc::threshold(
        &diff,
        &mut thresholded,
        noise_level as f64,
        255.0,
        opencv::imgproc::THRESH_BINARY,
    )?;

    let mut dilated = Mat::default();
    opencv::imgproc::dilate(
        &thresholded,
        &mut dilated,
        &Mat::default(),
        opencv::core::Point::new(-1, -1),
        2,
        opencv::core::BORDER_CONSTANT,
        opencv::imgproc::morphology_default_border_value()?,
    )?;

    let nonzero = opencv::core::count_non_zero(&dilated)?;
    if (nonzero as f64) < pixel_threshold {
        return Ok(false);
    }

    let mut labels = Mat::default();
    let mut stats = Mat::default();
    let mut centroids = Mat::default();
    let n_labels = opencv::imgproc::connected_components_with_stats(
        &dilated,
        &mut labels,
        &mut stats,
        &mut centroids,
        8,
        CV_8UC1,
    )?;

    for label in 1..n_labels {
        let area = *stats.at_2d::<i32>(label, opencv::imgproc::CC_STAT_AREA)?;
        if area as f64 >= object_threshold {
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(t: f64) -> EncodedFrame {
        EncodedFrame::new(vec![0u8; 4], t)
    }

    fn default_config() -> MotionConfig {
        MotionConfig {
            noise_level: 25,
            pixel_threshold_pct: 1.5,
            object_threshold_pct: 0.5,
            minimum_motion_frames: 3,
            pre_capture: 5,
            post_capture: 4,
            event_gap_frames: 0,
        }
    }

    #[test]
    fn processed_dimensions_keeps_small_frames_unscaled() {
        assert_eq!(processed_dimensions(320, 240), (320, 240));
    }

    #[test]
    fn processed_dimensions_scales_large_frames_down() {
        let (w, h) = processed_dimensions(1920, 1080);
        assert!(w <= PROCESSED_MAX_WIDTH && h <= PROCESSED_MAX_HEIGHT);
    }

    #[test]
    fn single_motion_burst_produces_expected_frame_count() {
        let config = default_config();
        let (tx_ch, rx_ch) = crossbeam_channel::unbounded();
        let tx: QueueSender<MotionCommand> = tx_ch.into();
        let mut state = MotionState::Idle;
        let mut pre_roll = PreRollRing::new(config.pre_capture as usize);
        let mut min_window = Vec::new();

        for i in 0..5 {
            state = step(
                "cam",
                state,
                false,
                &config,
                encoded(i as f64),
                i as f64,
                &mut pre_roll,
                &mut min_window,
                &tx,
            );
        }
        for i in 5..15 {
            state = step(
                "cam",
                state,
                true,
                &config,
                encoded(i as f64),
                i as f64,
                &mut pre_roll,
                &mut min_window,
                &tx,
            );
        }
        for i in 15..20 {
            state = step(
                "cam",
                state,
                false,
                &config,
                encoded(i as f64),
                i as f64,
                &mut pre_roll,
                &mut min_window,
                &tx,
            );
        }

        assert_eq!(state, MotionState::Idle);

        let commands: Vec<MotionCommand> = rx_ch.try_iter().collect();
        let frame_count = commands
            .iter()
            .filter(|c| matches!(c, MotionCommand::Frame(_)))
            .count();
        let preroll_count: usize = commands
            .iter()
            .filter_map(|c| match c {
                MotionCommand::StartEvent { preroll, .. } => Some(preroll.len()),
                _ => None,
            })
            .sum();
        // pre_capture(5) + min_window(3, sent as Frame) + remaining motion(10-3=7) + post_capture(4)
        assert_eq!(preroll_count, 5);
        assert_eq!(frame_count, 3 + 7 + 4);
    }
}
