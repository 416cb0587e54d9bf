use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camera_core::config::{CameraConfig, MotionSectionConfig, RecordingsConfig};
use camera_core::dispatcher::Dispatcher;
use camera_core::frame::RawFrame;
use camera_core::motion::{MotionConfig, MotionDetector};
use camera_core::overlay::FrameAnnotator;
use camera_core::queue::DropNewestQueue;
use camera_core::stream_hub::StreamHub;
use capture_device::reader::ReaderConfig;
use capture_device::Reader;
use recorder::types::{RecorderConfig, TranscodeMode};
use recorder::{MotionRecorder, RecorderBase, StreamRecorder};
use tracing::{info, warn};

const RAW_QUEUE_CAPACITY: usize = 10;
const STREAM_RECORDER_QUEUE_CAPACITY: usize = 100;

/// Owns every worker for one configured camera and sequences their
/// start-up and shutdown. This is the top-level per-camera orchestrator:
/// Reader -> RawQueue -> Dispatcher -> {StreamHub, StreamRecorder,
/// MotionDetector -> MotionRecorder}.
pub struct Camera {
    name: String,
    stream_hub: Arc<StreamHub>,
    port: u16,
    reader: Option<Reader>,
    dispatcher: Option<Dispatcher>,
    stream_recorder: Option<StreamRecorder>,
    motion_detector: Option<MotionDetector>,
    motion_recorder: Option<MotionRecorder>,
    fatal: Arc<AtomicBool>,
}

impl Camera {
    pub fn start(
        config: &CameraConfig,
        recordings: &RecordingsConfig,
        motion_section: &MotionSectionConfig,
        annotator: Arc<dyn FrameAnnotator>,
    ) -> anyhow::Result<Self> {
        let raw = &config.raw;
        let name = config.norm_name.clone();

        let fatal = Arc::new(AtomicBool::new(false));
        let stream_hub = Arc::new(StreamHub::new(raw.target_fps, fatal.clone()));

        let raw_queue = DropNewestQueue::<RawFrame>::bounded(RAW_QUEUE_CAPACITY);
        let raw_tx = raw_queue.sender();
        let raw_rx = raw_queue.receiver();

        let stream_recorder_queue = DropNewestQueue::bounded(STREAM_RECORDER_QUEUE_CAPACITY);
        let stream_recorder_tx = stream_recorder_queue.sender();

        let mut motion_tx = None;
        let mut motion_detector = None;
        let mut motion_recorder = None;

        if let Some(motion_cfg) = &config.motion {
            if motion_cfg.enabled {
                match RecorderBase::probe_encoder(&motion_section.h264_encoder) {
                    Ok(()) => {
                        let event_gap_frames = motion_cfg.event_gap * raw.target_fps;
                        let motion_input_cap = (motion_cfg.pre_capture + 20).max(100) as usize;
                        let motion_input_queue = DropNewestQueue::bounded(motion_input_cap);
                        motion_tx = Some(motion_input_queue.sender());

                        let motion_cmd_queue = DropNewestQueue::bounded(motion_input_cap);
                        let motion_cmd_tx = motion_cmd_queue.sender();
                        let motion_cmd_rx = motion_cmd_queue.receiver();

                        let recorder_config = RecorderConfig {
                            output_dir: motion_section.directory.clone(),
                            max_days_to_save: motion_section.max_days_to_save,
                            mode: TranscodeMode::from_u8(motion_section.encode_to_h264),
                            encoder: motion_section.h264_encoder.clone(),
                            bitrate_kbps: motion_section.bitrate,
                            fps: raw.target_fps,
                        };

                        motion_recorder = Some(MotionRecorder::spawn(
                            raw.name.clone(),
                            name.clone(),
                            recorder_config,
                            motion_cmd_rx,
                        ));

                        motion_detector = Some(MotionDetector::spawn(
                            raw.name.clone(),
                            MotionConfig {
                                noise_level: motion_cfg.noise_level,
                                pixel_threshold_pct: motion_cfg.pixel_threshold,
                                object_threshold_pct: motion_cfg.object_threshold,
                                minimum_motion_frames: motion_cfg.minimum_motion_frames,
                                pre_capture: motion_cfg.pre_capture,
                                post_capture: motion_cfg.post_capture,
                                event_gap_frames,
                            },
                            motion_input_queue.receiver(),
                            motion_cmd_tx,
                        ));
                    }
                    Err(e) => {
                        warn!(camera = %raw.name, error = %e, "motion encoder unavailable, disabling motion detection");
                    }
                }
            }
        }

        let mut stream_recorder = None;
        if recordings.save {
            match RecorderBase::probe_encoder(&recordings.h264_encoder) {
                Ok(()) => {
                    let recorder_config = RecorderConfig {
                        output_dir: recordings.directory.clone(),
                        max_days_to_save: recordings.max_days_to_save,
                        mode: TranscodeMode::from_u8(recordings.encode_to_h264),
                        encoder: recordings.h264_encoder.clone(),
                        bitrate_kbps: recordings.bitrate,
                        fps: raw.target_fps,
                    };
                    stream_recorder = Some(StreamRecorder::spawn(
                        raw.name.clone(),
                        name.clone(),
                        recorder_config,
                        stream_recorder_queue.receiver(),
                    ));
                }
                Err(e) => {
                    warn!(camera = %raw.name, error = %e, "recording encoder unavailable, disabling recording");
                }
            }
        }

        let dispatcher = Dispatcher::spawn(
            raw.name.clone(),
            raw.show_fps,
            raw.stream_quality as i32,
            raw_rx,
            annotator,
            stream_hub.clone(),
            stream_recorder_tx,
            motion_tx,
        );

        let reader = Reader::spawn(
            raw.name.clone(),
            ReaderConfig {
                device_path: raw.camera.clone(),
                width: raw.width,
                height: raw.height,
                source_format: raw.source_format.clone(),
                target_fps: raw.target_fps,
                source_fps: raw.source_fps,
            },
            raw_tx,
            fatal.clone(),
        )
        .map_err(|e| anyhow::anyhow!("camera '{}': {e}", raw.name))?;

        info!(camera = %raw.name, port = raw.port, "camera started");

        Ok(Self {
            name: raw.name.clone(),
            stream_hub,
            port: raw.port,
            reader: Some(reader),
            dispatcher: Some(dispatcher),
            stream_recorder,
            motion_detector,
            motion_recorder,
            fatal,
        })
    }

    pub fn stream_hub(&self) -> Arc<StreamHub> {
        self.stream_hub.clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Relaxed)
    }

    /// Stops every worker in order: reader, then dispatcher, then the
    /// recorders and motion detector. Transcode workers spawned along the
    /// way are fire-and-forget and are not joined here.
    pub fn stop(mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop();
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.stop();
        }
        if let Some(detector) = self.motion_detector.take() {
            detector.stop();
        }
        if let Some(rec) = self.motion_recorder.take() {
            rec.stop();
        }
        if let Some(rec) = self.stream_recorder.take() {
            rec.stop();
        }
        info!(camera = %self.name, "camera stopped");
    }
}
