use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use crate::frame::{EncodedFrame, RawFrame};
use crate::overlay::FrameAnnotator;
use crate::queue::QueueSender;
use crate::stream_hub::StreamHub;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Encodes annotated frames to JPEG and fans them out to the stream hub, the
/// hourly recorder queue and (if motion detection is enabled) the motion
/// detector queue. One dedicated worker thread per camera.
pub struct Dispatcher {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        camera_name: String,
        show_fps: bool,
        jpeg_quality: i32,
        raw_rx: Receiver<RawFrame>,
        annotator: Arc<dyn FrameAnnotator>,
        stream_hub: Arc<StreamHub>,
        stream_recorder_tx: QueueSender<EncodedFrame>,
        motion_tx: Option<QueueSender<(RawFrame, EncodedFrame)>>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name(format!("dispatcher-{camera_name}"))
            .spawn(move || {
                while !worker_stop.load(Ordering::Relaxed) {
                    let raw = match raw_rx.recv_timeout(RECV_TIMEOUT) {
                        Ok(frame) => frame,
                        Err(_) => continue,
                    };

                    let annotated = annotator.annotate(&raw, &camera_name, show_fps);

                    let encoded_bytes = match encode_jpeg(&annotated, jpeg_quality) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!(camera = %camera_name, error = %e, "jpeg encode failed, dropping frame");
                            continue;
                        }
                    };

                    let encoded = EncodedFrame::new(encoded_bytes, annotated.capture_time);

                    stream_hub.write(encoded.clone());

                    if !stream_recorder_tx.push(encoded.clone()) {
                        debug!(camera = %camera_name, "stream recorder queue full, dropping frame");
                    }

                    if let Some(ref tx) = motion_tx {
                        if !tx.push((raw, encoded)) {
                            debug!(camera = %camera_name, "motion queue full, dropping frame");
                        }
                    }
                }
            })
            .expect("failed to spawn dispatcher thread");

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

fn encode_jpeg(frame: &RawFrame, quality: i32) -> crate::Result<Vec<u8>> {
    let image = turbojpeg::Image {
        pixels: frame.data.as_slice(),
        width: frame.width as usize,
        pitch: frame.width as usize * 3,
        height: frame.height as usize,
        format: turbojpeg::PixelFormat::BGR,
    };
    turbojpeg::compress(image, quality, turbojpeg::Subsamp::Sub2x2)
        .map(|buf| buf.to_vec())
        .map_err(|e| crate::CameraHubError::Encode(e.to_string()))
}
