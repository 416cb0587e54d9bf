use std::sync::Arc;

/// A raw captured image: three-channel 8-bit BGR pixels, owned by exactly one
/// stage at a time as it moves Reader -> RawQueue -> Dispatcher.
#[derive(Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// BGR24, row-major, no padding.
    pub data: Vec<u8>,
    /// Seconds since epoch, millisecond resolution.
    pub capture_time: f64,
    pub measured_fps: Option<f32>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, capture_time: f64) -> Self {
        Self {
            width,
            height,
            data,
            capture_time,
            measured_fps: None,
        }
    }
}

/// A JPEG-encoded frame. Cheap to fan out: every consumer holds a clone of
/// the `Arc`, never a copy of the bytes.
#[derive(Clone)]
pub struct EncodedFrame {
    pub bytes: Arc<Vec<u8>>,
    pub capture_time: f64,
}

impl EncodedFrame {
    pub fn new(bytes: Vec<u8>, capture_time: f64) -> Self {
        Self {
            bytes: Arc::new(bytes),
            capture_time,
        }
    }
}
