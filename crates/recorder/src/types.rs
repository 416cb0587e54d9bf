/// How the recorded stream is encoded on disk, matching the three modes
/// the source recording manager supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeMode {
    /// Keep MJPEG-in-AVI, never convert.
    KeepMjpeg,
    /// Record MJPEG-in-AVI, convert to H.264/MP4 in the background after close.
    AviThenTranscode,
    /// Record H.264/MP4 directly, live.
    LiveH264,
}

impl TranscodeMode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => TranscodeMode::KeepMjpeg,
            1 => TranscodeMode::AviThenTranscode,
            _ => TranscodeMode::LiveH264,
        }
    }

    pub fn container_ext(self) -> &'static str {
        match self {
            TranscodeMode::KeepMjpeg | TranscodeMode::AviThenTranscode => "avi",
            TranscodeMode::LiveH264 => "mp4",
        }
    }
}

/// Immutable, per-instance recorder configuration. The source shared this
/// as class-level state across all recorder instances; here every recorder
/// gets its own value handed in at construction.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_dir: String,
    pub max_days_to_save: u32,
    pub mode: TranscodeMode,
    pub encoder: String,
    pub bitrate_kbps: u32,
    pub fps: u32,
}
