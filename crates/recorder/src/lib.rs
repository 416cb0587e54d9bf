pub mod error;
pub mod motion_recorder;
pub mod recorder_base;
pub mod stream_recorder;
pub mod types;

pub use error::{RecorderError, Result};
pub use motion_recorder::MotionRecorder;
pub use recorder_base::RecorderBase;
pub use stream_recorder::StreamRecorder;
pub use types::{RecorderConfig, TranscodeMode};
