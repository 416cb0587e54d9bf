use thiserror::Error;

/// Error taxonomy for the camera engine, mirroring the policy table each
/// variant is handled under: configuration errors fail fast, capture and
/// subprocess errors fail only the owning camera, encode/filesystem errors
/// are logged and the pipeline continues.
#[derive(Debug, Error)]
pub enum CameraHubError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("duplicate {field} in configuration: {value}")]
    DuplicateConfigValue { field: &'static str, value: String },

    #[error("camera '{0}' not started: {1}")]
    CameraStartFailed(String, String),

    #[error("capture device error: {0}")]
    Capture(String),

    #[error("frame encode failed: {0}")]
    Encode(String),

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error("required encoder binary not found: {0}")]
    EncoderNotAvailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(String),

    #[error("worker join failed: {0}")]
    WorkerJoin(String),

    #[error("shutdown timed out: {0}")]
    ShutdownTimeout(String),
}

pub type Result<T> = std::result::Result<T, CameraHubError>;
