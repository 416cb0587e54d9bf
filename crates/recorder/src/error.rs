use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("encoder not available: {0}")]
    EncoderNotAvailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("recorder not started")]
    NotStarted,

    #[error("recorder already running")]
    AlreadyRunning,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("subprocess exited unexpectedly: {0}")]
    ProcessExited(String),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
