use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("device open failed: {0}")]
    DeviceOpen(String),

    #[error("device read failed: {0}")]
    DeviceRead(String),

    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
