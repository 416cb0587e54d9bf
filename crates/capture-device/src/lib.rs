pub mod error;
pub mod reader;

pub use error::{CaptureError, Result};
pub use reader::{Reader, ReaderConfig};
