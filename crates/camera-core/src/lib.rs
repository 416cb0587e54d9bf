//! Shared building blocks for the camera engine: frame types, bounded queues,
//! configuration, logging, overlay rendering, the stream hub and the motion
//! detector. The `camera-hub` binary crate wires all of it together per camera.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod logging;
pub mod motion;
pub mod overlay;
pub mod queue;
pub mod stream_hub;

pub use error::CameraHubError;
pub use frame::{EncodedFrame, RawFrame};

pub type Result<T> = std::result::Result<T, CameraHubError>;
