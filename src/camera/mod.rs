pub mod mock;
pub mod session;
pub mod v4l2;

pub use session::{CaptureSession, FrameSink, MediaDevice, SessionStatus};
pub use v4l2::V4lDevice;
