use crate::common::{AuthFlowError, Result};
use image::DynamicImage;
use std::fmt;

/// Lifecycle of a capture session.
///
/// `Idle → Requesting → Active → Released`, with `Requesting → Error` when
/// device acquisition fails. `Released` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Requesting,
    Active,
    Released,
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Requesting => "requesting",
            SessionStatus::Active => "active",
            SessionStatus::Released => "released",
            SessionStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// The capability seam over the host camera. `V4lDevice` is the real
/// implementation; tests use the scripted mock.
pub trait MediaDevice: Send {
    /// Requests access to the device and starts the underlying stream.
    /// Failures are classified as `PermissionDenied` or `DeviceUnavailable`.
    fn acquire(&mut self) -> Result<()>;

    /// Reads the current frame from the live stream.
    fn current_frame(&mut self) -> Result<DynamicImage>;

    /// Stops the stream and releases the device. Must tolerate being called
    /// when nothing was acquired.
    fn release(&mut self);
}

/// Attach point for a live video sink (the preview surface).
pub trait FrameSink: Send {
    fn frame(&mut self, frame: &DynamicImage);
}

impl<F: FnMut(&DynamicImage) + Send> FrameSink for F {
    fn frame(&mut self, frame: &DynamicImage) {
        self(frame)
    }
}

/// Owns the binding to a single camera device. Exactly one session may hold
/// the device at a time; the flow controller enforces one session per flow.
pub struct CaptureSession {
    device: Box<dyn MediaDevice>,
    sink: Option<Box<dyn FrameSink>>,
    status: SessionStatus,
    last_error: Option<String>,
}

impl CaptureSession {
    pub fn new(device: Box<dyn MediaDevice>) -> Self {
        Self {
            device,
            sink: None,
            status: SessionStatus::Idle,
            last_error: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Binds the live video sink. The sink starts receiving frames once the
    /// session is active.
    pub fn attach_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    /// Requests camera access and transitions to `Active`, or to `Error`
    /// with the classified acquisition failure.
    pub fn open(&mut self) -> Result<()> {
        if self.status != SessionStatus::Idle {
            return Err(AuthFlowError::Other(anyhow::anyhow!(
                "capture session already opened (status: {})",
                self.status
            )));
        }

        self.status = SessionStatus::Requesting;
        tracing::debug!("requesting camera access");

        match self.device.acquire() {
            Ok(()) => {
                self.status = SessionStatus::Active;
                tracing::debug!("capture session active");
                // Prime the sink so a preview appears immediately. Frame
                // errors here are not fatal to the session.
                let _ = self.forward_frame();
                Ok(())
            }
            Err(err) => {
                self.status = SessionStatus::Error;
                self.last_error = Some(err.to_string());
                tracing::warn!("camera acquisition failed: {}", err);
                Err(err)
            }
        }
    }

    /// Stops the device stream, detaches the sink and transitions to
    /// `Released`. Idempotent: a no-op on Idle, Released and Error sessions.
    pub fn close(&mut self) {
        match self.status {
            SessionStatus::Requesting | SessionStatus::Active => {
                self.device.release();
                self.sink = None;
                self.status = SessionStatus::Released;
                tracing::debug!("capture session released");
            }
            _ => {}
        }
    }

    /// Current frame at native resolution. Only valid while `Active`; no
    /// bytes may leave a session in any other state.
    pub fn current_frame(&mut self) -> Result<DynamicImage> {
        if self.status != SessionStatus::Active {
            return Err(AuthFlowError::InvalidCaptureState(self.status));
        }
        self.device.current_frame()
    }

    /// Feeds the current frame to the attached sink, if any.
    pub fn preview_tick(&mut self) -> Result<()> {
        if self.status != SessionStatus::Active {
            return Err(AuthFlowError::InvalidCaptureState(self.status));
        }
        self.forward_frame()
    }

    fn forward_frame(&mut self) -> Result<()> {
        if self.sink.is_some() {
            let frame = self.device.current_frame()?;
            if let Some(sink) = self.sink.as_mut() {
                sink.frame(&frame);
            }
        }
        Ok(())
    }
}
