//! Still-frame capture: takes the current contents of an active capture
//! session and encodes them into a JPEG blob ready for submission.

use crate::camera::CaptureSession;
use crate::common::{AuthFlowError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

/// One still image extracted from a live capture session.
#[derive(Clone)]
pub struct CapturedFrame {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("bytes", &format_args!("{} bytes", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Captures a single frame from the session at native resolution and encodes
/// it as JPEG on a blocking worker. Fails with `InvalidCaptureState` unless
/// the session is active, and never yields an empty blob: an encoder failure
/// comes back as `EncodeFailed`.
pub async fn capture_frame(session: &mut CaptureSession, quality: u8) -> Result<CapturedFrame> {
    let frame = session.current_frame()?;
    let width = frame.width();
    let height = frame.height();

    let bytes = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
        .await
        .map_err(|e| AuthFlowError::EncodeFailed(format!("encoder task failed: {e}")))??;

    if bytes.is_empty() {
        return Err(AuthFlowError::EncodeFailed(
            "encoder produced an empty blob".to_string(),
        ));
    }

    tracing::debug!("captured {}x{} frame, {} bytes", width, height, bytes.len());

    Ok(CapturedFrame {
        bytes,
        mime_type: "image/jpeg".to_string(),
        width,
        height,
    })
}

fn encode_jpeg(frame: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    frame
        .write_with_encoder(encoder)
        .map_err(|e| AuthFlowError::EncodeFailed(e.to_string()))?;
    Ok(bytes)
}
