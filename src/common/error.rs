use std::collections::BTreeMap;
use thiserror::Error;

/// Per-field validation failures, keyed by form field name.
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Error, Debug)]
pub enum AuthFlowError {
    #[error("invalid fields: {}", format_fields(.0))]
    Field(FieldErrors),

    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no capture device available: {0}")]
    DeviceUnavailable(String),

    #[error("capture requires an active session (status: {0})")]
    InvalidCaptureState(crate::camera::SessionStatus),

    #[error("frame encoding failed: {0}")]
    EncodeFailed(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("rejected by server: {0}")]
    ServerValidationError(String),

    #[error("server error (status {0})")]
    ServerError(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl AuthFlowError {
    /// Human-readable message for the notification collaborator. Server
    /// details are surfaced where the user can act on them; infrastructure
    /// failures get a generic line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Field(errors) => format!("Please check your input: {}", format_fields(errors)),
            Self::PermissionDenied => "Camera access was denied.".to_string(),
            Self::DeviceUnavailable(_) => "Could not access the camera.".to_string(),
            Self::InvalidCaptureState(_) | Self::EncodeFailed(_) => {
                "Could not capture an image. Please try again.".to_string()
            }
            Self::InvalidCredentials(detail) => detail.clone(),
            Self::ServerValidationError(detail) => detail.clone(),
            Self::ServerError(_) | Self::Network(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for AuthFlowError {
    fn from(err: reqwest::Error) -> Self {
        AuthFlowError::Network(err.to_string())
    }
}

fn format_fields(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, AuthFlowError>;
