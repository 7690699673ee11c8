pub mod config;
pub mod error;

pub use config::{CameraConfig, Config, ServiceConfig, StorageConfig};
pub use error::{AuthFlowError, FieldErrors, Result};
