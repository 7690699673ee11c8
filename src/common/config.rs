use crate::common::error::{AuthFlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_warmup_frames() -> u32 {
    5
}
fn default_warmup_delay() -> u64 {
    50
}
fn default_jpeg_quality() -> u8 {
    85
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_width(),
            height: default_height(),
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Overrides the platform data directory when set.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                base_url: "http://localhost:8000".to_string(),
                timeout_seconds: default_timeout(),
            },
            camera: CameraConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "configs/aegis.toml";
        Self::load_from_path(&std::path::PathBuf::from(config_path))
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Err(AuthFlowError::Other(anyhow::anyhow!(
                "Config file not found: {}. Please create it from the example.",
                path.display()
            )));
        }

        tracing::debug!("loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AuthFlowError::Other(anyhow::anyhow!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.service.base_url).map_err(|e| {
            AuthFlowError::Other(anyhow::anyhow!(
                "Invalid service base_url {:?}: {}",
                self.service.base_url,
                e
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AuthFlowError::Other(anyhow::anyhow!(
                "Service base_url must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(AuthFlowError::Other(anyhow::anyhow!(
                "Camera width must be between 1 and 4096, got {}",
                self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(AuthFlowError::Other(anyhow::anyhow!(
                "Camera height must be between 1 and 4096, got {}",
                self.camera.height
            )));
        }

        if self.camera.jpeg_quality == 0 || self.camera.jpeg_quality > 100 {
            return Err(AuthFlowError::Other(anyhow::anyhow!(
                "JPEG quality must be between 1 and 100, got {}",
                self.camera.jpeg_quality
            )));
        }

        if self.service.timeout_seconds == 0 || self.service.timeout_seconds > 300 {
            return Err(AuthFlowError::Other(anyhow::anyhow!(
                "Request timeout must be between 1 and 300 seconds, got {}",
                self.service.timeout_seconds
            )));
        }

        Ok(())
    }
}
