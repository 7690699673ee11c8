//! Deterministic `MediaDevice` for tests: scripted grant/deny behavior and
//! scripted frame outputs, no hardware involved.

use crate::camera::session::MediaDevice;
use crate::common::{AuthFlowError, Result};
use image::{DynamicImage, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

enum AcquireScript {
    Grant,
    Deny,
    Unavailable,
}

pub struct ScriptedDevice {
    script: AcquireScript,
    frames: Vec<DynamicImage>,
    cursor: usize,
    acquired: bool,
    acquires: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedDevice {
    /// Grants access and serves a solid-color frame of the given size.
    pub fn granting(width: u32, height: u32) -> Self {
        let frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([64, 64, 64]),
        ));
        Self::with_frames(vec![frame])
    }

    /// Grants access and serves the given frames in order, repeating the
    /// last one once the script runs out.
    pub fn with_frames(frames: Vec<DynamicImage>) -> Self {
        Self {
            script: AcquireScript::Grant,
            frames,
            cursor: 0,
            acquired: false,
            acquires: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Denies access, as a user rejecting the camera permission prompt.
    pub fn denying() -> Self {
        Self {
            script: AcquireScript::Deny,
            frames: Vec::new(),
            cursor: 0,
            acquired: false,
            acquires: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fails acquisition as if no capture device exists on the host.
    pub fn unavailable() -> Self {
        Self {
            script: AcquireScript::Unavailable,
            frames: Vec::new(),
            cursor: 0,
            acquired: false,
            acquires: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn acquire_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.acquires)
    }

    pub fn release_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }
}

impl MediaDevice for ScriptedDevice {
    fn acquire(&mut self) -> Result<()> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        match self.script {
            AcquireScript::Grant => {
                self.acquired = true;
                Ok(())
            }
            AcquireScript::Deny => Err(AuthFlowError::PermissionDenied),
            AcquireScript::Unavailable => Err(AuthFlowError::DeviceUnavailable(
                "no scripted device".to_string(),
            )),
        }
    }

    fn current_frame(&mut self) -> Result<DynamicImage> {
        if !self.acquired {
            return Err(AuthFlowError::DeviceUnavailable(
                "device not acquired".to_string(),
            ));
        }
        let frame = self
            .frames
            .get(self.cursor)
            .or_else(|| self.frames.last())
            .cloned()
            .ok_or_else(|| AuthFlowError::DeviceUnavailable("no scripted frames".to_string()))?;
        if self.cursor + 1 < self.frames.len() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn release(&mut self) {
        if self.acquired {
            self.acquired = false;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
