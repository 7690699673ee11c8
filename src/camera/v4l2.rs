use crate::camera::session::MediaDevice;
use crate::common::{AuthFlowError, CameraConfig, Result};
use image::{DynamicImage, ImageBuffer, Luma};
use std::io::ErrorKind;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

/// V4L2-backed camera device. Acquisition opens `/dev/video<index>`,
/// negotiates the format and warms the sensor up; each frame read uses a
/// short-lived mmap stream, which is enough for single still captures.
pub struct V4lDevice {
    config: CameraConfig,
    device: Option<Device>,
    format: Option<v4l::Format>,
}

impl V4lDevice {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            device: None,
            format: None,
        }
    }

    fn classify_open_error(index: u32, err: &std::io::Error) -> AuthFlowError {
        match err.kind() {
            ErrorKind::PermissionDenied => AuthFlowError::PermissionDenied,
            _ => AuthFlowError::DeviceUnavailable(format!("/dev/video{index}: {err}")),
        }
    }

    fn negotiate_format(&self, device: &Device) -> Result<v4l::Format> {
        let mut fmt = device
            .format()
            .map_err(|e| AuthFlowError::DeviceUnavailable(format!("failed to get format: {e}")))?;

        fmt.width = self.config.width;
        fmt.height = self.config.height;

        // Keep GREY for IR sensors, otherwise ask for MJPG.
        if fmt.fourcc.str().ok() != Some("GREY") {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("could not set exact camera format: {}, using defaults", e);
        }

        let final_fmt = device
            .format()
            .map_err(|e| AuthFlowError::DeviceUnavailable(format!("failed to get format: {e}")))?;

        if final_fmt.width != self.config.width || final_fmt.height != self.config.height {
            tracing::warn!(
                "camera resolution {}x{} differs from requested {}x{}",
                final_fmt.width,
                final_fmt.height,
                self.config.width,
                self.config.height
            );
        }

        Ok(final_fmt)
    }

    fn decode_frame(data: &[u8], fmt: &v4l::Format) -> Result<DynamicImage> {
        match fmt.fourcc.str().ok() {
            Some("GREY") => {
                let buffer =
                    ImageBuffer::<Luma<u8>, _>::from_raw(fmt.width, fmt.height, data.to_vec())
                        .ok_or_else(|| {
                            AuthFlowError::DeviceUnavailable(
                                "failed to build grayscale frame buffer".to_string(),
                            )
                        })?;
                Ok(DynamicImage::ImageLuma8(buffer))
            }
            Some("MJPG") => Ok(image::load_from_memory(data)?),
            other => Err(AuthFlowError::DeviceUnavailable(format!(
                "unsupported camera pixel format: {}",
                other.unwrap_or("unknown")
            ))),
        }
    }
}

impl MediaDevice for V4lDevice {
    fn acquire(&mut self) -> Result<()> {
        let index = self.config.device_index;
        tracing::debug!("opening camera device {}", index);

        let mut device =
            Device::new(index as usize).map_err(|e| Self::classify_open_error(index, &e))?;

        let format = self.negotiate_format(&device)?;
        tracing::debug!(
            "camera format {}x{} {}",
            format.width,
            format.height,
            format.fourcc.str().unwrap_or("?")
        );

        // Warmup frames so auto-exposure settles (and IR emitters ramp up)
        // before the first real capture.
        {
            let mut stream =
                v4l::io::mmap::Stream::with_buffers(&mut device, Type::VideoCapture, 4).map_err(
                    |e| AuthFlowError::DeviceUnavailable(format!("failed to start stream: {e}")),
                )?;
            for _ in 0..self.config.warmup_frames {
                stream.next().map_err(|e| {
                    AuthFlowError::DeviceUnavailable(format!("warmup capture failed: {e}"))
                })?;
                std::thread::sleep(std::time::Duration::from_millis(self.config.warmup_delay_ms));
            }
        }

        self.device = Some(device);
        self.format = Some(format);
        Ok(())
    }

    fn current_frame(&mut self) -> Result<DynamicImage> {
        let device = self.device.as_mut().ok_or_else(|| {
            AuthFlowError::DeviceUnavailable("camera device not acquired".to_string())
        })?;
        let format = self.format.clone().ok_or_else(|| {
            AuthFlowError::DeviceUnavailable("camera format not negotiated".to_string())
        })?;

        let mut stream = v4l::io::mmap::Stream::with_buffers(device, Type::VideoCapture, 4)
            .map_err(|e| AuthFlowError::DeviceUnavailable(format!("failed to start stream: {e}")))?;

        let (buf, _meta) = stream
            .next()
            .map_err(|e| AuthFlowError::DeviceUnavailable(format!("frame capture failed: {e}")))?;

        Self::decode_frame(buf, &format)
    }

    fn release(&mut self) {
        if self.device.take().is_some() {
            tracing::debug!("camera device {} released", self.config.device_index);
        }
        self.format = None;
    }
}
