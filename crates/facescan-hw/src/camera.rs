//! Camera device lifecycle: the `MediaDevice`/`DeviceStream` contract and
//! its V4L2 implementation via the `v4l` crate.

use crate::frame::{self, Frame};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("stream is closed")]
    StreamClosed,
}

/// Source of live video streams.
///
/// `open` is a suspension point; it either yields a live stream or fails
/// once. There are no retries at this layer.
#[async_trait]
pub trait MediaDevice: Send + Sync {
    type Stream: DeviceStream + 'static;

    async fn open(&self) -> Result<Self::Stream, CameraError>;
}

/// A live video stream bound to a camera.
pub trait DeviceStream: Send {
    /// Grab the newest frame at the stream's native resolution.
    fn current_frame(&mut self) -> Result<Frame, CameraError>;

    /// Release all underlying hardware. Idempotent.
    fn close(&mut self);

    fn is_live(&self) -> bool;
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel, IR cameras).
    Grey,
    /// Motion JPEG, one JPEG image per buffer.
    Mjpeg,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(Self::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(Self::Grey)
        } else if fourcc == FourCC::new(b"MJPG") {
            Some(Self::Mjpeg)
        } else {
            None
        }
    }
}

/// A V4L2 camera that opens streams at a fixed target resolution.
#[derive(Debug, Clone)]
pub struct V4l2Device {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    /// Frames discarded on each grab for AGC/AE settling.
    pub warmup_frames: usize,
}

impl V4l2Device {
    pub fn new(device_path: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            device_path: device_path.into(),
            width,
            height,
            warmup_frames: 4,
        }
    }

    pub fn with_warmup_frames(mut self, warmup_frames: usize) -> Self {
        self.warmup_frames = warmup_frames;
        self
    }
}

#[async_trait]
impl MediaDevice for V4l2Device {
    type Stream = V4l2Stream;

    async fn open(&self) -> Result<V4l2Stream, CameraError> {
        let device = self.clone();
        tokio::task::spawn_blocking(move || V4l2Stream::open(&device))
            .await
            .map_err(|e| CameraError::CaptureFailed(format!("open task failed: {e}")))?
    }
}

/// Open V4L2 stream. Dropping it releases the device.
pub struct V4l2Stream {
    device: Option<Device>,
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
    warmup_frames: usize,
}

impl V4l2Stream {
    fn open(target: &V4l2Device) -> Result<Self, CameraError> {
        let device_path = target.device_path.as_str();
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                CameraError::PermissionDenied(device_path.to_string())
            }
            _ if e.to_string().contains("busy") || e.to_string().contains("EBUSY") => {
                CameraError::DeviceBusy
            }
            _ => CameraError::DeviceNotFound(format!("{device_path}: {e}")),
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV at the target size; accept GREY or MJPG if that is
        // what the driver hands back.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = target.width;
        fmt.height = target.height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or MJPG)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device: Some(device),
            device_path: device_path.to_string(),
            width: negotiated.width,
            height: negotiated.height,
            fourcc,
            pixel_format,
            warmup_frames: target.warmup_frames,
        })
    }

    fn buf_to_rgb(&self, buf: &[u8]) -> Result<(Vec<u8>, u32, u32), CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map(|rgb| (rgb, self.width, self.height)),
            PixelFormat::Grey => frame::grey_to_rgb(buf, self.width, self.height)
                .map(|rgb| (rgb, self.width, self.height)),
            PixelFormat::Mjpeg => frame::mjpeg_to_rgb(buf),
        };
        converted.map_err(|e| CameraError::CaptureFailed(format!("frame conversion failed: {e}")))
    }
}

impl DeviceStream for V4l2Stream {
    fn current_frame(&mut self) -> Result<Frame, CameraError> {
        let device = self.device.as_ref().ok_or(CameraError::StreamClosed)?;
        let mut stream = MmapStream::with_buffers(device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        for remaining in (0..=self.warmup_frames).rev() {
            let (buf, meta) = stream.next().map_err(|e| {
                CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
            })?;
            if remaining > 0 {
                tracing::trace!(seq = meta.sequence, "discarding warmup frame");
                continue;
            }
            let sequence = meta.sequence;
            let (data, width, height) = self.buf_to_rgb(buf)?;
            return Ok(Frame {
                data,
                width,
                height,
                timestamp: std::time::Instant::now(),
                sequence,
            });
        }

        Err(CameraError::CaptureFailed("no frame dequeued".into()))
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            tracing::info!(device = %self.device_path, "camera released");
        }
    }

    fn is_live(&self) -> bool {
        self.device.is_some()
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        self.close();
    }
}

/// List available V4L2 video capture devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for i in 0..16 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            continue;
        }
        devices.push(DeviceInfo {
            path,
            name: caps.card.clone(),
            driver: caps.driver.clone(),
            bus: caps.bus.clone(),
        });
    }

    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"YUYV")),
            Some(PixelFormat::Yuyv)
        );
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"GREY")),
            Some(PixelFormat::Grey)
        );
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"MJPG")),
            Some(PixelFormat::Mjpeg)
        );
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"H264")), None);
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let device = V4l2Device::new("/dev/video-does-not-exist", 640, 480);
        let result = device.open().await;
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }

    #[test]
    fn test_builder_sets_warmup() {
        let device = V4l2Device::new("/dev/video0", 640, 480).with_warmup_frames(0);
        assert_eq!(device.warmup_frames, 0);
        assert_eq!((device.width, device.height), (640, 480));
    }
}
