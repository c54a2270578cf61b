//! facescan-hw — Hardware abstraction for camera capture.
//!
//! Provides the `MediaDevice`/`DeviceStream` contract used by the capture
//! state machine, a V4L2 implementation, and raw frame conversion to RGB.

pub mod camera;
pub mod frame;

pub use camera::{
    list_devices, CameraError, DeviceInfo, DeviceStream, MediaDevice, PixelFormat, V4l2Device,
    V4l2Stream,
};
pub use frame::Frame;
