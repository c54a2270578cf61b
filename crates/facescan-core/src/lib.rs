//! facescan-core — Capture pipeline for the face recognition client.
//!
//! Turns a live camera stream or a selected file into a transport-ready
//! base64 payload, through an explicit capture state machine.

pub mod capture;
pub mod encoder;
pub mod types;

pub use capture::{CaptureController, CaptureError, CaptureEvent, CaptureMode, CaptureTab};
pub use encoder::{ImageEncoder, SelectedFile};
pub use types::{EncodedImage, FaceRecord, MatchLevel, RecognitionResult};
