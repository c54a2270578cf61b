//! Capture state machine.
//!
//! Coordinates a [`MediaDevice`] and the [`ImageEncoder`] across two
//! mutually exclusive input modes, live camera and file upload. Every input
//! is a [`CaptureEvent`] delivered through [`CaptureController::dispatch`],
//! so transition legality is decided in one place.
//!
//! ```text
//! idle --start-camera--> streaming --capture--> previewing
//! idle/previewing --select-file--> upload-pending --> previewing
//! previewing --reset--> idle
//! ```

use crate::encoder::{EncodeError, ImageEncoder, SelectedFile};
use crate::types::EncodedImage;
use facescan_hw::{CameraError, DeviceStream, MediaDevice};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

/// Observable capture mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Idle,
    Streaming,
    UploadPending,
    Previewing,
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::UploadPending => "upload-pending",
            Self::Previewing => "previewing",
        })
    }
}

/// Which input surface the user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTab {
    Camera,
    Upload,
}

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    StartCamera,
    Capture,
    SelectFile(SelectedFile),
    /// Retake / choose a different image. From `streaming` this is the
    /// explicit camera stop.
    Reset,
    SwitchTab(CaptureTab),
}

impl CaptureEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartCamera => "start-camera",
            Self::Capture => "capture",
            Self::SelectFile(_) => "select-file",
            Self::Reset => "reset",
            Self::SwitchTab(_) => "switch-tab",
        }
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(#[source] CameraError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("{event} is not valid while {mode}")]
    IllegalTransition {
        event: &'static str,
        mode: CaptureMode,
    },
}

impl CaptureError {
    /// One-line notification text for the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::DeviceUnavailable(_) => {
                "Unable to access camera. Please check permissions.".to_string()
            }
            Self::Encode(EncodeError::InvalidFileType(_)) => {
                "Please select an image file.".to_string()
            }
            Self::Encode(EncodeError::FileTooLarge { limit, .. }) => {
                format!("Image is too large (limit {}).", human_size(*limit))
            }
            Self::Encode(e) => format!("Could not capture image: {e}"),
            Self::IllegalTransition { .. } => self.to_string(),
        }
    }
}

fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB && bytes % MB == 0 {
        format!("{} MB", bytes / MB)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{} KB", bytes / KB)
    } else {
        format!("{bytes} bytes")
    }
}

/// Called once per produced payload with the bare base64 body.
pub type PayloadCallback = Box<dyn FnMut(&str) + Send>;

enum Session<S> {
    Idle,
    Streaming(S),
    UploadPending,
    Previewing(EncodedImage),
}

impl<S> Session<S> {
    fn mode(&self) -> CaptureMode {
        match self {
            Self::Idle => CaptureMode::Idle,
            Self::Streaming(_) => CaptureMode::Streaming,
            Self::UploadPending => CaptureMode::UploadPending,
            Self::Previewing(_) => CaptureMode::Previewing,
        }
    }
}

/// Owns the capture session: at most one of {device stream, preview
/// payload} is held at any time.
pub struct CaptureController<D: MediaDevice> {
    device: D,
    encoder: ImageEncoder,
    session: Session<D::Stream>,
    session_id: Uuid,
    tab: CaptureTab,
    mode_tx: watch::Sender<CaptureMode>,
    on_payload_ready: Option<PayloadCallback>,
}

impl<D: MediaDevice> CaptureController<D> {
    pub fn new(device: D, encoder: ImageEncoder) -> Self {
        let (mode_tx, _) = watch::channel(CaptureMode::Idle);
        Self {
            device,
            encoder,
            session: Session::Idle,
            session_id: Uuid::new_v4(),
            tab: CaptureTab::Camera,
            mode_tx,
            on_payload_ready: None,
        }
    }

    pub fn on_payload_ready(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_payload_ready = Some(Box::new(callback));
        self
    }

    pub fn mode(&self) -> CaptureMode {
        self.session.mode()
    }

    /// Watch mode changes, e.g. for rendering.
    pub fn subscribe(&self) -> watch::Receiver<CaptureMode> {
        self.mode_tx.subscribe()
    }

    /// The previewed payload, if any.
    pub fn payload(&self) -> Option<&EncodedImage> {
        match &self.session {
            Session::Previewing(image) => Some(image),
            _ => None,
        }
    }

    pub fn tab(&self) -> CaptureTab {
        self.tab
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Apply one event. Returns the resulting mode.
    ///
    /// Errors are reported once; afterwards the controller is idle (or in
    /// its previous mode for pre-read upload rejections and illegal events)
    /// and accepts new events.
    pub async fn dispatch(&mut self, event: CaptureEvent) -> Result<CaptureMode, CaptureError> {
        let mode = self.mode();
        tracing::debug!(session = %self.session_id, event = event.name(), %mode, "dispatch");

        match (event, mode) {
            (CaptureEvent::StartCamera, CaptureMode::Idle) => self.start_camera().await,
            (CaptureEvent::Capture, CaptureMode::Streaming) => self.capture().await,
            (CaptureEvent::SelectFile(file), CaptureMode::Idle | CaptureMode::Previewing) => {
                self.select_file(file).await
            }
            (CaptureEvent::SelectFile(file), CaptureMode::Streaming) => {
                // Leaving the camera: the stream goes before the upload starts.
                self.return_to_idle();
                self.select_file(file).await
            }
            (CaptureEvent::Reset, CaptureMode::Previewing | CaptureMode::Streaming) => {
                self.reset();
                Ok(self.mode())
            }
            (CaptureEvent::SwitchTab(tab), _) => {
                self.switch_tab(tab);
                Ok(self.mode())
            }
            (event, mode) => Err(CaptureError::IllegalTransition {
                event: event.name(),
                mode,
            }),
        }
    }

    async fn start_camera(&mut self) -> Result<CaptureMode, CaptureError> {
        self.tab = CaptureTab::Camera;
        match self.device.open().await {
            Ok(stream) => {
                self.set_session(Session::Streaming(stream));
                Ok(CaptureMode::Streaming)
            }
            Err(e) => {
                tracing::warn!(session = %self.session_id, error = %e, "camera unavailable");
                Err(CaptureError::DeviceUnavailable(e))
            }
        }
    }

    async fn capture(&mut self) -> Result<CaptureMode, CaptureError> {
        let Some(mut stream) = self.take_stream() else {
            return Err(CaptureError::IllegalTransition {
                event: "capture",
                mode: self.mode(),
            });
        };

        // Dequeueing (warmup included) and JPEG encoding block.
        let encoder = self.encoder.clone();
        let encoded = tokio::task::spawn_blocking(move || {
            let encoded = stream
                .current_frame()
                .map_err(|e| EncodeError::Raster(e.to_string()))
                .and_then(|frame| encoder.encode_frame(&frame));
            stream.close();
            encoded
        })
        .await
        .unwrap_or_else(|e| Err(EncodeError::Raster(format!("capture task failed: {e}"))));

        match encoded {
            Ok(image) => {
                self.emit(&image);
                self.set_session(Session::Previewing(image));
                Ok(CaptureMode::Previewing)
            }
            Err(e) => {
                tracing::warn!(session = %self.session_id, error = %e, "frame capture failed");
                self.return_to_idle();
                Err(e.into())
            }
        }
    }

    async fn select_file(&mut self, file: SelectedFile) -> Result<CaptureMode, CaptureError> {
        self.tab = CaptureTab::Upload;

        // Rejections happen before any content is read and leave the mode alone.
        if let Err(e) = self.encoder.inspect_file(&file).await {
            tracing::warn!(session = %self.session_id, path = %file.path.display(), error = %e, "upload rejected");
            if !e.is_rejection() {
                self.return_to_idle();
            }
            return Err(e.into());
        }

        self.set_session(Session::UploadPending);
        match self.encoder.encode_file(&file).await {
            Ok(image) => {
                self.emit(&image);
                self.set_session(Session::Previewing(image));
                Ok(CaptureMode::Previewing)
            }
            Err(e) => {
                tracing::warn!(session = %self.session_id, path = %file.path.display(), error = %e, "upload failed");
                self.return_to_idle();
                Err(e.into())
            }
        }
    }

    fn reset(&mut self) {
        self.return_to_idle();
    }

    fn switch_tab(&mut self, tab: CaptureTab) {
        if tab != self.tab && matches!(self.session, Session::Streaming(_)) {
            self.return_to_idle();
        }
        self.tab = tab;
    }

    fn emit(&mut self, image: &EncodedImage) {
        tracing::info!(
            session = %self.session_id,
            mime = image.mime_type(),
            len = image.body().len(),
            "payload ready"
        );
        if let Some(callback) = self.on_payload_ready.as_mut() {
            callback(image.body());
        }
    }

    /// Drop the stream or preview and start a fresh session.
    fn return_to_idle(&mut self) {
        self.release_stream();
        self.session_id = Uuid::new_v4();
        self.set_session(Session::Idle);
    }

    fn take_stream(&mut self) -> Option<D::Stream> {
        match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Streaming(stream) => Some(stream),
            other => {
                self.session = other;
                None
            }
        }
    }

    fn release_stream(&mut self) {
        if let Session::Streaming(stream) = &mut self.session {
            stream.close();
        }
    }

    fn set_session(&mut self, session: Session<D::Stream>) {
        let mode = session.mode();
        self.session = session;
        self.mode_tx.send_replace(mode);
    }
}

impl<D: MediaDevice> Drop for CaptureController<D> {
    fn drop(&mut self) {
        self.release_stream();
    }
}
