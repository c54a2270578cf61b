//! Image payload encoding: camera frames to JPEG, uploads verbatim, both
//! as bare base64 bodies.

use crate::types::{EncodedImage, JPEG_MIME};
use facescan_hw::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// JPEG quality factor for camera frames (0.8).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Upload ceiling matching the advertised "up to 10MB".
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid file type: {0} (expected an image)")]
    InvalidFileType(String),
    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("failed to read file: {0}")]
    Read(#[from] std::io::Error),
    #[error("raster surface unavailable: {0}")]
    Raster(String),
    #[error("JPEG serialization failed: {0}")]
    Serialize(String),
    #[error("encoder produced no data")]
    Empty,
}

impl EncodeError {
    /// Rejected by validation before any file content was read.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidFileType(_) | Self::FileTooLarge { .. })
    }
}

/// Strip a leading `data:<mime>;base64,` prefix. Other input is returned as is.
pub fn strip_data_uri_prefix(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("data:") else {
        return s;
    };
    match rest.find(';') {
        Some(semi) if semi > 0 => rest[semi..].strip_prefix(";base64,").unwrap_or(s),
        _ => s,
    }
}

/// Guess an image media type from a file extension.
pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "txt" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

/// A user-selected file with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub media_type: Option<String>,
}

impl SelectedFile {
    /// Declare the media type from the file extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let media_type = media_type_for_path(&path).map(str::to_string);
        Self { path, media_type }
    }

    pub fn with_media_type(path: impl Into<PathBuf>, media_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            media_type: Some(media_type.into()),
        }
    }

    pub fn is_image(&self) -> bool {
        self.media_type
            .as_deref()
            .is_some_and(|t| t.starts_with("image/"))
    }
}

/// Converts frames and files into [`EncodedImage`] payloads.
#[derive(Debug, Clone)]
pub struct ImageEncoder {
    quality: u8,
    /// `0` disables the ceiling.
    max_upload_bytes: u64,
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Serialize a frame at its native resolution as JPEG.
    pub fn encode_frame(&self, frame: &Frame) -> Result<EncodedImage, EncodeError> {
        let (width, height) = frame.dimensions();
        if frame.is_empty() {
            return Err(EncodeError::Raster(format!(
                "frame has no pixels ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * 3;
        if frame.data.len() != expected {
            return Err(EncodeError::Raster(format!(
                "frame buffer is {} bytes, expected {expected}",
                frame.data.len()
            )));
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode(&frame.data, width, height, ExtendedColorType::Rgb8)
            .map_err(|e| EncodeError::Serialize(e.to_string()))?;
        if jpeg.is_empty() {
            return Err(EncodeError::Empty);
        }

        tracing::debug!(width, height, bytes = jpeg.len(), "encoded frame");
        Ok(EncodedImage::from_bytes(JPEG_MIME, &jpeg))
    }

    /// Validate a file without reading its content: media type first, then
    /// size from metadata. Returns the file size.
    pub async fn inspect_file(&self, file: &SelectedFile) -> Result<u64, EncodeError> {
        if !file.is_image() {
            let declared = file.media_type.as_deref().unwrap_or("unknown").to_string();
            return Err(EncodeError::InvalidFileType(declared));
        }

        let size = tokio::fs::metadata(&file.path).await?.len();
        if self.max_upload_bytes > 0 && size > self.max_upload_bytes {
            return Err(EncodeError::FileTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        Ok(size)
    }

    /// Read a file fully and base64-encode its bytes unchanged.
    pub async fn encode_file(&self, file: &SelectedFile) -> Result<EncodedImage, EncodeError> {
        self.inspect_file(file).await?;

        let bytes = tokio::fs::read(&file.path).await?;
        if bytes.is_empty() {
            return Err(EncodeError::Empty);
        }

        let mime = file.media_type.as_deref().unwrap_or(JPEG_MIME);
        tracing::debug!(path = %file.path.display(), mime, bytes = bytes.len(), "encoded file");
        Ok(EncodedImage::from_bytes(mime, &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::io::Write;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let data = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        Frame::from_rgb(data, width, height).unwrap()
    }

    fn temp_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_strip_data_uri_prefix() {
        assert_eq!(strip_data_uri_prefix("data:image/jpeg;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_uri_prefix("data:image/png;base64,"), "");
        assert_eq!(strip_data_uri_prefix("AAAA"), "AAAA");
        assert_eq!(strip_data_uri_prefix("data:;base64,AAAA"), "data:;base64,AAAA");
        assert_eq!(
            strip_data_uri_prefix("data:image/png;charset=x;base64,AA"),
            "data:image/png;charset=x;base64,AA"
        );
    }

    #[test]
    fn test_encode_frame_produces_jpeg() {
        let encoder = ImageEncoder::default();
        let img = encoder.encode_frame(&gradient_frame(16, 8)).unwrap();
        assert_eq!(img.mime_type(), "image/jpeg");
        assert!(!img.body().starts_with("data:"));
        let bytes = STANDARD.decode(img.body()).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_frame_deterministic() {
        let encoder = ImageEncoder::default();
        let frame = gradient_frame(8, 8);
        let a = encoder.encode_frame(&frame).unwrap();
        let b = encoder.encode_frame(&frame).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_frame_rejects_short_buffer() {
        let mut frame = gradient_frame(4, 4);
        frame.data.truncate(10);
        let result = ImageEncoder::default().encode_frame(&frame);
        assert!(matches!(result, Err(EncodeError::Raster(_))));
    }

    #[test]
    fn test_encode_frame_rejects_empty_frame() {
        let frame = Frame::from_rgb(Vec::new(), 0, 0).unwrap();
        let result = ImageEncoder::default().encode_frame(&frame);
        assert!(matches!(result, Err(EncodeError::Raster(_))));
    }

    #[tokio::test]
    async fn test_encode_file_keeps_bytes() {
        let bytes = b"\x89PNG\r\n\x1a\nnot-really-a-png";
        let file = temp_file(bytes);
        let selected = SelectedFile::with_media_type(file.path(), "image/png");
        let img = ImageEncoder::default().encode_file(&selected).await.unwrap();
        assert_eq!(img.mime_type(), "image/png");
        assert_eq!(img.body(), STANDARD.encode(bytes));
    }

    #[tokio::test]
    async fn test_encode_file_rejects_text_before_read() {
        // The path does not exist: a read attempt would surface as Read.
        let selected = SelectedFile::with_media_type("/nonexistent/notes.txt", "text/plain");
        let result = ImageEncoder::default().encode_file(&selected).await;
        match result {
            Err(EncodeError::InvalidFileType(t)) => assert_eq!(t, "text/plain"),
            other => panic!("expected InvalidFileType, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_encode_file_without_media_type() {
        let selected = SelectedFile {
            path: "/nonexistent/blob".into(),
            media_type: None,
        };
        let result = ImageEncoder::default().encode_file(&selected).await;
        assert!(matches!(result, Err(EncodeError::InvalidFileType(_))));
    }

    #[tokio::test]
    async fn test_encode_file_too_large() {
        let file = temp_file(&[0u8; 64]);
        let selected = SelectedFile::with_media_type(file.path(), "image/jpeg");
        let encoder = ImageEncoder::default().with_max_upload_bytes(32);
        let err = encoder.encode_file(&selected).await.unwrap_err();
        assert!(matches!(err, EncodeError::FileTooLarge { size: 64, limit: 32 }));
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn test_encode_file_limit_disabled() {
        let file = temp_file(&[1u8; 64]);
        let selected = SelectedFile::with_media_type(file.path(), "image/jpeg");
        let encoder = ImageEncoder::default().with_max_upload_bytes(0);
        assert!(encoder.encode_file(&selected).await.is_ok());
    }

    #[tokio::test]
    async fn test_encode_file_empty() {
        let file = temp_file(&[]);
        let selected = SelectedFile::with_media_type(file.path(), "image/jpeg");
        let result = ImageEncoder::default().encode_file(&selected).await;
        assert!(matches!(result, Err(EncodeError::Empty)));
    }

    #[test]
    fn test_media_type_for_path() {
        assert_eq!(media_type_for_path(Path::new("a/face.JPG")), Some("image/jpeg"));
        assert_eq!(media_type_for_path(Path::new("face.png")), Some("image/png"));
        assert_eq!(media_type_for_path(Path::new("notes.txt")), Some("text/plain"));
        assert_eq!(media_type_for_path(Path::new("noext")), None);
        assert!(SelectedFile::new("face.webp").is_image());
        assert!(!SelectedFile::new("notes.txt").is_image());
    }
}
