//! Frame type and pixel conversion: YUYV, GREY and MJPG to packed RGB8.

/// A captured colour camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB8 pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Build a frame from packed RGB8 data, checking the buffer length.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = rgb_len(width, height);
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        })
    }

    /// Native resolution as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert packed YUYV (4:2:2) to RGB8 using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share chroma.
/// Rows of odd width are padded to a whole pair; the padding pixel is dropped.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let width = width as usize;
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }
    let stride = (width + 1) / 2 * 4;
    let expected = stride * height as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(width * height as usize * 3);
    for row in yuyv[..expected].chunks_exact(stride) {
        let mut remaining = width;
        for chunk in row.chunks_exact(4) {
            let d = chunk[1] as i32 - 128;
            let e = chunk[3] as i32 - 128;
            for y in [chunk[0], chunk[2]].into_iter().take(remaining.min(2)) {
                let c = y as i32 - 16;
                rgb.push(clamp_u8((298 * c + 409 * e + 128) >> 8));
                rgb.push(clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8));
                rgb.push(clamp_u8((298 * c + 516 * d + 128) >> 8));
            }
            remaining = remaining.saturating_sub(2);
        }
    }
    Ok(rgb)
}

/// Expand 8-bit grayscale (common IR camera output) to RGB8.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    if grey.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: grey.len(),
        });
    }
    Ok(grey[..pixels].iter().flat_map(|&p| [p, p, p]).collect())
}

/// Decode a motion-JPEG buffer to RGB8.
///
/// Returns the decoded dimensions alongside the pixels since some drivers
/// deliver frames that differ from the negotiated size.
pub fn mjpeg_to_rgb(buf: &[u8]) -> Result<(Vec<u8>, u32, u32), FrameError> {
    let img = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?
        .to_rgb8();
    let (w, h) = img.dimensions();
    Ok((img.into_raw(), w, h))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(String),
}
