use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed length of a face signature vector.
///
/// Layout, in order: luma histogram (32) + two chroma histograms (32 + 32) +
/// gradient-orientation histogram (128) + texture histogram (32) + edge
/// histogram (16). Changing any block length or the order invalidates every
/// stored signature — that is a schema migration, not a code change.
pub const SIGNATURE_LEN: usize = COLOR_BINS * 3 + GRADIENT_BINS + TEXTURE_BINS + EDGE_BINS;

/// Bins per color-channel histogram (L, a, b each).
pub const COLOR_BINS: usize = 32;
/// Length of the gradient-orientation block.
pub const GRADIENT_BINS: usize = 128;
/// Bins in the local-binary-pattern histogram.
pub const TEXTURE_BINS: usize = 32;
/// Bins in the edge-map histogram.
pub const EDGE_BINS: usize = 16;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame buffer length {actual} does not match {width}x{height} RGB ({expected})")]
    InvalidLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame dimensions are zero")]
    ZeroDimensions,
}

/// An owned, interleaved RGB8 frame.
#[derive(Clone)]
pub struct RgbFrame {
    /// Interleaved RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RgbFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimensions);
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// RGB triple at (x, y). Caller must stay in bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        (self.data[i], self.data[i + 1], self.data[i + 2])
    }

    /// Convert to a grayscale frame using BT.601 luma weights.
    pub fn to_luma(&self) -> GrayFrame {
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize);
        for px in self.data.chunks_exact(3) {
            let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
            data.push(y.round().clamp(0.0, 255.0) as u8);
        }
        GrayFrame {
            data,
            width: self.width,
            height: self.height,
        }
    }

    /// Resize to `new_w` x `new_h` with bilinear interpolation.
    ///
    /// Sub-pixel sampling uses pixel-center alignment, so upscaling a uniform
    /// frame stays uniform and downscaling does not shift content.
    pub fn resize_bilinear(&self, new_w: u32, new_h: u32) -> RgbFrame {
        let (src_w, src_h) = (self.width as usize, self.height as usize);
        let (dst_w, dst_h) = (new_w as usize, new_h as usize);
        let scale_x = src_w as f32 / dst_w as f32;
        let scale_y = src_h as f32 / dst_h as f32;

        let mut data = vec![0u8; dst_w * dst_h * 3];
        for y in 0..dst_h {
            let src_y = (y as f32 + 0.5) * scale_y - 0.5;
            let y0 = (src_y.floor() as i32).clamp(0, src_h as i32 - 1) as usize;
            let y1 = (y0 + 1).min(src_h - 1);
            let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

            for x in 0..dst_w {
                let src_x = (x as f32 + 0.5) * scale_x - 0.5;
                let x0 = (src_x.floor() as i32).clamp(0, src_w as i32 - 1) as usize;
                let x1 = (x0 + 1).min(src_w - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                for c in 0..3 {
                    let tl = self.data[(y0 * src_w + x0) * 3 + c] as f32;
                    let tr = self.data[(y0 * src_w + x1) * 3 + c] as f32;
                    let bl = self.data[(y1 * src_w + x0) * 3 + c] as f32;
                    let br = self.data[(y1 * src_w + x1) * 3 + c] as f32;

                    let val = tl * (1.0 - fx) * (1.0 - fy)
                        + tr * fx * (1.0 - fy)
                        + bl * (1.0 - fx) * fy
                        + br * fx * fy;

                    data[(y * dst_w + x) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        RgbFrame {
            data,
            width: new_w,
            height: new_h,
        }
    }

    /// Extract the sub-frame covered by `region`, clamped to frame bounds.
    pub fn crop(&self, region: &FaceRegion) -> RgbFrame {
        let (x0, y0, x1, y1) = region.clamped_rect(self.width, self.height);
        let w = x1 - x0;
        let h = y1 - y0;
        let mut data = Vec::with_capacity(w as usize * h as usize * 3);
        for y in y0..y1 {
            let row = (y as usize * self.width as usize + x0 as usize) * 3;
            data.extend_from_slice(&self.data[row..row + w as usize * 3]);
        }
        RgbFrame {
            data,
            width: w,
            height: h,
        }
    }
}

/// A grayscale frame (one byte per pixel).
#[derive(Clone)]
pub struct GrayFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl GrayFrame {
    /// Mean pixel value (0.0–255.0).
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&p| p as f64).sum::<f64>() / self.data.len() as f64
    }
}

/// Bounding box for a detected face region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceRegion {
    /// Integer pixel rect (x0, y0, x1, y1) clamped to the given frame size.
    /// Always at least 1x1 so a crop is never empty.
    pub fn clamped_rect(&self, frame_w: u32, frame_h: u32) -> (u32, u32, u32, u32) {
        let x0 = self.x.max(0.0) as u32;
        let y0 = self.y.max(0.0) as u32;
        let x0 = x0.min(frame_w - 1);
        let y0 = y0.min(frame_h - 1);
        let x1 = ((self.x + self.width).ceil() as u32).clamp(x0 + 1, frame_w);
        let y1 = ((self.y + self.height).ceil() as u32).clamp(y0 + 1, frame_h);
        (x0, y0, x1, y1)
    }
}

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("signature has {actual} components, expected {SIGNATURE_LEN}")]
    WrongLength { actual: usize },
    #[error("signature blob is {0} bytes, not a multiple of 4")]
    MisalignedBlob(usize),
}

/// A fixed-length face signature vector.
///
/// Immutable once created. The byte serialization (little-endian f32s) is the
/// storage format; see [`SIGNATURE_LEN`] for the stability contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature(Vec<f32>);

impl Signature {
    pub fn new(values: Vec<f32>) -> Result<Self, SignatureError> {
        if values.len() != SIGNATURE_LEN {
            return Err(SignatureError::WrongLength {
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Byte-stable serialization: each component as little-endian f32.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for v in &self.0 {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() % 4 != 0 {
            return Err(SignatureError::MisalignedBlob(bytes.len()));
        }
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::new(values)
    }
}

/// A single failed capture-quality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityIssue {
    TooSmall,
    TooDark,
    TooBright,
    TooBlurry,
}

impl QualityIssue {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            QualityIssue::TooSmall => "TOO_SMALL",
            QualityIssue::TooDark => "TOO_DARK",
            QualityIssue::TooBright => "TOO_BRIGHT",
            QualityIssue::TooBlurry => "TOO_BLURRY",
        }
    }

    /// User-facing hint for fixing the capture.
    pub fn hint(&self) -> &'static str {
        match self {
            QualityIssue::TooSmall => "Face too small. Please move closer to the camera",
            QualityIssue::TooDark => "Image too dark. Please improve lighting",
            QualityIssue::TooBright => "Image too bright. Please reduce lighting",
            QualityIssue::TooBlurry => "Image is blurry. Please hold the camera steady",
        }
    }
}

impl std::fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Why a frame could not be turned into a signature.
///
/// Every variant is a request-level input error: report it to the caller,
/// never retry automatically, never treat it as a fault.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("no face detected")]
    NoFace,
    #[error("multiple faces detected; ensure only one person is in frame")]
    MultipleFaces,
    #[error("face quality rejected: {}", format_issues(.0))]
    QualityRejected(Vec<QualityIssue>),
    #[error("liveness check failed: {0}")]
    NotLive(String),
    #[error("locator: {0}")]
    Locator(#[from] crate::locator::LocatorError),
}

fn format_issues(issues: &[QualityIssue]) -> String {
    issues
        .iter()
        .map(|i| i.code())
        .collect::<Vec<_>>()
        .join(", ")
}
