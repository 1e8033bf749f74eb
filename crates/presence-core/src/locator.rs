//! Face location via a single-shot detector (res10 SSD) running on ONNX Runtime.
//!
//! The locator is a capability: constructed once at startup and injected into
//! the capture pipeline. Callers depend on the [`FaceLocator`] trait, so tests
//! and alternative backends never touch ONNX.

use crate::types::{FaceRegion, RgbFrame};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants for the res10 300x300 SSD model ---
const SSD_INPUT_SIZE: usize = 300;
/// Per-channel means subtracted during preprocessing, in the model's BGR
/// channel order.
const SSD_MEAN_BGR: [f32; 3] = [104.0, 177.0, 123.0];
const SSD_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// Values per detection row: [image_id, label, confidence, x1, y1, x2, y2].
const SSD_ROW_LEN: usize = 7;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("model file not found: {0} — place the face detection model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Finds zero or more face regions in a frame.
///
/// Implementations must return regions sorted by descending confidence.
pub trait FaceLocator {
    fn locate(&mut self, frame: &RgbFrame) -> Result<Vec<FaceRegion>, LocatorError>;
}

/// res10 SSD face locator.
pub struct SsdFaceLocator {
    session: Session,
}

impl SsdFaceLocator {
    /// Load the SSD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, LocatorError> {
        if !Path::new(model_path).exists() {
            return Err(LocatorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded SSD face model"
        );

        Ok(Self { session })
    }

    /// Preprocess a frame into the model's NCHW BGR tensor.
    ///
    /// Bilinear resize to 300x300, then per-channel mean subtraction. The
    /// model was trained on BGR input, so the channel order is swapped here.
    fn preprocess(frame: &RgbFrame) -> Array4<f32> {
        let resized = frame.resize_bilinear(SSD_INPUT_SIZE as u32, SSD_INPUT_SIZE as u32);
        let mut tensor = Array4::<f32>::zeros((1, 3, SSD_INPUT_SIZE, SSD_INPUT_SIZE));

        for y in 0..SSD_INPUT_SIZE {
            for x in 0..SSD_INPUT_SIZE {
                let (r, g, b) = resized.pixel(x as u32, y as u32);
                tensor[[0, 0, y, x]] = b as f32 - SSD_MEAN_BGR[0];
                tensor[[0, 1, y, x]] = g as f32 - SSD_MEAN_BGR[1];
                tensor[[0, 2, y, x]] = r as f32 - SSD_MEAN_BGR[2];
            }
        }

        tensor
    }
}

impl FaceLocator for SsdFaceLocator {
    /// Detect faces, returning regions sorted by confidence.
    fn locate(&mut self, frame: &RgbFrame) -> Result<Vec<FaceRegion>, LocatorError> {
        let input = Self::preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, detections) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LocatorError::InferenceFailed(format!("detections: {e}")))?;

        Ok(decode_detections(
            detections,
            frame.width,
            frame.height,
            SSD_CONFIDENCE_THRESHOLD,
        ))
    }
}

/// Decode the SSD output tensor into frame-space regions.
///
/// Rows of 7: [image_id, label, confidence, x1, y1, x2, y2] with box
/// coordinates normalized to [0, 1]. Boxes are scaled to the frame, clamped
/// to its bounds, and degenerate boxes dropped.
fn decode_detections(
    data: &[f32],
    frame_w: u32,
    frame_h: u32,
    threshold: f32,
) -> Vec<FaceRegion> {
    let (w, h) = (frame_w as f32, frame_h as f32);
    let mut regions = Vec::new();

    for row in data.chunks_exact(SSD_ROW_LEN) {
        let confidence = row[2];
        if !confidence.is_finite() || confidence <= threshold {
            continue;
        }

        let x1 = (row[3] * w).clamp(0.0, w);
        let y1 = (row[4] * h).clamp(0.0, h);
        let x2 = (row[5] * w).clamp(0.0, w);
        let y2 = (row[6] * h).clamp(0.0, h);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        regions.push(FaceRegion {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }

    regions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(conf: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> [f32; 7] {
        [0.0, 1.0, conf, x1, y1, x2, y2]
    }

    #[test]
    fn test_decode_scales_to_frame() {
        let data = row(0.9, 0.25, 0.25, 0.75, 0.75);
        let regions = decode_detections(&data, 400, 200, 0.5);
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert!((r.x - 100.0).abs() < 1e-4);
        assert!((r.y - 50.0).abs() < 1e-4);
        assert!((r.width - 200.0).abs() < 1e-4);
        assert!((r.height - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_filters_low_confidence() {
        let mut data = Vec::new();
        data.extend_from_slice(&row(0.3, 0.1, 0.1, 0.5, 0.5));
        data.extend_from_slice(&row(0.8, 0.2, 0.2, 0.6, 0.6));
        let regions = decode_detections(&data, 100, 100, 0.5);
        assert_eq!(regions.len(), 1);
        assert!((regions[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_decode_sorts_by_confidence() {
        let mut data = Vec::new();
        data.extend_from_slice(&row(0.6, 0.1, 0.1, 0.3, 0.3));
        data.extend_from_slice(&row(0.95, 0.5, 0.5, 0.8, 0.8));
        let regions = decode_detections(&data, 100, 100, 0.5);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].confidence > regions[1].confidence);
    }

    #[test]
    fn test_decode_clamps_out_of_range_boxes() {
        let data = row(0.9, -0.2, -0.1, 1.3, 1.1);
        let regions = decode_detections(&data, 100, 100, 0.5);
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert!(r.x >= 0.0 && r.y >= 0.0);
        assert!(r.x + r.width <= 100.0);
        assert!(r.y + r.height <= 100.0);
    }

    #[test]
    fn test_decode_drops_degenerate_boxes() {
        let data = row(0.9, 0.5, 0.5, 0.5, 0.5);
        let regions = decode_detections(&data, 100, 100, 0.5);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_decode_drops_nan_confidence() {
        let data = row(f32::NAN, 0.1, 0.1, 0.5, 0.5);
        let regions = decode_detections(&data, 100, 100, 0.5);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_decode_empty_tensor() {
        let regions = decode_detections(&[], 100, 100, 0.5);
        assert!(regions.is_empty());
    }
}
