//! Capture quality gate.
//!
//! Every check is cheap and independent; all of them run on every call so a
//! caller can report the full set of problems at once. The gate fails closed:
//! a region it cannot judge (degenerate size, flat data) ends up rejected, it
//! never panics the caller.

use crate::types::{GrayFrame, QualityIssue, RgbFrame};

/// Minimum acceptable face edge in pixels.
const MIN_FACE_EDGE: u32 = 60;
/// Mean luma below this is too dark to encode reliably.
const MIN_BRIGHTNESS: f64 = 30.0;
/// Mean luma above this is blown out.
const MAX_BRIGHTNESS: f64 = 240.0;
/// Laplacian variance below this indicates motion blur or defocus.
const MIN_SHARPNESS: f64 = 30.0;

/// Thresholds for the quality gate. Deployment-wide policy, not per-request.
#[derive(Debug, Clone)]
pub struct QualityThresholds {
    pub min_face_edge: u32,
    pub min_brightness: f64,
    pub max_brightness: f64,
    pub min_sharpness: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_face_edge: MIN_FACE_EDGE,
            min_brightness: MIN_BRIGHTNESS,
            max_brightness: MAX_BRIGHTNESS,
            min_sharpness: MIN_SHARPNESS,
        }
    }
}

/// Assess a cropped face region. Empty result = pass.
pub fn assess(region: &RgbFrame, thresholds: &QualityThresholds) -> Vec<QualityIssue> {
    let mut issues = Vec::new();

    if region.width < thresholds.min_face_edge || region.height < thresholds.min_face_edge {
        issues.push(QualityIssue::TooSmall);
    }

    let gray = region.to_luma();

    let brightness = gray.mean();
    if brightness < thresholds.min_brightness {
        issues.push(QualityIssue::TooDark);
    } else if brightness > thresholds.max_brightness {
        issues.push(QualityIssue::TooBright);
    }

    if laplacian_variance(&gray) < thresholds.min_sharpness {
        issues.push(QualityIssue::TooBlurry);
    }

    if !issues.is_empty() {
        tracing::debug!(
            width = region.width,
            height = region.height,
            brightness,
            issues = ?issues.iter().map(|i| i.code()).collect::<Vec<_>>(),
            "quality gate rejected region"
        );
    }

    issues
}

/// Variance of the 3x3 Laplacian response over interior pixels.
///
/// The standard focus measure: low variance = few second-derivative
/// transitions = blur. Shared with the liveness heuristic, which uses the
/// opposite end of the scale.
pub fn laplacian_variance(gray: &GrayFrame) -> f64 {
    let (w, h) = (gray.width as usize, gray.height as usize);
    if w < 3 || h < 3 {
        return 0.0;
    }

    let px = |x: usize, y: usize| gray.data[y * w + x] as f64;

    let n = ((w - 2) * (h - 2)) as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let response =
                px(x, y - 1) + px(x - 1, y) + px(x + 1, y) + px(x, y + 1) - 4.0 * px(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let mean = sum / n;
    (sum_sq / n) - mean * mean
}

// Capture score blend weights. The score tags training samples and feeds the
// auto-train policy; it is not a gate.
const SCORE_BRIGHTNESS_WEIGHT: f64 = 0.4;
const SCORE_CONTRAST_WEIGHT: f64 = 0.3;
const SCORE_SHARPNESS_WEIGHT: f64 = 0.3;
/// Grayscale standard deviation treated as full contrast.
const CONTRAST_SATURATION: f64 = 64.0;
/// Laplacian variance treated as fully sharp.
const SHARPNESS_SATURATION: f64 = 300.0;

/// Score a face region's capture quality in [0, 1].
///
/// Blends brightness centering (peak at mid-gray), contrast saturation and
/// sharpness saturation.
pub fn capture_score(region: &RgbFrame) -> f64 {
    let gray = region.to_luma();

    let mean = gray.mean();
    let brightness = 1.0 - ((mean - 127.5).abs() / 127.5).min(1.0);

    let variance = gray
        .data
        .iter()
        .map(|&p| {
            let d = p as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / gray.data.len().max(1) as f64;
    let contrast = (variance.sqrt() / CONTRAST_SATURATION).min(1.0);

    let sharpness = (laplacian_variance(&gray) / SHARPNESS_SATURATION).min(1.0);

    SCORE_BRIGHTNESS_WEIGHT * brightness
        + SCORE_CONTRAST_WEIGHT * contrast
        + SCORE_SHARPNESS_WEIGHT * sharpness
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{textured_frame, uniform_frame};

    #[test]
    fn test_small_region_rejected() {
        let region = textured_frame(40, 40, 1);
        let issues = assess(&region, &QualityThresholds::default());
        assert!(issues.contains(&QualityIssue::TooSmall));
    }

    #[test]
    fn test_dark_region_rejected() {
        let region = uniform_frame(100, 100, 10);
        let issues = assess(&region, &QualityThresholds::default());
        assert!(issues.contains(&QualityIssue::TooDark));
    }

    #[test]
    fn test_bright_region_rejected() {
        let region = uniform_frame(100, 100, 250);
        let issues = assess(&region, &QualityThresholds::default());
        assert!(issues.contains(&QualityIssue::TooBright));
    }

    #[test]
    fn test_uniform_region_is_blurry() {
        // Zero second-derivative response everywhere
        let region = uniform_frame(100, 100, 128);
        let issues = assess(&region, &QualityThresholds::default());
        assert!(issues.contains(&QualityIssue::TooBlurry));
    }

    #[test]
    fn test_multiple_issues_reported_together() {
        // 40x40 and mean luma 10: both codes in one response
        let region = uniform_frame(40, 40, 10);
        let issues = assess(&region, &QualityThresholds::default());
        assert!(issues.contains(&QualityIssue::TooSmall));
        assert!(issues.contains(&QualityIssue::TooDark));
    }

    #[test]
    fn test_good_region_passes() {
        let region = textured_frame(100, 100, 7);
        let issues = assess(&region, &QualityThresholds::default());
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn test_laplacian_variance_uniform_is_zero() {
        let gray = uniform_frame(50, 50, 90).to_luma();
        assert!(laplacian_variance(&gray) < 1e-9);
    }

    #[test]
    fn test_laplacian_variance_checkerboard_is_high() {
        let mut data = Vec::with_capacity(50 * 50 * 3);
        for y in 0..50u32 {
            for x in 0..50u32 {
                let v = if (x + y) % 2 == 0 { 0u8 } else { 255u8 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let gray = crate::types::RgbFrame::new(data, 50, 50).unwrap().to_luma();
        assert!(laplacian_variance(&gray) > 10_000.0);
    }

    #[test]
    fn test_laplacian_variance_tiny_frame() {
        let gray = uniform_frame(2, 2, 100).to_luma();
        assert_eq!(laplacian_variance(&gray), 0.0);
    }

    #[test]
    fn test_capture_score_range() {
        let good = capture_score(&textured_frame(100, 100, 3));
        let flat = capture_score(&uniform_frame(100, 100, 5));
        assert!((0.0..=1.0).contains(&good));
        assert!((0.0..=1.0).contains(&flat));
        assert!(good > flat, "textured {good} should outscore dark flat {flat}");
    }
}
