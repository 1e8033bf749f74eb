//! Replay heuristics — is the frame a live capture or a photographed image?
//!
//! Two statistical checks, both of which must pass. This is a usability
//! filter, not an anti-spoofing guarantee: the thresholds were chosen
//! empirically against casual replay (a phone held up to the camera) and have
//! not been validated against a determined adversary. Treat as placeholder
//! policy in any security review.
//!
//! # Threat coverage
//!
//! - Screens out: photos of screens (unnaturally crisp pixel grids), heavily
//!   processed or compressed reproductions with collapsed color variance.
//! - Does not screen out: high-quality prints, video replay, masks.

use crate::quality::laplacian_variance;
use crate::types::{FaceRegion, RgbFrame};

/// Laplacian variance above this is sharper than live optics produce.
const SHARPNESS_CEILING: f64 = 3000.0;
/// Mean per-channel standard deviation below this is unnaturally flat.
const COLOR_STDDEV_FLOOR: f64 = 3.0;

/// Liveness thresholds. Deployment-wide policy, not per-request.
#[derive(Debug, Clone)]
pub struct LivenessThresholds {
    pub sharpness_ceiling: f64,
    pub color_stddev_floor: f64,
}

impl Default for LivenessThresholds {
    fn default() -> Self {
        Self {
            sharpness_ceiling: SHARPNESS_CEILING,
            color_stddev_floor: COLOR_STDDEV_FLOOR,
        }
    }
}

/// Why a frame was judged non-live.
#[derive(Debug, Clone, PartialEq)]
pub enum LivenessRejection {
    /// Sharpness above the ceiling — screen-photograph suspicion.
    OverSharp { variance: f64 },
    /// Per-channel color spread below the floor.
    FlatColor { mean_stddev: f64 },
}

impl LivenessRejection {
    /// User-facing reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            LivenessRejection::OverSharp { .. } => {
                "Image quality suspicious. Please use direct camera capture"
            }
            LivenessRejection::FlatColor { .. } => "Color distribution suspicious",
        }
    }
}

impl std::fmt::Display for LivenessRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// Check the face region of `frame` for replay indicators.
pub fn check(
    frame: &RgbFrame,
    region: &FaceRegion,
    thresholds: &LivenessThresholds,
) -> Result<(), LivenessRejection> {
    let crop = frame.crop(region);

    let variance = laplacian_variance(&crop.to_luma());
    if variance > thresholds.sharpness_ceiling {
        tracing::debug!(variance, "liveness: over-sharp region");
        return Err(LivenessRejection::OverSharp { variance });
    }

    let mean_stddev = mean_channel_stddev(&crop);
    if mean_stddev < thresholds.color_stddev_floor {
        tracing::debug!(mean_stddev, "liveness: flat color distribution");
        return Err(LivenessRejection::FlatColor { mean_stddev });
    }

    Ok(())
}

/// Standard deviation of each RGB channel, averaged across channels.
fn mean_channel_stddev(frame: &RgbFrame) -> f64 {
    let n = (frame.width as usize * frame.height as usize) as f64;
    if n == 0.0 {
        return 0.0;
    }

    let mut total = 0.0;
    for c in 0..3 {
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for px in frame.data.chunks_exact(3) {
            let v = px[c] as f64;
            sum += v;
            sum_sq += v * v;
        }
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        total += variance.sqrt();
    }
    total / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{textured_frame, uniform_frame};

    fn full_region(frame: &RgbFrame) -> FaceRegion {
        FaceRegion {
            x: 0.0,
            y: 0.0,
            width: frame.width as f32,
            height: frame.height as f32,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_natural_texture_passes() {
        let frame = textured_frame(100, 100, 11);
        let region = full_region(&frame);
        assert!(check(&frame, &region, &LivenessThresholds::default()).is_ok());
    }

    #[test]
    fn test_flat_color_rejected() {
        let frame = uniform_frame(100, 100, 128);
        let region = full_region(&frame);
        let rejection = check(&frame, &region, &LivenessThresholds::default()).unwrap_err();
        assert!(matches!(rejection, LivenessRejection::FlatColor { .. }));
    }

    #[test]
    fn test_over_sharp_rejected() {
        // Per-pixel checkerboard: laplacian variance far beyond live optics
        let mut data = Vec::with_capacity(100 * 100 * 3);
        for y in 0..100u32 {
            for x in 0..100u32 {
                let v = if (x + y) % 2 == 0 { 0u8 } else { 255u8 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let frame = RgbFrame::new(data, 100, 100).unwrap();
        let region = full_region(&frame);
        let rejection = check(&frame, &region, &LivenessThresholds::default()).unwrap_err();
        assert!(matches!(rejection, LivenessRejection::OverSharp { .. }));
    }

    #[test]
    fn test_check_scopes_to_region() {
        // Frame is flat outside the region; the textured region itself passes
        let mut frame = uniform_frame(200, 200, 128);
        let patch = textured_frame(80, 80, 5);
        for y in 0..80usize {
            for x in 0..80usize {
                let src = (y * 80 + x) * 3;
                let dst = ((y + 10) * 200 + (x + 10)) * 3;
                frame.data[dst..dst + 3].copy_from_slice(&patch.data[src..src + 3]);
            }
        }
        let region = FaceRegion {
            x: 10.0,
            y: 10.0,
            width: 80.0,
            height: 80.0,
            confidence: 1.0,
        };
        assert!(check(&frame, &region, &LivenessThresholds::default()).is_ok());
    }

    #[test]
    fn test_rejection_reasons_are_user_facing() {
        assert!(LivenessRejection::OverSharp { variance: 5000.0 }
            .reason()
            .contains("direct camera capture"));
        assert!(LivenessRejection::FlatColor { mean_stddev: 0.5 }
            .reason()
            .contains("Color distribution"));
    }
}
