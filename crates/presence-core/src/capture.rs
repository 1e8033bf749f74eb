//! Frame-to-signature pipeline.
//!
//! Locate -> single-face gate -> quality gate -> liveness -> encode.
//! Rejections are input errors carrying the specific reason; the pipeline
//! never panics on malformed or hostile input.

use crate::liveness::{self, LivenessThresholds};
use crate::locator::FaceLocator;
use crate::quality::{self, QualityThresholds};
use crate::types::{CaptureError, FaceRegion, RgbFrame, Signature};
use crate::features;

/// Deployment-wide capture policy: the gate thresholds as one unit.
#[derive(Debug, Clone, Default)]
pub struct CapturePolicy {
    pub quality: QualityThresholds,
    pub liveness: LivenessThresholds,
}

/// A frame successfully reduced to a signature.
#[derive(Debug, Clone)]
pub struct Capture {
    pub signature: Signature,
    pub region: FaceRegion,
    /// Capture quality score in [0, 1]; recorded on training samples.
    pub quality: f64,
}

/// Run the full capture pipeline on one frame.
///
/// Exactly one face must be present: zero faces and several faces are both
/// rejections (the attendance kiosk needs an unambiguous subject).
pub fn analyze(
    locator: &mut dyn FaceLocator,
    frame: &RgbFrame,
    policy: &CapturePolicy,
) -> Result<Capture, CaptureError> {
    let mut regions = locator.locate(frame)?;

    let region = match regions.len() {
        0 => return Err(CaptureError::NoFace),
        1 => regions.remove(0),
        n => {
            tracing::debug!(faces = n, "rejecting frame with multiple faces");
            return Err(CaptureError::MultipleFaces);
        }
    };

    let crop = frame.crop(&region);

    let issues = quality::assess(&crop, &policy.quality);
    if !issues.is_empty() {
        return Err(CaptureError::QualityRejected(issues));
    }

    liveness::check(frame, &region, &policy.liveness)
        .map_err(|r| CaptureError::NotLive(r.reason().to_string()))?;

    let signature = features::encode(&crop);
    let quality = quality::capture_score(&crop);

    Ok(Capture {
        signature,
        region,
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::LocatorError;
    use crate::matcher::{self, Enrollment, MatchWeights};
    use crate::testutil::{brightness_shifted, textured_frame, uniform_frame};
    use crate::types::QualityIssue;

    /// Locator stub returning a fixed set of regions.
    struct StubLocator(Vec<FaceRegion>);

    impl FaceLocator for StubLocator {
        fn locate(&mut self, _frame: &RgbFrame) -> Result<Vec<FaceRegion>, LocatorError> {
            Ok(self.0.clone())
        }
    }

    fn region(x: f32, y: f32, w: f32, h: f32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_no_face_rejected() {
        let mut locator = StubLocator(vec![]);
        let frame = textured_frame(160, 160, 1);
        let err = analyze(&mut locator, &frame, &CapturePolicy::default()).unwrap_err();
        assert!(matches!(err, CaptureError::NoFace));
    }

    #[test]
    fn test_multiple_faces_rejected() {
        let mut locator = StubLocator(vec![
            region(0.0, 0.0, 70.0, 70.0),
            region(80.0, 80.0, 70.0, 70.0),
        ]);
        let frame = textured_frame(160, 160, 1);
        let err = analyze(&mut locator, &frame, &CapturePolicy::default()).unwrap_err();
        assert!(matches!(err, CaptureError::MultipleFaces));
    }

    #[test]
    fn test_small_face_quality_rejected() {
        let mut locator = StubLocator(vec![region(10.0, 10.0, 40.0, 40.0)]);
        let frame = textured_frame(160, 160, 1);
        let err = analyze(&mut locator, &frame, &CapturePolicy::default()).unwrap_err();
        match err {
            CaptureError::QualityRejected(issues) => {
                assert!(issues.contains(&QualityIssue::TooSmall));
            }
            other => panic!("expected quality rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_over_sharp_face_fails_liveness() {
        // Checkerboard passes the quality gate (sharp, mid brightness, big)
        // but its second-derivative response is beyond live optics
        let mut data = Vec::with_capacity(160 * 160 * 3);
        for y in 0..160u32 {
            for x in 0..160u32 {
                let v = if (x + y) % 2 == 0 { 0u8 } else { 255u8 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let frame = RgbFrame::new(data, 160, 160).unwrap();
        let mut locator = StubLocator(vec![region(10.0, 10.0, 100.0, 100.0)]);
        let err = analyze(&mut locator, &frame, &CapturePolicy::default()).unwrap_err();
        assert!(matches!(err, CaptureError::NotLive(_)));
    }

    #[test]
    fn test_good_frame_produces_capture() {
        let mut locator = StubLocator(vec![region(20.0, 20.0, 100.0, 100.0)]);
        let frame = textured_frame(160, 160, 7);
        let capture = analyze(&mut locator, &frame, &CapturePolicy::default()).unwrap();
        assert!((0.0..=1.0).contains(&capture.quality));
        assert!((capture.region.width - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_analyze_is_deterministic() {
        let frame = textured_frame(160, 160, 7);
        let mut locator = StubLocator(vec![region(20.0, 20.0, 100.0, 100.0)]);
        let a = analyze(&mut locator, &frame, &CapturePolicy::default()).unwrap();
        let b = analyze(&mut locator, &frame, &CapturePolicy::default()).unwrap();
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn test_enroll_then_verify_near_duplicate() {
        // Enrollment capture, then a verification capture of the same
        // subject with slightly different exposure: must match at the
        // default tolerance
        let policy = CapturePolicy::default();
        let enrolled_frame = textured_frame(160, 160, 42);
        let probe_frame = brightness_shifted(&enrolled_frame, 10);

        let mut locator = StubLocator(vec![region(20.0, 20.0, 100.0, 100.0)]);
        let enrolled = analyze(&mut locator, &enrolled_frame, &policy).unwrap();
        let probe = analyze(&mut locator, &probe_frame, &policy).unwrap();

        let pool = vec![Enrollment {
            identity_id: 1,
            external_ref: "user-1".into(),
            display_name: "A".into(),
            signatures: vec![enrolled.signature],
        }];

        let outcome = matcher::identify(&pool, &probe.signature, 0.5, &MatchWeights::default());
        assert!(outcome.matched, "near-duplicate confidence {}", outcome.confidence);
        assert_eq!(outcome.identity_id, Some(1));
    }

    #[test]
    fn test_flat_region_rejected_before_encoding() {
        // Uniform input fails the gate (blur) before liveness or encoding
        let mut locator = StubLocator(vec![region(20.0, 20.0, 100.0, 100.0)]);
        let frame = uniform_frame(160, 160, 128);
        let err = analyze(&mut locator, &frame, &CapturePolicy::default()).unwrap_err();
        assert!(matches!(err, CaptureError::QualityRejected(_)));
    }
}
