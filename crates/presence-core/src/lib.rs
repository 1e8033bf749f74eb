//! presence-core — face signature engine and attendance lifecycle.
//!
//! Turns a decoded frame into a fixed-length numeric signature (quality
//! gating, replay heuristics, multi-feature encoding), scores signatures
//! against an enrolled pool, and drives the per-day check-in/check-out state
//! machine. Pure computation over in-memory data; the face locator is the
//! only capability, injected at construction.

pub mod attendance;
pub mod capture;
pub mod features;
pub mod liveness;
pub mod locator;
pub mod matcher;
pub mod quality;
pub mod types;

#[cfg(test)]
mod testutil;

pub use capture::{analyze, Capture, CapturePolicy};
pub use locator::{FaceLocator, LocatorError, SsdFaceLocator};
pub use matcher::{identify, score, score_multi, Enrollment, IdentifyOutcome, MatchWeights};
pub use types::{CaptureError, FaceRegion, QualityIssue, RgbFrame, Signature, SIGNATURE_LEN};

use std::path::PathBuf;

/// System-wide default directory for the face detection model.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/presence/models")
}
