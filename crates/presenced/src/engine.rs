//! The verification engine thread.
//!
//! One dedicated OS thread owns the face locator and the store; D-Bus
//! handlers talk to it through an mpsc request channel with oneshot replies.
//! Each request is an independent synchronous unit of work — a request either
//! completes whole or fails without partial writes.

use chrono::{DateTime, Utc};
use presence_core::attendance::{AttendanceAction, CheckEvent, TransitionError};
use presence_core::{
    analyze, identify, Capture, CaptureError, CapturePolicy, FaceLocator, MatchWeights, RgbFrame,
    SsdFaceLocator,
};
use presence_store::{IdentitySummary, SignatureCipher, Store, StoreError};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

/// Training-sample accumulation stops at this count.
const MAX_TRAINING_SAMPLES: usize = 20;
/// Auto-train only above this match confidence.
const AUTO_TRAIN_MIN_CONFIDENCE: f64 = 0.70;
/// Auto-train only at or above this capture quality. Deliberately stricter
/// than the confidence gate alone: repeated borderline captures must not
/// drift an identity's sample set.
const AUTO_TRAIN_MIN_QUALITY: f64 = 0.30;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("store: {0}")]
    Store(StoreError),
    #[error("no identities enrolled")]
    NoEnrolledIdentities,
    #[error("face not recognized")]
    NoMatch,
    #[error("face does not match the requesting identity")]
    IdentityMismatch,
    #[error("identity not registered: {0}")]
    UnknownIdentity(String),
    #[error("must check in before checking out")]
    MustCheckInFirst,
    #[error("evidence storage unavailable: {0}")]
    Evidence(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transition(TransitionError::MustCheckInFirst) => {
                EngineError::MustCheckInFirst
            }
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    /// Stable machine-readable code for wire payloads.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Capture(CaptureError::InvalidImage(_)) => "INVALID_IMAGE",
            EngineError::Capture(CaptureError::NoFace) => "NO_FACE",
            EngineError::Capture(CaptureError::MultipleFaces) => "MULTIPLE_FACES",
            EngineError::Capture(CaptureError::QualityRejected(_)) => "QUALITY_REJECTED",
            EngineError::Capture(CaptureError::NotLive(_)) => "NOT_LIVE",
            EngineError::Capture(CaptureError::Locator(_)) => "DETECTOR_ERROR",
            EngineError::Store(_) => "STORE_ERROR",
            EngineError::NoEnrolledIdentities => "NO_ENROLLED_IDENTITIES",
            EngineError::NoMatch => "NO_MATCH",
            EngineError::IdentityMismatch => "IDENTITY_MISMATCH",
            EngineError::UnknownIdentity(_) => "UNKNOWN_IDENTITY",
            EngineError::MustCheckInFirst => "MUST_CHECK_IN_FIRST",
            EngineError::Evidence(_) => "EVIDENCE_ERROR",
            EngineError::ChannelClosed => "ENGINE_UNAVAILABLE",
        }
    }

    /// True for input/policy failures the caller should not retry blindly;
    /// false for resource failures that may be retried.
    pub fn is_request_error(&self) -> bool {
        !matches!(
            self,
            EngineError::Store(_) | EngineError::Evidence(_) | EngineError::ChannelClosed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterStatus {
    Created,
    Updated,
    SampleAdded,
}

impl RegisterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterStatus::Created => "CREATED",
            RegisterStatus::Updated => "UPDATED",
            RegisterStatus::SampleAdded => "SAMPLE_ADDED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub status: RegisterStatus,
    pub identity_id: i64,
    pub sample_count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub identity_id: i64,
    pub external_ref: String,
    pub display_name: String,
    pub confidence: f64,
    pub capture_quality: f64,
}

#[derive(Debug, Clone)]
pub struct MarkOutcome {
    pub action: AttendanceAction,
    pub already_marked: bool,
    pub identity_id: i64,
    pub display_name: String,
    pub confidence: f64,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: i64,
}

#[derive(Debug, Clone, Default)]
pub struct StatusOutcome {
    pub registered: bool,
    pub checked_in: bool,
    pub checked_out: bool,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: Option<i64>,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Register {
        identity_ref: String,
        display_name: String,
        contact: Option<String>,
        image: Vec<u8>,
        additional_sample: bool,
        reply: oneshot::Sender<Result<RegisterOutcome, EngineError>>,
    },
    Verify {
        identity_ref: String,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<VerifyOutcome, EngineError>>,
    },
    Mark {
        identity_ref: String,
        action: AttendanceAction,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<MarkOutcome, EngineError>>,
    },
    StatusToday {
        identity_ref: String,
        reply: oneshot::Sender<Result<StatusOutcome, EngineError>>,
    },
    List {
        reply: oneshot::Sender<Result<Vec<IdentitySummary>, EngineError>>,
    },
    Remove {
        identity_ref: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    pub async fn register(
        &self,
        identity_ref: String,
        display_name: String,
        contact: Option<String>,
        image: Vec<u8>,
        additional_sample: bool,
    ) -> Result<RegisterOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Register {
                identity_ref,
                display_name,
                contact,
                image,
                additional_sample,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn verify(
        &self,
        identity_ref: String,
        image: Vec<u8>,
    ) -> Result<VerifyOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                identity_ref,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn mark(
        &self,
        identity_ref: String,
        action: AttendanceAction,
        image: Vec<u8>,
    ) -> Result<MarkOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Mark {
                identity_ref,
                action,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn status_today(&self, identity_ref: String) -> Result<StatusOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::StatusToday {
                identity_ref,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn list(&self) -> Result<Vec<IdentitySummary>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::List { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn remove(&self, identity_ref: String) -> Result<bool, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Remove {
                identity_ref,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the store and loads the detection model synchronously, failing fast
/// at startup if either is unavailable, then enters the request loop.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    std::fs::create_dir_all(&config.evidence_dir)
        .map_err(|e| EngineError::Evidence(format!("cannot create evidence dir: {e}")))?;

    let cipher = config
        .store_key
        .as_deref()
        .map(SignatureCipher::from_passphrase);
    let store = Store::open(&config.db_path, cipher)?;
    tracing::info!(path = %config.db_path.display(), "store opened");

    let locator = SsdFaceLocator::load(&config.detector_model_path())
        .map_err(|e| EngineError::Capture(CaptureError::Locator(e)))?;

    let mut engine = Engine {
        locator: Box::new(locator),
        store,
        policy: CapturePolicy::default(),
        weights: MatchWeights::default(),
        tolerance: config.match_tolerance,
        evidence_dir: config.evidence_dir.clone(),
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("presence-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Register {
                        identity_ref,
                        display_name,
                        contact,
                        image,
                        additional_sample,
                        reply,
                    } => {
                        let result = engine.register(
                            &identity_ref,
                            &display_name,
                            contact.as_deref(),
                            &image,
                            additional_sample,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::Verify {
                        identity_ref,
                        image,
                        reply,
                    } => {
                        let _ = reply.send(engine.verify(&identity_ref, &image));
                    }
                    EngineRequest::Mark {
                        identity_ref,
                        action,
                        image,
                        reply,
                    } => {
                        let _ = reply.send(engine.mark(&identity_ref, action, &image));
                    }
                    EngineRequest::StatusToday {
                        identity_ref,
                        reply,
                    } => {
                        let _ = reply.send(engine.status_today(&identity_ref));
                    }
                    EngineRequest::List { reply } => {
                        let _ = reply.send(engine.list());
                    }
                    EngineRequest::Remove {
                        identity_ref,
                        reply,
                    } => {
                        let _ = reply.send(engine.remove(&identity_ref));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

/// The engine state owned by the request-loop thread.
struct Engine {
    locator: Box<dyn FaceLocator + Send>,
    store: Store,
    policy: CapturePolicy,
    weights: MatchWeights,
    tolerance: f64,
    evidence_dir: PathBuf,
}

impl Engine {
    fn register(
        &mut self,
        identity_ref: &str,
        display_name: &str,
        contact: Option<&str>,
        image: &[u8],
        additional_sample: bool,
    ) -> Result<RegisterOutcome, EngineError> {
        let frame = decode_image(image)?;
        let capture = analyze(self.locator.as_mut(), &frame, &self.policy)?;
        let now = Utc::now();

        if additional_sample {
            let identity_id = self
                .store
                .identity_id(identity_ref)?
                .ok_or_else(|| EngineError::UnknownIdentity(identity_ref.to_string()))?;

            let count = self.store.sample_count(identity_id)?;
            let count = if count >= MAX_TRAINING_SAMPLES {
                tracing::info!(identity_id, count, "sample cap reached; not accumulating");
                count
            } else {
                self.store
                    .add_sample(identity_id, &capture.signature, capture.quality, now)?
            };

            return Ok(RegisterOutcome {
                status: RegisterStatus::SampleAdded,
                identity_id,
                sample_count: Some(count),
            });
        }

        let (identity_id, created) =
            self.store
                .upsert_identity(identity_ref, display_name, contact, &capture.signature, now)?;

        Ok(RegisterOutcome {
            status: if created {
                RegisterStatus::Created
            } else {
                RegisterStatus::Updated
            },
            identity_id,
            sample_count: None,
        })
    }

    fn verify(&mut self, identity_ref: &str, image: &[u8]) -> Result<VerifyOutcome, EngineError> {
        let frame = decode_image(image)?;
        let capture = analyze(self.locator.as_mut(), &frame, &self.policy)?;
        let outcome = self.identify_capture(identity_ref, &capture)?;
        self.auto_train(outcome.identity_id, &capture, outcome.confidence);
        Ok(outcome)
    }

    /// Match a capture against the pool and gate on the claimed identity.
    fn identify_capture(
        &mut self,
        claimed_ref: &str,
        capture: &Capture,
    ) -> Result<VerifyOutcome, EngineError> {
        let pool = self.store.load_enrollment()?;
        if pool.is_empty() {
            return Err(EngineError::NoEnrolledIdentities);
        }

        let outcome = identify(&pool, &capture.signature, self.tolerance, &self.weights);
        if !outcome.matched {
            tracing::info!(confidence = outcome.confidence, "no match in pool");
            return Err(EngineError::NoMatch);
        }

        // The unwraps below never fire: matched implies identity fields.
        let external_ref = outcome.external_ref.unwrap_or_default();
        let identity_id = outcome.identity_id.unwrap_or_default();
        let display_name = outcome.display_name.unwrap_or_default();

        // A match is evidence of the claimed identity, never an override:
        // recognizing someone else is a rejection.
        if external_ref != claimed_ref {
            tracing::warn!(
                claimed = claimed_ref,
                matched = %external_ref,
                confidence = outcome.confidence,
                "matched identity differs from requester"
            );
            return Err(EngineError::IdentityMismatch);
        }

        Ok(VerifyOutcome {
            identity_id,
            external_ref,
            display_name,
            confidence: outcome.confidence,
            capture_quality: capture.quality,
        })
    }

    fn mark(
        &mut self,
        identity_ref: &str,
        action: AttendanceAction,
        image: &[u8],
    ) -> Result<MarkOutcome, EngineError> {
        let frame = decode_image(image)?;
        let capture = analyze(self.locator.as_mut(), &frame, &self.policy)?;
        let verified = self.identify_capture(identity_ref, &capture)?;

        let evidence = self.save_evidence(&frame, verified.identity_id, action)?;

        let now = Utc::now();
        let transition = self.store.mark(
            verified.identity_id,
            now.date_naive(),
            action,
            CheckEvent {
                at: now,
                evidence,
                confidence: verified.confidence,
            },
        )?;

        self.auto_train(verified.identity_id, &capture, verified.confidence);

        Ok(MarkOutcome {
            action,
            already_marked: transition.already_marked,
            identity_id: verified.identity_id,
            display_name: verified.display_name,
            confidence: verified.confidence,
            check_in_time: transition.state.check_in_time(),
            check_out_time: transition.state.check_out_time(),
            elapsed_seconds: transition.elapsed_seconds,
        })
    }

    fn status_today(&mut self, identity_ref: &str) -> Result<StatusOutcome, EngineError> {
        let Some(identity_id) = self.store.identity_id(identity_ref)? else {
            return Ok(StatusOutcome::default());
        };

        let now = Utc::now();
        let state = self.store.day_state(identity_id, now.date_naive())?;

        Ok(StatusOutcome {
            registered: true,
            checked_in: state.check_in_time().is_some(),
            checked_out: state.check_out_time().is_some(),
            check_in_time: state.check_in_time(),
            check_out_time: state.check_out_time(),
            elapsed_seconds: state.elapsed_seconds(now),
        })
    }

    fn list(&mut self) -> Result<Vec<IdentitySummary>, EngineError> {
        Ok(self.store.list_identities()?)
    }

    fn remove(&mut self, identity_ref: &str) -> Result<bool, EngineError> {
        Ok(self.store.remove_identity(identity_ref)?)
    }

    /// Persist the captured frame as JPEG evidence; returns the file name.
    fn save_evidence(
        &self,
        frame: &RgbFrame,
        identity_id: i64,
        action: AttendanceAction,
    ) -> Result<String, EngineError> {
        let name = format!(
            "{}_{}_{}.jpg",
            identity_id,
            action.as_str(),
            uuid::Uuid::new_v4()
        );
        let path = self.evidence_dir.join(&name);

        let buffer = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| EngineError::Evidence("frame buffer mismatch".into()))?;
        buffer
            .save(&path)
            .map_err(|e| EngineError::Evidence(format!("cannot write {}: {e}", path.display())))?;

        Ok(name)
    }

    /// Opportunistic sample accumulation after a confident match.
    ///
    /// Best-effort: a failure here is logged and swallowed, it never fails
    /// the enclosing verify or attendance request.
    fn auto_train(&mut self, identity_id: i64, capture: &Capture, confidence: f64) {
        if confidence <= AUTO_TRAIN_MIN_CONFIDENCE || capture.quality < AUTO_TRAIN_MIN_QUALITY {
            return;
        }

        match self.store.sample_count(identity_id) {
            Ok(count) if count >= MAX_TRAINING_SAMPLES => {}
            Ok(_) => {
                match self
                    .store
                    .add_sample(identity_id, &capture.signature, capture.quality, Utc::now())
                {
                    Ok(count) => {
                        tracing::debug!(identity_id, confidence, count, "auto-trained sample")
                    }
                    Err(e) => tracing::warn!(identity_id, error = %e, "auto-train insert failed"),
                }
            }
            Err(e) => tracing::warn!(identity_id, error = %e, "auto-train count failed"),
        }
    }
}

/// Decode image bytes (JPEG/PNG/WebP) into an RGB frame.
fn decode_image(bytes: &[u8]) -> Result<RgbFrame, EngineError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| EngineError::Capture(CaptureError::InvalidImage(e.to_string())))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    RgbFrame::new(rgb.into_raw(), width, height)
        .map_err(|e| EngineError::Capture(CaptureError::InvalidImage(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::locator::LocatorError;
    use presence_core::FaceRegion;

    /// Locator stub returning one centered region.
    struct StubLocator;

    impl FaceLocator for StubLocator {
        fn locate(&mut self, frame: &RgbFrame) -> Result<Vec<FaceRegion>, LocatorError> {
            Ok(vec![FaceRegion {
                x: frame.width as f32 * 0.125,
                y: frame.height as f32 * 0.125,
                width: frame.width as f32 * 0.625,
                height: frame.height as f32 * 0.625,
                confidence: 0.9,
            }])
        }
    }

    fn test_engine(evidence_dir: PathBuf) -> Engine {
        Engine {
            locator: Box::new(StubLocator),
            store: Store::open_in_memory(None).unwrap(),
            policy: CapturePolicy::default(),
            weights: MatchWeights::default(),
            tolerance: 0.5,
            evidence_dir,
        }
    }

    /// Deterministic in-memory PNG of a textured synthetic face.
    fn png_frame(seed: u64, shift: i16) -> Vec<u8> {
        let mut rng = seed.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(seed + 1);
        let mut next = move || {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 33) as u32
        };

        let (w, h) = (160u32, 160u32);
        let mut img = image::RgbImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let ramp = (x as f32 / w as f32) * 128.0 + (y as f32 / h as f32) * 64.0 + 48.0;
                let noise = (next() % 19) as f32 - 9.0;
                let px = |v: f32| ((v + shift as f32).round().clamp(0.0, 255.0)) as u8;
                img.put_pixel(x, y, image::Rgb([px(ramp + noise), px(ramp * 0.9 + noise), px(ramp * 0.8 - noise)]));
            }
        }

        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_register_verify_mark_flow() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path().to_path_buf());

        let registered = engine
            .register("u-1", "Ada", None, &png_frame(42, 0), false)
            .unwrap();
        assert_eq!(registered.status, RegisterStatus::Created);

        // Same subject, slightly different exposure
        let verified = engine.verify("u-1", &png_frame(42, 8)).unwrap();
        assert_eq!(verified.external_ref, "u-1");
        assert!(verified.confidence >= 0.5);

        let check_in = engine
            .mark("u-1", AttendanceAction::CheckIn, &png_frame(42, 4))
            .unwrap();
        assert!(!check_in.already_marked);
        assert!(check_in.check_in_time.is_some());

        let repeat = engine
            .mark("u-1", AttendanceAction::CheckIn, &png_frame(42, 4))
            .unwrap();
        assert!(repeat.already_marked);
        assert_eq!(repeat.check_in_time, check_in.check_in_time);

        let check_out = engine
            .mark("u-1", AttendanceAction::CheckOut, &png_frame(42, 4))
            .unwrap();
        assert!(!check_out.already_marked);
        assert!(check_out.check_out_time.is_some());
        assert!(check_out.elapsed_seconds >= 0);

        let status = engine.status_today("u-1").unwrap();
        assert!(status.registered && status.checked_in && status.checked_out);
    }

    #[test]
    fn test_verify_empty_pool() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path().to_path_buf());
        let err = engine.verify("u-1", &png_frame(42, 0)).unwrap_err();
        assert!(matches!(err, EngineError::NoEnrolledIdentities));
        assert_eq!(err.code(), "NO_ENROLLED_IDENTITIES");
    }

    #[test]
    fn test_verify_identity_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path().to_path_buf());
        engine
            .register("u-1", "Ada", None, &png_frame(42, 0), false)
            .unwrap();

        // The only enrolled face matches, but the requester claims another id
        let err = engine.verify("u-2", &png_frame(42, 4)).unwrap_err();
        assert!(matches!(err, EngineError::IdentityMismatch));
    }

    #[test]
    fn test_check_out_before_check_in() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path().to_path_buf());
        engine
            .register("u-1", "Ada", None, &png_frame(42, 0), false)
            .unwrap();

        let err = engine
            .mark("u-1", AttendanceAction::CheckOut, &png_frame(42, 4))
            .unwrap_err();
        assert!(matches!(err, EngineError::MustCheckInFirst));
        assert!(err.is_request_error());
    }

    #[test]
    fn test_invalid_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path().to_path_buf());
        let err = engine
            .register("u-1", "Ada", None, b"not an image", false)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_IMAGE");
    }

    #[test]
    fn test_additional_sample_requires_enrollment() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path().to_path_buf());
        let err = engine
            .register("ghost", "G", None, &png_frame(42, 0), true)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownIdentity(_)));
    }

    #[test]
    fn test_additional_samples_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path().to_path_buf());
        engine
            .register("u-1", "Ada", None, &png_frame(42, 0), false)
            .unwrap();

        let added = engine
            .register("u-1", "Ada", None, &png_frame(42, 6), true)
            .unwrap();
        assert_eq!(added.status, RegisterStatus::SampleAdded);
        assert_eq!(added.sample_count, Some(1));
    }

    #[test]
    fn test_evidence_written_on_mark() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path().to_path_buf());
        engine
            .register("u-1", "Ada", None, &png_frame(42, 0), false)
            .unwrap();
        engine
            .mark("u-1", AttendanceAction::CheckIn, &png_frame(42, 4))
            .unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(!files.is_empty(), "evidence frame should be on disk");
    }
}
