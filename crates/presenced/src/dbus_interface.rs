//! D-Bus interface for the Presence attendance daemon.
//!
//! Bus name: org.freedesktop.Presence1
//! Object path: /org/freedesktop/Presence1
//!
//! Images cross the bus as raw encoded bytes (`ay`); responses are JSON
//! strings. Error mapping follows the request taxonomy: malformed input is
//! `InvalidArgs`, policy rejections and resource failures are `Failed` with a
//! structured JSON body carrying the machine-readable code.

use std::str::FromStr;

use presence_core::attendance::AttendanceAction;
use presence_core::CaptureError;
use zbus::interface;

use crate::engine::{EngineError, EngineHandle};

pub struct PresenceService {
    engine: EngineHandle,
}

impl PresenceService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.freedesktop.Presence1")]
impl PresenceService {
    /// Enroll or update a face signature for an identity.
    ///
    /// `additional_sample = true` appends a training sample to an existing
    /// identity instead of replacing its primary signature.
    async fn register(
        &self,
        identity_ref: &str,
        display_name: &str,
        contact: &str,
        image: Vec<u8>,
        additional_sample: bool,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(identity_ref, additional_sample, "register requested");

        let contact = if contact.is_empty() {
            None
        } else {
            Some(contact.to_string())
        };

        let outcome = self
            .engine
            .register(
                identity_ref.to_string(),
                display_name.to_string(),
                contact,
                image,
                additional_sample,
            )
            .await
            .map_err(to_fdo_error)?;

        let mut body = serde_json::json!({
            "status": outcome.status.as_str(),
            "identityId": outcome.identity_id,
        });
        if let Some(count) = outcome.sample_count {
            body["sampleCount"] = serde_json::json!(count);
        }
        Ok(body.to_string())
    }

    /// Verify a captured frame against the claimed identity.
    async fn verify(&self, identity_ref: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(identity_ref, "verify requested");

        let outcome = self
            .engine
            .verify(identity_ref.to_string(), image)
            .await
            .map_err(to_fdo_error)?;

        Ok(serde_json::json!({
            "matched": true,
            "identityId": outcome.identity_id,
            "identityRef": outcome.external_ref,
            "displayName": outcome.display_name,
            "confidence": outcome.confidence,
        })
        .to_string())
    }

    /// Verify a captured frame and apply a check-in/check-out transition.
    async fn mark(
        &self,
        identity_ref: &str,
        action: &str,
        image: Vec<u8>,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(identity_ref, action, "mark requested");

        let action = AttendanceAction::from_str(action)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;

        let outcome = self
            .engine
            .mark(identity_ref.to_string(), action, image)
            .await
            .map_err(to_fdo_error)?;

        Ok(serde_json::json!({
            "action": outcome.action.as_str(),
            "alreadyMarked": outcome.already_marked,
            "identityId": outcome.identity_id,
            "displayName": outcome.display_name,
            "confidence": outcome.confidence,
            "checkInTime": outcome.check_in_time.map(|t| t.to_rfc3339()),
            "checkOutTime": outcome.check_out_time.map(|t| t.to_rfc3339()),
            "elapsedSeconds": outcome.elapsed_seconds,
        })
        .to_string())
    }

    /// Registration and attendance state for the current day.
    async fn status_today(&self, identity_ref: &str) -> zbus::fdo::Result<String> {
        let status = self
            .engine
            .status_today(identity_ref.to_string())
            .await
            .map_err(to_fdo_error)?;

        Ok(serde_json::json!({
            "registered": status.registered,
            "checkedIn": status.checked_in,
            "checkedOut": status.checked_out,
            "checkInTime": status.check_in_time.map(|t| t.to_rfc3339()),
            "checkOutTime": status.check_out_time.map(|t| t.to_rfc3339()),
            "elapsedSeconds": status.elapsed_seconds,
        })
        .to_string())
    }

    /// List enrolled identities (including soft-deleted ones).
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let identities = self.engine.list().await.map_err(to_fdo_error)?;

        let items: Vec<_> = identities
            .iter()
            .map(|i| {
                serde_json::json!({
                    "identityId": i.id,
                    "identityRef": i.external_ref,
                    "displayName": i.display_name,
                    "contact": i.contact,
                    "enrolledAt": i.enrolled_at.to_rfc3339(),
                    "active": i.active,
                    "sampleCount": i.sample_count,
                })
            })
            .collect();

        Ok(serde_json::json!(items).to_string())
    }

    /// Remove an identity; its samples and attendance records cascade.
    async fn remove_identity(&self, identity_ref: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(identity_ref, "remove_identity requested");
        self.engine
            .remove(identity_ref.to_string())
            .await
            .map_err(to_fdo_error)
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "signatureLength": presence_core::SIGNATURE_LEN,
        })
        .to_string())
    }
}

/// Map an engine error onto the D-Bus error taxonomy with a JSON body.
fn to_fdo_error(err: EngineError) -> zbus::fdo::Error {
    let mut body = serde_json::json!({
        "error": err.code(),
        "message": err.to_string(),
    });

    if let EngineError::Capture(CaptureError::QualityRejected(issues)) = &err {
        body["issues"] = serde_json::json!(issues
            .iter()
            .map(|i| serde_json::json!({"code": i.code(), "hint": i.hint()}))
            .collect::<Vec<_>>());
    }

    let payload = body.to_string();
    match &err {
        EngineError::Capture(CaptureError::InvalidImage(_)) => {
            zbus::fdo::Error::InvalidArgs(payload)
        }
        _ if err.is_request_error() => zbus::fdo::Error::Failed(payload),
        _ => {
            // Resource failure: log the detail, return a retryable generic
            tracing::error!(error = %err, "request failed on a resource error");
            zbus::fdo::Error::Failed(payload)
        }
    }
}
