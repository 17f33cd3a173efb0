//! Collaborator traits consumed by the engine.
//!
//! The engine never fetches data or speaks SMTP itself; everything external
//! sits behind these seams so the dispatch and digest paths can be exercised
//! with in-memory fakes. None of the calls carry a timeout; a stalled remote
//! call blocks only the task or subscriber-loop slot it occupies.

use async_trait::async_trait;
use scanmail_core::{DateRange, RawEvent, SubscriberPreference};

use crate::payload::EmailPayload;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a data collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A bulk fetch (event window, subscriber list) failed; aborts the
    /// current invocation.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// A per-event detail lookup failed; skips only that event.
    #[error("Lookup failed: {0}")]
    Lookup(String),
}

/// Failure reported synchronously by the email sender.
#[derive(Debug, thiserror::Error)]
#[error("Email send failed: {0}")]
pub struct SendError(pub String);

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Fetches the time-ordered events visible to one subscriber in a window.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(
        &self,
        range: &DateRange,
        subscriber_email: &str,
    ) -> Result<Vec<RawEvent>, SourceError>;
}

/// Lists subscriber preference records from the external config source.
#[async_trait]
pub trait SubscriberSource: Send + Sync {
    async fn list_subscribers(&self) -> Result<Vec<SubscriberPreference>, SourceError>;
}

/// Resolves wire references carried on events into display values.
///
/// Both calls may fail per invocation; the failure is local to the one
/// event being aggregated.
#[async_trait]
pub trait DetailResolver: Send + Sync {
    async fn resolve_rule_name(&self, rule_ref: &str) -> Result<String, SourceError>;
    async fn resolve_component_version(&self, version_ref: &str) -> Result<String, SourceError>;
}

/// Hands a fully assembled payload to the external email transport.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, payload: &EmailPayload) -> Result<(), SendError>;
}
