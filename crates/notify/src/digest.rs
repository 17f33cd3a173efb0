//! Scheduled digest notification runs.
//!
//! One [`DigestRunner`] per cadence (daily/weekly/monthly). The cadence is
//! plain configuration (a label plus a window function on
//! [`Cadence`](scanmail_core::Cadence)) injected into a single generic
//! runner rather than a subclass per cadence.
//!
//! Subscribers are processed sequentially within one invocation; an error
//! for one subscriber is logged and counted, and the loop continues. An
//! error before the loop (subscriber list fetch) aborts only that
//! invocation; the next scheduled one is unaffected. Cadence runners are
//! independent and may run concurrently; each invocation builds its own
//! aggregate from scratch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use scanmail_core::{Cadence, DateRange, ProjectData, SubscriberPreference};
use scanmail_core::{window::resolve_zone, CategoryTag};
use tokio_util::sync::CancellationToken;

use crate::payload::{
    EmailPayload, DEFAULT_DIGEST_TEMPLATE, KEY_END_DATE, KEY_NOTIFIER_CATEGORY, KEY_SERVER_URL,
    KEY_START_DATE, KEY_TOPICS_LIST, KEY_TOTAL_NOTIFICATIONS, KEY_TOTAL_POLICY_OVERRIDES,
    KEY_TOTAL_POLICY_VIOLATIONS, KEY_TOTAL_VULNERABILITIES, KEY_USER_FIRST_NAME,
    KEY_USER_LAST_NAME,
};
use crate::processor::NotificationProcessor;
use crate::sources::{DetailResolver, EmailSender, EventSource, SendError, SourceError, SubscriberSource};

// ---------------------------------------------------------------------------
// Errors / outcome
// ---------------------------------------------------------------------------

/// Failure while processing a single subscriber.
#[derive(Debug, thiserror::Error)]
enum SubscriberError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("Could not assemble email model: {0}")]
    Model(String),
}

/// Summary counters for one digest invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestOutcome {
    /// Emails handed to the sender.
    pub sent: usize,
    /// Subscribers whose project set was empty after filtering.
    pub filtered_out: usize,
    /// Subscribers that hit an error and were skipped.
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// DigestRunner
// ---------------------------------------------------------------------------

/// Aggregates one cadence window's events per subscriber and emits one
/// summary email each.
pub struct DigestRunner {
    cadence: Cadence,
    events: Arc<dyn EventSource>,
    subscribers: Arc<dyn SubscriberSource>,
    resolver: Arc<dyn DetailResolver>,
    sender: Arc<dyn EmailSender>,
    server_url: String,
    /// Configured zone string, e.g. `"+02:00"`; UTC when unset.
    zone: Option<String>,
    default_template: String,
}

impl DigestRunner {
    pub fn new(
        cadence: Cadence,
        events: Arc<dyn EventSource>,
        subscribers: Arc<dyn SubscriberSource>,
        resolver: Arc<dyn DetailResolver>,
        sender: Arc<dyn EmailSender>,
        server_url: impl Into<String>,
    ) -> Self {
        Self {
            cadence,
            events,
            subscribers,
            resolver,
            sender,
            server_url: server_url.into(),
            zone: None,
            default_template: DEFAULT_DIGEST_TEMPLATE.to_string(),
        }
    }

    /// Set the configured time zone string for window computation.
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Override the digest template used when a subscriber has none.
    pub fn with_default_template(mut self, template: impl Into<String>) -> Self {
        self.default_template = template.into();
        self
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Execute one digest invocation relative to `now`.
    ///
    /// Errs only on failures before the per-subscriber loop; everything
    /// inside the loop is isolated per subscriber.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<DigestOutcome, SourceError> {
        let label = self.cadence.label();
        tracing::info!(cadence = label, "Starting digest notifier iteration");

        let all = self.subscribers.list_subscribers().await?;
        let candidates: Vec<&SubscriberPreference> = all
            .iter()
            .filter(|s| s.opted_in && s.frequency == label)
            .collect();
        if candidates.is_empty() {
            tracing::info!(cadence = label, "No subscribers opted into this digest");
            return Ok(DigestOutcome::default());
        }

        let zone = resolve_zone(self.zone.as_deref());
        let range = self.cadence.window(now, zone);
        tracing::info!(
            cadence = label,
            start = %range.start,
            end = %range.end,
            subscribers = candidates.len(),
            "Fetching notification data for digest window"
        );

        let mut outcome = DigestOutcome::default();
        for subscriber in candidates {
            match self.process_subscriber(subscriber, &range).await {
                Ok(true) => outcome.sent += 1,
                Ok(false) => outcome.filtered_out += 1,
                Err(error) => {
                    outcome.failed += 1;
                    tracing::error!(
                        %error,
                        subscriber = %subscriber.email,
                        "Error sending digest email to subscriber"
                    );
                }
            }
        }

        tracing::info!(
            cadence = label,
            sent = outcome.sent,
            filtered_out = outcome.filtered_out,
            failed = outcome.failed,
            "Finished digest notifier iteration"
        );
        Ok(outcome)
    }

    /// Run the scheduled loop: one invocation per `interval` tick until the
    /// token is cancelled.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(cadence = self.cadence.label(), "Digest runner cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(error) = self.run_once(Utc::now()).await {
                        tracing::error!(%error, cadence = self.cadence.label(), "Digest run failed");
                    }
                }
            }
        }
    }

    /// Fetch, aggregate, filter, and send for one subscriber.
    ///
    /// Returns `Ok(true)` when an email was sent, `Ok(false)` when the
    /// subscriber was filtered out (nothing in the window, or no projects
    /// survived the trigger-set intersection).
    async fn process_subscriber(
        &self,
        subscriber: &SubscriberPreference,
        range: &DateRange,
    ) -> Result<bool, SubscriberError> {
        let events = self.events.fetch_events(range, &subscriber.email).await?;
        let processor = NotificationProcessor::new(Arc::clone(&self.resolver));
        let projects = processor.process(&events).await;
        if projects.is_empty() {
            tracing::info!(subscriber = %subscriber.email, "No aggregated data, no email to generate");
            return Ok(false);
        }

        // An empty trigger set intentionally yields zero surviving projects;
        // there is no implicit "all categories" default.
        let triggers = subscriber.trigger_set();
        let digest: Vec<ProjectData> = projects
            .iter()
            .filter_map(|project| project.filter_categories(&triggers))
            .collect();
        if digest.is_empty() {
            return Ok(false);
        }

        let payload = self.build_payload(subscriber, range, &digest)?;
        self.sender.send(&payload).await?;
        Ok(true)
    }

    fn build_payload(
        &self,
        subscriber: &SubscriberPreference,
        range: &DateRange,
        digest: &[ProjectData],
    ) -> Result<EmailPayload, SubscriberError> {
        let template = subscriber
            .template_name
            .clone()
            .unwrap_or_else(|| self.default_template.clone());
        let mut payload = EmailPayload::new(template);
        payload.recipients = vec![subscriber.email.clone()];

        let topics =
            serde_json::to_value(digest).map_err(|e| SubscriberError::Model(e.to_string()))?;
        payload.insert(KEY_TOPICS_LIST, topics);
        payload.insert(
            KEY_START_DATE,
            range.start.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        payload.insert(
            KEY_END_DATE,
            range.end.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        payload.insert(KEY_USER_FIRST_NAME, subscriber.first_name.clone());
        payload.insert(KEY_USER_LAST_NAME, subscriber.last_name.clone());
        payload.insert(
            KEY_NOTIFIER_CATEGORY,
            self.cadence.label().to_uppercase(),
        );
        payload.insert(KEY_SERVER_URL, self.server_url.clone());

        let violations: u32 = total(digest, CategoryTag::PolicyViolation);
        let overrides: u32 = total(digest, CategoryTag::PolicyViolationOverride);
        let cleared: u32 = total(digest, CategoryTag::PolicyViolationCleared);
        let vulnerabilities: u32 = total(digest, CategoryTag::Vulnerability);
        payload.insert(
            KEY_TOTAL_NOTIFICATIONS,
            violations + overrides + cleared + vulnerabilities,
        );
        payload.insert(KEY_TOTAL_POLICY_VIOLATIONS, violations);
        payload.insert(KEY_TOTAL_POLICY_OVERRIDES, overrides);
        payload.insert(KEY_TOTAL_VULNERABILITIES, vulnerabilities);
        Ok(payload)
    }
}

fn total(digest: &[ProjectData], tag: CategoryTag) -> u32 {
    digest.iter().map(|project| project.category_count(tag)).sum()
}
