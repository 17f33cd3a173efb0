//! Per-category routing for the immediate dispatch path.
//!
//! One registered transform per category, held in a data-driven
//! [`RouterRegistry`] (a tag → function table, not a trait hierarchy). The
//! shared base assembly collects the recipient addresses relevant to the
//! batch and the common model fields; each category function supplies only
//! its own model fields.
//!
//! A category with no matching subscribers still transforms; the result is
//! an empty-recipient payload the caller drops as a no-op, never an error.

use std::collections::{BTreeMap, BTreeSet};

use scanmail_core::{classify, CategoryTag, RawEvent, SubscriberPreference};
use serde_json::json;

use crate::payload::{
    EmailPayload, DEFAULT_NOTICE_TEMPLATE, KEY_NOTIFIER_CATEGORY, KEY_SERVER_URL,
};

// ---------------------------------------------------------------------------
// Batch model keys
// ---------------------------------------------------------------------------

/// Component entries of the batch (immediate path only).
pub const KEY_BATCH_ITEMS: &str = "items";

/// Number of events in the batch.
pub const KEY_BATCH_COUNT: &str = "totalCount";

pub const KEY_VULNERABILITIES_ADDED: &str = "totalVulnerabilitiesAdded";

pub const KEY_VULNERABILITIES_UPDATED: &str = "totalVulnerabilitiesUpdated";

pub const KEY_VULNERABILITIES_DELETED: &str = "totalVulnerabilitiesDeleted";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Router received an empty batch")]
    EmptyBatch,

    /// The batch contract requires homogeneous categories.
    #[error("Mixed-category batch: expected {expected}, found {found}")]
    MixedBatch { expected: String, found: String },

    #[error("Router transform failed: {0}")]
    Transform(String),
}

// ---------------------------------------------------------------------------
// RouterContext
// ---------------------------------------------------------------------------

/// Read-only data shared by all router transforms of one batch.
#[derive(Debug, Clone)]
pub struct RouterContext {
    pub subscribers: Vec<SubscriberPreference>,
    /// Identity string of the SCA server, rendered into every email.
    pub server_url: String,
}

impl RouterContext {
    /// Distinct addresses of opted-in subscribers whose trigger set contains
    /// `category`, in stable order. May be empty.
    pub fn recipients_for(&self, category: CategoryTag) -> Vec<String> {
        let distinct: BTreeSet<&str> = self
            .subscribers
            .iter()
            .filter(|s| s.opted_in && s.trigger_set().contains(&category))
            .map(|s| s.email.as_str())
            .collect();
        distinct.into_iter().map(str::to_string).collect()
    }
}

/// Transform from a homogeneous event batch to one email payload.
pub type RouterFn = fn(&RouterContext, &[RawEvent]) -> Result<EmailPayload, RouterError>;

// ---------------------------------------------------------------------------
// RouterRegistry
// ---------------------------------------------------------------------------

/// Tag → transform dispatch table. Each category owns exactly one entry;
/// registering a tag again replaces the previous transform.
#[derive(Debug, Clone, Default)]
pub struct RouterRegistry {
    table: BTreeMap<CategoryTag, RouterFn>,
}

impl RouterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in transform for every category.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CategoryTag::PolicyViolation, route_policy_violation);
        registry.register(CategoryTag::PolicyViolationOverride, route_policy_override);
        registry.register(CategoryTag::PolicyViolationCleared, route_policy_cleared);
        registry.register(CategoryTag::Vulnerability, route_vulnerability);
        registry
    }

    /// Register a transform for `tag`, replacing any prior registration.
    pub fn register(&mut self, tag: CategoryTag, router: RouterFn) {
        self.table.insert(tag, router);
    }

    /// Merge `other` into this registry; entries in `other` win per tag.
    pub fn merge(&mut self, other: RouterRegistry) {
        self.table.extend(other.table);
    }

    pub fn get(&self, tag: CategoryTag) -> Option<RouterFn> {
        self.table.get(&tag).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Built-in transforms
// ---------------------------------------------------------------------------

fn route_policy_violation(
    ctx: &RouterContext,
    batch: &[RawEvent],
) -> Result<EmailPayload, RouterError> {
    policy_batch_payload(ctx, CategoryTag::PolicyViolation, batch)
}

fn route_policy_override(
    ctx: &RouterContext,
    batch: &[RawEvent],
) -> Result<EmailPayload, RouterError> {
    policy_batch_payload(ctx, CategoryTag::PolicyViolationOverride, batch)
}

fn route_policy_cleared(
    ctx: &RouterContext,
    batch: &[RawEvent],
) -> Result<EmailPayload, RouterError> {
    policy_batch_payload(ctx, CategoryTag::PolicyViolationCleared, batch)
}

fn route_vulnerability(
    ctx: &RouterContext,
    batch: &[RawEvent],
) -> Result<EmailPayload, RouterError> {
    check_batch(CategoryTag::Vulnerability, batch)?;
    let mut payload = base_payload(ctx, CategoryTag::Vulnerability);

    let mut added = 0usize;
    let mut updated = 0usize;
    let mut removed = 0usize;
    for event in batch {
        added += event.vulnerability_deltas.added.len();
        updated += event.vulnerability_deltas.updated.len();
        removed += event.vulnerability_deltas.removed.len();
    }
    payload.insert(KEY_BATCH_ITEMS, component_items(batch));
    payload.insert(KEY_BATCH_COUNT, batch.len());
    payload.insert(KEY_VULNERABILITIES_ADDED, added);
    payload.insert(KEY_VULNERABILITIES_UPDATED, updated);
    payload.insert(KEY_VULNERABILITIES_DELETED, removed);
    Ok(payload)
}

/// Shared assembly for the three policy categories.
fn policy_batch_payload(
    ctx: &RouterContext,
    category: CategoryTag,
    batch: &[RawEvent],
) -> Result<EmailPayload, RouterError> {
    check_batch(category, batch)?;
    let mut payload = base_payload(ctx, category);
    payload.insert(KEY_BATCH_ITEMS, component_items(batch));
    payload.insert(KEY_BATCH_COUNT, batch.len());
    Ok(payload)
}

/// Recipients plus the model fields every category shares.
fn base_payload(ctx: &RouterContext, category: CategoryTag) -> EmailPayload {
    let mut payload = EmailPayload::new(DEFAULT_NOTICE_TEMPLATE);
    payload.recipients = ctx.recipients_for(category);
    payload.insert(KEY_NOTIFIER_CATEGORY, category.as_str());
    payload.insert(KEY_SERVER_URL, ctx.server_url.clone());
    payload
}

fn component_items(batch: &[RawEvent]) -> serde_json::Value {
    let items: Vec<serde_json::Value> = batch
        .iter()
        .map(|event| {
            json!({
                "componentName": event.component_name,
                "componentVersion": event.component_version,
                "ruleRefs": event.policy_rule_refs,
            })
        })
        .collect();
    serde_json::Value::Array(items)
}

/// Enforce the homogeneous-batch contract.
fn check_batch(expected: CategoryTag, batch: &[RawEvent]) -> Result<(), RouterError> {
    if batch.is_empty() {
        return Err(RouterError::EmptyBatch);
    }
    for event in batch {
        let found = classify(event).map_err(|e| RouterError::Transform(e.to_string()))?;
        if found != expected {
            return Err(RouterError::MixedBatch {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use scanmail_core::event::{EVENT_TYPE_RULE_VIOLATION, EVENT_TYPE_VULNERABILITY};
    use scanmail_core::subscriber::{CONFIG_KEY_OPT_IN, CONFIG_KEY_TRIGGERS};

    use super::*;

    fn subscriber(email: &str, opted_in: bool, triggers: &[&str]) -> SubscriberPreference {
        let mut config = std::collections::BTreeMap::new();
        config.insert(
            CONFIG_KEY_OPT_IN.to_string(),
            vec![if opted_in { "true" } else { "false" }.to_string()],
        );
        config.insert(
            CONFIG_KEY_TRIGGERS.to_string(),
            triggers.iter().map(|t| t.to_string()).collect(),
        );
        SubscriberPreference::from_config(email, "Ada", "Lovelace", &config)
    }

    fn violation_batch() -> Vec<RawEvent> {
        vec![RawEvent::new(
            EVENT_TYPE_RULE_VIOLATION,
            "ProjectA",
            "1.0.0",
            "openssl",
            "2.0.0",
            Utc::now(),
        )
        .with_rule_refs(vec!["rules/ruleX".to_string()])]
    }

    fn ctx(subscribers: Vec<SubscriberPreference>) -> RouterContext {
        RouterContext {
            subscribers,
            server_url: "https://sca.example.com".to_string(),
        }
    }

    #[test]
    fn default_registry_covers_every_category() {
        let registry = RouterRegistry::with_defaults();
        for tag in CategoryTag::ALL {
            assert!(registry.get(tag).is_some(), "missing router for {tag}");
        }
    }

    #[test]
    fn register_replaces_prior_entry() {
        fn noop(_: &RouterContext, _: &[RawEvent]) -> Result<EmailPayload, RouterError> {
            Err(RouterError::Transform("replaced".to_string()))
        }
        let mut registry = RouterRegistry::with_defaults();
        registry.register(CategoryTag::PolicyViolation, noop);
        let router = registry.get(CategoryTag::PolicyViolation).unwrap();
        assert!(router(&ctx(Vec::new()), &violation_batch()).is_err());
    }

    #[test]
    fn violation_batch_routes_to_triggered_subscribers() {
        let context = ctx(vec![
            subscriber("a@example.com", true, &["POLICY_VIOLATION"]),
            subscriber("b@example.com", true, &["VULNERABILITY"]),
            subscriber("c@example.com", false, &["POLICY_VIOLATION"]),
        ]);
        let payload = route_policy_violation(&context, &violation_batch()).unwrap();

        assert_eq!(payload.recipients, vec!["a@example.com"]);
        assert_eq!(payload.model[KEY_NOTIFIER_CATEGORY], "POLICY_VIOLATION");
        assert_eq!(payload.model[KEY_BATCH_COUNT], 1);
        assert_eq!(
            payload.model[KEY_BATCH_ITEMS][0]["componentName"],
            "openssl"
        );
    }

    #[test]
    fn no_matching_subscribers_yields_empty_recipient_payload() {
        let payload = route_policy_violation(&ctx(Vec::new()), &violation_batch()).unwrap();
        assert!(payload.is_noop());
        // The model is still fully assembled.
        assert_eq!(payload.model[KEY_SERVER_URL], "https://sca.example.com");
    }

    #[test]
    fn vulnerability_batch_counts_deltas() {
        use scanmail_core::{Severity, VulnRef, VulnerabilityDeltas};

        let batch = vec![RawEvent::new(
            EVENT_TYPE_VULNERABILITY,
            "ProjectA",
            "1.0.0",
            "openssl",
            "2.0.0",
            Utc::now(),
        )
        .with_deltas(VulnerabilityDeltas {
            added: vec![VulnRef::new("CVE-1", Severity::High)],
            updated: vec![VulnRef::new("CVE-2", Severity::Low)],
            removed: Vec::new(),
        })];
        let payload = route_vulnerability(&ctx(Vec::new()), &batch).unwrap();

        assert_eq!(payload.model[KEY_VULNERABILITIES_ADDED], 1);
        assert_eq!(payload.model[KEY_VULNERABILITIES_UPDATED], 1);
        assert_eq!(payload.model[KEY_VULNERABILITIES_DELETED], 0);
    }

    #[test]
    fn mixed_batch_is_rejected() {
        let mut batch = violation_batch();
        batch.push(RawEvent::new(
            EVENT_TYPE_VULNERABILITY,
            "ProjectA",
            "1.0.0",
            "openssl",
            "2.0.0",
            Utc::now(),
        ));
        assert_matches!(
            route_policy_violation(&ctx(Vec::new()), &batch),
            Err(RouterError::MixedBatch { .. })
        );
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert_matches!(
            route_policy_violation(&ctx(Vec::new()), &[]),
            Err(RouterError::EmptyBatch)
        );
    }
}
