//! Raw security event model.
//!
//! [`RawEvent`] is the engine's view of a single occurrence reported by the
//! external software-composition-analysis service: a policy violation, a
//! policy override, a violation clearance, or a vulnerability delta for one
//! component version of one project version. Events are immutable once
//! produced; their timestamps define the total order used for digest
//! windowing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire event types
// ---------------------------------------------------------------------------

/// Runtime subtype string for a policy rule violation.
pub const EVENT_TYPE_RULE_VIOLATION: &str = "RULE_VIOLATION";

/// Runtime subtype string for a cleared policy rule violation.
pub const EVENT_TYPE_RULE_VIOLATION_CLEARED: &str = "RULE_VIOLATION_CLEARED";

/// Runtime subtype string for a policy override.
pub const EVENT_TYPE_POLICY_OVERRIDE: &str = "POLICY_OVERRIDE";

/// Runtime subtype string for a vulnerability delta.
pub const EVENT_TYPE_VULNERABILITY: &str = "VULNERABILITY";

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Vulnerability severity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    Medium,
    Low,
    Unknown,
}

// ---------------------------------------------------------------------------
// Vulnerability deltas
// ---------------------------------------------------------------------------

/// Reference to a single vulnerability carried inside a delta event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnRef {
    /// Vendor vulnerability id, e.g. `"CVE-2016-1000"`.
    pub id: String,
    pub severity: Severity,
}

impl VulnRef {
    pub fn new(id: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            severity,
        }
    }
}

/// The added/updated/removed vulnerability sets of a `VULNERABILITY` event.
///
/// Empty for all other event subtypes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityDeltas {
    pub added: Vec<VulnRef>,
    pub updated: Vec<VulnRef>,
    pub removed: Vec<VulnRef>,
}

impl VulnerabilityDeltas {
    /// True when no vulnerabilities were added, updated, or removed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RawEvent
// ---------------------------------------------------------------------------

/// A single reported occurrence tied to one component version of one
/// project version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Runtime subtype reported on the wire (see the `EVENT_TYPE_*`
    /// constants). Classified into a category by
    /// [`classify`](crate::category::classify).
    pub event_type: String,

    pub project_name: String,
    pub project_version: String,
    pub component_name: String,
    pub component_version: String,

    /// When the SCA service recorded the occurrence (UTC).
    pub timestamp: DateTime<Utc>,

    /// References to the violated/overridden policy rules. Resolved to
    /// human-readable rule names during aggregation.
    pub policy_rule_refs: Vec<String>,

    /// Vulnerability deltas; populated only for `VULNERABILITY` events.
    pub vulnerability_deltas: VulnerabilityDeltas,
}

impl RawEvent {
    /// Create an event with only the required identity fields.
    ///
    /// Rule refs and vulnerability deltas default to empty.
    pub fn new(
        event_type: impl Into<String>,
        project_name: impl Into<String>,
        project_version: impl Into<String>,
        component_name: impl Into<String>,
        component_version: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            project_name: project_name.into(),
            project_version: project_version.into(),
            component_name: component_name.into(),
            component_version: component_version.into(),
            timestamp,
            policy_rule_refs: Vec::new(),
            vulnerability_deltas: VulnerabilityDeltas::default(),
        }
    }

    /// Attach policy rule references to the event.
    pub fn with_rule_refs(mut self, refs: Vec<String>) -> Self {
        self.policy_rule_refs = refs;
        self
    }

    /// Set the vulnerability deltas for the event.
    pub fn with_deltas(mut self, deltas: VulnerabilityDeltas) -> Self {
        self.vulnerability_deltas = deltas;
        self
    }

    /// The (project name, project version) aggregation key.
    pub fn project_key(&self) -> (&str, &str) {
        (&self.project_name, &self.project_version)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_has_empty_detail() {
        let event = RawEvent::new(
            EVENT_TYPE_RULE_VIOLATION,
            "ProjectA",
            "1.0.0",
            "openssl",
            "1.0.1",
            Utc::now(),
        );
        assert!(event.policy_rule_refs.is_empty());
        assert!(event.vulnerability_deltas.is_empty());
    }

    #[test]
    fn project_key_pairs_name_and_version() {
        let event = RawEvent::new(
            EVENT_TYPE_VULNERABILITY,
            "ProjectA",
            "1.0.0",
            "openssl",
            "1.0.1",
            Utc::now(),
        );
        assert_eq!(event.project_key(), ("ProjectA", "1.0.0"));
    }

    #[test]
    fn deltas_empty_only_without_entries() {
        let mut deltas = VulnerabilityDeltas::default();
        assert!(deltas.is_empty());
        deltas.removed.push(VulnRef::new("CVE-2016-1000", Severity::Low));
        assert!(!deltas.is_empty());
    }
}
