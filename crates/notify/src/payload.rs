//! Email payload model and its key vocabulary.
//!
//! Template rendering happens in an external collaborator that reads model
//! values by key, so the `KEY_*` constants are a produced contract: renaming
//! one is a breaking change.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Model keys
// ---------------------------------------------------------------------------

/// Per-project digest entries (the aggregated `ProjectData` list).
pub const KEY_TOPICS_LIST: &str = "topicsList";

/// Window start, RFC 3339 with millisecond precision.
pub const KEY_START_DATE: &str = "startDate";

/// Window end, RFC 3339 with millisecond precision.
pub const KEY_END_DATE: &str = "endDate";

pub const KEY_USER_FIRST_NAME: &str = "user_first_name";

pub const KEY_USER_LAST_NAME: &str = "user_last_name";

/// Upper-cased cadence or category label.
pub const KEY_NOTIFIER_CATEGORY: &str = "emailCategory";

/// Identity string of the SCA server the events came from.
pub const KEY_SERVER_URL: &str = "server_url";

pub const KEY_TOTAL_NOTIFICATIONS: &str = "totalNotifications";

pub const KEY_TOTAL_POLICY_VIOLATIONS: &str = "totalPolicyViolations";

pub const KEY_TOTAL_POLICY_OVERRIDES: &str = "totalPolicyOverrides";

pub const KEY_TOTAL_VULNERABILITIES: &str = "totalVulnerabilities";

/// Template used for digest emails unless the subscriber overrides it.
pub const DEFAULT_DIGEST_TEMPLATE: &str = "digest.ftl";

/// Template used for immediate per-category notification emails.
pub const DEFAULT_NOTICE_TEMPLATE: &str = "notification.ftl";

// ---------------------------------------------------------------------------
// EmailPayload
// ---------------------------------------------------------------------------

/// One assembled email: recipients, template, and rendering model.
///
/// Write-once: built fully, then handed to the sender. A payload with no
/// recipients is a valid no-op that callers drop silently, never an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailPayload {
    pub recipients: Vec<String>,
    pub template_name: String,
    pub model: BTreeMap<String, Value>,
}

impl EmailPayload {
    pub fn new(template_name: impl Into<String>) -> Self {
        Self {
            recipients: Vec::new(),
            template_name: template_name.into(),
            model: BTreeMap::new(),
        }
    }

    /// Insert one model value under its documented key.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.model.insert(key.to_string(), value.into());
    }

    /// True when there is nobody to deliver to.
    pub fn is_noop(&self) -> bool {
        self.recipients.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
