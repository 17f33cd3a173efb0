//! Notification categories and the event classifier.
//!
//! [`CategoryTag`] is a closed enumeration. Its string forms are a
//! cross-boundary contract: subscriber trigger values stored in the external
//! config source must match these names exactly (case-sensitive), so
//! renaming one is a breaking change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::event::{
    RawEvent, EVENT_TYPE_POLICY_OVERRIDE, EVENT_TYPE_RULE_VIOLATION,
    EVENT_TYPE_RULE_VIOLATION_CLEARED, EVENT_TYPE_VULNERABILITY,
};

// ---------------------------------------------------------------------------
// CategoryTag
// ---------------------------------------------------------------------------

/// The fixed classification of a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoryTag {
    #[serde(rename = "POLICY_VIOLATION")]
    PolicyViolation,
    #[serde(rename = "POLICY_VIOLATION_OVERRIDE")]
    PolicyViolationOverride,
    #[serde(rename = "POLICY_VIOLATION_CLEARED")]
    PolicyViolationCleared,
    #[serde(rename = "VULNERABILITY")]
    Vulnerability,
}

impl CategoryTag {
    /// All categories, in stable order.
    pub const ALL: [CategoryTag; 4] = [
        CategoryTag::PolicyViolation,
        CategoryTag::PolicyViolationOverride,
        CategoryTag::PolicyViolationCleared,
        CategoryTag::Vulnerability,
    ];

    /// Wire string form. Must match subscriber trigger config values.
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryTag::PolicyViolation => "POLICY_VIOLATION",
            CategoryTag::PolicyViolationOverride => "POLICY_VIOLATION_OVERRIDE",
            CategoryTag::PolicyViolationCleared => "POLICY_VIOLATION_CLEARED",
            CategoryTag::Vulnerability => "VULNERABILITY",
        }
    }
}

impl fmt::Display for CategoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryTag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POLICY_VIOLATION" => Ok(CategoryTag::PolicyViolation),
            "POLICY_VIOLATION_OVERRIDE" => Ok(CategoryTag::PolicyViolationOverride),
            "POLICY_VIOLATION_CLEARED" => Ok(CategoryTag::PolicyViolationCleared),
            "VULNERABILITY" => Ok(CategoryTag::Vulnerability),
            other => Err(CoreError::UnknownTrigger(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Map a raw event's runtime subtype to its notification category.
///
/// Total and deterministic; fails only for an unrecognized subtype, which
/// callers treat as a skip rather than an abort.
pub fn classify(event: &RawEvent) -> Result<CategoryTag, CoreError> {
    match event.event_type.as_str() {
        EVENT_TYPE_RULE_VIOLATION => Ok(CategoryTag::PolicyViolation),
        EVENT_TYPE_RULE_VIOLATION_CLEARED => Ok(CategoryTag::PolicyViolationCleared),
        EVENT_TYPE_POLICY_OVERRIDE => Ok(CategoryTag::PolicyViolationOverride),
        EVENT_TYPE_VULNERABILITY => Ok(CategoryTag::Vulnerability),
        other => Err(CoreError::UnknownEventType(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;
    use crate::error::CoreError;

    fn event(event_type: &str) -> RawEvent {
        RawEvent::new(event_type, "ProjectA", "1.0.0", "openssl", "1.0.1", Utc::now())
    }

    #[test]
    fn rule_violation_classifies_as_policy_violation() {
        assert_eq!(
            classify(&event(EVENT_TYPE_RULE_VIOLATION)).unwrap(),
            CategoryTag::PolicyViolation
        );
    }

    #[test]
    fn cleared_classifies_as_policy_violation_cleared() {
        assert_eq!(
            classify(&event(EVENT_TYPE_RULE_VIOLATION_CLEARED)).unwrap(),
            CategoryTag::PolicyViolationCleared
        );
    }

    #[test]
    fn override_classifies_as_policy_violation_override() {
        assert_eq!(
            classify(&event(EVENT_TYPE_POLICY_OVERRIDE)).unwrap(),
            CategoryTag::PolicyViolationOverride
        );
    }

    #[test]
    fn vulnerability_classifies_as_vulnerability() {
        assert_eq!(
            classify(&event(EVENT_TYPE_VULNERABILITY)).unwrap(),
            CategoryTag::Vulnerability
        );
    }

    #[test]
    fn unknown_subtype_is_an_error() {
        assert_matches!(
            classify(&event("LICENSE_LIMIT")),
            Err(CoreError::UnknownEventType(t)) if t == "LICENSE_LIMIT"
        );
    }

    #[test]
    fn wire_strings_round_trip() {
        for tag in CategoryTag::ALL {
            assert_eq!(tag.as_str().parse::<CategoryTag>().unwrap(), tag);
        }
    }

    #[test]
    fn unknown_trigger_string_is_an_error() {
        assert_matches!(
            "policy_violation".parse::<CategoryTag>(),
            Err(CoreError::UnknownTrigger(_))
        );
    }
}
