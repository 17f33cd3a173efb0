//! Subscriber preference model.
//!
//! Preferences live in the external config collaborator as string-keyed
//! value lists; this module owns the key vocabulary and the parsing rules.
//! Unrecognized trigger values are logged and ignored rather than rejecting
//! the whole preference record.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::category::CategoryTag;

// ---------------------------------------------------------------------------
// Config keys
// ---------------------------------------------------------------------------

/// Whether the subscriber receives any digest email at all.
pub const CONFIG_KEY_OPT_IN: &str = "opt-in";

/// Which digest cadence the subscriber wants; must equal a cadence label
/// (`"Daily"`, `"Weekly"`, `"Monthly"`) case-sensitively.
pub const CONFIG_KEY_FREQUENCY: &str = "frequency";

/// List of category wire strings the subscriber wants to see.
pub const CONFIG_KEY_TRIGGERS: &str = "triggers";

/// Optional per-subscriber template override.
pub const CONFIG_KEY_TEMPLATE_NAME: &str = "template-name";

// ---------------------------------------------------------------------------
// SubscriberPreference
// ---------------------------------------------------------------------------

/// One subscriber's contact identity and notification preferences.
///
/// Read-only to the engine; the source of truth is the external config
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberPreference {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub opted_in: bool,
    /// Raw frequency value; matched case-sensitively against cadence labels.
    pub frequency: String,
    /// Raw trigger strings; parse via [`trigger_set`](Self::trigger_set).
    pub triggers: Vec<String>,
    pub template_name: Option<String>,
}

impl SubscriberPreference {
    /// Build a preference record from the subscriber's identity and their
    /// raw config map as returned by the config collaborator.
    ///
    /// Missing keys default to empty/false values.
    pub fn from_config(
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        config: &BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            opted_in: single_value(config, CONFIG_KEY_OPT_IN)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            frequency: single_value(config, CONFIG_KEY_FREQUENCY)
                .unwrap_or_default()
                .to_string(),
            triggers: config
                .get(CONFIG_KEY_TRIGGERS)
                .cloned()
                .unwrap_or_default(),
            template_name: single_value(config, CONFIG_KEY_TEMPLATE_NAME)
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string),
        }
    }

    /// Parse the raw trigger strings into a category set.
    ///
    /// Unrecognized values are logged and skipped; an empty result means
    /// every project is filtered out for this subscriber downstream.
    pub fn trigger_set(&self) -> BTreeSet<CategoryTag> {
        let mut set = BTreeSet::new();
        for trigger in &self.triggers {
            match trigger.parse::<CategoryTag>() {
                Ok(tag) => {
                    set.insert(tag);
                }
                Err(error) => {
                    tracing::error!(trigger, %error, "Could not parse trigger config value");
                }
            }
        }
        set
    }
}

fn single_value<'a>(config: &'a BTreeMap<String, Vec<String>>, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(|values| values.first())
        .map(String::as_str)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
