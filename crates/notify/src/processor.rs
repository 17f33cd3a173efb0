//! The notification processor: classify, resolve, aggregate.
//!
//! [`NotificationProcessor::process`] turns a raw event collection into the
//! per-project aggregates the digest path renders. Per-event failures
//! (an unrecognized subtype, a failed rule-name or component-version lookup)
//! are logged and skip that one event; aggregation of the remaining set
//! continues unaffected.

use std::sync::Arc;

use scanmail_core::{classify, ProjectData, ProjectDataSet, RawEvent};

use crate::sources::{DetailResolver, SourceError};

/// Aggregates a time-ordered event collection into [`ProjectData`] entries.
pub struct NotificationProcessor {
    resolver: Arc<dyn DetailResolver>,
}

impl NotificationProcessor {
    pub fn new(resolver: Arc<dyn DetailResolver>) -> Self {
        Self { resolver }
    }

    /// Aggregate `events` into per-(project, version) data.
    ///
    /// Events are processed in ascending timestamp order (stable for equal
    /// timestamps), so cancellation events reconcile against the open
    /// entries that preceded them. The result is sorted by project name and
    /// version for stable iteration.
    pub async fn process(&self, events: &[RawEvent]) -> Vec<ProjectData> {
        let mut ordered: Vec<&RawEvent> = events.iter().collect();
        ordered.sort_by_key(|event| event.timestamp);

        let mut set = ProjectDataSet::new();
        for event in ordered {
            let category = match classify(event) {
                Ok(category) => category,
                Err(error) => {
                    tracing::warn!(%error, "Skipping event with unrecognized subtype");
                    continue;
                }
            };

            match self.resolve_event(event).await {
                Ok((resolved, rule_names)) => set.merge(category, &resolved, &rule_names),
                Err(error) => {
                    tracing::error!(
                        %error,
                        project = %event.project_name,
                        component = %event.component_name,
                        "Skipping event, detail lookup failed"
                    );
                }
            }
        }
        set.into_sorted_vec()
    }

    /// Resolve the event's component version reference and its policy rule
    /// names. Any single lookup failure fails the whole event.
    async fn resolve_event(&self, event: &RawEvent) -> Result<(RawEvent, Vec<String>), SourceError> {
        let mut resolved = event.clone();
        resolved.component_version = self
            .resolver
            .resolve_component_version(&event.component_version)
            .await?;

        let mut rule_names = Vec::with_capacity(event.policy_rule_refs.len());
        for rule_ref in &event.policy_rule_refs {
            let name = self.resolver.resolve_rule_name(rule_ref).await?;
            if !rule_names.contains(&name) {
                rule_names.push(name);
            }
        }
        Ok((resolved, rule_names))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
