//! Per-project, per-category aggregation of raw security events.
//!
//! [`ProjectDataSet`] is the mutable builder a processing run merges events
//! into; [`into_sorted_vec`](ProjectDataSet::into_sorted_vec) freezes it into
//! the run's final [`ProjectData`] collection. The merge rules are pure so
//! that aggregation over a fixed event set is deterministic and idempotent:
//! the same inputs always produce the same project set.
//!
//! The one cross-category rule lives here: a `PolicyViolationCleared` or
//! `PolicyViolationOverride` event whose component version matches an open
//! `PolicyViolation` item cancels that item instead of adding its own record.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::category::CategoryTag;
use crate::event::{RawEvent, Severity};

// ---------------------------------------------------------------------------
// SeverityCounts
// ---------------------------------------------------------------------------

/// Vulnerability tally by severity bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub unknown: u32,
}

impl SeverityCounts {
    pub fn total(&self) -> u32 {
        self.high + self.medium + self.low + self.unknown
    }
}

// ---------------------------------------------------------------------------
// CategoryData
// ---------------------------------------------------------------------------

/// An open policy entry: one component version with its violated rule names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryItem {
    pub component_name: String,
    pub component_version: String,
    pub rule_names: Vec<String>,
}

/// Aggregate detail for one category within one project version.
///
/// Policy categories fill `items` and `rule_names`; the vulnerability
/// category fills `vulnerabilities` (id → severity, so a later `removed`
/// delta can retract an earlier `added`). `rule_names` stays deduplicated
/// by name and `items` holds one entry per merged event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryData {
    pub items: Vec<CategoryItem>,
    pub rule_names: Vec<String>,
    pub vulnerabilities: BTreeMap<String, Severity>,
}

impl CategoryData {
    /// Number of aggregated entries: open policy items plus tallied
    /// vulnerabilities.
    pub fn count(&self) -> u32 {
        (self.items.len() + self.vulnerabilities.len()) as u32
    }

    /// Severity tally over the currently tracked vulnerabilities.
    pub fn severity_counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for severity in self.vulnerabilities.values() {
            match severity {
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
                Severity::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty() && self.vulnerabilities.is_empty()
    }

    /// Extend the distinct rule-name list, preserving first-seen order.
    fn add_rule_names(&mut self, names: &[String]) {
        for name in names {
            if !self.rule_names.iter().any(|n| n == name) {
                self.rule_names.push(name.clone());
            }
        }
    }

    /// Rebuild `rule_names` from the remaining items after a cancellation.
    fn rebuild_rule_names(&mut self) {
        self.rule_names.clear();
        let items = std::mem::take(&mut self.items);
        for item in &items {
            self.add_rule_names(&item.rule_names);
        }
        self.items = items;
    }
}

// ---------------------------------------------------------------------------
// ProjectData
// ---------------------------------------------------------------------------

/// All aggregated categories for one (project name, project version).
///
/// Built fresh per processing run and never mutated after the run completes;
/// filtering rebuilds a new value wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectData {
    pub project_name: String,
    pub project_version: String,
    pub categories: BTreeMap<CategoryTag, CategoryData>,
}

impl ProjectData {
    /// Rebuild this project keeping only the categories in `triggers`.
    ///
    /// Returns `None` when no category survives, including the empty
    /// trigger set, which intentionally yields no survivors (there is no
    /// implicit "all categories" default).
    pub fn filter_categories(&self, triggers: &BTreeSet<CategoryTag>) -> Option<ProjectData> {
        let categories: BTreeMap<CategoryTag, CategoryData> = self
            .categories
            .iter()
            .filter(|(tag, _)| triggers.contains(tag))
            .map(|(tag, data)| (*tag, data.clone()))
            .collect();

        if categories.is_empty() {
            return None;
        }
        Some(ProjectData {
            project_name: self.project_name.clone(),
            project_version: self.project_version.clone(),
            categories,
        })
    }

    /// Entry count for one category; 0 when the category is absent.
    pub fn category_count(&self, tag: CategoryTag) -> u32 {
        self.categories.get(&tag).map(CategoryData::count).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// ProjectDataSet
// ---------------------------------------------------------------------------

/// Mutable aggregation state for one processing run.
#[derive(Debug, Default)]
pub struct ProjectDataSet {
    projects: BTreeMap<(String, String), ProjectData>,
}

impl ProjectDataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one classified event, with its resolved rule names, into the
    /// per-project aggregate.
    pub fn merge(&mut self, category: CategoryTag, event: &RawEvent, rule_names: &[String]) {
        let key = (event.project_name.clone(), event.project_version.clone());
        let project = self.projects.entry(key).or_insert_with(|| ProjectData {
            project_name: event.project_name.clone(),
            project_version: event.project_version.clone(),
            categories: BTreeMap::new(),
        });

        match category {
            CategoryTag::PolicyViolation => {
                Self::add_policy_item(project, category, event, rule_names);
            }
            CategoryTag::PolicyViolationCleared | CategoryTag::PolicyViolationOverride => {
                if !Self::cancel_open_violation(project, event) {
                    Self::add_policy_item(project, category, event, rule_names);
                }
            }
            CategoryTag::Vulnerability => {
                let data = project.categories.entry(category).or_default();
                let deltas = &event.vulnerability_deltas;
                for vuln in deltas.added.iter().chain(deltas.updated.iter()) {
                    data.vulnerabilities.insert(vuln.id.clone(), vuln.severity);
                }
                for vuln in &deltas.removed {
                    data.vulnerabilities.remove(&vuln.id);
                }
                if data.is_empty() {
                    project.categories.remove(&category);
                }
            }
        }
    }

    /// Freeze the run into a stably ordered collection, sorted by
    /// (project name, project version). Projects left without any category
    /// data (everything cancelled out) are dropped.
    pub fn into_sorted_vec(self) -> Vec<ProjectData> {
        self.projects
            .into_values()
            .filter(|project| !project.categories.is_empty())
            .collect()
    }

    fn add_policy_item(
        project: &mut ProjectData,
        category: CategoryTag,
        event: &RawEvent,
        rule_names: &[String],
    ) {
        let data = project.categories.entry(category).or_default();
        data.items.push(CategoryItem {
            component_name: event.component_name.clone(),
            component_version: event.component_version.clone(),
            rule_names: rule_names.to_vec(),
        });
        data.add_rule_names(rule_names);
    }

    /// Cancellation-by-component-version-key: remove the open
    /// `PolicyViolation` item matching this event's component version.
    /// Returns false when there is no open entry to reconcile against.
    fn cancel_open_violation(project: &mut ProjectData, event: &RawEvent) -> bool {
        let Some(open) = project.categories.get_mut(&CategoryTag::PolicyViolation) else {
            return false;
        };
        let Some(pos) = open.items.iter().position(|item| {
            item.component_name == event.component_name
                && item.component_version == event.component_version
        }) else {
            return false;
        };

        open.items.remove(pos);
        open.rebuild_rule_names();
        if open.is_empty() {
            project.categories.remove(&CategoryTag::PolicyViolation);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::event::{
        RawEvent, VulnRef, VulnerabilityDeltas, EVENT_TYPE_POLICY_OVERRIDE,
        EVENT_TYPE_RULE_VIOLATION, EVENT_TYPE_RULE_VIOLATION_CLEARED, EVENT_TYPE_VULNERABILITY,
    };

    fn violation(project: &str, component: &str, rule: &str, secs: i64) -> RawEvent {
        RawEvent::new(
            EVENT_TYPE_RULE_VIOLATION,
            project,
            "1.0.0",
            component,
            "2.0.0",
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
        .with_rule_refs(vec![format!("rules/{rule}")])
    }

    fn vulnerability(project: &str, component: &str, added: Vec<VulnRef>, secs: i64) -> RawEvent {
        RawEvent::new(
            EVENT_TYPE_VULNERABILITY,
            project,
            "1.0.0",
            component,
            "2.0.0",
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
        .with_deltas(VulnerabilityDeltas {
            added,
            updated: Vec::new(),
            removed: Vec::new(),
        })
    }

    #[test]
    fn two_projects_three_events() {
        let mut set = ProjectDataSet::new();
        set.merge(
            CategoryTag::PolicyViolation,
            &violation("ProjectA", "openssl", "ruleX", 1),
            &["ruleX".to_string()],
        );
        set.merge(
            CategoryTag::Vulnerability,
            &vulnerability(
                "ProjectA",
                "openssl",
                vec![VulnRef::new("CVE-1", Severity::High)],
                2,
            ),
            &[],
        );
        set.merge(
            CategoryTag::PolicyViolation,
            &violation("ProjectB", "zlib", "ruleY", 3),
            &["ruleY".to_string()],
        );

        let projects = set.into_sorted_vec();
        assert_eq!(projects.len(), 2);

        let a = &projects[0];
        assert_eq!(a.project_name, "ProjectA");
        assert_eq!(a.categories.len(), 2);
        assert_eq!(a.category_count(CategoryTag::PolicyViolation), 1);
        assert_eq!(
            a.categories[&CategoryTag::PolicyViolation].rule_names,
            vec!["ruleX"]
        );
        assert_eq!(
            a.categories[&CategoryTag::Vulnerability].severity_counts().high,
            1
        );

        let b = &projects[1];
        assert_eq!(b.project_name, "ProjectB");
        assert_eq!(b.categories.len(), 1);
        assert_eq!(
            b.categories[&CategoryTag::PolicyViolation].rule_names,
            vec!["ruleY"]
        );
    }

    #[test]
    fn cleared_removes_matching_open_violation() {
        let mut set = ProjectDataSet::new();
        set.merge(
            CategoryTag::PolicyViolation,
            &violation("ProjectA", "openssl", "ruleX", 1),
            &["ruleX".to_string()],
        );
        let cleared = RawEvent::new(
            EVENT_TYPE_RULE_VIOLATION_CLEARED,
            "ProjectA",
            "1.0.0",
            "openssl",
            "2.0.0",
            Utc.timestamp_opt(2, 0).unwrap(),
        );
        set.merge(CategoryTag::PolicyViolationCleared, &cleared, &[]);

        // The only open entry was cancelled, so the whole project drops out.
        assert!(set.into_sorted_vec().is_empty());
    }

    #[test]
    fn cleared_without_open_violation_records_own_category() {
        let mut set = ProjectDataSet::new();
        let cleared = RawEvent::new(
            EVENT_TYPE_RULE_VIOLATION_CLEARED,
            "ProjectA",
            "1.0.0",
            "openssl",
            "2.0.0",
            Utc.timestamp_opt(1, 0).unwrap(),
        );
        set.merge(CategoryTag::PolicyViolationCleared, &cleared, &[]);

        let projects = set.into_sorted_vec();
        assert_eq!(projects.len(), 1);
        assert_eq!(
            projects[0].category_count(CategoryTag::PolicyViolationCleared),
            1
        );
    }

    #[test]
    fn override_cancels_only_matching_component_version() {
        let mut set = ProjectDataSet::new();
        set.merge(
            CategoryTag::PolicyViolation,
            &violation("ProjectA", "openssl", "ruleX", 1),
            &["ruleX".to_string()],
        );
        set.merge(
            CategoryTag::PolicyViolation,
            &violation("ProjectA", "zlib", "ruleY", 2),
            &["ruleY".to_string()],
        );
        let overridden = RawEvent::new(
            EVENT_TYPE_POLICY_OVERRIDE,
            "ProjectA",
            "1.0.0",
            "openssl",
            "2.0.0",
            Utc.timestamp_opt(3, 0).unwrap(),
        );
        set.merge(CategoryTag::PolicyViolationOverride, &overridden, &[]);

        let projects = set.into_sorted_vec();
        assert_eq!(projects.len(), 1);
        let data = &projects[0].categories[&CategoryTag::PolicyViolation];
        assert_eq!(data.count(), 1);
        assert_eq!(data.items[0].component_name, "zlib");
        // Rule names rebuilt from the surviving item only.
        assert_eq!(data.rule_names, vec!["ruleY"]);
    }

    #[test]
    fn rule_names_deduplicate_across_events() {
        let mut set = ProjectDataSet::new();
        set.merge(
            CategoryTag::PolicyViolation,
            &violation("ProjectA", "openssl", "ruleX", 1),
            &["ruleX".to_string()],
        );
        set.merge(
            CategoryTag::PolicyViolation,
            &violation("ProjectA", "zlib", "ruleX", 2),
            &["ruleX".to_string()],
        );

        let projects = set.into_sorted_vec();
        let data = &projects[0].categories[&CategoryTag::PolicyViolation];
        assert_eq!(data.count(), 2);
        assert_eq!(data.rule_names, vec!["ruleX"]);
    }

    #[test]
    fn removed_delta_retracts_added_vulnerability() {
        let mut set = ProjectDataSet::new();
        set.merge(
            CategoryTag::Vulnerability,
            &vulnerability(
                "ProjectA",
                "openssl",
                vec![
                    VulnRef::new("CVE-1", Severity::High),
                    VulnRef::new("CVE-2", Severity::Low),
                ],
                1,
            ),
            &[],
        );
        let retraction = RawEvent::new(
            EVENT_TYPE_VULNERABILITY,
            "ProjectA",
            "1.0.0",
            "openssl",
            "2.0.0",
            Utc.timestamp_opt(2, 0).unwrap(),
        )
        .with_deltas(VulnerabilityDeltas {
            added: Vec::new(),
            updated: Vec::new(),
            removed: vec![VulnRef::new("CVE-1", Severity::High)],
        });
        set.merge(CategoryTag::Vulnerability, &retraction, &[]);

        let projects = set.into_sorted_vec();
        let counts = projects[0].categories[&CategoryTag::Vulnerability].severity_counts();
        assert_eq!(counts.high, 0);
        assert_eq!(counts.low, 1);
    }

    #[test]
    fn project_keys_are_unique() {
        let mut set = ProjectDataSet::new();
        for i in 0..5 {
            set.merge(
                CategoryTag::PolicyViolation,
                &violation("ProjectA", "openssl", "ruleX", i),
                &["ruleX".to_string()],
            );
        }
        let projects = set.into_sorted_vec();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].category_count(CategoryTag::PolicyViolation), 5);
    }

    #[test]
    fn filter_categories_keeps_only_triggered() {
        let mut set = ProjectDataSet::new();
        set.merge(
            CategoryTag::PolicyViolation,
            &violation("ProjectA", "openssl", "ruleX", 1),
            &["ruleX".to_string()],
        );
        set.merge(
            CategoryTag::Vulnerability,
            &vulnerability(
                "ProjectA",
                "openssl",
                vec![VulnRef::new("CVE-1", Severity::High)],
                2,
            ),
            &[],
        );
        let project = set.into_sorted_vec().remove(0);

        let triggers: BTreeSet<CategoryTag> = [CategoryTag::Vulnerability].into_iter().collect();
        let filtered = project.filter_categories(&triggers).unwrap();
        assert_eq!(filtered.categories.len(), 1);
        assert!(filtered.categories.contains_key(&CategoryTag::Vulnerability));
    }

    #[test]
    fn empty_trigger_set_filters_out_everything() {
        let mut set = ProjectDataSet::new();
        set.merge(
            CategoryTag::PolicyViolation,
            &violation("ProjectA", "openssl", "ruleX", 1),
            &["ruleX".to_string()],
        );
        let project = set.into_sorted_vec().remove(0);

        assert!(project.filter_categories(&BTreeSet::new()).is_none());
    }
}
