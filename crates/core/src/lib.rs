//! Pure domain logic for the scanmail notification engine.
//!
//! This crate has zero internal dependencies so it can be used by the
//! engine crate, any future CLI tooling, and tests alike:
//!
//! - [`event`]: the raw security event model reported by the SCA service.
//! - [`category`]: the closed notification category enum and classifier.
//! - [`aggregate`]: per-project, per-category aggregation and merge rules.
//! - [`window`]: digest cadences and date-range math.
//! - [`subscriber`]: subscriber preference model and config-map parsing.

pub mod aggregate;
pub mod category;
pub mod error;
pub mod event;
pub mod subscriber;
pub mod window;

pub use aggregate::{CategoryData, ProjectData, ProjectDataSet};
pub use category::{classify, CategoryTag};
pub use error::CoreError;
pub use event::{RawEvent, Severity, VulnRef, VulnerabilityDeltas};
pub use subscriber::SubscriberPreference;
pub use window::{Cadence, DateRange};
