//! The scanmail notification engine.
//!
//! Turns security events fetched from an external SCA service into
//! per-subscriber email payloads, in two delivery modes:
//!
//! - [`NotificationDispatcher`]: immediate path: a batch of same-category
//!   events becomes one email via the category's registered router.
//! - [`DigestRunner`]: scheduled path: all events in a cadence window are
//!   aggregated by [`NotificationProcessor`], filtered per subscriber, and
//!   sent as one summary email each.
//!
//! External collaborators (event fetch, subscriber config, detail lookup,
//! email transport) sit behind the traits in [`sources`]; the concrete
//! [`SmtpSender`] lives in [`delivery`].

pub mod delivery;
pub mod digest;
pub mod dispatcher;
pub mod payload;
pub mod processor;
pub mod router;
pub mod sources;

pub use delivery::email::{EmailConfig, SmtpSender};
pub use digest::{DigestOutcome, DigestRunner};
pub use dispatcher::{DispatchError, DispatcherState, NotificationDispatcher};
pub use payload::EmailPayload;
pub use processor::NotificationProcessor;
pub use router::{RouterContext, RouterError, RouterRegistry};
pub use sources::{DetailResolver, EmailSender, EventSource, SendError, SourceError, SubscriberSource};
