//! The immediate dispatch path.
//!
//! [`NotificationDispatcher`] owns a bounded worker pool and the router
//! registry. Each submitted batch is classified, matched to its category's
//! transform, and run as an independent task; a failing task is logged at
//! the task boundary and never cancels or blocks sibling tasks or future
//! batches.
//!
//! Lifecycle: `Created → Initialized (init) → Running (start, after
//! attach_routers) → ShutDown`. The pool is an explicitly owned resource:
//! `init` builds it, `shutdown` drains in-flight tasks and releases it.

use std::sync::Arc;

use scanmail_core::{classify, RawEvent};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::router::{RouterContext, RouterRegistry};
use crate::sources::{EmailSender, SubscriberSource};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Created,
    Initialized,
    Running,
    ShutDown,
}

impl DispatcherState {
    fn name(&self) -> &'static str {
        match self {
            DispatcherState::Created => "Created",
            DispatcherState::Initialized => "Initialized",
            DispatcherState::Running => "Running",
            DispatcherState::ShutDown => "ShutDown",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid dispatcher state: {found}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },
}

// ---------------------------------------------------------------------------
// NotificationDispatcher
// ---------------------------------------------------------------------------

struct WorkerPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

/// Routes incoming event batches onto a bounded worker pool.
pub struct NotificationDispatcher {
    state: DispatcherState,
    registry: RouterRegistry,
    subscribers: Arc<dyn SubscriberSource>,
    sender: Arc<dyn EmailSender>,
    server_url: String,
    pool: Option<WorkerPool>,
}

impl NotificationDispatcher {
    pub fn new(
        subscribers: Arc<dyn SubscriberSource>,
        sender: Arc<dyn EmailSender>,
        server_url: impl Into<String>,
    ) -> Self {
        Self {
            state: DispatcherState::Created,
            registry: RouterRegistry::new(),
            subscribers,
            sender,
            server_url: server_url.into(),
            pool: None,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Prepare the worker pool, sized to the host core count.
    pub fn init(&mut self) -> Result<(), DispatchError> {
        self.expect_state(DispatcherState::Created)?;
        let workers = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1);
        self.pool = Some(WorkerPool {
            permits: Arc::new(Semaphore::new(workers)),
            tasks: JoinSet::new(),
        });
        self.state = DispatcherState::Initialized;
        tracing::info!(workers, "Notification dispatcher initialized");
        Ok(())
    }

    /// Populate the tag → router table. Idempotent; a re-registration
    /// replaces the prior entry for that tag.
    pub fn attach_routers(&mut self, registry: RouterRegistry) -> Result<(), DispatchError> {
        if self.state != DispatcherState::Initialized && self.state != DispatcherState::Running {
            return Err(DispatchError::InvalidState {
                expected: "Initialized",
                found: self.state.name(),
            });
        }
        self.registry.merge(registry);
        Ok(())
    }

    /// Begin accepting event batches.
    pub fn start(&mut self) -> Result<(), DispatchError> {
        self.expect_state(DispatcherState::Initialized)?;
        if self.registry.is_empty() {
            tracing::warn!("Dispatcher started with no routers attached, all batches will drop");
        }
        self.state = DispatcherState::Running;
        Ok(())
    }

    /// Submit one homogeneous event batch for routing.
    ///
    /// Unroutable batches (empty, unrecognized subtype, no registered
    /// router) are logged and dropped; only a lifecycle misuse is an error
    /// to the caller. Everything that touches a collaborator, including the
    /// subscriber fetch, runs inside the spawned task so a stalled remote
    /// call occupies only its own pool slot and never blocks intake.
    pub async fn submit(&mut self, batch: Vec<RawEvent>) -> Result<(), DispatchError> {
        self.expect_state(DispatcherState::Running)?;
        self.reap_finished();

        let Some(first) = batch.first() else {
            tracing::warn!("Dropping empty event batch");
            return Ok(());
        };
        let category = match classify(first) {
            Ok(category) => category,
            Err(error) => {
                tracing::warn!(%error, "Dropping batch with unrecognized event type");
                return Ok(());
            }
        };
        let Some(router) = self.registry.get(category) else {
            tracing::warn!(category = %category, "No router registered for category, dropping batch");
            return Ok(());
        };

        let pool = self.pool.as_mut().ok_or(DispatchError::InvalidState {
            expected: "Running",
            found: "Created",
        })?;
        let permits = Arc::clone(&pool.permits);
        let subscribers = Arc::clone(&self.subscribers);
        let sender = Arc::clone(&self.sender);
        let server_url = self.server_url.clone();
        pool.tasks.spawn(async move {
            // Bound concurrency to the pool size; the permit is held for
            // the task's whole lifetime.
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let subscribers = match subscribers.list_subscribers().await {
                Ok(subscribers) => subscribers,
                Err(error) => {
                    tracing::error!(%error, category = %category, "Could not list subscribers, dropping batch");
                    return;
                }
            };
            let ctx = RouterContext {
                subscribers,
                server_url,
            };
            match router(&ctx, &batch) {
                Ok(payload) if payload.is_noop() => {
                    tracing::debug!(category = %category, "No matching subscribers for batch");
                }
                Ok(payload) => {
                    if let Err(error) = sender.send(&payload).await {
                        tracing::error!(%error, category = %category, "Failed to send notification email");
                    }
                }
                Err(error) => {
                    tracing::error!(%error, category = %category, "Router task failed");
                }
            }
        });
        Ok(())
    }

    /// Stop accepting batches, drain in-flight tasks, release the pool.
    pub async fn shutdown(&mut self) {
        self.state = DispatcherState::ShutDown;
        if let Some(mut pool) = self.pool.take() {
            while let Some(joined) = pool.tasks.join_next().await {
                if let Err(error) = joined {
                    tracing::error!(%error, "Router task panicked");
                }
            }
        }
        tracing::info!("Notification dispatcher shut down");
    }

    /// Log any already-finished task that panicked, without blocking.
    fn reap_finished(&mut self) {
        if let Some(pool) = self.pool.as_mut() {
            while let Some(joined) = pool.tasks.try_join_next() {
                if let Err(error) = joined {
                    tracing::error!(%error, "Router task panicked");
                }
            }
        }
    }

    fn expect_state(&self, expected: DispatcherState) -> Result<(), DispatchError> {
        if self.state != expected {
            return Err(DispatchError::InvalidState {
                expected: expected.name(),
                found: self.state.name(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
