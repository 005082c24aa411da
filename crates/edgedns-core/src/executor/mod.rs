//! DNS task executor
//!
//! The DnsTaskExecutor is responsible for:
//! - Electing itself for a tick through a durable TTL lock
//! - Draining every pending task from the TaskStore
//! - Reconciling provider records against the inventory
//! - Enqueuing follow-up tasks (cascades)
//!
//! ## Architecture
//!
//! ```text
//!   interval tick
//!        │
//!        ▼
//! ┌──────────────┐  lock(key, poll-1s)   ┌─────────────┐
//! │ DnsTask      │──────────────────────►│  LockStore  │
//! │ Executor     │                       └─────────────┘
//! └──────────────┘
//!        │ find_pending_tasks
//!        ▼
//! ┌─────────────┐   handler    ┌───────────┐   ┌────────────────┐
//! │  TaskStore  │─────────────►│ Inventory │──►│ CachedProvider │
//! └─────────────┘              └───────────┘   └────────────────┘
//!        ▲                                             │
//!        └──────────── cascade (create_*_task) ◄───────┘
//! ```
//!
//! ## Task Flow
//!
//! 1. Try the lock; if another process holds it, skip the tick
//! 2. Load all pending tasks
//! 3. Dispatch each task to its handler, sequentially
//! 4. Success deletes the task; a vanished zone (NotFound) discards it; any
//!    other error is recorded on the task, which is retried next tick

mod handlers;

use crate::cache::DomainRecordsCache;
use crate::config::ExecutorConfig;
use crate::error::{Error, Result};
use crate::registry::ProviderRegistry;
use crate::traits::{DnsTask, DnsTaskKind, Inventory, LockStore, TaskStore};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

/// Events emitted by the DnsTaskExecutor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorEvent {
    /// Executor started
    Started {
        poll_interval_secs: u64,
    },

    /// Another process holds the lock; nothing was processed
    TickSkipped {
        lock_key: String,
    },

    /// Task handled and deleted
    TaskDone {
        task_id: i64,
        kind: DnsTaskKind,
    },

    /// Task failed and stays pending
    TaskFailed {
        task_id: i64,
        kind: DnsTaskKind,
        error: String,
        attempts: u32,
    },

    /// Task deleted without success because its subject is gone
    TaskDiscarded {
        task_id: i64,
        kind: DnsTaskKind,
        reason: String,
    },

    /// A handler enqueued a follow-up task
    TaskCascaded {
        from_task_id: i64,
        task_id: i64,
        kind: DnsTaskKind,
    },

    /// Executor stopped
    Stopped {
        reason: String,
    },
}

/// Outcome counts of one tick that held the lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Tasks handled and deleted
    pub done: usize,
    /// Tasks left pending with an error
    pub failed: usize,
    /// Tasks deleted because their subject is gone
    pub discarded: usize,
}

/// The reconciliation control loop
///
/// ## Lifecycle
///
/// 1. Create with [`DnsTaskExecutor::new()`]
/// 2. Wrap in an `Arc` and start with [`DnsTaskExecutor::run()`]
/// 3. Executor runs until a shutdown signal is received; the in-flight tick
///    completes first
///
/// ## Threading
///
/// Each tick runs on its own spawned tokio task so a panicking handler only
/// loses that tick. Handlers within a tick run sequentially.
pub struct DnsTaskExecutor {
    /// Pending work
    task_store: Arc<dyn TaskStore>,

    /// Tick election
    lock_store: Arc<dyn LockStore>,

    /// Servers, nodes, clusters, domains and provider accounts
    inventory: Arc<dyn Inventory>,

    /// Provider backends by type code
    registry: Arc<ProviderRegistry>,

    /// Shared domain records cache
    cache: Arc<DomainRecordsCache>,

    config: ExecutorConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ExecutorEvent>,
}

impl DnsTaskExecutor {
    /// Create a new executor
    ///
    /// # Returns
    ///
    /// A tuple of (executor, event_receiver) where event_receiver yields
    /// executor events
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        lock_store: Arc<dyn LockStore>,
        inventory: Arc<dyn Inventory>,
        registry: Arc<ProviderRegistry>,
        cache: Arc<DomainRecordsCache>,
        config: ExecutorConfig,
    ) -> Result<(Self, mpsc::Receiver<ExecutorEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let executor = Self {
            task_store,
            lock_store,
            inventory,
            registry,
            cache,
            config,
            event_tx: tx,
        };

        Ok((executor, rx))
    }

    /// Executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run the executor until SIGINT
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the executor until `shutdown_rx` fires
    ///
    /// For embedding and tests. With `None` this behaves like [`run()`](Self::run).
    pub async fn run_with_shutdown(
        self: Arc<Self>,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(self: Arc<Self>, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        info!(
            "Executor started (poll every {}s, lock '{}')",
            self.config.poll_interval_secs, self.config.lock_key
        );
        self.emit_event(ExecutorEvent::Started {
            poll_interval_secs: self.config.poll_interval_secs,
        });

        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);

        let reason = if let Some(mut rx) = shutdown_rx {
            loop {
                tokio::select! {
                    Some(_) = ticks.next() => self.spawn_tick().await,
                    _ = &mut rx => break "Shutdown signal",
                }
            }
        } else {
            loop {
                tokio::select! {
                    Some(_) = ticks.next() => self.spawn_tick().await,
                    _ = tokio::signal::ctrl_c() => break "Shutdown signal",
                }
            }
        };

        info!("Executor stopped: {}", reason);
        self.emit_event(ExecutorEvent::Stopped {
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Run one tick on its own task and wait for it
    ///
    /// Errors and panics are logged and swallowed; the loop keeps going.
    async fn spawn_tick(self: &Arc<Self>) {
        let this = Arc::clone(self);
        match tokio::spawn(async move { this.run_once().await }).await {
            Ok(Ok(Some(summary))) => {
                if summary != TickSummary::default() {
                    debug!(
                        "Tick finished: {} done, {} failed, {} discarded",
                        summary.done, summary.failed, summary.discarded
                    );
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => error!("Tick failed: {}", e),
            Err(e) if e.is_panic() => error!("Tick panicked: {}", e),
            Err(e) => error!("Tick task was cancelled: {}", e),
        }
    }

    /// Run a single tick
    ///
    /// # Returns
    ///
    /// - `Ok(None)`: another process holds the lock, nothing was touched
    /// - `Ok(Some(summary))`: every pending task was attempted
    /// - `Err(Error)`: the lock or the task list could not be read
    pub async fn run_once(&self) -> Result<Option<TickSummary>> {
        if !self
            .lock_store
            .lock(&self.config.lock_key, self.config.lock_ttl_secs())
            .await?
        {
            debug!("Lock '{}' is held elsewhere, skipping tick", self.config.lock_key);
            self.emit_event(ExecutorEvent::TickSkipped {
                lock_key: self.config.lock_key.clone(),
            });
            return Ok(None);
        }

        let tasks = self.task_store.find_pending_tasks().await?;
        let mut summary = TickSummary::default();

        for task in tasks {
            debug!("Handling task {} {}", task.id, task.kind);

            match self.handle_task(&task).await {
                Ok(()) => {
                    self.finish_task(&task).await;
                    summary.done += 1;
                    self.emit_event(ExecutorEvent::TaskDone {
                        task_id: task.id,
                        kind: task.kind,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    warn!("Discarding task {} {}: {}", task.id, task.kind, e);
                    self.finish_task(&task).await;
                    summary.discarded += 1;
                    self.emit_event(ExecutorEvent::TaskDiscarded {
                        task_id: task.id,
                        kind: task.kind,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!("Task {} {} failed: {}", task.id, task.kind, message);
                    if let Err(store_err) = self.task_store.update_task_error(task.id, &message).await {
                        error!("Failed to record error on task {}: {}", task.id, store_err);
                    }
                    summary.failed += 1;
                    self.emit_event(ExecutorEvent::TaskFailed {
                        task_id: task.id,
                        kind: task.kind,
                        error: message,
                        attempts: task.attempts.saturating_add(1),
                    });
                }
            }
        }

        Ok(Some(summary))
    }

    /// Dispatch a task to its handler
    async fn handle_task(&self, task: &DnsTask) -> Result<()> {
        match task.kind {
            DnsTaskKind::ServerChange { server_id } => self.handle_server_change(task, server_id).await,
            DnsTaskKind::NodeChange { node_id } => self.handle_node_change(task, node_id).await,
            DnsTaskKind::ClusterChange { cluster_id } => {
                self.handle_cluster_change(task, cluster_id).await
            }
            DnsTaskKind::DomainChange { domain_id } => self.handle_domain_change(domain_id).await,
        }
    }

    /// Delete a finished task
    ///
    /// A failed delete only means the task runs again; handlers converge.
    async fn finish_task(&self, task: &DnsTask) {
        if let Err(e) = self.task_store.delete_task(task.id).await {
            error!("Failed to delete task {}: {}", task.id, e);
        }
    }

    /// Enqueue a follow-up task
    async fn cascade(&self, from: &DnsTask, kind: DnsTaskKind) -> Result<()> {
        let task_id = self
            .task_store
            .create_task(kind)
            .await
            .map_err(|e| Error::store(format!("Failed to enqueue {}: {}", kind, e)))?;
        debug!("Task {} cascaded to {} (task {})", from.id, kind, task_id);
        self.emit_event(ExecutorEvent::TaskCascaded {
            from_task_id: from.id,
            task_id,
            kind,
        });
        Ok(())
    }

    /// Emit an executor event
    fn emit_event(&self, event: ExecutorEvent) {
        // Send event, logging warning if channel is full (backpressure)
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
