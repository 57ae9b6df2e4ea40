//! Session orchestrator split into focused submodules.
//!
//! The [`Session`] struct and its methods are organized by domain:
//! - [`drain`] - The single writer applying queued envelopes and their effects
//! - [`ingest`] - Engine notification entry points (callable from any thread)
//! - [`add`] - Registering new tasks with the engines
//! - [`control`] - Pause, resume, remove, move and per-task engine commands
//! - [`queue`] - Per-backend queue position arithmetic
//! - [`views`] - Snapshots, lookup and filtered views
//! - [`persistence`] - Resume-record saving and restore

mod add;
mod control;
mod drain;
mod ingest;
mod persistence;
mod queue;
mod views;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Database;
use crate::engine::{SegmentedEngine, SegmentedProgress, SwarmEngine, SwarmStatus};
use crate::error::{Error, Result};
use crate::state::CanonicalEvent;
use crate::task::TaskHandle;
use crate::types::{BatchOutcome, InfoHash, QueueOp, SegmentedId, SessionEvent, TaskId};

use queue::Queues;

/// Tasks of both backends plus their queue order
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) tasks: HashMap<TaskId, TaskHandle>,
    pub(crate) queues: Queues,
}

/// Bookkeeping a control call records on a task before issuing the engine command
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mark {
    RenameIssued,
    RenameAborted,
    MoveIssued(PathBuf),
    StopWhenReady,
    ClearStopWhenReady,
    ShareLimits {
        ratio_limit: f64,
        seeding_time_limit: i64,
    },
    Concurrency(u32),
}

/// Unit of work for the drain task
pub(crate) enum Envelope {
    /// Canonical event for one task
    Event { id: TaskId, event: CanonicalEvent },
    /// Segmented progress report
    SegmentedProgress {
        id: SegmentedId,
        progress: SegmentedProgress,
    },
    /// Swarm status report, translated against the previous one
    SwarmStatus { hash: InfoHash, status: SwarmStatus },
    /// New task; replies `false` when the identity is taken
    Register {
        task: Box<TaskHandle>,
        reply: oneshot::Sender<bool>,
    },
    /// Drop a task the engine refused, without removal effects
    Discard { id: TaskId },
    /// Control-path bookkeeping
    Mark {
        id: TaskId,
        mark: Mark,
        reply: oneshot::Sender<std::result::Result<(), String>>,
    },
    /// Queue reordering
    Reorder {
        ids: Vec<TaskId>,
        op: QueueOp,
        reply: oneshot::Sender<BatchOutcome>,
    },
    /// Resolves once every earlier envelope was applied
    Flush(oneshot::Sender<()>),
}

/// Background task handles, joined on shutdown
#[derive(Default)]
pub(crate) struct Workers {
    pub(crate) drain: Option<JoinHandle<()>>,
    pub(crate) resume_saver: Option<JoinHandle<()>>,
}

/// Orchestrator over the swarm and segmented engines (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Session {
    /// Database instance for resume records
    /// Public for integration tests to inspect persisted records
    pub db: Arc<Database>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Task collections, written only by the drain task
    pub(crate) state: Arc<RwLock<SessionState>>,
    /// Envelope queue feeding the drain task
    pub(crate) tx: mpsc::UnboundedSender<Envelope>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<SessionEvent>,
    /// Swarm engine commands
    pub(crate) swarm: Arc<dyn SwarmEngine>,
    /// Segmented engine commands
    pub(crate) segmented: Arc<dyn SegmentedEngine>,
    /// Next segmented id to allocate
    pub(crate) next_segmented_id: Arc<AtomicI64>,
    /// Cleared when shutdown starts
    pub(crate) accepting: Arc<AtomicBool>,
    /// Stops the background tasks
    pub(crate) cancel: CancellationToken,
    /// Background task handles
    pub(crate) workers: Arc<tokio::sync::Mutex<Workers>>,
}

impl Session {
    /// Create a session over the given engines
    ///
    /// Opens the resume-record database, spawns the drain task and the periodic resume
    /// saver, and restores every persisted task into the engines.
    pub async fn new(
        config: Config,
        swarm: Arc<dyn SwarmEngine>,
        segmented: Arc<dyn SegmentedEngine>,
    ) -> Result<Self> {
        config.validate()?;

        let db = Database::new(&config.persistence.database_path).await?;
        if db.was_unclean_shutdown().await? {
            tracing::warn!("Previous session did not shut down cleanly, resume data may be stale");
        }
        db.set_clean_start().await?;
        let next_id = db.next_segmented_id().await?.unwrap_or(1);

        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, _rx) = broadcast::channel(config.session.event_channel_capacity);

        let session = Self {
            db: Arc::new(db),
            config: Arc::new(config),
            state: Arc::new(RwLock::new(SessionState::default())),
            tx,
            event_tx,
            swarm,
            segmented,
            next_segmented_id: Arc::new(AtomicI64::new(next_id)),
            accepting: Arc::new(AtomicBool::new(true)),
            cancel: CancellationToken::new(),
            workers: Arc::new(tokio::sync::Mutex::new(Workers::default())),
        };

        let drain = tokio::spawn(session.clone().run_drain(rx));
        let resume_saver = session
            .config
            .persistence
            .resume_save_interval
            .map(|interval| tokio::spawn(session.clone().run_resume_saver(interval)));
        {
            let mut workers = session.workers.lock().await;
            workers.drain = Some(drain);
            workers.resume_saver = resume_saver;
        }

        let restored = session.restore().await?;
        tracing::info!(restored, "Session started");

        Ok(session)
    }

    /// Subscribe to session events
    ///
    /// Each subscriber receives every event independently. A subscriber that falls
    /// behind by more than `event_channel_capacity` events gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Session events as a `Stream`; lagged items are skipped
    pub fn event_stream(&self) -> impl futures::Stream<Item = SessionEvent> + use<> {
        use futures::StreamExt;

        tokio_stream::wrappers::BroadcastStream::new(self.event_tx.subscribe())
            .filter_map(|item| async move { item.ok() })
    }

    /// Get the current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// Events without subscribers are dropped.
    pub(crate) fn emit_event(&self, event: SessionEvent) {
        self.event_tx.send(event).ok();
    }

    /// Wait until every envelope enqueued before this call was applied
    ///
    /// Effects of those envelopes (engine commands, database writes, broadcasts) have
    /// completed by the time this resolves.
    pub async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.send(Envelope::Flush(reply))?;
        done.await.map_err(|_| Error::ShuttingDown)
    }

    /// Gracefully shut down the session
    ///
    /// Stops accepting commands, applies pending envelopes, saves every resume record,
    /// then stops the background tasks and marks the database cleanly closed.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Initiating graceful shutdown");

        if let Err(e) = self.flush().await {
            tracing::warn!(error = %e, "Could not flush pending envelopes");
        }
        let outcome = self.save_all_resume_data().await;
        if !outcome.all_succeeded() {
            tracing::warn!(failed = outcome.failed.len(), "Some resume records were not saved");
        }
        self.emit_event(SessionEvent::Shutdown);

        self.cancel.cancel();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in [workers.drain, workers.resume_saver].into_iter().flatten() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.db.set_next_segmented_id(self.next_segmented_id.load(Ordering::SeqCst))
            .await?;
        self.db.set_clean_shutdown().await?;
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has started
    pub fn is_shutting_down(&self) -> bool {
        !self.accepting.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }

    pub(crate) fn send(&self, envelope: Envelope) -> Result<()> {
        self.tx.send(envelope).map_err(|_| Error::ShuttingDown)
    }

    /// Record `mark` on task `id` through the drain task
    pub(crate) async fn mark(&self, id: TaskId, mark: Mark) -> std::result::Result<(), String> {
        let (reply, answer) = oneshot::channel();
        self.send(Envelope::Mark { id, mark, reply })
            .map_err(|e| e.to_string())?;
        answer
            .await
            .unwrap_or_else(|_| Err(Error::ShuttingDown.to_string()))
    }
}
