//! Resume-record saving and restore.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::engine::SwarmAddParams;
use crate::error::{Error, Result};
use crate::state::CanonicalState;
use crate::task::{ResumeRecord, SwarmOptions, TaskHandle};
use crate::types::{BatchOutcome, SessionEvent, TaskId};

use super::{Envelope, Session};

impl Session {
    /// Write the resume record of `id`
    ///
    /// Swarm tasks ask the engine for native resume data first; when it has none (no
    /// metadata yet) a dummy record carrying the magnet link is written instead.
    pub async fn save_resume_data(&self, id: TaskId) -> Result<()> {
        let native = match id {
            TaskId::Swarm(hash) => match self.swarm.request_resume_data(hash).await {
                Ok(native) => native,
                Err(e) => {
                    tracing::debug!(task = %id, error = %e, "No native resume data, saving dummy record");
                    None
                }
            },
            TaskId::Segmented(_) => None,
        };

        // The read guard is held across the write so the drain cannot remove the task
        // and delete its record in between.
        let state = self.state.read().await;
        let task = state
            .tasks
            .get(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if task.state() == CanonicalState::Removing {
            return Ok(());
        }
        let record = task.resume_record(native);
        self.db.save_resume_record(&record).await?;
        drop(state);

        tracing::debug!(task = %id, dummy = record.is_dummy(), "Resume data saved");
        self.emit_event(SessionEvent::ResumeDataSaved { id });
        Ok(())
    }

    /// Write the resume record of every task
    pub async fn save_all_resume_data(&self) -> BatchOutcome {
        let ids: Vec<TaskId> = self.state.read().await.tasks.keys().copied().collect();
        let mut outcome = BatchOutcome::default();
        for id in ids {
            match self.save_resume_data(id).await {
                Ok(()) => outcome.ok(id),
                Err(e) => outcome.fail(id, e),
            }
        }
        outcome
    }

    /// Re-add every persisted task to its engine and register it
    ///
    /// Tasks come back in their saved queue order. Returns how many were restored;
    /// a record its engine refuses is logged and kept for the next start.
    pub async fn restore(&self) -> Result<usize> {
        let mut records = self.db.load_resume_records().await?;
        records.sort_by_key(|record| (record.queue_position.unwrap_or(usize::MAX), record.added_at));

        let mut restored = 0;
        for record in records {
            if self.find(record.id).await.is_some() {
                continue;
            }
            if let TaskId::Segmented(sid) = record.id {
                self.next_segmented_id
                    .fetch_max(sid.get() + 1, Ordering::SeqCst);
            }
            match self.restore_one(&record).await {
                Ok(()) => restored += 1,
                Err(e) => tracing::warn!(task = %record.id, error = %e, "Failed to restore task"),
            }
        }
        Ok(restored)
    }

    async fn restore_one(&self, record: &ResumeRecord) -> Result<()> {
        let options = SwarmOptions::from_config(&self.config.swarm, &self.config.session);
        let task = TaskHandle::from_record(
            record,
            options,
            self.config.segmented.default_concurrency,
        );
        let was_active = matches!(
            record.state,
            CanonicalState::Downloading | CanonicalState::Queued | CanonicalState::Checking
        );

        match record.id {
            TaskId::Swarm(hash) => {
                let params = SwarmAddParams {
                    source: task.descriptor().url().to_string(),
                    info_hash: Some(hash),
                    name: record.display_name.clone(),
                    save_path: record.save_path.clone(),
                    paused: task.state() == CanonicalState::Paused,
                    auto_managed: options.auto_managed,
                    ratio_limit: record.ratio_limit,
                    seeding_time_limit: record.seeding_time_limit,
                    resume_data: record.native.clone(),
                };
                self.register(task).await?;
                match self.swarm.add(params).await {
                    Ok(added) if added == hash => Ok(()),
                    Ok(added) => {
                        tracing::warn!(task = %record.id, engine_hash = %added, "Engine restored a different info-hash");
                        Ok(())
                    }
                    Err(e) => {
                        self.send(Envelope::Discard { id: record.id })?;
                        Err(e.into())
                    }
                }
            }
            TaskId::Segmented(sid) => {
                let mut request =
                    self.segmented_request(task.descriptor(), record.save_path.clone(), !was_active);
                request.concurrency = record.concurrency.unwrap_or(request.concurrency);
                self.register(task).await?;
                if let Err(e) = self.segmented.submit(sid, request).await {
                    self.send(Envelope::Discard { id: record.id })?;
                    return Err(e.into());
                }
                Ok(())
            }
        }
    }

    /// Periodic save of every resume record until cancelled
    pub(crate) async fn run_resume_saver(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.save_all_resume_data().await;
                    tracing::debug!(saved = outcome.succeeded.len(), failed = outcome.failed.len(), "Periodic resume save");
                }
                _ = self.cancel.cancelled() => break,
            }
        }
    }
}
