//! The drain task: the only writer of session state.
//!
//! Envelopes are applied one at a time under the state write lock. Effects produced by
//! a task while the lock was held run after it is released, still before the next
//! envelope is taken.

use tokio::sync::mpsc;

use crate::state::{CanonicalEvent, CanonicalState};
use crate::task::TaskEffect;
use crate::translator::swarm::translate_status;
use crate::types::{BackendKind, SessionEvent, TaskId};

use super::{Envelope, Mark, Session, SessionState};

/// What one envelope left for the effect phase
#[derive(Default)]
struct Applied {
    effects: Vec<(TaskId, TaskEffect)>,
    reordered: Vec<BackendKind>,
    registered: Option<(TaskId, String)>,
}

impl Session {
    /// Drain loop; exits once cancelled and every pending envelope was applied
    pub(crate) async fn run_drain(self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        tracing::debug!("Drain task started");
        loop {
            tokio::select! {
                biased;
                envelope = rx.recv() => match envelope {
                    Some(envelope) => self.process(envelope).await,
                    None => break,
                },
                _ = self.cancel.cancelled() => {
                    while let Ok(envelope) = rx.try_recv() {
                        self.process(envelope).await;
                    }
                    break;
                }
            }
        }
        tracing::debug!("Drain task stopped");
    }

    async fn process(&self, envelope: Envelope) {
        let applied = {
            let mut state = self.state.write().await;
            state.apply_envelope(envelope)
        };

        if let Some((id, name)) = applied.registered {
            self.emit_event(SessionEvent::TaskAdded { id, name });
        }
        self.emit_reordered(&applied.reordered);
        for (id, effect) in applied.effects {
            self.execute_effect(id, effect).await;
        }
    }

    async fn execute_effect(&self, id: TaskId, effect: TaskEffect) {
        match effect {
            TaskEffect::StateChanged { from, to } => {
                tracing::info!(task = %id, from = %from, to = %to, "Task state changed");
                self.emit_event(SessionEvent::StateChanged { id, from, to });
                if to == CanonicalState::Paused {
                    self.save_resume_logged(id).await;
                }
            }
            TaskEffect::Finished => {
                let completed_at = self
                    .state
                    .read()
                    .await
                    .tasks
                    .get(&id)
                    .and_then(|task| task.completed_at())
                    .unwrap_or_else(chrono::Utc::now);
                tracing::info!(task = %id, "Task finished");
                self.emit_event(SessionEvent::TaskFinished { id, completed_at });
                self.save_resume_logged(id).await;
            }
            TaskEffect::Recheck => {
                if let TaskId::Swarm(hash) = id
                    && let Err(e) = self.swarm.force_recheck(hash).await
                {
                    tracing::warn!(task = %id, error = %e, "Recheck after completion failed");
                }
            }
            TaskEffect::ReissueStop => {
                if let TaskId::Swarm(hash) = id {
                    tracing::debug!(task = %id, "Issuing pause held until metadata");
                    if let Err(e) = self.swarm.pause(hash).await {
                        tracing::warn!(task = %id, error = %e, "Deferred pause failed");
                    }
                }
            }
            TaskEffect::SaveResumeData => self.save_resume_logged(id).await,
            TaskEffect::StorageMoved(path) => {
                tracing::info!(task = %id, path = %path.display(), "Storage moved");
                self.emit_event(SessionEvent::StorageMoved { id, path });
            }
            TaskEffect::StorageMoveFailed(error) => {
                tracing::warn!(task = %id, error = %error, "Storage move failed");
                self.emit_event(SessionEvent::StorageMoveFailed { id, error });
            }
            TaskEffect::Removed => {
                if let Err(e) = self.db.delete_resume_record(&id).await {
                    tracing::warn!(task = %id, error = %e, "Failed to delete resume record");
                }
                tracing::info!(task = %id, "Task removed");
                self.emit_event(SessionEvent::TaskRemoved { id });
            }
        }
    }

    async fn save_resume_logged(&self, id: TaskId) {
        if let Err(e) = self.save_resume_data(id).await {
            tracing::warn!(task = %id, error = %e, "Failed to save resume data");
        }
    }
}

impl SessionState {
    fn apply_envelope(&mut self, envelope: Envelope) -> Applied {
        let mut applied = Applied::default();
        let touched = match envelope {
            Envelope::Event { id, event } => {
                self.apply_event(id, event);
                Some(id)
            }
            Envelope::SegmentedProgress { id, progress } => {
                let id = TaskId::Segmented(id);
                match self.tasks.get_mut(&id) {
                    Some(task) => task.record_segmented_progress(&progress),
                    None => tracing::debug!(task = %id, "Progress for unknown task dropped"),
                }
                None
            }
            Envelope::SwarmStatus { hash, status } => {
                let id = TaskId::Swarm(hash);
                let events = match self.tasks.get_mut(&id) {
                    Some(task) => task
                        .observe_swarm_status(&status)
                        .map(|previous| translate_status(previous, &status))
                        .unwrap_or_default(),
                    None => {
                        tracing::debug!(task = %id, "Status for unknown task dropped");
                        Vec::new()
                    }
                };
                for event in events {
                    self.apply_event(id, event);
                }
                Some(id)
            }
            Envelope::Register { task, reply } => {
                let id = task.id();
                let fresh = !self.tasks.contains_key(&id);
                if fresh {
                    applied.registered = Some((id, task.name().to_string()));
                    self.tasks.insert(id, *task);
                }
                reply.send(fresh).ok();
                Some(id)
            }
            Envelope::Discard { id } => {
                self.tasks.remove(&id);
                Some(id)
            }
            Envelope::Mark { id, mark, reply } => {
                let result = match self.tasks.get_mut(&id) {
                    None => Err("task not found".to_string()),
                    Some(task) => match mark {
                        Mark::RenameIssued => task.begin_rename(),
                        Mark::RenameAborted => {
                            task.abort_rename();
                            Ok(())
                        }
                        Mark::MoveIssued(target) => task.begin_move(target),
                        Mark::StopWhenReady => {
                            task.mark_stop_when_ready();
                            Ok(())
                        }
                        Mark::ClearStopWhenReady => {
                            task.clear_stop_when_ready();
                            Ok(())
                        }
                        Mark::ShareLimits {
                            ratio_limit,
                            seeding_time_limit,
                        } => {
                            task.set_share_limits(ratio_limit, seeding_time_limit);
                            Ok(())
                        }
                        Mark::Concurrency(connections) => {
                            task.set_concurrency(connections);
                            Ok(())
                        }
                    },
                };
                reply.send(result).ok();
                Some(id)
            }
            Envelope::Reorder { ids, op, reply } => {
                let (outcome, changed) = self.apply_reorder(&ids, op);
                applied.reordered = changed;
                reply.send(outcome).ok();
                None
            }
            Envelope::Flush(reply) => {
                reply.send(()).ok();
                None
            }
        };

        if let Some(id) = touched {
            applied.effects = self.collect_effects(id);
            self.sync_queue(id);
        }
        applied
    }

    fn apply_event(&mut self, id: TaskId, event: CanonicalEvent) {
        match self.tasks.get_mut(&id) {
            Some(task) => {
                task.apply(event);
            }
            None => {
                tracing::debug!(task = %id, event = event.name(), "Event for unknown task dropped")
            }
        }
    }

    /// Take the effects of `id`, finalizing the task if it entered `Removing`
    fn collect_effects(&mut self, id: TaskId) -> Vec<(TaskId, TaskEffect)> {
        let Some(task) = self.tasks.get_mut(&id) else {
            return Vec::new();
        };
        let mut effects = task.take_effects();
        if effects.contains(&TaskEffect::Removed) {
            if let Some(mut task) = self.tasks.remove(&id) {
                task.drain_all_triggers();
                effects.extend(task.take_effects());
            }
            // A dropped task is never persisted again; Removed runs last
            effects.retain(|effect| *effect != TaskEffect::SaveResumeData);
            if let Some(pos) = effects.iter().position(|e| *e == TaskEffect::Removed) {
                let removed = effects.remove(pos);
                effects.push(removed);
            }
        }
        effects.into_iter().map(|effect| (id, effect)).collect()
    }
}
