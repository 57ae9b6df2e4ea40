//! Task control: pause, resume, remove, move and per-task engine commands.
//!
//! Control calls only forward commands; the resulting state arrives later through the
//! engines' notifications. Bookkeeping that must precede an engine command (pending
//! renames and moves, held pauses) is recorded through the drain task first, so it is
//! ordered before any notification the command provokes.

use std::path::{Path, PathBuf};

use crate::engine::RateLimits;
use crate::error::{Error, Result};
use crate::state::CanonicalEvent;
use crate::translator::{PauseDirective, swarm::pause_directive};
use crate::types::{
    BackendKind, BackendMask, BatchOutcome, InfoHash, ResumeMode, SegmentedId, TaskId,
    TaskSelection,
};

use super::{Mark, Session};

fn not_supported(operation: &str, backend: BackendKind) -> Error {
    Error::NotSupported {
        operation: operation.to_string(),
        backend: backend.to_string(),
    }
}

impl Session {
    /// Pause the selected tasks
    ///
    /// A swarm task still fetching metadata outside the engine queue is not stopped
    /// right away: the pause is held and issued once metadata arrives.
    pub async fn pause(&self, selection: TaskSelection, mask: BackendMask) -> Result<BatchOutcome> {
        self.ensure_accepting()?;
        let (ids, mut outcome) = self.select(&selection, mask).await;

        for id in ids {
            let result = match id {
                TaskId::Swarm(hash) => self.pause_swarm(hash).await,
                TaskId::Segmented(sid) => self.segmented.stop(sid).await.map_err(|e| e.to_string()),
            };
            record(&mut outcome, id, "pause", result);
        }
        Ok(outcome)
    }

    async fn pause_swarm(&self, hash: InfoHash) -> std::result::Result<(), String> {
        let id = TaskId::Swarm(hash);
        let directive = {
            let state = self.state.read().await;
            let swarm = state
                .tasks
                .get(&id)
                .and_then(|task| task.swarm_extras())
                .ok_or_else(|| "task not found".to_string())?;
            pause_directive(swarm.native_state, swarm.auto_managed)
        };
        match directive {
            PauseDirective::DeferUntilMetadata => {
                tracing::debug!(task = %id, "Holding pause until metadata arrives");
                self.mark(id, Mark::StopWhenReady).await
            }
            PauseDirective::Issue => self.swarm.pause(hash).await.map_err(|e| e.to_string()),
        }
    }

    /// Resume the selected tasks
    pub async fn resume(
        &self,
        selection: TaskSelection,
        mask: BackendMask,
        mode: ResumeMode,
    ) -> Result<BatchOutcome> {
        self.ensure_accepting()?;
        let (ids, mut outcome) = self.select(&selection, mask).await;

        for id in ids {
            let result = match id {
                TaskId::Swarm(hash) => match self.mark(id, Mark::ClearStopWhenReady).await {
                    Ok(()) => self
                        .swarm
                        .resume(hash, mode)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e),
                },
                TaskId::Segmented(sid) => self.segmented.start(sid).await.map_err(|e| e.to_string()),
            };
            record(&mut outcome, id, "resume", result);
        }
        Ok(outcome)
    }

    /// Remove the selected tasks, optionally deleting their data
    ///
    /// Segmented tasks are removed in batches of at most the engine's
    /// [`max_batch_size`](crate::engine::SegmentedEngine::max_batch_size). A rejected
    /// batch fails each of its members; other batches still run.
    pub async fn remove(
        &self,
        selection: TaskSelection,
        mask: BackendMask,
        delete_files: bool,
    ) -> Result<BatchOutcome> {
        self.ensure_accepting()?;
        let (ids, mut outcome) = self.select(&selection, mask).await;

        let mut segmented_ids = Vec::new();
        for id in ids {
            match id {
                TaskId::Swarm(hash) => {
                    let result = self
                        .swarm
                        .remove(hash, delete_files)
                        .await
                        .map_err(|e| e.to_string());
                    record(&mut outcome, id, "remove", result);
                }
                TaskId::Segmented(sid) => segmented_ids.push(sid),
            }
        }

        let batch_size = self.segmented.max_batch_size().max(1);
        for chunk in segmented_ids.chunks(batch_size) {
            let result = match chunk {
                [single] => self.segmented.remove(*single, delete_files).await,
                many => self.segmented.remove_batch(many, delete_files).await,
            };
            match result {
                Ok(()) => chunk.iter().for_each(|sid| outcome.ok(TaskId::Segmented(*sid))),
                Err(e) => {
                    tracing::warn!(count = chunk.len(), error = %e, "Segmented batch removal rejected");
                    chunk
                        .iter()
                        .for_each(|sid| outcome.fail(TaskId::Segmented(*sid), &e));
                }
            }
        }
        Ok(outcome)
    }

    /// Move the data of the selected swarm tasks to `path`
    ///
    /// Segmented tasks fail with "not supported". A task already moving fails; the
    /// move it is running is untouched.
    pub async fn move_storage(
        &self,
        selection: TaskSelection,
        mask: BackendMask,
        path: impl AsRef<Path>,
    ) -> Result<BatchOutcome> {
        self.ensure_accepting()?;
        let path = path.as_ref();
        let (ids, mut outcome) = self.select(&selection, mask).await;

        for id in ids {
            let result = match id {
                TaskId::Swarm(hash) => self.move_swarm(hash, path.to_path_buf()).await,
                TaskId::Segmented(_) => {
                    Err(not_supported("move_storage", BackendKind::Segmented).to_string())
                }
            };
            record(&mut outcome, id, "move_storage", result);
        }
        Ok(outcome)
    }

    async fn move_swarm(&self, hash: InfoHash, path: PathBuf) -> std::result::Result<(), String> {
        let id = TaskId::Swarm(hash);
        self.mark(id, Mark::MoveIssued(path.clone())).await?;
        if let Err(e) = self.swarm.move_storage(hash, &path).await {
            // The engine will never report on this move; settle it here
            let event = CanonicalEvent::StorageMoveFinished {
                ok: false,
                new_path: None,
                error: Some(e.to_string()),
            };
            self.ingest_event(id, event).map_err(|e| e.to_string())?;
            return Err(e.to_string());
        }
        Ok(())
    }

    /// Rename file `index` of a swarm task
    pub async fn rename_file(&self, id: TaskId, index: usize, new_name: &str) -> Result<()> {
        self.ensure_accepting()?;
        let hash = swarm_hash(id, "rename_file")?;
        self.mark(id, Mark::RenameIssued).await.map_err(Error::Other)?;
        if let Err(e) = self.swarm.rename_file(hash, index, new_name).await {
            self.mark(id, Mark::RenameAborted).await.map_err(Error::Other)?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Set per-file priorities of a swarm task
    pub async fn prioritize_files(&self, id: TaskId, priorities: &[u8]) -> Result<()> {
        self.ensure_accepting()?;
        let hash = swarm_hash(id, "prioritize_files")?;
        self.require(id).await?;
        Ok(self.swarm.prioritize_files(hash, priorities).await?)
    }

    /// Apply transfer limits to a swarm task
    pub async fn set_rate_limits(&self, id: TaskId, limits: RateLimits) -> Result<()> {
        self.ensure_accepting()?;
        let hash = swarm_hash(id, "set_rate_limits")?;
        self.require(id).await?;
        Ok(self.swarm.set_rate_limits(hash, limits).await?)
    }

    /// Re-verify the data of the selected swarm tasks
    pub async fn force_recheck(
        &self,
        selection: TaskSelection,
        mask: BackendMask,
    ) -> Result<BatchOutcome> {
        self.ensure_accepting()?;
        let (ids, mut outcome) = self.select(&selection, mask).await;
        for id in ids {
            let result = match id {
                TaskId::Swarm(hash) => self.swarm.force_recheck(hash).await.map_err(|e| e.to_string()),
                TaskId::Segmented(_) => {
                    Err(not_supported("force_recheck", BackendKind::Segmented).to_string())
                }
            };
            record(&mut outcome, id, "force_recheck", result);
        }
        Ok(outcome)
    }

    /// Announce the selected swarm tasks to their trackers now
    pub async fn force_reannounce(
        &self,
        selection: TaskSelection,
        mask: BackendMask,
    ) -> Result<BatchOutcome> {
        self.ensure_accepting()?;
        let (ids, mut outcome) = self.select(&selection, mask).await;
        for id in ids {
            let result = match id {
                TaskId::Swarm(hash) => self
                    .swarm
                    .force_reannounce(hash)
                    .await
                    .map_err(|e| e.to_string()),
                TaskId::Segmented(_) => {
                    Err(not_supported("force_reannounce", BackendKind::Segmented).to_string())
                }
            };
            record(&mut outcome, id, "force_reannounce", result);
        }
        Ok(outcome)
    }

    /// Change the connection count of the selected segmented tasks
    pub async fn set_download_concurrency(
        &self,
        selection: TaskSelection,
        mask: BackendMask,
        connections: u32,
    ) -> Result<BatchOutcome> {
        self.ensure_accepting()?;
        if connections == 0 {
            return Err(Error::Config {
                message: "connections must be at least 1".to_string(),
                key: Some("connections".to_string()),
            });
        }
        let (ids, mut outcome) = self.select(&selection, mask).await;
        for id in ids {
            let result = match id {
                TaskId::Segmented(sid) => self.apply_concurrency(sid, connections).await,
                TaskId::Swarm(_) => {
                    Err(not_supported("set_download_concurrency", BackendKind::Swarm).to_string())
                }
            };
            record(&mut outcome, id, "set_download_concurrency", result);
        }
        Ok(outcome)
    }

    async fn apply_concurrency(
        &self,
        sid: SegmentedId,
        connections: u32,
    ) -> std::result::Result<(), String> {
        self.segmented
            .set_concurrency(sid, connections)
            .await
            .map_err(|e| e.to_string())?;
        self.mark(TaskId::Segmented(sid), Mark::Concurrency(connections))
            .await
    }

    /// Set share limits of the selected swarm tasks
    ///
    /// Limits are kept on the task and in its resume record and are passed to the
    /// engine whenever the task is added to it.
    pub async fn set_share_limits(
        &self,
        selection: TaskSelection,
        mask: BackendMask,
        ratio_limit: f64,
        seeding_time_limit: i64,
    ) -> Result<BatchOutcome> {
        self.ensure_accepting()?;
        let (ids, mut outcome) = self.select(&selection, mask).await;
        for id in ids {
            let result = match id {
                TaskId::Swarm(_) => {
                    self.mark(
                        id,
                        Mark::ShareLimits {
                            ratio_limit,
                            seeding_time_limit,
                        },
                    )
                    .await
                }
                TaskId::Segmented(_) => {
                    Err(not_supported("set_share_limits", BackendKind::Segmented).to_string())
                }
            };
            record(&mut outcome, id, "set_share_limits", result);
        }
        Ok(outcome)
    }

    async fn require(&self, id: TaskId) -> Result<()> {
        if self.state.read().await.tasks.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::NotFound(id.to_string()))
        }
    }
}

fn swarm_hash(id: TaskId, operation: &str) -> Result<InfoHash> {
    match id {
        TaskId::Swarm(hash) => Ok(hash),
        TaskId::Segmented(_) => Err(not_supported(operation, BackendKind::Segmented)),
    }
}

fn record(
    outcome: &mut BatchOutcome,
    id: TaskId,
    operation: &str,
    result: std::result::Result<(), String>,
) {
    match result {
        Ok(()) => outcome.ok(id),
        Err(reason) => {
            tracing::warn!(task = %id, operation, error = %reason, "Task command failed");
            outcome.fail(id, reason);
        }
    }
}
