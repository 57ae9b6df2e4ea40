//! Registering new tasks with the session and their engine.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use tokio::sync::oneshot;

use crate::descriptor::{self, RequestDescriptor};
use crate::engine::{SegmentedRequest, SwarmAddParams};
use crate::error::{Error, Result};
use crate::task::{SwarmOptions, TaskHandle};
use crate::types::{BackendKind, SegmentedId, TaskId};
use crate::utils;

use super::{Envelope, Session};

impl Session {
    /// Add a download from a raw request string (`url [options...]`)
    ///
    /// Magnet links go to the swarm engine, everything else to the segmented engine.
    pub async fn add_url(&self, raw: &str, paused: bool) -> Result<TaskId> {
        let descriptor = descriptor::parse(raw);
        match descriptor.backend_kind() {
            BackendKind::Swarm => self.add_swarm(descriptor, paused).await,
            BackendKind::Segmented => self.add_segmented(descriptor, paused).await,
        }
    }

    /// Add a swarm task
    ///
    /// When the source names its info-hash the task is registered before the engine
    /// sees it, so no early notification is lost; otherwise it is registered under the
    /// hash the engine returns.
    pub async fn add_swarm(&self, descriptor: RequestDescriptor, paused: bool) -> Result<TaskId> {
        self.ensure_accepting()?;
        let options = SwarmOptions::from_config(&self.config.swarm, &self.config.session);
        let save_path = self.save_path_for(&descriptor);
        let expected = utils::info_hash_from_magnet(descriptor.url());

        let params = SwarmAddParams {
            source: descriptor.url().to_string(),
            info_hash: expected,
            name: descriptor.display_name().map(str::to_string),
            save_path: save_path.clone(),
            paused,
            auto_managed: options.auto_managed,
            ratio_limit: options.ratio_limit,
            seeding_time_limit: options.seeding_time_limit,
            resume_data: None,
        };

        let hash = match expected {
            Some(hash) => {
                let task = TaskHandle::swarm(hash, descriptor, save_path, options, paused);
                self.register(task).await?;
                if let Err(e) = self.swarm.add(params).await {
                    self.send(Envelope::Discard {
                        id: TaskId::Swarm(hash),
                    })?;
                    return Err(e.into());
                }
                hash
            }
            None => {
                let hash = self.swarm.add(params).await?;
                let task = TaskHandle::swarm(hash, descriptor, save_path, options, paused);
                self.register(task).await?;
                hash
            }
        };

        let id = TaskId::Swarm(hash);
        tracing::info!(task = %id, paused, "Swarm task added");
        self.persist_new(id).await;
        Ok(id)
    }

    /// Add a segmented task
    pub async fn add_segmented(
        &self,
        descriptor: RequestDescriptor,
        paused: bool,
    ) -> Result<TaskId> {
        self.ensure_accepting()?;
        let segmented_id = SegmentedId(self.next_segmented_id.fetch_add(1, Ordering::SeqCst));
        let id = TaskId::Segmented(segmented_id);
        let save_path = self.save_path_for(&descriptor);
        let request = self.segmented_request(&descriptor, save_path.clone(), paused);
        let task = TaskHandle::segmented(segmented_id, descriptor, save_path, request.concurrency);

        self.register(task).await?;
        if let Err(e) = self.segmented.submit(segmented_id, request).await {
            self.send(Envelope::Discard { id })?;
            return Err(e.into());
        }

        tracing::info!(task = %id, paused, "Segmented task added");
        if let Err(e) = self
            .db
            .set_next_segmented_id(self.next_segmented_id.load(Ordering::SeqCst))
            .await
        {
            tracing::warn!(error = %e, "Failed to persist segmented id counter");
        }
        self.persist_new(id).await;
        Ok(id)
    }

    /// Engine request for a segmented descriptor
    ///
    /// Configured default options sit under the request's own options. A `split` option
    /// overrides the configured connection count.
    pub(crate) fn segmented_request(
        &self,
        descriptor: &RequestDescriptor,
        save_path: PathBuf,
        paused: bool,
    ) -> SegmentedRequest {
        let mut options = self.config.segmented.default_options.clone();
        options.extend(
            descriptor
                .uri_options()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let concurrency = options
            .get("split")
            .and_then(|split| split.parse::<u32>().ok())
            .filter(|split| *split > 0)
            .unwrap_or(self.config.segmented.default_concurrency);

        SegmentedRequest {
            url: descriptor.url().to_string(),
            file_name: descriptor.derived_file_name().to_string(),
            save_path,
            headers: descriptor.headers().clone(),
            options,
            concurrency,
            paused,
        }
    }

    fn save_path_for(&self, descriptor: &RequestDescriptor) -> PathBuf {
        descriptor
            .save_path()
            .cloned()
            .unwrap_or_else(|| self.config.session.default_save_path.clone())
    }

    /// Hand `task` to the drain task; fails when its identity is taken
    pub(crate) async fn register(&self, task: TaskHandle) -> Result<()> {
        let id = task.id();
        let (reply, answer) = oneshot::channel();
        self.send(Envelope::Register {
            task: Box::new(task),
            reply,
        })?;
        if answer.await.map_err(|_| Error::ShuttingDown)? {
            Ok(())
        } else {
            Err(Error::AlreadyExists(id.to_string()))
        }
    }

    /// Write the first resume record of a new task
    async fn persist_new(&self, id: TaskId) {
        if let Err(e) = self.save_resume_data(id).await {
            tracing::warn!(task = %id, error = %e, "Failed to save initial resume record");
        }
    }
}
