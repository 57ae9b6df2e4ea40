//! Read-side views: snapshots, lookup and filters.
//!
//! Every view copies what it needs under the read lock; nothing borrowed from the
//! session state outlives the call.

use crate::filter::{LabelLookup, NoLabels, TaskFilter};
use crate::task::TaskSnapshot;
use crate::types::{BackendMask, BatchOutcome, TaskId, TaskSelection};

use super::Session;

impl Session {
    /// Snapshot of every task, swarm tasks first, each backend in queue order
    ///
    /// Tasks without a queue position follow their backend's queued tasks, oldest first.
    pub async fn snapshot(&self) -> Vec<TaskSnapshot> {
        let mut all: Vec<TaskSnapshot> = self
            .state
            .read()
            .await
            .tasks
            .values()
            .map(|task| task.snapshot())
            .collect();
        all.sort_by(|a, b| {
            a.backend()
                .cmp(&b.backend())
                .then(
                    a.queue_position
                        .unwrap_or(usize::MAX)
                        .cmp(&b.queue_position.unwrap_or(usize::MAX)),
                )
                .then(a.added_at.cmp(&b.added_at))
                .then(a.id.cmp(&b.id))
        });
        all
    }

    /// Snapshot of one task
    pub async fn find(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.state
            .read()
            .await
            .tasks
            .get(&id)
            .map(|task| task.snapshot())
    }

    /// Task whose external reference string is `hash` (case-insensitive)
    pub async fn resolve(&self, hash: &str) -> Option<TaskId> {
        let hash = hash.trim();
        if let Ok(info_hash) = hash.parse::<crate::types::InfoHash>() {
            let id = TaskId::Swarm(info_hash);
            if self.state.read().await.tasks.contains_key(&id) {
                return Some(id);
            }
        }
        self.state
            .read()
            .await
            .tasks
            .values()
            .find(|task| task.hash_string().eq_ignore_ascii_case(hash))
            .map(|task| task.id())
    }

    /// Tasks matching `filter`, with no category or tag data
    pub async fn filter(&self, filter: &TaskFilter) -> Vec<TaskSnapshot> {
        self.filter_with_labels(filter, &NoLabels).await
    }

    /// Tasks matching `filter`, labels looked up in `labels`
    ///
    /// Subcategory matching is only honoured when enabled in the session config.
    pub async fn filter_with_labels(
        &self,
        filter: &TaskFilter,
        labels: &dyn LabelLookup,
    ) -> Vec<TaskSnapshot> {
        let mut filter = filter.clone();
        filter.subcategories &= self.config.session.subcategories_enabled;
        self.snapshot()
            .await
            .into_iter()
            .filter(|task| filter.matches(task, labels))
            .collect()
    }

    /// Registered ids selected by `selection` within `mask`
    ///
    /// Unknown explicit ids are returned as failures; ids outside the mask are skipped.
    pub(crate) async fn select(
        &self,
        selection: &TaskSelection,
        mask: BackendMask,
    ) -> (Vec<TaskId>, BatchOutcome) {
        let state = self.state.read().await;
        let mut outcome = BatchOutcome::default();
        let ids = match selection {
            TaskSelection::All => {
                let mut ids: Vec<TaskId> = state
                    .tasks
                    .keys()
                    .filter(|id| mask.contains(id.backend()))
                    .copied()
                    .collect();
                ids.sort();
                ids
            }
            TaskSelection::Ids(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                for id in ids {
                    if !mask.contains(id.backend()) || found.contains(id) {
                        continue;
                    }
                    if state.tasks.contains_key(id) {
                        found.push(*id);
                    } else {
                        outcome.fail(*id, "task not found");
                    }
                }
                found
            }
        };
        (ids, outcome)
    }
}
