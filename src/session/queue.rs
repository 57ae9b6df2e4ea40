//! Per-backend queue positions.
//!
//! Each backend keeps a dense, 0-based order over its active set (tasks neither
//! completed nor being removed). New members join at the end.

use tokio::sync::oneshot;

use crate::error::Result;
use crate::types::{BackendKind, BackendMask, BatchOutcome, QueueOp, SessionEvent, TaskId, TaskSelection};

use super::{Envelope, Session, SessionState};

/// Queue order of both backends
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Queues {
    pub(crate) swarm: Vec<TaskId>,
    pub(crate) segmented: Vec<TaskId>,
}

impl Queues {
    pub(crate) fn of(&self, backend: BackendKind) -> &Vec<TaskId> {
        match backend {
            BackendKind::Swarm => &self.swarm,
            BackendKind::Segmented => &self.segmented,
        }
    }

    pub(crate) fn of_mut(&mut self, backend: BackendKind) -> &mut Vec<TaskId> {
        match backend {
            BackendKind::Swarm => &mut self.swarm,
            BackendKind::Segmented => &mut self.segmented,
        }
    }
}

/// Move `selected` within `queue` by `op`; returns whether the order changed
///
/// Ids absent from `queue` are ignored. The relative order of the selected ids is
/// preserved for every operation.
pub(crate) fn reorder(queue: &mut Vec<TaskId>, selected: &[TaskId], op: QueueOp) -> bool {
    let before = queue.clone();
    let is_selected = |id: &TaskId| selected.contains(id);

    match op {
        QueueOp::Top => {
            let (mut moved, rest): (Vec<_>, Vec<_>) = queue.drain(..).partition(is_selected);
            moved.extend(rest);
            *queue = moved;
        }
        QueueOp::Bottom => {
            let (moved, mut rest): (Vec<_>, Vec<_>) = queue.drain(..).partition(is_selected);
            rest.extend(moved);
            *queue = rest;
        }
        QueueOp::Increase => {
            for i in 1..queue.len() {
                if is_selected(&queue[i]) && !is_selected(&queue[i - 1]) {
                    queue.swap(i, i - 1);
                }
            }
        }
        QueueOp::Decrease => {
            for i in (0..queue.len().saturating_sub(1)).rev() {
                if is_selected(&queue[i]) && !is_selected(&queue[i + 1]) {
                    queue.swap(i, i + 1);
                }
            }
        }
    }

    *queue != before
}

impl SessionState {
    /// Bring queue membership of `id` in line with its state and renumber its backend
    pub(crate) fn sync_queue(&mut self, id: TaskId) {
        let backend = id.backend();
        let member = self
            .tasks
            .get(&id)
            .is_some_and(|task| task.state().in_active_set());
        let queue = self.queues.of_mut(backend);
        let present = queue.contains(&id);
        match (member, present) {
            (true, false) => queue.push(id),
            (false, true) => queue.retain(|other| *other != id),
            _ => return,
        }
        self.renumber(backend);
    }

    /// Write queue positions of `backend` back into its tasks
    pub(crate) fn renumber(&mut self, backend: BackendKind) {
        let Self { tasks, queues } = self;
        for (position, id) in queues.of(backend).iter().enumerate() {
            if let Some(task) = tasks.get_mut(id) {
                task.set_queue_position(Some(position));
            }
        }
        for task in tasks.values_mut() {
            if task.backend() == backend && !task.state().in_active_set() {
                task.set_queue_position(None);
            }
        }
    }

    /// Apply `op` to `ids`; returns the outcome and the backends whose order changed
    pub(crate) fn apply_reorder(
        &mut self,
        ids: &[TaskId],
        op: QueueOp,
    ) -> (BatchOutcome, Vec<BackendKind>) {
        let mut outcome = BatchOutcome::default();
        let mut changed = Vec::new();

        for id in ids {
            match self.tasks.get(id) {
                None => outcome.fail(*id, "task not found"),
                Some(task) if !task.state().in_active_set() => {
                    outcome.fail(*id, format!("task is {} and has no queue position", task.state()))
                }
                Some(_) => outcome.ok(*id),
            }
        }

        for backend in [BackendKind::Swarm, BackendKind::Segmented] {
            let selected: Vec<TaskId> = outcome
                .succeeded
                .iter()
                .filter(|id| id.backend() == backend)
                .copied()
                .collect();
            if selected.is_empty() {
                continue;
            }
            if reorder(self.queues.of_mut(backend), &selected, op) {
                self.renumber(backend);
                changed.push(backend);
            }
        }

        (outcome, changed)
    }
}

impl Session {
    /// Move the selected tasks within their backend's queue
    ///
    /// Tasks outside the active set are reported as failures; the rest move together,
    /// keeping their relative order.
    pub async fn set_queue_position(
        &self,
        selection: TaskSelection,
        mask: BackendMask,
        op: QueueOp,
    ) -> Result<BatchOutcome> {
        self.ensure_accepting()?;
        let (ids, mut outcome) = self.select(&selection, mask).await;

        let (reply, answer) = oneshot::channel();
        self.send(Envelope::Reorder { ids, op, reply })?;
        let applied = answer.await.map_err(|_| crate::Error::ShuttingDown)?;
        outcome.merge(applied);
        Ok(outcome)
    }

    /// Queue order of `backend`, first position first
    pub async fn queue_order(&self, backend: BackendKind) -> Vec<TaskId> {
        self.state.read().await.queues.of(backend).clone()
    }

    pub(crate) fn emit_reordered(&self, backends: &[BackendKind]) {
        for backend in backends {
            self.emit_event(SessionEvent::QueueReordered { backend: *backend });
        }
    }
}
