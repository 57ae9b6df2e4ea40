//! Deferred work waiting for renames and moves to settle

use std::collections::VecDeque;

use super::TaskHandle;

/// Work deferred until the task has no pending rename and no move in progress
pub type Trigger = Box<dyn FnOnce(&mut TaskHandle) + Send + Sync>;

/// FIFO of [`Trigger`]s owned by a task
#[derive(Default)]
pub struct TriggerQueue {
    queue: VecDeque<Trigger>,
}

impl TriggerQueue {
    /// Append a trigger
    pub fn push(&mut self, trigger: Trigger) {
        self.queue.push_back(trigger);
    }

    /// Take the oldest trigger
    pub fn pop(&mut self) -> Option<Trigger> {
        self.queue.pop_front()
    }

    /// Number of waiting triggers
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl std::fmt::Debug for TriggerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerQueue")
            .field("len", &self.queue.len())
            .finish()
    }
}

impl TaskHandle {
    /// Whether no rename is pending and no move is in progress
    pub fn is_settled(&self) -> bool {
        !self.pending_move_in_progress && self.pending_rename_count == 0
    }

    /// Queue `work` to run once the task is settled
    ///
    /// Work queued while already settled still waits for the next
    /// [`fire_triggers_if_settled`](Self::fire_triggers_if_settled) call.
    pub fn defer(&mut self, work: impl FnOnce(&mut TaskHandle) + Send + Sync + 'static) {
        self.triggers.push(Box::new(work));
    }

    /// Run waiting triggers in FIFO order while the task stays settled
    ///
    /// A trigger that starts a new rename or move stops the drain; the rest wait for
    /// that operation. Returns the number of triggers run.
    pub fn fire_triggers_if_settled(&mut self) -> usize {
        let mut fired = 0;
        while self.is_settled()
            && let Some(trigger) = self.triggers.pop()
        {
            trigger(self);
            fired += 1;
        }
        fired
    }

    /// Run every waiting trigger regardless of pending operations
    ///
    /// Used when the task is being dropped.
    pub(crate) fn drain_all_triggers(&mut self) -> usize {
        let mut fired = 0;
        while let Some(trigger) = self.triggers.pop() {
            trigger(self);
            fired += 1;
        }
        fired
    }

    /// Number of triggers waiting
    pub fn pending_triggers(&self) -> usize {
        self.triggers.len()
    }
}
