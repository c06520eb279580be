//! Change notifications published by the store.

use std::sync::Arc;

use crate::domain::{Assignee, PipelineStage, Space, SpaceId, Task};

/// What changed. Published after the mutation completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    SpaceCreated {
        space: Space,
    },
    SpaceUpdated {
        space: Space,
    },
    SpaceRemoved {
        space_id: SpaceId,
        removed_tasks: Vec<Task>,
    },
    TaskCreated {
        task: Task,
    },
    TaskMoved {
        task: Task,
        from: PipelineStage,
        to: PipelineStage,
    },
    TaskUpdated {
        task: Task,
    },
    TaskDeleted {
        task: Task,
    },
    AssigneeAdded {
        task: Task,
        assignee: Assignee,
    },
    AssigneeRemoved {
        task: Task,
        assignee: Assignee,
    },
    /// The remote id (and resolved identities) reached the optimistic record.
    TaskReconciled {
        task: Task,
    },
    /// An optimistic record was rolled back after its remote insert failed.
    TaskDiscarded {
        task: Task,
    },
}

impl StoreEvent {
    pub fn space_id(&self) -> SpaceId {
        match self {
            StoreEvent::SpaceCreated { space } | StoreEvent::SpaceUpdated { space } => space.id,
            StoreEvent::SpaceRemoved { space_id, .. } => *space_id,
            StoreEvent::TaskCreated { task }
            | StoreEvent::TaskMoved { task, .. }
            | StoreEvent::TaskUpdated { task }
            | StoreEvent::TaskDeleted { task }
            | StoreEvent::AssigneeAdded { task, .. }
            | StoreEvent::AssigneeRemoved { task, .. }
            | StoreEvent::TaskReconciled { task }
            | StoreEvent::TaskDiscarded { task } => task.space_id,
        }
    }
}

/// Synchronous observer of store mutations.
///
/// Listeners run on the mutating caller's thread after the store lock has
/// been released, so they may read the store. No ordering between listeners
/// is guaranteed.
pub trait StoreListener: Send + Sync {
    fn on_event(&self, event: &StoreEvent);
}

impl<L: StoreListener + ?Sized> StoreListener for Arc<L> {
    fn on_event(&self, event: &StoreEvent) {
        (**self).on_event(event)
    }
}

/// Adapts a closure to [`StoreListener`].
pub struct FnListener<F>(pub F);

impl<F> StoreListener for FnListener<F>
where
    F: Fn(&StoreEvent) + Send + Sync,
{
    fn on_event(&self, event: &StoreEvent) {
        (self.0)(event)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);
