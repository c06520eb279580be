//! TaskStore: the authoritative in-memory map of space -> pipeline.
//!
//! Design:
//! - One explicitly constructed instance, shared by `Arc` from the
//!   composition root. There is no process-wide hidden state.
//! - All mutations go through a single lock; the lock is never held while
//!   listeners run or across an `.await`.
//! - Every successful mutation publishes exactly one [`StoreEvent`], both to
//!   synchronous listeners and to the broadcast channel behind [`TaskStore::watch`].

mod events;
mod pipeline;

pub use events::{FnListener, ListenerId, StoreEvent, StoreListener};
pub use pipeline::Pipeline;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::{
    Assignee, BoardError, CorrelationId, PipelineStage, RemoteTaskId, Space, SpaceId, Task,
    TaskDraft, TaskId, TaskPatch,
};
use crate::ports::Clock;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How new task ids are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdAllocation {
    /// Per-space monotonic counter advanced under the store lock.
    #[default]
    Counter,
    /// `max(id of every task in every space) + 1`, computed from the current
    /// contents. Two reservations taken before either insert commits get the
    /// same id.
    MaxPlusOne,
}

struct Board {
    space: Space,
    pipeline: Pipeline,
    next_id: TaskId,
}

struct StoreState {
    boards: HashMap<SpaceId, Board>,
    allocation: IdAllocation,
}

impl StoreState {
    fn board(&self, space_id: SpaceId) -> Result<&Board, BoardError> {
        self.boards
            .get(&space_id)
            .ok_or_else(|| BoardError::not_found("space", space_id))
    }

    fn board_mut(&mut self, space_id: SpaceId) -> Result<&mut Board, BoardError> {
        self.boards
            .get_mut(&space_id)
            .ok_or_else(|| BoardError::not_found("space", space_id))
    }

    fn reserve_id(&mut self, space_id: SpaceId) -> Result<TaskId, BoardError> {
        match self.allocation {
            IdAllocation::Counter => {
                let board = self.board_mut(space_id)?;
                let id = board.next_id;
                board.next_id = id.next();
                Ok(id)
            }
            IdAllocation::MaxPlusOne => {
                self.board(space_id)?;
                let max = self
                    .boards
                    .values()
                    .filter_map(|b| b.pipeline.max_id())
                    .max();
                Ok(max.map_or(TaskId::new(1), TaskId::next))
            }
        }
    }
}

/// Authoritative in-memory store of every space's pipeline.
pub struct TaskStore {
    state: Mutex<StoreState>,
    listeners: Mutex<BTreeMap<ListenerId, Arc<dyn StoreListener>>>,
    next_listener: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
    clock: Arc<dyn Clock>,
}

impl TaskStore {
    pub fn new(allocation: IdAllocation, clock: Arc<dyn Clock>) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(StoreState {
                boards: HashMap::new(),
                allocation,
            }),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener: AtomicU64::new(1),
            events,
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================
    // Observation
    // ========================================

    /// Register a listener invoked synchronously after every mutation.
    pub fn subscribe(&self, listener: Arc<dyn StoreListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        id
    }

    pub fn subscribe_fn<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnListener(f)))
    }

    /// Returns whether the listener was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Async view of the same events. Dropping the receiver unsubscribes.
    pub fn watch(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener.on_event(&event);
        }
        if self.events.send(event).is_err() {
            debug!("no async store watchers");
        }
    }

    // ========================================
    // Spaces
    // ========================================

    pub fn create_space(&self, space: Space) -> Result<Space, BoardError> {
        let space = space.validate()?;
        {
            let mut state = self.state();
            if state.boards.contains_key(&space.id) {
                return Err(BoardError::Conflict(format!("space {} already exists", space.id)));
            }
            state.boards.insert(
                space.id,
                Board {
                    space: space.clone(),
                    pipeline: Pipeline::new(),
                    next_id: TaskId::new(1),
                },
            );
        }
        self.publish(StoreEvent::SpaceCreated {
            space: space.clone(),
        });
        Ok(space)
    }

    pub fn update_space(&self, space: Space) -> Result<Space, BoardError> {
        let space = space.validate()?;
        {
            let mut state = self.state();
            state.board_mut(space.id)?.space = space.clone();
        }
        self.publish(StoreEvent::SpaceUpdated {
            space: space.clone(),
        });
        Ok(space)
    }

    /// Drop a space and its whole pipeline. Other spaces are untouched.
    pub fn remove_space(&self, space_id: SpaceId) -> Result<Vec<Task>, BoardError> {
        let removed = {
            let mut state = self.state();
            let board = state
                .boards
                .remove(&space_id)
                .ok_or_else(|| BoardError::not_found("space", space_id))?;
            board.pipeline.tasks().cloned().collect::<Vec<_>>()
        };
        self.publish(StoreEvent::SpaceRemoved {
            space_id,
            removed_tasks: removed.clone(),
        });
        Ok(removed)
    }

    pub fn space(&self, space_id: SpaceId) -> Option<Space> {
        self.state().boards.get(&space_id).map(|b| b.space.clone())
    }

    pub fn spaces(&self) -> Vec<Space> {
        let mut spaces: Vec<_> = self.state().boards.values().map(|b| b.space.clone()).collect();
        spaces.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        spaces
    }

    // ========================================
    // Task mutations
    // ========================================

    /// Validate, allocate an id and append to `stage`.
    pub fn add_task(
        &self,
        space_id: SpaceId,
        stage: PipelineStage,
        draft: TaskDraft,
    ) -> Result<Task, BoardError> {
        self.add_correlated(space_id, stage, draft, None)
    }

    pub(crate) fn add_correlated(
        &self,
        space_id: SpaceId,
        stage: PipelineStage,
        draft: TaskDraft,
        correlation_id: Option<CorrelationId>,
    ) -> Result<Task, BoardError> {
        let draft = draft.validate()?;
        let task = {
            let mut state = self.state();
            let id = state.reserve_id(space_id)?;
            let task = self.build_task(space_id, stage, id, draft, correlation_id);
            state.board_mut(space_id)?.pipeline.push(task.clone());
            task
        };
        self.publish(StoreEvent::TaskCreated { task: task.clone() });
        Ok(task)
    }

    /// First half of a two-phase insert: choose an id without inserting.
    ///
    /// Under [`IdAllocation::MaxPlusOne`] nothing is recorded, so two
    /// reservations taken before either [`TaskStore::insert_reserved`]
    /// commits receive the same id.
    pub fn reserve_task_id(&self, space_id: SpaceId) -> Result<TaskId, BoardError> {
        self.state().reserve_id(space_id)
    }

    /// Second half of a two-phase insert. Fails with `Conflict` when the id
    /// is already taken in the space.
    pub fn insert_reserved(
        &self,
        space_id: SpaceId,
        stage: PipelineStage,
        id: TaskId,
        draft: TaskDraft,
    ) -> Result<Task, BoardError> {
        let draft = draft.validate()?;
        let task = {
            let mut state = self.state();
            let task = self.build_task(space_id, stage, id, draft, None);
            let board = state.board_mut(space_id)?;
            if board.pipeline.contains(id) {
                return Err(BoardError::Conflict(format!(
                    "{id} already exists in space {space_id}"
                )));
            }
            if board.next_id <= id {
                board.next_id = id.next();
            }
            board.pipeline.push(task.clone());
            task
        };
        self.publish(StoreEvent::TaskCreated { task: task.clone() });
        Ok(task)
    }

    fn build_task(
        &self,
        space_id: SpaceId,
        stage: PipelineStage,
        id: TaskId,
        draft: TaskDraft,
        correlation_id: Option<CorrelationId>,
    ) -> Task {
        let now = self.clock.now();
        let mut task = Task {
            id,
            space_id,
            title: draft.title,
            description: draft.description,
            due: draft.due,
            created_at: now,
            completed_at: None,
            assignees: draft.assignees,
            stage,
            correlation_id,
            remote_id: None,
        };
        task.enter_stage(stage, now);
        task
    }

    /// Remove the task from `from` and append it to `to`.
    ///
    /// Returns `None` and publishes nothing when the task is not in `from`
    /// (or the space is unknown); the caller cannot tell "already moved"
    /// from "never existed".
    pub fn move_task(
        &self,
        space_id: SpaceId,
        task_id: TaskId,
        from: PipelineStage,
        to: PipelineStage,
    ) -> Option<Task> {
        let task = {
            let mut state = self.state();
            let board = state.boards.get_mut(&space_id)?;
            let mut task = board.pipeline.take_from(from, task_id)?;
            task.enter_stage(to, self.clock.now());
            board.pipeline.push(task.clone());
            task
        };
        self.publish(StoreEvent::TaskMoved {
            task: task.clone(),
            from,
            to,
        });
        Some(task)
    }

    pub fn update_task(
        &self,
        space_id: SpaceId,
        task_id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task, BoardError> {
        let patch = patch.validate()?;
        let task = self.mutate(space_id, task_id, |task| {
            patch.apply(task);
            Ok(())
        })?;
        self.publish(StoreEvent::TaskUpdated { task: task.clone() });
        Ok(task)
    }

    pub fn delete_task(&self, space_id: SpaceId, task_id: TaskId) -> Result<Task, BoardError> {
        let task = {
            let mut state = self.state();
            state
                .board_mut(space_id)?
                .pipeline
                .remove(task_id)
                .ok_or_else(|| BoardError::not_found("task", task_id))?
        };
        self.publish(StoreEvent::TaskDeleted { task: task.clone() });
        Ok(task)
    }

    pub fn add_assignee(
        &self,
        space_id: SpaceId,
        task_id: TaskId,
        assignee: Assignee,
    ) -> Result<Task, BoardError> {
        let assignee = assignee.validated()?;
        let added = assignee.clone();
        let task = self.mutate(space_id, task_id, move |task| {
            if task.assignees.iter().any(|a| a.key() == assignee.key()) {
                return Err(BoardError::Conflict(format!(
                    "{} is already assigned to {}",
                    assignee.name, task.title
                )));
            }
            task.assignees.push(assignee);
            Ok(())
        })?;
        self.publish(StoreEvent::AssigneeAdded {
            task: task.clone(),
            assignee: added,
        });
        Ok(task)
    }

    /// Remove the assignee whose [`Assignee::key`] equals `key`
    /// (case-insensitive). Removing the last assignee is rejected.
    pub fn remove_assignee(
        &self,
        space_id: SpaceId,
        task_id: TaskId,
        key: &str,
    ) -> Result<(Task, Assignee), BoardError> {
        let key = key.trim().to_lowercase();
        let mut removed = None;
        let task = self.mutate(space_id, task_id, |task| {
            let pos = task
                .assignees
                .iter()
                .position(|a| a.key() == key)
                .ok_or_else(|| BoardError::not_found("assignee", &key))?;
            if task.assignees.len() == 1 {
                return Err(BoardError::validation(format!(
                    "{} must keep at least one assignee",
                    task.title
                )));
            }
            removed = Some(task.assignees.remove(pos));
            Ok(())
        })?;
        let assignee = removed.ok_or_else(|| BoardError::not_found("assignee", &key))?;
        self.publish(StoreEvent::AssigneeRemoved {
            task: task.clone(),
            assignee: assignee.clone(),
        });
        Ok((task, assignee))
    }

    /// Attach the remote id to the optimistic record created under
    /// `correlation_id`, and copy resolved identities onto its assignees.
    ///
    /// Returns `None` when the record is gone (deleted meanwhile).
    pub fn reconcile_remote_id(
        &self,
        space_id: SpaceId,
        correlation_id: CorrelationId,
        remote_id: RemoteTaskId,
        resolved: &[Assignee],
    ) -> Option<Task> {
        let task = {
            let mut state = self.state();
            let task = state
                .boards
                .get_mut(&space_id)?
                .pipeline
                .find_correlated_mut(correlation_id)?;
            task.remote_id = Some(remote_id);
            for assignee in task.assignees.iter_mut() {
                if let Some(found) = resolved.iter().find(|r| r.key() == assignee.key()) {
                    assignee.user_id = found.user_id;
                }
            }
            task.clone()
        };
        self.publish(StoreEvent::TaskReconciled { task: task.clone() });
        Some(task)
    }

    /// Roll back the optimistic record created under `correlation_id`.
    pub fn discard_correlated(
        &self,
        space_id: SpaceId,
        correlation_id: CorrelationId,
    ) -> Option<Task> {
        let task = {
            let mut state = self.state();
            state
                .boards
                .get_mut(&space_id)?
                .pipeline
                .remove_correlated(correlation_id)?
        };
        self.publish(StoreEvent::TaskDiscarded { task: task.clone() });
        Some(task)
    }

    fn mutate<F>(&self, space_id: SpaceId, task_id: TaskId, f: F) -> Result<Task, BoardError>
    where
        F: FnOnce(&mut Task) -> Result<(), BoardError>,
    {
        let mut state = self.state();
        let task = state
            .board_mut(space_id)?
            .pipeline
            .find_mut(task_id)
            .ok_or_else(|| BoardError::not_found("task", task_id))?;
        f(task)?;
        Ok(task.clone())
    }

    // ========================================
    // Queries
    // ========================================

    pub fn task(&self, space_id: SpaceId, task_id: TaskId) -> Option<Task> {
        self.state()
            .boards
            .get(&space_id)?
            .pipeline
            .get(task_id)
            .cloned()
    }

    pub fn task_by_correlation(
        &self,
        space_id: SpaceId,
        correlation_id: CorrelationId,
    ) -> Option<Task> {
        self.state()
            .boards
            .get(&space_id)?
            .pipeline
            .by_correlation(correlation_id)
            .cloned()
    }

    pub fn tasks_in_stage(&self, space_id: SpaceId, stage: PipelineStage) -> Vec<Task> {
        self.state()
            .boards
            .get(&space_id)
            .map(|b| b.pipeline.stage(stage).to_vec())
            .unwrap_or_default()
    }

    /// Every task of the space, stage by stage. Empty for unknown spaces.
    pub fn tasks_for_space(&self, space_id: SpaceId) -> Vec<Task> {
        self.state()
            .boards
            .get(&space_id)
            .map(|b| b.pipeline.tasks().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pipeline(&self, space_id: SpaceId) -> Option<Pipeline> {
        self.state()
            .boards
            .get(&space_id)
            .map(|b| b.pipeline.clone())
    }
}

#[cfg(test)]
mod tests;
