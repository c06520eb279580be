//! Four-stage pipeline of one space.

use serde::{Deserialize, Serialize};

use crate::domain::{CorrelationId, PipelineStage, Task, TaskId};

/// Ordered task lists, one per [`PipelineStage`].
///
/// Invariant: a task id appears in at most one list, at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    stages: [Vec<Task>; 4],
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, stage: PipelineStage) -> &[Task] {
        &self.stages[stage.index()]
    }

    /// All tasks in pipeline order (stage by stage, list order within a stage).
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.stages.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks().any(|t| t.id == id)
    }

    pub fn max_id(&self) -> Option<TaskId> {
        self.tasks().map(|t| t.id).max()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks().find(|t| t.id == id)
    }

    pub fn by_correlation(&self, correlation: CorrelationId) -> Option<&Task> {
        self.tasks().find(|t| t.correlation_id == Some(correlation))
    }

    /// Append to the list of the task's own stage.
    pub(crate) fn push(&mut self, task: Task) {
        self.stages[task.stage.index()].push(task);
    }

    /// Remove `id` from the `stage` list only.
    pub(crate) fn take_from(&mut self, stage: PipelineStage, id: TaskId) -> Option<Task> {
        let list = &mut self.stages[stage.index()];
        let pos = list.iter().position(|t| t.id == id)?;
        Some(list.remove(pos))
    }

    /// First match scanning all four lists.
    pub(crate) fn find_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.stages.iter_mut().flatten().find(|t| t.id == id)
    }

    pub(crate) fn find_correlated_mut(&mut self, correlation: CorrelationId) -> Option<&mut Task> {
        self.stages
            .iter_mut()
            .flatten()
            .find(|t| t.correlation_id == Some(correlation))
    }

    /// Remove the first match scanning all four lists.
    pub(crate) fn remove(&mut self, id: TaskId) -> Option<Task> {
        for list in self.stages.iter_mut() {
            if let Some(pos) = list.iter().position(|t| t.id == id) {
                return Some(list.remove(pos));
            }
        }
        None
    }

    pub(crate) fn remove_correlated(&mut self, correlation: CorrelationId) -> Option<Task> {
        let id = self.by_correlation(correlation)?.id;
        self.remove(id)
    }
}
