//! SyncGateway - ローカル変更をリモートへミラーする
//!
//! # 設計原則
//! - ローカルの TaskStore を先に更新し（楽観的更新）、その後リモートへ書く
//! - ローカルとリモートの間にトランザクションはない
//! - タスク行の insert 以外のリモート失敗はログに残して握りつぶす
//!
//! # create_task の流れ
//! 1. 入力検証（失敗時は副作用なし）
//! 2. CorrelationId 付きでローカルに楽観的 insert
//! 3. リモートの tasks に insert し、リモート ID を得る
//! 4. 担当者を membership snapshot で解決し、task_assignees に insert
//! 5. 操作者以外の解決済み担当者へ通知を insert
//! 6. リモート ID と解決済み ID をローカルレコードへ反映

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    Assignee, BoardError, CorrelationId, Membership, Notification, NotificationKind,
    PipelineStage, RemoteError, RemoteTaskId, Role, Space, SpaceId, Task, TaskDraft, TaskId,
    TaskPatch, UserId, UserProfile,
};
use crate::ports::{AssignmentRow, Clock, IdGenerator, IdGeneratorExt, RemoteService, TaskRow};
use crate::store::TaskStore;

use super::resolver::{AssignmentResolver, Resolution};

/// What to do with the optimistic record when the remote task insert fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteFailurePolicy {
    /// Remove the optimistic record again.
    #[default]
    RollBack,
    /// Keep the record locally without a remote id.
    KeepLocal,
}

/// A step after the task insert that failed without undoing the creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFailure {
    Resolve(RemoteError),
    Assignments(RemoteError),
    Notifications(RemoteError),
}

/// How far a creation got on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSync {
    Synced {
        remote_id: RemoteTaskId,
    },
    /// The task row exists remotely but a later step failed.
    Partial {
        remote_id: RemoteTaskId,
        failures: Vec<SyncFailure>,
    },
    /// The task row was not written.
    Failed {
        error: RemoteError,
        rolled_back: bool,
    },
}

impl RemoteSync {
    pub fn remote_id(&self) -> Option<RemoteTaskId> {
        match self {
            RemoteSync::Synced { remote_id } | RemoteSync::Partial { remote_id, .. } => {
                Some(*remote_id)
            }
            RemoteSync::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCreation {
    /// Latest local view of the task (the optimistic record as of return).
    pub task: Task,
    pub remote: RemoteSync,
}

pub struct SyncGateway {
    store: Arc<TaskStore>,
    remote: Arc<dyn RemoteService>,
    resolver: Arc<AssignmentResolver>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    actor: UserProfile,
    policy: RemoteFailurePolicy,
}

impl SyncGateway {
    pub fn new(
        store: Arc<TaskStore>,
        remote: Arc<dyn RemoteService>,
        resolver: Arc<AssignmentResolver>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        actor: UserProfile,
        policy: RemoteFailurePolicy,
    ) -> Self {
        Self {
            store,
            remote,
            resolver,
            ids,
            clock,
            actor,
            policy,
        }
    }

    pub fn actor(&self) -> &UserProfile {
        &self.actor
    }

    pub fn policy(&self) -> RemoteFailurePolicy {
        self.policy
    }

    // ========================================
    // Spaces
    // ========================================

    /// Create a space owned by the session user.
    ///
    /// The remote write comes first: without the owner membership row no
    /// invite or assignment can refer to the space.
    pub async fn create_space(&self, space: Space) -> Result<Space, BoardError> {
        let space = space.validate()?;
        let owner = Membership {
            space_id: space.id,
            user_id: self.actor.id,
            role: Role::Owner,
            joined_at: self.clock.now(),
        };
        self.remote.insert_space(&space, &owner).await?;
        let space = self.store.create_space(space)?;
        info!(space_id = %space.id, name = %space.name, "space created");
        Ok(space)
    }

    /// Allocate a fresh space id.
    pub fn new_space(&self, name: impl Into<String>) -> Space {
        Space::new(self.ids.generate(), name)
    }

    pub async fn delete_space(&self, space_id: SpaceId) -> Result<Vec<Task>, BoardError> {
        let removed = self.store.remove_space(space_id)?;
        self.resolver.invalidate(space_id);
        self.mirror("delete_space", self.remote.delete_space(space_id).await);
        info!(space_id = %space_id, removed = removed.len(), "space deleted");
        Ok(removed)
    }

    // ========================================
    // Tasks
    // ========================================

    /// Create a task locally, then mirror it remotely.
    ///
    /// Only validation and unknown-space errors are returned; remote
    /// failures are reported through [`TaskCreation::remote`].
    pub async fn create_task(
        &self,
        space_id: SpaceId,
        stage: PipelineStage,
        draft: TaskDraft,
    ) -> Result<TaskCreation, BoardError> {
        let draft = draft.validate()?;
        let correlation: CorrelationId = self.ids.generate();
        let task = self
            .store
            .add_correlated(space_id, stage, draft, Some(correlation))?;
        debug!(task_id = %task.id, correlation = %correlation, "optimistic insert");

        let remote_id = match self
            .remote
            .insert_task(TaskRow::from_task(&task, self.actor.id))
            .await
        {
            Ok(id) => id,
            Err(error) => return Ok(self.creation_failed(task, correlation, error)),
        };

        let mut failures = Vec::new();
        let resolution = match self.resolver.resolve(space_id, &task.assignees).await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(error = %e, task_id = %task.id, "assignee resolution failed");
                failures.push(SyncFailure::Resolve(e));
                Resolution {
                    resolved: Vec::new(),
                    unresolved: task.assignees.clone(),
                }
            }
        };

        let links: Vec<AssignmentRow> = resolution
            .user_ids()
            .map(|user_id| AssignmentRow {
                task_id: remote_id,
                user_id,
            })
            .collect();
        if !links.is_empty() {
            if let Err(e) = self.remote.insert_assignments(links).await {
                warn!(error = %e, task_id = %task.id, "assignment links not written");
                failures.push(SyncFailure::Assignments(e));
            }
        }

        if let Err(e) = self
            .notify_assigned(space_id, remote_id, &task.title, &resolution.resolved)
            .await
        {
            warn!(error = %e, task_id = %task.id, "assignment notifications not written");
            failures.push(SyncFailure::Notifications(e));
        }

        let task = match self.store.reconcile_remote_id(
            space_id,
            correlation,
            remote_id,
            &resolution.resolved,
        ) {
            Some(task) => task,
            None => {
                warn!(remote_id = %remote_id, correlation = %correlation, "optimistic record gone before reconciliation");
                task
            }
        };

        let remote = if failures.is_empty() {
            info!(task_id = %task.id, remote_id = %remote_id, "task synced");
            RemoteSync::Synced { remote_id }
        } else {
            RemoteSync::Partial {
                remote_id,
                failures,
            }
        };
        Ok(TaskCreation { task, remote })
    }

    fn creation_failed(
        &self,
        task: Task,
        correlation: CorrelationId,
        error: RemoteError,
    ) -> TaskCreation {
        let rolled_back = match self.policy {
            RemoteFailurePolicy::RollBack => self
                .store
                .discard_correlated(task.space_id, correlation)
                .is_some(),
            RemoteFailurePolicy::KeepLocal => false,
        };
        warn!(
            error = %error,
            task_id = %task.id,
            rolled_back,
            "remote task insert failed"
        );
        TaskCreation {
            task,
            remote: RemoteSync::Failed { error, rolled_back },
        }
    }

    async fn notify_assigned(
        &self,
        space_id: SpaceId,
        remote_id: RemoteTaskId,
        title: &str,
        resolved: &[Assignee],
    ) -> Result<(), RemoteError> {
        let now = self.clock.now();
        let rows: Vec<Notification> = resolved
            .iter()
            .filter_map(|a| a.user_id)
            .filter(|user_id| *user_id != self.actor.id)
            .map(|user_id| Notification {
                id: self.ids.generate(),
                user_id,
                kind: NotificationKind::TaskAssigned {
                    task: remote_id,
                    space_id,
                    title: title.to_string(),
                    assigned_by: self.actor.id,
                },
                read: false,
                created_at: now,
            })
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        self.remote.insert_notifications(rows).await
    }

    /// Move locally, then mirror the new status. `None` when the task is not
    /// in `from`; nothing is sent in that case.
    pub async fn move_task(
        &self,
        space_id: SpaceId,
        task_id: TaskId,
        from: PipelineStage,
        to: PipelineStage,
    ) -> Option<Task> {
        let task = self.store.move_task(space_id, task_id, from, to)?;
        self.push_row("move_task", &task).await;
        Some(task)
    }

    /// Patch a task and mirror the row. A replacement assignee list is
    /// resolved against the roster; remote links follow the difference and
    /// newly linked members are notified.
    pub async fn update_task(
        &self,
        space_id: SpaceId,
        task_id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task, BoardError> {
        let mut patch = patch.validate()?;
        let mut linked_before = None;
        if let (Some(assignees), Some(current)) =
            (patch.assignees.take(), self.store.task(space_id, task_id))
        {
            linked_before = Some(linked_users(&current.assignees));
            patch.assignees = Some(self.resolve_all(space_id, task_id, assignees).await);
        }

        let task = self.store.update_task(space_id, task_id, patch)?;
        self.push_row("update_task", &task).await;
        if let (Some(remote_id), Some(before)) = (task.remote_id, linked_before) {
            self.relink(space_id, remote_id, &task, &before).await;
        }
        Ok(task)
    }

    /// Resolve every descriptor, keeping the unmatched ones as given.
    async fn resolve_all(
        &self,
        space_id: SpaceId,
        task_id: TaskId,
        assignees: Vec<Assignee>,
    ) -> Vec<Assignee> {
        let resolution = match self.resolver.resolve(space_id, &assignees).await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(error = %e, task_id = %task_id, "assignee resolution failed");
                return assignees;
            }
        };
        assignees
            .into_iter()
            .map(|assignee| {
                let key = assignee.key();
                resolution
                    .resolved
                    .iter()
                    .find(|r| r.key() == key)
                    .cloned()
                    .unwrap_or(assignee)
            })
            .collect()
    }

    async fn relink(&self, space_id: SpaceId, remote_id: RemoteTaskId, task: &Task, before: &[UserId]) {
        let after = linked_users(&task.assignees);
        for &user_id in before.iter().filter(|id| !after.contains(id)) {
            self.mirror(
                "delete_assignment",
                self.remote
                    .delete_assignment(AssignmentRow {
                        task_id: remote_id,
                        user_id,
                    })
                    .await,
            );
        }

        let added: Vec<Assignee> = task
            .assignees
            .iter()
            .filter(|a| a.user_id.is_some_and(|id| !before.contains(&id)))
            .cloned()
            .collect();
        if added.is_empty() {
            return;
        }
        let links = linked_users(&added)
            .into_iter()
            .map(|user_id| AssignmentRow {
                task_id: remote_id,
                user_id,
            })
            .collect();
        self.mirror("insert_assignments", self.remote.insert_assignments(links).await);
        self.mirror(
            "insert_notifications",
            self.notify_assigned(space_id, remote_id, &task.title, &added)
                .await,
        );
    }

    pub async fn delete_task(&self, space_id: SpaceId, task_id: TaskId) -> Result<Task, BoardError> {
        let task = self.store.delete_task(space_id, task_id)?;
        if let Some(remote_id) = task.remote_id {
            self.mirror("delete_task", self.remote.delete_task(remote_id).await);
        }
        Ok(task)
    }

    /// Add an assignee. The descriptor is resolved against the roster first
    /// so the local record carries the member identity; when the task is
    /// synced the member is linked and notified remotely.
    pub async fn assign(
        &self,
        space_id: SpaceId,
        task_id: TaskId,
        assignee: Assignee,
    ) -> Result<Task, BoardError> {
        let assignee = assignee.validated()?;
        let resolved = match self
            .resolver
            .resolve(space_id, std::slice::from_ref(&assignee))
            .await
        {
            Ok(resolution) => resolution.resolved.into_iter().next(),
            Err(e) => {
                warn!(error = %e, task_id = %task_id, "assignee resolution failed");
                None
            }
        };
        let task = self
            .store
            .add_assignee(space_id, task_id, resolved.clone().unwrap_or(assignee))?;
        let (Some(remote_id), Some(member)) = (task.remote_id, resolved) else {
            debug!(task_id = %task.id, "assignment kept local");
            return Ok(task);
        };
        let links: Vec<AssignmentRow> = member
            .user_id
            .map(|user_id| AssignmentRow {
                task_id: remote_id,
                user_id,
            })
            .into_iter()
            .collect();
        self.mirror("insert_assignments", self.remote.insert_assignments(links).await);
        self.mirror(
            "insert_notifications",
            self.notify_assigned(space_id, remote_id, &task.title, &[member])
                .await,
        );
        Ok(task)
    }

    /// Remove the assignee whose key is `key`. The last assignee cannot be
    /// removed.
    pub async fn unassign(
        &self,
        space_id: SpaceId,
        task_id: TaskId,
        key: &str,
    ) -> Result<Task, BoardError> {
        let (task, removed) = self.store.remove_assignee(space_id, task_id, key)?;
        if let (Some(task_id), Some(user_id)) = (task.remote_id, removed.user_id) {
            self.mirror(
                "delete_assignment",
                self.remote
                    .delete_assignment(AssignmentRow { task_id, user_id })
                    .await,
            );
        }
        Ok(task)
    }

    async fn push_row(&self, op: &'static str, task: &Task) {
        match task.remote_id {
            Some(remote_id) => self.mirror(
                op,
                self.remote
                    .update_task(remote_id, TaskRow::from_task(task, self.actor.id))
                    .await,
            ),
            None => debug!(op, task_id = %task.id, "task not synced yet; change kept local"),
        }
    }

    fn mirror<T>(&self, op: &'static str, result: Result<T, RemoteError>) {
        if let Err(e) = result {
            warn!(error = %e, op, "remote mirror failed; local state kept");
        }
    }
}

fn linked_users(assignees: &[Assignee]) -> Vec<UserId> {
    assignees.iter().filter_map(|a| a.user_id).collect()
}
