//! RemoteService port - リモートの永続化サービス
//!
//! RemoteService は以下のコレクションを扱います：
//! - spaces / space_members / profiles
//! - space_invites（`invite_code` は一意、`status` は pending/accepted/declined）
//! - tasks / task_assignees
//! - notifications
//!
//! # 設計原則
//! - ローカルの TaskStore とリモートの間にトランザクションはない
//! - 重複防止は条件付き insert / compare-and-set としてリモート側で行う
//! - タイムアウト・キャンセル・リトライは持たない

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CorrelationId, Due, Invite, InviteCode, InviteId, InviteStatus, Member, Membership,
    Notification, NotificationId, PipelineStage, RemoteError, RemoteTaskId, Space, SpaceId,
    Task, UserId, UserProfile,
};

/// A row of the remote `tasks` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    pub space_id: SpaceId,
    pub title: String,
    pub description: String,
    pub due: Option<Due>,
    pub status: PipelineStage,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Client correlation id of the optimistic insert that produced the row.
    pub correlation_id: Option<CorrelationId>,
}

impl TaskRow {
    pub fn from_task(task: &Task, created_by: UserId) -> Self {
        Self {
            space_id: task.space_id,
            title: task.title.clone(),
            description: task.description.clone(),
            due: task.due,
            status: task.stage,
            created_by,
            created_at: task.created_at,
            completed_at: task.completed_at,
            correlation_id: task.correlation_id,
        }
    }
}

/// A row of `task_assignees`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub task_id: RemoteTaskId,
    pub user_id: UserId,
}

/// RemoteService は永続化の正本（source of truth）
#[async_trait]
pub trait RemoteService: Send + Sync {
    // spaces / members

    /// Insert a space together with its owner's membership.
    async fn insert_space(&self, space: &Space, owner: &Membership) -> Result<(), RemoteError>;

    /// Delete a space and everything hanging off it.
    async fn delete_space(&self, space_id: SpaceId) -> Result<(), RemoteError>;

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<UserProfile>, RemoteError>;

    /// Memberships of a space joined with profiles.
    async fn list_members(&self, space_id: SpaceId) -> Result<Vec<Member>, RemoteError>;

    async fn find_membership(
        &self,
        space_id: SpaceId,
        user_id: UserId,
    ) -> Result<Option<Membership>, RemoteError>;

    /// Insert unless the (space, user) pair already has a membership.
    /// Returns whether a row was inserted.
    async fn insert_membership_if_absent(&self, membership: Membership) -> Result<bool, RemoteError>;

    /// Returns whether a row was deleted.
    async fn delete_membership(&self, space_id: SpaceId, user_id: UserId) -> Result<bool, RemoteError>;

    // tasks

    async fn insert_task(&self, row: TaskRow) -> Result<RemoteTaskId, RemoteError>;

    /// Overwrite the mutable columns. `created_by` and `created_at` of the
    /// stored row are kept.
    async fn update_task(&self, id: RemoteTaskId, row: TaskRow) -> Result<(), RemoteError>;

    async fn delete_task(&self, id: RemoteTaskId) -> Result<(), RemoteError>;

    async fn insert_assignments(&self, rows: Vec<AssignmentRow>) -> Result<(), RemoteError>;

    async fn delete_assignment(&self, row: AssignmentRow) -> Result<(), RemoteError>;

    // notifications

    async fn insert_notifications(&self, rows: Vec<Notification>) -> Result<(), RemoteError>;

    async fn list_notifications(&self, user_id: UserId) -> Result<Vec<Notification>, RemoteError>;

    /// Returns whether a row was deleted.
    async fn delete_notification(&self, id: NotificationId) -> Result<bool, RemoteError>;

    /// Delete the invite notifications of `user_id` about `invite_id`.
    /// Returns the number of rows deleted.
    async fn delete_invite_notifications(
        &self,
        invite_id: InviteId,
        user_id: UserId,
    ) -> Result<usize, RemoteError>;

    // invites

    async fn find_pending_invite(
        &self,
        space_id: SpaceId,
        email: &str,
    ) -> Result<Option<Invite>, RemoteError>;

    async fn find_pending_link(
        &self,
        space_id: SpaceId,
        inviter: UserId,
    ) -> Result<Option<Invite>, RemoteError>;

    /// Conditional insert. Fails with [`RemoteError::UniqueViolation`] when
    /// the code is taken, or when a pending invite for the same
    /// (space, target) or the same (space, inviter) general link exists.
    async fn insert_invite(&self, invite: Invite) -> Result<(), RemoteError>;

    async fn get_invite(&self, id: InviteId) -> Result<Option<Invite>, RemoteError>;

    async fn find_invite_by_code(&self, code: &InviteCode) -> Result<Option<Invite>, RemoteError>;

    /// Compare-and-set on the status column. Returns the updated invite when
    /// the stored status was `from`, `None` otherwise.
    async fn transition_invite(
        &self,
        id: InviteId,
        from: InviteStatus,
        to: InviteStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Invite>, RemoteError>;
}
