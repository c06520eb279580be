//! InMemoryRemote - 開発用・テスト用のリモートサービス
//!
//! # 実装詳細
//! - 全コレクションを一つの tokio Mutex で保護する
//! - `insert_invite` / `insert_membership_if_absent` / `transition_invite` は
//!   ロック内で判定と書き込みを行う（条件付き insert / CAS）
//! - `fail_next` で一度だけ失敗させる、`set_offline` で全操作を失敗させる
//! - `with_latency` で各操作の前に待ちを入れ、並行実行を交互に進める

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use ulid::Ulid;

use crate::domain::ids::Id;
use crate::domain::{
    normalize_email, Invite, InviteCode, InviteId, InviteStatus, Member, Membership,
    Notification, NotificationId, RemoteError, RemoteTaskId, Space, SpaceId, UserId, UserProfile,
};
use crate::ports::{AssignmentRow, RemoteService, TaskRow};

/// Remote operations, for targeted fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    InsertSpace,
    DeleteSpace,
    FindProfile,
    ListMembers,
    FindMembership,
    InsertMembership,
    DeleteMembership,
    InsertTask,
    UpdateTask,
    DeleteTask,
    InsertAssignments,
    DeleteAssignment,
    InsertNotifications,
    ListNotifications,
    DeleteNotification,
    FindInvite,
    InsertInvite,
    TransitionInvite,
}

#[derive(Default)]
struct RemoteState {
    profiles: Vec<UserProfile>,
    spaces: Vec<Space>,
    memberships: Vec<Membership>,
    tasks: Vec<(RemoteTaskId, TaskRow)>,
    assignments: Vec<AssignmentRow>,
    notifications: Vec<Notification>,
    invites: Vec<Invite>,
    failures: Vec<RemoteOp>,
    offline: bool,
}

impl RemoteState {
    fn check(&mut self, op: RemoteOp) -> Result<(), RemoteError> {
        if self.offline {
            return Err(RemoteError::Unavailable("offline".to_string()));
        }
        if let Some(pos) = self.failures.iter().position(|f| *f == op) {
            self.failures.remove(pos);
            return Err(RemoteError::Unavailable(format!("injected failure on {op:?}")));
        }
        Ok(())
    }

    fn profile(&self, user_id: UserId) -> Option<&UserProfile> {
        self.profiles.iter().find(|p| p.id == user_id)
    }
}

/// In-process stand-in for the remote persistent service.
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    latency: Option<Duration>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
            latency: None,
        }
    }

    /// Sleep before every operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn begin(&self, op: RemoteOp) -> Result<MutexGuard<'_, RemoteState>, RemoteError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock().await;
        state.check(op)?;
        Ok(state)
    }

    // ========================================
    // Seeding / fault injection
    // ========================================

    /// Create a profile (sign-up happens outside this system).
    pub async fn register_profile(&self, email: &str, name: &str) -> UserProfile {
        let profile = UserProfile {
            id: Id::from_ulid(Ulid::new()),
            email: normalize_email(email),
            name: name.to_string(),
            avatar: None,
        };
        self.state.lock().await.profiles.push(profile.clone());
        profile
    }

    /// Fail the next call of `op` with `Unavailable`.
    pub async fn fail_next(&self, op: RemoteOp) {
        self.state.lock().await.failures.push(op);
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    // ========================================
    // Inspection
    // ========================================

    pub async fn memberships(&self, space_id: SpaceId) -> Vec<Membership> {
        self.state
            .lock()
            .await
            .memberships
            .iter()
            .filter(|m| m.space_id == space_id)
            .cloned()
            .collect()
    }

    pub async fn invites(&self) -> Vec<Invite> {
        self.state.lock().await.invites.clone()
    }

    pub async fn task_rows(&self) -> Vec<(RemoteTaskId, TaskRow)> {
        self.state.lock().await.tasks.clone()
    }

    pub async fn task_row(&self, id: RemoteTaskId) -> Option<TaskRow> {
        self.state
            .lock()
            .await
            .tasks
            .iter()
            .find(|(tid, _)| *tid == id)
            .map(|(_, row)| row.clone())
    }

    pub async fn assignments(&self) -> Vec<AssignmentRow> {
        self.state.lock().await.assignments.clone()
    }

    pub async fn notifications_for(&self, user_id: UserId) -> Vec<Notification> {
        self.state
            .lock()
            .await
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteService for InMemoryRemote {
    async fn insert_space(&self, space: &Space, owner: &Membership) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteOp::InsertSpace).await?;
        if state.spaces.iter().any(|s| s.id == space.id) {
            return Err(RemoteError::UniqueViolation("spaces.id".to_string()));
        }
        state.spaces.push(space.clone());
        state.memberships.push(owner.clone());
        Ok(())
    }

    async fn delete_space(&self, space_id: SpaceId) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteOp::DeleteSpace).await?;
        state.spaces.retain(|s| s.id != space_id);
        state.memberships.retain(|m| m.space_id != space_id);
        state.invites.retain(|i| i.space_id != space_id);
        let removed: Vec<RemoteTaskId> = state
            .tasks
            .iter()
            .filter(|(_, row)| row.space_id == space_id)
            .map(|(id, _)| *id)
            .collect();
        state.tasks.retain(|(_, row)| row.space_id != space_id);
        state.assignments.retain(|a| !removed.contains(&a.task_id));
        debug!(space_id = %space_id, tasks = removed.len(), "space rows deleted");
        Ok(())
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<UserProfile>, RemoteError> {
        let state = self.begin(RemoteOp::FindProfile).await?;
        let email = normalize_email(email);
        Ok(state.profiles.iter().find(|p| p.email == email).cloned())
    }

    async fn list_members(&self, space_id: SpaceId) -> Result<Vec<Member>, RemoteError> {
        let state = self.begin(RemoteOp::ListMembers).await?;
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.space_id == space_id)
            .filter_map(|m| {
                state.profile(m.user_id).map(|p| Member {
                    user_id: p.id,
                    email: p.email.clone(),
                    name: p.name.clone(),
                    role: m.role,
                })
            })
            .collect())
    }

    async fn find_membership(
        &self,
        space_id: SpaceId,
        user_id: UserId,
    ) -> Result<Option<Membership>, RemoteError> {
        let state = self.begin(RemoteOp::FindMembership).await?;
        Ok(state
            .memberships
            .iter()
            .find(|m| m.space_id == space_id && m.user_id == user_id)
            .cloned())
    }

    async fn insert_membership_if_absent(&self, membership: Membership) -> Result<bool, RemoteError> {
        let mut state = self.begin(RemoteOp::InsertMembership).await?;
        let exists = state
            .memberships
            .iter()
            .any(|m| m.space_id == membership.space_id && m.user_id == membership.user_id);
        if exists {
            return Ok(false);
        }
        state.memberships.push(membership);
        Ok(true)
    }

    async fn delete_membership(&self, space_id: SpaceId, user_id: UserId) -> Result<bool, RemoteError> {
        let mut state = self.begin(RemoteOp::DeleteMembership).await?;
        let before = state.memberships.len();
        state
            .memberships
            .retain(|m| !(m.space_id == space_id && m.user_id == user_id));
        Ok(state.memberships.len() < before)
    }

    async fn insert_task(&self, row: TaskRow) -> Result<RemoteTaskId, RemoteError> {
        let mut state = self.begin(RemoteOp::InsertTask).await?;
        let id = Id::from_ulid(Ulid::new());
        state.tasks.push((id, row));
        Ok(id)
    }

    async fn update_task(&self, id: RemoteTaskId, row: TaskRow) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteOp::UpdateTask).await?;
        let (_, stored) = state
            .tasks
            .iter_mut()
            .find(|(tid, _)| *tid == id)
            .ok_or_else(|| RemoteError::Rejected(format!("no task row {id}")))?;
        *stored = TaskRow {
            created_by: stored.created_by,
            created_at: stored.created_at,
            ..row
        };
        Ok(())
    }

    async fn delete_task(&self, id: RemoteTaskId) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteOp::DeleteTask).await?;
        state.tasks.retain(|(tid, _)| *tid != id);
        state.assignments.retain(|a| a.task_id != id);
        Ok(())
    }

    async fn insert_assignments(&self, rows: Vec<AssignmentRow>) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteOp::InsertAssignments).await?;
        for row in rows {
            if !state.assignments.contains(&row) {
                state.assignments.push(row);
            }
        }
        Ok(())
    }

    async fn delete_assignment(&self, row: AssignmentRow) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteOp::DeleteAssignment).await?;
        state.assignments.retain(|a| *a != row);
        Ok(())
    }

    async fn insert_notifications(&self, rows: Vec<Notification>) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteOp::InsertNotifications).await?;
        state.notifications.extend(rows);
        Ok(())
    }

    async fn list_notifications(&self, user_id: UserId) -> Result<Vec<Notification>, RemoteError> {
        let state = self.begin(RemoteOp::ListNotifications).await?;
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_notification(&self, id: NotificationId) -> Result<bool, RemoteError> {
        let mut state = self.begin(RemoteOp::DeleteNotification).await?;
        let before = state.notifications.len();
        state.notifications.retain(|n| n.id != id);
        Ok(state.notifications.len() < before)
    }

    async fn delete_invite_notifications(
        &self,
        invite_id: InviteId,
        user_id: UserId,
    ) -> Result<usize, RemoteError> {
        let mut state = self.begin(RemoteOp::DeleteNotification).await?;
        let before = state.notifications.len();
        state
            .notifications
            .retain(|n| !(n.user_id == user_id && n.refers_to_invite(invite_id)));
        Ok(before - state.notifications.len())
    }

    async fn find_pending_invite(
        &self,
        space_id: SpaceId,
        email: &str,
    ) -> Result<Option<Invite>, RemoteError> {
        let state = self.begin(RemoteOp::FindInvite).await?;
        let email = normalize_email(email);
        Ok(state
            .invites
            .iter()
            .find(|i| i.is_pending_for(space_id, &email))
            .cloned())
    }

    async fn find_pending_link(
        &self,
        space_id: SpaceId,
        inviter: UserId,
    ) -> Result<Option<Invite>, RemoteError> {
        let state = self.begin(RemoteOp::FindInvite).await?;
        Ok(state
            .invites
            .iter()
            .find(|i| i.is_pending_link_of(space_id, inviter))
            .cloned())
    }

    async fn insert_invite(&self, invite: Invite) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteOp::InsertInvite).await?;
        if state.invites.iter().any(|i| i.code == invite.code) {
            return Err(RemoteError::UniqueViolation("space_invites.invite_code".to_string()));
        }
        let blocked = match &invite.target {
            Some(target) => state
                .invites
                .iter()
                .any(|i| i.is_pending_for(invite.space_id, &target.email)),
            None => state
                .invites
                .iter()
                .any(|i| i.is_pending_link_of(invite.space_id, invite.inviter)),
        };
        if blocked {
            return Err(RemoteError::UniqueViolation("space_invites.pending".to_string()));
        }
        state.invites.push(invite);
        Ok(())
    }

    async fn get_invite(&self, id: InviteId) -> Result<Option<Invite>, RemoteError> {
        let state = self.begin(RemoteOp::FindInvite).await?;
        Ok(state.invites.iter().find(|i| i.id == id).cloned())
    }

    async fn find_invite_by_code(&self, code: &InviteCode) -> Result<Option<Invite>, RemoteError> {
        let state = self.begin(RemoteOp::FindInvite).await?;
        Ok(state.invites.iter().find(|i| &i.code == code).cloned())
    }

    async fn transition_invite(
        &self,
        id: InviteId,
        from: InviteStatus,
        to: InviteStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Invite>, RemoteError> {
        let mut state = self.begin(RemoteOp::TransitionInvite).await?;
        let Some(invite) = state.invites.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        if invite.status != from || !from.can_transition_to(to) {
            return Ok(None);
        }
        invite.status = to;
        invite.responded_at = Some(at);
        Ok(Some(invite.clone()))
    }
}
