use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{InviteId, NotificationId, RemoteTaskId, SpaceId, UserId};

/// Typed payload of a notification row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    Invite {
        invite_id: InviteId,
        space_id: SpaceId,
    },
    TaskAssigned {
        task: RemoteTaskId,
        space_id: SpaceId,
        title: String,
        assigned_by: UserId,
    },
}

/// A row of the `notifications` collection. Deleted once acted upon or read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn refers_to_invite(&self, invite_id: InviteId) -> bool {
        matches!(self.kind, NotificationKind::Invite { invite_id: id, .. } if id == invite_id)
    }
}
