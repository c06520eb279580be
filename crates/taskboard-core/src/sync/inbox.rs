//! Notification inbox of the session user.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{BoardError, Notification, NotificationId, UserId};
use crate::ports::RemoteService;

pub struct Inbox {
    remote: Arc<dyn RemoteService>,
    user_id: UserId,
}

impl Inbox {
    pub fn new(remote: Arc<dyn RemoteService>, user_id: UserId) -> Self {
        Self { remote, user_id }
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<Notification>, BoardError> {
        let mut notifications = self.remote.list_notifications(self.user_id).await?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    /// Reading a notification deletes it.
    pub async fn mark_read(&self, id: NotificationId) -> Result<(), BoardError> {
        let owned = self
            .remote
            .list_notifications(self.user_id)
            .await?
            .iter()
            .any(|n| n.id == id);
        if !owned || !self.remote.delete_notification(id).await? {
            return Err(BoardError::not_found("notification", id));
        }
        debug!(notification_id = %id, "notification read");
        Ok(())
    }
}
