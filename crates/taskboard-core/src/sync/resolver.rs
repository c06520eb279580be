//! AssignmentResolver - 表示用の担当者情報を永続 ID に解決する
//!
//! Matching is a linear scan of the roster per assignee (O(n·m)); rosters
//! are tens of members, not thousands. The cached snapshot can be stale with
//! respect to concurrent membership changes until it is invalidated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::domain::{normalize_email, Assignee, Member, RemoteError, SpaceId, UserId};
use crate::ports::RemoteService;

/// Outcome of resolving a list of assignee descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Descriptors with `user_id` filled in.
    pub resolved: Vec<Assignee>,
    /// Descriptors with no matching member.
    pub unresolved: Vec<Assignee>,
}

impl Resolution {
    pub fn user_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.resolved.iter().filter_map(|a| a.user_id)
    }
}

pub struct AssignmentResolver {
    remote: Arc<dyn RemoteService>,
    snapshots: Mutex<HashMap<SpaceId, Arc<Vec<Member>>>>,
}

impl AssignmentResolver {
    pub fn new(remote: Arc<dyn RemoteService>) -> Self {
        Self {
            remote,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    fn snapshots(&self) -> MutexGuard<'_, HashMap<SpaceId, Arc<Vec<Member>>>> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached roster of the space, fetched on first use.
    pub async fn snapshot(&self, space_id: SpaceId) -> Result<Arc<Vec<Member>>, RemoteError> {
        if let Some(members) = self.snapshots().get(&space_id) {
            return Ok(Arc::clone(members));
        }
        self.refresh(space_id).await
    }

    /// Fetch the roster and replace the cached snapshot.
    pub async fn refresh(&self, space_id: SpaceId) -> Result<Arc<Vec<Member>>, RemoteError> {
        let members = Arc::new(self.remote.list_members(space_id).await?);
        debug!(space_id = %space_id, members = members.len(), "membership snapshot refreshed");
        self.snapshots().insert(space_id, Arc::clone(&members));
        Ok(members)
    }

    pub fn invalidate(&self, space_id: SpaceId) {
        self.snapshots().remove(&space_id);
    }

    /// Match each descriptor to a member by contact address.
    pub async fn resolve(
        &self,
        space_id: SpaceId,
        assignees: &[Assignee],
    ) -> Result<Resolution, RemoteError> {
        let members = self.snapshot(space_id).await?;
        let resolution = match_members(&members, assignees);
        if !resolution.unresolved.is_empty() {
            let names: Vec<&str> = resolution.unresolved.iter().map(|a| a.name.as_str()).collect();
            warn!(space_id = %space_id, unresolved = ?names, "assignees without a matching member");
        }
        Ok(resolution)
    }
}

fn match_members(members: &[Member], assignees: &[Assignee]) -> Resolution {
    let mut resolution = Resolution::default();
    for assignee in assignees {
        let found = assignee.email.as_deref().map(normalize_email).and_then(|email| {
            members
                .iter()
                .find(|m| normalize_email(&m.email) == email)
        });
        match found {
            Some(member) => {
                let mut assignee = assignee.clone();
                assignee.user_id = Some(member.user_id);
                resolution.resolved.push(assignee);
            }
            None => resolution.unresolved.push(assignee.clone()),
        }
    }
    resolution
}
