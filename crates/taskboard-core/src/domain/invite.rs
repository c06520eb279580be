//! Space invitations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::BoardError;
use super::ids::{InviteId, SpaceId, UserId};

/// Invite status (`space_invites.status`).
///
/// State transitions:
/// - Pending -> Accepted
/// - Pending -> Declined
///
/// Accepted and Declined are terminal; an invite is never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

impl InviteStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, InviteStatus::Pending)
    }

    pub fn can_transition_to(self, next: InviteStatus) -> bool {
        matches!(
            (self, next),
            (InviteStatus::Pending, InviteStatus::Accepted)
                | (InviteStatus::Pending, InviteStatus::Declined)
        )
    }
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Declined => "declined",
        };
        f.write_str(s)
    }
}

/// Canonical (upper-case, trimmed) invite code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteCode(String);

impl InviteCode {
    /// Canonicalize user input. Codes resolve regardless of case or
    /// surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, BoardError> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BoardError::validation(format!("malformed invite code: {raw:?}")));
        }
        Ok(Self(code))
    }

    /// Wrap a code that is already upper-case alphanumeric.
    pub(crate) fn from_canonical(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whom a targeted invite is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteTarget {
    /// Normalized address.
    pub email: String,
    /// Set when the address belongs to an existing profile.
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: InviteId,
    pub code: InviteCode,
    pub space_id: SpaceId,
    pub inviter: UserId,
    /// `None` for a general sharable link.
    pub target: Option<InviteTarget>,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Invite {
    pub fn is_general(&self) -> bool {
        self.target.is_none()
    }

    pub fn is_pending(&self) -> bool {
        self.status == InviteStatus::Pending
    }

    /// Whether this invite blocks a new targeted invite to `email`.
    pub fn is_pending_for(&self, space_id: SpaceId, email: &str) -> bool {
        self.is_pending()
            && self.space_id == space_id
            && self.target.as_ref().is_some_and(|t| t.email == email)
    }

    /// Whether this is the pending general link of `inviter` in `space_id`.
    pub fn is_pending_link_of(&self, space_id: SpaceId, inviter: UserId) -> bool {
        self.is_pending() && self.is_general() && self.space_id == space_id && self.inviter == inviter
    }
}
