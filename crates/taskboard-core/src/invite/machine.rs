//! InviteStateMachine - 招待のライフサイクル
//!
//! # 状態遷移
//! - Pending -> Accepted（membership を作成）
//! - Pending -> Declined
//!
//! # 不変条件
//! - (space, user) の membership は高々一つ
//! - (space, 対象メールアドレス) の pending 招待は高々一つ
//! - (space, 招待者) の pending な汎用リンクは高々一つ
//!
//! いずれもリモート側の条件付き insert / compare-and-set で保証し、
//! 事前チェックは分かりやすいエラーを返すためだけに行う。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{
    normalize_email, validate_email, BoardError, Duplicate, Invite, InviteCode, InviteId,
    InviteStatus, InviteTarget, Member, Membership, Notification, NotificationKind, RemoteError,
    Role, SpaceId, UserId, UserProfile,
};
use crate::ports::{Clock, CodeGenerator, IdGenerator, IdGeneratorExt, RemoteService};
use crate::sync::AssignmentResolver;

use super::link::{code_from_link, invite_link};

pub const DEFAULT_CODE_LEN: usize = 8;

pub struct InviteStateMachine {
    remote: Arc<dyn RemoteService>,
    resolver: Arc<AssignmentResolver>,
    ids: Arc<dyn IdGenerator>,
    codes: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    actor: UserProfile,
    origin: String,
    code_len: usize,
}

impl InviteStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        remote: Arc<dyn RemoteService>,
        resolver: Arc<AssignmentResolver>,
        ids: Arc<dyn IdGenerator>,
        codes: Arc<dyn CodeGenerator>,
        clock: Arc<dyn Clock>,
        actor: UserProfile,
        origin: impl Into<String>,
        code_len: usize,
    ) -> Self {
        Self {
            remote,
            resolver,
            ids,
            codes,
            clock,
            actor,
            origin: origin.into(),
            code_len,
        }
    }

    pub fn link_for(&self, invite: &Invite) -> String {
        invite_link(&self.origin, &invite.code)
    }

    async fn actor_membership(&self, space_id: SpaceId) -> Result<Membership, BoardError> {
        self.remote
            .find_membership(space_id, self.actor.id)
            .await?
            .ok_or_else(|| BoardError::not_found("membership", space_id))
    }

    fn new_invite(&self, space_id: SpaceId, target: Option<InviteTarget>) -> Invite {
        Invite {
            id: self.ids.generate(),
            code: self.codes.generate_code(self.code_len),
            space_id,
            inviter: self.actor.id,
            target,
            status: InviteStatus::Pending,
            created_at: self.clock.now(),
            responded_at: None,
        }
    }

    /// Insert `invite`. A clash on the code column draws a new code once;
    /// any other violation is returned to the caller.
    async fn store_invite(&self, mut invite: Invite) -> Result<Invite, RemoteError> {
        match self.remote.insert_invite(invite.clone()).await {
            Err(RemoteError::UniqueViolation(constraint)) if is_code_clash(&constraint) => {
                debug!(code = %invite.code, "invite code taken, drawing another");
                invite.code = self.codes.generate_code(self.code_len);
                self.remote.insert_invite(invite.clone()).await?;
                Ok(invite)
            }
            Err(e) => Err(e),
            Ok(()) => Ok(invite),
        }
    }

    // ========================================
    // Sending
    // ========================================

    /// Invite `email` into the space.
    ///
    /// Fails with `Duplicate` when the address already belongs to a member
    /// or already has a pending invite; no invite row is written then.
    pub async fn send_invite(&self, space_id: SpaceId, email: &str) -> Result<Invite, BoardError> {
        let email = validate_email(email)?;
        self.actor_membership(space_id).await?;

        let profile = self.remote.find_profile_by_email(&email).await?;
        if let Some(profile) = &profile {
            if self.remote.find_membership(space_id, profile.id).await?.is_some() {
                return Err(BoardError::Duplicate(Duplicate::AlreadyMember { email }));
            }
        }
        if let Some(pending) = self.remote.find_pending_invite(space_id, &email).await? {
            return Err(pending_duplicate(email, &pending));
        }

        let invite = self.new_invite(
            space_id,
            Some(InviteTarget {
                email: email.clone(),
                user_id: profile.as_ref().map(|p| p.id),
            }),
        );
        let invite = match self.store_invite(invite).await {
            Ok(invite) => invite,
            Err(RemoteError::UniqueViolation(constraint)) => {
                debug!(constraint = %constraint, "invite insert lost a race");
                return match self.remote.find_pending_invite(space_id, &email).await? {
                    Some(pending) => Err(pending_duplicate(email, &pending)),
                    None => Err(BoardError::Conflict(format!(
                        "invite for {email} could not be stored ({constraint})"
                    ))),
                };
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(profile) = profile {
            self.notify_invited(&invite, profile.id).await;
        }
        info!(invite_id = %invite.id, space_id = %space_id, code = %invite.code, "invite sent");
        Ok(invite)
    }

    async fn notify_invited(&self, invite: &Invite, user_id: UserId) {
        let notification = Notification {
            id: self.ids.generate(),
            user_id,
            kind: NotificationKind::Invite {
                invite_id: invite.id,
                space_id: invite.space_id,
            },
            read: false,
            created_at: self.clock.now(),
        };
        if let Err(e) = self.remote.insert_notifications(vec![notification]).await {
            warn!(error = %e, invite_id = %invite.id, "invite notification not written");
        }
    }

    /// Link anyone can use to join. Calling again while the link is still
    /// pending returns the same link.
    pub async fn create_general_invite_link(&self, space_id: SpaceId) -> Result<String, BoardError> {
        Ok(self.link_for(&self.general_invite(space_id).await?))
    }

    pub async fn general_invite(&self, space_id: SpaceId) -> Result<Invite, BoardError> {
        self.actor_membership(space_id).await?;
        if let Some(existing) = self.remote.find_pending_link(space_id, self.actor.id).await? {
            return Ok(existing);
        }
        let invite = self.new_invite(space_id, None);
        match self.store_invite(invite).await {
            Ok(invite) => {
                info!(invite_id = %invite.id, space_id = %space_id, "general invite link created");
                Ok(invite)
            }
            Err(RemoteError::UniqueViolation(constraint)) => self
                .remote
                .find_pending_link(space_id, self.actor.id)
                .await?
                .ok_or_else(|| {
                    BoardError::Conflict(format!("general link could not be stored ({constraint})"))
                }),
            Err(e) => Err(e.into()),
        }
    }

    // ========================================
    // Responding
    // ========================================

    /// Look up an invite by code; case and surrounding whitespace are ignored.
    pub async fn resolve_code(&self, raw: &str) -> Result<Invite, BoardError> {
        let code = InviteCode::parse(raw)?;
        self.remote
            .find_invite_by_code(&code)
            .await?
            .ok_or_else(|| BoardError::not_found("invite", code))
    }

    pub async fn resolve_link(&self, link: &str) -> Result<Invite, BoardError> {
        let code = code_from_link(link)?;
        self.resolve_code(code.as_str()).await
    }

    /// Pending invite addressed to the session user (or a general link).
    async fn pending_for_actor(&self, id: InviteId) -> Result<Invite, BoardError> {
        let invite = self
            .remote
            .get_invite(id)
            .await?
            .ok_or_else(|| BoardError::not_found("invite", id))?;
        if !invite.is_pending() {
            return Err(BoardError::not_found(
                "pending invite",
                format!("{id} ({})", invite.status),
            ));
        }
        if let Some(target) = &invite.target {
            if target.email != normalize_email(&self.actor.email) {
                return Err(BoardError::not_found("invite", id));
            }
        }
        Ok(invite)
    }

    /// Accept a pending invite and join its space as a teammate.
    ///
    /// The status flips first (compare-and-set), then the membership is
    /// inserted unless it already exists. A second accept fails without
    /// creating anything.
    pub async fn accept_invite(&self, id: InviteId) -> Result<Membership, BoardError> {
        let invite = self.pending_for_actor(id).await?;
        let now = self.clock.now();
        self.remote
            .transition_invite(id, InviteStatus::Pending, InviteStatus::Accepted, now)
            .await?
            .ok_or_else(|| BoardError::Conflict(format!("{id} was answered concurrently")))?;

        let membership = Membership {
            space_id: invite.space_id,
            user_id: self.actor.id,
            role: Role::Teammate,
            joined_at: now,
        };
        let membership = if self
            .remote
            .insert_membership_if_absent(membership.clone())
            .await?
        {
            membership
        } else {
            debug!(space_id = %invite.space_id, "already a member; keeping existing membership");
            self.remote
                .find_membership(invite.space_id, self.actor.id)
                .await?
                .unwrap_or(membership)
        };

        self.clear_invite_notifications(id).await;
        self.resolver.invalidate(invite.space_id);
        info!(invite_id = %id, space_id = %invite.space_id, user_id = %self.actor.id, "invite accepted");
        Ok(membership)
    }

    pub async fn accept_by_code(&self, raw: &str) -> Result<Membership, BoardError> {
        let invite = self.resolve_code(raw).await?;
        self.accept_invite(invite.id).await
    }

    /// Decline a pending invite. Terminal: the invite cannot be accepted
    /// afterwards.
    pub async fn decline_invite(&self, id: InviteId) -> Result<Invite, BoardError> {
        self.pending_for_actor(id).await?;
        let declined = self
            .remote
            .transition_invite(id, InviteStatus::Pending, InviteStatus::Declined, self.clock.now())
            .await?
            .ok_or_else(|| BoardError::Conflict(format!("{id} was answered concurrently")))?;
        self.clear_invite_notifications(id).await;
        info!(invite_id = %id, "invite declined");
        Ok(declined)
    }

    async fn clear_invite_notifications(&self, id: InviteId) {
        match self.remote.delete_invite_notifications(id, self.actor.id).await {
            Ok(n) => debug!(invite_id = %id, deleted = n, "invite notifications cleared"),
            Err(e) => warn!(error = %e, invite_id = %id, "invite notifications not cleared"),
        }
    }

    // ========================================
    // Roster
    // ========================================

    pub async fn members(&self, space_id: SpaceId) -> Result<Vec<Member>, BoardError> {
        Ok(self.remote.list_members(space_id).await?)
    }

    /// Remove a member. Members may leave; removing someone else needs the
    /// owner or lead role, and only the owner may remove a lead. The owner
    /// can never be removed.
    pub async fn remove_member(&self, space_id: SpaceId, user_id: UserId) -> Result<(), BoardError> {
        let acting = self.actor_membership(space_id).await?;
        let target = self
            .remote
            .find_membership(space_id, user_id)
            .await?
            .ok_or_else(|| BoardError::not_found("membership", user_id))?;

        if target.role == Role::Owner {
            return Err(BoardError::validation("the owner of a space cannot be removed"));
        }
        if user_id != self.actor.id {
            let allowed = match target.role {
                Role::Lead => acting.role == Role::Owner,
                _ => matches!(acting.role, Role::Owner | Role::Lead),
            };
            if !allowed {
                return Err(BoardError::validation(format!(
                    "a {} cannot remove a {}",
                    acting.role, target.role
                )));
            }
        }

        if !self.remote.delete_membership(space_id, user_id).await? {
            return Err(BoardError::not_found("membership", user_id));
        }
        self.resolver.invalidate(space_id);
        info!(space_id = %space_id, user_id = %user_id, "member removed");
        Ok(())
    }
}

fn is_code_clash(constraint: &str) -> bool {
    constraint.ends_with("invite_code")
}

fn pending_duplicate(email: String, pending: &Invite) -> BoardError {
    BoardError::Duplicate(Duplicate::PendingInvite {
        email,
        code: pending.code.to_string(),
    })
}
