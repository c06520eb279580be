use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::domain::ids::Id;
use crate::domain::{
    Assignee, BoardError, Duplicate, InviteStatus, NotificationKind, Role, Space, SpaceId,
    UserProfile,
};
use crate::impls::InMemoryRemote;
use crate::domain::{InviteCode, Membership};
use crate::ports::{CodeGenerator, RandomCodeGenerator, RemoteService, SystemClock, UlidGenerator};
use crate::sync::AssignmentResolver;
use chrono::Utc;
use ulid::Ulid;

const ORIGIN: &str = "https://board.example.com";

/// Hands out the queued codes in order, then repeats the last one.
struct ScriptedCodes(Mutex<VecDeque<&'static str>>);

impl ScriptedCodes {
    fn new(codes: &[&'static str]) -> Self {
        Self(Mutex::new(codes.iter().copied().collect()))
    }
}

impl CodeGenerator for ScriptedCodes {
    fn generate_code(&self, _len: usize) -> InviteCode {
        let mut codes = self.0.lock().unwrap();
        let code = if codes.len() > 1 {
            codes.pop_front().unwrap()
        } else {
            codes[0]
        };
        InviteCode::parse(code).unwrap()
    }
}

struct World {
    remote: Arc<InMemoryRemote>,
    space: SpaceId,
    ana: UserProfile,
    bo: UserProfile,
    cy: UserProfile,
}

impl World {
    async fn new(remote: InMemoryRemote) -> Self {
        let remote = Arc::new(remote);
        let ana = remote.register_profile("ana@example.com", "Ana Lee").await;
        let bo = remote.register_profile("bo@example.com", "Bo Chen").await;
        let cy = remote.register_profile("cy@example.com", "Cy Park").await;
        let space = Space::new(Id::from_ulid(Ulid::new()), "Docs");
        remote
            .insert_space(
                &space,
                &crate::domain::Membership {
                    space_id: space.id,
                    user_id: ana.id,
                    role: Role::Owner,
                    joined_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        Self {
            remote,
            space: space.id,
            ana,
            bo,
            cy,
        }
    }

    fn machine(&self, actor: &UserProfile) -> InviteStateMachine {
        self.machine_with(actor, Arc::new(AssignmentResolver::new(self.remote.clone())))
    }

    fn machine_with(&self, actor: &UserProfile, resolver: Arc<AssignmentResolver>) -> InviteStateMachine {
        self.build(actor, resolver, Arc::new(RandomCodeGenerator))
    }

    fn machine_with_codes(&self, actor: &UserProfile, codes: &[&'static str]) -> InviteStateMachine {
        self.build(
            actor,
            Arc::new(AssignmentResolver::new(self.remote.clone())),
            Arc::new(ScriptedCodes::new(codes)),
        )
    }

    fn build(
        &self,
        actor: &UserProfile,
        resolver: Arc<AssignmentResolver>,
        codes: Arc<dyn CodeGenerator>,
    ) -> InviteStateMachine {
        InviteStateMachine::new(
            self.remote.clone(),
            resolver,
            Arc::new(UlidGenerator::new(SystemClock)),
            codes,
            Arc::new(SystemClock),
            actor.clone(),
            ORIGIN,
            DEFAULT_CODE_LEN,
        )
    }
}

#[tokio::test]
async fn accepting_twice_creates_one_membership() {
    let world = World::new(InMemoryRemote::new()).await;
    let invite = world
        .machine(&world.ana)
        .send_invite(world.space, "bo@example.com")
        .await
        .unwrap();
    let bo = world.machine(&world.bo);

    let membership = bo.accept_invite(invite.id).await.unwrap();
    let again = bo.accept_invite(invite.id).await.unwrap_err();

    assert_eq!(membership.role, Role::Teammate);
    assert!(again.is_not_found());
    let members = world.remote.memberships(world.space).await;
    assert_eq!(members.len(), 2);
    assert_eq!(members.iter().filter(|m| m.user_id == world.bo.id).count(), 1);
}

#[tokio::test]
async fn accept_clears_invite_notification_and_refreshes_roster() {
    let world = World::new(InMemoryRemote::new()).await;
    let invite = world
        .machine(&world.ana)
        .send_invite(world.space, "bo@example.com")
        .await
        .unwrap();
    assert_eq!(invite.target.as_ref().and_then(|t| t.user_id), Some(world.bo.id));

    let inbox = world.remote.notifications_for(world.bo.id).await;
    assert!(matches!(
        inbox.as_slice(),
        [n] if matches!(n.kind, NotificationKind::Invite { invite_id, .. } if invite_id == invite.id)
    ));

    let resolver = Arc::new(AssignmentResolver::new(world.remote.clone()));
    let bo_desc = [Assignee::new("Bo").with_email("bo@example.com")];
    assert!(resolver.resolve(world.space, &bo_desc).await.unwrap().resolved.is_empty());

    world
        .machine_with(&world.bo, resolver.clone())
        .accept_invite(invite.id)
        .await
        .unwrap();

    assert!(world.remote.notifications_for(world.bo.id).await.is_empty());
    let resolution = resolver.resolve(world.space, &bo_desc).await.unwrap();
    assert_eq!(resolution.user_ids().collect::<Vec<_>>(), vec![world.bo.id]);
}

#[tokio::test]
async fn declined_invite_cannot_be_accepted() {
    let world = World::new(InMemoryRemote::new()).await;
    let invite = world
        .machine(&world.ana)
        .send_invite(world.space, "bo@example.com")
        .await
        .unwrap();
    let bo = world.machine(&world.bo);

    let declined = bo.decline_invite(invite.id).await.unwrap();
    assert_eq!(declined.status, InviteStatus::Declined);
    assert!(declined.responded_at.is_some());

    assert!(bo.accept_invite(invite.id).await.unwrap_err().is_not_found());
    assert!(bo.decline_invite(invite.id).await.unwrap_err().is_not_found());
    assert_eq!(world.remote.memberships(world.space).await.len(), 1);
}

#[tokio::test]
async fn general_link_is_idempotent_while_pending() {
    let world = World::new(InMemoryRemote::new()).await;
    let ana = world.machine(&world.ana);

    let first = ana.create_general_invite_link(world.space).await.unwrap();
    let second = ana.create_general_invite_link(world.space).await.unwrap();

    assert_eq!(first, second);
    assert!(first.starts_with("https://board.example.com/invite/"));
    assert_eq!(world.remote.invites().await.len(), 1);

    // Anyone holding the link can join through it.
    let joined = world.machine(&world.cy).resolve_link(&first).await.unwrap();
    assert!(joined.is_general());
    world.machine(&world.cy).accept_invite(joined.id).await.unwrap();

    let third = ana.create_general_invite_link(world.space).await.unwrap();
    assert_ne!(first, third);
}

#[tokio::test]
async fn inviting_a_member_is_a_duplicate() {
    let world = World::new(InMemoryRemote::new()).await;

    let err = world
        .machine(&world.ana)
        .send_invite(world.space, " ANA@example.com ")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BoardError::Duplicate(Duplicate::AlreadyMember { ref email }) if email == "ana@example.com"
    ));
    assert!(world.remote.invites().await.is_empty());
}

#[tokio::test]
async fn second_pending_invite_is_a_duplicate() {
    let world = World::new(InMemoryRemote::new()).await;
    let ana = world.machine(&world.ana);
    let first = ana.send_invite(world.space, "dee@example.com").await.unwrap();

    let err = ana.send_invite(world.space, "Dee@Example.com").await.unwrap_err();

    match err {
        BoardError::Duplicate(Duplicate::PendingInvite { email, code }) => {
            assert_eq!(email, "dee@example.com");
            assert_eq!(code, first.code.to_string());
        }
        other => panic!("expected pending duplicate, got {other:?}"),
    }
    assert_eq!(world.remote.invites().await.len(), 1);
    // No profile behind the address: nobody to notify.
    assert!(first.target.as_ref().is_some_and(|t| t.user_id.is_none()));
}

#[tokio::test]
async fn codes_resolve_regardless_of_case_and_whitespace() {
    let world = World::new(InMemoryRemote::new()).await;
    let invite = world
        .machine(&world.ana)
        .send_invite(world.space, "bo@example.com")
        .await
        .unwrap();
    let typed = format!("  {}\n", invite.code.as_str().to_lowercase());
    let bo = world.machine(&world.bo);

    assert_eq!(bo.resolve_code(&typed).await.unwrap().id, invite.id);
    bo.accept_by_code(&typed).await.unwrap();
    assert!(bo.resolve_code("NOSUCH00").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn targeted_invite_is_not_usable_by_others() {
    let world = World::new(InMemoryRemote::new()).await;
    let invite = world
        .machine(&world.ana)
        .send_invite(world.space, "bo@example.com")
        .await
        .unwrap();

    let err = world
        .machine(&world.cy)
        .accept_by_code(invite.code.as_str())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(world.remote.memberships(world.space).await.len(), 1);
}

#[tokio::test]
async fn sending_requires_membership_and_a_valid_address() {
    let world = World::new(InMemoryRemote::new()).await;

    let not_member = world
        .machine(&world.cy)
        .send_invite(world.space, "bo@example.com")
        .await
        .unwrap_err();
    let malformed = world
        .machine(&world.ana)
        .send_invite(world.space, "not an email")
        .await
        .unwrap_err();

    assert!(not_member.is_not_found());
    assert!(matches!(malformed, BoardError::Validation(_)));
    assert!(world.remote.invites().await.is_empty());
}

#[tokio::test]
async fn member_removal_rules() {
    let world = World::new(InMemoryRemote::new()).await;
    for user in [&world.bo, &world.cy] {
        let invite = world
            .machine(&world.ana)
            .send_invite(world.space, &user.email)
            .await
            .unwrap();
        world.machine(user).accept_invite(invite.id).await.unwrap();
    }
    let ana = world.machine(&world.ana);
    let bo = world.machine(&world.bo);

    assert!(matches!(
        ana.remove_member(world.space, world.ana.id).await,
        Err(BoardError::Validation(_))
    ));
    assert!(matches!(
        bo.remove_member(world.space, world.cy.id).await,
        Err(BoardError::Validation(_))
    ));

    bo.remove_member(world.space, world.bo.id).await.unwrap();
    ana.remove_member(world.space, world.cy.id).await.unwrap();

    let members = ana.members(world.space).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, world.ana.id);
}

async fn join_as(world: &World, user: &UserProfile, role: Role) {
    world
        .remote
        .insert_membership_if_absent(Membership {
            space_id: world.space,
            user_id: user.id,
            role,
            joined_at: Utc::now(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn a_lead_cannot_remove_the_owner() {
    let world = World::new(InMemoryRemote::new()).await;
    join_as(&world, &world.bo, Role::Lead).await;

    let result = world.machine(&world.bo).remove_member(world.space, world.ana.id).await;

    assert!(matches!(result, Err(BoardError::Validation(_))));
    let owner = world
        .remote
        .find_membership(world.space, world.ana.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(owner.role, Role::Owner);
}

#[tokio::test]
async fn only_the_owner_removes_a_lead() {
    let world = World::new(InMemoryRemote::new()).await;
    join_as(&world, &world.bo, Role::Lead).await;
    join_as(&world, &world.cy, Role::Lead).await;

    let err = world
        .machine(&world.bo)
        .remove_member(world.space, world.cy.id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid input: a lead cannot remove a lead");

    world
        .machine(&world.ana)
        .remove_member(world.space, world.cy.id)
        .await
        .unwrap();
    assert!(world
        .remote
        .find_membership(world.space, world.cy.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn a_taken_code_is_redrawn_once() {
    let world = World::new(InMemoryRemote::new()).await;
    world
        .machine_with_codes(&world.ana, &["AAAA1111"])
        .send_invite(world.space, &world.bo.email)
        .await
        .unwrap();

    let second = world
        .machine_with_codes(&world.ana, &["AAAA1111", "BBBB2222"])
        .send_invite(world.space, &world.cy.email)
        .await
        .unwrap();
    assert_eq!(second.code.as_str(), "BBBB2222");

    let link = world
        .machine_with_codes(&world.ana, &["AAAA1111", "CCCC3333"])
        .general_invite(world.space)
        .await
        .unwrap();
    assert_eq!(link.code.as_str(), "CCCC3333");
    assert_eq!(world.remote.invites().await.len(), 3);
}

#[tokio::test]
async fn repeated_code_clashes_give_up() {
    let world = World::new(InMemoryRemote::new()).await;
    world
        .machine_with_codes(&world.ana, &["AAAA1111"])
        .send_invite(world.space, &world.bo.email)
        .await
        .unwrap();

    let result = world
        .machine_with_codes(&world.ana, &["AAAA1111"])
        .send_invite(world.space, &world.cy.email)
        .await;

    assert!(matches!(result, Err(BoardError::Conflict(_))));
    assert_eq!(world.remote.invites().await.len(), 1);
}

#[tokio::test]
async fn concurrent_sends_store_one_invite() {
    let world = World::new(InMemoryRemote::new().with_latency(Duration::from_millis(5))).await;
    let first = world.machine(&world.ana);
    let second = world.machine(&world.ana);

    let (a, b) = tokio::join!(
        first.send_invite(world.space, "bo@example.com"),
        second.send_invite(world.space, "bo@example.com"),
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(BoardError::Duplicate(Duplicate::PendingInvite { .. })))));
    assert_eq!(world.remote.invites().await.len(), 1);
}

#[tokio::test]
async fn concurrent_accepts_create_one_membership() {
    let world = World::new(InMemoryRemote::new().with_latency(Duration::from_millis(5))).await;
    let invite = world
        .machine(&world.ana)
        .send_invite(world.space, "bo@example.com")
        .await
        .unwrap();
    let first = world.machine(&world.bo);
    let second = world.machine(&world.bo);

    let (a, b) = tokio::join!(first.accept_invite(invite.id), second.accept_invite(invite.id));

    assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
    assert!([a, b]
        .into_iter()
        .any(|r| matches!(r, Err(BoardError::Conflict(_)))));
    let members = world.remote.memberships(world.space).await;
    assert_eq!(members.iter().filter(|m| m.user_id == world.bo.id).count(), 1);
}

#[tokio::test]
async fn concurrent_general_links_converge() {
    let world = World::new(InMemoryRemote::new().with_latency(Duration::from_millis(5))).await;
    let first = world.machine(&world.ana);
    let second = world.machine(&world.ana);

    let (a, b) = tokio::join!(
        first.create_general_invite_link(world.space),
        second.create_general_invite_link(world.space),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(world.remote.invites().await.len(), 1);
}
