use std::sync::Mutex;

use chrono::{Duration, TimeZone, Utc};
use rstest::rstest;
use ulid::Ulid;

use super::*;
use crate::domain::Due;
use crate::domain::ids::Id;
use crate::ports::FixedClock;

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    ))
}

fn store_with(allocation: IdAllocation) -> (TaskStore, Arc<FixedClock>, SpaceId) {
    let clock = clock();
    let store = TaskStore::new(allocation, clock.clone());
    let space_id = Id::from_ulid(Ulid::new());
    store.create_space(Space::new(space_id, "Platform")).unwrap();
    (store, clock, space_id)
}

fn draft(title: &str) -> TaskDraft {
    TaskDraft::new(title).assignee(Assignee::new("Ana Lee").with_email("ana@example.com"))
}

#[rstest]
#[case(PipelineStage::Todo, PipelineStage::InProgress)]
#[case(PipelineStage::Todo, PipelineStage::Done)]
#[case(PipelineStage::Review, PipelineStage::Done)]
#[case(PipelineStage::Done, PipelineStage::Review)]
#[case(PipelineStage::Done, PipelineStage::Todo)]
#[case(PipelineStage::InProgress, PipelineStage::InProgress)]
fn move_relocates_exactly_once(#[case] from: PipelineStage, #[case] to: PipelineStage) {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let other = store.add_task(space, from, draft("Other")).unwrap();
    let task = store.add_task(space, from, draft("Mover")).unwrap();

    let moved = store.move_task(space, task.id, from, to).unwrap();

    let in_to = store.tasks_in_stage(space, to);
    assert_eq!(in_to.iter().filter(|t| t.id == task.id).count(), 1);
    if from != to {
        assert!(store.tasks_in_stage(space, from).iter().all(|t| t.id != task.id));
        assert!(store.tasks_in_stage(space, from).iter().any(|t| t.id == other.id));
    }
    assert_eq!(in_to.last().map(|t| t.id), Some(task.id));
    assert_eq!(moved.stage, to);
    assert_eq!(moved.completed_at.is_some(), to.is_terminal());
}

#[test]
fn move_from_wrong_stage_is_a_silent_noop() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let task = store.add_task(space, PipelineStage::Todo, draft("Plan")).unwrap();
    let events = Arc::new(Mutex::new(0));
    let seen = events.clone();
    store.subscribe_fn(move |_| *seen.lock().unwrap() += 1);

    assert!(store
        .move_task(space, task.id, PipelineStage::Review, PipelineStage::Done)
        .is_none());
    assert!(store
        .move_task(space, TaskId::new(999), PipelineStage::Todo, PipelineStage::Done)
        .is_none());

    assert_eq!(*events.lock().unwrap(), 0);
    assert_eq!(store.task(space, task.id).unwrap().stage, PipelineStage::Todo);
}

#[rstest]
#[case::counter(IdAllocation::Counter)]
#[case::max_plus_one(IdAllocation::MaxPlusOne)]
fn sequential_creations_get_increasing_unique_ids(#[case] allocation: IdAllocation) {
    let (store, _clock, space) = store_with(allocation);
    let ids: Vec<TaskId> = (0..5)
        .map(|i| {
            store
                .add_task(space, PipelineStage::ALL[i % 4], draft(&format!("Task {i}")))
                .unwrap()
                .id
        })
        .collect();

    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ids.first(), Some(&TaskId::new(1)));
}

#[test]
fn max_plus_one_collides_when_reservations_overlap() {
    let (store, _clock, space) = store_with(IdAllocation::MaxPlusOne);
    store.add_task(space, PipelineStage::Todo, draft("Existing")).unwrap();

    // Both creators compute their id before either commits.
    let first = store.reserve_task_id(space).unwrap();
    let second = store.reserve_task_id(space).unwrap();
    assert_eq!(first, second);

    store
        .insert_reserved(space, PipelineStage::Todo, first, draft("A"))
        .unwrap();
    let err = store
        .insert_reserved(space, PipelineStage::Todo, second, draft("B"))
        .unwrap_err();
    assert!(matches!(err, BoardError::Conflict(_)));
}

#[test]
fn counter_does_not_collide_when_reservations_overlap() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    store.add_task(space, PipelineStage::Todo, draft("Existing")).unwrap();

    let first = store.reserve_task_id(space).unwrap();
    let second = store.reserve_task_id(space).unwrap();
    assert_ne!(first, second);

    store.insert_reserved(space, PipelineStage::Todo, second, draft("B")).unwrap();
    store.insert_reserved(space, PipelineStage::Todo, first, draft("A")).unwrap();
    assert_eq!(store.tasks_for_space(space).len(), 3);
}

#[test]
fn max_plus_one_is_scoped_to_all_spaces() {
    let (store, _clock, space) = store_with(IdAllocation::MaxPlusOne);
    let other = Id::from_ulid(Ulid::new());
    store.create_space(Space::new(other, "Ops")).unwrap();

    store.add_task(space, PipelineStage::Todo, draft("A")).unwrap();
    store.add_task(space, PipelineStage::Todo, draft("B")).unwrap();
    let c = store.add_task(other, PipelineStage::Todo, draft("C")).unwrap();
    assert_eq!(c.id, TaskId::new(3));
}

#[test]
fn completing_write_report_keeps_assignees() {
    let (store, clock, space) = store_with(IdAllocation::Counter);
    let due = Due::at(Utc.with_ymd_and_hms(2024, 3, 8, 17, 0, 0).unwrap());
    let task = store
        .add_task(
            space,
            PipelineStage::Todo,
            TaskDraft::new("Write report")
                .due(due)
                .assignee(Assignee::new("Ana Lee").with_email("ana@example.com"))
                .assignee(Assignee::new("Bo Chen").with_email("bo@example.com")),
        )
        .unwrap();
    assert_eq!(task.completed_at, None);

    clock.advance(Duration::hours(3));
    let done = store
        .move_task(space, task.id, PipelineStage::Todo, PipelineStage::Done)
        .unwrap();

    assert_eq!(done.stage, PipelineStage::Done);
    assert_eq!(done.completed_at, Some(clock.now()));
    assert_eq!(done.due, Some(due));
    assert_eq!(done.assignees, task.assignees);
}

#[test]
fn leaving_done_clears_completion() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let task = store.add_task(space, PipelineStage::Done, draft("Ship")).unwrap();
    assert!(task.completed_at.is_some());

    let reopened = store
        .move_task(space, task.id, PipelineStage::Done, PipelineStage::Review)
        .unwrap();
    assert_eq!(reopened.completed_at, None);
}

#[test]
fn removing_a_space_drops_only_its_tasks() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let other = Id::from_ulid(Ulid::new());
    store.create_space(Space::new(other, "Ops")).unwrap();
    for (i, stage) in PipelineStage::ALL.iter().cycle().take(5).enumerate() {
        store.add_task(space, *stage, draft(&format!("T{i}"))).unwrap();
    }
    store.add_task(other, PipelineStage::Todo, draft("Keep")).unwrap();

    let removed = store.remove_space(space).unwrap();

    assert_eq!(removed.len(), 5);
    assert!(store.tasks_for_space(space).is_empty());
    assert_eq!(store.tasks_for_space(other).len(), 1);
    assert!(store.space(space).is_none());
}

#[test]
fn last_assignee_cannot_be_removed() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let task = store
        .add_task(
            space,
            PipelineStage::Todo,
            TaskDraft::new("Triage")
                .assignee(Assignee::new("Ana").with_email("ana@example.com"))
                .assignee(Assignee::new("Bo").with_email("bo@example.com"))
                .assignee(Assignee::new("Cy").with_email("cy@example.com")),
        )
        .unwrap();

    store.remove_assignee(space, task.id, "ana@example.com").unwrap();
    store.remove_assignee(space, task.id, "BO@example.com").unwrap();
    let err = store.remove_assignee(space, task.id, "cy@example.com").unwrap_err();

    assert!(matches!(err, BoardError::Validation(_)));
    let left = store.task(space, task.id).unwrap().assignees;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].name, "Cy");
}

#[test]
fn add_assignee_rejects_duplicates() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let task = store.add_task(space, PipelineStage::Todo, draft("Plan")).unwrap();

    let updated = store
        .add_assignee(space, task.id, Assignee::new("Bo").with_email("bo@example.com"))
        .unwrap();
    assert_eq!(updated.assignees.len(), 2);

    let err = store
        .add_assignee(space, task.id, Assignee::new("Ana").with_email("ANA@example.com"))
        .unwrap_err();
    assert!(matches!(err, BoardError::Conflict(_)));
}

#[test]
fn update_and_delete_report_missing_tasks() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let task = store.add_task(space, PipelineStage::Review, draft("Plan")).unwrap();

    let updated = store
        .update_task(space, task.id, TaskPatch::default().title("Plan v2"))
        .unwrap();
    assert_eq!(updated.title, "Plan v2");
    assert_eq!(updated.stage, PipelineStage::Review);

    store.delete_task(space, task.id).unwrap();
    assert!(store.delete_task(space, task.id).unwrap_err().is_not_found());
    assert!(store
        .update_task(space, task.id, TaskPatch::default().title("x"))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn unknown_space_is_not_found() {
    let (store, _clock, _space) = store_with(IdAllocation::Counter);
    let err = store
        .add_task(Id::from_ulid(Ulid::new()), PipelineStage::Todo, draft("x"))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn invalid_draft_has_no_side_effect() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let err = store.add_task(space, PipelineStage::Todo, draft("  ")).unwrap_err();
    assert!(matches!(err, BoardError::Validation(_)));
    assert!(store.tasks_for_space(space).is_empty());
    assert_eq!(store.reserve_task_id(space).unwrap(), TaskId::new(1));
}

#[test]
fn listeners_run_after_each_mutation_until_unsubscribed() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let store = Arc::new(store);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let reader = Arc::clone(&store);
    let log = Arc::clone(&seen);
    let id = store.subscribe_fn(move |event| {
        // The store is readable from inside a listener.
        let count = reader.tasks_for_space(event.space_id()).len();
        log.lock().unwrap().push(count);
    });
    assert_eq!(store.listener_count(), 1);

    let task = store.add_task(space, PipelineStage::Todo, draft("A")).unwrap();
    store
        .move_task(space, task.id, PipelineStage::Todo, PipelineStage::Review)
        .unwrap();
    store.delete_task(space, task.id).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1, 1, 0]);

    assert!(store.unsubscribe(id));
    assert!(!store.unsubscribe(id));
    store.add_task(space, PipelineStage::Todo, draft("B")).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn watchers_receive_events() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let mut rx = store.watch();

    let task = store.add_task(space, PipelineStage::Todo, draft("A")).unwrap();
    store
        .move_task(space, task.id, PipelineStage::Todo, PipelineStage::Done)
        .unwrap();

    assert!(matches!(rx.recv().await.unwrap(), StoreEvent::TaskCreated { .. }));
    match rx.recv().await.unwrap() {
        StoreEvent::TaskMoved { from, to, .. } => {
            assert_eq!(from, PipelineStage::Todo);
            assert_eq!(to, PipelineStage::Done);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn reconcile_and_discard_follow_the_correlation_id() {
    let (store, _clock, space) = store_with(IdAllocation::Counter);
    let kept: CorrelationId = Id::from_ulid(Ulid::new());
    let dropped: CorrelationId = Id::from_ulid(Ulid::new());
    store
        .add_correlated(space, PipelineStage::Todo, draft("Kept"), Some(kept))
        .unwrap();
    store
        .add_correlated(space, PipelineStage::Todo, draft("Dropped"), Some(dropped))
        .unwrap();

    let remote: RemoteTaskId = Id::from_ulid(Ulid::new());
    let mut resolved = Assignee::new("Ana Lee").with_email("ana@example.com");
    resolved.user_id = Some(Id::from_ulid(Ulid::new()));
    let task = store
        .reconcile_remote_id(space, kept, remote, std::slice::from_ref(&resolved))
        .unwrap();
    assert_eq!(task.remote_id, Some(remote));
    assert_eq!(task.assignees[0].user_id, resolved.user_id);

    let gone = store.discard_correlated(space, dropped).unwrap();
    assert_eq!(gone.title, "Dropped");
    assert!(store.task_by_correlation(space, dropped).is_none());
    assert!(store.discard_correlated(space, dropped).is_none());
}
