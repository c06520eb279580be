//! Ephemeral activity timeline.
//!
//! Memory-resident only: nothing here survives a restart, and it is not a
//! mirror of any remote audit table.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::domain::{Activity, ActivityKind};
use crate::ports::Clock;
use crate::store::{StoreEvent, StoreListener};

pub const DEFAULT_CAPACITY: usize = 50;

/// Bounded, newest-first log of board mutations.
pub struct ActivityRecorder {
    entries: Mutex<VecDeque<Activity>>,
    capacity: usize,
    actor: String,
    clock: Arc<dyn Clock>,
}

impl ActivityRecorder {
    /// `actor` is the display name attributed to mutations observed through
    /// the store (the session user of this client).
    pub fn new(capacity: usize, actor: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            actor: actor.into(),
            clock,
        }
    }

    fn entries_mut(&self) -> MutexGuard<'_, VecDeque<Activity>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push to the front, evicting the oldest entries beyond capacity.
    pub fn record(&self, activity: Activity) {
        let mut entries = self.entries_mut();
        entries.push_front(activity);
        entries.truncate(self.capacity);
    }

    pub fn record_comment(&self, task_title: &str) {
        self.record(Activity::new(
            ActivityKind::Comment,
            &self.actor,
            task_title,
            self.clock.now(),
        ));
    }

    /// Newest first.
    pub fn entries(&self) -> Vec<Activity> {
        self.entries_mut().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<Activity> {
        self.entries_mut().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries_mut().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn activity_for(&self, event: &StoreEvent) -> Option<Activity> {
        let now = self.clock.now();
        let activity = match event {
            StoreEvent::TaskCreated { task } => {
                Activity::new(ActivityKind::Create, &self.actor, &task.title, now)
            }
            StoreEvent::TaskMoved { task, from, to } => {
                let kind = if to.is_terminal() && !from.is_terminal() {
                    ActivityKind::Complete
                } else {
                    ActivityKind::Move
                };
                Activity::new(kind, &self.actor, &task.title, now).between(*from, *to)
            }
            StoreEvent::TaskDeleted { task } | StoreEvent::TaskDiscarded { task } => {
                Activity::new(ActivityKind::Delete, &self.actor, &task.title, now)
            }
            StoreEvent::AssigneeAdded { task, .. } => {
                Activity::new(ActivityKind::Assign, &self.actor, &task.title, now)
            }
            _ => return None,
        };
        Some(activity)
    }
}

impl StoreListener for ActivityRecorder {
    fn on_event(&self, event: &StoreEvent) {
        if let Some(activity) = self.activity_for(event) {
            self.record(activity);
        }
    }
}

/// Relative age of `at` as seen at `now`, in minute/hour/day buckets.
pub fn time_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(at);
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", elapsed.num_days())
}
