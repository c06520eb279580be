//! Timeline entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::PipelineStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Create,
    Move,
    Complete,
    Delete,
    Comment,
    Assign,
}

impl ActivityKind {
    /// Verb shown between the actor and the task title.
    pub fn verb(self) -> &'static str {
        match self {
            ActivityKind::Create => "created",
            ActivityKind::Move => "moved",
            ActivityKind::Complete => "completed",
            ActivityKind::Delete => "deleted",
            ActivityKind::Comment => "commented on",
            ActivityKind::Assign => "assigned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub kind: ActivityKind,
    pub actor: String,
    pub task_title: String,
    pub from: Option<PipelineStage>,
    pub to: Option<PipelineStage>,
    pub at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        kind: ActivityKind,
        actor: impl Into<String>,
        task_title: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            actor: actor.into(),
            task_title: task_title.into(),
            from: None,
            to: None,
            at,
        }
    }

    pub fn between(mut self, from: PipelineStage, to: PipelineStage) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// One-line rendering, e.g. `Ana moved "Write report" (todo -> review)`.
    pub fn summary(&self) -> String {
        let mut line = format!("{} {} \"{}\"", self.actor, self.kind.verb(), self.task_title);
        if let (Some(from), Some(to)) = (self.from, self.to) {
            line.push_str(&format!(" ({from} -> {to})"));
        }
        line
    }
}
