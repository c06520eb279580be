//! Task cards and their assignees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::validate_email;
use super::errors::BoardError;
use super::ids::{CorrelationId, RemoteTaskId, SpaceId, TaskId, UserId};
use super::stage::PipelineStage;

/// Due date of a task. All-day dues ignore the time component when shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Due {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
}

impl Due {
    pub fn at(at: DateTime<Utc>) -> Self {
        Self { at, all_day: false }
    }

    pub fn all_day(at: DateTime<Utc>) -> Self {
        Self { at, all_day: true }
    }
}

/// Denormalized display descriptor of a person responsible for a task.
///
/// `user_id` is filled in once the descriptor has been resolved against the
/// space's roster; until then only the display fields are trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub name: String,
    pub avatar: Option<String>,
    pub initials: String,
    pub email: Option<String>,
    pub user_id: Option<UserId>,
}

impl Assignee {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into().trim().to_string();
        let initials = initials_of(&name);
        Self {
            name,
            avatar: None,
            initials,
            email: None,
            user_id: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Key used to tell assignees of one task apart: the address when known,
    /// else the display name.
    pub fn key(&self) -> String {
        match &self.email {
            Some(email) => email.trim().to_lowercase(),
            None => self.name.to_lowercase(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.user_id.is_some()
    }

    /// Validate the descriptor at the input boundary and normalize its address.
    pub fn validated(mut self) -> Result<Self, BoardError> {
        if self.name.trim().is_empty() {
            return Err(BoardError::validation("assignee name must not be empty"));
        }
        if let Some(email) = &self.email {
            self.email = Some(validate_email(email)?);
        }
        if self.initials.is_empty() {
            self.initials = initials_of(&self.name);
        }
        Ok(self)
    }
}

/// First letter of the first two words, upper-cased.
fn initials_of(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}

/// A card on a space's board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub space_id: SpaceId,
    pub title: String,
    pub description: String,
    pub due: Option<Due>,
    pub created_at: DateTime<Utc>,
    /// Set iff `stage` is terminal.
    pub completed_at: Option<DateTime<Utc>>,
    /// Never empty.
    pub assignees: Vec<Assignee>,
    pub stage: PipelineStage,
    pub correlation_id: Option<CorrelationId>,
    pub remote_id: Option<RemoteTaskId>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Put the task into `stage`, keeping `completed_at` consistent with it.
    pub fn enter_stage(&mut self, stage: PipelineStage, now: DateTime<Utc>) {
        self.stage = stage;
        self.completed_at = stage.is_terminal().then_some(now);
    }
}

/// User input for a new task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due: Option<Due>,
    pub assignees: Vec<Assignee>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn due(mut self, due: Due) -> Self {
        self.due = Some(due);
        self
    }

    pub fn assignee(mut self, assignee: Assignee) -> Self {
        self.assignees.push(assignee);
        self
    }

    /// Reject empty titles, empty assignee lists and malformed assignees.
    pub fn validate(self) -> Result<Self, BoardError> {
        let title = validate_title(&self.title)?;
        let assignees = validate_assignees(self.assignees)?;
        Ok(Self {
            title,
            description: self.description.trim().to_string(),
            due: self.due,
            assignees,
        })
    }
}

/// Partial update of a task. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` clears the due date.
    pub due: Option<Option<Due>>,
    pub assignees: Option<Vec<Assignee>>,
}

impl TaskPatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn due(mut self, due: Option<Due>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn assignees(mut self, assignees: Vec<Assignee>) -> Self {
        self.assignees = Some(assignees);
        self
    }

    pub fn validate(self) -> Result<Self, BoardError> {
        let title = self.title.as_deref().map(validate_title).transpose()?;
        let assignees = self.assignees.map(validate_assignees).transpose()?;
        Ok(Self {
            title,
            description: self.description.map(|d| d.trim().to_string()),
            due: self.due,
            assignees,
        })
    }

    /// Apply an already validated patch.
    pub(crate) fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(due) = self.due {
            task.due = due;
        }
        if let Some(assignees) = self.assignees {
            task.assignees = assignees;
        }
    }
}

fn validate_title(title: &str) -> Result<String, BoardError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(BoardError::validation("task title must not be empty"));
    }
    Ok(title.to_string())
}

fn validate_assignees(assignees: Vec<Assignee>) -> Result<Vec<Assignee>, BoardError> {
    if assignees.is_empty() {
        return Err(BoardError::validation("a task needs at least one assignee"));
    }
    let mut validated: Vec<Assignee> = Vec::with_capacity(assignees.len());
    for assignee in assignees {
        let assignee = assignee.validated()?;
        if validated.iter().any(|a| a.key() == assignee.key()) {
            continue;
        }
        validated.push(assignee);
    }
    Ok(validated)
}
