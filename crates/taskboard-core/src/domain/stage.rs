//! Pipeline stages of a board.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four ordered columns of a space's pipeline.
///
/// State transitions are unrestricted (a card may be dragged anywhere), but
/// `Done` is the single terminal stage for completion-timestamp purposes:
/// a task carries `completed_at` iff it sits in `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
    Todo,
    InProgress,
    Review,
    Done,
}

impl PipelineStage {
    /// All stages in pipeline order.
    pub const ALL: [PipelineStage; 4] = [
        PipelineStage::Todo,
        PipelineStage::InProgress,
        PipelineStage::Review,
        PipelineStage::Done,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done)
    }

    /// Position of the stage's list inside a pipeline.
    pub fn index(self) -> usize {
        match self {
            PipelineStage::Todo => 0,
            PipelineStage::InProgress => 1,
            PipelineStage::Review => 2,
            PipelineStage::Done => 3,
        }
    }

    /// Name used in the remote `tasks.status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Todo => "todo",
            PipelineStage::InProgress => "inProgress",
            PipelineStage::Review => "review",
            PipelineStage::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
