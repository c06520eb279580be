//! Errors - エラー型と分類
//!
//! - `Validation`: 入力不正。副作用の前に拒否する
//! - `NotFound`: 対象が存在しない、または終端状態からの遷移
//! - `Duplicate`: 既にメンバー / 既に pending の招待がある
//! - `Conflict`: 同時実行で負けた更新
//! - `Remote`: リモートサービスの障害

use thiserror::Error;

/// Failure reported by the remote persistent service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote service unavailable: {0}")]
    Unavailable(String),

    #[error("unique constraint violated on {0}")]
    UniqueViolation(String),

    #[error("remote rejected the request: {0}")]
    Rejected(String),
}

/// Which record made a create request a duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Duplicate {
    /// The target already holds a membership in the space.
    AlreadyMember { email: String },
    /// A pending invite for the same target already exists.
    PendingInvite { email: String, code: String },
}

impl std::fmt::Display for Duplicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Duplicate::AlreadyMember { email } => write!(f, "{email} is already a member"),
            Duplicate::PendingInvite { email, code } => {
                write!(f, "{email} already has a pending invite ({code})")
            }
        }
    }
}

/// BoardError はドメインエラー
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("duplicate: {0}")]
    Duplicate(Duplicate),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl BoardError {
    pub fn validation(message: impl Into<String>) -> Self {
        BoardError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        BoardError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BoardError::NotFound { .. })
    }
}
