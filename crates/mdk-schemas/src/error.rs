use crate::{MemoId, MemoStatus};

/// Every failure a memo operation can surface to its caller.
///
/// None of these are retried internally. The caller presents the error and
/// the prior record stays as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoError {
    /// No memo exists under this id.
    #[error("memo not found: {0}")]
    NotFound(MemoId),

    /// No user is registered under this id.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// The action is not legal from the memo's current status.
    #[error("illegal memo transition: {from} + {action}")]
    InvalidTransition { from: MemoStatus, action: String },

    /// Missing or malformed input, or a transition guard that did not hold.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The persistence layer failed. Nothing was applied.
    #[error("store write failed: {0}")]
    Write(String),
}

impl MemoError {
    /// Stable machine-readable tag used in HTTP bodies and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            MemoError::NotFound(_) => "not_found",
            MemoError::UserNotFound(_) => "user_not_found",
            MemoError::InvalidTransition { .. } => "invalid_transition",
            MemoError::Validation(_) => "validation",
            MemoError::Write(_) => "write",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        MemoError::Validation(msg.into())
    }

    pub fn write(err: impl std::fmt::Display) -> Self {
        MemoError::Write(err.to_string())
    }
}
