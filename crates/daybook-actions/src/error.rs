//! Error taxonomy for action dispatch.

use daybook_db::StoreError;
use thiserror::Error;

/// Errors surfaced to the top-level caller of an action.
///
/// Nothing is retried inside this layer: every variant means the whole
/// transaction, including all nested invokes, rolled back.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action name is not registered (top-level or nested).
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// A handler rejected its input before writing anything it keeps.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The relational store failed; constraint violations and missing
    /// rows keep their identity through this wrapper.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No database connection could be checked out.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl ActionError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when the underlying failure is a store constraint violation.
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_constraint())
    }

    /// True when the underlying failure is a missing row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}

impl From<rusqlite::Error> for ActionError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(StoreError::from(e))
    }
}
