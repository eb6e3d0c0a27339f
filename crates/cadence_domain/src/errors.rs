//! Unified engine error taxonomy. Every fallible operation in the scheduling
//! engine returns [`EngineError`] so that callers (and the sync queue) can
//! tell retryable store hiccups apart from terminal input problems.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed date input, missing required field, or an outcome value
    /// outside the accepted set. Programmer error; never caught internally.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Referenced task or source task does not exist or is not owned by the
    /// acting user.
    #[error("not found: {0}")]
    NotFound(String),

    /// A duplicate completion insert bypassed the upsert path.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A multi-write operation failed partway; the whole transaction has
    /// been rolled back.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// The backing store is temporarily unavailable. The only variant the
    /// sync queue treats as retryable.
    #[error("store unavailable: {0}")]
    Store(String),
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
