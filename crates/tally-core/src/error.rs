use tally_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("poll is inactive or expired")]
    PollInactiveOrExpired,
    #[error("option does not belong to this poll")]
    InvalidOption,
    #[error("already voted in this poll")]
    DuplicateVote,
    /// Storage aborted the unit of work for a reason that is not a business
    /// rule. Nothing was persisted; the caller may retry.
    #[error("transaction failed")]
    TransactionFailure,
    #[error("database error: {0}")]
    Database(DbError),
}

impl CoreError {
    /// Stable machine-readable code, shared by logs, counters and the API.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound => "NOT_FOUND",
            CoreError::PermissionDenied => "FORBIDDEN",
            CoreError::InvalidInput(_) => "BAD_REQUEST",
            CoreError::PollInactiveOrExpired => "POLL_CLOSED",
            CoreError::InvalidOption => "INVALID_OPTION",
            CoreError::DuplicateVote => "DUPLICATE_VOTE",
            CoreError::TransactionFailure => "TRANSACTION_FAILED",
            CoreError::Database(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DbError> for CoreError {
    fn from(e: DbError) -> Self {
        CoreError::Database(e)
    }
}

/// Map a storage fault on a read that runs before any unit of work opens.
/// Nothing was written, so the aborted-unit counter is left alone.
pub(crate) fn read_fault(context: &str, err: impl std::fmt::Display) -> CoreError {
    tracing::warn!("{context}: storage read failed: {err}");
    CoreError::TransactionFailure
}

/// Map a storage fault on a write path. The raw error is logged here and
/// never travels further up.
pub(crate) fn write_fault(context: &str, err: impl std::fmt::Display) -> CoreError {
    tracing::warn!("{context}: unit of work aborted: {err}");
    crate::observability::unit_of_work_aborted();
    CoreError::TransactionFailure
}
