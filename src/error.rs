use thiserror::Error;

/// Error taxonomy for the access layer.
///
/// Driver failures are classified at the failure site rather than forwarded
/// transparently, because callers route control flow off the category:
/// lifecycle misuse (`InvalidState`, `TransactionState`) is a programming
/// error and is never retried or swallowed, while server-side rejections
/// (`Execution`, `BulkLoad`) are the ones worth converting into values via
/// [`crate::railway::try_run`].
#[derive(Debug, Error)]
pub enum SqlConduitError {
    /// A session could not be established or maintained.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// An operation was attempted against a connection or transaction in the
    /// wrong lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Commit or rollback was attempted on a transaction that already
    /// reached a terminal state.
    #[error("Transaction state error: {0}")]
    TransactionState(String),

    /// The server rejected a statement (constraint violation, syntax error,
    /// timeout).
    #[error("SQL execution error: {0}")]
    Execution(String),

    /// A bulk copy was rejected or interrupted mid-stream.
    #[error("Bulk load error: {0}")]
    BulkLoad(String),

    /// A user-supplied scalar/row mapping failed.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Parameter binding failed (missing placeholder value, invalid
    /// identifier).
    #[error("Parameter error: {0}")]
    Parameter(String),
}

impl SqlConduitError {
    /// Build a `Mapping` error; convenience for row/scalar mapping closures.
    #[must_use]
    pub fn mapping(msg: impl Into<String>) -> Self {
        SqlConduitError::Mapping(msg.into())
    }
}
