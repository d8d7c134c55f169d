//! Railway-style adapter: run a fallible unit of work and get its failure
//! back as a plain value instead of a propagating error.

use std::fmt;

use crate::error::SqlConduitError;

/// A human-readable failure description; the error currency of
/// value-based control flow.
///
/// Pairs with [`crate::transaction::DbTransaction::commit_or_rollback`]:
/// an `Err(Failure)` outcome rolls the governing transaction back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    description: String,
}

impl Failure {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl std::error::Error for Failure {}

impl From<SqlConduitError> for Failure {
    fn from(err: SqlConduitError) -> Self {
        Failure::new(err.to_string())
    }
}

/// Run `op`, converting any raised [`SqlConduitError`] into an
/// `Err(Failure)` value. Never re-raises; a successful value passes
/// through in `Ok`.
///
/// The canonical composition ties a fallible unit of work to transactional
/// durability:
/// ```rust,no_run
/// # use sql_conduit::{DbConnection, Statement, try_run};
/// # fn demo(conn: &mut DbConnection) -> Result<(), Box<dyn std::error::Error>> {
/// let mut tx = conn.begin()?;
/// let cmd = tx.bind(Statement::text("delete from staging"))?;
/// let outcome = try_run(|| tx.execute(&cmd));
/// tx.commit_or_rollback(outcome)?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Returns `Err(Failure)` describing the operation's error.
pub fn try_run<T, F>(op: F) -> Result<T, Failure>
where
    F: FnOnce() -> Result<T, SqlConduitError>,
{
    op().map_err(|e| {
        tracing::warn!("operation failed: {e}");
        Failure::from(e)
    })
}
