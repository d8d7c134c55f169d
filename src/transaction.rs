use std::fmt;
use std::sync::LazyLock;

use postgres::Transaction as PgTransaction;
use regex::Regex;

use crate::connection::DbConnection;
use crate::error::SqlConduitError;
use crate::railway::Failure;

/// Lifecycle state of a [`DbTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Work may be executed; commit/rollback still possible.
    Active,
    /// Terminal: committed.
    Committed,
    /// Terminal: fully rolled back.
    RolledBack,
}

static SAVEPOINT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier pattern"));

/// A transaction bound to exactly one open connection for its entire
/// lifetime.
///
/// Commit and rollback are one-shot: once the transaction reaches a
/// terminal state, further completion attempts fail with
/// `SqlConduitError::TransactionState`. A partial rollback to a named
/// savepoint returns the transaction to [`TxState::Active`] instead.
pub struct DbTransaction<'conn> {
    tx: Option<PgTransaction<'conn>>,
    state: TxState,
    // Names journaled by `savepoint`, in creation order; kept for
    // diagnostics and to pre-validate `rollback_to` targets.
    savepoints: Vec<String>,
}

impl fmt::Debug for DbTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbTransaction")
            .field("state", &self.state)
            .field("savepoints", &self.savepoints)
            .finish()
    }
}

impl DbConnection {
    /// Begin a transaction on this connection.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState` if the connection is not
    /// open, or `SqlConduitError::Execution` if the server rejects the
    /// begin.
    pub fn begin(&mut self) -> Result<DbTransaction<'_>, SqlConduitError> {
        if !self.is_open() {
            return Err(SqlConduitError::InvalidState(
                "cannot begin a transaction on a closed connection".into(),
            ));
        }
        let tx = self
            .client_mut()?
            .transaction()
            .map_err(|e| SqlConduitError::Execution(format!("begin failed: {e}")))?;
        tracing::debug!("transaction started");
        Ok(DbTransaction {
            tx: Some(tx),
            state: TxState::Active,
            savepoints: Vec::new(),
        })
    }
}

impl<'conn> DbTransaction<'conn> {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Savepoint names journaled so far, in creation order.
    #[must_use]
    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    /// Mutable access to the driver transaction for statement execution.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState` if the transaction is no
    /// longer active.
    pub(crate) fn driver_tx(&mut self) -> Result<&mut PgTransaction<'conn>, SqlConduitError> {
        self.require_active()?;
        self.tx.as_mut().ok_or_else(|| {
            SqlConduitError::InvalidState("transaction has already completed".into())
        })
    }

    /// # Errors
    /// Returns `SqlConduitError::InvalidState` if the transaction is no
    /// longer active.
    pub(crate) fn require_active(&self) -> Result<(), SqlConduitError> {
        match self.state {
            TxState::Active => Ok(()),
            TxState::Committed => Err(SqlConduitError::InvalidState(
                "transaction already committed".into(),
            )),
            TxState::RolledBack => Err(SqlConduitError::InvalidState(
                "transaction already rolled back".into(),
            )),
        }
    }

    fn take_for_completion(
        &mut self,
        op: &str,
    ) -> Result<PgTransaction<'conn>, SqlConduitError> {
        match self.state {
            TxState::Active => self.tx.take().ok_or_else(|| {
                SqlConduitError::TransactionState(format!(
                    "cannot {op}: transaction already completed"
                ))
            }),
            TxState::Committed => Err(SqlConduitError::TransactionState(format!(
                "cannot {op}: transaction already committed"
            ))),
            TxState::RolledBack => Err(SqlConduitError::TransactionState(format!(
                "cannot {op}: transaction already rolled back"
            ))),
        }
    }

    /// Commit the transaction. Terminal on success; a server-rejected
    /// commit (e.g. a constraint deferred to commit time) leaves the
    /// transaction rolled back and surfaces as `Execution`.
    ///
    /// # Errors
    /// Returns `SqlConduitError::TransactionState` if already terminal, or
    /// `SqlConduitError::Execution` if the server rejects the commit.
    pub fn commit(&mut self) -> Result<(), SqlConduitError> {
        let tx = self.take_for_completion("commit")?;
        match tx.commit() {
            Ok(()) => {
                self.state = TxState::Committed;
                tracing::debug!("transaction committed");
                Ok(())
            }
            Err(e) => {
                // The server aborts the transaction when commit is rejected.
                self.state = TxState::RolledBack;
                Err(SqlConduitError::Execution(format!("commit rejected: {e}")))
            }
        }
    }

    /// Roll the transaction back fully. Terminal.
    ///
    /// # Errors
    /// Returns `SqlConduitError::TransactionState` if already terminal, or
    /// `SqlConduitError::Execution` if the rollback itself fails.
    pub fn rollback(&mut self) -> Result<(), SqlConduitError> {
        let tx = self.take_for_completion("rollback")?;
        self.state = TxState::RolledBack;
        tx.rollback()
            .map_err(|e| SqlConduitError::Execution(format!("rollback failed: {e}")))?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }

    /// Record a named savepoint. The transaction stays active; the name is
    /// journaled so a later [`DbTransaction::rollback_to`] can target it.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState` if not active,
    /// `SqlConduitError::Parameter` if the name is not a plain identifier,
    /// or `SqlConduitError::Execution` if the server rejects it.
    pub fn savepoint(&mut self, name: &str) -> Result<(), SqlConduitError> {
        validate_savepoint_name(name)?;
        self.driver_tx()?
            .batch_execute(&format!("SAVEPOINT \"{name}\""))
            .map_err(|e| SqlConduitError::Execution(format!("savepoint {name} failed: {e}")))?;
        if !self.savepoints.iter().any(|s| s == name) {
            self.savepoints.push(name.to_owned());
        }
        tracing::debug!("savepoint {name} recorded");
        Ok(())
    }

    /// Roll back to a named savepoint. This is a partial rollback: effects
    /// since the savepoint are discarded and the transaction returns to
    /// [`TxState::Active`]. Savepoints recorded after the target are
    /// discarded along with the work.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState` if not active or the name
    /// was never journaled, or `SqlConduitError::Execution` if the server
    /// rejects the rollback.
    pub fn rollback_to(&mut self, name: &str) -> Result<(), SqlConduitError> {
        validate_savepoint_name(name)?;
        let pos = self
            .savepoints
            .iter()
            .position(|s| s == name)
            .ok_or_else(|| {
                SqlConduitError::InvalidState(format!("unknown savepoint \"{name}\""))
            })?;
        self.driver_tx()?
            .batch_execute(&format!("ROLLBACK TO SAVEPOINT \"{name}\""))
            .map_err(|e| {
                SqlConduitError::Execution(format!("rollback to savepoint {name} failed: {e}"))
            })?;
        self.savepoints.truncate(pos + 1);
        tracing::debug!("rolled back to savepoint {name}");
        Ok(())
    }

    /// The single policy point coupling a unit of work's outcome to
    /// persistence: commit on `Ok`, roll back fully on `Err`.
    ///
    /// The outcome value passes through unchanged, except that a rejected
    /// commit replaces an `Ok` with the commit failure. A rollback failure
    /// under an already-failed outcome is logged and suppressed so the
    /// original failure wins.
    ///
    /// # Errors
    /// Returns the original `Failure`, or one derived from a rejected
    /// commit.
    pub fn commit_or_rollback<T>(&mut self, outcome: Result<T, Failure>) -> Result<T, Failure> {
        match outcome {
            Ok(value) => match self.commit() {
                Ok(()) => Ok(value),
                Err(e) => Err(Failure::from(e)),
            },
            Err(failure) => {
                if let Err(e) = self.rollback() {
                    tracing::warn!("rollback after failed unit of work also failed: {e}");
                }
                Err(failure)
            }
        }
    }
}

impl Drop for DbTransaction<'_> {
    fn drop(&mut self) {
        // The driver transaction rolls itself back on drop; only note it.
        if self.state == TxState::Active && self.tx.is_some() {
            tracing::debug!("active transaction dropped; rolling back");
        }
    }
}

fn validate_savepoint_name(name: &str) -> Result<(), SqlConduitError> {
    if SAVEPOINT_NAME.is_match(name) {
        Ok(())
    } else {
        Err(SqlConduitError::Parameter(format!(
            "invalid savepoint name {name:?}"
        )))
    }
}
