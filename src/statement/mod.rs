//! Typed statements and their binding to a transaction.
//!
//! A [`Statement`] is a unit of SQL text or a stored-procedure invocation,
//! not yet tied to a session. Binding it to an active transaction yields a
//! [`BoundCommand`], which carries the resolved [`CommandKind`] and an
//! ordered, name-keyed parameter set. Text bodies reference parameters as
//! `@name`; realization to driver SQL happens at execution time.

mod scan;

use crate::error::SqlConduitError;
use crate::transaction::DbTransaction;
use crate::values::SqlValue;

use scan::resolve_named_placeholders;

/// A parameterized unit of SQL, not yet bound to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Plain SQL text with `@name` placeholders.
    Text(String),
    /// A stored-procedure invocation by (optionally schema-qualified) name.
    Procedure(String),
}

impl Statement {
    #[must_use]
    pub fn text(sql: impl Into<String>) -> Self {
        Statement::Text(sql.into())
    }

    #[must_use]
    pub fn procedure(name: impl Into<String>) -> Self {
        Statement::Procedure(name.into())
    }
}

/// How a bound command executes on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Text,
    StoredProcedure,
}

/// A [`Statement`] resolved against a live transaction, ready to take
/// parameters and execute.
#[derive(Debug, Clone)]
pub struct BoundCommand {
    kind: CommandKind,
    body: String,
    params: Vec<(String, SqlValue)>,
}

impl BoundCommand {
    fn new(statement: Statement) -> Self {
        let (kind, body) = match statement {
            Statement::Text(sql) => (CommandKind::Text, sql),
            Statement::Procedure(name) => (CommandKind::StoredProcedure, name),
        };
        Self {
            kind,
            body,
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Attach a named parameter. A leading `@` on the name is accepted and
    /// stripped. Attaching a name twice overwrites the prior value in place
    /// (last write wins); the original attachment order is kept.
    #[must_use]
    pub fn with_param(mut self, name: impl AsRef<str>, value: impl Into<SqlValue>) -> Self {
        let name = name.as_ref().trim_start_matches('@').to_owned();
        let value = value.into();
        if let Some(slot) = self.params.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.params.push((name, value));
        }
        self
    }

    /// Attach a sequence of named parameters, in order.
    #[must_use]
    pub fn with_params<I, N, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<SqlValue>,
    {
        for (name, value) in params {
            self = self.with_param(name, value);
        }
        self
    }

    /// The attached parameters, in attachment order.
    #[must_use]
    pub fn params(&self) -> &[(String, SqlValue)] {
        &self.params
    }

    /// Resolve the command to driver SQL and an ordered value list.
    ///
    /// Text bodies have `@name` placeholders rewritten to `$n`; procedure
    /// invocations realize to `CALL "name"($1..$n)` with parameters in
    /// attachment order.
    pub(crate) fn realize(&self) -> Result<RealizedCommand<'_>, SqlConduitError> {
        match self.kind {
            CommandKind::Text => {
                let (sql, order) = resolve_named_placeholders(&self.body, &self.params)?;
                let values = order.iter().map(|&i| &self.params[i].1).collect();
                Ok(RealizedCommand { sql, values })
            }
            CommandKind::StoredProcedure => {
                let placeholders = (1..=self.params.len())
                    .map(|i| format!("${i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!("CALL {}({placeholders})", quote_qualified(&self.body));
                let values = self.params.iter().map(|(_, v)| v).collect();
                Ok(RealizedCommand { sql, values })
            }
        }
    }
}

/// Driver-ready SQL plus parameter values in placeholder order.
pub(crate) struct RealizedCommand<'a> {
    pub(crate) sql: String,
    pub(crate) values: Vec<&'a SqlValue>,
}

impl RealizedCommand<'_> {
    pub(crate) fn param_refs(&self) -> Vec<&(dyn postgres::types::ToSql + Sync)> {
        self.values
            .iter()
            .map(|v| *v as &(dyn postgres::types::ToSql + Sync))
            .collect()
    }
}

/// Quote a possibly schema-qualified name, one segment at a time.
pub(crate) fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(|segment| format!("\"{}\"", segment.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

impl DbTransaction<'_> {
    /// Bind a statement to this transaction, resolving its command kind.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState` if the transaction is not
    /// active.
    pub fn bind(&self, statement: Statement) -> Result<BoundCommand, SqlConduitError> {
        self.require_active()?;
        Ok(BoundCommand::new(statement))
    }

    /// Bind a statement and attach parameters in one call; the idiomatic
    /// entry point for the execution helpers.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState` if the transaction is not
    /// active.
    pub fn bind_with_params<I, N, V>(
        &self,
        statement: Statement,
        params: I,
    ) -> Result<BoundCommand, SqlConduitError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<SqlValue>,
    {
        Ok(self.bind(statement)?.with_params(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(statement: Statement) -> BoundCommand {
        BoundCommand::new(statement)
    }

    #[test]
    fn text_statement_realizes_with_positional_placeholders() {
        let cmd = bound(Statement::text("update t set a = @a where id = @id"))
            .with_param("a", 5i64)
            .with_param("id", 9i64);
        let realized = cmd.realize().unwrap();
        assert_eq!(realized.sql, "update t set a = $1 where id = $2");
        assert_eq!(
            realized.values,
            vec![&SqlValue::Int(5), &SqlValue::Int(9)]
        );
    }

    #[test]
    fn duplicate_names_last_write_wins() {
        let cmd = bound(Statement::text("select @v"))
            .with_param("v", 1i64)
            .with_param("v", 2i64);
        assert_eq!(cmd.params().len(), 1);
        let realized = cmd.realize().unwrap();
        assert_eq!(realized.values, vec![&SqlValue::Int(2)]);
    }

    #[test]
    fn at_prefix_on_names_is_stripped() {
        let cmd = bound(Statement::text("select @v")).with_param("@v", 3i64);
        assert_eq!(cmd.params()[0].0, "v");
        assert!(cmd.realize().is_ok());
    }

    #[test]
    fn procedure_realizes_to_call_with_attachment_order() {
        let cmd = bound(Statement::procedure("audit.log_event"))
            .with_param("kind", "login")
            .with_param("actor", 42i64);
        let realized = cmd.realize().unwrap();
        assert_eq!(realized.sql, "CALL \"audit\".\"log_event\"($1, $2)");
        assert_eq!(
            realized.values,
            vec![&SqlValue::Text("login".into()), &SqlValue::Int(42)]
        );
    }

    #[test]
    fn procedure_without_params_realizes_to_empty_call() {
        let cmd = bound(Statement::procedure("refresh_totals"));
        let realized = cmd.realize().unwrap();
        assert_eq!(realized.sql, "CALL \"refresh_totals\"()");
        assert!(realized.values.is_empty());
    }

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(quote_qualified("we\"ird"), "\"we\"\"ird\"");
    }
}
