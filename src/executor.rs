//! The three execution modes over a bound command: no-result, scalar with
//! mapping, and lazy row streaming with mapping.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use fallible_iterator::FallibleIterator;
use postgres::RowIter;
use serde_json::Value as JsonValue;

use crate::error::SqlConduitError;
use crate::statement::BoundCommand;
use crate::transaction::DbTransaction;
use crate::values::{SqlRow, SqlValue};

impl<'conn> DbTransaction<'conn> {
    /// Run a command and discard the affected-row count.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState` if the transaction is not
    /// active, `SqlConduitError::Parameter` if placeholder resolution
    /// fails, or `SqlConduitError::Execution` on server-side rejection.
    pub fn execute(&mut self, command: &BoundCommand) -> Result<(), SqlConduitError> {
        let realized = command.realize()?;
        let refs = realized.param_refs();
        self.driver_tx()?
            .execute(realized.sql.as_str(), &refs)
            .map_err(|e| SqlConduitError::Execution(format!("statement rejected: {e}")))?;
        Ok(())
    }

    /// Run a command and map the first column of the first row.
    ///
    /// A query producing zero rows maps [`SqlValue::Null`]; write the
    /// mapping defensively. Mapping failures propagate uncaught; route the
    /// call through [`crate::railway::try_run`] to capture them as values.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState`, `SqlConduitError::Parameter`,
    /// or `SqlConduitError::Execution` as for [`DbTransaction::execute`],
    /// plus whatever the mapping returns.
    pub fn query_scalar<T, F>(
        &mut self,
        command: &BoundCommand,
        map: F,
    ) -> Result<T, SqlConduitError>
    where
        F: FnOnce(&SqlValue) -> Result<T, SqlConduitError>,
    {
        let realized = command.realize()?;
        let refs = realized.param_refs();
        let tx = self.driver_tx()?;
        let mut rows = tx
            .query_raw(realized.sql.as_str(), refs)
            .map_err(|e| SqlConduitError::Execution(format!("query rejected: {e}")))?;
        let first = rows
            .next()
            .map_err(|e| SqlConduitError::Execution(format!("row fetch failed: {e}")))?;
        drop(rows);

        let value = match first {
            Some(row) => extract_value(&row, 0)?,
            None => SqlValue::Null,
        };
        map(&value)
    }

    /// Run a command and stream mapped rows lazily.
    ///
    /// The returned [`RowStream`] is single-pass and not restartable; each
    /// element is materialized only when the consumer asks for it. The
    /// stream borrows this transaction mutably, so commit and rollback
    /// cannot interleave with iteration; dropping the stream (exhausted or
    /// abandoned) releases the underlying cursor.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState`, `SqlConduitError::Parameter`,
    /// or `SqlConduitError::Execution` as for [`DbTransaction::execute`].
    pub fn query_rows<'tx, T, F>(
        &'tx mut self,
        command: &BoundCommand,
        map: F,
    ) -> Result<RowStream<'tx, T, F>, SqlConduitError>
    where
        F: FnMut(&SqlRow) -> Result<T, SqlConduitError>,
    {
        let realized = command.realize()?;
        let refs = realized.param_refs();
        let inner = self
            .driver_tx()?
            .query_raw(realized.sql.as_str(), refs)
            .map_err(|e| SqlConduitError::Execution(format!("query rejected: {e}")))?;
        Ok(RowStream {
            inner,
            columns: None,
            map,
            _item: PhantomData,
        })
    }
}

/// Lazy, pull-driven sequence of mapped rows in server-return order.
///
/// Yields `Result<T, SqlConduitError>` per row; a fetch or mapping failure
/// surfaces as an `Err` element. Dropping the stream closes the underlying
/// cursor whether or not it was exhausted.
pub struct RowStream<'tx, T, F> {
    inner: RowIter<'tx>,
    columns: Option<Arc<Vec<String>>>,
    map: F,
    _item: PhantomData<fn() -> T>,
}

impl<'tx, T, F> RowStream<'tx, T, F>
where
    F: FnMut(&SqlRow) -> Result<T, SqlConduitError>,
{
    fn materialize(&mut self, row: &postgres::Row) -> Result<T, SqlConduitError> {
        let columns = self.columns.get_or_insert_with(|| {
            Arc::new(
                row.columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect(),
            )
        });
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(extract_value(row, idx)?);
        }
        let sql_row = SqlRow::new(Arc::clone(columns), values);
        (self.map)(&sql_row)
    }
}

impl<'tx, T, F> Iterator for RowStream<'tx, T, F>
where
    F: FnMut(&SqlRow) -> Result<T, SqlConduitError>,
{
    type Item = Result<T, SqlConduitError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Ok(Some(row)) => Some(self.materialize(&row)),
            Ok(None) => None,
            Err(e) => Some(Err(SqlConduitError::Execution(format!(
                "row fetch failed: {e}"
            )))),
        }
    }
}

/// Extract a [`SqlValue`] from a driver row at the given index, dispatching
/// on the column's declared type.
pub(crate) fn extract_value(
    row: &postgres::Row,
    idx: usize,
) -> Result<SqlValue, SqlConduitError> {
    let type_name = row.columns()[idx].type_().name().to_string();
    let decode = |e: postgres::Error| {
        SqlConduitError::Execution(format!("column {idx} ({type_name}) decode failed: {e}"))
    };

    match type_name.as_str() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, SqlValue::Int))
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, |v| SqlValue::Float(f64::from(v))))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, SqlValue::Float))
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, SqlValue::Bool))
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, SqlValue::Timestamp))
        }
        "timestamptz" => {
            let val: Option<DateTime<Utc>> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, |v| SqlValue::Timestamp(v.naive_utc())))
        }
        "json" | "jsonb" => {
            let val: Option<JsonValue> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, SqlValue::Json))
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, SqlValue::Bytes))
        }
        // text, varchar, char, name, and anything else representable as text
        _ => {
            let val: Option<String> = row.try_get(idx).map_err(decode)?;
            Ok(val.map_or(SqlValue::Null, SqlValue::Text))
        }
    }
}
