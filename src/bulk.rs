//! High-throughput loading of tabular data via the COPY protocol.
//!
//! A bulk load streams rows from a pull-based [`RowSource`] into a
//! destination table under explicit column mappings. Two governing scopes
//! are supported, chosen by entry point: [`DbTransaction::bulk_insert`]
//! joins an existing transaction, [`DbConnection::bulk_insert`] opens and
//! completes its own. Either way the load is all-or-nothing within its
//! governing transaction.

use std::io::Write;

use crate::connection::DbConnection;
use crate::error::SqlConduitError;
use crate::statement::quote_qualified;
use crate::transaction::DbTransaction;
use crate::values::SqlValue;

/// One (source column, destination column) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub source: String,
    pub destination: String,
}

impl ColumnMapping {
    #[must_use]
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Fixed bulk-load policy. These are constants of the loader, not knobs on
/// the call: COPY always checks constraints, explicit column values keep
/// identities, and loads run unlocked.
#[derive(Debug, Clone, Copy)]
pub struct BulkLoadOptions {
    pub check_constraints: bool,
    pub keep_identity: bool,
    pub table_lock: bool,
}

const OPTIONS: BulkLoadOptions = BulkLoadOptions {
    check_constraints: true,
    keep_identity: true,
    table_lock: false,
};

/// A pull-based source of tabular rows.
///
/// A successful bulk load exhausts the source; it must not be reused
/// afterward.
pub trait RowSource {
    /// Source column names, in source order.
    fn columns(&self) -> &[String];

    /// Pull the next row, or `Ok(None)` when exhausted. Row values are in
    /// [`RowSource::columns`] order.
    ///
    /// # Errors
    /// Implementations surface their own read failures.
    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, SqlConduitError>;
}

/// An in-memory [`RowSource`] over pre-built rows.
#[derive(Debug)]
pub struct MemoryRowSource {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
}

impl MemoryRowSource {
    #[must_use]
    pub fn new<N: Into<String>>(columns: Vec<N>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for MemoryRowSource {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, SqlConduitError> {
        Ok(self.rows.next())
    }
}

/// Resolved copy target: destination SQL and, per destination column, the
/// index of the mapped source column.
#[derive(Debug)]
struct CopyPlan {
    copy_sql: String,
    lock_sql: String,
    source_indices: Vec<usize>,
    width: usize,
}

impl CopyPlan {
    fn resolve(
        destination_table: &str,
        mappings: &[ColumnMapping],
        source_columns: &[String],
    ) -> Result<Self, SqlConduitError> {
        if mappings.is_empty() {
            return Err(SqlConduitError::BulkLoad(
                "at least one column mapping is required".into(),
            ));
        }

        let mut source_indices = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let idx = source_columns
                .iter()
                .position(|c| *c == mapping.source)
                .ok_or_else(|| {
                    SqlConduitError::BulkLoad(format!(
                        "source column \"{}\" not present in row source",
                        mapping.source
                    ))
                })?;
            source_indices.push(idx);
        }

        let table = quote_qualified(destination_table);
        let column_list = mappings
            .iter()
            .map(|m| quote_qualified(&m.destination))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Self {
            copy_sql: format!("COPY {table} ({column_list}) FROM STDIN"),
            lock_sql: format!("LOCK TABLE {table} IN EXCLUSIVE MODE"),
            source_indices,
            width: source_columns.len(),
        })
    }
}

impl DbTransaction<'_> {
    /// Stream every row of `source` into `destination_table` under this
    /// transaction. Mapping order is preserved in the destination column
    /// list. Returns the number of rows loaded.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState` if the transaction is not
    /// active, or `SqlConduitError::BulkLoad` on an unresolvable mapping,
    /// a row of the wrong width, or a server-side rejection or transport
    /// interruption mid-stream.
    pub fn bulk_insert(
        &mut self,
        destination_table: &str,
        mappings: &[ColumnMapping],
        source: &mut dyn RowSource,
    ) -> Result<u64, SqlConduitError> {
        let plan = CopyPlan::resolve(destination_table, mappings, source.columns())?;
        tracing::debug!(
            "bulk load into {destination_table}: {} mapped columns, options {OPTIONS:?}",
            mappings.len()
        );

        let tx = self.driver_tx()?;
        if OPTIONS.table_lock {
            tx.batch_execute(&plan.lock_sql)
                .map_err(|e| SqlConduitError::BulkLoad(format!("table lock failed: {e}")))?;
        }

        let mut writer = tx
            .copy_in(plan.copy_sql.as_str())
            .map_err(|e| SqlConduitError::BulkLoad(format!("copy channel rejected: {e}")))?;

        let mut line = String::new();
        while let Some(row) = source.next_row()? {
            if row.len() != plan.width {
                return Err(SqlConduitError::BulkLoad(format!(
                    "row source produced {} values, expected {}",
                    row.len(),
                    plan.width
                )));
            }
            line.clear();
            for (i, &src_idx) in plan.source_indices.iter().enumerate() {
                if i > 0 {
                    line.push('\t');
                }
                encode_copy_value(&mut line, &row[src_idx]);
            }
            line.push('\n');
            writer
                .write_all(line.as_bytes())
                .map_err(|e| SqlConduitError::BulkLoad(format!("copy stream interrupted: {e}")))?;
        }

        let rows = writer
            .finish()
            .map_err(|e| SqlConduitError::BulkLoad(format!("bulk copy rejected: {e}")))?;
        tracing::debug!("bulk load into {destination_table} complete: {rows} rows");
        Ok(rows)
    }
}

impl DbConnection {
    /// Bulk insert under an internal transaction: committed when the load
    /// succeeds, rolled back when it fails.
    ///
    /// # Errors
    /// As [`DbTransaction::bulk_insert`], plus commit/begin failures.
    pub fn bulk_insert(
        &mut self,
        destination_table: &str,
        mappings: &[ColumnMapping],
        source: &mut dyn RowSource,
    ) -> Result<u64, SqlConduitError> {
        let mut tx = self.begin()?;
        match tx.bulk_insert(destination_table, mappings, source) {
            Ok(rows) => {
                tx.commit()?;
                Ok(rows)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    tracing::warn!("rollback after failed bulk load also failed: {rb}");
                }
                Err(e)
            }
        }
    }
}

/// Append one value in COPY text format: `\N` for null, `t`/`f` booleans,
/// hex bytea, and backslash escaping for the delimiter characters.
fn encode_copy_value(out: &mut String, value: &SqlValue) {
    match value {
        SqlValue::Null => out.push_str("\\N"),
        SqlValue::Bool(true) => out.push('t'),
        SqlValue::Bool(false) => out.push('f'),
        SqlValue::Int(i) => out.push_str(&i.to_string()),
        SqlValue::Float(f) => {
            if f.is_nan() {
                out.push_str("NaN");
            } else if f.is_infinite() {
                out.push_str(if *f > 0.0 { "Infinity" } else { "-Infinity" });
            } else {
                out.push_str(&f.to_string());
            }
        }
        SqlValue::Text(s) => escape_copy_text(out, s),
        SqlValue::Timestamp(dt) => {
            escape_copy_text(out, &dt.format("%Y-%m-%d %H:%M:%S%.f").to_string());
        }
        SqlValue::Json(jsval) => escape_copy_text(out, &jsval.to_string()),
        SqlValue::Bytes(bytes) => {
            // COPY unescapes `\\` first, so the bytea hex prefix needs a
            // doubled backslash on the wire.
            out.push_str("\\\\x");
            for b in bytes {
                out.push_str(&format!("{b:02x}"));
            }
        }
    }
}

fn escape_copy_text(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: &SqlValue) -> String {
        let mut out = String::new();
        encode_copy_value(&mut out, value);
        out
    }

    #[test]
    fn encodes_null_and_booleans() {
        assert_eq!(encoded(&SqlValue::Null), "\\N");
        assert_eq!(encoded(&SqlValue::Bool(true)), "t");
        assert_eq!(encoded(&SqlValue::Bool(false)), "f");
    }

    #[test]
    fn escapes_delimiters_in_text() {
        assert_eq!(
            encoded(&SqlValue::Text("a\tb\nc\\d".into())),
            "a\\tb\\nc\\\\d"
        );
    }

    #[test]
    fn encodes_bytes_as_doubled_backslash_hex() {
        assert_eq!(encoded(&SqlValue::Bytes(vec![0x41, 0x0a])), "\\\\x410a");
    }

    #[test]
    fn encodes_non_finite_floats() {
        assert_eq!(encoded(&SqlValue::Float(f64::NAN)), "NaN");
        assert_eq!(encoded(&SqlValue::Float(f64::INFINITY)), "Infinity");
        assert_eq!(encoded(&SqlValue::Float(f64::NEG_INFINITY)), "-Infinity");
    }

    #[test]
    fn plan_resolves_mappings_in_order() {
        let cols = vec!["a".to_string(), "b".to_string()];
        let mappings = [
            ColumnMapping::new("b", "dst_b"),
            ColumnMapping::new("a", "dst_a"),
        ];
        let plan = CopyPlan::resolve("t", &mappings, &cols).unwrap();
        assert_eq!(plan.copy_sql, "COPY \"t\" (\"dst_b\", \"dst_a\") FROM STDIN");
        assert_eq!(plan.source_indices, vec![1, 0]);
    }

    #[test]
    fn plan_rejects_unknown_source_column() {
        let cols = vec!["a".to_string()];
        let mappings = [ColumnMapping::new("missing", "a")];
        let err = CopyPlan::resolve("t", &mappings, &cols).unwrap_err();
        assert!(matches!(err, SqlConduitError::BulkLoad(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn plan_rejects_empty_mappings() {
        let err = CopyPlan::resolve("t", &[], &["a".to_string()]).unwrap_err();
        assert!(matches!(err, SqlConduitError::BulkLoad(_)));
    }

    #[test]
    fn memory_source_is_consumed() {
        let mut source = MemoryRowSource::new(
            vec!["c"],
            vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]],
        );
        assert!(source.next_row().unwrap().is_some());
        assert!(source.next_row().unwrap().is_some());
        assert!(source.next_row().unwrap().is_none());
    }
}
