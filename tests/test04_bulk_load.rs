#![cfg(feature = "test-utils")]

use sql_conduit::prelude::*;
use sql_conduit::test_utils::EmbeddedPostgres;

fn three_rows() -> Vec<Vec<SqlValue>> {
    (1..=3)
        .map(|i| vec![SqlValue::Int(i), SqlValue::Text(format!("row {i}"))])
        .collect()
}

fn count_rows(conn: &mut DbConnection, table: &str) -> Result<i64, Box<dyn std::error::Error>> {
    let mut tx = conn.begin()?;
    let cmd = tx.bind(Statement::text(format!("select count(*) from {table}")))?;
    let n = tx.query_scalar(&cmd, |v| {
        v.as_int()
            .ok_or_else(|| SqlConduitError::mapping("expected integer count"))
    })?;
    tx.rollback()?;
    Ok(n)
}

#[test]
fn bulk_load_in_both_scopes() -> Result<(), Box<dyn std::error::Error>> {
    let server = EmbeddedPostgres::start("bulk")?;
    let mut conn = open_connection(&server.descriptor())?;

    {
        let mut tx = conn.begin()?;
        let ddl = tx.bind(Statement::text(
            "create table bulk_target (col1 bigint not null, col2 text not null)",
        ))?;
        tx.execute(&ddl)?;
        tx.commit()?;
    }

    let mappings = [
        ColumnMapping::new("Col1", "col1"),
        ColumnMapping::new("Col2", "col2"),
    ];

    // Transaction-scoped load.
    {
        let mut source = MemoryRowSource::new(vec!["Col1", "Col2"], three_rows());
        let mut tx = conn.begin()?;
        let loaded = tx.bulk_insert("bulk_target", &mappings, &mut source)?;
        assert_eq!(loaded, 3);
        tx.commit()?;
    }
    assert_eq!(count_rows(&mut conn, "bulk_target")?, 3);

    // Connection-scoped load: its own internal transaction; no
    // deduplication between the two loads.
    let mut source = MemoryRowSource::new(vec!["Col1", "Col2"], three_rows());
    let loaded = conn.bulk_insert("bulk_target", &mappings, &mut source)?;
    assert_eq!(loaded, 3);
    assert_eq!(count_rows(&mut conn, "bulk_target")?, 6);

    conn.close();
    Ok(())
}

#[test]
fn bulk_load_round_trips_awkward_values() -> Result<(), Box<dyn std::error::Error>> {
    let server = EmbeddedPostgres::start("bulk_values")?;
    let mut conn = open_connection(&server.descriptor())?;

    {
        let mut tx = conn.begin()?;
        let ddl = tx.bind(Statement::text(
            "create table tricky (id bigint not null, t text, b bytea)",
        ))?;
        tx.execute(&ddl)?;
        tx.commit()?;
    }

    let mappings = [
        ColumnMapping::new("id", "id"),
        ColumnMapping::new("t", "t"),
        ColumnMapping::new("b", "b"),
    ];
    let mut source = MemoryRowSource::new(
        vec!["id", "t", "b"],
        vec![
            vec![
                SqlValue::Int(1),
                SqlValue::Text("tab\there, line\nbreak, back\\slash".into()),
                SqlValue::Bytes(vec![0x00, 0x41, 0xff]),
            ],
            vec![SqlValue::Int(2), SqlValue::Null, SqlValue::Null],
        ],
    );
    conn.bulk_insert("tricky", &mappings, &mut source)?;

    let mut tx = conn.begin()?;
    let cmd = tx.bind(Statement::text("select t, b from tricky order by id"))?;
    let rows: Vec<SqlRow> = tx
        .query_rows(&cmd, |row| Ok(row.clone()))?
        .collect::<Result<_, _>>()?;
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].get("t").and_then(|v| v.as_text()),
        Some("tab\there, line\nbreak, back\\slash")
    );
    assert_eq!(
        rows[0].get("b").and_then(|v| v.as_bytes()),
        Some(&[0x00u8, 0x41, 0xff][..])
    );
    assert!(rows[1].get("t").is_some_and(SqlValue::is_null));
    assert!(rows[1].get("b").is_some_and(SqlValue::is_null));
    tx.rollback()?;

    conn.close();
    Ok(())
}

#[test]
fn failed_bulk_load_leaves_no_rows() -> Result<(), Box<dyn std::error::Error>> {
    let server = EmbeddedPostgres::start("bulk_failure")?;
    let mut conn = open_connection(&server.descriptor())?;

    {
        let mut tx = conn.begin()?;
        let ddl = tx.bind(Statement::text(
            "create table strict_target (col1 bigint not null)",
        ))?;
        tx.execute(&ddl)?;
        tx.commit()?;
    }

    let mappings = [ColumnMapping::new("Col1", "col1")];

    // A null into a not-null column rejects the whole load.
    let mut source = MemoryRowSource::new(
        vec!["Col1"],
        vec![vec![SqlValue::Int(1)], vec![SqlValue::Null]],
    );
    let err = conn
        .bulk_insert("strict_target", &mappings, &mut source)
        .unwrap_err();
    assert!(matches!(err, SqlConduitError::BulkLoad(_)));
    assert_eq!(count_rows(&mut conn, "strict_target")?, 0);

    // Unresolvable mappings fail before any row is sent.
    let mut source = MemoryRowSource::new(vec!["Other"], vec![vec![SqlValue::Int(1)]]);
    let err = conn
        .bulk_insert("strict_target", &mappings, &mut source)
        .unwrap_err();
    assert!(matches!(err, SqlConduitError::BulkLoad(_)));
    assert_eq!(count_rows(&mut conn, "strict_target")?, 0);

    conn.close();
    Ok(())
}
