#![cfg(feature = "test-utils")]

use sql_conduit::prelude::*;
use sql_conduit::test_utils::EmbeddedPostgres;

#[test]
fn connection_and_transaction_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let server = EmbeddedPostgres::start("lifecycle")?;
    let mut conn = open_connection(&server.descriptor())?;
    assert!(conn.is_open());

    // DDL in its own transaction; commit is one-shot.
    {
        let mut tx = conn.begin()?;
        let ddl = tx.bind(Statement::text(
            "create table t (id bigint primary key, name text not null)",
        ))?;
        tx.execute(&ddl)?;
        tx.commit()?;
        assert_eq!(tx.state(), TxState::Committed);

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, SqlConduitError::TransactionState(_)));

        // A terminal transaction refuses further work.
        let err = tx.bind(Statement::text("select 1")).unwrap_err();
        assert!(matches!(err, SqlConduitError::InvalidState(_)));
    }

    // Savepoint rollback is partial: only the segment after the mark is
    // discarded, and the transaction stays usable.
    {
        let mut tx = conn.begin()?;
        let insert = "insert into t (id, name) values (@id, @name)";
        let before = tx.bind_with_params(
            Statement::text(insert),
            [("id", SqlValue::Int(1)), ("name", SqlValue::Text("before".into()))],
        )?;
        tx.execute(&before)?;

        tx.savepoint("mark")?;
        assert_eq!(tx.savepoints(), ["mark".to_string()]);

        let discarded = tx.bind_with_params(
            Statement::text(insert),
            [("id", SqlValue::Int(2)), ("name", SqlValue::Text("discarded".into()))],
        )?;
        tx.execute(&discarded)?;

        tx.rollback_to("mark")?;
        assert_eq!(tx.state(), TxState::Active);

        let err = tx.rollback_to("never_recorded").unwrap_err();
        assert!(matches!(err, SqlConduitError::InvalidState(_)));
        let err = tx.savepoint("not an identifier").unwrap_err();
        assert!(matches!(err, SqlConduitError::Parameter(_)));

        let after = tx.bind_with_params(
            Statement::text(insert),
            [("id", SqlValue::Int(3)), ("name", SqlValue::Text("after".into()))],
        )?;
        tx.execute(&after)?;
        tx.commit()?;
    }

    // Persisted: the pre-savepoint row and the post-rollback row only.
    {
        let mut tx = conn.begin()?;
        let count = tx.bind(Statement::text("select count(*) from t"))?;
        let n = tx.query_scalar(&count, |v| {
            v.as_int()
                .ok_or_else(|| SqlConduitError::mapping("expected integer count"))
        })?;
        assert_eq!(n, 2);

        let missing = tx.bind_with_params(
            Statement::text("select name from t where id = @id"),
            [("id", SqlValue::Int(2))],
        )?;
        let rolled_back_row = tx.query_scalar(&missing, |v| Ok(v.is_null()))?;
        assert!(rolled_back_row);
        tx.rollback()?;
        assert_eq!(tx.state(), TxState::RolledBack);
    }

    // Close is idempotent; a closed connection refuses to begin.
    conn.close();
    assert!(!conn.is_open());
    conn.close();
    assert!(!conn.is_open());
    let err = conn.begin().unwrap_err();
    assert!(matches!(err, SqlConduitError::InvalidState(_)));
    Ok(())
}

#[test]
fn stored_procedure_invocation() -> Result<(), Box<dyn std::error::Error>> {
    let server = EmbeddedPostgres::start("procedures")?;
    let mut conn = open_connection(&server.descriptor())?;

    {
        let mut tx = conn.begin()?;
        let audit = tx.bind(Statement::text("create table audit (kind text not null)"))?;
        tx.execute(&audit)?;
        let proc = tx.bind(Statement::text(
            "create procedure log_kind(k text) language plpgsql as $$ begin insert into audit (kind) values (k); end $$",
        ))?;
        tx.execute(&proc)?;
        tx.commit()?;
    }

    {
        let mut tx = conn.begin()?;
        let call = tx.bind(Statement::procedure("log_kind"))?.with_param("k", "login");
        assert_eq!(call.kind(), CommandKind::StoredProcedure);
        tx.execute(&call)?;

        let check = tx.bind(Statement::text("select kind from audit"))?;
        let kind = tx.query_scalar(&check, |v| {
            v.as_text()
                .map(str::to_owned)
                .ok_or_else(|| SqlConduitError::mapping("expected text"))
        })?;
        assert_eq!(kind, "login");
        tx.commit()?;
    }

    conn.close();
    Ok(())
}
