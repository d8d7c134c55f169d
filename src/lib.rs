//! Synchronous access layer over PostgreSQL.
//!
//! The pipeline runs descriptor → connection → transaction → bound,
//! parameterized statement → execution, with a railway-style adapter that
//! turns any failure into a value driving the commit-or-rollback decision,
//! and a COPY-based bulk loader as a parallel path.
//!
//! ```rust,no_run
//! use sql_conduit::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let descriptor = ConnectionDescriptor::new(
//!         "localhost",
//!         "app",
//!         SecurityMode::Credentialed {
//!             user: "app".into(),
//!             password: "secret".into(),
//!         },
//!     );
//!     let mut conn = open_connection(&descriptor)?;
//!     {
//!         let mut tx = conn.begin()?;
//!         let cmd = tx.bind_with_params(
//!             Statement::text("insert into events (id, kind) values (@id, @kind)"),
//!             [("id", SqlValue::Int(1)), ("kind", SqlValue::Text("login".into()))],
//!         )?;
//!         let outcome = try_run(|| tx.execute(&cmd));
//!         tx.commit_or_rollback(outcome)?;
//!     }
//!     conn.close();
//!     Ok(())
//! }
//! ```

pub mod bulk;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod railway;
pub mod statement;
pub mod transaction;
pub mod values;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use bulk::{BulkLoadOptions, ColumnMapping, MemoryRowSource, RowSource};
pub use connection::{DbConnection, open_connection};
pub use descriptor::{ConnectionDescriptor, SecurityMode};
pub use error::SqlConduitError;
pub use executor::RowStream;
pub use railway::{Failure, try_run};
pub use statement::{BoundCommand, CommandKind, Statement};
pub use transaction::{DbTransaction, TxState};
pub use values::{SqlRow, SqlValue};
