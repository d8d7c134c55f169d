//! Convenient imports for common functionality.
//!
//! Re-exports the types and functions most callers need to drive the
//! execution pipeline end to end.

pub use crate::bulk::{ColumnMapping, MemoryRowSource, RowSource};
pub use crate::connection::{DbConnection, open_connection};
pub use crate::descriptor::{ConnectionDescriptor, SecurityMode};
pub use crate::error::SqlConduitError;
pub use crate::executor::RowStream;
pub use crate::railway::{Failure, try_run};
pub use crate::statement::{BoundCommand, CommandKind, Statement};
pub use crate::transaction::{DbTransaction, TxState};
pub use crate::values::{SqlRow, SqlValue};
