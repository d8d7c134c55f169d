use std::fmt;

use postgres::{Client, NoTls};

use crate::descriptor::ConnectionDescriptor;
use crate::error::SqlConduitError;

/// A live (or closed) database session.
///
/// States: `Closed -> Open -> Closed`. The handle is owned by the caller;
/// [`DbConnection::close`] is idempotent and always succeeds locally, so
/// releasing the session is unconditionally safe on every exit path.
pub struct DbConnection {
    client: Option<Client>,
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("state", if self.is_open() { &"open" } else { &"closed" })
            .finish()
    }
}

impl DbConnection {
    /// Open a session from a libpq keyword/value connection string.
    ///
    /// The handshake is not retried here; retry policy belongs to the
    /// caller.
    ///
    /// # Errors
    /// Returns `SqlConduitError::Connectivity` if the string cannot be
    /// parsed or the network/auth handshake fails.
    pub fn open(connection_string: &str) -> Result<Self, SqlConduitError> {
        let client = Client::connect(connection_string, NoTls)
            .map_err(|e| SqlConduitError::Connectivity(format!("connect failed: {e}")))?;
        tracing::debug!("connection opened");
        Ok(Self {
            client: Some(client),
        })
    }

    /// Whether the session is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    /// Close the session. No-op if already closed; driver errors during
    /// close are swallowed (logged at debug level) so teardown never fails.
    pub fn close(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close() {
                tracing::debug!("error during connection close (swallowed): {e}");
            }
            tracing::debug!("connection closed");
        }
    }

    /// Mutable access to the open driver client.
    ///
    /// # Errors
    /// Returns `SqlConduitError::InvalidState` if the connection is closed.
    pub(crate) fn client_mut(&mut self) -> Result<&mut Client, SqlConduitError> {
        self.client
            .as_mut()
            .ok_or_else(|| SqlConduitError::InvalidState("connection is closed".into()))
    }
}

/// Compose descriptor formatting and [`DbConnection::open`] into one call.
///
/// # Errors
/// Returns `SqlConduitError::Connectivity` if the handshake fails.
pub fn open_connection(descriptor: &ConnectionDescriptor) -> Result<DbConnection, SqlConduitError> {
    DbConnection::open(&descriptor.connection_string())
}
