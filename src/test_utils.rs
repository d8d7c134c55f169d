//! Embedded-PostgreSQL helpers for integration tests.
//!
//! Gated behind the `test-utils` feature; stands up a bundled server on a
//! random free port so tests run against a real backend without external
//! infrastructure.

use postgresql_embedded::Settings;
use postgresql_embedded::blocking::PostgreSQL;

use crate::descriptor::{ConnectionDescriptor, SecurityMode};

/// A running embedded PostgreSQL instance; the server stops and its
/// temporary data directory is removed when this is dropped.
pub struct EmbeddedPostgres {
    server: PostgreSQL,
    database: String,
}

impl EmbeddedPostgres {
    /// Download/unpack (first run), start the server, and create `database`.
    ///
    /// # Errors
    /// Returns the embedded server's setup/start/create failures.
    pub fn start(database: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut server = PostgreSQL::new(Settings::default());
        server.setup()?;
        server.start()?;
        server.create_database(database)?;
        Ok(Self {
            server,
            database: database.to_string(),
        })
    }

    /// A descriptor pointing at the embedded server's host, bound port, and
    /// generated credentials.
    #[must_use]
    pub fn descriptor(&self) -> ConnectionDescriptor {
        let settings = self.server.settings();
        ConnectionDescriptor::new(
            format!("{}:{}", settings.host, settings.port),
            self.database.clone(),
            SecurityMode::Credentialed {
                user: settings.username.clone(),
                password: settings.password.clone(),
            },
        )
    }
}
