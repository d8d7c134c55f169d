use serde::{Deserialize, Serialize};

/// How the session authenticates to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Ambient OS identity; no credential keys are emitted and the driver
    /// negotiates with whatever the server's host-based rules allow.
    Integrated,
    /// Explicit user id and password.
    Credentialed { user: String, password: String },
}

/// A connection target: where to connect, which catalog to open, and how to
/// authenticate. Immutable value; produced once, consumed to format a
/// connection string.
///
/// ```rust
/// use sql_conduit::{ConnectionDescriptor, SecurityMode};
///
/// let descriptor = ConnectionDescriptor::new(
///     "db.example.org",
///     "inventory",
///     SecurityMode::Credentialed {
///         user: "app".into(),
///         password: "secret".into(),
///     },
/// );
/// assert_eq!(
///     descriptor.connection_string(),
///     "host=db.example.org dbname=inventory user=app password=secret"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub data_source: String,
    pub catalog: String,
    pub security: SecurityMode,
}

impl ConnectionDescriptor {
    #[must_use]
    pub fn new(
        data_source: impl Into<String>,
        catalog: impl Into<String>,
        security: SecurityMode,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            catalog: catalog.into(),
            security,
        }
    }

    /// Format the descriptor as a libpq keyword/value connection string.
    ///
    /// Pure and deterministic: the same descriptor always yields the same
    /// string. A `host:port` data source splits into separate `host` and
    /// `port` keys; values containing spaces, quotes, or backslashes are
    /// single-quoted with backslash escaping; empty values are quoted.
    #[must_use]
    pub fn connection_string(&self) -> String {
        let mut out = String::new();
        let (host, port) = split_data_source(&self.data_source);
        push_pair(&mut out, "host", host);
        if let Some(port) = port {
            push_pair(&mut out, "port", port);
        }
        push_pair(&mut out, "dbname", &self.catalog);
        match &self.security {
            SecurityMode::Integrated => {}
            SecurityMode::Credentialed { user, password } => {
                push_pair(&mut out, "user", user);
                push_pair(&mut out, "password", password);
            }
        }
        out
    }
}

/// Split a `host:port` data source; anything without an all-digit suffix
/// after the last `:` is a bare host.
fn split_data_source(data_source: &str) -> (&str, Option<&str>) {
    match data_source.rsplit_once(':') {
        Some((host, port))
            if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            (host, Some(port))
        }
        _ => (data_source, None),
    }
}

fn push_pair(out: &mut String, key: &str, value: &str) {
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(key);
    out.push('=');
    out.push_str(&quote_value(value));
}

/// Quote a connection-string value per libpq rules: plain tokens pass
/// through, anything with whitespace, quotes, backslashes, or emptiness is
/// wrapped in single quotes with `\`-escaping.
fn quote_value(value: &str) -> String {
    let needs_quoting = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quoting {
        return value.to_owned();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}
