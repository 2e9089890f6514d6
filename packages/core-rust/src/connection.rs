//! Effective connection parameters for a tenant database.

use std::fmt;

use crate::tenant::StoredConnection;

/// Defaults applied per field when a tenant row leaves a field null.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDefaults {
    /// Fallback host (`TENANT_DB_HOST`).
    pub host: String,
    /// Fallback port (`TENANT_DB_PORT`).
    pub port: u16,
    /// Fallback user (`TENANT_DB_USERNAME`).
    pub username: String,
    /// Fallback password (`TENANT_DB_PASSWORD`), plaintext.
    pub password: String,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for ConnectionDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDefaults")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Fully resolved parameters used to open a tenant connection.
///
/// Equality covers every field including the password, so a rotated secret
/// counts as a parameter change.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Login user.
    pub username: String,
    /// Plaintext password.
    pub password: String,
}

impl ConnectionParams {
    /// Applies per-field fallback to a stored row.
    ///
    /// `password` is the already-decrypted tenant secret; `None` (or an empty
    /// string) falls back to the default password. The database name has no
    /// fallback.
    #[must_use]
    pub fn resolve(
        stored: &StoredConnection,
        password: Option<String>,
        defaults: &ConnectionDefaults,
    ) -> Self {
        Self {
            host: non_empty(stored.db_host.clone()).unwrap_or_else(|| defaults.host.clone()),
            port: stored.db_port.unwrap_or(defaults.port),
            database: stored.db_name.clone(),
            username: non_empty(stored.db_username.clone())
                .unwrap_or_else(|| defaults.username.clone()),
            password: non_empty(password).unwrap_or_else(|| defaults.password.clone()),
        }
    }

    /// `host:port/database`, safe to log.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ConnectionDefaults {
        ConnectionDefaults {
            host: "db.internal".to_string(),
            port: 5432,
            username: "app".to_string(),
            password: "default-pw".to_string(),
        }
    }

    #[test]
    fn tenant_values_take_precedence() {
        let stored = StoredConnection {
            db_name: "alpha_db".to_string(),
            db_host: Some("10.0.0.1".to_string()),
            db_port: Some(6543),
            db_username: Some("alpha".to_string()),
            db_password: None,
        };
        let params = ConnectionParams::resolve(&stored, Some("alpha-pw".to_string()), &defaults());
        assert_eq!(params.host, "10.0.0.1");
        assert_eq!(params.port, 6543);
        assert_eq!(params.database, "alpha_db");
        assert_eq!(params.username, "alpha");
        assert_eq!(params.password, "alpha-pw");
    }

    #[test]
    fn each_null_field_falls_back_independently() {
        let stored = StoredConnection {
            db_name: "beta_db".to_string(),
            db_host: None,
            db_port: Some(7000),
            db_username: None,
            db_password: None,
        };
        let params = ConnectionParams::resolve(&stored, None, &defaults());
        assert_eq!(params.host, "db.internal");
        assert_eq!(params.port, 7000);
        assert_eq!(params.database, "beta_db");
        assert_eq!(params.username, "app");
        assert_eq!(params.password, "default-pw");
    }

    #[test]
    fn empty_strings_count_as_null() {
        let stored = StoredConnection {
            db_name: "gamma_db".to_string(),
            db_host: Some(String::new()),
            db_username: Some(String::new()),
            ..StoredConnection::default()
        };
        let params = ConnectionParams::resolve(&stored, Some(String::new()), &defaults());
        assert_eq!(params.host, "db.internal");
        assert_eq!(params.username, "app");
        assert_eq!(params.password, "default-pw");
    }

    #[test]
    fn debug_hides_password() {
        let params = ConnectionParams::resolve(
            &StoredConnection {
                db_name: "x".to_string(),
                ..StoredConnection::default()
            },
            Some("topsecret".to_string()),
            &defaults(),
        );
        assert!(!format!("{params:?}").contains("topsecret"));
        assert_eq!(params.address(), "db.internal:5432/x");
    }
}
