//! Tenant catalog row types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalog primary key of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Connection fields as stored in the catalog.
///
/// Every field except `db_name` may be null, in which case the binder falls
/// back to the configured default for that field. `db_password` holds the
/// sealed secret exactly as persisted; it is only decrypted by the binder.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConnection {
    /// Database (schema) name. Required and unique across tenants.
    pub db_name: String,
    /// Database host, or `None` to use the default.
    pub db_host: Option<String>,
    /// Database port, or `None` to use the default.
    pub db_port: Option<u16>,
    /// Login user, or `None` to use the default.
    pub db_username: Option<String>,
    /// Sealed password as stored, or `None` to use the default.
    #[serde(default, skip_serializing)]
    pub db_password: Option<String>,
}

impl fmt::Debug for StoredConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredConnection")
            .field("db_name", &self.db_name)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_username", &self.db_username)
            .field("db_password", &self.db_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Storage keys for tenant branding assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branding {
    /// Object key of the logo.
    #[serde(default)]
    pub logo_key: Option<String>,
    /// Object key of the favicon.
    #[serde(default)]
    pub favicon_key: Option<String>,
}

/// One row of the tenant catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Stable identity.
    pub id: TenantId,
    /// Display label. Not used for routing.
    pub name: String,
    /// Unique routing key, stored lowercase.
    pub domain: String,
    /// Inactive tenants are never bound.
    pub is_active: bool,
    /// Connection parameters, password sealed.
    #[serde(flatten)]
    pub connection: StoredConnection,
    /// Optional branding asset keys.
    #[serde(default)]
    pub branding: Option<Branding>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl TenantRecord {
    /// Whether a stored password is present (without revealing it).
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.connection
            .db_password
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }
}
