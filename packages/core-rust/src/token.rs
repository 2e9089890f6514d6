//! Personal access token rows.
//!
//! Only the SHA-256 hash of a token secret is ever stored. The plaintext is
//! handed to the client once, at issue time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: i64,
    /// Opaque identifier of the principal the token belongs to.
    pub owner: String,
    /// Client-supplied label, e.g. a device name.
    pub name: String,
    /// Lowercase hex SHA-256 of the token secret.
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Fields supplied when inserting a token; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessToken {
    pub owner: String,
    pub name: String,
    pub token_hash: String,
}
