use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::connection::ConnectionParams;
use crate::token::{AccessToken, NewAccessToken};

/// Handle to one logical database: either the central catalog database or a
/// single tenant's database.
///
/// Implementations: `PostgreSQL` pool, memory (tests and local runs).
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Short label for logs and diagnostics, e.g. `catalog` or the database name.
    fn label(&self) -> &str;

    /// Parameters the handle was opened with. `None` for the catalog store.
    fn params(&self) -> Option<&ConnectionParams>;

    /// Round-trips a trivial query (`SELECT 1`).
    async fn ping(&self) -> anyhow::Result<()>;

    /// Closes every pooled connection. Idempotent.
    async fn close(&self);

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;

    /// Access-token storage living in this database.
    fn access_tokens(&self) -> Arc<dyn AccessTokenStore>;
}

/// Persistence for personal access tokens.
#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// Inserts a token and returns the stored row.
    async fn insert(&self, token: NewAccessToken) -> anyhow::Result<AccessToken>;

    /// Looks a token up by primary key.
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<AccessToken>>;

    /// Looks a token up by secret hash (tokens presented without an id prefix).
    async fn find_by_hash(&self, token_hash: &str) -> anyhow::Result<Option<AccessToken>>;

    /// Records a successful use.
    async fn touch(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Deletes a token. Returns whether a row was removed.
    async fn delete(&self, id: i64) -> anyhow::Result<bool>;
}
