//! `PostgreSQL` pools for the catalog database and tenant databases.
//!
//! Tenant databases are expected to carry their own `personal_access_tokens`
//! table; creating tenant schemas is outside this crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ems_core::{AccessToken, AccessTokenStore, ConnectionParams, DataStore, NewAccessToken};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, FromRow, PgConnection, PgPool};

use super::ConnectionFactory;

/// DDL for the token table, shared by the catalog bootstrap.
pub(crate) const TOKENS_DDL: &str = r"
CREATE TABLE IF NOT EXISTS personal_access_tokens (
    id           BIGSERIAL PRIMARY KEY,
    owner        TEXT NOT NULL,
    name         TEXT NOT NULL,
    token_hash   CHAR(64) NOT NULL UNIQUE,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    last_used_at TIMESTAMPTZ NULL
)";

#[derive(Debug, FromRow)]
struct TokenRow {
    id: i64,
    owner: String,
    name: String,
    token_hash: String,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl From<TokenRow> for AccessToken {
    fn from(row: TokenRow) -> Self {
        Self {
            id: row.id,
            owner: row.owner,
            name: row.name,
            token_hash: row.token_hash,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        }
    }
}

/// Access tokens stored in one `PostgreSQL` database.
#[derive(Debug, Clone)]
pub struct PgAccessTokenStore {
    pool: PgPool,
}

const TOKEN_COLUMNS: &str = "id, owner, name, token_hash, created_at, last_used_at";

#[async_trait]
impl AccessTokenStore for PgAccessTokenStore {
    async fn insert(&self, token: NewAccessToken) -> anyhow::Result<AccessToken> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "INSERT INTO personal_access_tokens (owner, name, token_hash) VALUES ($1, $2, $3) \
             RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(&token.owner)
        .bind(&token.name)
        .bind(&token.token_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<AccessToken>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM personal_access_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_hash(&self, token_hash: &str) -> anyhow::Result<Option<AccessToken>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM personal_access_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn touch(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE personal_access_tokens SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM personal_access_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// A `PostgreSQL` pool for the catalog or a single tenant.
#[derive(Debug)]
pub struct PgDataStore {
    label: String,
    params: Option<ConnectionParams>,
    pool: PgPool,
    closed: AtomicBool,
}

impl PgDataStore {
    /// Wraps the pool of the central catalog database.
    #[must_use]
    pub fn central(pool: PgPool) -> Self {
        Self {
            label: "catalog".to_string(),
            params: None,
            pool,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DataStore for PgDataStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn params(&self) -> Option<&ConnectionParams> {
        self.params.as_ref()
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.pool.close().await;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.pool.is_closed()
    }

    fn access_tokens(&self) -> Arc<dyn AccessTokenStore> {
        Arc::new(PgAccessTokenStore {
            pool: self.pool.clone(),
        })
    }
}

/// Opens tenant pools against `PostgreSQL` servers.
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgConnectionFactory {
    #[must_use]
    pub fn new(max_connections: u32, acquire_timeout: Duration) -> Self {
        Self {
            max_connections,
            acquire_timeout,
        }
    }

    fn options(params: &ConnectionParams, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.username)
            .password(&params.password)
            .database(database)
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self, params: &ConnectionParams) -> anyhow::Result<Arc<dyn DataStore>> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_with(Self::options(params, &params.database))
            .await?;
        Ok(Arc::new(PgDataStore {
            label: params.database.clone(),
            params: Some(params.clone()),
            pool,
            closed: AtomicBool::new(false),
        }))
    }

    async fn database_exists(&self, params: &ConnectionParams) -> anyhow::Result<bool> {
        let mut conn = PgConnection::connect_with(&Self::options(params, "postgres")).await?;
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(&params.database)
                .fetch_one(&mut conn)
                .await?;
        conn.close().await?;
        Ok(exists)
    }
}
