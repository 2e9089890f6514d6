//! `PostgreSQL` tenant catalog.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ems_core::{Branding, DataStore, StoredConnection, TenantId, TenantRecord};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;

use super::{CatalogError, TenantCatalog, TenantDraft};
use crate::pool::postgres::{PgDataStore, TOKENS_DDL};

const TENANTS_DDL: &str = r"
CREATE TABLE IF NOT EXISTS tenants (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    domain      TEXT NOT NULL UNIQUE,
    db_name     TEXT NOT NULL UNIQUE,
    db_host     TEXT NULL,
    db_port     INTEGER NULL,
    db_username TEXT NULL,
    db_password TEXT NULL,
    is_active   BOOLEAN NOT NULL DEFAULT TRUE,
    branding    JSONB NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const COLUMNS: &str = "id, name, domain, db_name, db_host, db_port, db_username, db_password, \
                       is_active, branding, created_at, updated_at";

#[derive(Debug, FromRow)]
struct TenantRow {
    id: i64,
    name: String,
    domain: String,
    db_name: String,
    db_host: Option<String>,
    db_port: Option<i32>,
    db_username: Option<String>,
    db_password: Option<String>,
    is_active: bool,
    branding: Option<Json<Branding>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for TenantRecord {
    type Error = CatalogError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let db_port = row
            .db_port
            .map(u16::try_from)
            .transpose()
            .map_err(|_| anyhow!("tenant {} has an out-of-range db_port", row.id))?;
        Ok(Self {
            id: TenantId(row.id),
            name: row.name,
            domain: row.domain,
            is_active: row.is_active,
            connection: StoredConnection {
                db_name: row.db_name,
                db_host: row.db_host,
                db_port,
                db_username: row.db_username,
                db_password: row.db_password,
            },
            branding: row.branding.map(|b| b.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn map_write_error(err: sqlx::Error) -> CatalogError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().is_some_and(|code| code == "23505") {
            let field = if db_err.constraint().is_some_and(|c| c.contains("db_name")) {
                "db_name"
            } else {
                "domain"
            };
            return CatalogError::Conflict { field };
        }
    }
    CatalogError::Backend(err.into())
}

fn backend(err: sqlx::Error) -> CatalogError {
    CatalogError::Backend(err.into())
}

/// Tenant catalog stored in the central `PostgreSQL` database.
pub struct PgTenantCatalog {
    pool: PgPool,
    store: Arc<PgDataStore>,
}

impl PgTenantCatalog {
    /// Connects to the catalog database. Does not log the URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the pool cannot be opened.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let options = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;
        Ok(Self {
            store: Arc::new(PgDataStore::central(pool.clone())),
            pool,
        })
    }

    /// Creates the catalog tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(TENANTS_DDL).execute(&self.pool).await?;
        sqlx::query(TOKENS_DDL).execute(&self.pool).await?;
        info!("catalog schema ready");
        Ok(())
    }

    async fn fetch_one_by_id(&self, id: TenantId) -> Result<Option<TenantRecord>, CatalogError> {
        sqlx::query_as::<_, TenantRow>(&format!("SELECT {COLUMNS} FROM tenants WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(TenantRecord::try_from)
            .transpose()
    }
}

#[async_trait]
impl TenantCatalog for PgTenantCatalog {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>, CatalogError> {
        sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {COLUMNS} FROM tenants WHERE domain = lower(trim($1))"
        ))
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .map(TenantRecord::try_from)
        .transpose()
    }

    async fn get(&self, id: TenantId) -> Result<Option<TenantRecord>, CatalogError> {
        self.fetch_one_by_id(id).await
    }

    async fn list(&self) -> Result<Vec<TenantRecord>, CatalogError> {
        sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {COLUMNS} FROM tenants ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?
        .into_iter()
        .map(TenantRecord::try_from)
        .collect()
    }

    async fn create(&self, draft: TenantDraft) -> Result<TenantRecord, CatalogError> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "INSERT INTO tenants \
             (name, domain, db_name, db_host, db_port, db_username, db_password, is_active, branding) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {COLUMNS}"
        ))
        .bind(&draft.name)
        .bind(&draft.domain)
        .bind(&draft.connection.db_name)
        .bind(&draft.connection.db_host)
        .bind(draft.connection.db_port.map(i32::from))
        .bind(&draft.connection.db_username)
        .bind(&draft.connection.db_password)
        .bind(draft.is_active)
        .bind(draft.branding.map(Json))
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;
        row.try_into()
    }

    async fn update(&self, id: TenantId, draft: TenantDraft) -> Result<TenantRecord, CatalogError> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "UPDATE tenants SET name = $2, domain = $3, db_name = $4, db_host = $5, db_port = $6, \
             db_username = $7, db_password = $8, is_active = $9, branding = $10, updated_at = now() \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id.0)
        .bind(&draft.name)
        .bind(&draft.domain)
        .bind(&draft.connection.db_name)
        .bind(&draft.connection.db_host)
        .bind(draft.connection.db_port.map(i32::from))
        .bind(&draft.connection.db_username)
        .bind(&draft.connection.db_password)
        .bind(draft.is_active)
        .bind(draft.branding.map(Json))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;
        row.ok_or(CatalogError::NotFound(id))?.try_into()
    }

    async fn set_active(&self, id: TenantId, active: bool) -> Result<TenantRecord, CatalogError> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "UPDATE tenants SET is_active = $2, updated_at = now() WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id.0)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.ok_or(CatalogError::NotFound(id))?.try_into()
    }

    async fn delete(&self, id: TenantId) -> Result<bool, CatalogError> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    fn store(&self) -> Arc<dyn DataStore> {
        Arc::clone(&self.store) as Arc<dyn DataStore>
    }
}
