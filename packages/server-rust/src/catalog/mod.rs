//! Central tenant catalog: one row per tenant, looked up by routing domain.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use ems_core::{Branding, DataStore, StoredConnection, TenantId, TenantRecord};

pub use memory::MemoryTenantCatalog;
#[cfg(feature = "postgres")]
pub use postgres::PgTenantCatalog;

/// Errors returned by catalog implementations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("the {field} has already been taken")]
    Conflict { field: &'static str },
    #[error("tenant {0} not found")]
    NotFound(TenantId),
    #[error("catalog backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Writable fields of a tenant row.
///
/// `domain` must already be normalized and `connection.db_password` must
/// already be sealed; catalogs store what they are given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantDraft {
    pub name: String,
    pub domain: String,
    pub is_active: bool,
    pub connection: StoredConnection,
    pub branding: Option<Branding>,
}

/// Persistence for tenant records.
///
/// Implementations: `PostgreSQL`, memory (tests and local runs).
#[async_trait]
pub trait TenantCatalog: Send + Sync {
    /// Exact-match lookup by normalized domain.
    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>, CatalogError>;

    async fn get(&self, id: TenantId) -> Result<Option<TenantRecord>, CatalogError>;

    /// All tenants, most recently created first.
    async fn list(&self) -> Result<Vec<TenantRecord>, CatalogError>;

    /// Inserts a tenant. Fails with `Conflict` on a duplicate domain or database name.
    async fn create(&self, draft: TenantDraft) -> Result<TenantRecord, CatalogError>;

    /// Replaces every writable field of an existing tenant.
    async fn update(&self, id: TenantId, draft: TenantDraft) -> Result<TenantRecord, CatalogError>;

    async fn set_active(&self, id: TenantId, active: bool) -> Result<TenantRecord, CatalogError>;

    /// Removes a tenant. Returns whether a row was deleted.
    async fn delete(&self, id: TenantId) -> Result<bool, CatalogError>;

    /// Handle to the central database that hosts the catalog.
    fn store(&self) -> Arc<dyn DataStore>;
}
