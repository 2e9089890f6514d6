//! In-memory tenant catalog for tests and local runs.
//!
//! Optionally seeded from a JSON file (`TENANT_SEED_FILE`). Seed passwords
//! may be given in plaintext; they are sealed on load.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ems_core::{
    normalize_domain, Branding, CredentialCodec, DataStore, StoredConnection, TenantId,
    TenantRecord,
};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::info;

use super::{CatalogError, TenantCatalog, TenantDraft};
use crate::pool::memory::MemoryDataStore;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    by_id: BTreeMap<TenantId, TenantRecord>,
    by_domain: HashMap<String, TenantId>,
}

impl Inner {
    fn check_unique(&self, draft: &TenantDraft, except: Option<TenantId>) -> Result<(), CatalogError> {
        if let Some(&owner) = self.by_domain.get(&draft.domain) {
            if Some(owner) != except {
                return Err(CatalogError::Conflict { field: "domain" });
            }
        }
        let db_taken = self.by_id.values().any(|t| {
            Some(t.id) != except && t.connection.db_name == draft.connection.db_name
        });
        if db_taken {
            return Err(CatalogError::Conflict { field: "db_name" });
        }
        Ok(())
    }
}

/// Tenant catalog held in process memory.
pub struct MemoryTenantCatalog {
    inner: RwLock<Inner>,
    store: Arc<MemoryDataStore>,
}

/// One entry of a seed file.
#[derive(Debug, Deserialize)]
struct SeedTenant {
    name: String,
    domain: String,
    #[serde(default = "default_active")]
    is_active: bool,
    db_name: String,
    #[serde(default)]
    db_host: Option<String>,
    #[serde(default)]
    db_port: Option<u16>,
    #[serde(default)]
    db_username: Option<String>,
    #[serde(default)]
    db_password: Option<String>,
    #[serde(default)]
    branding: Option<Branding>,
}

fn default_active() -> bool {
    true
}

impl MemoryTenantCatalog {
    /// Empty catalog backed by a fresh central store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryDataStore::central()))
    }

    /// Empty catalog whose central database is `store`.
    #[must_use]
    pub fn with_store(store: Arc<MemoryDataStore>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                ..Inner::default()
            }),
            store,
        }
    }

    /// Loads tenants from a JSON array file, sealing plaintext passwords.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, if a password
    /// cannot be sealed, or if two entries collide.
    pub fn load_seed_file(&self, path: &Path, codec: &CredentialCodec) -> anyhow::Result<usize> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<SeedTenant> = serde_json::from_str(&raw)?;
        let count = entries.len();
        for entry in entries {
            let db_password = match entry.db_password.filter(|p| !p.is_empty()) {
                Some(p) if CredentialCodec::is_sealed(&p) => Some(p),
                Some(p) => Some(codec.encrypt(&p)?),
                None => None,
            };
            let domain = normalize_domain(&entry.domain)
                .ok_or_else(|| anyhow::anyhow!("seed entry {:?} has an empty domain", entry.name))?;
            self.insert(TenantDraft {
                name: entry.name,
                domain,
                is_active: entry.is_active,
                connection: StoredConnection {
                    db_name: entry.db_name,
                    db_host: entry.db_host,
                    db_port: entry.db_port,
                    db_username: entry.db_username,
                    db_password,
                },
                branding: entry.branding,
            })
            .map_err(anyhow::Error::from)?;
        }
        info!(path = %path.display(), tenants = count, "loaded tenant seed file");
        Ok(count)
    }

    /// Synchronous insert used by seeding and test fixtures.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the domain or database name is taken.
    pub fn insert(&self, draft: TenantDraft) -> Result<TenantRecord, CatalogError> {
        let mut inner = self.inner.write();
        inner.check_unique(&draft, None)?;

        let id = TenantId(inner.next_id);
        inner.next_id += 1;
        let now = Utc::now();
        let record = TenantRecord {
            id,
            name: draft.name,
            domain: draft.domain,
            is_active: draft.is_active,
            connection: draft.connection,
            branding: draft.branding,
            created_at: now,
            updated_at: now,
        };
        inner.by_domain.insert(record.domain.clone(), id);
        inner.by_id.insert(id, record.clone());
        Ok(record)
    }

    /// Number of tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryTenantCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TenantCatalog for MemoryTenantCatalog {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>, CatalogError> {
        let Some(domain) = normalize_domain(domain) else {
            return Ok(None);
        };
        let inner = self.inner.read();
        Ok(inner
            .by_domain
            .get(&domain)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn get(&self, id: TenantId) -> Result<Option<TenantRecord>, CatalogError> {
        Ok(self.inner.read().by_id.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<TenantRecord>, CatalogError> {
        Ok(self.inner.read().by_id.values().rev().cloned().collect())
    }

    async fn create(&self, draft: TenantDraft) -> Result<TenantRecord, CatalogError> {
        self.insert(draft)
    }

    async fn update(&self, id: TenantId, draft: TenantDraft) -> Result<TenantRecord, CatalogError> {
        let mut inner = self.inner.write();
        inner.check_unique(&draft, Some(id))?;

        let Some(record) = inner.by_id.get_mut(&id) else {
            return Err(CatalogError::NotFound(id));
        };
        let old_domain = std::mem::replace(&mut record.domain, draft.domain);
        record.name = draft.name;
        record.is_active = draft.is_active;
        record.connection = draft.connection;
        record.branding = draft.branding;
        record.updated_at = Utc::now();
        let updated = record.clone();

        inner.by_domain.remove(&old_domain);
        inner.by_domain.insert(updated.domain.clone(), id);
        Ok(updated)
    }

    async fn set_active(&self, id: TenantId, active: bool) -> Result<TenantRecord, CatalogError> {
        let mut inner = self.inner.write();
        let record = inner.by_id.get_mut(&id).ok_or(CatalogError::NotFound(id))?;
        record.is_active = active;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, id: TenantId) -> Result<bool, CatalogError> {
        let mut inner = self.inner.write();
        match inner.by_id.remove(&id) {
            Some(record) => {
                inner.by_domain.remove(&record.domain);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn store(&self) -> Arc<dyn DataStore> {
        Arc::clone(&self.store) as Arc<dyn DataStore>
    }
}
