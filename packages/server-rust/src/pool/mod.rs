//! Per-tenant connection pools.
//!
//! The [`ConnectionBinder`] owns one pool per tenant, keyed by tenant id.
//! Each entry remembers the effective parameters it was opened with; a bind
//! whose parameters differ purges the old pool before a new one is opened,
//! so a pool never serves two different parameter sets.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use ems_core::{
    BindError, ConnectionDefaults, ConnectionParams, CredentialCodec, DataStore, SecretSource,
    TenantId, TenantRecord,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use memory::MemoryConnectionFactory;
#[cfg(feature = "postgres")]
pub use postgres::PgConnectionFactory;

/// Opens tenant database handles.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Opens a pool for `params`. The binder pings it before first use.
    async fn connect(&self, params: &ConnectionParams) -> anyhow::Result<Arc<dyn DataStore>>;

    /// Connects to the server without selecting the database and reports
    /// whether the database exists.
    async fn database_exists(&self, params: &ConnectionParams) -> anyhow::Result<bool>;
}

/// Binder settings.
#[derive(Debug, Clone)]
pub struct BinderConfig {
    /// Per-field fallback for null tenant connection fields.
    pub defaults: ConnectionDefaults,
    /// Upper bound on connect + ping.
    pub bind_timeout: Duration,
    /// Close and reopen the pool on every bind, even when parameters match.
    pub rebuild_on_bind: bool,
    /// Accept stored secrets that are not valid ciphertext.
    pub allow_plaintext_secrets: bool,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            defaults: ConnectionDefaults::default(),
            bind_timeout: Duration::from_secs(5),
            rebuild_on_bind: false,
            allow_plaintext_secrets: true,
        }
    }
}

/// Result of the admin connectivity probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbCheckReport {
    /// The server accepted the login.
    pub ok: bool,
    pub connectable: bool,
    /// The tenant database exists on that server.
    pub exists: bool,
    /// Time to connect and query, in milliseconds.
    pub ping_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct PoolEntry {
    params: ConnectionParams,
    store: Arc<dyn DataStore>,
}

/// Registry of tenant pools.
pub struct ConnectionBinder {
    factory: Arc<dyn ConnectionFactory>,
    codec: Arc<CredentialCodec>,
    config: BinderConfig,
    pools: DashMap<TenantId, PoolEntry>,
    locks: DashMap<TenantId, Arc<Mutex<()>>>,
}

impl ConnectionBinder {
    #[must_use]
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        codec: Arc<CredentialCodec>,
        config: BinderConfig,
    ) -> Self {
        Self {
            factory,
            codec,
            config,
            pools: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Computes the parameters a bind of `tenant` would use.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::PlaintextSecret`] when the stored secret is not a
    /// valid ciphertext and plaintext secrets are disabled.
    pub fn effective_params(&self, tenant: &TenantRecord) -> Result<ConnectionParams, BindError> {
        let password = match tenant.connection.db_password.as_deref() {
            Some(stored) if !stored.is_empty() => {
                let decrypted = self.codec.decrypt(stored);
                if decrypted.source() == SecretSource::LegacyPlaintext {
                    if !self.config.allow_plaintext_secrets {
                        return Err(BindError::PlaintextSecret);
                    }
                    warn!(tenant_id = %tenant.id, "tenant secret is not sealed; using stored value");
                }
                Some(decrypted.into_value())
            }
            _ => None,
        };
        Ok(ConnectionParams::resolve(
            &tenant.connection,
            password,
            &self.config.defaults,
        ))
    }

    /// Returns a live handle for `tenant`, opening or replacing its pool.
    ///
    /// Concurrent binds of the same tenant are serialized. A cached pool is
    /// reused only when its parameters equal the freshly computed ones and it
    /// has not been closed.
    ///
    /// # Errors
    ///
    /// Returns a [`BindError`] if the secret is refused, the connection
    /// fails, or connect + ping exceeds the bind timeout. No other tenant's
    /// pool is ever returned instead.
    pub async fn bind(&self, tenant: &TenantRecord) -> Result<Arc<dyn DataStore>, BindError> {
        let params = self.effective_params(tenant)?;
        let lock = self.lock_for(tenant.id);
        let _guard = lock.lock().await;

        if !self.config.rebuild_on_bind {
            if let Some(store) = self.reusable(tenant.id, &params) {
                debug!(tenant_id = %tenant.id, "reusing tenant pool");
                return Ok(store);
            }
        }

        self.purge_locked(tenant.id).await;

        let store = match tokio::time::timeout(self.config.bind_timeout, self.open(&params)).await {
            Ok(Ok(store)) => store,
            Ok(Err(e)) => return Err(BindError::Connect(e)),
            Err(_) => return Err(BindError::Timeout(self.config.bind_timeout)),
        };

        info!(tenant_id = %tenant.id, target = %params.address(), "opened tenant pool");
        self.pools.insert(
            tenant.id,
            PoolEntry {
                params,
                store: Arc::clone(&store),
            },
        );
        Ok(store)
    }

    /// Closes and forgets the pool of `tenant_id`, if any.
    pub async fn purge(&self, tenant_id: TenantId) {
        let lock = self.lock_for(tenant_id);
        let _guard = lock.lock().await;
        self.purge_locked(tenant_id).await;
    }

    /// Purges the pool of a deleted tenant and drops its bind lock.
    pub async fn forget(&self, tenant_id: TenantId) {
        self.purge(tenant_id).await;
        self.locks.remove(&tenant_id);
    }

    /// Closes every pool. Used on shutdown.
    pub async fn purge_all(&self) {
        let ids: Vec<TenantId> = self.pools.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.purge(id).await;
        }
    }

    /// The cached pool of `tenant_id`, without binding.
    #[must_use]
    pub fn cached(&self, tenant_id: TenantId) -> Option<Arc<dyn DataStore>> {
        self.pools.get(&tenant_id).map(|e| Arc::clone(&e.store))
    }

    /// Number of open tenant pools.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Probes the tenant's server and database without touching its pool.
    pub async fn db_check(&self, tenant: &TenantRecord) -> DbCheckReport {
        let mut report = DbCheckReport {
            ok: false,
            connectable: false,
            exists: false,
            ping_ms: None,
            error: None,
        };
        let params = match self.effective_params(tenant) {
            Ok(params) => params,
            Err(e) => {
                report.error = Some(e.to_string());
                return report;
            }
        };

        let started = Instant::now();
        match tokio::time::timeout(self.config.bind_timeout, self.factory.database_exists(&params))
            .await
        {
            Ok(Ok(exists)) => {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                report.connectable = true;
                report.ok = true;
                report.exists = exists;
                report.ping_ms = Some((elapsed * 10.0).round() / 10.0);
            }
            Ok(Err(e)) => report.error = Some(e.to_string()),
            Err(_) => report.error = Some(BindError::Timeout(self.config.bind_timeout).to_string()),
        }
        report
    }

    async fn open(&self, params: &ConnectionParams) -> anyhow::Result<Arc<dyn DataStore>> {
        let store = self.factory.connect(params).await?;
        if let Err(e) = store.ping().await {
            store.close().await;
            return Err(e);
        }
        Ok(store)
    }

    fn reusable(&self, tenant_id: TenantId, params: &ConnectionParams) -> Option<Arc<dyn DataStore>> {
        self.pools
            .get(&tenant_id)
            .filter(|e| e.params == *params && !e.store.is_closed())
            .map(|e| Arc::clone(&e.store))
    }

    async fn purge_locked(&self, tenant_id: TenantId) {
        if let Some((_, entry)) = self.pools.remove(&tenant_id) {
            entry.store.close().await;
            debug!(tenant_id = %tenant_id, "purged tenant pool");
        }
    }

    fn lock_for(&self, tenant_id: TenantId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(tenant_id).or_default().value())
    }
}
