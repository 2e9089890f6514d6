//! Shared fixture for router and middleware tests.
//!
//! Tenants:
//! - `alpha.test`: active, `alpha_db`, sealed password, branding.
//! - `beta.test`: inactive, `beta_db`.
//! - `central.example`: central domain.
//! - `gamma.test`: unknown.

use std::sync::Arc;

use ems_core::{
    Branding, ConnectionDefaults, CredentialCodec, DataStore, StoredConnection, TenantContext,
    TenantRecord,
};

use crate::catalog::{MemoryTenantCatalog, TenantCatalog, TenantDraft};
use crate::config::{AdminToken, ServerConfig};
use crate::network::AppState;
use crate::pool::memory::{MemoryAccessTokenStore, MemoryDataStore};
use crate::pool::{BinderConfig, ConnectionBinder, ConnectionFactory, MemoryConnectionFactory};
use crate::tenancy::TenancyConfig;

/// Host every fixture database lives on.
pub const DB_HOST: &str = "db.local";
pub const DB_PORT: u16 = 5432;
pub const ADMIN_TOKEN: &str = "admin-secret";
pub const ALPHA_PASSWORD: &str = "alpha-pw";

pub struct Fixture {
    pub catalog: Arc<MemoryTenantCatalog>,
    pub central: Arc<MemoryDataStore>,
    pub factory: Arc<MemoryConnectionFactory>,
    pub codec: Arc<CredentialCodec>,
    pub binder: Arc<ConnectionBinder>,
    pub config: ServerConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let config = ServerConfig {
            env: "testing".to_string(),
            tenancy: TenancyConfig {
                central_domains: vec!["central.example".to_string()],
                binder: BinderConfig {
                    defaults: ConnectionDefaults {
                        host: DB_HOST.to_string(),
                        port: DB_PORT,
                        username: "app".to_string(),
                        password: "fallback".to_string(),
                    },
                    ..BinderConfig::default()
                },
                asset_base_url: Some("https://cdn.example".to_string()),
                ..TenancyConfig::default()
            },
            admin_token: Some(AdminToken::new(ADMIN_TOKEN)),
            ..ServerConfig::default()
        };

        let codec = Arc::new(CredentialCodec::new([7u8; 32]).unwrap());
        let factory = Arc::new(MemoryConnectionFactory::new());
        let binder = Arc::new(ConnectionBinder::new(
            Arc::clone(&factory) as Arc<dyn ConnectionFactory>,
            Arc::clone(&codec),
            config.tenancy.binder.clone(),
        ));
        let central = Arc::new(MemoryDataStore::central());
        let catalog = Arc::new(MemoryTenantCatalog::with_store(Arc::clone(&central)));

        let fixture = Self {
            catalog,
            central,
            factory,
            codec,
            binder,
            config,
        };

        let sealed = fixture.codec.encrypt(ALPHA_PASSWORD).unwrap();
        fixture.insert(TenantDraft {
            name: "Alpha Academy".to_string(),
            domain: "alpha.test".to_string(),
            is_active: true,
            connection: StoredConnection {
                db_name: "alpha_db".to_string(),
                db_password: Some(sealed),
                ..StoredConnection::default()
            },
            branding: Some(Branding {
                logo_key: Some("alpha/logo.png".to_string()),
                favicon_key: Some("alpha/favicon.ico".to_string()),
            }),
        });
        fixture.add_tenant("beta.test", "beta_db", false);
        fixture
    }

    /// Registers a tenant and creates its database on [`DB_HOST`].
    pub fn add_tenant(&self, domain: &str, db_name: &str, active: bool) -> TenantRecord {
        self.insert(TenantDraft {
            name: domain.to_string(),
            domain: domain.to_string(),
            is_active: active,
            connection: StoredConnection {
                db_name: db_name.to_string(),
                ..StoredConnection::default()
            },
            branding: None,
        })
    }

    fn insert(&self, draft: TenantDraft) -> TenantRecord {
        self.factory
            .create_database(DB_HOST, DB_PORT, &draft.connection.db_name);
        self.catalog.insert(draft).unwrap()
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            self.config.clone(),
            Arc::clone(&self.catalog) as Arc<dyn TenantCatalog>,
            Arc::clone(&self.binder),
            Arc::clone(&self.codec),
        )
    }

    pub fn catalog_store(&self) -> Arc<dyn DataStore> {
        self.catalog.store()
    }

    /// Token table of the catalog database.
    pub fn central_tokens(&self) -> Arc<MemoryAccessTokenStore> {
        Arc::clone(self.central.database().tokens())
    }

    /// Token table of a tenant database on [`DB_HOST`].
    pub fn tenant_tokens(&self, db_name: &str) -> Arc<MemoryAccessTokenStore> {
        Arc::clone(self.factory.create_database(DB_HOST, DB_PORT, db_name).tokens())
    }

    /// Context for `domain`, bound the way the middleware would bind it.
    pub async fn bind(&self, domain: &str) -> TenantContext {
        let tenant = self.catalog.find_by_domain(domain).await.unwrap().unwrap();
        let store = self.binder.bind(&tenant).await.ok().unwrap();
        TenantContext::bound(tenant, store)
    }
}
