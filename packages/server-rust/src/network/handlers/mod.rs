//! HTTP handlers and the shared `AppState` they extract.

pub mod admin;
pub mod auth;
pub mod health;
pub mod meta;

pub use admin::{
    create_tenant, db_check, delete_tenant, list_tenants, require_admin, tenant_status,
    toggle_tenant, update_tenant,
};
pub use auth::{logout_handler, me_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use meta::meta_handler;

use std::sync::Arc;
use std::time::Instant;

use ems_core::CredentialCodec;

use super::ShutdownController;
use crate::catalog::TenantCatalog;
use crate::config::ServerConfig;
use crate::pool::ConnectionBinder;
use crate::tenancy::TenantResolver;

/// State shared by every handler and middleware. Cloning copies `Arc`s only.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn TenantCatalog>,
    /// Per-tenant pool registry.
    pub binder: Arc<ConnectionBinder>,
    pub resolver: Arc<TenantResolver>,
    /// Seals tenant secrets written through the admin API.
    pub codec: Arc<CredentialCodec>,
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<ServerConfig>,
    /// Process start, for uptime.
    pub start_time: Instant,
}

impl AppState {
    /// Wires the resolver from the catalog, the binder, and the configured
    /// central hosts.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        catalog: Arc<dyn TenantCatalog>,
        binder: Arc<ConnectionBinder>,
        codec: Arc<CredentialCodec>,
    ) -> Self {
        let resolver = TenantResolver::new(
            Arc::clone(&catalog),
            Arc::clone(&binder),
            config.tenancy.central_policy(),
        );
        Self {
            catalog,
            binder,
            resolver: Arc::new(resolver),
            codec,
            shutdown: Arc::new(ShutdownController::new()),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}
