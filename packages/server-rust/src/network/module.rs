//! Server lifecycle: `new()` wires state, `start()` binds the listener,
//! `serve()` accepts requests until shutdown, then drains and closes every
//! tenant pool.

use std::future::Future;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::handlers::{
    create_tenant, db_check, delete_tenant, health_handler, list_tenants, liveness_handler,
    logout_handler, me_handler, meta_handler, readiness_handler, require_admin, tenant_status,
    toggle_tenant, update_tenant, AppState,
};
use super::middleware::{build_http_layers, track_in_flight};
use crate::tenancy::identify_tenant;

/// Assembles every route.
///
/// - `/health`, `/health/live`, `/health/ready`: no tenant identification
/// - `/api/tenant/meta`, `/api/auth/me`, `/api/auth/logout`
/// - `/admin/tenants[/{id}[/toggle|/status|/db-check]]`: central mode plus
///   admin token
///
/// Everything except health runs behind tenant identification, so an
/// unknown or inactive tenant never reaches a handler.
pub fn build_router(state: AppState) -> Router {
    let health = Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler));

    let admin = Router::new()
        .route("/admin/tenants", get(list_tenants).post(create_tenant))
        .route("/admin/tenants/{id}", put(update_tenant).delete(delete_tenant))
        .route("/admin/tenants/{id}/toggle", post(toggle_tenant))
        .route("/admin/tenants/{id}/status", get(tenant_status))
        .route("/admin/tenants/{id}/db-check", get(db_check))
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    let tenant_aware = Router::new()
        .route("/api/tenant/meta", get(meta_handler))
        .route("/api/auth/me", get(me_handler))
        .route("/api/auth/logout", post(logout_handler))
        .merge(admin)
        .route_layer(from_fn_with_state(state.clone(), identify_tenant))
        .route_layer(from_fn_with_state(state.clone(), track_in_flight));

    Router::new()
        .merge(health)
        .merge(tenant_aware)
        .layer(build_http_layers(
            &state.config.network,
            &state.config.tenancy.header_name,
        ))
        .with_state(state)
}

pub struct NetworkModule {
    state: AppState,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            listener: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub fn build_router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Binds the configured address and returns the bound port (useful with
    /// port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let network = &self.state.config.network;
        let listener = TcpListener::bind((network.host.as_str(), network.port)).await?;
        let port = listener.local_addr()?.port();
        info!(host = %network.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves or shutdown is triggered on the
    /// controller, then waits for in-flight requests and closes every tenant
    /// pool.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server fails.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let state = self.state;
        let router = build_router(state.clone());

        let controller = state.shutdown.clone();
        let signal = async move {
            tokio::select! {
                () = shutdown => {}
                () = controller.wait_for_shutdown() => {}
            }
            info!("shutdown requested; draining");
            controller.trigger_shutdown();
        };

        state.shutdown.set_ready();
        info!("serving HTTP");
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        if !state
            .shutdown
            .wait_for_drain(state.config.network.drain_timeout)
            .await
        {
            warn!(
                in_flight = state.shutdown.in_flight_count(),
                "drain timeout expired"
            );
        }
        let pools = state.binder.pool_count();
        state.binder.purge_all().await;
        info!(pools, "tenant pools closed");
        Ok(())
    }
}
