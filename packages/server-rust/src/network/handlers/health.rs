//! Health, liveness, and readiness probes.
//!
//! Mounted outside tenant identification: probes answer on any host.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::network::HealthState;

/// Detailed health. Always 200; `state` tells whether the server is serving.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();
    Json(json!({
        "ok": health == HealthState::Ready,
        "env": state.config.env,
        "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "state": health,
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "in_flight": state.shutdown.in_flight_count(),
        "tenant_pools": state.binder.pool_count(),
    }))
}

/// Liveness: the process answers. No dependency checks.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness: 200 only when `Ready` and the catalog database answers a ping.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() != HealthState::Ready {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match state.catalog.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "catalog database ping failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
