//! HTTP middleware for the EMS server.
//!
//! [`build_http_layers`] is the transport stack applied to every route.
//! Layers are listed outermost first: the first one sees the request first
//! and the response last.

use axum::extract::{Request, State};
use axum::http::header::{self, HeaderName};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use super::handlers::AppState;
use super::HealthState;

fn x_request_id() -> HeaderName {
    HeaderName::from_static("x-request-id")
}

type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            CorsLayer,
            tower::layer::util::Stack<
                CompressionLayer,
                tower::layer::util::Stack<
                    TraceLayer<
                        tower_http::classify::SharedClassifier<
                            tower_http::classify::ServerErrorsAsFailures,
                        >,
                    >,
                    tower::layer::util::Stack<
                        SetRequestIdLayer<MakeRequestUuid>,
                        tower::layer::util::Identity,
                    >,
                >,
            >,
        >,
    >,
>;

/// Transport middleware, outermost to innermost:
/// 1. `SetRequestId` assigns a UUID v4 `X-Request-Id`
/// 2. `Trace` opens the request span the tenant span nests under
/// 3. `Compression` (gzip)
/// 4. `CORS` from the configured origins, allowing the tenant override header
/// 5. `Timeout` answers 408 past the configured duration
/// 6. `PropagateRequestId` echoes `X-Request-Id` on the response
#[must_use]
pub fn build_http_layers(config: &NetworkConfig, tenant_header: &HeaderName) -> HttpLayers {
    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&config.cors_origins, tenant_header))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id()))
        .into_inner()
}

/// `"*"` allows any origin; otherwise only the parseable listed origins.
fn build_cors_layer(origins: &[String], tenant_header: &HeaderName) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            tenant_header.clone(),
            x_request_id(),
        ])
        .expose_headers([x_request_id()])
}

/// Counts the request as in flight and refuses new work once draining.
pub async fn track_in_flight(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if matches!(
        state.shutdown.health_state(),
        HealthState::Draining | HealthState::Stopped
    ) {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let _guard = state.shutdown.in_flight_guard();
    next.run(request).await
}
