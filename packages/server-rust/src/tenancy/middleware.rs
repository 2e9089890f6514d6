//! Tenant identification middleware.
//!
//! Runs before every handler on tenant-aware routers. Resolves the tenant,
//! binds its connection, and attaches the resulting [`TenantContext`] to the
//! request. Resolution errors short-circuit with the matching status code.

use std::collections::HashMap;

use axum::extract::{Query, Request, State};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::Response;
use ems_core::{ResolutionInputs, TenancyError, TenantContext};
use tracing::{field, info_span, Instrument};

use crate::error::ApiError;
use crate::network::AppState;

/// `axum::middleware::from_fn_with_state` entry point.
///
/// # Errors
///
/// Returns the resolution error (404, 403, or 500) without calling `next`.
pub async fn identify_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // CORS preflight carries no tenant hints worth resolving.
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }
    if request.extensions().get::<TenantContext>().is_some() {
        return Err(TenancyError::ContextAlreadyBound.into());
    }

    let tenancy = &state.config.tenancy;
    let header = request
        .headers()
        .get(&tenancy.header_name)
        // Non-ASCII bytes still name a tenant; never fall through to the host.
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
    let query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove(&tenancy.query_param));
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .map(str::to_owned);

    let inputs = ResolutionInputs {
        header: header.as_deref(),
        query: query.as_deref(),
        host: host.as_deref(),
    };
    let ctx = state.resolver.identify(&inputs).await?;

    let span = info_span!(
        "tenant",
        tenant_id = field::Empty,
        tenant_name = field::Empty,
        tenant_domain = field::Empty,
    );
    if let Some(tenant) = ctx.current() {
        span.record("tenant_id", tenant.id.0);
        span.record("tenant_name", tenant.name.as_str());
        span.record("tenant_domain", tenant.domain.as_str());
    }

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).instrument(span).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{HeaderValue, Request, StatusCode};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::{Json, Router};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::tenancy::CurrentTenant;
    use crate::test_support::Fixture;

    async fn whoami(CurrentTenant(ctx): CurrentTenant) -> Json<Value> {
        Json(json!({
            "central": ctx.is_central(),
            "domain": ctx.current().map(|t| t.domain.clone()),
            "store": ctx.store().map(|s| s.label().to_string()),
        }))
    }

    fn router(fixture: &Fixture) -> Router {
        let state = fixture.state();
        Router::new()
            .route("/whoami", get(whoami))
            .layer(from_fn_with_state(state.clone(), identify_tenant))
            .with_state(state)
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn get_with_host(uri: &str, host: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("host", host)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn active_tenant_host_binds_its_store() {
        let fixture = Fixture::new();
        let (status, json) = call(router(&fixture), get_with_host("/whoami", "alpha.test")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["central"], false);
        assert_eq!(json["domain"], "alpha.test");
        assert_eq!(json["store"], "alpha_db");
    }

    #[tokio::test]
    async fn host_lookup_ignores_case_and_port() {
        let fixture = Fixture::new();
        let (status, json) =
            call(router(&fixture), get_with_host("/whoami", "ALPHA.Test:8443")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["domain"], "alpha.test");
    }

    #[tokio::test]
    async fn inactive_tenant_is_forbidden_from_every_source() {
        let fixture = Fixture::new();

        let (status, json) = call(router(&fixture), get_with_host("/whoami", "beta.test")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "tenant_inactive");
        assert_eq!(json["domain"], "beta.test");

        let (status, _) = call(
            router(&fixture),
            get_with_host("/whoami?tenant=Beta.Test", "central.example"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let request = Request::builder()
            .uri("/whoami")
            .header("host", "central.example")
            .header("x-tenant-domain", "beta.test")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(router(&fixture), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(fixture.binder.pool_count(), 0);
    }

    #[tokio::test]
    async fn unknown_host_is_not_found() {
        let fixture = Fixture::new();
        let (status, json) = call(router(&fixture), get_with_host("/whoami", "gamma.test")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Tenant not found for host: gamma.test");
    }

    #[tokio::test]
    async fn central_and_dev_hosts_run_without_tenant() {
        let fixture = Fixture::new();
        for host in ["central.example", "localhost:8000"] {
            let (status, json) = call(router(&fixture), get_with_host("/whoami", host)).await;
            assert_eq!(status, StatusCode::OK, "host {host}");
            assert_eq!(json["central"], true);
            assert_eq!(json["store"], Value::Null);
        }
    }

    #[tokio::test]
    async fn header_beats_query_beats_host() {
        let fixture = Fixture::new();
        fixture.add_tenant("delta.test", "delta_db", true);

        let request = Request::builder()
            .uri("/whoami?tenant=delta.test")
            .header("host", "gamma.test")
            .header("x-tenant-domain", "ALPHA.test")
            .body(Body::empty())
            .unwrap();
        let (status, json) = call(router(&fixture), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["domain"], "alpha.test");
        assert_eq!(json["store"], "alpha_db");

        let (_, json) = call(
            router(&fixture),
            get_with_host("/whoami?tenant=delta.test", "alpha.test"),
        )
        .await;
        assert_eq!(json["domain"], "delta.test");
    }

    #[tokio::test]
    async fn unreadable_header_is_not_treated_as_absent() {
        let fixture = Fixture::new();
        fixture.add_tenant("delta.test", "delta_db", true);

        let request = Request::builder()
            .uri("/whoami")
            .header("host", "delta.test")
            .header(
                "x-tenant-domain",
                HeaderValue::from_bytes(b"alph\xe1.test").unwrap(),
            )
            .body(Body::empty())
            .unwrap();
        let (status, json) = call(router(&fixture), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "tenant_not_found");
        assert_eq!(fixture.binder.pool_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_tenant_database_fails_closed() {
        let fixture = Fixture::new();
        fixture.add_tenant("omega.test", "omega_db", true);
        fixture.factory.set_unreachable(crate::test_support::DB_HOST);

        let (status, json) = call(router(&fixture), get_with_host("/whoami", "omega.test")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "tenant_bind_failed");
    }

    #[tokio::test]
    async fn preflight_skips_resolution() {
        let fixture = Fixture::new();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/whoami")
            .header("host", "gamma.test")
            .body(Body::empty())
            .unwrap();
        let response = router(&fixture).oneshot(request).await.unwrap();
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn second_context_is_refused() {
        let fixture = Fixture::new();
        let mut request = get_with_host("/whoami", "alpha.test");
        request.extensions_mut().insert(TenantContext::central());
        let (status, json) = call(router(&fixture), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "tenant_context_conflict");
    }
}
