//! Bearer-token endpoints, served from whichever store the context selects.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use ems_core::TenantContext;
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;
use crate::tenancy::CurrentTenant;
use crate::tokens::{StoreScope, TokenService};

/// Extracts the token from `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub id: i64,
    pub owner: String,
    pub name: String,
    /// Database the token was found in.
    pub scope: StoreScope,
    /// Domain of the bound tenant; absent in central mode.
    pub tenant: Option<String>,
}

fn service(state: &AppState, ctx: &TenantContext) -> TokenService {
    TokenService::for_context(ctx, &state.catalog.store())
}

fn unauthenticated() -> ApiError {
    ApiError::Unauthorized("Unauthenticated.".to_string())
}

/// `GET /api/auth/me`
///
/// # Errors
///
/// 401 when the bearer token is missing or unknown to the selected store.
pub async fn me_handler(
    State(state): State<AppState>,
    CurrentTenant(ctx): CurrentTenant,
    headers: HeaderMap,
) -> Result<Json<WhoAmI>, ApiError> {
    let presented = bearer_token(&headers).ok_or_else(unauthenticated)?;
    let tokens = service(&state, &ctx);
    let token = tokens
        .authenticate(presented)
        .await?
        .ok_or_else(unauthenticated)?;
    Ok(Json(WhoAmI {
        id: token.id,
        owner: token.owner,
        name: token.name,
        scope: tokens.scope(),
        tenant: ctx.current().map(|t| t.domain.clone()),
    }))
}

/// `POST /api/auth/logout`: revokes the presented token.
///
/// # Errors
///
/// 401 when the bearer token is missing or already revoked.
pub async fn logout_handler(
    State(state): State<AppState>,
    CurrentTenant(ctx): CurrentTenant,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let presented = bearer_token(&headers).ok_or_else(unauthenticated)?;
    if service(&state, &ctx).revoke(presented).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(unauthenticated())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn_with_state;
    use axum::routing::{get, post};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::tenancy::identify_tenant;
    use crate::test_support::Fixture;

    fn router(fixture: &Fixture) -> Router {
        let state = fixture.state();
        Router::new()
            .route("/api/auth/me", get(me_handler))
            .route("/api/auth/logout", post(logout_handler))
            .layer(from_fn_with_state(state.clone(), identify_tenant))
            .with_state(state)
    }

    fn request(method: &str, uri: &str, host: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri).header("host", host);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(fixture: &Fixture, req: Request<Body>) -> (StatusCode, Value) {
        let response = router(fixture).oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "bearer  xyz ".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn tenant_token_resolves_only_on_its_tenant() {
        let fixture = Fixture::new();
        let ctx = fixture.bind("alpha.test").await;
        let issued = TokenService::for_context(&ctx, &fixture.catalog_store())
            .issue("student-7", "phone")
            .await
            .unwrap();
        assert_eq!(fixture.tenant_tokens("alpha_db").len(), 1);

        let (status, json) = send(
            &fixture,
            request("GET", "/api/auth/me", "alpha.test", Some(&issued.plaintext)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["owner"], "student-7");
        assert_eq!(json["scope"], "tenant");
        assert_eq!(json["tenant"], "alpha.test");

        let (status, json) = send(
            &fixture,
            request("GET", "/api/auth/me", "central.example", Some(&issued.plaintext)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "unauthorized");
    }

    #[tokio::test]
    async fn central_token_resolves_on_central_host() {
        let fixture = Fixture::new();
        let issued = TokenService::for_context(&TenantContext::central(), &fixture.catalog_store())
            .issue("operator", "console")
            .await
            .unwrap();

        let (status, json) = send(
            &fixture,
            request("GET", "/api/auth/me", "central.example", Some(&issued.plaintext)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["scope"], "central");
        assert_eq!(json["tenant"], Value::Null);

        let (status, _) = send(
            &fixture,
            request("GET", "/api/auth/me", "alpha.test", Some(&issued.plaintext)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let fixture = Fixture::new();
        let (status, _) = send(&fixture, request("GET", "/api/auth/me", "alpha.test", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_revokes_in_tenant_store() {
        let fixture = Fixture::new();
        let ctx = fixture.bind("alpha.test").await;
        let issued = TokenService::for_context(&ctx, &fixture.catalog_store())
            .issue("student-7", "phone")
            .await
            .unwrap();

        let (status, _) = send(
            &fixture,
            request("POST", "/api/auth/logout", "alpha.test", Some(&issued.plaintext)),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(fixture.tenant_tokens("alpha_db").is_empty());

        let (status, _) = send(
            &fixture,
            request("POST", "/api/auth/logout", "alpha.test", Some(&issued.plaintext)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
