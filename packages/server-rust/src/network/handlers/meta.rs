//! `GET /api/tenant/meta`: public facts about the bound tenant.

use axum::extract::State;
use axum::Json;
use ems_core::TenantId;
use serde::Serialize;

use super::AppState;
use crate::tenancy::RequireTenant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandingUrls {
    pub logo_url: Option<String>,
    pub favicon_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TenantMeta {
    pub id: TenantId,
    pub domain: String,
    pub name: String,
    pub branding: BrandingUrls,
}

/// Central requests are rejected by [`RequireTenant`] with 400.
pub async fn meta_handler(
    State(state): State<AppState>,
    RequireTenant { tenant, .. }: RequireTenant,
) -> Json<TenantMeta> {
    let base = state.config.tenancy.asset_base_url.as_deref();
    let branding = tenant.branding.unwrap_or_default();
    Json(TenantMeta {
        id: tenant.id,
        domain: tenant.domain,
        name: tenant.name,
        branding: BrandingUrls {
            logo_url: asset_url(base, branding.logo_key),
            favicon_url: asset_url(base, branding.favicon_key),
        },
    })
}

fn asset_url(base: Option<&str>, key: Option<String>) -> Option<String> {
    let key = key.filter(|k| !k.is_empty())?;
    if key.starts_with("http://") || key.starts_with("https://") {
        return Some(key);
    }
    match base {
        Some(base) => Some(format!("{base}/{}", key.trim_start_matches('/'))),
        None => Some(key),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::tenancy::identify_tenant;
    use crate::test_support::Fixture;

    async fn meta_for(fixture: &Fixture, host: &str) -> (StatusCode, Value) {
        let state = fixture.state();
        let router = Router::new()
            .route("/api/tenant/meta", get(meta_handler))
            .layer(from_fn_with_state(state.clone(), identify_tenant))
            .with_state(state);
        let request = Request::builder()
            .uri("/api/tenant/meta")
            .header("host", host)
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn asset_url_joins_base_and_key() {
        let base = Some("https://cdn.example");
        assert_eq!(
            asset_url(base, Some("/a/logo.png".to_string())).as_deref(),
            Some("https://cdn.example/a/logo.png")
        );
        assert_eq!(
            asset_url(None, Some("a/logo.png".to_string())).as_deref(),
            Some("a/logo.png")
        );
        assert_eq!(
            asset_url(base, Some("https://other.example/x.png".to_string())).as_deref(),
            Some("https://other.example/x.png")
        );
        assert_eq!(asset_url(base, Some(String::new())), None);
        assert_eq!(asset_url(base, None), None);
    }

    #[tokio::test]
    async fn meta_describes_bound_tenant() {
        let fixture = Fixture::new();
        let (status, json) = meta_for(&fixture, "alpha.test").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["domain"], "alpha.test");
        assert_eq!(json["name"], "Alpha Academy");
        assert_eq!(json["branding"]["logoUrl"], "https://cdn.example/alpha/logo.png");
        assert_eq!(
            json["branding"]["faviconUrl"],
            "https://cdn.example/alpha/favicon.ico"
        );
        assert!(json.get("db_password").is_none());
    }

    #[tokio::test]
    async fn meta_without_branding_has_null_urls() {
        let fixture = Fixture::new();
        fixture.add_tenant("delta.test", "delta_db", true);
        let (_, json) = meta_for(&fixture, "delta.test").await;
        assert_eq!(json["branding"]["logoUrl"], Value::Null);
    }

    #[tokio::test]
    async fn meta_on_central_host_is_bad_request() {
        let fixture = Fixture::new();
        let (status, json) = meta_for(&fixture, "central.example").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Tenant context missing");
    }
}
