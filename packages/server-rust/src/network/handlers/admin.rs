//! Tenant administration under `/admin/tenants`.
//!
//! Only reachable in central mode and with the configured admin bearer token.
//! Every write that can change a tenant's connection target or activity
//! purges its cached pool, so the next request rebinds from the new row.

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use ems_core::{normalize_domain, Branding, StoredConnection, TenantContext, TenantId, TenantRecord};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use super::auth::bearer_token;
use super::AppState;
use crate::catalog::TenantDraft;
use crate::error::ApiError;
use crate::pool::DbCheckReport;

const MAX_LEN: usize = 255;

/// Refuses tenant-bound requests (403) and wrong or missing admin tokens (401).
///
/// # Errors
///
/// Returns the refusal without calling `next`.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bound = request
        .extensions()
        .get::<TenantContext>()
        .is_some_and(|ctx| !ctx.is_central());
    if bound {
        return Err(ApiError::Forbidden(
            "Tenant administration is only available on central domains.".to_string(),
        ));
    }
    let Some(expected) = state.config.admin_token.as_ref() else {
        return Err(ApiError::Forbidden(
            "Tenant administration is disabled.".to_string(),
        ));
    };
    match bearer_token(request.headers()) {
        Some(presented) if expected.matches(presented) => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized("Unauthenticated.".to_string())),
    }
}

/// Request body of create and update.
///
/// On update an absent `db_password` keeps the stored secret, `null` or `""`
/// clears it, and any other value replaces it.
#[derive(Debug, Default, Deserialize)]
pub struct TenantPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub db_host: Option<String>,
    #[serde(default)]
    pub db_port: Option<u16>,
    #[serde(default)]
    pub db_username: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub db_password: Option<Option<String>>,
    #[serde(default)]
    pub branding: Option<Branding>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// A tenant as returned by the admin API. The password never leaves.
#[derive(Debug, Serialize)]
pub struct TenantView {
    #[serde(flatten)]
    pub tenant: TenantRecord,
    pub has_password: bool,
}

impl From<TenantRecord> for TenantView {
    fn from(tenant: TenantRecord) -> Self {
        Self {
            has_password: tenant.has_password(),
            tenant,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validated, normalized fields shared by create and update.
struct Validated {
    name: String,
    domain: String,
    db_name: String,
    db_host: Option<String>,
    db_username: Option<String>,
}

fn required(field: &str, value: Option<&str>, errors: &mut Vec<String>) -> String {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        errors.push(format!("The {field} field is required."));
    } else if value.chars().count() > MAX_LEN {
        errors.push(format!("The {field} field must not be greater than {MAX_LEN} characters."));
    }
    value.to_string()
}

fn optional(field: &str, value: Option<&str>, errors: &mut Vec<String>) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    if value.chars().count() > MAX_LEN {
        errors.push(format!("The {field} field must not be greater than {MAX_LEN} characters."));
    }
    Some(value.to_string())
}

fn validate(payload: &TenantPayload) -> Result<Validated, ApiError> {
    let mut errors = Vec::new();
    let name = required("name", payload.name.as_deref(), &mut errors);
    let domain = required("domain", payload.domain.as_deref(), &mut errors);
    let db_name = required("db_name", payload.db_name.as_deref(), &mut errors);
    let db_host = optional("db_host", payload.db_host.as_deref(), &mut errors);
    let db_username = optional("db_username", payload.db_username.as_deref(), &mut errors);
    if let Some(Some(password)) = &payload.db_password {
        if password.chars().count() > MAX_LEN {
            errors.push(format!(
                "The db_password field must not be greater than {MAX_LEN} characters."
            ));
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors.join(" ")));
    }
    Ok(Validated {
        name,
        domain: normalize_domain(&domain).unwrap_or(domain),
        db_name,
        db_host,
        db_username,
    })
}

impl AppState {
    fn seal(&self, password: &str) -> Result<String, ApiError> {
        self.codec
            .encrypt(password)
            .map_err(|e| ApiError::Internal(e.into()))
    }

    async fn tenant_or_404(&self, id: TenantId) -> Result<TenantRecord, ApiError> {
        self.catalog
            .get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Tenant {id} not found.")))
    }
}

/// `GET /admin/tenants`, latest first.
///
/// # Errors
///
/// 500 if the catalog fails.
pub async fn list_tenants(State(state): State<AppState>) -> Result<Json<Vec<TenantView>>, ApiError> {
    let tenants = state.catalog.list().await?;
    Ok(Json(tenants.into_iter().map(TenantView::from).collect()))
}

/// `POST /admin/tenants`
///
/// # Errors
///
/// 422 on invalid fields, 409 when the domain or database name is taken.
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(payload): Json<TenantPayload>,
) -> Result<(StatusCode, Json<TenantView>), ApiError> {
    let fields = validate(&payload)?;
    let db_password = match payload.db_password.flatten().filter(|p| !p.is_empty()) {
        Some(p) => Some(state.seal(&p)?),
        None => None,
    };
    let draft = TenantDraft {
        name: fields.name,
        domain: fields.domain,
        is_active: payload.is_active.unwrap_or(true),
        connection: StoredConnection {
            db_name: fields.db_name,
            db_host: fields.db_host,
            db_port: payload.db_port,
            db_username: fields.db_username,
            db_password,
        },
        branding: payload.branding,
    };
    let tenant = state.catalog.create(draft).await?;
    info!(tenant_id = %tenant.id, domain = %tenant.domain, "tenant created");
    Ok((StatusCode::CREATED, Json(tenant.into())))
}

/// `PUT /admin/tenants/{id}`
///
/// # Errors
///
/// 404 for an unknown tenant, otherwise as [`create_tenant`].
pub async fn update_tenant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<TenantPayload>,
) -> Result<Json<TenantView>, ApiError> {
    let id = TenantId(id);
    let current = state.tenant_or_404(id).await?;
    let fields = validate(&payload)?;

    let db_password = match payload.db_password {
        None => current.connection.db_password.clone(),
        Some(None) => None,
        Some(Some(p)) if p.is_empty() => None,
        Some(Some(p)) => Some(state.seal(&p)?),
    };
    let draft = TenantDraft {
        name: fields.name,
        domain: fields.domain,
        is_active: payload.is_active.unwrap_or(current.is_active),
        connection: StoredConnection {
            db_name: fields.db_name,
            db_host: fields.db_host,
            db_port: payload.db_port,
            db_username: fields.db_username,
            db_password,
        },
        branding: payload.branding.or(current.branding),
    };
    let tenant = state.catalog.update(id, draft).await?;
    state.binder.purge(id).await;
    info!(tenant_id = %id, domain = %tenant.domain, "tenant updated");
    Ok(Json(tenant.into()))
}

/// `DELETE /admin/tenants/{id}`
///
/// # Errors
///
/// 404 for an unknown tenant.
pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let id = TenantId(id);
    if !state.catalog.delete(id).await? {
        return Err(ApiError::NotFound(format!("Tenant {id} not found.")));
    }
    state.binder.forget(id).await;
    info!(tenant_id = %id, "tenant deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /admin/tenants/{id}/toggle`: flips `is_active`.
///
/// # Errors
///
/// 404 for an unknown tenant.
pub async fn toggle_tenant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TenantView>, ApiError> {
    let id = TenantId(id);
    let current = state.tenant_or_404(id).await?;
    let tenant = state.catalog.set_active(id, !current.is_active).await?;
    state.binder.purge(id).await;
    info!(tenant_id = %id, active = tenant.is_active, "tenant toggled");
    Ok(Json(tenant.into()))
}

/// `GET /admin/tenants/{id}/status`: binds the tenant and pings its database.
///
/// Inactive tenants are probed too; activity only gates request routing.
///
/// # Errors
///
/// 404 for an unknown tenant. Connection failures are reported in the body.
pub async fn tenant_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StatusReport>, ApiError> {
    let tenant = state.tenant_or_404(TenantId(id)).await?;
    let outcome = match state.binder.bind(&tenant).await {
        Ok(store) => store.ping().await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    Ok(Json(match outcome {
        Ok(()) => StatusReport { ok: true, error: None },
        Err(error) => StatusReport {
            ok: false,
            error: Some(error),
        },
    }))
}

/// `GET /admin/tenants/{id}/db-check`: server reachability and database existence.
///
/// # Errors
///
/// 404 for an unknown tenant.
pub async fn db_check(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DbCheckReport>, ApiError> {
    let tenant = state.tenant_or_404(TenantId(id)).await?;
    Ok(Json(state.binder.db_check(&tenant).await))
}
