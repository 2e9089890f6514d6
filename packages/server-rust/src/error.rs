//! HTTP error type shared by middleware and handlers.
//!
//! Every error renders as `{"error": <kind>, "message": <text>}`, plus
//! `"domain"` when a tenant domain is involved. Internal failures are logged
//! with their full chain but rendered with an opaque message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ems_core::TenancyError;
use serde::Serialize;
use tracing::error;

use crate::catalog::CatalogError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Tenancy(#[from] TenancyError),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<&'a str>,
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Tenancy(e) => match e {
                TenancyError::NotFound { .. } => StatusCode::NOT_FOUND,
                TenancyError::Inactive { .. } => StatusCode::FORBIDDEN,
                TenancyError::MissingContext => StatusCode::BAD_REQUEST,
                TenancyError::Bind { .. }
                | TenancyError::Catalog(_)
                | TenancyError::ContextAlreadyBound => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Tenancy(e) => e.kind(),
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation_failed",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            CatalogError::NotFound(_) => ApiError::NotFound(err.to_string()),
            CatalogError::Backend(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = ?self, kind = self.kind(), "request failed");
            match &self {
                ApiError::Tenancy(TenancyError::Bind { .. }) => {
                    "Tenant database is unavailable.".to_string()
                }
                _ => "Internal server error.".to_string(),
            }
        } else {
            self.to_string()
        };
        let domain = match &self {
            ApiError::Tenancy(e) => e.domain(),
            _ => None,
        };
        let body = ErrorBody {
            error: self.kind(),
            message,
            domain,
        };
        (status, Json(body)).into_response()
    }
}
