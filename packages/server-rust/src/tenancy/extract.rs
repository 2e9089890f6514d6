//! Request extractors for the tenant context.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use ems_core::{DataStore, TenancyError, TenantContext, TenantRecord};

use crate::error::ApiError;

/// The request's tenant context. Central when the request is not bound.
#[derive(Debug, Clone)]
pub struct CurrentTenant(pub TenantContext);

impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<TenantContext>()
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

/// A bound tenant and its store. Rejects central requests with 400.
#[derive(Clone)]
pub struct RequireTenant {
    pub tenant: TenantRecord,
    pub store: Arc<dyn DataStore>,
}

impl<S> FromRequestParts<S> for RequireTenant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<TenantContext>()
            .ok_or(TenancyError::MissingContext)?;
        let (tenant, store) = ctx.require()?;
        Ok(Self {
            tenant: tenant.clone(),
            store: Arc::clone(store),
        })
    }
}
