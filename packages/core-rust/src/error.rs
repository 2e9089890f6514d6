use std::time::Duration;

use crate::tenant::TenantId;

/// Failure to produce a usable connection for a tenant.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(#[source] anyhow::Error),
    #[error("stored secret is not sealed and plaintext secrets are disabled")]
    PlaintextSecret,
}

/// Errors raised while identifying and binding the tenant of a request.
#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    #[error("Tenant not found for host: {domain}")]
    NotFound { domain: String },
    #[error("Tenant is inactive.")]
    Inactive { domain: String },
    #[error("failed to bind connection for tenant {tenant_id}")]
    Bind {
        tenant_id: TenantId,
        #[source]
        source: BindError,
    },
    #[error("tenant catalog lookup failed: {0}")]
    Catalog(#[source] anyhow::Error),
    #[error("Tenant context missing")]
    MissingContext,
    #[error("tenant context already bound for this request")]
    ContextAlreadyBound,
}

impl TenancyError {
    /// Stable machine-readable kind, used as the `error` field of responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            TenancyError::NotFound { .. } => "tenant_not_found",
            TenancyError::Inactive { .. } => "tenant_inactive",
            TenancyError::Bind { .. } => "tenant_bind_failed",
            TenancyError::Catalog(_) => "catalog_unavailable",
            TenancyError::MissingContext => "tenant_context_missing",
            TenancyError::ContextAlreadyBound => "tenant_context_conflict",
        }
    }

    /// The domain the error refers to, when there is one.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        match self {
            TenancyError::NotFound { domain } | TenancyError::Inactive { domain } => Some(domain),
            _ => None,
        }
    }
}
