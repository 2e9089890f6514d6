use std::fmt;
use std::sync::Arc;

use crate::error::TenancyError;
use crate::tenant::TenantRecord;
use crate::traits::DataStore;

/// Per-request answer to "which tenant is this request for".
///
/// Built once by the identification layer and attached to the request.
/// Immutable afterwards: there is no setter, and a clone shares the same
/// tenant and store handle.
#[derive(Clone, Default)]
pub struct TenantContext {
    binding: Option<Binding>,
}

#[derive(Clone)]
struct Binding {
    tenant: Arc<TenantRecord>,
    store: Arc<dyn DataStore>,
}

impl TenantContext {
    /// A request that runs against the catalog only.
    #[must_use]
    pub fn central() -> Self {
        Self { binding: None }
    }

    /// A request bound to `tenant`, served by `store`.
    #[must_use]
    pub fn bound(tenant: TenantRecord, store: Arc<dyn DataStore>) -> Self {
        Self {
            binding: Some(Binding {
                tenant: Arc::new(tenant),
                store,
            }),
        }
    }

    /// The bound tenant, if any.
    #[must_use]
    pub fn current(&self) -> Option<&TenantRecord> {
        self.binding.as_ref().map(|b| b.tenant.as_ref())
    }

    /// The bound tenant's store, if any.
    #[must_use]
    pub fn store(&self) -> Option<&Arc<dyn DataStore>> {
        self.binding.as_ref().map(|b| &b.store)
    }

    #[must_use]
    pub fn is_central(&self) -> bool {
        self.binding.is_none()
    }

    /// Tenant and store, or [`TenancyError::MissingContext`] in central mode.
    ///
    /// # Errors
    ///
    /// Returns `MissingContext` when no tenant is bound.
    pub fn require(&self) -> Result<(&TenantRecord, &Arc<dyn DataStore>), TenancyError> {
        self.binding
            .as_ref()
            .map(|b| (b.tenant.as_ref(), &b.store))
            .ok_or(TenancyError::MissingContext)
    }
}

impl fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            None => f.write_str("TenantContext::Central"),
            Some(b) => f
                .debug_struct("TenantContext::Bound")
                .field("tenant_id", &b.tenant.id)
                .field("domain", &b.tenant.domain)
                .field("store", &b.store.label())
                .finish(),
        }
    }
}
