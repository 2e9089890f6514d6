//! Request → tenant resolution: domain selection, catalog lookup, active
//! guard, and connection binding.

use std::sync::Arc;

use ems_core::{
    select_lookup_target, CentralPolicy, LookupTarget, ResolutionInputs, TenancyError,
    TenantContext,
};
use tracing::{debug, warn};

use crate::catalog::TenantCatalog;
use crate::pool::ConnectionBinder;

/// Turns request inputs into a [`TenantContext`].
pub struct TenantResolver {
    catalog: Arc<dyn TenantCatalog>,
    binder: Arc<ConnectionBinder>,
    policy: CentralPolicy,
}

impl TenantResolver {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn TenantCatalog>,
        binder: Arc<ConnectionBinder>,
        policy: CentralPolicy,
    ) -> Self {
        Self {
            catalog,
            binder,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &CentralPolicy {
        &self.policy
    }

    /// Resolves and binds the tenant for one request.
    ///
    /// Returns a central context when no tenant applies.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no tenant owns the selected domain.
    /// - `Inactive` if the tenant exists but is disabled, whichever input
    ///   named it.
    /// - `Bind` if its database cannot be reached.
    /// - `Catalog` if the lookup itself fails.
    pub async fn identify(&self, inputs: &ResolutionInputs<'_>) -> Result<TenantContext, TenancyError> {
        let (domain, source) = match select_lookup_target(inputs, &self.policy) {
            LookupTarget::Central => {
                debug!("no tenant selected; central mode");
                return Ok(TenantContext::central());
            }
            LookupTarget::Tenant { domain, source } => (domain, source),
        };

        let tenant = self
            .catalog
            .find_by_domain(&domain)
            .await
            .map_err(|e| TenancyError::Catalog(e.into()))?
            .ok_or_else(|| TenancyError::NotFound {
                domain: domain.clone(),
            })?;

        if !tenant.is_active {
            debug!(domain = %domain, source = source.as_str(), "tenant is inactive");
            return Err(TenancyError::Inactive { domain });
        }

        let store = self.binder.bind(&tenant).await.map_err(|err| {
            warn!(tenant_id = %tenant.id, error = %err, "tenant bind failed");
            TenancyError::Bind {
                tenant_id: tenant.id,
                source: err,
            }
        })?;

        debug!(tenant_id = %tenant.id, domain = %domain, source = source.as_str(), "tenant bound");
        Ok(TenantContext::bound(tenant, store))
    }
}
