//! Tenant resolution and binding settings.

use axum::http::HeaderName;
use ems_core::CentralPolicy;

use crate::pool::BinderConfig;

/// Settings consumed by the identification middleware and the binder.
#[derive(Debug, Clone)]
pub struct TenancyConfig {
    /// Override header carrying an explicit tenant domain.
    pub header_name: HeaderName,
    /// Override query parameter carrying an explicit tenant domain.
    pub query_param: String,
    /// Hosts that serve the central (non-tenant) application.
    pub central_domains: Vec<String>,
    /// Local development host, treated like a central domain.
    pub dev_host: String,
    pub binder: BinderConfig,
    /// Prefix for branding asset keys in the meta endpoint. Keys are
    /// returned unchanged when unset.
    pub asset_base_url: Option<String>,
}

impl TenancyConfig {
    /// The central-host policy derived from this configuration.
    #[must_use]
    pub fn central_policy(&self) -> CentralPolicy {
        CentralPolicy::new(&self.central_domains, &self.dev_host)
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            header_name: HeaderName::from_static("x-tenant-domain"),
            query_param: "tenant".to_string(),
            central_domains: Vec::new(),
            dev_host: "localhost".to_string(),
            binder: BinderConfig::default(),
            asset_base_url: None,
        }
    }
}
