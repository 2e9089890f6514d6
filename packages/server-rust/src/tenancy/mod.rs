//! Tenant identification: configuration, resolver, middleware, extractors.

pub mod config;
pub mod extract;
pub mod middleware;
pub mod resolver;

pub use config::TenancyConfig;
pub use extract::{CurrentTenant, RequireTenant};
pub use middleware::identify_tenant;
pub use resolver::TenantResolver;
