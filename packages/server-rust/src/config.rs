//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through the environment variable
//! named next to it. Secrets (`APP_KEY`, `ADMIN_TOKEN`, `DATABASE_URL`,
//! `TENANT_DB_PASSWORD`) are never echoed by `--help` or `Debug`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use axum::http::HeaderName;
use clap::{ArgAction, Parser};
use ems_core::{parse_domain_list, ConnectionDefaults};
use subtle::ConstantTimeEq;

use crate::network::NetworkConfig;
use crate::pool::BinderConfig;
use crate::telemetry::LogFormat;
use crate::tenancy::TenancyConfig;

/// Raw arguments as parsed by clap.
#[derive(Parser)]
#[command(name = "ems-server", about = "EMS multi-tenant API server", version)]
pub struct ServerArgs {
    /// Bind address.
    #[arg(long, env = "EMS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port.
    #[arg(long, env = "EMS_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Allowed CORS origins, comma separated. `*` allows any.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Environment name reported by `/health`.
    #[arg(long, env = "APP_ENV", default_value = "production")]
    pub app_env: String,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Catalog database URL. Without it the catalog lives in memory.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Maximum pooled connections to the catalog database.
    #[arg(long, env = "CATALOG_MAX_CONNECTIONS", default_value_t = 10)]
    pub catalog_max_connections: u32,

    /// JSON file of tenants loaded into the in-memory catalog.
    #[arg(long, env = "TENANT_SEED_FILE")]
    pub seed_file: Option<PathBuf>,

    /// 32-byte base64 key sealing tenant database secrets (`base64:` prefix allowed).
    #[arg(long, env = "APP_KEY", hide_env_values = true)]
    pub app_key: Option<String>,

    /// Bearer token for `/admin` routes. Admin routes are closed without it.
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Override header naming the tenant domain.
    #[arg(long, env = "TENANT_HEADER", default_value = "X-Tenant-Domain")]
    pub tenant_header: String,

    /// Override query parameter naming the tenant domain.
    #[arg(long, env = "TENANT_QUERY_PARAM", default_value = "tenant")]
    pub tenant_query_param: String,

    /// Central (non-tenant) domains, comma separated.
    #[arg(long, env = "CENTRAL_DOMAINS", default_value = "")]
    pub central_domains: String,

    /// Development host treated as central.
    #[arg(long, env = "DEV_HOST", default_value = "localhost")]
    pub dev_host: String,

    /// Fallback tenant database host.
    #[arg(long, env = "TENANT_DB_HOST", default_value = "127.0.0.1")]
    pub tenant_db_host: String,

    /// Fallback tenant database port.
    #[arg(long, env = "TENANT_DB_PORT", default_value_t = 5432)]
    pub tenant_db_port: u16,

    /// Fallback tenant database user.
    #[arg(long, env = "TENANT_DB_USERNAME", default_value = "postgres")]
    pub tenant_db_username: String,

    /// Fallback tenant database password.
    #[arg(long, env = "TENANT_DB_PASSWORD", default_value = "", hide_env_values = true, hide_default_value = true)]
    pub tenant_db_password: String,

    /// Upper bound on opening a tenant connection, in seconds.
    #[arg(long, env = "TENANT_BIND_TIMEOUT_SECS", default_value_t = 5)]
    pub tenant_bind_timeout_secs: u64,

    /// Maximum pooled connections per tenant.
    #[arg(long, env = "TENANT_POOL_MAX_CONNECTIONS", default_value_t = 5)]
    pub tenant_pool_max_connections: u32,

    /// Reopen the tenant pool on every request.
    #[arg(long, env = "TENANT_REBUILD_ON_BIND", default_value_t = false, action = ArgAction::Set)]
    pub tenant_rebuild_on_bind: bool,

    /// Accept tenant secrets stored without encryption.
    #[arg(long, env = "ALLOW_PLAINTEXT_SECRETS", default_value_t = true, action = ArgAction::Set)]
    pub allow_plaintext_secrets: bool,

    /// Base URL prefixed to branding asset keys.
    #[arg(long, env = "ASSET_BASE_URL")]
    pub asset_base_url: Option<String>,
}

/// Bearer token guarding the admin routes.
#[derive(Clone)]
pub struct AdminToken(String);

impl AdminToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Constant-time comparison against a presented token.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

impl fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminToken(<redacted>)")
    }
}

/// Where the tenant catalog lives.
#[derive(Clone)]
pub enum CatalogSource {
    /// In-memory catalog, optionally seeded from a JSON file.
    Memory { seed_file: Option<PathBuf> },
    /// `PostgreSQL` catalog.
    Postgres { url: String, max_connections: u32 },
}

impl fmt::Debug for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogSource::Memory { seed_file } => f
                .debug_struct("Memory")
                .field("seed_file", seed_file)
                .finish(),
            CatalogSource::Postgres { max_connections, .. } => f
                .debug_struct("Postgres")
                .field("url", &"<redacted>")
                .field("max_connections", max_connections)
                .finish(),
        }
    }
}

/// Validated server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Environment name (`APP_ENV`).
    pub env: String,
    pub network: NetworkConfig,
    pub tenancy: TenancyConfig,
    pub catalog: CatalogSource,
    /// Maximum pooled connections per tenant (`PostgreSQL` only).
    pub tenant_pool_max_connections: u32,
    /// Base64 application key. `None` means an ephemeral key is generated.
    pub app_key: Option<String>,
    pub admin_token: Option<AdminToken>,
    pub log_format: LogFormat,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("env", &self.env)
            .field("network", &self.network)
            .field("tenancy", &self.tenancy)
            .field("catalog", &self.catalog)
            .field("tenant_pool_max_connections", &self.tenant_pool_max_connections)
            .field("app_key", &self.app_key.as_ref().map(|_| "<redacted>"))
            .field("admin_token", &self.admin_token)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            env: "local".to_string(),
            network: NetworkConfig::default(),
            tenancy: TenancyConfig::default(),
            catalog: CatalogSource::Memory { seed_file: None },
            tenant_pool_max_connections: 5,
            app_key: None,
            admin_token: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerArgs {
    /// Validates the arguments into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant header is not a valid header name.
    pub fn into_config(self) -> anyhow::Result<ServerConfig> {
        let header_name = HeaderName::from_bytes(self.tenant_header.trim().as_bytes())
            .with_context(|| format!("invalid tenant header name {:?}", self.tenant_header))?;

        let catalog = match self.database_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => CatalogSource::Postgres {
                url,
                max_connections: self.catalog_max_connections,
            },
            None => CatalogSource::Memory {
                seed_file: self.seed_file,
            },
        };

        Ok(ServerConfig {
            env: self.app_env,
            network: NetworkConfig {
                host: self.host,
                port: self.port,
                cors_origins: self
                    .cors_origins
                    .into_iter()
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                ..NetworkConfig::default()
            },
            tenancy: TenancyConfig {
                header_name,
                query_param: self.tenant_query_param,
                central_domains: parse_domain_list(&self.central_domains),
                dev_host: self.dev_host,
                binder: BinderConfig {
                    defaults: ConnectionDefaults {
                        host: self.tenant_db_host,
                        port: self.tenant_db_port,
                        username: self.tenant_db_username,
                        password: self.tenant_db_password,
                    },
                    bind_timeout: Duration::from_secs(self.tenant_bind_timeout_secs),
                    rebuild_on_bind: self.tenant_rebuild_on_bind,
                    allow_plaintext_secrets: self.allow_plaintext_secrets,
                },
                asset_base_url: self
                    .asset_base_url
                    .map(|u| u.trim_end_matches('/').to_string())
                    .filter(|u| !u.is_empty()),
            },
            catalog,
            tenant_pool_max_connections: self.tenant_pool_max_connections,
            app_key: self.app_key.filter(|k| !k.trim().is_empty()),
            admin_token: self
                .admin_token
                .filter(|t| !t.is_empty())
                .map(AdminToken::new),
            log_format: self.log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerConfig {
        let mut argv = vec!["ems-server"];
        argv.extend_from_slice(args);
        ServerArgs::try_parse_from(argv).unwrap().into_config().unwrap()
    }

    #[test]
    fn flags_map_onto_config() {
        let config = parse(&[
            "--port",
            "9000",
            "--central-domains",
            "Admin.Example, portal.example",
            "--tenant-header",
            "X-School",
            "--tenant-db-host",
            "db.internal",
            "--tenant-bind-timeout-secs",
            "2",
            "--allow-plaintext-secrets",
            "false",
            "--asset-base-url",
            "https://cdn.example/",
            "--cors-origins",
            "https://a.example,https://b.example",
        ]);
        assert_eq!(config.network.port, 9000);
        assert_eq!(
            config.network.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(
            config.tenancy.central_domains,
            vec!["admin.example", "portal.example"]
        );
        assert_eq!(config.tenancy.header_name.as_str(), "x-school");
        assert_eq!(config.tenancy.binder.defaults.host, "db.internal");
        assert_eq!(config.tenancy.binder.bind_timeout, Duration::from_secs(2));
        assert!(!config.tenancy.binder.allow_plaintext_secrets);
        assert_eq!(
            config.tenancy.asset_base_url.as_deref(),
            Some("https://cdn.example")
        );
    }

    #[test]
    fn database_url_selects_postgres_catalog() {
        let config = parse(&["--database-url", "postgres://u:p@db/ems"]);
        assert!(matches!(config.catalog, CatalogSource::Postgres { .. }));
        assert!(!format!("{config:?}").contains("u:p@db"));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let args = ServerArgs::try_parse_from(["ems-server", "--tenant-header", "bad header"]).unwrap();
        assert!(args.into_config().is_err());
    }

    #[test]
    fn admin_token_compares_exactly() {
        let token = AdminToken::new("s3cret");
        assert!(token.matches("s3cret"));
        assert!(!token.matches("s3cre"));
        assert!(!token.matches("s3cret!"));
        assert_eq!(format!("{token:?}"), "AdminToken(<redacted>)");
    }
}
