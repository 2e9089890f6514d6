//! Wires configuration into a running [`AppState`].

use std::sync::Arc;

use anyhow::Context as _;
use ems_core::CredentialCodec;
use tracing::{info, warn};

use crate::catalog::{MemoryTenantCatalog, TenantCatalog};
use crate::config::{CatalogSource, ServerConfig};
use crate::network::AppState;
use crate::pool::{ConnectionBinder, ConnectionFactory, MemoryConnectionFactory};

/// Builds the codec, catalog, connection factory, and binder.
///
/// Without `APP_KEY` an ephemeral key is generated; secrets sealed with it
/// cannot be read after a restart.
///
/// # Errors
///
/// Returns an error if the key is malformed, the seed file cannot be loaded,
/// or the catalog database is unreachable.
pub async fn build_state(config: ServerConfig) -> anyhow::Result<AppState> {
    let codec = match config.app_key.as_deref() {
        Some(key) => CredentialCodec::from_base64_key(key).context("invalid APP_KEY")?,
        None => {
            warn!("APP_KEY not set; generating an ephemeral key");
            let key = CredentialCodec::generate_key()?;
            CredentialCodec::from_base64_key(&key)?
        }
    };
    let codec = Arc::new(codec);

    let (catalog, factory) = open_catalog(&config, &codec).await?;
    let binder = Arc::new(ConnectionBinder::new(
        factory,
        Arc::clone(&codec),
        config.tenancy.binder.clone(),
    ));

    info!(
        env = %config.env,
        central_domains = ?config.tenancy.central_domains,
        "tenancy configured"
    );
    Ok(AppState::new(config, catalog, binder, codec))
}

async fn open_catalog(
    config: &ServerConfig,
    codec: &CredentialCodec,
) -> anyhow::Result<(Arc<dyn TenantCatalog>, Arc<dyn ConnectionFactory>)> {
    match &config.catalog {
        CatalogSource::Memory { seed_file } => {
            let catalog = MemoryTenantCatalog::new();
            if let Some(path) = seed_file {
                catalog
                    .load_seed_file(path, codec)
                    .with_context(|| format!("loading seed file {}", path.display()))?;
            }
            info!(tenants = catalog.len(), "using in-memory tenant catalog");
            let catalog: Arc<dyn TenantCatalog> = Arc::new(catalog);
            let factory: Arc<dyn ConnectionFactory> = Arc::new(MemoryConnectionFactory::auto_create());
            Ok((catalog, factory))
        }
        #[cfg(feature = "postgres")]
        CatalogSource::Postgres {
            url,
            max_connections,
        } => {
            use crate::catalog::PgTenantCatalog;
            use crate::pool::PgConnectionFactory;

            let timeout = config.tenancy.binder.bind_timeout;
            let catalog = PgTenantCatalog::connect(url, *max_connections, timeout)
                .await
                .context("connecting to catalog database")?;
            catalog.initialize().await?;
            info!("using PostgreSQL tenant catalog");
            let catalog: Arc<dyn TenantCatalog> = Arc::new(catalog);
            let factory: Arc<dyn ConnectionFactory> = Arc::new(PgConnectionFactory::new(
                config.tenant_pool_max_connections,
                timeout,
            ));
            Ok((catalog, factory))
        }
        #[cfg(not(feature = "postgres"))]
        CatalogSource::Postgres { .. } => {
            anyhow::bail!("DATABASE_URL is set but the server was built without the `postgres` feature")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[tokio::test]
    async fn memory_catalog_loads_seed_file() {
        let key = CredentialCodec::generate_key().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "Alpha", "domain": "alpha.test", "db_name": "alpha_db", "db_password": "pw"}}]"#
        )
        .unwrap();

        let config = ServerConfig {
            app_key: Some(key),
            catalog: CatalogSource::Memory {
                seed_file: Some(file.path().to_path_buf()),
            },
            ..ServerConfig::default()
        };
        let state = build_state(config).await.unwrap();

        let alpha = state.catalog.find_by_domain("alpha.test").await.unwrap().unwrap();
        let sealed = alpha.connection.db_password.clone().unwrap();
        assert_eq!(state.codec.decrypt(&sealed).value(), "pw");

        // The local factory creates databases on demand.
        assert!(state.binder.bind(&alpha).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_app_key_is_rejected() {
        let config = ServerConfig {
            app_key: Some("not-a-key".to_string()),
            ..ServerConfig::default()
        };
        assert!(build_state(config).await.is_err());
    }

    #[tokio::test]
    async fn missing_seed_file_is_an_error() {
        let config = ServerConfig {
            catalog: CatalogSource::Memory {
                seed_file: Some("/nonexistent/tenants.json".into()),
            },
            ..ServerConfig::default()
        };
        let err = build_state(config).await.err().unwrap();
        assert!(err.to_string().contains("seed file"));
    }
}
