use clap::Parser;
use tracing::{error, info};

use ems_server::app::build_state;
use ems_server::config::ServerArgs;
use ems_server::network::NetworkModule;
use ems_server::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerArgs::parse().into_config()?;
    init_tracing(config.log_format)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting ems-server");
    let state = build_state(config).await?;

    let mut module = NetworkModule::new(state);
    let port = module.start().await?;
    info!(port, "ems-server ready");

    module
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("ems-server stopped");
    Ok(())
}
