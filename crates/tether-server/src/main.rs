use anyhow::{Context, Result};

use tether_core::Config;
use tether_server::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tether_core::init()?;

    let (config, _validation) = Config::load_validated()?;
    tracing::info!("Starting tether-server with config: {:?}", config);

    let bind_addr = config.server.bind_addr.clone();
    let state = AppState::from_config(config)?;
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("tether-server listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
