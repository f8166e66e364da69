pub mod config;
pub mod error;

pub use config::{
    AuthConfig, AvailabilityConfig, Config, DatabaseConfig, GoogleConfig, ServerConfig,
    SyncConfig, ValidationResult,
};
pub use error::{AuthError, DatabaseError, NetworkError};

use anyhow::Result;

/// Initialize logging for the process.
pub fn init() -> Result<()> {
    // Only load .env in development; deployments inject the environment directly.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("Tether core initialized");
    Ok(())
}
