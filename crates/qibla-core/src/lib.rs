pub mod config;
pub mod error;

pub use config::{
    CacheBackend, Config, GeocodingConfig, LocationConfig, QiblaConfig, ValidationResult,
};
pub use error::{AppError, ConfigError, NetworkError, ReqwestErrorExt};

use anyhow::Result;

/// Initialize the core application
pub fn init() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Qibla core initialized");
    Ok(())
}
