use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use intake_core::{
    allocation_attempts_from_env_value, constants::DEFAULT_DATA_DIR, CoreConfig, FileStore,
};

/// Main entry point for the intake service
///
/// Resolves configuration once, opens the file store and serves the REST API (with Swagger UI
/// at `/swagger-ui`).
///
/// # Environment Variables
/// - `INTAKE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `INTAKE_DATA_DIR`: Directory for intake data storage (default: "intake_data")
/// - `INTAKE_ALLOCATION_ATTEMPTS`: Compare-and-swap attempts per patient number (default: 5)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("intake_run=info".parse()?)
                .add_directive("intake_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("INTAKE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = std::env::var("INTAKE_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let attempts =
        allocation_attempts_from_env_value(std::env::var("INTAKE_ALLOCATION_ATTEMPTS").ok())?;

    let cfg = Arc::new(CoreConfig::new(PathBuf::from(&data_dir), attempts)?);
    let store = Arc::new(FileStore::new(cfg.clone()));
    let app = router(AppState::new(cfg, store));

    tracing::info!(addr = %rest_addr, data_dir = %data_dir, "-- Starting intake REST API");

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
