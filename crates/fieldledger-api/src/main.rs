mod auth;
mod config;
mod error;
mod routes;

use std::sync::Arc;

use config::{AppConfig, StorageTarget};
use fieldledger_core::services::Ledger;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fieldledger_api=info".parse().expect("valid directive"))
                .add_directive("fieldledger_core=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting fieldledger-api with config: {:?}", config);

    let ledger = match &config.storage {
        StorageTarget::Memory => Ledger::in_memory(config.ledger_settings()),
        StorageTarget::Sqlite(path) => Ledger::open_sqlite(path, config.ledger_settings()).await?,
    };

    let state = AppState::new(Arc::clone(&config), ledger);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("fieldledger-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
