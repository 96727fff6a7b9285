// =============================================================================
// Candela — Main Entry Point
// =============================================================================
//
// Daily OHLC market-data service: normalizes heterogeneous upstream candle
// feeds, persists them in a JSON document store and (optionally) Postgres,
// and serves cached technical-analysis series over REST.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod cache;
mod config;
mod error;
mod indicators;
mod normalize;
mod rate_limit;
mod store;
mod ta;
mod types;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::config::RuntimeConfig;
use crate::store::relational::normalize_database_url;
use crate::store::RelationalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = RuntimeConfig::load("candela.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env();

    // ── 2. Optional relational backend ───────────────────────────────────
    let relational = match config.database_url.as_deref() {
        Some(raw) => {
            let url = normalize_database_url(raw);
            match RelationalStore::connect(&url).await {
                Ok(store) => {
                    if let Err(e) = store.ensure_schema().await {
                        warn!(error = %e, "Failed to ensure daily_ohlc schema");
                    }
                    Some(store)
                }
                Err(e) => {
                    warn!(error = %e, "Postgres unavailable — relational endpoints disabled");
                    None
                }
            }
        }
        None => {
            info!("DATABASE_URL not set — relational endpoints disabled");
            None
        }
    };

    // ── 3. Shared state ──────────────────────────────────────────────────
    let state = Arc::new(AppState::new(config, relational));
    if let Err(e) = state.document_store.ensure_exists() {
        warn!(error = %e, "Failed to initialise the document store");
    }

    // ── 4. API server ────────────────────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let app = api::rest::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await?;

    Ok(())
}
