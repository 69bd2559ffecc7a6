//! # huddle-server
//!
//! Real-time chat hub for the Huddle social app.
//!
//! This binary provides:
//! - **Live chat relay** over websockets: messages are fanned out to the
//!   other participants of a chat, or kept in the record store until the
//!   recipient next connects
//! - **Anonymous group matching**: users waiting for a chat are grouped by
//!   shared interests into chats of three to six
//! - **REST API** (axum) for health checks and find-chat requests

mod api;
mod client;
mod config;
mod error;
mod finder;
mod hub;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use huddle_shared::session::ClaimsVerifier;
use huddle_store::{RecordStore, SqliteStore};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::finder::ChatFinder;
use crate::hub::Hub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,huddle_server=debug")),
        )
        .init();

    info!("Starting Huddle chat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&config.database_path)?);
    info!(path = %config.database_path.display(), "Record store opened");

    let hub = Hub::spawn(store.clone());
    let finder = Arc::new(ChatFinder::new(
        store.clone(),
        hub.clone(),
        config.max_waiting_pool,
    ));

    let http_addr = config.http_addr;
    let app_state = AppState {
        hub,
        store,
        verifier: Arc::new(ClaimsVerifier::new()),
        finder,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
