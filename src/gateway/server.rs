//! HTTP server setup and configuration

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::bridge::WillBridge;
use crate::gateway::routes::create_router;
use crate::gateway::AppState;
use crate::ledger::LedgerClient;
use crate::signer::TransactionSigner;

/// Create the full application router with middleware
pub fn create_app<L, S>(state: AppState<L, S>) -> Router
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the HTTP server; returns after Ctrl-C
pub async fn start_server<L, S>(state: AppState<L, S>, port: u16) -> Result<(), std::io::Error>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("API server shutting down");
        })
        .await?;

    Ok(())
}

/// Periodically evict resolved and expired intents
pub fn spawn_cleanup<L, S>(bridge: Arc<WillBridge<L, S>>, every: Duration) -> JoinHandle<()>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            let removed = bridge.prune().await;
            if removed > 0 {
                tracing::debug!("Cleanup evicted {} intent records", removed);
            }
        }
    })
}
