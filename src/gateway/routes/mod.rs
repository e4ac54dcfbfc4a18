//! API route handlers

pub mod contract;
pub mod health;

use axum::{routing::get, Router};

use crate::gateway::AppState;
use crate::ledger::LedgerClient;
use crate::signer::TransactionSigner;

/// Create the API router with all routes
pub fn create_router<L, S>(state: AppState<L, S>) -> Router
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/contract", contract::router())
        .with_state(state)
}
