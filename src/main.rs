//! will-bridge: HTTP service for a dead-man's-switch Will contract

use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use will_bridge::gateway::{spawn_cleanup, start_server, AppState};
use will_bridge::{BridgeConfig, FileNonceStore, LocalSigner, RpcLedger, TransactionSigner, WillBridge};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,will_bridge=debug")),
        )
        .init();

    let config = BridgeConfig::from_env()?;
    let private_key = std::env::var("PRIVATE_KEY").context("PRIVATE_KEY environment variable must be set")?;
    let signer = LocalSigner::from_private_key(private_key)?;

    info!("Starting will-bridge...");
    info!("RPC: {}", config.network.rpc_url);
    info!("Chain: {}", config.network.chain_id);
    info!("Contract: {}", config.network.contract);
    info!("Server signer: {}", signer.address());

    let ledger = RpcLedger::new(&config.network, config.poll_interval, config.max_block_lag)?;
    ledger.verify_chain_id().await?;

    let store = FileNonceStore::new(&config.nonce_store_path);
    let bridge = Arc::new(WillBridge::from_config(
        Arc::new(ledger),
        signer,
        Box::new(store),
        &config,
    ));

    spawn_cleanup(bridge.clone(), CLEANUP_INTERVAL);

    start_server(AppState::from_shared(bridge), config.port)
        .await
        .context("API server failed")?;
    Ok(())
}
