//! Will bridge
//!
//! Transaction-lifecycle bridge for a dead-man's-switch "Will" contract: the
//! owner deposits funds, names a recipient and pings to prove liveness; the
//! recipient claims once the liveness window lapses.
//!
//! # Features
//!
//! - Cached reads of contract state
//! - Server-signed actions with persisted, collision-free nonces
//! - Unsigned deposit descriptors for external wallets, with expiry
//! - Idempotent submission and confirmation tracking per intent
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use will_bridge::{BridgeConfig, FileNonceStore, LocalSigner, RpcLedger, WillBridge};
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let config = BridgeConfig::from_env()?;
//!     let signer = LocalSigner::from_private_key("0x...")?;
//!     let ledger = RpcLedger::new(&config.network, config.poll_interval, config.max_block_lag)?;
//!     let bridge = WillBridge::from_config(
//!         Arc::new(ledger),
//!         signer,
//!         Box::new(FileNonceStore::new(&config.nonce_store_path)),
//!         &config,
//!     );
//!
//!     // Ping, then read the refreshed state
//!     let outcome = bridge.ping(None).await?;
//!     let state = bridge.contract_info().await?;
//!     println!("{} pinged at {}", outcome.tx_hash, state.pinged_last);
//!
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod cache;
pub mod config;
pub mod constants;
pub mod contracts;
pub mod encoder;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod signer;
pub mod types;

// Re-export main types for convenience
pub use bridge::WillBridge;
pub use cache::StateCache;
pub use config::{BridgeConfig, NetworkConfig};
pub use encoder::ActionEncoder;
pub use error::{eyre, BridgeError, Context, ErrorKind, LedgerError, Report, Result};
pub use ledger::{LedgerClient, RpcLedger};
pub use lifecycle::{
    FileNonceStore, IntentState, LifecycleConfig, MemoryNonceStore, NonceStore, TxLifecycle,
    TxOutcome, TxView,
};
pub use signer::{LocalSigner, TransactionSigner, TxRequest};
pub use types::{ContractState, Intent, IntentKey, IntentKind, PreparedTransaction, SignerMode};
