//! Application state shared across API handlers

use crate::bridge::WillBridge;
use crate::ledger::LedgerClient;
use crate::signer::TransactionSigner;
use std::sync::Arc;

/// Shared application state: one bridge per process
pub struct AppState<L: LedgerClient, S: TransactionSigner> {
    bridge: Arc<WillBridge<L, S>>,
}

impl<L: LedgerClient, S: TransactionSigner> AppState<L, S> {
    pub fn new(bridge: WillBridge<L, S>) -> Self {
        Self::from_shared(Arc::new(bridge))
    }

    /// Wrap a bridge that other tasks (e.g. cleanup) also hold
    pub fn from_shared(bridge: Arc<WillBridge<L, S>>) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &WillBridge<L, S> {
        &self.bridge
    }
}

// manual impl: cloning the Arc must not require L: Clone or S: Clone
impl<L: LedgerClient, S: TransactionSigner> Clone for AppState<L, S> {
    fn clone(&self) -> Self {
        Self {
            bridge: self.bridge.clone(),
        }
    }
}
