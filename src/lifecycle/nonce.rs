//! Server-held key: nonce assignment and the signing critical section
//!
//! The next nonce is reserved, signed, persisted and broadcast under one
//! mutex per signer. The store keeps a high-watermark so a restart never
//! hands out a nonce the node may already have seen.

use crate::error::{BridgeError, LedgerError};
use crate::ledger::{GasQuote, LedgerClient};
use crate::signer::{TransactionSigner, TxRequest};
use crate::types::EncodedCall;
use alloy::primitives::{Address, TxHash};
use eyre::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

/// Persistence for the next unused nonce per signer and chain.
/// Can be used to add support for different storage backends.
pub trait NonceStore: Send + Sync {
    /// Load the persisted next nonce, or None if never saved
    fn load(&self, signer: Address, chain_id: u64) -> Result<Option<u64>>;

    /// Save the next nonce
    fn save(&self, signer: Address, chain_id: u64, next_nonce: u64) -> Result<()>;
}

fn store_key(signer: Address, chain_id: u64) -> String {
    format!("{}:{}", chain_id, signer)
}

/// JSON file store: `{"<chain_id>:<address>": next_nonce}`
///
/// Expects a single writer, which the wallet's critical section guarantees.
pub struct FileNonceStore {
    path: PathBuf,
}

impl FileNonceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<BTreeMap<String, u64>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read nonce store {}", self.path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse nonce store {}", self.path.display()))
    }
}

impl NonceStore for FileNonceStore {
    fn load(&self, signer: Address, chain_id: u64) -> Result<Option<u64>> {
        Ok(self.read_all()?.get(&store_key(signer, chain_id)).copied())
    }

    fn save(&self, signer: Address, chain_id: u64, next_nonce: u64) -> Result<()> {
        let mut all = self.read_all()?;
        all.insert(store_key(signer, chain_id), next_nonce);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // Write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&all)?)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory store; nonces survive only as long as the process
#[derive(Default)]
pub struct MemoryNonceStore {
    inner: StdMutex<HashMap<(Address, u64), u64>>,
}

impl NonceStore for MemoryNonceStore {
    fn load(&self, signer: Address, chain_id: u64) -> Result<Option<u64>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.get(&(signer, chain_id)).copied())
    }

    fn save(&self, signer: Address, chain_id: u64, next_nonce: u64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.insert((signer, chain_id), next_nonce);
        Ok(())
    }
}

/// What the node made of a broadcast
#[derive(Debug)]
pub enum Broadcast {
    Accepted(TxHash),
    /// The request failed in transit; the node may or may not hold the
    /// transaction
    Unknown { tx_hash: TxHash, error: LedgerError },
}

impl Broadcast {
    pub fn tx_hash(&self) -> TxHash {
        match self {
            Self::Accepted(tx_hash) | Self::Unknown { tx_hash, .. } => *tx_hash,
        }
    }
}

/// The service's signing identity
pub struct ServerWallet<S: TransactionSigner> {
    signer: S,
    store: Box<dyn NonceStore>,
    chain_id: u64,
    /// None until seeded from the store and the node
    next_nonce: Mutex<Option<u64>>,
}

impl<S: TransactionSigner> ServerWallet<S> {
    pub fn new(signer: S, store: Box<dyn NonceStore>, chain_id: u64) -> Self {
        Self {
            signer,
            store,
            chain_id,
            next_nonce: Mutex::new(None),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign `call` with the next nonce and broadcast it.
    ///
    /// Holds the wallet lock for the whole reserve/sign/persist/broadcast
    /// sequence. A rejected broadcast rolls the watermark back to the
    /// reserved nonce and the counter re-seeds from the node on next use. A
    /// transport failure keeps the nonce reserved: the node may hold the
    /// transaction.
    pub async fn submit<L: LedgerClient>(
        &self,
        ledger: &L,
        call: &EncodedCall,
        gas: GasQuote,
    ) -> Result<Broadcast, BridgeError> {
        let mut next = self.next_nonce.lock().await;
        let nonce = match *next {
            Some(nonce) => nonce,
            None => self.seed(ledger).await?,
        };

        let tx = TxRequest::new(call.to, call.data.clone(), self.chain_id)
            .with_value(call.value)
            .with_nonce(nonce)
            .with_gas(gas.gas_limit, gas.max_fee_per_gas, gas.max_priority_fee_per_gas);
        let signed = self
            .signer
            .sign_transaction(tx)
            .await
            .map_err(|e| BridgeError::Internal(format!("{:#}", e)))?;

        self.persist(nonce + 1)?;
        tracing::debug!("Reserved nonce {} for {}", nonce, self.address());

        match ledger.broadcast(signed.raw).await {
            Ok(hash) => {
                *next = Some(nonce + 1);
                Ok(Broadcast::Accepted(hash))
            }
            Err(LedgerError::Rejected(detail)) => {
                tracing::warn!("Broadcast with nonce {} rejected, resyncing: {}", nonce, detail);
                *next = None;
                self.persist(nonce)?;
                Err(BridgeError::RejectedByNode(detail))
            }
            Err(error) => {
                tracing::warn!(
                    "Broadcast of {} (nonce {}) unconfirmed, keeping the nonce: {}",
                    signed.hash,
                    nonce,
                    error
                );
                *next = Some(nonce + 1);
                Ok(Broadcast::Unknown {
                    tx_hash: signed.hash,
                    error,
                })
            }
        }
    }

    /// Next nonce is the larger of the persisted watermark and the node's
    /// pending count
    async fn seed<L: LedgerClient>(&self, ledger: &L) -> Result<u64, BridgeError> {
        let stored = self
            .store
            .load(self.address(), self.chain_id)
            .map_err(|e| BridgeError::Internal(format!("{:#}", e)))?
            .unwrap_or(0);
        let pending = ledger.pending_nonce(self.address()).await?;
        let nonce = stored.max(pending);
        tracing::info!(
            "Seeded nonce for {}: {} (stored {}, node {})",
            self.address(),
            nonce,
            stored,
            pending
        );
        Ok(nonce)
    }

    fn persist(&self, next_nonce: u64) -> Result<(), BridgeError> {
        self.store
            .save(self.address(), self.chain_id, next_nonce)
            .map_err(|e| BridgeError::Internal(format!("{:#}", e)))
    }
}
