//! WillBridge - main entry point of the service
//!
//! Accepts raw caller input, validates it into intents and hands them to the
//! lifecycle manager. Reads go through the state cache.

use crate::cache::StateCache;
use crate::config::BridgeConfig;
use crate::encoder::{parse_address, parse_deposit_amount, parse_recipient};
use crate::error::BridgeError;
use crate::ledger::LedgerClient;
use crate::lifecycle::{Dispatched, LifecycleConfig, NonceStore, ServerWallet, TxLifecycle, TxOutcome, TxView};
use crate::signer::TransactionSigner;
use crate::types::{ContractState, Intent, PreparedTransaction};
use alloy::primitives::{hex, Address, Bytes, TxHash};
use std::sync::Arc;
use std::time::Duration;

/// Service facade over one deployed Will contract
pub struct WillBridge<L: LedgerClient, S: TransactionSigner> {
    ledger: Arc<L>,
    cache: Arc<StateCache<L>>,
    lifecycle: TxLifecycle<L, S>,
}

impl<L: LedgerClient, S: TransactionSigner> WillBridge<L, S> {
    /// Create a bridge from explicit parts
    pub fn new(
        ledger: Arc<L>,
        signer: S,
        store: Box<dyn NonceStore>,
        state_cache_ttl: Duration,
        lifecycle: LifecycleConfig,
    ) -> Self {
        let cache = Arc::new(StateCache::new(ledger.clone(), state_cache_ttl));
        let wallet = ServerWallet::new(signer, store, ledger.chain_id());
        let lifecycle = TxLifecycle::new(ledger.clone(), cache.clone(), wallet, lifecycle);
        Self {
            ledger,
            cache,
            lifecycle,
        }
    }

    /// Create a bridge with the service configuration's timings
    pub fn from_config(ledger: Arc<L>, signer: S, store: Box<dyn NonceStore>, config: &BridgeConfig) -> Self {
        Self::new(
            ledger,
            signer,
            store,
            config.state_cache_ttl,
            LifecycleConfig::from(config),
        )
    }

    /// Address of the server-held key
    pub fn server_address(&self) -> Address {
        self.lifecycle.server_address()
    }

    pub fn contract(&self) -> Address {
        self.ledger.contract()
    }

    pub fn chain_id(&self) -> u64 {
        self.ledger.chain_id()
    }

    // ========== Reads ==========

    /// Current contract state, served from cache while fresh
    pub async fn contract_info(&self) -> Result<ContractState, BridgeError> {
        Ok(self.cache.get().await?)
    }

    // ========== Server-signed actions ==========

    /// Designate the recipient for the first time
    pub async fn set_recipient(&self, recipient: &str, idempotency_key: Option<String>) -> Result<TxOutcome, BridgeError> {
        let recipient = parse_recipient(recipient)?;
        self.run_server_signed(Intent::SetRecipient(recipient), idempotency_key).await
    }

    /// Replace the recipient
    pub async fn change_recipient(
        &self,
        new_recipient: &str,
        idempotency_key: Option<String>,
    ) -> Result<TxOutcome, BridgeError> {
        let recipient = parse_recipient(new_recipient)?;
        self.run_server_signed(Intent::ChangeRecipient(recipient), idempotency_key).await
    }

    /// Prove liveness
    pub async fn ping(&self, idempotency_key: Option<String>) -> Result<TxOutcome, BridgeError> {
        self.run_server_signed(Intent::Ping, idempotency_key).await
    }

    /// Claim the funds; reverts on-chain while the liveness window is open
    pub async fn claim(&self, idempotency_key: Option<String>) -> Result<TxOutcome, BridgeError> {
        self.run_server_signed(Intent::Claim, idempotency_key).await
    }

    pub async fn trigger_reminder(&self, idempotency_key: Option<String>) -> Result<TxOutcome, BridgeError> {
        self.run_server_signed(Intent::TriggerReminder, idempotency_key).await
    }

    async fn run_server_signed(
        &self,
        intent: Intent,
        idempotency_key: Option<String>,
    ) -> Result<TxOutcome, BridgeError> {
        match self.lifecycle.dispatch(None, idempotency_key, intent).await? {
            Dispatched::Resolved(outcome) => Ok(outcome),
            Dispatched::Prepared(_) => Err(BridgeError::Internal(
                "server-signed intent produced an unsigned descriptor".to_string(),
            )),
        }
    }

    // ========== Client-signed actions ==========

    /// Build an unsigned deposit for `from` to sign
    ///
    /// # Arguments
    ///
    /// * `amount` - Decimal ETH amount, e.g. `"1.5"`
    /// * `from` - Account that will sign and fund the deposit
    /// * `idempotency_key` - Optional caller-supplied dedup key
    pub async fn prepare_deposit(
        &self,
        amount: &str,
        from: &str,
        idempotency_key: Option<String>,
    ) -> Result<PreparedTransaction, BridgeError> {
        let wei = parse_deposit_amount(amount)?;
        let from = parse_address(from)?;
        match self
            .lifecycle
            .dispatch(Some(from), idempotency_key, Intent::Deposit(wei))
            .await?
        {
            Dispatched::Prepared(prepared) => Ok(prepared),
            Dispatched::Resolved(_) => Err(BridgeError::Internal(
                "client-signed intent was resolved without a signature".to_string(),
            )),
        }
    }

    /// Broadcast a `0x`-hex signed transaction built from a prepared descriptor
    pub async fn submit_signed_tx(&self, signed_tx: &str) -> Result<TxOutcome, BridgeError> {
        let raw = hex::decode(signed_tx.trim())
            .map_err(|e| BridgeError::InvalidRequest(format!("signedTx is not hex: {}", e)))?;
        if raw.is_empty() {
            return Err(BridgeError::InvalidRequest("signedTx is empty".to_string()));
        }
        self.lifecycle.submit_signed(Bytes::from(raw)).await
    }

    // ========== Status ==========

    /// Status of a transaction this bridge broadcast
    pub async fn tx_status(&self, tx_hash: &str) -> Result<TxView, BridgeError> {
        let tx_hash: TxHash = tx_hash
            .trim()
            .parse()
            .map_err(|_| BridgeError::InvalidRequest(format!("{:?} is not a transaction hash", tx_hash)))?;
        self.lifecycle.status(tx_hash).await
    }

    /// Evict resolved and abandoned intents past the retention window
    pub async fn prune(&self) -> usize {
        self.lifecycle.prune().await
    }
}
