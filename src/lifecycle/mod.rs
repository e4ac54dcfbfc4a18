//! Transaction lifecycle manager
//!
//! Drives every intent through `Validated -> (Prepared) -> Submitted ->
//! terminal`. Each idempotency key owns a slot guarded by its own async
//! mutex; the slot is held from the first check until the intent resolves, so
//! two requests for the same key can never both broadcast. The server key has
//! one global critical section of its own inside [`ServerWallet`].

mod nonce;
mod record;

pub use nonce::{Broadcast, FileNonceStore, MemoryNonceStore, NonceStore, ServerWallet};
pub use record::{IntentRecord, IntentState, TxOutcome, TxView};

use crate::cache::StateCache;
use crate::config::BridgeConfig;
use crate::constants::*;
use crate::encoder::ActionEncoder;
use crate::error::{BridgeError, LedgerError};
use crate::ledger::{Confirmation, LedgerClient};
use crate::signer::TransactionSigner;
use crate::types::{
    EncodedCall, Intent, IntentKey, IntentKind, PreparedTransaction, SignedTransaction,
    SignerMode, SubmittedTransaction, TxStatus,
};
use alloy::primitives::utils::format_ether;
use alloy::primitives::{Address, Bytes, TxHash};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

type Slot = Arc<Mutex<Option<IntentRecord>>>;

/// Timing policy for the lifecycle
#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    pub prepared_ttl: Duration,
    pub confirmation_timeout: Duration,
    pub result_retention: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            prepared_ttl: Duration::from_secs(DEFAULT_PREPARED_TTL_SECS),
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            result_retention: Duration::from_secs(DEFAULT_RESULT_RETENTION_SECS),
        }
    }
}

impl From<&BridgeConfig> for LifecycleConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            prepared_ttl: config.prepared_ttl,
            confirmation_timeout: config.confirmation_timeout,
            result_retention: config.result_retention,
        }
    }
}

/// Result of dispatching an intent on its signer path
#[derive(Debug, Clone)]
pub enum Dispatched {
    /// Client-signed: an unsigned descriptor for the caller to sign
    Prepared(PreparedTransaction),
    /// Server-signed: the confirmed transaction
    Resolved(TxOutcome),
}

pub struct TxLifecycle<L: LedgerClient, S: TransactionSigner> {
    ledger: Arc<L>,
    cache: Arc<StateCache<L>>,
    encoder: ActionEncoder,
    wallet: ServerWallet<S>,
    config: LifecycleConfig,
    records: RwLock<HashMap<IntentKey, Slot>>,
    by_hash: RwLock<HashMap<TxHash, IntentKey>>,
    auto_key: AtomicU64,
    prepare_seq: AtomicU64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl<L: LedgerClient, S: TransactionSigner> TxLifecycle<L, S> {
    pub fn new(
        ledger: Arc<L>,
        cache: Arc<StateCache<L>>,
        wallet: ServerWallet<S>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            encoder: ActionEncoder::new(ledger.contract()),
            ledger,
            cache,
            wallet,
            config,
            records: RwLock::new(HashMap::new()),
            by_hash: RwLock::new(HashMap::new()),
            auto_key: AtomicU64::new(0),
            prepare_seq: AtomicU64::new(0),
        }
    }

    /// Address of the server-held key
    pub fn server_address(&self) -> Address {
        self.wallet.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.ledger.chain_id()
    }

    /// Idempotency key for a request; without a caller nonce a fresh one is
    /// drawn from the per-process counter
    pub fn intent_key(&self, caller: Address, kind: IntentKind, nonce: Option<String>) -> IntentKey {
        let nonce = match nonce.filter(|n| !n.trim().is_empty()) {
            Some(nonce) => nonce,
            None => format!("auto-{}", self.auto_key.fetch_add(1, Ordering::Relaxed) + 1),
        };
        IntentKey::new(caller, kind, nonce)
    }

    /// Validate and encode `intent`, then run it on its signer path.
    ///
    /// `caller` is required for client-signed intents (it is the account that
    /// will sign); server-signed intents default to the server address.
    pub async fn dispatch(
        &self,
        caller: Option<Address>,
        nonce: Option<String>,
        intent: Intent,
    ) -> Result<Dispatched, BridgeError> {
        let call = self.encoder.encode(&intent)?;
        self.prune().await;

        match intent.signer_mode() {
            SignerMode::Server => {
                let caller = caller.unwrap_or_else(|| self.wallet.address());
                let key = self.intent_key(caller, intent.kind(), nonce);
                self.run_server_signed(key, call).await.map(Dispatched::Resolved)
            }
            SignerMode::Client => {
                let from = caller.ok_or_else(|| {
                    BridgeError::InvalidAddress(format!(
                        "{} is client-signed and needs the sender address",
                        intent.kind()
                    ))
                })?;
                let key = self.intent_key(from, intent.kind(), nonce);
                self.prepare_client_signed(key, call, from)
                    .await
                    .map(Dispatched::Prepared)
            }
        }
    }

    // ========== Server-signed path ==========

    async fn run_server_signed(&self, key: IntentKey, call: EncodedCall) -> Result<TxOutcome, BridgeError> {
        let slot = self.slot(&key).await;
        let mut guard = slot.lock().await;

        if let Some(record) = guard.as_mut() {
            ensure_same_call(record, &call)?;
            match record.state {
                IntentState::Confirmed | IntentState::Reverted => {
                    debug!("Replaying {} for {}", record.state.as_str(), key);
                    return record.replay();
                }
                IntentState::Submitted | IntentState::TimedOut => {
                    info!("{} already in flight, re-checking its receipt", key);
                    return self.resolve(record).await;
                }
                // nothing was accepted by the node, start over
                IntentState::Rejected | IntentState::Validated | IntentState::Prepared => {}
            }
        }

        let from = self.wallet.address();
        // a call that would revert fails here without consuming a nonce
        let gas = self.ledger.estimate_gas(from, &call).await?;

        let sent = match self.wallet.submit(self.ledger.as_ref(), &call, gas).await {
            Ok(sent) => sent,
            Err(e) => {
                if let BridgeError::RejectedByNode(detail) = &e {
                    warn!("{} rejected by node: {}", key, detail);
                    *guard = Some(IntentRecord::rejected(key, call, from, detail.clone()));
                }
                return Err(e);
            }
        };

        let tx_hash = sent.tx_hash();
        let tx = SubmittedTransaction::new(tx_hash, key.clone(), unix_now());
        let record = guard.insert(IntentRecord::submitted(key.clone(), call, from, tx));
        self.by_hash.write().await.insert(tx_hash, key.clone());

        if let Broadcast::Unknown { error, .. } = sent {
            warn!("Broadcast of {} for {} unconfirmed ({}), tracking it as pending", tx_hash, key, error);
            record.mark_timed_out();
            return Err(BridgeError::TimedOut(tx_hash));
        }
        info!("Submitted {} as {}", key, tx_hash);

        self.resolve(record).await
    }

    // ========== Client-signed path ==========

    async fn prepare_client_signed(
        &self,
        key: IntentKey,
        call: EncodedCall,
        from: Address,
    ) -> Result<PreparedTransaction, BridgeError> {
        let slot = self.slot(&key).await;
        let mut guard = slot.lock().await;

        if let Some(record) = guard.as_ref() {
            ensure_same_call(record, &call)?;
            match record.state {
                IntentState::Prepared => {
                    if !record.is_expired(Instant::now(), self.config.prepared_ttl) {
                        if let Some(prepared) = &record.prepared {
                            debug!("Returning existing descriptor for {}", key);
                            return Ok(prepared.clone());
                        }
                    }
                    info!("Prepared descriptor for {} expired, preparing a fresh one", key);
                }
                IntentState::Submitted | IntentState::TimedOut | IntentState::Confirmed => {
                    let tx_hash = record.tx_hash().unwrap_or_default();
                    return Err(BridgeError::AlreadySubmitted { tx_hash });
                }
                IntentState::Reverted | IntentState::Rejected | IntentState::Validated => {}
            }
        }

        let nonce = self.ledger.pending_nonce(from).await?;
        let mut prepared = self
            .ledger
            .build_call(call.to, call.data.clone(), call.value, nonce)?;
        prepared.prepare_id = self.prepare_seq.fetch_add(1, Ordering::Relaxed) + 1;
        prepared.expires_at = unix_now() + self.config.prepared_ttl.as_secs();

        info!(
            "Prepared {} for {} (id {}, nonce {}, value {} ETH)",
            key.kind,
            from,
            prepared.prepare_id,
            nonce,
            format_ether(prepared.value)
        );
        *guard = Some(IntentRecord::prepared(key, call, from, prepared.clone()));
        Ok(prepared)
    }

    /// Broadcast a transaction signed by the caller against a live prepared
    /// descriptor, then wait for it to resolve
    pub async fn submit_signed(&self, raw: Bytes) -> Result<TxOutcome, BridgeError> {
        let signed = SignedTransaction::decode(raw)?;
        self.prune().await;

        let expected = self.ledger.chain_id();
        if signed.chain_id != Some(expected) {
            return Err(BridgeError::ChainMismatch {
                expected,
                actual: signed.chain_id,
            });
        }
        if signed.to != Some(self.ledger.contract()) {
            return Err(BridgeError::InvalidRequest(
                "signed transaction does not call the Will contract".to_string(),
            ));
        }

        // same bytes submitted twice
        if let Some(slot) = self.slot_for_hash(&signed.hash).await {
            let mut guard = slot.lock().await;
            if let Some(record) = guard.as_mut() {
                if record.tx_hash() == Some(signed.hash) {
                    if record.state.is_pending() {
                        return self.resolve(record).await;
                    }
                    return record.replay();
                }
            }
        }

        let now = Instant::now();
        let mut expired = None;
        for slot in self.client_slots(signed.from).await {
            let mut guard = slot.lock().await;
            let Some(record) = guard.as_mut() else {
                continue;
            };
            // a concurrent submission of the same bytes got here first
            if record.tx_hash() == Some(signed.hash) {
                return record.replay();
            }
            let Some(prepared) = record.prepared.as_ref() else {
                continue;
            };
            if record.state != IntentState::Prepared || !prepared.matches(&signed) {
                continue;
            }
            // a live descriptor for the same transaction may come later
            if record.is_expired(now, self.config.prepared_ttl) {
                expired.get_or_insert((prepared.prepare_id, prepared.expires_at));
                continue;
            }

            let key = record.key.clone();
            let tx_hash = match self.ledger.broadcast(signed.raw.clone()).await {
                Ok(hash) => hash,
                Err(LedgerError::Rejected(detail)) => {
                    warn!("{} rejected by node: {}", key, detail);
                    record.mark_rejected(detail.clone());
                    return Err(BridgeError::RejectedByNode(detail));
                }
                Err(e) => {
                    warn!("Broadcast of {} for {} unconfirmed ({}), tracking it as pending", signed.hash, key, e);
                    record.mark_submitted(SubmittedTransaction::new(signed.hash, key.clone(), unix_now()));
                    record.mark_timed_out();
                    self.by_hash.write().await.insert(signed.hash, key);
                    return Err(BridgeError::TimedOut(signed.hash));
                }
            };

            record.mark_submitted(SubmittedTransaction::new(tx_hash, key.clone(), unix_now()));
            info!("Submitted client-signed {} as {}", key, tx_hash);
            self.by_hash.write().await.insert(tx_hash, key);

            return self.resolve(record).await;
        }

        if let Some((prepare_id, expires_at)) = expired {
            warn!("Refusing {}: prepared descriptor {} expired", signed.hash, prepare_id);
            return Err(BridgeError::Expired(format!(
                "descriptor {} expired at {}; call prepare-deposit again",
                prepare_id, expires_at
            )));
        }
        Err(BridgeError::InvalidRequest(format!(
            "no prepared transaction from {} matches the signed transaction",
            signed.from
        )))
    }

    // ========== Resolution ==========

    /// Wait for a submitted record to reach a terminal state
    async fn resolve(&self, record: &mut IntentRecord) -> Result<TxOutcome, BridgeError> {
        let Some(tx_hash) = record.tx_hash() else {
            return Err(BridgeError::Internal(format!("{} has no transaction", record.key)));
        };
        let confirmation = self
            .ledger
            .await_confirmation(tx_hash, self.config.confirmation_timeout)
            .await?;
        self.apply(record, confirmation).await;
        record.replay()
    }

    async fn apply(&self, record: &mut IntentRecord, confirmation: Confirmation) {
        let tx_hash = record.tx_hash().unwrap_or_default();
        match confirmation {
            Confirmation::Confirmed(receipt) => {
                record.mark_confirmed(unix_now());
                self.cache.invalidate().await;
                info!(
                    "{} confirmed in block {:?} (gas used {})",
                    tx_hash, receipt.block_number, receipt.gas_used
                );
            }
            Confirmation::Reverted { block_number, reason } => {
                let reason = match reason {
                    Some(reason) => reason,
                    None => {
                        let parent = block_number.map(|n| n.saturating_sub(1));
                        self.revert_reason(record, parent).await
                    }
                };
                warn!("{} reverted: {}", tx_hash, reason);
                record.mark_reverted(reason);
            }
            Confirmation::TimedOut => {
                warn!("No receipt for {} yet, leaving it pending", tx_hash);
                record.mark_timed_out();
            }
        }
    }

    /// Replay the call on the state it ran against to recover the revert
    /// reason
    async fn revert_reason(&self, record: &IntentRecord, block: Option<u64>) -> String {
        match self.ledger.simulate(record.from, &record.call, block).await {
            Err(LedgerError::Reverted(reason)) => reason,
            _ => "execution reverted".to_string(),
        }
    }

    /// Status of a broadcast transaction; a pending one is polled once
    pub async fn status(&self, tx_hash: TxHash) -> Result<TxView, BridgeError> {
        let slot = self
            .slot_for_hash(&tx_hash)
            .await
            .ok_or(BridgeError::NotFound(tx_hash))?;

        let Ok(mut guard) = slot.try_lock() else {
            // a request is still waiting on this transaction
            let key = self.by_hash.read().await.get(&tx_hash).cloned();
            let intent = key.map(|k| k.kind).ok_or(BridgeError::NotFound(tx_hash))?;
            return Ok(TxView {
                tx_hash,
                intent,
                state: IntentState::Submitted,
                status: TxStatus::Pending,
                submitted_at: None,
                confirmed_at: None,
                reason: None,
            });
        };
        let record = guard.as_mut().ok_or(BridgeError::NotFound(tx_hash))?;

        if record.state.is_pending() {
            let confirmation = self.ledger.await_confirmation(tx_hash, Duration::ZERO).await?;
            if confirmation != Confirmation::TimedOut {
                self.apply(record, confirmation).await;
            }
        }
        record.view().ok_or(BridgeError::NotFound(tx_hash))
    }

    // ========== Registry ==========

    async fn slot(&self, key: &IntentKey) -> Slot {
        if let Some(slot) = self.records.read().await.get(key) {
            return slot.clone();
        }
        self.records.write().await.entry(key.clone()).or_default().clone()
    }

    async fn slot_for_hash(&self, tx_hash: &TxHash) -> Option<Slot> {
        let key = self.by_hash.read().await.get(tx_hash).cloned()?;
        self.records.read().await.get(&key).cloned()
    }

    async fn client_slots(&self, from: Address) -> Vec<Slot> {
        self.records
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.caller == from && key.kind.signer_mode() == SignerMode::Client)
            .map(|(_, slot)| slot.clone())
            .collect()
    }

    /// Drop resolved and abandoned records past the retention window.
    ///
    /// Only slots nobody else references are touched, so an in-flight request
    /// never loses its record.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut evicted = Vec::new();

        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Ok(guard) = slot.try_lock() else {
                return true;
            };
            match guard.as_ref() {
                None => false,
                Some(record) => {
                    let keep = !record.is_evictable(
                        now,
                        self.config.prepared_ttl,
                        self.config.result_retention,
                    );
                    if !keep {
                        evicted.extend(record.tx_hash());
                    }
                    keep
                }
            }
        });
        let removed = before - records.len();
        drop(records);

        if !evicted.is_empty() {
            let mut by_hash = self.by_hash.write().await;
            for tx_hash in &evicted {
                by_hash.remove(tx_hash);
            }
        }
        if removed > 0 {
            debug!("Pruned {} intent records", removed);
        }
        removed
    }
}

fn ensure_same_call(record: &IntentRecord, call: &EncodedCall) -> Result<(), BridgeError> {
    if record.call != *call {
        return Err(BridgeError::InvalidRequest(format!(
            "idempotency key {} was already used with different parameters",
            record.key.nonce
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::{MockLedger, CHAIN_ID, WILL};
    use crate::signer::{LocalSigner, TxRequest};
    use alloy::primitives::{address, U256};
    use std::sync::atomic::Ordering;

    const ALICE: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");

    type Lifecycle = TxLifecycle<MockLedger, LocalSigner>;

    fn setup(ledger: MockLedger, config: LifecycleConfig) -> (Arc<MockLedger>, Arc<StateCache<MockLedger>>, Lifecycle) {
        let ledger = Arc::new(ledger);
        let cache = Arc::new(StateCache::new(ledger.clone(), Duration::from_secs(60)));
        let wallet = ServerWallet::new(LocalSigner::random(), Box::new(MemoryNonceStore::default()), CHAIN_ID);
        let lifecycle = TxLifecycle::new(ledger.clone(), cache.clone(), wallet, config);
        (ledger, cache, lifecycle)
    }

    fn fast() -> LifecycleConfig {
        LifecycleConfig {
            prepared_ttl: Duration::from_secs(600),
            confirmation_timeout: Duration::from_millis(100),
            result_retention: Duration::from_secs(3600),
        }
    }

    fn key(nonce: &str) -> Option<String> {
        Some(nonce.to_string())
    }

    async fn sign(client: &LocalSigner, prepared: &PreparedTransaction, chain_id: u64) -> Bytes {
        let tx = TxRequest::new(prepared.to, prepared.data.clone(), chain_id)
            .with_value(prepared.value)
            .with_nonce(prepared.nonce)
            .with_gas(60_000, 2_000_000_000, 1_000_000_000);
        client.sign_transaction(tx).await.unwrap().raw
    }

    async fn prepare_deposit(lifecycle: &Lifecycle, from: Address, wei: u64, nonce: &str) -> PreparedTransaction {
        match lifecycle
            .dispatch(Some(from), key(nonce), Intent::Deposit(U256::from(wei)))
            .await
            .unwrap()
        {
            Dispatched::Prepared(prepared) => prepared,
            other => panic!("expected a descriptor, got {:?}", other),
        }
    }

    async fn prepare_keyless(lifecycle: &Lifecycle, from: Address, wei: u64) -> PreparedTransaction {
        match lifecycle
            .dispatch(Some(from), None, Intent::Deposit(U256::from(wei)))
            .await
            .unwrap()
        {
            Dispatched::Prepared(prepared) => prepared,
            other => panic!("expected a descriptor, got {:?}", other),
        }
    }

    fn resolved(result: Result<Dispatched, BridgeError>) -> Result<TxOutcome, BridgeError> {
        result.map(|d| match d {
            Dispatched::Resolved(outcome) => outcome,
            other => panic!("expected an outcome, got {:?}", other),
        })
    }

    #[tokio::test]
    async fn test_duplicate_ping_broadcasts_once() {
        let ledger = MockLedger::new().with_confirmation_delay(Duration::from_millis(50));
        let (ledger, _, lifecycle) = setup(ledger, fast());

        let (a, b) = tokio::join!(
            lifecycle.dispatch(None, key("ping-1"), Intent::Ping),
            lifecycle.dispatch(None, key("ping-1"), Intent::Ping),
        );
        let (a, b) = (resolved(a).unwrap(), resolved(b).unwrap());
        assert_eq!(a.tx_hash, b.tx_hash);
        assert_eq!(a.state, IntentState::Confirmed);
        assert_eq!(ledger.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_broadcast_separately() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());

        let a = resolved(lifecycle.dispatch(None, None, Intent::Ping).await).unwrap();
        let b = resolved(lifecycle.dispatch(None, None, Intent::Ping).await).unwrap();
        assert_ne!(a.tx_hash, b.tx_hash);
        assert_eq!(ledger.broadcast_count(), 2);
    }

    #[tokio::test]
    async fn test_timed_out_intent_is_rechecked_not_resubmitted() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());
        ledger.withhold_receipts.store(true, Ordering::SeqCst);

        let err = resolved(lifecycle.dispatch(None, key("p"), Intent::Ping).await).unwrap_err();
        let BridgeError::TimedOut(tx_hash) = err else {
            panic!("expected TimedOut, got {:?}", err);
        };
        let view = lifecycle.status(tx_hash).await.unwrap();
        assert_eq!(view.state, IntentState::TimedOut);
        assert_eq!(view.status, TxStatus::Pending);

        // the receipt shows up later
        ledger.withhold_receipts.store(false, Ordering::SeqCst);
        let outcome = resolved(lifecycle.dispatch(None, key("p"), Intent::Ping).await).unwrap();
        assert_eq!(outcome.tx_hash, tx_hash);
        assert_eq!(ledger.broadcast_count(), 1);
        assert_eq!(lifecycle.status(tx_hash).await.unwrap().status, TxStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_invalid_recipient_never_reaches_ledger() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());

        let err = lifecycle
            .dispatch(None, None, Intent::SetRecipient(Address::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidAddress(_)));
        assert_eq!(ledger.broadcast_count(), 0);
        assert_eq!(ledger.read_count(), 0);
    }

    #[tokio::test]
    async fn test_confirmed_set_recipient_invalidates_cache() {
        let (_, cache, lifecycle) = setup(MockLedger::new(), fast());
        assert_eq!(cache.get().await.unwrap().recipient, Address::ZERO);

        let outcome = resolved(
            lifecycle
                .dispatch(None, None, Intent::SetRecipient(ALICE))
                .await,
        )
        .unwrap();
        assert_eq!(outcome.intent, IntentKind::SetRecipient);
        assert_eq!(cache.get().await.unwrap().recipient, ALICE);
    }

    #[tokio::test]
    async fn test_key_reuse_with_other_parameters() {
        let (_, _, lifecycle) = setup(MockLedger::new(), fast());

        resolved(lifecycle.dispatch(None, key("r"), Intent::SetRecipient(ALICE)).await).unwrap();
        let err = lifecycle
            .dispatch(None, key("r"), Intent::SetRecipient(WILL))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_early_claim_reverts_with_reason() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());

        let err = resolved(lifecycle.dispatch(None, key("c"), Intent::Claim).await).unwrap_err();
        assert!(matches!(err, BridgeError::Reverted { tx_hash: Some(_), .. }));
        assert_eq!(err.reason(), Some("Too early to claim"));
        assert_eq!(ledger.broadcast_count(), 1);
        // reason recovered against the parent of the receipt's block
        assert_eq!(*ledger.simulated_at.lock().unwrap(), Some(Some(0)));

        // replayed, not resubmitted
        let again = resolved(lifecycle.dispatch(None, key("c"), Intent::Claim).await).unwrap_err();
        assert_eq!(again.tx_hash(), err.tx_hash());
        assert_eq!(ledger.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn test_preflight_revert_keeps_nonce() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());
        ledger.preflight_reverts.store(true, Ordering::SeqCst);

        let err = resolved(lifecycle.dispatch(None, None, Intent::Claim).await).unwrap_err();
        assert!(matches!(err, BridgeError::Reverted { tx_hash: None, .. }));
        assert_eq!(ledger.broadcast_count(), 0);

        // nonce 0 is still free: the mock rejects any gap
        tokio_test::assert_ok!(resolved(lifecycle.dispatch(None, None, Intent::Ping).await));
    }

    #[tokio::test]
    async fn test_claim_after_window_lapses() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());
        resolved(lifecycle.dispatch(None, None, Intent::SetRecipient(ALICE)).await).unwrap();
        ledger.lapse_liveness();

        let outcome = resolved(lifecycle.dispatch(None, None, Intent::Claim).await).unwrap();
        assert_eq!(outcome.state, IntentState::Confirmed);
    }

    #[tokio::test]
    async fn test_rejected_intent_can_be_retried() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());
        ledger.reject_next.store(true, Ordering::SeqCst);

        let err = resolved(lifecycle.dispatch(None, key("t"), Intent::TriggerReminder).await).unwrap_err();
        assert!(matches!(err, BridgeError::RejectedByNode(_)));

        let outcome = resolved(lifecycle.dispatch(None, key("t"), Intent::TriggerReminder).await).unwrap();
        assert_eq!(outcome.state, IntentState::Confirmed);
        assert_eq!(ledger.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn test_deposit_round_trip() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());
        let client = LocalSigner::random();

        let prepared = prepare_deposit(&lifecycle, client.address(), 5_000, "d").await;
        assert_eq!(prepared.chain_id, CHAIN_ID);
        assert_eq!(prepared.to, WILL);
        assert_eq!(prepared.value, U256::from(5_000u64));

        // duplicate prepare returns the same descriptor
        let again = prepare_deposit(&lifecycle, client.address(), 5_000, "d").await;
        assert_eq!(again.prepare_id, prepared.prepare_id);

        let raw = sign(&client, &prepared, CHAIN_ID).await;
        let outcome = lifecycle.submit_signed(raw.clone()).await.unwrap();
        assert_eq!(outcome.intent, IntentKind::Deposit);
        assert_eq!(ledger.balance(), U256::from(5_000u64));

        // resubmitting the same bytes replays
        let replay = lifecycle.submit_signed(raw).await.unwrap();
        assert_eq!(replay.tx_hash, outcome.tx_hash);
        assert_eq!(ledger.broadcast_count(), 1);

        // and the key is spent
        let err = lifecycle
            .dispatch(Some(client.address()), key("d"), Intent::Deposit(U256::from(5_000u64)))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::AlreadySubmitted { .. }));
    }

    #[tokio::test]
    async fn test_expired_descriptor_cannot_be_broadcast() {
        let config = LifecycleConfig {
            prepared_ttl: Duration::from_millis(50),
            ..fast()
        };
        let (ledger, _, lifecycle) = setup(MockLedger::new(), config);
        let client = LocalSigner::random();

        let stale = prepare_deposit(&lifecycle, client.address(), 1_000, "d").await;
        let raw = sign(&client, &stale, CHAIN_ID).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        let err = lifecycle.submit_signed(raw).await.unwrap_err();
        assert!(matches!(err, BridgeError::Expired(_)));
        assert_eq!(ledger.broadcast_count(), 0);

        let fresh = prepare_deposit(&lifecycle, client.address(), 1_000, "d").await;
        assert!(fresh.prepare_id > stale.prepare_id);
        let raw = sign(&client, &fresh, CHAIN_ID).await;
        tokio_test::assert_ok!(lifecycle.submit_signed(raw).await);
    }

    #[tokio::test]
    async fn test_fresh_descriptor_without_key_after_expiry() {
        let config = LifecycleConfig {
            prepared_ttl: Duration::from_millis(30),
            ..fast()
        };
        // the stale and fresh records sit in a map; cover both scan orders
        for _ in 0..10 {
            let (ledger, _, lifecycle) = setup(MockLedger::new(), config);
            let client = LocalSigner::random();

            let stale = prepare_keyless(&lifecycle, client.address(), 1_000).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            let fresh = prepare_keyless(&lifecycle, client.address(), 1_000).await;
            assert_ne!(fresh.prepare_id, stale.prepare_id);
            assert_eq!(fresh.nonce, stale.nonce);

            let raw = sign(&client, &fresh, CHAIN_ID).await;
            let outcome = lifecycle.submit_signed(raw).await.unwrap();
            assert_eq!(outcome.state, IntentState::Confirmed);
            assert_eq!(ledger.broadcast_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_signature_over_identical_descriptor_is_accepted() {
        let config = LifecycleConfig {
            prepared_ttl: Duration::from_millis(30),
            ..fast()
        };
        let (ledger, _, lifecycle) = setup(MockLedger::new(), config);
        let client = LocalSigner::random();

        let stale = prepare_deposit(&lifecycle, client.address(), 1_000, "d").await;
        let raw = sign(&client, &stale, CHAIN_ID).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // same key, same sender nonce: the fresh descriptor describes the same tx
        let fresh = prepare_deposit(&lifecycle, client.address(), 1_000, "d").await;
        assert!(fresh.prepare_id > stale.prepare_id);
        assert_eq!(fresh.nonce, stale.nonce);

        tokio_test::assert_ok!(lifecycle.submit_signed(raw).await);
        assert_eq!(ledger.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn test_lost_broadcast_reply_is_not_resubmitted() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());
        ledger.drop_next_ack.store(true, Ordering::SeqCst);

        let err = resolved(lifecycle.dispatch(None, key("ping-1"), Intent::Ping).await).unwrap_err();
        let BridgeError::TimedOut(tx_hash) = err else {
            panic!("expected TimedOut, got {:?}", err);
        };
        assert_eq!(ledger.broadcast_count(), 1);

        // the retry finds the receipt instead of signing again
        let outcome = resolved(lifecycle.dispatch(None, key("ping-1"), Intent::Ping).await).unwrap();
        assert_eq!(outcome.tx_hash, tx_hash);
        assert_eq!(outcome.state, IntentState::Confirmed);
        assert_eq!(ledger.broadcast_count(), 1);

        // and the next intent uses the following nonce
        tokio_test::assert_ok!(resolved(lifecycle.dispatch(None, key("ping-2"), Intent::Ping).await));
        assert_eq!(ledger.broadcast_count(), 2);
    }

    #[tokio::test]
    async fn test_lost_reply_for_client_signed_tx() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());
        let client = LocalSigner::random();

        let prepared = prepare_deposit(&lifecycle, client.address(), 2_000, "d").await;
        let raw = sign(&client, &prepared, CHAIN_ID).await;
        ledger.drop_next_ack.store(true, Ordering::SeqCst);

        let err = lifecycle.submit_signed(raw.clone()).await.unwrap_err();
        let BridgeError::TimedOut(tx_hash) = err else {
            panic!("expected TimedOut, got {:?}", err);
        };
        assert_eq!(lifecycle.status(tx_hash).await.unwrap().status, TxStatus::Confirmed);

        let outcome = lifecycle.submit_signed(raw).await.unwrap();
        assert_eq!(outcome.tx_hash, tx_hash);
        assert_eq!(ledger.broadcast_count(), 1);
        assert_eq!(ledger.balance(), U256::from(2_000u64));
    }

    #[tokio::test]
    async fn test_signed_tx_for_other_chain() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());
        let client = LocalSigner::random();

        let prepared = prepare_deposit(&lifecycle, client.address(), 1_000, "d").await;
        let raw = sign(&client, &prepared, 1).await;

        let err = lifecycle.submit_signed(raw).await.unwrap_err();
        assert!(matches!(err, BridgeError::ChainMismatch { expected: CHAIN_ID, actual: Some(1) }));
        assert_eq!(ledger.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_signed_tx_must_match_descriptor() {
        let (ledger, _, lifecycle) = setup(MockLedger::new(), fast());
        let client = LocalSigner::random();

        let mut prepared = prepare_deposit(&lifecycle, client.address(), 1_000, "d").await;
        prepared.value = U256::from(999u64);
        let raw = sign(&client, &prepared, CHAIN_ID).await;

        let err = lifecycle.submit_signed(raw).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
        assert_eq!(ledger.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_deposit_needs_sender() {
        let (_, _, lifecycle) = setup(MockLedger::new(), fast());
        let err = lifecycle
            .dispatch(None, None, Intent::Deposit(U256::from(1u64)))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_unknown_hash_is_not_found() {
        let (_, _, lifecycle) = setup(MockLedger::new(), fast());
        let err = lifecycle.status(TxHash::repeat_byte(7)).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_prune_evicts_resolved_records() {
        let config = LifecycleConfig {
            result_retention: Duration::ZERO,
            ..fast()
        };
        let (_, _, lifecycle) = setup(MockLedger::new(), config);

        let outcome = resolved(lifecycle.dispatch(None, None, Intent::Ping).await).unwrap();
        assert_eq!(lifecycle.prune().await, 1);
        let err = lifecycle.status(outcome.tx_hash).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }
}
