//! Per-intent lifecycle record

use crate::error::BridgeError;
use crate::types::{
    EncodedCall, IntentKey, IntentKind, PreparedTransaction, SignerMode, SubmittedTransaction,
    TxStatus,
};
use alloy::primitives::{Address, TxHash};
use std::time::{Duration, Instant};

/// Lifecycle state of one intent
///
/// `Validated -> Prepared (client only) -> Submitted -> Confirmed | Reverted | TimedOut | Rejected`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentState {
    Validated,
    Prepared,
    Submitted,
    Confirmed,
    Reverted,
    /// Still pending on-chain; resolvable by a later status check
    TimedOut,
    Rejected,
}

impl IntentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Prepared => "prepared",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Reverted => "reverted",
            Self::TimedOut => "timed_out",
            Self::Rejected => "rejected",
        }
    }

    /// A broadcast transaction whose receipt has not been seen yet
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Submitted | Self::TimedOut)
    }
}

/// Confirmed result handed back to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: TxHash,
    pub intent: IntentKind,
    pub state: IntentState,
}

/// Status view of a broadcast transaction
#[derive(Debug, Clone)]
pub struct TxView {
    pub tx_hash: TxHash,
    pub intent: IntentKind,
    pub state: IntentState,
    pub status: TxStatus,
    pub submitted_at: Option<u64>,
    pub confirmed_at: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IntentRecord {
    pub key: IntentKey,
    pub mode: SignerMode,
    pub call: EncodedCall,
    /// Account that signs the transaction
    pub from: Address,
    pub state: IntentState,
    pub prepared: Option<PreparedTransaction>,
    pub prepared_at: Option<Instant>,
    pub tx: Option<SubmittedTransaction>,
    /// Revert reason or rejection detail
    pub reason: Option<String>,
    pub updated_at: Instant,
}

impl IntentRecord {
    fn new(key: IntentKey, mode: SignerMode, call: EncodedCall, from: Address) -> Self {
        Self {
            key,
            mode,
            call,
            from,
            state: IntentState::Validated,
            prepared: None,
            prepared_at: None,
            tx: None,
            reason: None,
            updated_at: Instant::now(),
        }
    }

    /// Client-signed intent awaiting a signature
    pub fn prepared(
        key: IntentKey,
        call: EncodedCall,
        from: Address,
        prepared: PreparedTransaction,
    ) -> Self {
        let mut record = Self::new(key, SignerMode::Client, call, from);
        record.state = IntentState::Prepared;
        record.prepared = Some(prepared);
        record.prepared_at = Some(record.updated_at);
        record
    }

    /// Server-signed intent whose broadcast succeeded
    pub fn submitted(key: IntentKey, call: EncodedCall, from: Address, tx: SubmittedTransaction) -> Self {
        let mut record = Self::new(key, SignerMode::Server, call, from);
        record.mark_submitted(tx);
        record
    }

    /// Server-signed intent refused by the node
    pub fn rejected(key: IntentKey, call: EncodedCall, from: Address, detail: String) -> Self {
        let mut record = Self::new(key, SignerMode::Server, call, from);
        record.mark_rejected(detail);
        record
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        self.tx.as_ref().map(|tx| tx.tx_hash)
    }

    /// Prepared descriptor has outlived its validity window
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.state == IntentState::Prepared
            && self
                .prepared_at
                .is_some_and(|at| now.saturating_duration_since(at) >= ttl)
    }

    /// Safe to drop from memory
    pub fn is_evictable(&self, now: Instant, prepared_ttl: Duration, retention: Duration) -> bool {
        let idle = now.saturating_duration_since(self.updated_at);
        match self.state {
            IntentState::Prepared => idle >= prepared_ttl + retention,
            _ => idle >= retention,
        }
    }

    pub fn mark_submitted(&mut self, tx: SubmittedTransaction) {
        self.state = IntentState::Submitted;
        self.tx = Some(tx);
        self.reason = None;
        self.updated_at = Instant::now();
    }

    pub fn mark_confirmed(&mut self, at: u64) {
        self.state = IntentState::Confirmed;
        if let Some(tx) = self.tx.as_mut() {
            tx.status = TxStatus::Confirmed;
            tx.confirmed_at = Some(at);
        }
        self.updated_at = Instant::now();
    }

    pub fn mark_reverted(&mut self, reason: String) {
        self.state = IntentState::Reverted;
        if let Some(tx) = self.tx.as_mut() {
            tx.status = TxStatus::Failed;
        }
        self.reason = Some(reason);
        self.updated_at = Instant::now();
    }

    pub fn mark_timed_out(&mut self) {
        self.state = IntentState::TimedOut;
        self.updated_at = Instant::now();
    }

    pub fn mark_rejected(&mut self, detail: String) {
        self.state = IntentState::Rejected;
        self.reason = Some(detail);
        self.updated_at = Instant::now();
    }

    /// Replay the resolved result for a duplicate request
    pub fn replay(&self) -> Result<TxOutcome, BridgeError> {
        let tx_hash = self
            .tx_hash()
            .ok_or_else(|| BridgeError::Internal(format!("intent {} has no transaction", self.key)))?;

        match self.state {
            IntentState::Confirmed => Ok(TxOutcome {
                tx_hash,
                intent: self.key.kind,
                state: self.state,
            }),
            IntentState::Reverted => Err(BridgeError::Reverted {
                tx_hash: Some(tx_hash),
                reason: self.reason.clone().unwrap_or_default(),
            }),
            _ => Err(BridgeError::TimedOut(tx_hash)),
        }
    }

    pub fn view(&self) -> Option<TxView> {
        let tx = self.tx.as_ref()?;
        Some(TxView {
            tx_hash: tx.tx_hash,
            intent: self.key.kind,
            state: self.state,
            status: tx.status,
            submitted_at: Some(tx.submitted_at),
            confirmed_at: tx.confirmed_at,
            reason: self.reason.clone(),
        })
    }
}
