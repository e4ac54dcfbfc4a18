//! Scripted in-memory ledger for tests
//!
//! Applies Will semantics to the raw transactions it receives so that the
//! whole prepare/sign/broadcast/confirm pipeline runs without a node.

use super::{Confirmation, GasQuote, LedgerClient, Receipt};
use crate::error::LedgerError;
use crate::types::{ContractState, EncodedCall, SignedTransaction};
use alloy::primitives::{address, Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::contracts::IWill;

pub const WILL: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
pub const OWNER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const CHAIN_ID: u64 = 31337;

/// Liveness window enforced by `claim`
pub const LIVENESS_WINDOW: u64 = 3600;

pub struct MockLedger {
    state: Mutex<ContractState>,
    balance: Mutex<U256>,
    nonces: Mutex<HashMap<Address, u64>>,
    pending: Mutex<HashMap<TxHash, SignedTransaction>>,
    outcomes: Mutex<HashMap<TxHash, Confirmation>>,
    pub reads: AtomicUsize,
    pub broadcasts: AtomicUsize,
    /// Delay before a receipt becomes available
    pub confirmation_delay: Mutex<Duration>,
    /// Never produce receipts
    pub withhold_receipts: AtomicBool,
    /// Refuse the next broadcast
    pub reject_next: AtomicBool,
    /// Fail gas estimation for calls that would revert
    pub preflight_reverts: AtomicBool,
    /// Fail every call as unreachable
    pub offline: AtomicBool,
    /// Accept the next broadcast but lose the node's reply
    pub drop_next_ack: AtomicBool,
    /// Block of the last `simulate` call
    pub simulated_at: Mutex<Option<Option<u64>>>,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl MockLedger {
    pub fn new() -> Self {
        let now = now();
        Self {
            state: Mutex::new(ContractState {
                owner: OWNER,
                recipient: Address::ZERO,
                start_time: now,
                pinged_last: now,
            }),
            balance: Mutex::new(U256::ZERO),
            nonces: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
            broadcasts: AtomicUsize::new(0),
            confirmation_delay: Mutex::new(Duration::ZERO),
            withhold_receipts: AtomicBool::new(false),
            reject_next: AtomicBool::new(false),
            preflight_reverts: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            drop_next_ack: AtomicBool::new(false),
            simulated_at: Mutex::new(None),
        }
    }

    pub fn with_confirmation_delay(self, delay: Duration) -> Self {
        *self.confirmation_delay.lock().unwrap() = delay;
        self
    }

    pub fn state(&self) -> ContractState {
        *self.state.lock().unwrap()
    }

    pub fn balance(&self) -> U256 {
        *self.balance.lock().unwrap()
    }

    /// Move `pingedLast` into the past so the liveness window has lapsed
    pub fn lapse_liveness(&self) {
        let mut state = self.state.lock().unwrap();
        state.pinged_last = state.pinged_last.saturating_sub(LIVENESS_WINDOW + 1);
        state.start_time = state.start_time.min(state.pinged_last);
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unreachable("connection refused".to_string()));
        }
        Ok(())
    }

    /// Revert reason the contract would produce for `data`, if any
    fn revert_reason(&self, data: &[u8]) -> Option<String> {
        let state = self.state();
        if data.starts_with(&IWill::claimCall::SELECTOR) {
            if now() < state.pinged_last + LIVENESS_WINDOW {
                return Some("Too early to claim".to_string());
            }
            if !state.has_recipient() {
                return Some("No recipient".to_string());
            }
        }
        None
    }

    fn apply(&self, tx: &SignedTransaction) -> Confirmation {
        if let Some(reason) = self.revert_reason(&tx.data) {
            tracing::debug!("mock revert: {}", reason);
            return Confirmation::Reverted {
                block_number: Some(1),
                reason: None,
            };
        }

        let mut state = self.state.lock().unwrap();
        let data = tx.data.as_ref();
        if let Ok(call) = IWill::setRecipientCall::abi_decode(data) {
            state.recipient = call._recipient;
        } else if let Ok(call) = IWill::changeRecipientCall::abi_decode(data) {
            state.recipient = call.newRecipient;
        } else if data.starts_with(&IWill::pingCall::SELECTOR) {
            state.pinged_last = now().max(state.pinged_last);
        } else if data.starts_with(&IWill::depositCall::SELECTOR) {
            *self.balance.lock().unwrap() += tx.value;
        } else if data.starts_with(&IWill::claimCall::SELECTOR) {
            *self.balance.lock().unwrap() = U256::ZERO;
        }

        Confirmation::Confirmed(Receipt {
            block_number: Some(1),
            gas_used: 21_000,
        })
    }
}

impl LedgerClient for MockLedger {
    fn chain_id(&self) -> u64 {
        CHAIN_ID
    }

    fn contract(&self) -> Address {
        WILL
    }

    async fn read_state(&self) -> Result<ContractState, LedgerError> {
        self.check_online()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state())
    }

    async fn pending_nonce(&self, account: Address) -> Result<u64, LedgerError> {
        self.check_online()?;
        Ok(*self.nonces.lock().unwrap().get(&account).unwrap_or(&0))
    }

    async fn estimate_gas(&self, _from: Address, call: &EncodedCall) -> Result<GasQuote, LedgerError> {
        self.check_online()?;
        if self.preflight_reverts.load(Ordering::SeqCst) {
            if let Some(reason) = self.revert_reason(&call.data) {
                return Err(LedgerError::Reverted(reason));
            }
        }
        Ok(GasQuote {
            gas_limit: 60_000,
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        })
    }

    async fn simulate(
        &self,
        _from: Address,
        call: &EncodedCall,
        block: Option<u64>,
    ) -> Result<(), LedgerError> {
        self.check_online()?;
        *self.simulated_at.lock().unwrap() = Some(block);
        match self.revert_reason(&call.data) {
            Some(reason) => Err(LedgerError::Reverted(reason)),
            None => Ok(()),
        }
    }

    async fn broadcast(&self, raw: Bytes) -> Result<TxHash, LedgerError> {
        self.check_online()?;
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Rejected("nonce too low".to_string()));
        }

        let tx = SignedTransaction::decode(raw)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let mut nonces = self.nonces.lock().unwrap();
        let expected = nonces.entry(tx.from).or_insert(0);
        if tx.nonce != *expected {
            return Err(LedgerError::Rejected(format!(
                "nonce mismatch: expected {}, got {}",
                expected, tx.nonce
            )));
        }
        *expected += 1;
        drop(nonces);

        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        let hash = tx.hash;
        self.pending.lock().unwrap().insert(hash, tx);
        if self.drop_next_ack.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Unreachable("connection reset".to_string()));
        }
        Ok(hash)
    }

    async fn await_confirmation(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<Confirmation, LedgerError> {
        if let Some(done) = self.outcomes.lock().unwrap().get(&tx_hash) {
            return Ok(done.clone());
        }

        let delay = *self.confirmation_delay.lock().unwrap();
        if self.withhold_receipts.load(Ordering::SeqCst) || delay > timeout {
            tokio::time::sleep(timeout).await;
            return Ok(Confirmation::TimedOut);
        }
        tokio::time::sleep(delay).await;

        let Some(tx) = self.pending.lock().unwrap().remove(&tx_hash) else {
            return Ok(Confirmation::TimedOut);
        };
        let outcome = self.apply(&tx);
        self.outcomes.lock().unwrap().insert(tx_hash, outcome.clone());
        Ok(outcome)
    }
}
