//! Short-lived read cache of contract state
//!
//! Pull-based and lazy: a read older than the freshness window triggers a
//! synchronous ledger read. Concurrent misses share one read because the
//! slot lock is held across it.

use crate::error::LedgerError;
use crate::ledger::LedgerClient;
use crate::types::ContractState;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct StateCache<L: LedgerClient> {
    ledger: Arc<L>,
    freshness: Duration,
    slot: Mutex<Option<(ContractState, Instant)>>,
}

impl<L: LedgerClient> StateCache<L> {
    pub fn new(ledger: Arc<L>, freshness: Duration) -> Self {
        Self {
            ledger,
            freshness,
            slot: Mutex::new(None),
        }
    }

    /// Last read if still fresh, otherwise a new read from the ledger
    pub async fn get(&self) -> Result<ContractState, LedgerError> {
        let mut slot = self.slot.lock().await;
        if let Some((state, read_at)) = *slot {
            if read_at.elapsed() < self.freshness {
                return Ok(state);
            }
        }

        let state = self.ledger.read_state().await?;
        tracing::debug!(
            "Refreshed contract state: recipient={} pingedLast={}",
            state.recipient,
            state.pinged_last
        );
        *slot = Some((state, Instant::now()));
        Ok(state)
    }

    /// Force the next `get` to hit the ledger
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}
