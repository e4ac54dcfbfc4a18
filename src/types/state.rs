//! Snapshot of the Will's on-chain fields

use alloy::primitives::Address;

/// Contract state as read from the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractState {
    /// Set at deployment
    pub owner: Address,
    /// Zero address means "unset"
    pub recipient: Address,
    /// Unix timestamp of deployment
    pub start_time: u64,
    /// Unix timestamp of the last successful ping
    pub pinged_last: u64,
}

impl ContractState {
    /// Whether a recipient has been designated
    pub fn has_recipient(&self) -> bool {
        self.recipient != Address::ZERO
    }

    /// Seconds since the owner last proved liveness
    pub fn seconds_since_ping(&self, now: u64) -> u64 {
        now.saturating_sub(self.pinged_last)
    }

    /// `pingedLast` can never precede `startTime`
    pub fn is_consistent(&self) -> bool {
        self.pinged_last >= self.start_time
    }
}
