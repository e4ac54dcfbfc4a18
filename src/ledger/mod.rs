//! Ledger client abstraction
//!
//! A thin seam over the remote node: read contract state, build calls,
//! broadcast raw transactions and wait for receipts. Every method that
//! touches the network is a suspension point.

mod rpc;

#[cfg(test)]
pub(crate) mod mock;

pub use rpc::RpcLedger;

use crate::error::LedgerError;
use crate::types::{ContractState, EncodedCall, PreparedTransaction};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use std::future::Future;
use std::time::Duration;

/// Gas limit and EIP-1559 fees for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasQuote {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Successful receipt summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Result of waiting for a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed(Receipt),
    /// Included but failed; `reason` is filled when the node returned it
    Reverted {
        block_number: Option<u64>,
        reason: Option<String>,
    },
    /// No receipt within the wait budget; the transaction may still land
    TimedOut,
}

/// Remote ledger operations
pub trait LedgerClient: Send + Sync + 'static {
    /// Chain id of the connected network
    fn chain_id(&self) -> u64;

    /// Address of the Will contract
    fn contract(&self) -> Address;

    /// Read `owner`, `recipient`, `startTime` and `pingedLast`
    fn read_state(&self) -> impl Future<Output = Result<ContractState, LedgerError>> + Send;

    /// Build an unsigned descriptor for an external signer. Pure.
    fn build_call(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
        nonce: u64,
    ) -> Result<PreparedTransaction, LedgerError> {
        if data.is_empty() {
            return Err(LedgerError::Encoding("empty calldata".to_string()));
        }
        Ok(PreparedTransaction {
            to,
            value,
            data,
            chain_id: self.chain_id(),
            nonce,
            prepare_id: 0,
            expires_at: 0,
        })
    }

    /// Next nonce for `account`, counting pending transactions
    fn pending_nonce(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Estimate gas and fees; a call that would revert fails with `Reverted`
    fn estimate_gas(
        &self,
        from: Address,
        call: &EncodedCall,
    ) -> impl Future<Output = Result<GasQuote, LedgerError>> + Send;

    /// Replay a call (optionally at a block) to surface its revert reason
    fn simulate(
        &self,
        from: Address,
        call: &EncodedCall,
        block: Option<u64>,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Broadcast raw signed bytes. Not retried.
    fn broadcast(&self, raw: Bytes) -> impl Future<Output = Result<TxHash, LedgerError>> + Send;

    /// Poll for a receipt until it arrives or `timeout` elapses.
    ///
    /// A zero timeout checks exactly once.
    fn await_confirmation(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> impl Future<Output = Result<Confirmation, LedgerError>> + Send;
}
