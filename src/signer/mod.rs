//! Transaction signer abstraction for the server-held key
//!
//! Signing is split from broadcasting: the lifecycle manager assigns nonces
//! itself and hands the raw bytes to the ledger, so a signer only turns a
//! fully specified request into a signed EIP-2718 envelope.

mod local;

pub use local::LocalSigner;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use eyre::Result;

/// Fully specified EIP-1559 transaction request
#[derive(Debug, Clone)]
pub struct TxRequest {
    /// Target contract address
    pub to: Address,
    /// Transaction value in wei
    pub value: U256,
    /// Encoded calldata
    pub data: Bytes,
    pub nonce: u64,
    pub chain_id: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl TxRequest {
    /// Create a new transaction request with zero value and no gas set
    pub fn new(to: Address, data: impl Into<Bytes>, chain_id: u64) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: data.into(),
            nonce: 0,
            chain_id,
            gas_limit: 0,
            max_fee_per_gas: 0,
            max_priority_fee_per_gas: 0,
        }
    }

    /// Set transaction value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set the account nonce
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Set gas limit and EIP-1559 fees
    pub fn with_gas(mut self, gas_limit: u64, max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        self.gas_limit = gas_limit;
        self.max_fee_per_gas = max_fee_per_gas;
        self.max_priority_fee_per_gas = max_priority_fee_per_gas;
        self
    }
}

/// Raw signed transaction ready for broadcast
#[derive(Debug, Clone)]
pub struct SignedRawTx {
    pub raw: Bytes,
    pub hash: TxHash,
}

/// Trait for signing EVM transactions with a key held by the service
pub trait TransactionSigner: Send + Sync {
    /// Returns the signer's EVM address
    fn address(&self) -> Address;

    /// Signs a fully specified transaction
    fn sign_transaction(
        &self,
        tx: TxRequest,
    ) -> impl std::future::Future<Output = Result<SignedRawTx>> + Send;
}
