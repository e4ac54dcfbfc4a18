//! Transaction descriptors: encoded calls, prepared (unsigned), signed and submitted

use crate::error::BridgeError;
use crate::types::IntentKey;
use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, Bytes, TxHash, U256};

/// Exact call payload required by the contract ABI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCall {
    pub to: Address,
    /// Wei attached to the call
    pub value: U256,
    pub data: Bytes,
}

/// Unsigned transaction handed to a caller for external signing
///
/// Never submitted by the server itself. Valid until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: u64,
    /// Sender's pending account nonce when prepared
    pub nonce: u64,
    /// Per-process sequence number distinguishing fresh descriptors
    pub prepare_id: u64,
    /// Unix timestamp (seconds) after which the descriptor is refused
    pub expires_at: u64,
}

impl PreparedTransaction {
    /// Whether a signed transaction carries exactly this descriptor's call
    pub fn matches(&self, signed: &SignedTransaction) -> bool {
        signed.to == Some(self.to)
            && signed.value == self.value
            && signed.data == self.data
            && signed.nonce == self.nonce
            && signed.chain_id == Some(self.chain_id)
    }
}

/// A decoded, signer-recovered raw transaction
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub nonce: u64,
    pub chain_id: Option<u64>,
}

impl SignedTransaction {
    /// Decode an EIP-2718 envelope (legacy or typed) and recover its signer
    pub fn decode(raw: Bytes) -> Result<Self, BridgeError> {
        let mut buf: &[u8] = raw.as_ref();
        let envelope = TxEnvelope::decode_2718(&mut buf).map_err(|e| {
            BridgeError::InvalidRequest(format!("malformed signed transaction: {}", e))
        })?;

        let from = envelope.recover_signer().map_err(|e| {
            BridgeError::InvalidRequest(format!("cannot recover transaction signer: {}", e))
        })?;

        Ok(Self {
            hash: *envelope.tx_hash(),
            from,
            to: envelope.to(),
            value: envelope.value(),
            data: envelope.input().clone(),
            nonce: envelope.nonce(),
            chain_id: envelope.chain_id(),
            raw,
        })
    }
}

/// Confirmation status of a broadcast transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

/// A transaction the bridge has broadcast
#[derive(Debug, Clone)]
pub struct SubmittedTransaction {
    pub tx_hash: TxHash,
    pub intent_key: IntentKey,
    pub status: TxStatus,
    /// Unix seconds
    pub submitted_at: u64,
    /// Unix seconds
    pub confirmed_at: Option<u64>,
}

impl SubmittedTransaction {
    pub fn new(tx_hash: TxHash, intent_key: IntentKey, submitted_at: u64) -> Self {
        Self {
            tx_hash,
            intent_key,
            status: TxStatus::Pending,
            submitted_at,
            confirmed_at: None,
        }
    }
}
