//! Error types for the Will bridge
//!
//! Setup paths (config, key parsing, nonce files) use `eyre` for ergonomic
//! context. Request paths use the typed taxonomy below so every failure that
//! reaches a caller carries a machine-readable kind.

use alloy::primitives::TxHash;
use serde::Serialize;
use thiserror::Error;

pub use eyre::{eyre, Context, Report, Result};

/// Errors raised by a [`LedgerClient`](crate::ledger::LedgerClient).
///
/// These never cross the lifecycle boundary directly; they are translated
/// into [`BridgeError`] first.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// Transport-level failure talking to the node
    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    /// Node is syncing and too far behind the chain head
    #[error("ledger node is {behind} blocks behind (tolerance {tolerance})")]
    Stale { behind: u64, tolerance: u64 },

    /// Node refused the transaction (signature, nonce, funds)
    #[error("rejected by node: {0}")]
    Rejected(String),

    /// Call executed and the contract rejected it
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// Inputs could not be encoded or decoded
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Machine-readable error kind returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ValidationError,
    EncodingError,
    LedgerUnreachable,
    LedgerStale,
    RejectedByNode,
    Reverted,
    TimedOut,
    Expired,
    Conflict,
    NotFound,
    Internal,
}

/// Errors surfaced by the bridge to its callers.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed request that is not an address or amount problem
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Signed transaction targets another network
    #[error("chain id mismatch: expected {expected}, got {actual:?}")]
    ChainMismatch { expected: u64, actual: Option<u64> },

    /// Prepared transaction outlived its validity window
    #[error("prepared transaction expired: {0}")]
    Expired(String),

    /// Idempotency key already resolved or in flight for another phase
    #[error("intent already submitted as {tx_hash}")]
    AlreadySubmitted { tx_hash: TxHash },

    #[error("transaction not found: {0}")]
    NotFound(TxHash),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("ledger unreachable: {0}")]
    LedgerUnreachable(String),

    #[error("ledger node is {behind} blocks behind (tolerance {tolerance})")]
    LedgerStale { behind: u64, tolerance: u64 },

    #[error("rejected by node: {0}")]
    RejectedByNode(String),

    #[error("transaction reverted: {reason}")]
    Reverted {
        tx_hash: Option<TxHash>,
        reason: String,
    },

    /// No receipt within the wait budget; outcome unknown
    #[error("no receipt for {0} within the wait budget")]
    TimedOut(TxHash),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Machine-readable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress(_)
            | Self::InvalidAmount(_)
            | Self::InvalidRequest(_)
            | Self::ChainMismatch { .. } => ErrorKind::ValidationError,
            Self::Expired(_) => ErrorKind::Expired,
            Self::AlreadySubmitted { .. } => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Encoding(_) => ErrorKind::EncodingError,
            Self::LedgerUnreachable(_) => ErrorKind::LedgerUnreachable,
            Self::LedgerStale { .. } => ErrorKind::LedgerStale,
            Self::RejectedByNode(_) => ErrorKind::RejectedByNode,
            Self::Reverted { .. } => ErrorKind::Reverted,
            Self::TimedOut(_) => ErrorKind::TimedOut,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Transaction hash associated with the failure, if one was broadcast
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::AlreadySubmitted { tx_hash } => Some(*tx_hash),
            Self::Reverted { tx_hash, .. } => *tx_hash,
            Self::TimedOut(hash) | Self::NotFound(hash) => Some(*hash),
            _ => None,
        }
    }

    /// On-chain revert reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Reverted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<LedgerError> for BridgeError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Unreachable(msg) => Self::LedgerUnreachable(msg),
            LedgerError::Stale { behind, tolerance } => Self::LedgerStale { behind, tolerance },
            LedgerError::Rejected(msg) => Self::RejectedByNode(msg),
            LedgerError::Reverted(reason) => Self::Reverted {
                tx_hash: None,
                reason,
            },
            LedgerError::Encoding(msg) => Self::Encoding(msg),
        }
    }
}
