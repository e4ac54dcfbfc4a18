//! Core data model shared by every component

pub mod intent;
pub mod state;
pub mod transaction;

pub use intent::{Intent, IntentKey, IntentKind, SignerMode};
pub use state::ContractState;
pub use transaction::{
    EncodedCall, PreparedTransaction, SignedTransaction, SubmittedTransaction, TxStatus,
};
