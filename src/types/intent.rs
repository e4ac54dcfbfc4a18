//! Intents: logical requests to mutate contract state

use alloy::primitives::{Address, U256};
use std::fmt;

/// Who authorizes the transaction for an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignerMode {
    /// The service signs with its held key and broadcasts
    Server,
    /// The service prepares an unsigned transaction; the caller signs it
    Client,
}

/// Intent discriminant, used in idempotency keys and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    SetRecipient,
    ChangeRecipient,
    Ping,
    Deposit,
    Claim,
    TriggerReminder,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetRecipient => "set-recipient",
            Self::ChangeRecipient => "change-recipient",
            Self::Ping => "ping",
            Self::Deposit => "deposit",
            Self::Claim => "claim",
            Self::TriggerReminder => "trigger-reminder",
        }
    }

    /// Deposit moves the caller's own funds, so only the caller can sign it
    pub fn signer_mode(&self) -> SignerMode {
        match self {
            Self::Deposit => SignerMode::Client,
            _ => SignerMode::Server,
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested state-mutating action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SetRecipient(Address),
    ChangeRecipient(Address),
    Ping,
    /// Amount in wei
    Deposit(U256),
    Claim,
    TriggerReminder,
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Self::SetRecipient(_) => IntentKind::SetRecipient,
            Self::ChangeRecipient(_) => IntentKind::ChangeRecipient,
            Self::Ping => IntentKind::Ping,
            Self::Deposit(_) => IntentKind::Deposit,
            Self::Claim => IntentKind::Claim,
            Self::TriggerReminder => IntentKind::TriggerReminder,
        }
    }

    pub fn signer_mode(&self) -> SignerMode {
        self.kind().signer_mode()
    }
}

/// Stable identifier preventing duplicate submission of one logical intent
///
/// `caller + kind + nonce`, where the nonce is caller-supplied or drawn from
/// a per-process counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntentKey {
    pub caller: Address,
    pub kind: IntentKind,
    pub nonce: String,
}

impl IntentKey {
    pub fn new(caller: Address, kind: IntentKind, nonce: impl Into<String>) -> Self {
        Self {
            caller,
            kind,
            nonce: nonce.into(),
        }
    }
}

impl fmt::Display for IntentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.caller, self.kind, self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_deposit_is_client_signed() {
        assert_eq!(Intent::Deposit(U256::from(1u64)).signer_mode(), SignerMode::Client);
        for intent in [
            Intent::SetRecipient(Address::ZERO),
            Intent::ChangeRecipient(Address::ZERO),
            Intent::Ping,
            Intent::Claim,
            Intent::TriggerReminder,
        ] {
            assert_eq!(intent.signer_mode(), SignerMode::Server, "{}", intent.kind());
        }
    }

    #[test]
    fn test_key_display() {
        let key = IntentKey::new(Address::ZERO, IntentKind::Ping, "abc");
        assert_eq!(
            key.to_string(),
            "0x0000000000000000000000000000000000000000:ping:abc"
        );
    }
}
