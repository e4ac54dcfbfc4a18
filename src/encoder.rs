//! Intent validation and ABI encoding
//!
//! Turns a logical [`Intent`] into the exact call payload the Will contract
//! expects. Encoding is deterministic and side-effect free; preconditions that
//! only the contract can judge (e.g. claiming too early) are left to the
//! ledger.

use crate::constants::parse_ether_exact;
use crate::contracts::IWill;
use crate::error::BridgeError;
use crate::types::{EncodedCall, Intent};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;

/// Encodes intents against a single deployed contract
#[derive(Debug, Clone, Copy)]
pub struct ActionEncoder {
    contract: Address,
}

impl ActionEncoder {
    pub fn new(contract: Address) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Validate preconditions and encode the call
    pub fn encode(&self, intent: &Intent) -> Result<EncodedCall, BridgeError> {
        let (data, value) = match intent {
            Intent::SetRecipient(recipient) => {
                ensure_recipient(recipient)?;
                let call = IWill::setRecipientCall {
                    _recipient: *recipient,
                };
                (call.abi_encode(), U256::ZERO)
            }
            Intent::ChangeRecipient(recipient) => {
                ensure_recipient(recipient)?;
                let call = IWill::changeRecipientCall {
                    newRecipient: *recipient,
                };
                (call.abi_encode(), U256::ZERO)
            }
            Intent::Deposit(amount) => {
                if amount.is_zero() {
                    return Err(BridgeError::InvalidAmount("amount must be positive".to_string()));
                }
                (IWill::depositCall {}.abi_encode(), *amount)
            }
            Intent::Ping => (IWill::pingCall {}.abi_encode(), U256::ZERO),
            Intent::Claim => (IWill::claimCall {}.abi_encode(), U256::ZERO),
            Intent::TriggerReminder => (IWill::triggerReminderCall {}.abi_encode(), U256::ZERO),
        };

        Ok(EncodedCall {
            to: self.contract,
            value,
            data: Bytes::from(data),
        })
    }
}

fn ensure_recipient(recipient: &Address) -> Result<(), BridgeError> {
    if *recipient == Address::ZERO {
        return Err(BridgeError::InvalidAddress(
            "recipient must not be the zero address".to_string(),
        ));
    }
    Ok(())
}

/// Parse a `0x`-prefixed 20-byte hex address.
///
/// Mixed-case input must carry a valid EIP-55 checksum; all-lowercase or
/// all-uppercase input is accepted as is.
pub fn parse_address(raw: &str) -> Result<Address, BridgeError> {
    let raw = raw.trim();
    let invalid = || BridgeError::InvalidAddress(raw.to_string());

    let hex = raw.strip_prefix("0x").ok_or_else(invalid)?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let has_lower = hex.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(raw, None).map_err(|_| invalid())
    } else {
        raw.parse().map_err(|_| invalid())
    }
}

/// Parse a recipient: a well-formed, non-zero address
pub fn parse_recipient(raw: &str) -> Result<Address, BridgeError> {
    let address = parse_address(raw)?;
    ensure_recipient(&address)?;
    Ok(address)
}

/// Parse a positive decimal ETH amount into wei without losing precision
pub fn parse_deposit_amount(raw: &str) -> Result<U256, BridgeError> {
    let wei = parse_ether_exact(raw).ok_or_else(|| {
        BridgeError::InvalidAmount(format!(
            "{:?} is not a decimal ETH amount with at most 18 fractional digits",
            raw
        ))
    })?;
    if wei.is_zero() {
        return Err(BridgeError::InvalidAmount("amount must be positive".to_string()));
    }
    Ok(wei)
}
