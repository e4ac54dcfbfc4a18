//! Constants and precision helpers for the Will bridge

use alloy::primitives::U256;

/// Native ETH has 18 decimals
pub const ETH_DECIMALS: u8 = 18;

/// Local Anvil chain id
pub const DEFAULT_CHAIN_ID: u64 = 31337;

/// Default local node endpoint
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// How long a contract state read is served from cache
pub const DEFAULT_STATE_CACHE_TTL_MS: u64 = 3_000;

/// How long a prepared (unsigned) transaction stays valid
pub const DEFAULT_PREPARED_TTL_SECS: u64 = 10 * 60;

/// Wait budget for a receipt (60 polls * 2 seconds)
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// Receipt polling interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Blocks a syncing node may lag before reads are refused
pub const DEFAULT_MAX_BLOCK_LAG: u64 = 16;

/// Resolved intents are kept this long for idempotent replays
pub const DEFAULT_RESULT_RETENTION_SECS: u64 = 60 * 60;

/// Default location of the server nonce high-watermark
pub const DEFAULT_NONCE_STORE_PATH: &str = "data/nonces.json";

/// Parse a plain decimal string into its smallest unit with no rounding.
///
/// Returns `None` for empty, signed, exponent-notation or non-numeric input,
/// and when the fractional part has more than `decimals` digits (the value
/// would lose precision).
pub fn parse_units_exact(value: &str, decimals: u8) -> Option<U256> {
    let value = value.trim();
    let (int_part, frac_part) = match value.split_once('.') {
        Some((i, f)) => (i, f),
        None => (value, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if frac_part.len() > decimals as usize {
        return None;
    }

    let mut digits = String::with_capacity(int_part.len() + decimals as usize);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    for _ in frac_part.len()..decimals as usize {
        digits.push('0');
    }

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).ok()
}

/// Parse an ETH amount into wei
pub fn parse_ether_exact(value: &str) -> Option<U256> {
    parse_units_exact(value, ETH_DECIMALS)
}
