//! Network and service configuration for the Will bridge

use crate::constants::*;
use alloy::primitives::Address;
use eyre::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Network configuration: which node, which chain, which contract
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Chain ID checked against every client-signed submission
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Deployed Will contract
    pub contract: Address,
}

impl NetworkConfig {
    /// Local Anvil configuration for a given contract
    pub fn local(contract: Address) -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            contract,
        }
    }

    /// Create custom configuration with specific RPC URL
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = rpc_url.into();
        self
    }

    /// Set the chain id
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub network: NetworkConfig,
    /// HTTP listen port
    pub port: u16,
    /// Freshness window of the contract state cache
    pub state_cache_ttl: Duration,
    /// Validity window of a prepared (unsigned) transaction
    pub prepared_ttl: Duration,
    /// Wait budget for a receipt before reporting `TimedOut`
    pub confirmation_timeout: Duration,
    /// Receipt polling interval
    pub poll_interval: Duration,
    /// Blocks a syncing node may lag before reads fail with `LedgerStale`
    pub max_block_lag: u64,
    /// How long resolved intents are kept for idempotent replays
    pub result_retention: Duration,
    /// Server nonce high-watermark file
    pub nonce_store_path: PathBuf,
}

impl BridgeConfig {
    /// Defaults for everything but the network
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            network,
            port: DEFAULT_PORT,
            state_cache_ttl: Duration::from_millis(DEFAULT_STATE_CACHE_TTL_MS),
            prepared_ttl: Duration::from_secs(DEFAULT_PREPARED_TTL_SECS),
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_block_lag: DEFAULT_MAX_BLOCK_LAG,
            result_retention: Duration::from_secs(DEFAULT_RESULT_RETENTION_SECS),
            nonce_store_path: PathBuf::from(DEFAULT_NONCE_STORE_PATH),
        }
    }

    /// Load from environment variables (and `.env` when present)
    ///
    /// `CONTRACT_ADDRESS` is required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let contract: Address = std::env::var("CONTRACT_ADDRESS")
            .context("CONTRACT_ADDRESS environment variable must be set")?
            .parse()
            .context("CONTRACT_ADDRESS is not a valid address")?;

        let network = NetworkConfig {
            chain_id: env_or("CHAIN_ID", DEFAULT_CHAIN_ID)?,
            rpc_url: std::env::var("RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string()),
            contract,
        };

        Ok(Self {
            network,
            port: env_or("PORT", DEFAULT_PORT)?,
            state_cache_ttl: Duration::from_millis(env_or(
                "STATE_CACHE_TTL_MS",
                DEFAULT_STATE_CACHE_TTL_MS,
            )?),
            prepared_ttl: Duration::from_secs(env_or("PREPARED_TTL_SECS", DEFAULT_PREPARED_TTL_SECS)?),
            confirmation_timeout: Duration::from_secs(env_or(
                "CONFIRMATION_TIMEOUT_SECS",
                DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            )?),
            poll_interval: Duration::from_millis(env_or("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?),
            max_block_lag: env_or("MAX_BLOCK_LAG", DEFAULT_MAX_BLOCK_LAG)?,
            result_retention: Duration::from_secs(env_or(
                "RESULT_RETENTION_SECS",
                DEFAULT_RESULT_RETENTION_SECS,
            )?),
            nonce_store_path: std::env::var("NONCE_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_NONCE_STORE_PATH)),
        })
    }

    /// Set the HTTP port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the state cache freshness window
    pub fn with_state_cache_ttl(mut self, ttl: Duration) -> Self {
        self.state_cache_ttl = ttl;
        self
    }

    /// Set the prepared transaction validity window
    pub fn with_prepared_ttl(mut self, ttl: Duration) -> Self {
        self.prepared_ttl = ttl;
        self
    }

    /// Set the receipt wait budget
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Set the receipt polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the retention grace period for resolved intents
    pub fn with_result_retention(mut self, retention: Duration) -> Self {
        self.result_retention = retention;
        self
    }

    /// Set the nonce store location
    pub fn with_nonce_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.nonce_store_path = path.into();
        self
    }
}

/// Read and parse an env var, falling back to `default` when unset
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::new(NetworkConfig::local(Address::ZERO));
        assert_eq!(config.network.chain_id, 31337);
        assert_eq!(config.port, 3000);
        assert_eq!(config.prepared_ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_builders() {
        let config = BridgeConfig::new(
            NetworkConfig::local(Address::ZERO)
                .with_rpc_url("http://node:8545")
                .with_chain_id(1),
        )
        .with_port(8080)
        .with_prepared_ttl(Duration::from_secs(5));

        assert_eq!(config.network.rpc_url, "http://node:8545");
        assert_eq!(config.network.chain_id, 1);
        assert_eq!(config.port, 8080);
        assert_eq!(config.prepared_ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_env_or_parses_and_defaults() {
        std::env::set_var("WILL_BRIDGE_TEST_LAG", "42");
        assert_eq!(env_or("WILL_BRIDGE_TEST_LAG", 1u64).unwrap(), 42);
        assert_eq!(env_or("WILL_BRIDGE_TEST_UNSET", 7u64).unwrap(), 7);

        std::env::set_var("WILL_BRIDGE_TEST_BAD", "nope");
        assert!(env_or("WILL_BRIDGE_TEST_BAD", 1u64).is_err());
    }
}
