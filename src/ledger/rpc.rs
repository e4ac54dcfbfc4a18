//! JSON-RPC ledger client backed by an alloy provider

use super::{Confirmation, GasQuote, LedgerClient, Receipt};
use crate::config::NetworkConfig;
use crate::contracts::IWill;
use crate::error::LedgerError;
use crate::types::{ContractState, EncodedCall};
use alloy::eips::BlockId;
use alloy::network::{Ethereum, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{SyncStatus, TransactionRequest};
use alloy::sol_types::{decode_revert_reason, SolCall};
use alloy::transports::http::reqwest::Url;
use alloy::transports::TransportError;
use eyre::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Type alias for read-only provider
type ReadProvider = Arc<RootProvider<Ethereum>>;

/// Ledger client talking to an Ethereum JSON-RPC node
pub struct RpcLedger {
    provider: ReadProvider,
    chain_id: u64,
    contract: Address,
    poll_interval: Duration,
    max_block_lag: u64,
}

impl RpcLedger {
    /// Create a new RpcLedger
    pub fn new(network: &NetworkConfig, poll_interval: Duration, max_block_lag: u64) -> Result<Self> {
        let url: Url = network.rpc_url.parse().context("Invalid RPC URL")?;
        // No fillers: nonces, gas and signing are handled by the lifecycle manager
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .network::<Ethereum>()
            .connect_http(url);

        Ok(Self {
            provider: Arc::new(provider),
            chain_id: network.chain_id,
            contract: network.contract,
            poll_interval,
            max_block_lag,
        })
    }

    /// Fail if the node serves a different chain than configured
    pub async fn verify_chain_id(&self) -> Result<()> {
        let actual = self
            .provider
            .get_chain_id()
            .await
            .context("Failed to query chain id")?;
        eyre::ensure!(
            actual == self.chain_id,
            "Node reports chain id {} but {} is configured",
            actual,
            self.chain_id
        );
        Ok(())
    }

    fn call_request(&self, from: Address, call: &EncodedCall) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(from)
            .with_to(call.to)
            .with_value(call.value)
            .with_input(call.data.clone())
    }

    /// Read-only contract call
    async fn eth_call<C>(&self, call: C) -> Result<C::Return, LedgerError>
    where
        C: SolCall + Send + Sync,
    {
        let request = TransactionRequest::default()
            .with_to(self.contract)
            .with_input(call.abi_encode());

        let result: Bytes = self.provider.call(request).await.map_err(transport_error)?;

        C::abi_decode_returns(&result).map_err(|e| {
            LedgerError::Encoding(format!("failed to decode {}: {}", C::SIGNATURE, e))
        })
    }

    /// Refuse to serve reads from a node lagging the chain head
    async fn check_sync(&self) -> Result<(), LedgerError> {
        let status = self.provider.syncing().await.map_err(transport_error)?;

        match status {
            SyncStatus::Info(info) => check_lag(info.current_block, info.highest_block, self.max_block_lag),
            SyncStatus::None => Ok(()),
        }
    }
}

impl LedgerClient for RpcLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn contract(&self) -> Address {
        self.contract
    }

    async fn read_state(&self) -> Result<ContractState, LedgerError> {
        self.check_sync().await?;

        let (owner, recipient, start_time, pinged_last) = tokio::try_join!(
            self.eth_call(IWill::ownerCall {}),
            self.eth_call(IWill::recipientCall {}),
            self.eth_call(IWill::startTimeCall {}),
            self.eth_call(IWill::pingedLastCall {}),
        )?;

        Ok(ContractState {
            owner,
            recipient,
            start_time: timestamp(start_time)?,
            pinged_last: timestamp(pinged_last)?,
        })
    }

    async fn pending_nonce(&self, account: Address) -> Result<u64, LedgerError> {
        self.provider
            .get_transaction_count(account)
            .pending()
            .await
            .map_err(transport_error)
    }

    async fn estimate_gas(&self, from: Address, call: &EncodedCall) -> Result<GasQuote, LedgerError> {
        let gas = self
            .provider
            .estimate_gas(self.call_request(from, call))
            .await
            .map_err(execution_error)?;
        let fees = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(transport_error)?;

        Ok(GasQuote {
            // 20% headroom over the estimate
            gas_limit: gas.saturating_add(gas / 5),
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        })
    }

    async fn simulate(
        &self,
        from: Address,
        call: &EncodedCall,
        block: Option<u64>,
    ) -> Result<(), LedgerError> {
        let mut request = self.provider.call(self.call_request(from, call));
        if let Some(number) = block {
            request = request.block(BlockId::number(number));
        }
        request.await.map(|_| ()).map_err(execution_error)
    }

    async fn broadcast(&self, raw: Bytes) -> Result<TxHash, LedgerError> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| match e.as_error_resp() {
                Some(payload) => LedgerError::Rejected(payload.message.to_string()),
                None => LedgerError::Unreachable(e.to_string()),
            })?;

        Ok(*pending.tx_hash())
    }

    async fn await_confirmation(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<Confirmation, LedgerError> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    return Ok(if receipt.status() {
                        Confirmation::Confirmed(Receipt {
                            block_number: receipt.block_number,
                            gas_used: receipt.gas_used,
                        })
                    } else {
                        Confirmation::Reverted {
                            block_number: receipt.block_number,
                            reason: None,
                        }
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Receipt poll for {} failed: {}", tx_hash, e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Confirmation::TimedOut);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

fn transport_error(e: TransportError) -> LedgerError {
    LedgerError::Unreachable(e.to_string())
}

/// Classify an error from executing a call (estimate or replay)
fn execution_error(e: TransportError) -> LedgerError {
    let Some(payload) = e.as_error_resp() else {
        return LedgerError::Unreachable(e.to_string());
    };

    if let Some(data) = payload.as_revert_data() {
        let reason = decode_revert_reason(&data).unwrap_or_else(|| payload.message.to_string());
        return LedgerError::Reverted(reason);
    }

    let message = payload.message.to_string();
    if message.contains("revert") {
        let reason = message
            .strip_prefix("execution reverted: ")
            .unwrap_or(&message)
            .to_string();
        return LedgerError::Reverted(reason);
    }
    LedgerError::Rejected(message)
}

/// A node more than `tolerance` blocks behind the head it knows of is stale
fn check_lag(current: U256, highest: U256, tolerance: u64) -> Result<(), LedgerError> {
    let lag = highest.saturating_sub(current);
    if lag > U256::from(tolerance) {
        return Err(LedgerError::Stale {
            behind: u64::try_from(lag).unwrap_or(u64::MAX),
            tolerance,
        });
    }
    Ok(())
}

fn timestamp(value: U256) -> Result<u64, LedgerError> {
    u64::try_from(value).map_err(|_| LedgerError::Encoding(format!("timestamp out of range: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n: u64) -> U256 {
        U256::from(n)
    }

    #[test]
    fn test_lag_within_tolerance() {
        assert!(check_lag(block(100), block(100), 3).is_ok());
        assert!(check_lag(block(97), block(100), 3).is_ok());
        // a head behind the local block is not lag
        assert!(check_lag(block(105), block(100), 0).is_ok());
    }

    #[test]
    fn test_lag_beyond_tolerance() {
        let err = check_lag(block(96), block(100), 3).unwrap_err();
        assert!(matches!(err, LedgerError::Stale { behind: 4, tolerance: 3 }));
    }

    #[test]
    fn test_timestamp_range() {
        assert_eq!(timestamp(U256::from(1_700_000_000u64)).unwrap(), 1_700_000_000);
        assert!(matches!(timestamp(U256::MAX), Err(LedgerError::Encoding(_))));
    }
}
