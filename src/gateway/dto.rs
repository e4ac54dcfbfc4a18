//! Data Transfer Objects for API requests and responses

use crate::error::{BridgeError, ErrorKind};
use crate::lifecycle::{TxOutcome, TxView};
use crate::types::{ContractState, PreparedTransaction};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Contract state; timestamps are decimal-string seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfoResponse {
    pub owner: String,
    pub recipient: String,
    pub start_time: String,
    pub pinged_last: String,
}

impl From<ContractState> for ContractInfoResponse {
    fn from(state: ContractState) -> Self {
        Self {
            owner: state.owner.to_checksum(None),
            recipient: state.recipient.to_checksum(None),
            start_time: state.start_time.to_string(),
            pinged_last: state.pinged_last.to_string(),
        }
    }
}

/// Body of the parameterless server-signed actions
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRecipientRequest {
    pub recipient: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecipientRequest {
    pub new_recipient: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Deposit preparation request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareDepositRequest {
    /// Decimal ETH, as a JSON string or number
    pub amount: Option<serde_json::Value>,
    pub from: Option<String>,
    pub idempotency_key: Option<String>,
}

impl PrepareDepositRequest {
    /// Amount as text; numbers are taken in their JSON spelling
    pub fn amount_text(&self) -> Option<String> {
        match self.amount.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Unsigned transaction descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedTransactionResponse {
    pub to: String,
    /// Wei as a decimal string
    pub value: String,
    pub data: String,
    pub chain_id: u64,
    pub nonce: u64,
    pub prepare_id: u64,
    pub expires_at: u64,
}

impl From<PreparedTransaction> for PreparedTransactionResponse {
    fn from(tx: PreparedTransaction) -> Self {
        Self {
            to: tx.to.to_checksum(None),
            value: tx.value.to_string(),
            data: tx.data.to_string(),
            chain_id: tx.chain_id,
            nonce: tx.nonce,
            prepare_id: tx.prepare_id,
            expires_at: tx.expires_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSignedTxRequest {
    pub signed_tx: Option<String>,
}

/// Successful action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResponse {
    pub success: bool,
    pub tx_hash: String,
    pub status: String,
}

impl From<TxOutcome> for TxResponse {
    fn from(outcome: TxOutcome) -> Self {
        Self {
            success: true,
            tx_hash: outcome.tx_hash.to_string(),
            status: outcome.state.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxStatusResponse {
    pub tx_hash: String,
    pub intent: String,
    pub state: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<TxView> for TxStatusResponse {
    fn from(view: TxView) -> Self {
        Self {
            tx_hash: view.tx_hash.to_string(),
            intent: view.intent.to_string(),
            state: view.state.as_str().to_string(),
            status: view.status.as_str().to_string(),
            submitted_at: view.submitted_at,
            confirmed_at: view.confirmed_at,
            reason: view.reason,
        }
    }
}

/// Error body: `{error, kind, details, reason?, txHash?}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error: String,
    pub kind: ErrorKind,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);
pub type ApiResult<T> = Result<Json<T>, ApiFailure>;

impl ApiError {
    pub fn from_bridge(summary: impl Into<String>, err: &BridgeError) -> Self {
        Self {
            error: summary.into(),
            kind: err.kind(),
            details: err.to_string(),
            reason: err.reason().map(str::to_string),
            tx_hash: err.tx_hash().map(|h| h.to_string()),
        }
    }

    /// Missing or malformed request field
    pub fn bad_request(summary: impl Into<String>) -> ApiFailure {
        let summary = summary.into();
        (
            StatusCode::BAD_REQUEST,
            Json(Self {
                details: summary.clone(),
                error: summary,
                kind: ErrorKind::ValidationError,
                reason: None,
                tx_hash: None,
            }),
        )
    }
}

pub fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Expired => StatusCode::GONE,
        ErrorKind::RejectedByNode | ErrorKind::Reverted => StatusCode::UNPROCESSABLE_ENTITY,
        // still pending on-chain: poll the status endpoint
        ErrorKind::TimedOut => StatusCode::ACCEPTED,
        ErrorKind::LedgerUnreachable | ErrorKind::LedgerStale => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::EncodingError | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a bridge error onto the HTTP error response
pub fn failure(summary: &str, err: BridgeError) -> ApiFailure {
    if err.kind() == ErrorKind::Internal || err.kind() == ErrorKind::EncodingError {
        tracing::error!("{}: {}", summary, err);
    } else {
        tracing::debug!("{}: {}", summary, err);
    }
    (status_code(err.kind()), Json(ApiError::from_bridge(summary, &err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::TxHash;

    #[test]
    fn test_error_body_shape() {
        let err = BridgeError::Reverted {
            tx_hash: Some(TxHash::repeat_byte(1)),
            reason: "Too early to claim".to_string(),
        };
        let (status, Json(body)) = failure("Failed to claim funds", err);
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "Failed to claim funds");
        assert_eq!(json["kind"], "Reverted");
        assert_eq!(json["reason"], "Too early to claim");
        assert!(json["txHash"].as_str().unwrap().starts_with("0x0101"));
    }

    #[test]
    fn test_validation_errors_omit_optional_fields() {
        let (status, Json(body)) = failure("Invalid recipient address", BridgeError::InvalidAddress("0x123".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "ValidationError");
        assert!(json.get("reason").is_none());
        assert!(json.get("txHash").is_none());
    }

    #[test]
    fn test_amount_accepts_string_or_number() {
        let req: PrepareDepositRequest =
            serde_json::from_str(r#"{"amount": 1.5, "from": "0x0"}"#).unwrap();
        assert_eq!(req.amount_text().as_deref(), Some("1.5"));

        let req: PrepareDepositRequest =
            serde_json::from_str(r#"{"amount": "0.25", "from": "0x0"}"#).unwrap();
        assert_eq!(req.amount_text().as_deref(), Some("0.25"));

        let req: PrepareDepositRequest = serde_json::from_str(r#"{"amount": true}"#).unwrap();
        assert_eq!(req.amount_text(), None);
    }
}
