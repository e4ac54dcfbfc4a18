//! Will contract endpoints

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

use crate::error::{BridgeError, ErrorKind};
use crate::gateway::dto::{
    failure, ActionRequest, ApiError, ApiFailure, ApiResult, ChangeRecipientRequest,
    ContractInfoResponse, PrepareDepositRequest, PreparedTransactionResponse, SetRecipientRequest,
    SubmitSignedTxRequest, TxResponse, TxStatusResponse,
};
use crate::gateway::extract::JsonBody;
use crate::gateway::AppState;
use crate::ledger::LedgerClient;
use crate::signer::TransactionSigner;

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Create contract routes
pub fn router<L, S>() -> Router<AppState<L, S>>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    Router::new()
        .route("/info", get(contract_info::<L, S>))
        .route("/set-recipient", post(set_recipient::<L, S>))
        .route("/change-recipient", post(change_recipient::<L, S>))
        .route("/ping", post(ping::<L, S>))
        .route("/prepare-deposit", post(prepare_deposit::<L, S>))
        .route("/submit-signed-tx", post(submit_signed_tx::<L, S>))
        .route("/claim", post(claim::<L, S>))
        .route("/trigger-reminder", post(trigger_reminder::<L, S>))
        .route("/tx/:tx_hash", get(tx_status::<L, S>))
}

/// The header wins over the body field
fn idempotency_key(headers: &HeaderMap, body: Option<String>) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(body)
}

fn reject(err: BridgeError, invalid: &str, failed: &str) -> ApiFailure {
    match err.kind() {
        ErrorKind::ValidationError => failure(invalid, err),
        _ => failure(failed, err),
    }
}

/// GET /contract/info - Current contract state
pub async fn contract_info<L, S>(
    State(state): State<AppState<L, S>>,
) -> ApiResult<ContractInfoResponse>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let info = state
        .bridge()
        .contract_info()
        .await
        .map_err(|e| failure("Failed to get contract info", e))?;
    Ok(Json(info.into()))
}

/// POST /contract/set-recipient - Designate the recipient
pub async fn set_recipient<L, S>(
    State(state): State<AppState<L, S>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<SetRecipientRequest>,
) -> ApiResult<TxResponse>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let recipient = request
        .recipient
        .ok_or_else(|| ApiError::bad_request("Recipient is required"))?;
    let key = idempotency_key(&headers, request.idempotency_key);

    let outcome = state
        .bridge()
        .set_recipient(&recipient, key)
        .await
        .map_err(|e| reject(e, "Invalid recipient address", "Failed to set recipient"))?;
    Ok(Json(outcome.into()))
}

/// POST /contract/change-recipient - Replace the recipient
pub async fn change_recipient<L, S>(
    State(state): State<AppState<L, S>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<ChangeRecipientRequest>,
) -> ApiResult<TxResponse>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let recipient = request
        .new_recipient
        .ok_or_else(|| ApiError::bad_request("New recipient is required"))?;
    let key = idempotency_key(&headers, request.idempotency_key);

    let outcome = state
        .bridge()
        .change_recipient(&recipient, key)
        .await
        .map_err(|e| reject(e, "Invalid recipient address", "Failed to change recipient"))?;
    Ok(Json(outcome.into()))
}

/// POST /contract/ping - Prove liveness
pub async fn ping<L, S>(
    State(state): State<AppState<L, S>>,
    headers: HeaderMap,
    body: Option<Json<ActionRequest>>,
) -> ApiResult<TxResponse>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let key = idempotency_key(&headers, body.and_then(|Json(b)| b.idempotency_key));
    let outcome = state
        .bridge()
        .ping(key)
        .await
        .map_err(|e| failure("Failed to ping contract", e))?;
    Ok(Json(outcome.into()))
}

/// POST /contract/prepare-deposit - Unsigned deposit for the caller to sign
pub async fn prepare_deposit<L, S>(
    State(state): State<AppState<L, S>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<PrepareDepositRequest>,
) -> ApiResult<PreparedTransactionResponse>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let amount = request
        .amount_text()
        .ok_or_else(|| ApiError::bad_request("Amount is required"))?;
    let from = request
        .from
        .ok_or_else(|| ApiError::bad_request("Invalid from address"))?;
    let key = idempotency_key(&headers, request.idempotency_key);

    let prepared = state
        .bridge()
        .prepare_deposit(&amount, &from, key)
        .await
        .map_err(|e| {
            let invalid = match &e {
                BridgeError::InvalidAddress(_) => "Invalid from address",
                _ => "Invalid deposit",
            };
            reject(e, invalid, "Failed to prepare deposit")
        })?;
    Ok(Json(prepared.into()))
}

/// POST /contract/submit-signed-tx - Broadcast a caller-signed transaction
pub async fn submit_signed_tx<L, S>(
    State(state): State<AppState<L, S>>,
    JsonBody(request): JsonBody<SubmitSignedTxRequest>,
) -> ApiResult<TxResponse>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let signed_tx = request
        .signed_tx
        .ok_or_else(|| ApiError::bad_request("Signed transaction is required"))?;

    let outcome = state
        .bridge()
        .submit_signed_tx(&signed_tx)
        .await
        .map_err(|e| reject(e, "Invalid signed transaction", "Failed to submit transaction"))?;
    Ok(Json(outcome.into()))
}

/// POST /contract/claim - Claim the funds
pub async fn claim<L, S>(
    State(state): State<AppState<L, S>>,
    headers: HeaderMap,
    body: Option<Json<ActionRequest>>,
) -> ApiResult<TxResponse>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let key = idempotency_key(&headers, body.and_then(|Json(b)| b.idempotency_key));
    let outcome = state
        .bridge()
        .claim(key)
        .await
        .map_err(|e| failure("Failed to claim funds", e))?;
    Ok(Json(outcome.into()))
}

/// POST /contract/trigger-reminder - Emit the reminder event
pub async fn trigger_reminder<L, S>(
    State(state): State<AppState<L, S>>,
    headers: HeaderMap,
    body: Option<Json<ActionRequest>>,
) -> ApiResult<TxResponse>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let key = idempotency_key(&headers, body.and_then(|Json(b)| b.idempotency_key));
    let outcome = state
        .bridge()
        .trigger_reminder(key)
        .await
        .map_err(|e| failure("Failed to trigger reminder", e))?;
    Ok(Json(outcome.into()))
}

/// GET /contract/tx/:tx_hash - Status of a broadcast transaction
pub async fn tx_status<L, S>(
    State(state): State<AppState<L, S>>,
    Path(tx_hash): Path<String>,
) -> ApiResult<TxStatusResponse>
where
    L: LedgerClient,
    S: TransactionSigner + 'static,
{
    let view = state
        .bridge()
        .tx_status(&tx_hash)
        .await
        .map_err(|e| reject(e, "Invalid transaction hash", "Failed to get transaction status"))?;
    Ok(Json(view.into()))
}
