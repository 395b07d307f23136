//! Payme gateway adapter. A single POST endpoint speaking the gateway's
//! JSON-RPC-style envelope `{method, params, id}`. Protocol failures are
//! always answered with the gateway's own error envelope over HTTP 200;
//! only a persistence outage escapes as a transport error.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::{Transaction, TransactionState};
use crate::error::AppError;
use crate::services::signature;
use crate::services::{AttachOutcome, CancelOutcome, SettleOutcome};
use crate::AppState;

pub const ERR_INVALID_REQUEST: i32 = -32600;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_UNAUTHORIZED: i32 = -32504;
pub const ERR_INCORRECT_AMOUNT: i32 = -31001;
pub const ERR_TRANSACTION_NOT_FOUND: i32 = -31003;
pub const ERR_CANNOT_PERFORM: i32 = -31008;
pub const ERR_TRANSACTION_UNAVAILABLE: i32 = -31050;

/// Payme transaction state codes reported in response envelopes.
const STATE_CREATED: i32 = 1;
const STATE_PERFORMED: i32 = 2;
const STATE_CANCELED: i32 = -2;

#[derive(Debug, Deserialize)]
pub enum PaymeMethod {
    CheckPerformTransaction,
    CreateTransaction,
    PerformTransaction,
    CheckTransaction,
    CancelTransaction,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymeParams {
    /// Payme's own transaction id; becomes our `gateway_ref`.
    pub id: Option<String>,
    pub account: Option<PaymeAccount>,
    /// Amount in tiyin (UZS * 100).
    pub amount: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymeAccount {
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymeRequest {
    pub method: PaymeMethod,
    #[serde(default)]
    pub params: PaymeParams,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Serialize)]
pub struct PaymeError {
    pub code: i32,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PaymeResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PaymeError>,
}

impl PaymeResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: &'static str) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(PaymeError { code, message }),
        }
    }
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<PaymeResponse>, AppError> {
    let request_id = body.get("id").cloned().unwrap_or(Value::Null);

    // Auth gates everything, including method dispatch.
    let auth_header = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());
    if let Err(reason) = signature::verify_payme_auth(auth_header, &state.payments.payme.secret_key)
    {
        tracing::warn!(reason, "payme callback rejected");
        return Ok(Json(PaymeResponse::error(
            request_id,
            ERR_UNAUTHORIZED,
            "Insufficient privileges",
        )));
    }

    let req: PaymeRequest = match serde_json::from_value(body) {
        Ok(req) => req,
        Err(_) => {
            return Ok(Json(PaymeResponse::error(
                request_id,
                ERR_INVALID_REQUEST,
                "Invalid request",
            )));
        }
    };

    let response = match req.method {
        PaymeMethod::CheckPerformTransaction => {
            check_perform_transaction(&state, req.id, req.params).await?
        }
        PaymeMethod::CreateTransaction => create_transaction(&state, req.id, req.params).await?,
        PaymeMethod::PerformTransaction => perform_transaction(&state, req.id, req.params).await?,
        PaymeMethod::CheckTransaction => check_transaction(&state, req.id, req.params).await?,
        PaymeMethod::CancelTransaction => cancel_transaction(&state, req.id, req.params).await?,
        PaymeMethod::Unknown => {
            PaymeResponse::error(req.id, ERR_METHOD_NOT_FOUND, "Method not found")
        }
    };

    Ok(Json(response))
}

fn account_transaction_id(params: &PaymeParams) -> Option<Uuid> {
    params
        .account
        .as_ref()
        .and_then(|account| account.transaction_id.as_deref())
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

/// The declared amount arrives in tiyin; the ledger stores whole UZS.
fn amount_matches(tx: &Transaction, amount_tiyin: i64) -> bool {
    tx.amount.clone() * BigDecimal::from(100) == BigDecimal::from(amount_tiyin)
}

fn payme_state(state: TransactionState) -> i32 {
    match state {
        TransactionState::Pending => STATE_CREATED,
        TransactionState::Success => STATE_PERFORMED,
        TransactionState::Failed | TransactionState::Canceled => STATE_CANCELED,
    }
}

async fn check_perform_transaction(
    state: &AppState,
    id: Value,
    params: PaymeParams,
) -> Result<PaymeResponse, AppError> {
    let Some(transaction_id) = account_transaction_id(&params) else {
        return Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_UNAVAILABLE,
            "Transaction not found or already finished",
        ));
    };

    match state.ledger.find_pending_topup(transaction_id).await? {
        Some(tx) => {
            if let Some(amount) = params.amount {
                if !amount_matches(&tx, amount) {
                    return Ok(PaymeResponse::error(
                        id,
                        ERR_INCORRECT_AMOUNT,
                        "Incorrect amount",
                    ));
                }
            }
            Ok(PaymeResponse::result(id, json!({ "allow": true })))
        }
        None => Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_UNAVAILABLE,
            "Transaction not found or already finished",
        )),
    }
}

async fn create_transaction(
    state: &AppState,
    id: Value,
    params: PaymeParams,
) -> Result<PaymeResponse, AppError> {
    let Some(transaction_id) = account_transaction_id(&params) else {
        return Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_UNAVAILABLE,
            "Transaction not found",
        ));
    };
    let Some(gateway_ref) = params.id.as_deref() else {
        return Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_UNAVAILABLE,
            "Transaction not found",
        ));
    };

    if let Some(amount) = params.amount {
        match state.ledger.find_topup(transaction_id).await? {
            Some(tx) if !amount_matches(&tx, amount) => {
                return Ok(PaymeResponse::error(id, ERR_INCORRECT_AMOUNT, "Incorrect amount"));
            }
            _ => {}
        }
    }

    match state.ledger.attach_gateway_ref(transaction_id, gateway_ref).await? {
        AttachOutcome::Attached(tx) | AttachOutcome::AlreadyAttached(tx) => {
            Ok(PaymeResponse::result(
                id,
                json!({
                    "create_time": tx.created_at.timestamp_millis(),
                    "transaction": tx.id.to_string(),
                    "state": STATE_CREATED,
                }),
            ))
        }
        AttachOutcome::Rejected(_) => Ok(PaymeResponse::error(
            id,
            ERR_CANNOT_PERFORM,
            "Unable to perform operation",
        )),
        AttachOutcome::NotFound => Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_UNAVAILABLE,
            "Transaction not found",
        )),
    }
}

async fn perform_transaction(
    state: &AppState,
    id: Value,
    params: PaymeParams,
) -> Result<PaymeResponse, AppError> {
    let Some(gateway_ref) = params.id.as_deref() else {
        return Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction not found",
        ));
    };

    let Some(tx) = state.ledger.find_by_gateway_ref(gateway_ref).await? else {
        return Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction not found",
        ));
    };

    match state.ledger.settle_topup(tx.id, None).await? {
        SettleOutcome::Credited(tx) | SettleOutcome::AlreadySettled(tx) => {
            Ok(PaymeResponse::result(
                id,
                json!({
                    "transaction": tx.id.to_string(),
                    "perform_time": tx.created_at.timestamp_millis(),
                    "state": STATE_PERFORMED,
                }),
            ))
        }
        SettleOutcome::Unsettleable(_) => Ok(PaymeResponse::error(
            id,
            ERR_CANNOT_PERFORM,
            "Unable to perform operation",
        )),
        SettleOutcome::NotFound => Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction not found",
        )),
    }
}

async fn check_transaction(
    state: &AppState,
    id: Value,
    params: PaymeParams,
) -> Result<PaymeResponse, AppError> {
    let Some(gateway_ref) = params.id.as_deref() else {
        return Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction not found",
        ));
    };

    match state.ledger.find_by_gateway_ref(gateway_ref).await? {
        Some(tx) => {
            let perform_time = if tx.state == TransactionState::Success {
                tx.created_at.timestamp_millis()
            } else {
                0
            };
            let cancel_time = if payme_state(tx.state) == STATE_CANCELED {
                tx.updated_at.timestamp_millis()
            } else {
                0
            };

            Ok(PaymeResponse::result(
                id,
                json!({
                    "create_time": tx.created_at.timestamp_millis(),
                    "perform_time": perform_time,
                    "cancel_time": cancel_time,
                    "transaction": tx.id.to_string(),
                    "state": payme_state(tx.state),
                    "reason": Value::Null,
                }),
            ))
        }
        None => Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction not found",
        )),
    }
}

async fn cancel_transaction(
    state: &AppState,
    id: Value,
    params: PaymeParams,
) -> Result<PaymeResponse, AppError> {
    let Some(gateway_ref) = params.id.as_deref() else {
        return Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction not found",
        ));
    };

    let Some(tx) = state.ledger.find_by_gateway_ref(gateway_ref).await? else {
        return Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction not found",
        ));
    };

    match state.ledger.cancel_topup(tx.id).await? {
        CancelOutcome::Canceled(tx) | CancelOutcome::AlreadyCanceled(tx) => {
            Ok(PaymeResponse::result(
                id,
                json!({
                    "transaction": tx.id.to_string(),
                    "state": STATE_CANCELED,
                    "cancel_time": tx.updated_at.timestamp_millis(),
                }),
            ))
        }
        CancelOutcome::Rejected(_) => Ok(PaymeResponse::error(
            id,
            ERR_CANNOT_PERFORM,
            "Unable to perform operation",
        )),
        CancelOutcome::NotFound => Ok(PaymeResponse::error(
            id,
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction not found",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::TransactionKind;
    use chrono::Utc;

    #[test]
    fn error_envelope_omits_result() {
        let response = PaymeResponse::error(json!(123), ERR_UNAUTHORIZED, "Insufficient privileges");
        let body = serde_json::to_value(&response).unwrap();

        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 123);
        assert_eq!(body["error"]["code"], -32504);
        assert!(body.get("result").is_none());
    }

    #[test]
    fn result_envelope_omits_error() {
        let response = PaymeResponse::result(json!(7), json!({ "allow": true }));
        let body = serde_json::to_value(&response).unwrap();

        assert_eq!(body["result"]["allow"], true);
        assert!(body.get("error").is_none());
    }

    #[test]
    fn unknown_method_falls_into_catch_all_variant() {
        let req: PaymeRequest =
            serde_json::from_value(json!({ "method": "GetStatement", "id": 1 })).unwrap();
        assert!(matches!(req.method, PaymeMethod::Unknown));
    }

    #[test]
    fn request_parses_nested_account_params() {
        let req: PaymeRequest = serde_json::from_value(json!({
            "method": "CreateTransaction",
            "id": 5,
            "params": {
                "id": "payme-ref-1",
                "amount": 1500000,
                "account": { "transaction_id": "0b5b0b5e-54f4-4a0a-b0a5-111111111111" }
            }
        }))
        .unwrap();

        assert!(matches!(req.method, PaymeMethod::CreateTransaction));
        assert_eq!(req.params.id.as_deref(), Some("payme-ref-1"));
        assert_eq!(req.params.amount, Some(1500000));
        assert!(account_transaction_id(&req.params).is_some());
    }

    #[test]
    fn tiyin_amount_comparison() {
        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            amount: BigDecimal::from(15000),
            kind: TransactionKind::TopUp,
            state: TransactionState::Pending,
            gateway_ref: None,
            description: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(amount_matches(&tx, 1_500_000));
        assert!(!amount_matches(&tx, 15000));
    }

    #[test]
    fn ledger_states_map_to_payme_codes() {
        assert_eq!(payme_state(TransactionState::Pending), 1);
        assert_eq!(payme_state(TransactionState::Success), 2);
        assert_eq!(payme_state(TransactionState::Canceled), -2);
        assert_eq!(payme_state(TransactionState::Failed), -2);
    }
}
