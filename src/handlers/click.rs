//! Click gateway adapter. Two-phase callback protocol on a single POST
//! endpoint: `action=0` prepares (read-validate only), `action=1` completes.
//! Every callback carries an MD5 `sign_string` that is checked before any
//! ledger read, and the merchant-chosen transaction id in
//! `merchant_trans_id`.

use axum::{extract::State, Form, Json};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::db::models::TransactionState;
use crate::error::AppError;
use crate::services::signature;
use crate::services::{FailOutcome, SettleOutcome};
use crate::AppState;

pub const ERR_OK: i32 = 0;
pub const ERR_BAD_SIGNATURE: i32 = -1;
pub const ERR_INCORRECT_AMOUNT: i32 = -2;
pub const ERR_ACTION_NOT_FOUND: i32 = -3;
pub const ERR_ALREADY_PAID: i32 = -4;
pub const ERR_TRANSACTION_NOT_FOUND: i32 = -5;

const ACTION_PREPARE: &str = "0";
const ACTION_COMPLETE: &str = "1";

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    #[serde(default)]
    pub click_trans_id: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub merchant_trans_id: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_note: String,
    #[serde(default)]
    pub sign_time: String,
    #[serde(default)]
    pub sign_string: String,
}

#[derive(Debug, Serialize)]
pub struct ClickResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_trans_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_trans_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_prepare_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_confirm_id: Option<Uuid>,
    pub error: i32,
    pub error_note: &'static str,
}

impl ClickResponse {
    fn failure(error: i32, error_note: &'static str) -> Self {
        Self {
            click_trans_id: None,
            merchant_trans_id: None,
            merchant_prepare_id: None,
            merchant_confirm_id: None,
            error,
            error_note,
        }
    }

    fn prepare(req: &ClickRequest, prepare_id: Uuid) -> Self {
        Self {
            click_trans_id: Some(req.click_trans_id.clone()),
            merchant_trans_id: Some(req.merchant_trans_id.clone()),
            merchant_prepare_id: Some(prepare_id),
            merchant_confirm_id: None,
            error: ERR_OK,
            error_note: "Success",
        }
    }

    fn confirm(req: &ClickRequest, confirm_id: Uuid, error: i32, error_note: &'static str) -> Self {
        Self {
            click_trans_id: Some(req.click_trans_id.clone()),
            merchant_trans_id: Some(req.merchant_trans_id.clone()),
            merchant_prepare_id: None,
            merchant_confirm_id: Some(confirm_id),
            error,
            error_note,
        }
    }
}

pub async fn webhook(
    State(state): State<AppState>,
    Form(req): Form<ClickRequest>,
) -> Result<Json<ClickResponse>, AppError> {
    // Signature first, on every callback, before any ledger read.
    let valid = signature::verify_click_signature(
        &req.click_trans_id,
        &req.service_id,
        &state.payments.click.secret_key,
        &req.merchant_trans_id,
        &req.amount,
        &req.action,
        &req.sign_time,
        &req.sign_string,
    );
    if !valid {
        tracing::warn!(
            click_trans_id = %req.click_trans_id,
            merchant_trans_id = %req.merchant_trans_id,
            "click callback rejected: bad signature"
        );
        return Ok(Json(ClickResponse::failure(
            ERR_BAD_SIGNATURE,
            "Sign check error",
        )));
    }

    let Ok(transaction_id) = Uuid::parse_str(&req.merchant_trans_id) else {
        return Ok(Json(ClickResponse::failure(
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction does not exist",
        )));
    };
    let Some(tx) = state.ledger.find_topup(transaction_id).await? else {
        return Ok(Json(ClickResponse::failure(
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction does not exist",
        )));
    };

    // The declared amount must equal the ledger's before any transition.
    match BigDecimal::from_str(req.amount.trim()) {
        Ok(declared) if declared == tx.amount => {}
        _ => {
            return Ok(Json(ClickResponse::failure(
                ERR_INCORRECT_AMOUNT,
                "Incorrect parameter amount",
            )));
        }
    }

    let response = match req.action.as_str() {
        ACTION_PREPARE => prepare(&req, tx.state, tx.id),
        ACTION_COMPLETE => complete(&state, &req, tx.id).await?,
        _ => ClickResponse::failure(ERR_ACTION_NOT_FOUND, "Action not found"),
    };

    Ok(Json(response))
}

/// Prepare is read-validate only: the protocol's prepare phase persists
/// nothing distinct from PENDING, so re-delivery is trivially idempotent.
fn prepare(req: &ClickRequest, state: TransactionState, prepare_id: Uuid) -> ClickResponse {
    if state.is_terminal() {
        return ClickResponse::failure(ERR_ALREADY_PAID, "Already paid or canceled");
    }

    ClickResponse::prepare(req, prepare_id)
}

async fn complete(
    state: &AppState,
    req: &ClickRequest,
    transaction_id: Uuid,
) -> Result<ClickResponse, AppError> {
    // The gateway observed a failure on its side; record it and acknowledge.
    // A row that already reached a terminal state is left untouched.
    if req.error.trim() != "0" {
        let outcome = state
            .ledger
            .fail_topup(transaction_id, Some(&req.click_trans_id))
            .await?;
        return Ok(match outcome {
            FailOutcome::Failed(tx) | FailOutcome::AlreadyTerminal(tx) => {
                ClickResponse::confirm(req, tx.id, ERR_OK, "Handled external error")
            }
            FailOutcome::NotFound => {
                ClickResponse::failure(ERR_TRANSACTION_NOT_FOUND, "Transaction does not exist")
            }
        });
    }

    match state
        .ledger
        .settle_topup(transaction_id, Some(&req.click_trans_id))
        .await?
    {
        SettleOutcome::Credited(tx) => Ok(ClickResponse::confirm(req, tx.id, ERR_OK, "Success")),
        SettleOutcome::AlreadySettled(tx) => {
            Ok(ClickResponse::confirm(req, tx.id, ERR_ALREADY_PAID, "Already paid"))
        }
        SettleOutcome::Unsettleable(tx) => Ok(ClickResponse::confirm(
            req,
            tx.id,
            ERR_ALREADY_PAID,
            "Already paid or canceled",
        )),
        SettleOutcome::NotFound => Ok(ClickResponse::failure(
            ERR_TRANSACTION_NOT_FOUND,
            "Transaction does not exist",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(action: &str) -> ClickRequest {
        ClickRequest {
            click_trans_id: "click-999".to_string(),
            service_id: "7".to_string(),
            merchant_trans_id: Uuid::new_v4().to_string(),
            amount: "15000".to_string(),
            action: action.to_string(),
            error: "0".to_string(),
            error_note: String::new(),
            sign_time: "2023-01-01 12:00:00".to_string(),
            sign_string: String::new(),
        }
    }

    #[test]
    fn failure_response_carries_only_error_fields() {
        let response = ClickResponse::failure(ERR_BAD_SIGNATURE, "Sign check error");
        let body = serde_json::to_value(&response).unwrap();

        assert_eq!(body["error"], -1);
        assert_eq!(body["error_note"], "Sign check error");
        assert!(body.get("click_trans_id").is_none());
        assert!(body.get("merchant_prepare_id").is_none());
    }

    #[test]
    fn prepare_response_echoes_gateway_ids() {
        let req = request("0");
        let prepare_id = Uuid::new_v4();
        let body = serde_json::to_value(ClickResponse::prepare(&req, prepare_id)).unwrap();

        assert_eq!(body["click_trans_id"], "click-999");
        assert_eq!(body["merchant_trans_id"], req.merchant_trans_id);
        assert_eq!(body["merchant_prepare_id"], prepare_id.to_string());
        assert_eq!(body["error"], 0);
        assert!(body.get("merchant_confirm_id").is_none());
    }

    #[test]
    fn prepare_rejects_non_pending_states() {
        let req = request("0");
        let id = Uuid::new_v4();

        assert_eq!(prepare(&req, TransactionState::Pending, id).error, ERR_OK);
        assert_eq!(
            prepare(&req, TransactionState::Success, id).error,
            ERR_ALREADY_PAID
        );
        assert_eq!(
            prepare(&req, TransactionState::Canceled, id).error,
            ERR_ALREADY_PAID
        );
    }

    #[test]
    fn request_fields_default_when_missing() {
        let req: ClickRequest =
            serde_json::from_value(serde_json::json!({ "click_trans_id": "1", "action": "0" }))
                .unwrap();

        assert_eq!(req.click_trans_id, "1");
        assert_eq!(req.action, "0");
        assert_eq!(req.service_id, "");
        assert_eq!(req.sign_string, "");
    }
}
