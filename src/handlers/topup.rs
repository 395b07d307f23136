//! Origination flow: an authenticated user opens a top-up and is handed a
//! gateway checkout URL. This is the only place the marketplace's session
//! collaborator is consulted; the state machine is not involved beyond row
//! creation.

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::Account;
use crate::db::queries;
use crate::error::AppError;
use crate::validation;
use crate::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentSystem {
    #[default]
    Payme,
    Click,
}

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount: i64,
    #[serde(default)]
    pub system: PaymentSystem,
}

#[derive(Debug, Serialize)]
pub struct TopUpResponse {
    pub transaction_id: Uuid,
    pub payment_url: String,
}

async fn authenticated_account(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Account, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

    queries::get_account_by_token(&state.db, token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("unknown token".to_string()))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TopUpRequest>,
) -> Result<Json<TopUpResponse>, AppError> {
    let account = authenticated_account(&state, &headers).await?;

    validation::validate_topup_amount(req.amount, state.payments.min_topup_amount)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let tx = state
        .ledger
        .create_topup(account.id, BigDecimal::from(req.amount), "Balance top-up")
        .await?;

    let payment_url = match req.system {
        PaymentSystem::Payme => state.payments.payme.checkout_url(tx.id, req.amount),
        PaymentSystem::Click => state.payments.click.checkout_url(tx.id, req.amount),
    };

    Ok(Json(TopUpResponse {
        transaction_id: tx.id,
        payment_url,
    }))
}

/// Audit read: a user may inspect their own ledger rows.
pub async fn get_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::db::models::Transaction>, AppError> {
    let account = authenticated_account(&state, &headers).await?;

    let tx = state
        .ledger
        .find_by_id(id)
        .await?
        .filter(|tx| tx.account_id == account.id)
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

    Ok(Json(tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_defaults_to_payme() {
        let req: TopUpRequest = serde_json::from_value(json!({ "amount": 15000 })).unwrap();
        assert_eq!(req.system, PaymentSystem::Payme);
    }

    #[test]
    fn system_parses_lowercase_names() {
        let req: TopUpRequest =
            serde_json::from_value(json!({ "amount": 15000, "system": "click" })).unwrap();
        assert_eq!(req.system, PaymentSystem::Click);
    }

    #[test]
    fn unknown_system_is_rejected() {
        let req = serde_json::from_value::<TopUpRequest>(json!({
            "amount": 15000,
            "system": "paypal"
        }));
        assert!(req.is_err());
    }
}
