use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Ledger state machine. Transitions only move forward: PENDING may become
/// SUCCESS, FAILED or CANCELED; terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_state", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionState {
    Pending,
    Success,
    Failed,
    Canceled,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionState::Pending)
    }
}

/// Only `TopUp` rows participate in the gateway protocols; the fee kinds are
/// written by the marketplace's charging flow and live here for the audit
/// trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    TopUp,
    ResponseFee,
    DealFee,
}

/// A ledger row. `gateway_ref` is the id the gateway assigned on its first
/// contact with this transaction; it is set at most once.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: BigDecimal,
    pub kind: TransactionKind,
    pub state: TransactionState,
    pub gateway_ref: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new_topup(account_id: Uuid, amount: BigDecimal, description: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount,
            kind: TransactionKind::TopUp,
            state: TransactionState::Pending,
            gateway_ref: None,
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Owned by the marketplace's onboarding flow; this core only reads it for
/// authentication and increments `balance` through the crediting engine.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub balance: BigDecimal,
    pub api_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_topup_starts_pending_without_gateway_ref() {
        let account_id = Uuid::new_v4();
        let tx = Transaction::new_topup(account_id, BigDecimal::from(15000), "Balance top-up");

        assert_eq!(tx.account_id, account_id);
        assert_eq!(tx.kind, TransactionKind::TopUp);
        assert_eq!(tx.state, TransactionState::Pending);
        assert!(tx.gateway_ref.is_none());
        assert_eq!(tx.amount, BigDecimal::from(15000));
    }

    #[test]
    fn pending_is_the_only_non_terminal_state() {
        assert!(!TransactionState::Pending.is_terminal());
        assert!(TransactionState::Success.is_terminal());
        assert!(TransactionState::Failed.is_terminal());
        assert!(TransactionState::Canceled.is_terminal());
    }

    #[test]
    fn kind_serializes_in_ledger_vocabulary() {
        let json = serde_json::to_string(&TransactionKind::TopUp).unwrap();
        assert_eq!(json, "\"TOP_UP\"");
        let json = serde_json::to_string(&TransactionState::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
    }
}
