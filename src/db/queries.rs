use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use crate::db::models::{Account, Transaction, TransactionState};
use bigdecimal::BigDecimal;
use uuid::Uuid;

// --- Transaction queries ---

pub async fn insert_transaction(pool: &PgPool, tx: &Transaction) -> Result<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            id, account_id, amount, kind, state, gateway_ref, description, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.account_id)
    .bind(&tx.amount)
    .bind(tx.kind)
    .bind(tx.state)
    .bind(&tx.gateway_ref)
    .bind(&tx.description)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Lookup used by the gateway handshakes: a top-up that is still open.
pub async fn get_pending_topup(pool: &PgPool, id: Uuid) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE id = $1 AND kind = 'TOP_UP' AND state = 'PENDING'",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Only top-ups are addressable by the gateways; fee rows share the table
/// but never leave the marketplace's own flows.
pub async fn get_topup(pool: &PgPool, id: Uuid) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE id = $1 AND kind = 'TOP_UP'",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_by_gateway_ref(pool: &PgPool, gateway_ref: &str) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE gateway_ref = $1")
        .bind(gateway_ref)
        .fetch_optional(pool)
        .await
}

/// First-contact handshake: record the gateway's id for this transaction.
/// Only fires while the row is PENDING and unclaimed; anything else returns
/// `None` and the caller decides whether that is an idempotent re-delivery
/// or a protocol violation.
pub async fn attach_gateway_ref(
    pool: &PgPool,
    id: Uuid,
    gateway_ref: &str,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET gateway_ref = $2, updated_at = NOW()
        WHERE id = $1 AND kind = 'TOP_UP' AND state = 'PENDING' AND gateway_ref IS NULL
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(gateway_ref)
    .fetch_optional(pool)
    .await
}

/// Compare-and-swap out of PENDING. Exactly one concurrent caller observes
/// the returned row; duplicates get `None` and re-read the current state.
/// `gateway_ref` is attached in the same statement when not already set.
pub async fn transition_from_pending(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    to: TransactionState,
    gateway_ref: Option<&str>,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET state = $2, gateway_ref = COALESCE(gateway_ref, $3), updated_at = NOW()
        WHERE id = $1 AND kind = 'TOP_UP' AND state = 'PENDING'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(to)
    .bind(gateway_ref)
    .fetch_optional(&mut **executor)
    .await
}

// --- Account queries ---

pub async fn get_account_by_token(pool: &PgPool, api_token: &str) -> Result<Option<Account>> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE api_token = $1")
        .bind(api_token)
        .fetch_optional(pool)
        .await
}

pub async fn insert_account(pool: &PgPool, account: &Account) -> Result<Account> {
    sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (id, balance, api_token, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(account.id)
    .bind(&account.balance)
    .bind(&account.api_token)
    .bind(account.created_at)
    .fetch_one(pool)
    .await
}

/// The crediting engine's single operation. Runs inside the same database
/// transaction as the state transition so a credited balance and a recorded
/// SUCCESS can never diverge.
pub async fn credit_account(
    executor: &mut SqlxTransaction<'_, Postgres>,
    account_id: Uuid,
    amount: &BigDecimal,
) -> Result<()> {
    let result = sqlx::query("UPDATE accounts SET balance = balance + $2 WHERE id = $1")
        .bind(account_id)
        .bind(amount)
        .execute(&mut **executor)
        .await?;

    if result.rows_affected() != 1 {
        return Err(sqlx::Error::RowNotFound);
    }

    Ok(())
}
