//! Ledger state machine. Every mutation of a transaction row and of an
//! account balance funnels through this service; the gateway adapters only
//! translate protocol vocabulary into these operations.

use bigdecimal::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{Transaction, TransactionState};
use crate::db::queries;
use crate::error::AppError;

/// Outcome of the first-contact handshake that records the gateway's id.
#[derive(Debug)]
pub enum AttachOutcome {
    /// The ref was written now.
    Attached(Transaction),
    /// Re-delivery with the same ref on a still-pending row; nothing written.
    AlreadyAttached(Transaction),
    /// Wrong state, or the row already carries a different ref.
    Rejected(Transaction),
    NotFound,
}

/// Outcome of the commit handshake.
#[derive(Debug)]
pub enum SettleOutcome {
    /// This caller won the PENDING -> SUCCESS transition and the balance was
    /// credited, both in one database transaction.
    Credited(Transaction),
    /// Duplicate delivery: the row was already SUCCESS. No credit applied.
    AlreadySettled(Transaction),
    /// The row is FAILED or CANCELED; it can never be settled.
    Unsettleable(Transaction),
    NotFound,
}

#[derive(Debug)]
pub enum FailOutcome {
    Failed(Transaction),
    AlreadyTerminal(Transaction),
    NotFound,
}

#[derive(Debug)]
pub enum CancelOutcome {
    Canceled(Transaction),
    AlreadyCanceled(Transaction),
    Rejected(Transaction),
    NotFound,
}

#[derive(Clone)]
pub struct LedgerService {
    pool: PgPool,
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Origination: open a PENDING top-up row. No gateway involvement yet.
    pub async fn create_topup(
        &self,
        account_id: Uuid,
        amount: BigDecimal,
        description: &str,
    ) -> Result<Transaction, AppError> {
        let tx = Transaction::new_topup(account_id, amount, description);
        let inserted = queries::insert_transaction(&self.pool, &tx).await?;

        tracing::info!(
            transaction_id = %inserted.id,
            account_id = %inserted.account_id,
            amount = %inserted.amount,
            "top-up transaction created"
        );

        Ok(inserted)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        Ok(queries::get_transaction(&self.pool, id).await?)
    }

    pub async fn find_topup(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        Ok(queries::get_topup(&self.pool, id).await?)
    }

    pub async fn find_pending_topup(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        Ok(queries::get_pending_topup(&self.pool, id).await?)
    }

    pub async fn find_by_gateway_ref(
        &self,
        gateway_ref: &str,
    ) -> Result<Option<Transaction>, AppError> {
        Ok(queries::get_by_gateway_ref(&self.pool, gateway_ref).await?)
    }

    /// Record the gateway's id for a pending transaction. Setting the same
    /// ref twice is a no-op success; a different ref or a non-pending row is
    /// rejected without any partial write.
    pub async fn attach_gateway_ref(
        &self,
        id: Uuid,
        gateway_ref: &str,
    ) -> Result<AttachOutcome, AppError> {
        if let Some(tx) = queries::attach_gateway_ref(&self.pool, id, gateway_ref).await? {
            tracing::info!(transaction_id = %tx.id, gateway_ref, "gateway ref attached");
            return Ok(AttachOutcome::Attached(tx));
        }

        match queries::get_transaction(&self.pool, id).await? {
            None => Ok(AttachOutcome::NotFound),
            Some(tx)
                if tx.state == TransactionState::Pending
                    && tx.gateway_ref.as_deref() == Some(gateway_ref) =>
            {
                Ok(AttachOutcome::AlreadyAttached(tx))
            }
            Some(tx) => {
                tracing::warn!(
                    transaction_id = %tx.id,
                    state = ?tx.state,
                    gateway_ref,
                    "gateway ref attach rejected"
                );
                Ok(AttachOutcome::Rejected(tx))
            }
        }
    }

    /// The exactly-once boundary. The PENDING -> SUCCESS compare-and-swap and
    /// the balance increment commit together or not at all; of any number of
    /// concurrent deliveries exactly one observes `Credited`.
    pub async fn settle_topup(
        &self,
        id: Uuid,
        gateway_ref: Option<&str>,
    ) -> Result<SettleOutcome, AppError> {
        let mut db_tx = self.pool.begin().await?;

        match queries::transition_from_pending(&mut db_tx, id, TransactionState::Success, gateway_ref)
            .await?
        {
            Some(tx) => {
                queries::credit_account(&mut db_tx, tx.account_id, &tx.amount).await?;
                db_tx.commit().await?;

                tracing::info!(
                    transaction_id = %tx.id,
                    account_id = %tx.account_id,
                    amount = %tx.amount,
                    "top-up settled, balance credited"
                );

                Ok(SettleOutcome::Credited(tx))
            }
            None => {
                db_tx.rollback().await?;

                match queries::get_transaction(&self.pool, id).await? {
                    None => Ok(SettleOutcome::NotFound),
                    Some(tx) if tx.state == TransactionState::Success => {
                        tracing::info!(transaction_id = %tx.id, "duplicate settle delivery, no re-credit");
                        Ok(SettleOutcome::AlreadySettled(tx))
                    }
                    Some(tx) => Ok(SettleOutcome::Unsettleable(tx)),
                }
            }
        }
    }

    /// Gateway-reported failure. Only a pending row moves to FAILED; terminal
    /// rows are left untouched so a late failure report cannot claw back a
    /// settled credit.
    pub async fn fail_topup(
        &self,
        id: Uuid,
        gateway_ref: Option<&str>,
    ) -> Result<FailOutcome, AppError> {
        let mut db_tx = self.pool.begin().await?;

        match queries::transition_from_pending(&mut db_tx, id, TransactionState::Failed, gateway_ref)
            .await?
        {
            Some(tx) => {
                db_tx.commit().await?;
                tracing::warn!(transaction_id = %tx.id, "top-up marked failed by gateway");
                Ok(FailOutcome::Failed(tx))
            }
            None => {
                db_tx.rollback().await?;

                match queries::get_transaction(&self.pool, id).await? {
                    None => Ok(FailOutcome::NotFound),
                    Some(tx) => Ok(FailOutcome::AlreadyTerminal(tx)),
                }
            }
        }
    }

    /// Cancellation before settlement. A canceled row is reported
    /// idempotently; settled and failed rows are rejected.
    pub async fn cancel_topup(&self, id: Uuid) -> Result<CancelOutcome, AppError> {
        let mut db_tx = self.pool.begin().await?;

        match queries::transition_from_pending(&mut db_tx, id, TransactionState::Canceled, None)
            .await?
        {
            Some(tx) => {
                db_tx.commit().await?;
                tracing::info!(transaction_id = %tx.id, "top-up canceled");
                Ok(CancelOutcome::Canceled(tx))
            }
            None => {
                db_tx.rollback().await?;

                match queries::get_transaction(&self.pool, id).await? {
                    None => Ok(CancelOutcome::NotFound),
                    Some(tx) if tx.state == TransactionState::Canceled => {
                        Ok(CancelOutcome::AlreadyCanceled(tx))
                    }
                    Some(tx) => Ok(CancelOutcome::Rejected(tx)),
                }
            }
        }
    }
}
