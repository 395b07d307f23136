pub mod ledger;
pub mod signature;

pub use ledger::{AttachOutcome, CancelOutcome, FailOutcome, LedgerService, SettleOutcome};
