use chrono::NaiveDate;
use thiserror::Error;

use crate::decimal::Currency;
use crate::types::TransactionType;

#[derive(Error, Debug)]
pub enum ReprocessError {
    #[error("chargeback dated {date} has no resolvable original transaction")]
    OriginalTransactionNotFound { date: NaiveDate },

    #[error("transaction type {kind:?} cannot be allocated")]
    UnsupportedTransactionType { kind: TransactionType },

    #[error("currency mismatch: loan is {expected}, event carries {found}")]
    CurrencyMismatch {
        expected: Currency,
        found: Currency,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("no repayment period covers {date}")]
    RepaymentPeriodNotFound { date: NaiveDate },
}

pub type Result<T> = std::result::Result<T, ReprocessError>;
