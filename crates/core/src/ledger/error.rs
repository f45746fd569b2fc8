//! Ledger error types for validation, closing and consistency errors.
//!
//! Every error belongs to one [`ErrorKind`]; callers branch on the kind and
//! use [`LedgerError::error_code`] for stable API codes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tally_shared::types::{AccountId, JournalEntryId};
use thiserror::Error;

use super::types::SourceKind;

/// Broad error classes used to decide how an error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Rejected before any write.
    Validation,
    /// The source was already posted. Resolved internally as a replay.
    DuplicateSource,
    /// Cache and ledger disagree. Raised by the reconciler only.
    ConsistencyDrift,
    /// Out-of-order, duplicate or concurrent period close.
    ClosingConflict,
    /// Unknown entry or account.
    NotFound,
    /// Persistence failure. Nothing observable changed.
    Storage,
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Entry must have at least 2 lines.
    #[error("Journal entry must have at least 2 lines")]
    InsufficientLines,

    /// Entry is not balanced (debits != credits).
    #[error("Journal entry is not balanced. Debit: {debit}, Credit: {credit}")]
    UnbalancedEntry {
        /// Total debit amount.
        debit: Decimal,
        /// Total credit amount.
        credit: Decimal,
    },

    /// Line amount cannot be zero.
    #[error("Line amount cannot be zero")]
    ZeroAmount,

    /// Line amount cannot be negative.
    #[error("Line amount cannot be negative")]
    NegativeAmount,

    /// Line must carry either a debit or a credit, not both.
    #[error("Line must specify either debit or credit, not both")]
    InvalidLineAmounts,

    /// Amount has more decimal places than the currency allows.
    #[error("Amount {amount} exceeds {scale} decimal places")]
    AmountPrecision {
        /// Offending amount.
        amount: Decimal,
        /// Allowed decimal places.
        scale: u32,
    },

    /// Source kind is reserved for entries the ledger writes itself.
    #[error("Source kind {0} is reserved for system entries")]
    ReservedSourceKind(SourceKind),

    /// Source id is blank.
    #[error("Source id cannot be empty")]
    EmptySourceId,

    /// Entry date falls inside a closed period.
    #[error("Entry date {date} is inside a closed period (closed through {closed_through})")]
    PeriodClosed {
        /// Entry date.
        date: NaiveDate,
        /// End date of the latest closed period.
        closed_through: NaiveDate,
    },

    /// Period start is after its end.
    #[error("Period start {start} is after period end {end}")]
    InvalidPeriodRange {
        /// Start date.
        start: NaiveDate,
        /// End date.
        end: NaiveDate,
    },

    // ========== Account Errors ==========
    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Account is inactive and cannot be used.
    #[error("Account {0} is inactive")]
    AccountInactive(AccountId),

    /// Header accounts only aggregate children.
    #[error("Account {0} is a header account")]
    HeaderAccount(AccountId),

    /// Account code already used.
    #[error("Account code already exists: {0}")]
    DuplicateAccountCode(String),

    /// Account definition breaks a chart rule.
    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    /// Retained earnings account is missing or unusable.
    #[error("Retained earnings account {code}: {reason}")]
    RetainedEarnings {
        /// Configured account code.
        code: String,
        /// What is wrong with it.
        reason: String,
    },

    // ========== Entry State Errors ==========
    /// Journal entry not found.
    #[error("Journal entry not found: {0}")]
    EntryNotFound(JournalEntryId),

    /// Source already posted.
    #[error("Source already posted as entry {existing}")]
    DuplicateSource {
        /// Entry already recorded for the source.
        existing: JournalEntryId,
    },

    /// Entry was already reversed.
    #[error("Journal entry {0} is already reversed")]
    AlreadyReversed(JournalEntryId),

    /// Only posted entries can be reversed.
    #[error("Journal entry {0} is not posted")]
    EntryNotPosted(JournalEntryId),

    // ========== Closing Errors ==========
    /// Period close rejected.
    #[error("Closing conflict: {0}")]
    ClosingConflict(String),

    /// Invalid period status change.
    #[error("Invalid period transition from {from} to {to}")]
    InvalidPeriodTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    // ========== Consistency Errors ==========
    /// Cached balance disagrees with the ledger.
    #[error("Balance drift on account {account_id}: cached {cached}, ledger {actual}")]
    ConsistencyDrift {
        /// Affected account.
        account_id: AccountId,
        /// Cached balance.
        cached: Decimal,
        /// Balance recomputed from the ledger.
        actual: Decimal,
    },

    // ========== Storage Errors ==========
    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Returns the error class.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientLines
            | Self::UnbalancedEntry { .. }
            | Self::ZeroAmount
            | Self::NegativeAmount
            | Self::InvalidLineAmounts
            | Self::AmountPrecision { .. }
            | Self::EmptySourceId
            | Self::ReservedSourceKind(_)
            | Self::PeriodClosed { .. }
            | Self::InvalidPeriodRange { .. }
            | Self::AccountInactive(_)
            | Self::HeaderAccount(_)
            | Self::DuplicateAccountCode(_)
            | Self::InvalidAccount(_)
            | Self::RetainedEarnings { .. }
            | Self::AlreadyReversed(_)
            | Self::EntryNotPosted(_)
            | Self::InvalidPeriodTransition { .. } => ErrorKind::Validation,
            Self::DuplicateSource { .. } => ErrorKind::DuplicateSource,
            Self::ConsistencyDrift { .. } => ErrorKind::ConsistencyDrift,
            Self::ClosingConflict(_) => ErrorKind::ClosingConflict,
            Self::AccountNotFound(_) | Self::EntryNotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientLines => "INSUFFICIENT_LINES",
            Self::UnbalancedEntry { .. } => "UNBALANCED_ENTRY",
            Self::ZeroAmount => "ZERO_AMOUNT",
            Self::NegativeAmount => "NEGATIVE_AMOUNT",
            Self::InvalidLineAmounts => "INVALID_LINE_AMOUNTS",
            Self::AmountPrecision { .. } => "AMOUNT_PRECISION",
            Self::EmptySourceId => "EMPTY_SOURCE_ID",
            Self::ReservedSourceKind(_) => "RESERVED_SOURCE_KIND",
            Self::PeriodClosed { .. } => "PERIOD_CLOSED",
            Self::InvalidPeriodRange { .. } => "INVALID_PERIOD_RANGE",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::AccountInactive(_) => "ACCOUNT_INACTIVE",
            Self::HeaderAccount(_) => "HEADER_ACCOUNT",
            Self::DuplicateAccountCode(_) => "DUPLICATE_ACCOUNT_CODE",
            Self::InvalidAccount(_) => "INVALID_ACCOUNT",
            Self::RetainedEarnings { .. } => "RETAINED_EARNINGS_UNAVAILABLE",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::DuplicateSource { .. } => "DUPLICATE_SOURCE",
            Self::AlreadyReversed(_) => "ALREADY_REVERSED",
            Self::EntryNotPosted(_) => "ENTRY_NOT_POSTED",
            Self::ClosingConflict(_) => "CLOSING_CONFLICT",
            Self::InvalidPeriodTransition { .. } => "INVALID_PERIOD_TRANSITION",
            Self::ConsistencyDrift { .. } => "CONSISTENCY_DRIFT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 404 Not Found
            Self::AccountNotFound(_) | Self::EntryNotFound(_) => 404,

            // 409 Conflict
            Self::DuplicateAccountCode(_)
            | Self::DuplicateSource { .. }
            | Self::AlreadyReversed(_)
            | Self::ClosingConflict(_) => 409,

            // 422 Unprocessable - configuration of the chart blocks the operation
            Self::RetainedEarnings { .. } => 422,

            // 500 Internal Server Error
            Self::ConsistencyDrift { .. } | Self::Storage(_) => 500,

            // 400 Bad Request - validation errors
            _ => 400,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::InsufficientLines.error_code(), "INSUFFICIENT_LINES");
        assert_eq!(
            LedgerError::UnbalancedEntry {
                debit: dec!(100.00),
                credit: dec!(50.00),
            }
            .error_code(),
            "UNBALANCED_ENTRY"
        );
        assert_eq!(LedgerError::ZeroAmount.error_code(), "ZERO_AMOUNT");
        assert_eq!(
            LedgerError::ClosingConflict(String::new()).error_code(),
            "CLOSING_CONFLICT"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(LedgerError::ZeroAmount.kind(), ErrorKind::Validation);
        assert_eq!(
            LedgerError::PeriodClosed {
                date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                closed_through: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            LedgerError::HeaderAccount(AccountId::new()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            LedgerError::DuplicateSource {
                existing: JournalEntryId::new()
            }
            .kind(),
            ErrorKind::DuplicateSource
        );
        assert_eq!(
            LedgerError::EntryNotFound(JournalEntryId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LedgerError::Storage("down".into()).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(LedgerError::InsufficientLines.http_status_code(), 400);
        assert_eq!(
            LedgerError::AccountNotFound(AccountId::new()).http_status_code(),
            404
        );
        assert_eq!(
            LedgerError::ClosingConflict(String::new()).http_status_code(),
            409
        );
        assert_eq!(
            LedgerError::Storage("test".to_string()).http_status_code(),
            500
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LedgerError::Storage("timeout".into()).is_retryable());
        assert!(!LedgerError::ClosingConflict("busy".into()).is_retryable());
        assert!(!LedgerError::InsufficientLines.is_retryable());
        assert!(!LedgerError::ZeroAmount.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::UnbalancedEntry {
            debit: Decimal::new(100_000_000, 2),
            credit: Decimal::new(90_000_000, 2),
        };
        assert_eq!(
            err.to_string(),
            "Journal entry is not balanced. Debit: 1000000.00, Credit: 900000.00"
        );
    }

    #[test]
    fn test_reserved_source_kind_is_validation() {
        let err = LedgerError::ReservedSourceKind(SourceKind::Closing);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.error_code(), "RESERVED_SOURCE_KIND");
        assert_eq!(err.http_status_code(), 400);
    }
}
