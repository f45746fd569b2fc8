//! Double-entry ledger: journal entries, validation and the posting engine.
//!
//! - Journal entry domain types
//! - Error types for ledger operations
//! - Draft validation rules
//! - Closed-period rule
//! - Reversing entries
//! - Posting engine

pub mod error;
pub mod fiscal;
pub mod posting;
pub mod reversal;
pub mod types;
pub mod validation;

#[cfg(test)]
mod validation_props;

pub use error::{ErrorKind, LedgerError};
pub use fiscal::{ensure_period_open, period_allows_posting};
pub use posting::PostingEngine;
pub use reversal::build_reversal;
pub use types::{
    DraftLine, DraftTotals, EntryStatus, JournalDraft, JournalEntry, JournalLine, PostedEntry,
    PostingOutcome, ReverseRequest, SourceKind, SourceRef,
};
pub use validation::{AccountInfo, ValidationRules, validate_draft};
