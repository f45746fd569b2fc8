//! Journal entry domain types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, JournalEntryId, JournalLineId};

use super::error::LedgerError;
use crate::account::Side;

/// Lifecycle status of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    /// Not yet posted. Never persisted by the ledger itself.
    Draft,
    /// Posted and counted in balances.
    Posted,
    /// Posted, then offset by a reversing entry. Its lines still count.
    Reversed,
}

impl EntryStatus {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Posted => "POSTED",
            Self::Reversed => "REVERSED",
        }
    }

    /// Returns true if the entry's lines are part of the ledger.
    #[must_use]
    pub const fn counts_in_balances(self) -> bool {
        matches!(self, Self::Posted | Self::Reversed)
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "POSTED" => Ok(Self::Posted),
            "REVERSED" => Ok(Self::Reversed),
            _ => Err(format!("Unknown entry status: {s}")),
        }
    }
}

/// Business event that produced a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    /// Sales invoice.
    Sale,
    /// Purchase invoice.
    Purchase,
    /// Customer or supplier payment.
    Payment,
    /// Cash or bank transaction.
    CashBank,
    /// Expense claim.
    Expense,
    /// Fixed asset event.
    Asset,
    /// Manual journal.
    Manual,
    /// Adjusting journal.
    Adjustment,
    /// Opening balances.
    OpeningBalance,
    /// Reversal of another entry. The source id is the reversed entry id.
    Reversal,
    /// Period closing entry. The source id is the period end date.
    Closing,
}

impl SourceKind {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "SALE",
            Self::Purchase => "PURCHASE",
            Self::Payment => "PAYMENT",
            Self::CashBank => "CASH_BANK",
            Self::Expense => "EXPENSE",
            Self::Asset => "ASSET",
            Self::Manual => "MANUAL",
            Self::Adjustment => "ADJUSTMENT",
            Self::OpeningBalance => "OPENING_BALANCE",
            Self::Reversal => "REVERSAL",
            Self::Closing => "CLOSING",
        }
    }

    /// True for kinds written only by the ledger itself: reversals and
    /// closing entries.
    #[must_use]
    pub const fn is_system(self) -> bool {
        matches!(self, Self::Reversal | Self::Closing)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SALE" => Ok(Self::Sale),
            "PURCHASE" => Ok(Self::Purchase),
            "PAYMENT" => Ok(Self::Payment),
            "CASH_BANK" => Ok(Self::CashBank),
            "EXPENSE" => Ok(Self::Expense),
            "ASSET" => Ok(Self::Asset),
            "MANUAL" => Ok(Self::Manual),
            "ADJUSTMENT" => Ok(Self::Adjustment),
            "OPENING_BALANCE" => Ok(Self::OpeningBalance),
            "REVERSAL" => Ok(Self::Reversal),
            "CLOSING" => Ok(Self::Closing),
            _ => Err(format!("Unknown source kind: {s}")),
        }
    }
}

/// Stable reference to the business event behind an entry.
///
/// At most one entry exists per source; resubmitting a source replays the
/// existing entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Source kind.
    pub kind: SourceKind,
    /// Opaque id within the kind.
    pub id: String,
}

impl SourceRef {
    /// Creates a source reference.
    pub fn new(kind: SourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A line of a draft entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLine {
    /// Target account.
    pub account_id: AccountId,
    /// Debit or credit.
    pub side: Side,
    /// Positive amount.
    pub amount: Decimal,
    /// Optional line memo.
    pub description: Option<String>,
}

impl DraftLine {
    /// Creates a debit line.
    #[must_use]
    pub fn debit(account_id: AccountId, amount: Decimal) -> Self {
        Self {
            account_id,
            side: Side::Debit,
            amount,
            description: None,
        }
    }

    /// Creates a credit line.
    #[must_use]
    pub fn credit(account_id: AccountId, amount: Decimal) -> Self {
        Self {
            account_id,
            side: Side::Credit,
            amount,
            description: None,
        }
    }

    /// Sets the line memo.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builds a line from a debit/credit amount pair.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidLineAmounts` unless exactly one amount is
    /// non-zero, and `LedgerError::NegativeAmount` for negative amounts.
    pub fn from_amounts(
        account_id: AccountId,
        debit: Decimal,
        credit: Decimal,
    ) -> Result<Self, LedgerError> {
        if debit < Decimal::ZERO || credit < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount);
        }
        match (debit.is_zero(), credit.is_zero()) {
            (false, true) => Ok(Self::debit(account_id, debit)),
            (true, false) => Ok(Self::credit(account_id, credit)),
            _ => Err(LedgerError::InvalidLineAmounts),
        }
    }

    /// Debit amount, zero for credit lines.
    #[must_use]
    pub fn debit_amount(&self) -> Decimal {
        match self.side {
            Side::Debit => self.amount,
            Side::Credit => Decimal::ZERO,
        }
    }

    /// Credit amount, zero for debit lines.
    #[must_use]
    pub fn credit_amount(&self) -> Decimal {
        match self.side {
            Side::Debit => Decimal::ZERO,
            Side::Credit => self.amount,
        }
    }
}

/// A journal entry submitted for posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDraft {
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Description.
    pub description: String,
    /// Optional external reference (invoice number, etc).
    pub reference: Option<String>,
    /// Business event behind the entry.
    pub source: SourceRef,
    /// Ordered lines.
    pub lines: Vec<DraftLine>,
}

/// Debit and credit totals of a validated draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftTotals {
    /// Sum of debit lines.
    pub debit: Decimal,
    /// Sum of credit lines.
    pub credit: Decimal,
}

/// A posted journal entry header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Entry ID.
    pub id: JournalEntryId,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Description.
    pub description: String,
    /// Optional external reference.
    pub reference: Option<String>,
    /// Business event behind the entry.
    pub source: SourceRef,
    /// Lifecycle status.
    pub status: EntryStatus,
    /// Sum of debits.
    pub total_debit: Decimal,
    /// Sum of credits. Always equal to `total_debit` once posted.
    pub total_credit: Decimal,
    /// Entry this one reverses.
    pub reverses: Option<JournalEntryId>,
    /// Entry that reversed this one.
    pub reversed_by: Option<JournalEntryId>,
    /// When the entry was posted.
    pub posted_at: Option<DateTime<Utc>>,
}

/// A posted journal line. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Line ID.
    pub id: JournalLineId,
    /// Owning entry.
    pub entry_id: JournalEntryId,
    /// Target account.
    pub account_id: AccountId,
    /// Debit amount, zero for credit lines.
    pub debit_amount: Decimal,
    /// Credit amount, zero for debit lines.
    pub credit_amount: Decimal,
    /// 1-based position within the entry.
    pub line_number: i32,
    /// Optional line memo.
    pub description: Option<String>,
}

impl JournalLine {
    /// Side of the line.
    #[must_use]
    pub fn side(&self) -> Side {
        if self.debit_amount.is_zero() {
            Side::Credit
        } else {
            Side::Debit
        }
    }

    /// The non-zero amount.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.debit_amount + self.credit_amount
    }
}

/// An entry together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedEntry {
    /// Entry header.
    pub entry: JournalEntry,
    /// Lines ordered by line number.
    pub lines: Vec<JournalLine>,
}

/// Result of a posting or reversal.
#[derive(Debug, Clone)]
pub struct PostingOutcome {
    /// The posted entry.
    pub entry: PostedEntry,
    /// True when the source had already been posted and nothing was written.
    pub replayed: bool,
    /// Non-fatal problems, such as a failed balance cache update.
    pub warnings: Vec<String>,
}

impl PostingOutcome {
    /// Outcome for a source that was already posted.
    #[must_use]
    pub fn replayed(entry: PostedEntry) -> Self {
        Self {
            entry,
            replayed: true,
            warnings: Vec::new(),
        }
    }
}

/// Options for reversing an entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReverseRequest {
    /// Why the entry is reversed.
    pub reason: Option<String>,
    /// Date of the reversing entry. Defaults to the original entry date.
    pub reversal_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_from_amounts_picks_side() {
        let account = AccountId::new();
        let line = DraftLine::from_amounts(account, dec!(100), dec!(0)).unwrap();
        assert_eq!(line.side, Side::Debit);
        assert_eq!(line.debit_amount(), dec!(100));
        assert_eq!(line.credit_amount(), dec!(0));

        let line = DraftLine::from_amounts(account, dec!(0), dec!(40)).unwrap();
        assert_eq!(line.side, Side::Credit);
    }

    #[test]
    fn test_from_amounts_rejects_both_or_neither() {
        let account = AccountId::new();
        assert!(matches!(
            DraftLine::from_amounts(account, dec!(10), dec!(10)),
            Err(LedgerError::InvalidLineAmounts)
        ));
        assert!(matches!(
            DraftLine::from_amounts(account, dec!(0), dec!(0)),
            Err(LedgerError::InvalidLineAmounts)
        ));
        assert!(matches!(
            DraftLine::from_amounts(account, dec!(-5), dec!(0)),
            Err(LedgerError::NegativeAmount)
        ));
    }

    #[test]
    fn test_source_kind_round_trip() {
        for kind in [
            SourceKind::Sale,
            SourceKind::CashBank,
            SourceKind::OpeningBalance,
            SourceKind::Closing,
        ] {
            assert_eq!(SourceKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert_eq!(
            serde_json::to_string(&SourceKind::CashBank).unwrap(),
            "\"CASH_BANK\""
        );
    }

    #[test]
    fn test_status_counts_in_balances() {
        assert!(!EntryStatus::Draft.counts_in_balances());
        assert!(EntryStatus::Posted.counts_in_balances());
        assert!(EntryStatus::Reversed.counts_in_balances());
    }

    #[test]
    fn test_line_side_and_amount() {
        let line = JournalLine {
            id: JournalLineId::new(),
            entry_id: JournalEntryId::new(),
            account_id: AccountId::new(),
            debit_amount: dec!(0),
            credit_amount: dec!(25.50),
            line_number: 2,
            description: None,
        };
        assert_eq!(line.side(), Side::Credit);
        assert_eq!(line.amount(), dec!(25.50));
    }
}
