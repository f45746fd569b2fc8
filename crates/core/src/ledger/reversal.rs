//! Creation of reversing entries.
//!
//! A reversal swaps every line's side and links back to the original. Its
//! source is `REVERSAL:<original id>`, so a second reversal request replays
//! the first instead of writing another entry.

use super::error::LedgerError;
use super::types::{
    DraftLine, EntryStatus, JournalDraft, PostedEntry, ReverseRequest, SourceKind, SourceRef,
};

/// Builds the reversing draft for a posted entry.
///
/// # Errors
///
/// Returns `LedgerError::AlreadyReversed` or `LedgerError::EntryNotPosted`
/// if the original cannot be reversed.
pub fn build_reversal(
    original: &PostedEntry,
    request: &ReverseRequest,
) -> Result<JournalDraft, LedgerError> {
    let entry = &original.entry;
    match entry.status {
        EntryStatus::Posted => {}
        EntryStatus::Reversed => return Err(LedgerError::AlreadyReversed(entry.id)),
        EntryStatus::Draft => return Err(LedgerError::EntryNotPosted(entry.id)),
    }

    let label = entry.reference.as_deref().unwrap_or(&entry.description);
    let description = match request.reason.as_deref() {
        Some(reason) if !reason.trim().is_empty() => format!("Reversal of {label}: {reason}"),
        _ => format!("Reversal of {label}"),
    };

    let lines = original
        .lines
        .iter()
        .map(|line| DraftLine {
            account_id: line.account_id,
            side: line.side().opposite(),
            amount: line.amount(),
            description: line.description.clone(),
        })
        .collect();

    Ok(JournalDraft {
        entry_date: request.reversal_date.unwrap_or(entry.entry_date),
        description,
        reference: entry.reference.clone(),
        source: SourceRef::new(SourceKind::Reversal, entry.id.to_string()),
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Side;
    use crate::ledger::types::{JournalEntry, JournalLine};
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tally_shared::types::{AccountId, JournalEntryId, JournalLineId};

    fn posted(status: EntryStatus) -> PostedEntry {
        let id = JournalEntryId::new();
        let line = |account_id, debit: Decimal, credit: Decimal, n| JournalLine {
            id: JournalLineId::new(),
            entry_id: id,
            account_id,
            debit_amount: debit,
            credit_amount: credit,
            line_number: n,
            description: Some(format!("line {n}")),
        };
        PostedEntry {
            entry: JournalEntry {
                id,
                entry_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
                description: "Cash sale".to_string(),
                reference: Some("INV-9".to_string()),
                source: SourceRef::new(SourceKind::Sale, "INV-9"),
                status,
                total_debit: dec!(500),
                total_credit: dec!(500),
                reverses: None,
                reversed_by: None,
                posted_at: Some(Utc::now()),
            },
            lines: vec![
                line(AccountId::new(), dec!(500), dec!(0), 1),
                line(AccountId::new(), dec!(0), dec!(500), 2),
            ],
        }
    }

    #[test]
    fn test_reversal_swaps_sides() {
        let original = posted(EntryStatus::Posted);
        let draft = build_reversal(&original, &ReverseRequest::default()).unwrap();

        assert_eq!(draft.lines.len(), 2);
        assert_eq!(draft.lines[0].side, Side::Credit);
        assert_eq!(draft.lines[0].account_id, original.lines[0].account_id);
        assert_eq!(draft.lines[1].side, Side::Debit);
        assert_eq!(draft.lines[1].amount, dec!(500));
        assert_eq!(draft.entry_date, original.entry.entry_date);
        assert_eq!(draft.source.kind, SourceKind::Reversal);
        assert_eq!(draft.source.id, original.entry.id.to_string());
        assert_eq!(draft.description, "Reversal of INV-9");
    }

    #[test]
    fn test_reversal_date_and_reason() {
        let original = posted(EntryStatus::Posted);
        let date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let draft = build_reversal(
            &original,
            &ReverseRequest {
                reason: Some("duplicate invoice".to_string()),
                reversal_date: Some(date),
            },
        )
        .unwrap();

        assert_eq!(draft.entry_date, date);
        assert_eq!(draft.description, "Reversal of INV-9: duplicate invoice");
    }

    #[test]
    fn test_reversed_entry_cannot_be_reversed_again() {
        let original = posted(EntryStatus::Reversed);
        assert!(matches!(
            build_reversal(&original, &ReverseRequest::default()),
            Err(LedgerError::AlreadyReversed(_))
        ));
    }
}
