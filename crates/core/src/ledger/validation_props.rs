//! Property-based tests for draft validation rules.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::{AccountId, Currency};

use super::error::LedgerError;
use super::types::{DraftLine, JournalDraft, SourceKind, SourceRef};
use super::validation::{AccountInfo, ValidationRules, validate_draft};

/// Strategy to generate a valid positive amount (> 0).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    // Generate amounts from 0.01 to 1,000,000.00
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate amounts with sub-cent precision.
fn sub_cent_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64)
        .prop_filter("must not be a whole cent", |mills| mills % 10 != 0)
        .prop_map(|mills| Decimal::new(mills, 3))
}

fn make_draft(lines: Vec<DraftLine>) -> JournalDraft {
    JournalDraft {
        entry_date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        description: "Generated".to_string(),
        reference: None,
        source: SourceRef::new(SourceKind::Manual, "JV-1"),
        lines,
    }
}

fn active(id: AccountId) -> Option<AccountInfo> {
    Some(AccountInfo {
        id,
        is_active: true,
        is_header: false,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property 1.1: Drafts split into matching debit and credit halves validate.
    ///
    /// *For any* set of debit amounts mirrored by one credit of their sum,
    /// validation SHALL accept the draft and report equal totals.
    #[test]
    fn prop_balanced_drafts_accepted(
        amounts in prop::collection::vec(positive_amount(), 1..10),
    ) {
        let total: Decimal = amounts.iter().copied().sum();
        let mut lines: Vec<DraftLine> = amounts
            .iter()
            .map(|a| DraftLine::debit(AccountId::new(), *a))
            .collect();
        lines.push(DraftLine::credit(AccountId::new(), total));

        let totals = validate_draft(&make_draft(lines), ValidationRules::new(Currency::Usd), active);
        prop_assert!(totals.is_ok(), "expected balanced draft to pass: {:?}", totals);
        let totals = totals.unwrap();
        prop_assert_eq!(totals.debit, totals.credit);
        prop_assert_eq!(totals.debit, total);
    }

    /// Property 1.2: Any imbalance is rejected.
    ///
    /// *For any* draft whose credit differs from its debit, validation SHALL
    /// fail with `UnbalancedEntry` carrying both totals.
    #[test]
    fn prop_unbalanced_drafts_rejected(
        debit in positive_amount(),
        credit in positive_amount(),
    ) {
        prop_assume!(debit != credit);
        let lines = vec![
            DraftLine::debit(AccountId::new(), debit),
            DraftLine::credit(AccountId::new(), credit),
        ];

        let result = validate_draft(&make_draft(lines), ValidationRules::new(Currency::Usd), active);
        prop_assert!(
            matches!(result, Err(LedgerError::UnbalancedEntry { debit: d, credit: c }) if d == debit && c == credit),
            "expected unbalanced rejection, got: {:?}",
            result
        );
    }

    /// Property 1.3: Amounts finer than the minor unit are rejected.
    #[test]
    fn prop_sub_minor_unit_rejected(amount in sub_cent_amount()) {
        let lines = vec![
            DraftLine::debit(AccountId::new(), amount),
            DraftLine::credit(AccountId::new(), amount),
        ];

        let result = validate_draft(&make_draft(lines), ValidationRules::new(Currency::Usd), active);
        prop_assert!(
            matches!(result, Err(LedgerError::AmountPrecision { .. })),
            "expected precision rejection, got: {:?}",
            result
        );
    }

    /// Property 1.4: Non-positive amounts are rejected regardless of balance.
    #[test]
    fn prop_non_positive_rejected(amount in positive_amount()) {
        let negative = vec![
            DraftLine::debit(AccountId::new(), -amount),
            DraftLine::credit(AccountId::new(), -amount),
        ];
        let result = validate_draft(&make_draft(negative), ValidationRules::new(Currency::Usd), active);
        prop_assert!(matches!(result, Err(LedgerError::NegativeAmount)));

        let zero = vec![
            DraftLine::debit(AccountId::new(), Decimal::ZERO),
            DraftLine::credit(AccountId::new(), amount),
            DraftLine::debit(AccountId::new(), amount),
        ];
        let result = validate_draft(&make_draft(zero), ValidationRules::new(Currency::Usd), active);
        prop_assert!(matches!(result, Err(LedgerError::ZeroAmount)));
    }
}
