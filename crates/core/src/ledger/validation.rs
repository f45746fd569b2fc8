//! Draft validation rules.
//!
//! Pure functions: the caller supplies account lookups as a closure so the
//! rules run the same against the in-memory chart and in tests.

use rust_decimal::Decimal;
use tally_shared::types::{AccountId, Currency};

use super::error::LedgerError;
use super::types::{DraftTotals, JournalDraft};
use crate::account::{Account, Side};

/// Information about an account needed for validation.
#[derive(Debug, Clone, Copy)]
pub struct AccountInfo {
    /// The account ID.
    pub id: AccountId,
    /// Whether the account is active.
    pub is_active: bool,
    /// Whether the account is a header.
    pub is_header: bool,
}

impl From<&Account> for AccountInfo {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            is_active: account.is_active,
            is_header: account.is_header,
        }
    }
}

/// Rule switches for a validation run.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRules {
    /// Ledger currency; decides the allowed decimal places.
    pub currency: Currency,
    /// Closing entries may zero accounts that were deactivated during the period.
    pub allow_inactive_accounts: bool,
}

impl ValidationRules {
    /// Standard rules for the given currency.
    #[must_use]
    pub const fn new(currency: Currency) -> Self {
        Self {
            currency,
            allow_inactive_accounts: false,
        }
    }
}

/// Validates a draft before anything is written.
///
/// Checks, in order:
/// 1. At least 2 lines and a non-blank source id
/// 2. Every amount is positive and fits the currency's minor unit
/// 3. Every account exists, is not a header, and is active
/// 4. Debits equal credits
///
/// The closed-period rule needs the store and is checked separately.
///
/// # Errors
///
/// Returns the first `LedgerError` encountered.
pub fn validate_draft<A>(
    draft: &JournalDraft,
    rules: ValidationRules,
    account_lookup: A,
) -> Result<DraftTotals, LedgerError>
where
    A: Fn(AccountId) -> Option<AccountInfo>,
{
    if draft.lines.len() < 2 {
        return Err(LedgerError::InsufficientLines);
    }
    if draft.source.id.trim().is_empty() {
        return Err(LedgerError::EmptySourceId);
    }

    let mut debit = Decimal::ZERO;
    let mut credit = Decimal::ZERO;

    for line in &draft.lines {
        validate_amount(line.amount, rules.currency)?;

        let account = account_lookup(line.account_id)
            .ok_or(LedgerError::AccountNotFound(line.account_id))?;
        if account.is_header {
            return Err(LedgerError::HeaderAccount(account.id));
        }
        if !account.is_active && !rules.allow_inactive_accounts {
            return Err(LedgerError::AccountInactive(account.id));
        }

        match line.side {
            Side::Debit => debit += line.amount,
            Side::Credit => credit += line.amount,
        }
    }

    if debit != credit {
        return Err(LedgerError::UnbalancedEntry { debit, credit });
    }

    Ok(DraftTotals { debit, credit })
}

/// Validates a single line amount.
///
/// # Errors
///
/// Returns `ZeroAmount`, `NegativeAmount`, or `AmountPrecision`.
pub fn validate_amount(amount: Decimal, currency: Currency) -> Result<(), LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    if amount.is_sign_negative() {
        return Err(LedgerError::NegativeAmount);
    }
    if !currency.is_minor_unit_amount(amount) {
        return Err(LedgerError::AmountPrecision {
            amount,
            scale: currency.minor_units(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::{DraftLine, SourceKind, SourceRef};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn draft(lines: Vec<DraftLine>) -> JournalDraft {
        JournalDraft {
            entry_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: "Cash sale".to_string(),
            reference: None,
            source: SourceRef::new(SourceKind::Sale, "INV-001"),
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

    fn rules() -> ValidationRules {
        ValidationRules::new(Currency::Idr)
    }

    #[test]
    fn test_balanced_draft_passes() {
        let cash = AccountId::new();
        let sales = AccountId::new();
        let totals = validate_draft(
            &draft(vec![
                DraftLine::debit(cash, dec!(1000000)),
                DraftLine::credit(sales, dec!(1000000)),
            ]),
            rules(),
            active,
        )
        .unwrap();

        assert_eq!(totals.debit, dec!(1000000));
        assert_eq!(totals.credit, dec!(1000000));
    }

    #[test]
    fn test_unbalanced_draft_rejected() {
        let result = validate_draft(
            &draft(vec![
                DraftLine::debit(AccountId::new(), dec!(1000000)),
                DraftLine::credit(AccountId::new(), dec!(900000)),
            ]),
            rules(),
            active,
        );

        assert!(matches!(
            result,
            Err(LedgerError::UnbalancedEntry { debit, credit })
                if debit == dec!(1000000) && credit == dec!(900000)
        ));
    }

    #[test]
    fn test_single_line_rejected() {
        let result = validate_draft(
            &draft(vec![DraftLine::debit(AccountId::new(), dec!(10))]),
            rules(),
            active,
        );
        assert!(matches!(result, Err(LedgerError::InsufficientLines)));
    }

    #[test]
    fn test_blank_source_rejected() {
        let mut d = draft(vec![
            DraftLine::debit(AccountId::new(), dec!(10)),
            DraftLine::credit(AccountId::new(), dec!(10)),
        ]);
        d.source.id = "  ".to_string();
        assert!(matches!(
            validate_draft(&d, rules(), active),
            Err(LedgerError::EmptySourceId)
        ));
    }

    #[test]
    fn test_precision_beyond_minor_unit_rejected() {
        let result = validate_draft(
            &draft(vec![
                DraftLine::debit(AccountId::new(), dec!(10.005)),
                DraftLine::credit(AccountId::new(), dec!(10.005)),
            ]),
            rules(),
            active,
        );
        assert!(matches!(
            result,
            Err(LedgerError::AmountPrecision { scale: 2, .. })
        ));
    }

    #[test]
    fn test_header_and_inactive_accounts_rejected() {
        let header = AccountId::new();
        let inactive = AccountId::new();
        let ok = AccountId::new();
        let lookup = |id: AccountId| {
            Some(AccountInfo {
                id,
                is_active: id != inactive,
                is_header: id == header,
            })
        };

        let result = validate_draft(
            &draft(vec![
                DraftLine::debit(header, dec!(10)),
                DraftLine::credit(ok, dec!(10)),
            ]),
            rules(),
            lookup,
        );
        assert!(matches!(result, Err(LedgerError::HeaderAccount(id)) if id == header));

        let lines = vec![
            DraftLine::debit(inactive, dec!(10)),
            DraftLine::credit(ok, dec!(10)),
        ];
        assert!(matches!(
            validate_draft(&draft(lines.clone()), rules(), lookup),
            Err(LedgerError::AccountInactive(id)) if id == inactive
        ));

        let closing_rules = ValidationRules {
            allow_inactive_accounts: true,
            ..rules()
        };
        assert!(validate_draft(&draft(lines), closing_rules, lookup).is_ok());
    }

    #[test]
    fn test_unknown_account_rejected() {
        let missing = AccountId::new();
        let result = validate_draft(
            &draft(vec![
                DraftLine::debit(missing, dec!(10)),
                DraftLine::credit(AccountId::new(), dec!(10)),
            ]),
            rules(),
            |_| None,
        );
        assert!(matches!(result, Err(LedgerError::AccountNotFound(id)) if id == missing));
    }
}
