//! Closing entry construction.
//!
//! Each close zeroes the cumulative balance of every revenue and expense
//! account through the period end and moves net income into retained
//! earnings.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tally_shared::types::AccountId;

use crate::account::{AccountType, Side};
use crate::ledger::types::{DraftLine, JournalDraft, SourceKind, SourceRef};

/// Balance of a temporary account through the period end, on its normal side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporaryBalance {
    /// Account ID.
    pub account_id: AccountId,
    /// Revenue or expense.
    pub account_type: AccountType,
    /// Normal-side balance.
    pub balance: Decimal,
}

/// One line of the closing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClosingLine {
    /// Account ID.
    pub account_id: AccountId,
    /// Debit or credit.
    pub side: Side,
    /// Positive amount.
    pub amount: Decimal,
}

/// The closing entry of a period, before it is posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosingPlan {
    /// Sum of revenue balances.
    pub total_revenue: Decimal,
    /// Sum of expense balances.
    pub total_expense: Decimal,
    /// Revenue minus expense.
    pub net_income: Decimal,
    /// Lines zeroing each non-zero account, then the retained earnings line.
    pub lines: Vec<ClosingLine>,
}

impl ClosingPlan {
    /// Builds the plan from the temporary balances.
    ///
    /// - Revenue with balance `b > 0` is debited `b`; `b < 0` is credited `|b|`
    /// - Expense with balance `b > 0` is credited `b`; `b < 0` is debited `|b|`
    /// - Retained earnings is credited net income, debited a net loss, and
    ///   gets no line when net income is zero
    #[must_use]
    pub fn build(balances: &[TemporaryBalance], retained_earnings: AccountId) -> Self {
        let mut total_revenue = Decimal::ZERO;
        let mut total_expense = Decimal::ZERO;
        let mut lines = Vec::new();

        for temp in balances {
            match temp.account_type {
                AccountType::Revenue => total_revenue += temp.balance,
                AccountType::Expense => total_expense += temp.balance,
                _ => continue,
            }
            if temp.balance.is_zero() {
                continue;
            }
            // Zero the account by posting its balance on the opposite side.
            let normal = temp.account_type.normal_side();
            let side = if temp.balance.is_sign_positive() {
                normal.opposite()
            } else {
                normal
            };
            lines.push(ClosingLine {
                account_id: temp.account_id,
                side,
                amount: temp.balance.abs(),
            });
        }

        let net_income = total_revenue - total_expense;
        if !net_income.is_zero() {
            lines.push(ClosingLine {
                account_id: retained_earnings,
                side: if net_income.is_sign_positive() {
                    Side::Credit
                } else {
                    Side::Debit
                },
                amount: net_income.abs(),
            });
        }

        Self {
            total_revenue,
            total_expense,
            net_income,
            lines,
        }
    }

    /// Returns true if every temporary account is already zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Converts the plan into a draft dated on the period end.
    #[must_use]
    pub fn to_draft(&self, period_end: NaiveDate, description: &str) -> JournalDraft {
        JournalDraft {
            entry_date: period_end,
            description: description.to_string(),
            reference: Some(format!("CLOSE-{period_end}")),
            source: SourceRef::new(SourceKind::Closing, period_end.to_string()),
            lines: self
                .lines
                .iter()
                .map(|line| DraftLine {
                    account_id: line.account_id,
                    side: line.side,
                    amount: line.amount,
                    description: None,
                })
                .collect(),
        }
    }
}
