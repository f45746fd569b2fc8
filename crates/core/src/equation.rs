//! The accounting equation over ledger totals.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tally_shared::types::AccountId;

use crate::account::{AccountType, ChartOfAccounts};
use crate::store::LineTotals;

/// Per-type totals of the ledger, each on its normal side.
///
/// `Assets == Liabilities + Equity + Revenue - Expense` holds whenever every
/// posted entry balances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountingEquation {
    /// Total assets.
    pub assets: Decimal,
    /// Total liabilities.
    pub liabilities: Decimal,
    /// Total equity.
    pub equity: Decimal,
    /// Total revenue.
    pub revenue: Decimal,
    /// Total expense.
    pub expense: Decimal,
    /// Accounts with posted lines that are missing from the chart.
    pub unknown_accounts: usize,
}

impl AccountingEquation {
    /// Sums posted line totals by account type.
    #[must_use]
    pub fn from_totals(chart: &ChartOfAccounts, totals: &HashMap<AccountId, LineTotals>) -> Self {
        let mut equation = Self::default();
        for (account_id, line_totals) in totals {
            let Some(account) = chart.get(*account_id) else {
                equation.unknown_accounts += 1;
                continue;
            };
            let balance = line_totals.balance(account.normal_side());
            match account.account_type {
                AccountType::Asset => equation.assets += balance,
                AccountType::Liability => equation.liabilities += balance,
                AccountType::Equity => equation.equity += balance,
                AccountType::Revenue => equation.revenue += balance,
                AccountType::Expense => equation.expense += balance,
            }
        }
        equation
    }

    /// Assets minus the right-hand side; zero when the equation holds.
    #[must_use]
    pub fn difference(&self) -> Decimal {
        self.assets - (self.liabilities + self.equity + self.revenue - self.expense)
    }

    /// Returns true if the equation holds and every account is known.
    #[must_use]
    pub fn holds(&self) -> bool {
        self.unknown_accounts == 0 && self.difference().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, standard_chart};
    use rust_decimal_macros::dec;

    fn chart() -> ChartOfAccounts {
        let accounts: Vec<Account> = standard_chart();
        ChartOfAccounts::new(accounts)
    }

    fn totals(debit: Decimal, credit: Decimal) -> LineTotals {
        LineTotals {
            debit,
            credit,
            line_count: 1,
        }
    }

    #[test]
    fn test_balanced_ledger_holds() {
        let chart = chart();
        let cash = chart.by_code("1101").unwrap().id;
        let sales = chart.by_code("4101").unwrap().id;
        let cogs = chart.by_code("5101").unwrap().id;
        let inventory = chart.by_code("1301").unwrap().id;

        let mut map = HashMap::new();
        map.insert(cash, totals(dec!(1000), dec!(0)));
        map.insert(sales, totals(dec!(0), dec!(1000)));
        map.insert(cogs, totals(dec!(400), dec!(0)));
        map.insert(inventory, totals(dec!(0), dec!(400)));

        let equation = AccountingEquation::from_totals(&chart, &map);
        assert_eq!(equation.assets, dec!(600));
        assert_eq!(equation.revenue, dec!(1000));
        assert_eq!(equation.expense, dec!(400));
        assert!(equation.holds());
    }

    #[test]
    fn test_one_sided_totals_violate() {
        let chart = chart();
        let cash = chart.by_code("1101").unwrap().id;

        let mut map = HashMap::new();
        map.insert(cash, totals(dec!(50), dec!(0)));

        let equation = AccountingEquation::from_totals(&chart, &map);
        assert_eq!(equation.difference(), dec!(50));
        assert!(!equation.holds());
    }

    #[test]
    fn test_unknown_account_violates() {
        let chart = chart();
        let mut map = HashMap::new();
        map.insert(AccountId::new(), totals(dec!(0), dec!(0)));

        let equation = AccountingEquation::from_totals(&chart, &map);
        assert_eq!(equation.unknown_accounts, 1);
        assert!(!equation.holds());
    }
}
