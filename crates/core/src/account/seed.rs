//! Standard chart of accounts.
//!
//! Used by the seeder binary and by tests. Codes follow the usual
//! 1xxx assets, 2xxx liabilities, 3xxx equity, 4xxx revenue, 5xxx expense
//! layout; retained earnings is `3201`.

use tally_shared::types::AccountId;

use super::types::{Account, AccountType};

/// A chart entry described by codes instead of ids.
#[derive(Debug, Clone, Copy)]
pub struct SeedAccount {
    /// Account code.
    pub code: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Classification.
    pub account_type: AccountType,
    /// Code of the parent header.
    pub parent_code: Option<&'static str>,
    /// Whether the account is a header.
    pub is_header: bool,
}

const fn header(
    code: &'static str,
    name: &'static str,
    account_type: AccountType,
    parent_code: Option<&'static str>,
) -> SeedAccount {
    SeedAccount {
        code,
        name,
        account_type,
        parent_code,
        is_header: true,
    }
}

const fn leaf(
    code: &'static str,
    name: &'static str,
    account_type: AccountType,
    parent_code: &'static str,
) -> SeedAccount {
    SeedAccount {
        code,
        name,
        account_type,
        parent_code: Some(parent_code),
        is_header: false,
    }
}

/// Standard chart, parents listed before their children.
pub const STANDARD_CHART: &[SeedAccount] = &[
    header("1000", "Assets", AccountType::Asset, None),
    header("1100", "Current Assets", AccountType::Asset, Some("1000")),
    leaf("1101", "Cash", AccountType::Asset, "1100"),
    leaf("1102", "Bank", AccountType::Asset, "1100"),
    leaf("1201", "Accounts Receivable", AccountType::Asset, "1100"),
    leaf("1301", "Inventory", AccountType::Asset, "1100"),
    header("1500", "Fixed Assets", AccountType::Asset, Some("1000")),
    leaf("1501", "Office Equipment", AccountType::Asset, "1500"),
    header("2000", "Liabilities", AccountType::Liability, None),
    header("2100", "Current Liabilities", AccountType::Liability, Some("2000")),
    leaf("2101", "Accounts Payable", AccountType::Liability, "2100"),
    leaf("2103", "VAT Out", AccountType::Liability, "2100"),
    header("3000", "Equity", AccountType::Equity, None),
    leaf("3101", "Owner Capital", AccountType::Equity, "3000"),
    leaf("3201", "Retained Earnings", AccountType::Equity, "3000"),
    header("4000", "Revenue", AccountType::Revenue, None),
    leaf("4101", "Sales Revenue", AccountType::Revenue, "4000"),
    leaf("4201", "Other Income", AccountType::Revenue, "4000"),
    header("5000", "Expenses", AccountType::Expense, None),
    leaf("5101", "Cost of Goods Sold", AccountType::Expense, "5000"),
    leaf("5201", "Salaries Expense", AccountType::Expense, "5000"),
    leaf("5202", "Electricity Expense", AccountType::Expense, "5000"),
    leaf("5900", "General Expense", AccountType::Expense, "5000"),
];

/// Materializes [`STANDARD_CHART`] with fresh ids.
#[must_use]
pub fn standard_chart() -> Vec<Account> {
    let mut accounts: Vec<Account> = Vec::with_capacity(STANDARD_CHART.len());
    for seed in STANDARD_CHART {
        let parent_id = seed.parent_code.and_then(|code| {
            accounts
                .iter()
                .find(|a| a.code == code)
                .map(|a| a.id)
        });
        accounts.push(Account {
            id: AccountId::new(),
            code: seed.code.to_string(),
            name: seed.name.to_string(),
            account_type: seed.account_type,
            parent_id,
            is_header: seed.is_header,
            is_active: true,
        });
    }
    accounts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parents_precede_children() {
        for (index, seed) in STANDARD_CHART.iter().enumerate() {
            if let Some(parent) = seed.parent_code {
                let position = STANDARD_CHART.iter().position(|s| s.code == parent);
                assert!(position.is_some_and(|p| p < index), "{} before {}", parent, seed.code);
            }
        }
    }

    #[test]
    fn test_parents_are_headers_of_same_type() {
        let accounts = standard_chart();
        for account in &accounts {
            if let Some(parent_id) = account.parent_id {
                let parent = accounts.iter().find(|a| a.id == parent_id).unwrap();
                assert!(parent.is_header);
                assert_eq!(parent.account_type, account.account_type);
            }
        }
    }

    #[test]
    fn test_retained_earnings_is_equity_leaf() {
        let accounts = standard_chart();
        let retained = accounts.iter().find(|a| a.code == "3201").unwrap();
        assert_eq!(retained.account_type, AccountType::Equity);
        assert!(!retained.is_header);
    }
}
