//! Property-based tests for closing plans.

use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::AccountId;

use super::plan::{ClosingPlan, TemporaryBalance};
use crate::account::{AccountType, Side};

/// Strategy for a signed balance between -1,000,000.00 and 1,000,000.00.
fn signed_balance() -> impl Strategy<Value = Decimal> {
    (-100_000_000i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn temporary_balances() -> impl Strategy<Value = Vec<TemporaryBalance>> {
    prop::collection::vec(
        (
            prop_oneof![Just(AccountType::Revenue), Just(AccountType::Expense)],
            signed_balance(),
        ),
        0..12,
    )
    .prop_map(|items| {
        items
            .into_iter()
            .map(|(account_type, balance)| TemporaryBalance {
                account_id: AccountId::new(),
                account_type,
                balance,
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property 2.1: Closing entries always balance.
    ///
    /// *For any* set of temporary balances, the plan's debits SHALL equal its
    /// credits and every line amount SHALL be positive.
    #[test]
    fn prop_closing_plan_balances(balances in temporary_balances()) {
        let plan = ClosingPlan::build(&balances, AccountId::new());

        let debit: Decimal = plan.lines.iter().filter(|l| l.side == Side::Debit).map(|l| l.amount).sum();
        let credit: Decimal = plan.lines.iter().filter(|l| l.side == Side::Credit).map(|l| l.amount).sum();
        prop_assert_eq!(debit, credit);
        prop_assert!(plan.lines.iter().all(|l| l.amount > Decimal::ZERO));
        prop_assert!(plan.lines.is_empty() || plan.lines.len() >= 2);
    }

    /// Property 2.2: Applying the plan zeroes every temporary account.
    ///
    /// *For any* temporary balance, the closing line's normal-side effect
    /// SHALL be exactly the negated balance.
    #[test]
    fn prop_closing_plan_zeroes_accounts(balances in temporary_balances()) {
        let retained = AccountId::new();
        let plan = ClosingPlan::build(&balances, retained);

        for temp in &balances {
            let effect: Decimal = plan
                .lines
                .iter()
                .filter(|l| l.account_id == temp.account_id)
                .map(|l| {
                    let (debit, credit) = match l.side {
                        Side::Debit => (l.amount, Decimal::ZERO),
                        Side::Credit => (Decimal::ZERO, l.amount),
                    };
                    temp.account_type.normal_side().signed(debit, credit)
                })
                .sum();
            prop_assert_eq!(temp.balance + effect, Decimal::ZERO);
        }
    }

    /// Property 2.3: Retained earnings absorbs exactly the net income.
    #[test]
    fn prop_retained_earnings_gets_net_income(balances in temporary_balances()) {
        let retained = AccountId::new();
        let plan = ClosingPlan::build(&balances, retained);

        let change: Decimal = plan
            .lines
            .iter()
            .filter(|l| l.account_id == retained)
            .map(|l| match l.side {
                Side::Credit => l.amount,
                Side::Debit => -l.amount,
            })
            .sum();
        prop_assert_eq!(change, plan.net_income);
        prop_assert_eq!(plan.net_income, plan.total_revenue - plan.total_expense);
    }
}
