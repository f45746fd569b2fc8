//! Header rollups.
//!
//! A leaf's rollup total is its own balance. A header's rollup total is the
//! sum of its active children's rollup totals, recursively.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use tally_shared::types::AccountId;

use crate::account::ChartOfAccounts;

/// Computes the rollup total of every account in the chart.
///
/// Leaves missing from `leaf_balances` count as zero.
#[must_use]
pub fn rollup_totals(
    chart: &ChartOfAccounts,
    leaf_balances: &HashMap<AccountId, Decimal>,
) -> HashMap<AccountId, Decimal> {
    let mut totals = HashMap::with_capacity(chart.len());
    for account in chart.sorted() {
        let mut visiting = HashSet::new();
        total_of(chart, account.id, leaf_balances, &mut totals, &mut visiting);
    }
    totals
}

fn total_of(
    chart: &ChartOfAccounts,
    id: AccountId,
    leaf_balances: &HashMap<AccountId, Decimal>,
    totals: &mut HashMap<AccountId, Decimal>,
    visiting: &mut HashSet<AccountId>,
) -> Decimal {
    if let Some(total) = totals.get(&id) {
        return *total;
    }
    // A cycle in stored data contributes nothing instead of recursing forever.
    if !visiting.insert(id) {
        return Decimal::ZERO;
    }

    let total = match chart.get(id) {
        Some(account) if account.is_header => chart
            .active_children(id)
            .iter()
            .map(|child| total_of(chart, child.id, leaf_balances, totals, visiting))
            .sum(),
        Some(_) => leaf_balances.get(&id).copied().unwrap_or_default(),
        None => Decimal::ZERO,
    };

    visiting.remove(&id);
    totals.insert(id, total);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::standard_chart;
    use rust_decimal_macros::dec;

    #[test]
    fn test_headers_sum_active_children() {
        let mut chart = ChartOfAccounts::new(standard_chart());
        let cash = chart.by_code("1101").unwrap().id;
        let bank = chart.by_code("1102").unwrap().id;
        let equipment = chart.by_code("1501").unwrap().id;

        let balances = HashMap::from([
            (cash, dec!(100)),
            (bank, dec!(250)),
            (equipment, dec!(1000)),
        ]);
        let totals = rollup_totals(&chart, &balances);

        assert_eq!(totals[&chart.by_code("1100").unwrap().id], dec!(350));
        assert_eq!(totals[&chart.by_code("1500").unwrap().id], dec!(1000));
        assert_eq!(totals[&chart.by_code("1000").unwrap().id], dec!(1350));
        assert_eq!(totals[&chart.by_code("2000").unwrap().id], dec!(0));

        let mut inactive = chart.get(bank).unwrap().clone();
        inactive.is_active = false;
        chart.insert(inactive);
        let totals = rollup_totals(&chart, &balances);
        assert_eq!(totals[&chart.by_code("1100").unwrap().id], dec!(100));
        assert_eq!(totals[&bank], dec!(250));
    }
}
