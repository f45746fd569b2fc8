//! Account directory: hierarchical chart of accounts.

pub mod chart;
pub mod directory;
pub mod seed;
pub mod types;

pub use chart::ChartOfAccounts;
pub use directory::AccountDirectory;
pub use seed::{STANDARD_CHART, SeedAccount, standard_chart};
pub use types::{Account, AccountType, NewAccount, Side};
