//! Balance projector: per-account running balances derived from the ledger.

pub mod locks;
pub mod projector;
pub mod rollup;
pub mod snapshot;

pub use locks::{AccountLockGuard, AccountLocks};
pub use projector::{AccountBalanceView, BalanceProjector, CachedBalance, Recomputed, Verification};
pub use rollup::rollup_totals;
pub use snapshot::{BalanceDelta, BalanceSnapshot, Freshness, compute_deltas};
