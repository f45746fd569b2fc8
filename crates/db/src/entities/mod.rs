//! `SeaORM` entities for the ledger tables.

pub mod accounting_periods;
pub mod accounts;
pub mod balance_snapshots;
pub mod journal_entries;
pub mod journal_lines;
