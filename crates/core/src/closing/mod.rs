//! Period closing: moves revenue and expense into retained earnings and
//! locks the ledger through the period end.

pub mod engine;
pub mod period;
pub mod plan;

#[cfg(test)]
mod plan_props;

pub use engine::{ClosePeriodRequest, ClosingEngine, ClosingPreview, ClosingResult};
pub use period::{
    AccountingPeriod, LastClosing, PeriodDateInfo, PeriodStatus, check_close_order,
};
pub use plan::{ClosingLine, ClosingPlan, TemporaryBalance};
