//! Reconciler reports, alerts and status.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tally_shared::config::ReconcilerConfig;
use tally_shared::types::{AccountId, ReconcileRunId};

use crate::equation::AccountingEquation;

/// Reconciler tuning.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Whether the periodic job runs.
    pub enabled: bool,
    /// Time between scheduled runs.
    pub interval: Duration,
    /// Run once as soon as the job starts.
    pub run_on_startup: bool,
    /// Budget of a single run; unchecked accounts wait for the next run.
    pub max_execution: Duration,
    /// Drift magnitude above which alerts are raised as high severity.
    pub alert_threshold: Decimal,
}

impl From<&ReconcilerConfig> for ReconcilerSettings {
    fn from(config: &ReconcilerConfig) -> Self {
        Self {
            enabled: config.enabled,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            run_on_startup: config.run_on_startup,
            max_execution: Duration::from_secs(config.max_execution_secs),
            alert_threshold: config.alert_threshold,
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self::from(&ReconcilerConfig::default())
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunTrigger {
    /// Interval tick.
    Scheduled,
    /// Administrative request.
    Manual,
    /// First run after the job started.
    Startup,
}

/// Alert class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// A cached balance disagreed with the ledger and was repaired.
    BalanceDrift,
    /// Ledger totals violate the accounting equation.
    EquationViolation,
    /// The run itself failed.
    RunFailed,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    /// Drift within the alert threshold.
    Warning,
    /// Drift beyond the alert threshold.
    High,
    /// The ledger itself is inconsistent.
    Critical,
}

/// An observable reconciler finding.
#[derive(Debug, Clone, Serialize)]
pub struct DriftAlert {
    /// Alert class.
    pub kind: AlertKind,
    /// Severity.
    pub severity: AlertSeverity,
    /// Affected account, for balance drift.
    pub account_id: Option<AccountId>,
    /// Cached balance before the repair.
    pub cached_balance: Option<Decimal>,
    /// Balance derived from the ledger.
    pub actual_balance: Option<Decimal>,
    /// Human readable description.
    pub message: String,
    /// When the alert was raised.
    pub raised_at: DateTime<Utc>,
}

/// One repaired snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct AccountRepair {
    /// Account ID.
    pub account_id: AccountId,
    /// Balance before the repair.
    pub cached_balance: Decimal,
    /// Balance after the repair.
    pub actual_balance: Decimal,
    /// Cached line count before the repair.
    pub cached_line_count: u64,
    /// Posted line count.
    pub actual_line_count: u64,
}

impl AccountRepair {
    /// Actual minus cached balance.
    #[must_use]
    pub fn drift(&self) -> Decimal {
        self.actual_balance - self.cached_balance
    }
}

/// Result of one reconciler run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// Run ID.
    pub run_id: ReconcileRunId,
    /// What started the run.
    pub trigger: RunTrigger,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
    /// Leaf accounts checked.
    pub accounts_checked: usize,
    /// Snapshots rebuilt.
    pub repairs: Vec<AccountRepair>,
    /// Ledger totals by account type.
    pub equation: Option<AccountingEquation>,
    /// Whether the equation held.
    pub equation_holds: bool,
    /// The time budget ran out before every account was checked.
    pub truncated: bool,
    /// Alerts raised by this run.
    pub alerts: Vec<DriftAlert>,
}

impl ReconcileReport {
    /// Returns true if nothing needed repair and the equation held.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty() && self.equation_holds
    }

    /// Sum of absolute drift over every repair.
    #[must_use]
    pub fn total_drift(&self) -> Decimal {
        self.repairs.iter().map(|r| r.drift().abs()).sum()
    }
}

/// Reconciler status for the drift endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DriftStatus {
    /// A run is in flight.
    pub running: bool,
    /// When the last run finished.
    pub last_run_at: Option<DateTime<Utc>>,
    /// When the next scheduled run is due.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Report of the last completed run.
    pub last_report: Option<ReconcileReport>,
    /// Runs started.
    pub total_runs: u64,
    /// Runs completed.
    pub successful_runs: u64,
    /// Runs that failed.
    pub failed_runs: u64,
    /// Error of the last failed run.
    pub last_error: Option<String>,
}

/// Result of a trigger request.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// The run completed.
    Completed(Box<ReconcileReport>),
    /// Another run is in flight; nothing was started.
    AlreadyRunning(DriftStatus),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_settings_from_config() {
        let config = ReconcilerConfig {
            enabled: false,
            interval_secs: 0,
            run_on_startup: true,
            max_execution_secs: 5,
            alert_threshold: dec!(100),
        };
        let settings = ReconcilerSettings::from(&config);

        assert!(!settings.enabled);
        assert_eq!(settings.interval, Duration::from_secs(1));
        assert!(settings.run_on_startup);
        assert_eq!(settings.max_execution, Duration::from_secs(5));
        assert_eq!(settings.alert_threshold, dec!(100));
    }

    #[test]
    fn test_repair_drift() {
        let repair = AccountRepair {
            account_id: AccountId::new(),
            cached_balance: dec!(900),
            actual_balance: dec!(1000),
            cached_line_count: 1,
            actual_line_count: 2,
        };
        assert_eq!(repair.drift(), dec!(100));
    }

    #[test]
    fn test_severity_order() {
        assert!(AlertSeverity::Warning < AlertSeverity::High);
        assert!(AlertSeverity::High < AlertSeverity::Critical);
    }
}
