//! Periodic reconciler task.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::reconciler::Reconciler;
use super::types::{RunTrigger, TriggerOutcome};
use crate::store::LedgerStore;

/// Runs the reconciler on a fixed interval until cancelled.
///
/// Each run executes in its own task so a panic is logged and counted as a
/// failed run instead of stopping the schedule.
pub struct ReconcilerJob<S> {
    reconciler: Arc<Reconciler<S>>,
    interval: Duration,
    run_on_startup: bool,
}

impl<S: LedgerStore> ReconcilerJob<S> {
    /// Creates a job using the reconciler's settings.
    pub fn new(reconciler: Arc<Reconciler<S>>) -> Self {
        let settings = reconciler.settings();
        Self {
            interval: settings.interval,
            run_on_startup: settings.run_on_startup,
            reconciler,
        }
    }

    /// Spawns the job onto the runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            run_on_startup = self.run_on_startup,
            "Reconciler job started"
        );

        if self.run_on_startup {
            self.run_once(RunTrigger::Startup).await;
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            self.reconciler.set_next_run(
                TimeDelta::from_std(self.interval)
                    .ok()
                    .map(|delta| Utc::now() + delta),
            );

            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.run_once(RunTrigger::Scheduled).await,
            }
        }

        self.reconciler.set_next_run(None);
        info!("Reconciler job stopped");
    }

    async fn run_once(&self, trigger: RunTrigger) {
        let reconciler = Arc::clone(&self.reconciler);
        let run = tokio::spawn(async move { reconciler.trigger(trigger).await });

        match run.await {
            Ok(Ok(TriggerOutcome::Completed(report))) => {
                debug!(
                    run_id = %report.run_id,
                    repairs = report.repairs.len(),
                    total_drift = %report.total_drift(),
                    "Scheduled reconcile complete"
                );
            }
            Ok(Ok(TriggerOutcome::AlreadyRunning(_))) => {
                debug!(trigger = ?trigger, "Skipping tick; reconciler already running");
            }
            // Already logged and counted by the reconciler.
            Ok(Err(_)) => {}
            Err(e) => {
                error!(trigger = ?trigger, error = %e, "Reconciler run panicked");
                self.reconciler.record_failure(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountDirectory, STANDARD_CHART};
    use crate::balance::{AccountLocks, BalanceProjector};
    use crate::reconcile::ReconcilerSettings;
    use crate::store::MemoryLedgerStore;

    async fn reconciler(settings: ReconcilerSettings) -> Arc<Reconciler<MemoryLedgerStore>> {
        let store = Arc::new(MemoryLedgerStore::new());
        let directory = Arc::new(AccountDirectory::new(Arc::clone(&store)));
        directory.seed(STANDARD_CHART).await.unwrap();
        let locks = Arc::new(AccountLocks::new());
        let projector = Arc::new(BalanceProjector::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&locks),
        ));
        Arc::new(Reconciler::new(store, directory, projector, locks, settings))
    }

    #[tokio::test]
    async fn test_startup_run_then_shutdown() {
        let reconciler = reconciler(ReconcilerSettings {
            run_on_startup: true,
            interval: Duration::from_secs(3600),
            ..ReconcilerSettings::default()
        })
        .await;
        let shutdown = CancellationToken::new();
        let handle = ReconcilerJob::new(Arc::clone(&reconciler)).spawn(shutdown.clone());

        for _ in 0..100 {
            if reconciler.status().successful_runs > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let status = reconciler.status();
        assert_eq!(status.successful_runs, 1);
        assert!(status.last_report.is_some());

        shutdown.cancel();
        handle.await.unwrap();
        assert!(reconciler.status().next_run_at.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_job_never_runs() {
        let reconciler = reconciler(ReconcilerSettings::default()).await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        ReconcilerJob::new(Arc::clone(&reconciler))
            .run(shutdown)
            .await;
        assert_eq!(reconciler.status().total_runs, 0);
    }
}
