//! Scheduler - startup reconciliation, then the periodic Checker loop

use crate::checker::Checker;
use crate::reconcile::{ReconcileError, Reconciler};
use crate::shutdown::Shutdown;
use crate::state_store::StateError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub struct Scheduler {
    checker: Arc<Checker>,
    reconciler: Arc<Reconciler>,
    check_interval: Duration,
    shutdown: Shutdown,
}

impl Scheduler {
    pub fn new(checker: Arc<Checker>, reconciler: Arc<Reconciler>, check_interval: Duration, shutdown: Shutdown) -> Self {
        Self {
            checker,
            reconciler,
            check_interval,
            shutdown,
        }
    }

    /// Run until shutdown.
    ///
    /// Only unusable persisted state is fatal: everything else is logged and
    /// retried by later cycles.
    pub async fn run(&self) -> Result<(), StateError> {
        match self.reconciler.reconcile().await {
            Ok(outcome) => tracing::info!(outcome = outcome.as_str(), "Startup reconciliation complete"),
            Err(ReconcileError::State(e)) => {
                tracing::error!("Persisted bridge state is unusable: {}", e);
                return Err(e);
            }
            Err(e) => tracing::warn!("Startup reconciliation unresolved: {}", e),
        }
        if let Some(submission) = self.reconciler.unresolved() {
            self.checker.adopt_pending(submission);
        }

        if self.shutdown.is_triggered() {
            self.checker.request_stop();
            return Ok(());
        }

        tracing::info!(interval_ms = self.check_interval.as_millis() as u64, "Starting balance checks");

        let stopper = async {
            self.shutdown.wait().await;
            self.checker.request_stop();
        };

        let ticking = async {
            let mut ticker = tokio::time::interval(self.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = self.shutdown.wait() => break,
                    _ = ticker.tick() => {
                        let outcome = self.checker.check_and_top_up().await;
                        tracing::debug!(?outcome, "Cycle finished");
                    }
                }
            }
        };

        tokio::join!(stopper, ticking);
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}
