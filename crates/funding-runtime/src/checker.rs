//! Checker - the per-cycle top-up decision
//!
//! One cycle: read balance, compare to threshold, submit, persist, confirm,
//! clear. The in-flight gate is held from the balance read until the cycle
//! ends, so concurrent cycles and reconciliation never overlap.
//!
//! While a submission stays persisted (timed out, or left behind by an
//! unresolved reconciliation) the Checker never submits. It keeps reading
//! the balance and re-runs reconciliation of that same submission every
//! `reconcile_every_cycles` cycles, or at once when the balance has risen
//! above the submission's baseline. A submission that could not be written
//! to the state file is written again on every such cycle.

use crate::confirmation::{ConfirmationConfig, ConfirmationEngine, ConfirmationStatus};
use crate::flight::FlightGate;
use crate::ops::{BridgeEvent, OpsState};
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::state_store::StateStore;
use l1_bridge::{BalanceReader, BridgeSubmitter};
use l1_integration::{Address, BridgeSubmission};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct CheckerConfig {
    /// Fee-paying contract whose L2 balance is kept topped up
    pub destination: Address,
    pub threshold: u128,
    pub top_up_amount: u128,
    pub confirmation: ConfirmationConfig,
    pub reconcile_every_cycles: u32,
}

/// How one `check_and_top_up` call ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Stopped,
    SkippedInFlight,
    BalanceUnavailable,
    AboveThreshold { balance: u128 },
    SubmissionFailed,
    Confirmed { delta: u128 },
    TimedOut,
    ConfirmationUnreadable,
    /// A persisted submission is waiting for its next reconciliation slot
    PendingDeferred,
    Reconciled(ReconcileOutcome),
    ReconcileFailed,
}

pub struct Checker {
    config: CheckerConfig,
    balances: Arc<dyn BalanceReader>,
    submitter: Arc<dyn BridgeSubmitter>,
    engine: Arc<ConfirmationEngine>,
    store: Arc<StateStore>,
    reconciler: Arc<Reconciler>,
    ops: Arc<OpsState>,
    gate: FlightGate,
    stopping: AtomicBool,
    pending: Mutex<Option<BridgeSubmission>>,
    /// The pending submission is only held in memory
    unpersisted: AtomicBool,
    cycles_since_pending: AtomicU32,
}

impl Checker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CheckerConfig,
        balances: Arc<dyn BalanceReader>,
        submitter: Arc<dyn BridgeSubmitter>,
        engine: Arc<ConfirmationEngine>,
        store: Arc<StateStore>,
        reconciler: Arc<Reconciler>,
        ops: Arc<OpsState>,
        gate: FlightGate,
    ) -> Self {
        Self {
            config,
            balances,
            submitter,
            engine,
            store,
            reconciler,
            ops,
            gate,
            stopping: AtomicBool::new(false),
            pending: Mutex::new(None),
            unpersisted: AtomicBool::new(false),
            cycles_since_pending: AtomicU32::new(0),
        }
    }

    /// Stop starting new work. An in-progress confirmation still finishes.
    pub fn request_stop(&self) {
        if !self.stopping.swap(true, Ordering::AcqRel) {
            tracing::info!("Checker stop requested");
        }
        self.ops.mark_shutting_down();
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Submission persisted but not yet confirmed, if any
    pub fn pending(&self) -> Option<BridgeSubmission> {
        *self.pending.lock()
    }

    /// Take over a submission that startup reconciliation left unresolved
    pub fn adopt_pending(&self, submission: BridgeSubmission) {
        *self.pending.lock() = Some(submission);
        self.cycles_since_pending.store(0, Ordering::Release);
        self.set_unpersisted(false);
        self.ops.set_bridge_pending(true);
    }

    fn set_unpersisted(&self, unpersisted: bool) {
        self.unpersisted.store(unpersisted, Ordering::Release);
        self.ops.set_state_unpersisted(unpersisted);
    }

    /// Write `submission` to the state file, tracking whether it is there
    fn persist(&self, submission: &BridgeSubmission) {
        match self.store.write(submission) {
            Ok(()) => {
                if self.unpersisted.load(Ordering::Acquire) {
                    tracing::info!(message_hash = %submission.claim.message_hash, "Bridge submission persisted");
                }
                self.set_unpersisted(false);
            }
            Err(e) => {
                // The deposit is already on L1; keep tracking it in memory.
                tracing::error!(path = %self.store.path().display(), "Failed to persist bridge submission: {}", e);
                self.set_unpersisted(true);
            }
        }
    }

    fn clear_pending(&self) {
        *self.pending.lock() = None;
        self.set_unpersisted(false);
        self.ops.set_bridge_pending(false);
    }

    /// Run one cycle. Never fails: every error is logged, counted and
    /// reported through the outcome.
    pub async fn check_and_top_up(&self) -> CycleOutcome {
        if self.is_stopping() {
            return CycleOutcome::Stopped;
        }
        let Some(permit) = self.gate.try_acquire() else {
            tracing::debug!("Bridge in flight, skipping cycle");
            return CycleOutcome::SkippedInFlight;
        };

        let balance = match self.balances.get_balance(&self.config.destination).await {
            Ok(balance) => {
                self.ops.record_balance_check_ok(balance);
                balance
            }
            Err(e) => {
                self.ops.record_balance_check_failed();
                tracing::warn!("Balance check failed: {}", e);
                return CycleOutcome::BalanceUnavailable;
            }
        };

        let pending = *self.pending.lock();
        if let Some(submission) = pending {
            if self.unpersisted.load(Ordering::Acquire) {
                self.persist(&submission);
            }
            let cycles = self.cycles_since_pending.fetch_add(1, Ordering::AcqRel) + 1;
            let risen = balance > submission.baseline_balance;
            if (cycles < self.config.reconcile_every_cycles.max(1) && !risen) || self.is_stopping() {
                tracing::info!(
                    balance = %balance,
                    message_hash = %submission.claim.message_hash,
                    cycles,
                    "Persisted bridge unresolved, not submitting"
                );
                return CycleOutcome::PendingDeferred;
            }
            self.cycles_since_pending.store(0, Ordering::Release);
            if risen {
                tracing::info!(
                    balance = %balance,
                    baseline = %submission.baseline_balance,
                    "Balance above bridge baseline, reconciling now"
                );
            }

            return match self.reconciler.resume(&permit, &submission, None).await {
                Ok(outcome) => {
                    if outcome == ReconcileOutcome::Confirmed {
                        self.clear_pending();
                    }
                    CycleOutcome::Reconciled(outcome)
                }
                Err(e) => {
                    tracing::error!("In-process reconciliation failed: {}", e);
                    CycleOutcome::ReconcileFailed
                }
            };
        }

        if balance >= self.config.threshold {
            tracing::debug!(balance = %balance, threshold = %self.config.threshold, "Balance above threshold");
            return CycleOutcome::AboveThreshold { balance };
        }
        // Re-checked after the read: a stop requested meanwhile wins.
        if self.is_stopping() {
            return CycleOutcome::Stopped;
        }

        tracing::info!(
            balance = %balance,
            threshold = %self.config.threshold,
            amount = %self.config.top_up_amount,
            "Balance below threshold, bridging"
        );

        let deposit = match self
            .submitter
            .submit(&self.config.destination, self.config.top_up_amount)
            .await
        {
            Ok(deposit) => deposit,
            Err(e) => {
                self.ops.record_bridge_event(BridgeEvent::Failed);
                tracing::error!(event = "failed", "Bridge submission failed: {}", e);
                return CycleOutcome::SubmissionFailed;
            }
        };

        let submission = BridgeSubmission::from_deposit(balance, &deposit, now_ms());
        *self.pending.lock() = Some(submission);
        self.cycles_since_pending.store(0, Ordering::Release);
        self.persist(&submission);
        self.ops.set_bridge_pending(true);
        self.ops.record_bridge_event(BridgeEvent::Submitted);

        tracing::info!(
            event = "submitted",
            baseline = %submission.baseline_balance,
            amount = %submission.amount,
            message_hash = %submission.claim.message_hash,
            leaf_index = submission.claim.message_leaf_index,
            l1_tx = ?deposit.l1_tx_hash,
            "Bridge submitted"
        );

        let result = match self
            .engine
            .confirm(balance, &submission.claim, &self.config.confirmation, None)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.ops.record_bridge_event(BridgeEvent::Failed);
                tracing::error!(event = "failed", "Bridge confirmation unreadable, state kept: {}", e);
                return CycleOutcome::ConfirmationUnreadable;
            }
        };

        match result.status {
            ConfirmationStatus::Confirmed => {
                if let Err(e) = self.store.clear() {
                    tracing::error!("Failed to clear persisted bridge: {}", e);
                }
                self.clear_pending();
                self.ops.record_bridge_event(BridgeEvent::Confirmed);
                tracing::info!(
                    event = "confirmed",
                    delta = %result.observed_delta,
                    attempts = result.attempts,
                    poll_errors = result.poll_errors,
                    elapsed_ms = result.elapsed_ms,
                    message_ready = result.message_ready,
                    "Bridge confirmed"
                );
                CycleOutcome::Confirmed {
                    delta: result.observed_delta,
                }
            }
            // Unreachable without an abort signal; treated like a timeout.
            ConfirmationStatus::Timeout | ConfirmationStatus::Aborted => {
                self.ops.record_bridge_event(BridgeEvent::Timeout);
                tracing::warn!(
                    event = "timeout",
                    delta = %result.observed_delta,
                    attempts = result.attempts,
                    poll_errors = result.poll_errors,
                    elapsed_ms = result.elapsed_ms,
                    "Bridge not confirmed in time, state kept for reconciliation"
                );
                CycleOutcome::TimedOut
            }
        }
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::Shutdown;
    use crate::tests::fakes::ScriptedBalances;
    use l1_bridge::BridgeError;
    use l1_integration::{BridgeDeposit, ClaimSecret};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Counts submissions; fails while `failures` is non-zero
    struct CountingSubmitter {
        submitted: Mutex<u32>,
        failures: Mutex<u32>,
    }

    impl CountingSubmitter {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                submitted: Mutex::new(0),
                failures: Mutex::new(failures),
            })
        }

        fn submitted(&self) -> u32 {
            *self.submitted.lock()
        }
    }

    #[async_trait::async_trait]
    impl BridgeSubmitter for CountingSubmitter {
        async fn submit(&self, _destination: &Address, amount: u128) -> Result<BridgeDeposit, BridgeError> {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(BridgeError::BridgeSubmissionFailed("reverted".into()));
            }
            let mut submitted = self.submitted.lock();
            *submitted += 1;
            Ok(BridgeDeposit {
                claim: crate::tests::fakes::claim(*submitted as u8),
                claim_secret: ClaimSecret::new([7u8; 32]),
                amount,
                l1_tx_hash: None,
            })
        }
    }

    struct Harness {
        dir: TempDir,
        store: Arc<StateStore>,
        ops: Arc<OpsState>,
        submitter: Arc<CountingSubmitter>,
        checker: Checker,
    }

    fn harness(balances: Arc<ScriptedBalances>, failures: u32) -> Harness {
        harness_at(balances, failures, "state.json")
    }

    fn harness_at(balances: Arc<ScriptedBalances>, failures: u32, state_file: &str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path().join(state_file)));
        let ops = Arc::new(OpsState::new(Duration::from_secs(60)).unwrap());
        let destination = Address::new([1u8; 32]);
        let confirmation = ConfirmationConfig {
            timeout: Duration::from_secs(30),
            initial_poll: Duration::from_secs(2),
            max_poll: Duration::from_secs(15),
        };
        let engine = Arc::new(ConfirmationEngine::new(destination, balances.clone(), None, ops.clone()));
        let gate = FlightGate::new();
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            engine.clone(),
            confirmation,
            ops.clone(),
            gate.clone(),
            Shutdown::new(),
        ));
        let submitter = CountingSubmitter::new(failures);
        let checker = Checker::new(
            CheckerConfig {
                destination,
                threshold: 1000,
                top_up_amount: 2000,
                confirmation,
                reconcile_every_cycles: 3,
            },
            balances,
            submitter.clone(),
            engine,
            store.clone(),
            reconciler,
            ops.clone(),
            gate,
        );
        Harness {
            dir,
            store,
            ops,
            submitter,
            checker,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_above_threshold_does_nothing() {
        let h = harness(ScriptedBalances::new(vec![Ok(1000)]), 0);
        assert_eq!(
            h.checker.check_and_top_up().await,
            CycleOutcome::AboveThreshold { balance: 1000 }
        );
        assert_eq!(h.submitter.submitted(), 0);
        assert!(h.ops.readiness().ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_failure_ends_cycle() {
        let h = harness(
            ScriptedBalances::new(vec![Err(BridgeError::BalanceUnavailable("down".into())), Ok(5000)]),
            0,
        );
        assert_eq!(h.checker.check_and_top_up().await, CycleOutcome::BalanceUnavailable);
        assert_eq!(h.submitter.submitted(), 0);
        assert!(!h.ops.readiness().ready);

        assert_eq!(
            h.checker.check_and_top_up().await,
            CycleOutcome::AboveThreshold { balance: 5000 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_persists_nothing() {
        let h = harness(ScriptedBalances::new(vec![Ok(500)]), 1);
        assert_eq!(h.checker.check_and_top_up().await, CycleOutcome::SubmissionFailed);
        assert!(h.store.read().unwrap().is_none());
        assert!(h.checker.pending().is_none());
        assert_eq!(h.ops.bridge_event_count(BridgeEvent::Failed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_new_work() {
        let h = harness(ScriptedBalances::new(vec![Ok(500)]), 0);
        h.checker.request_stop();
        assert_eq!(h.checker.check_and_top_up().await, CycleOutcome::Stopped);
        assert_eq!(h.submitter.submitted(), 0);
        assert_eq!(h.ops.readiness().reasons[0].code, "shutting_down");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_state_and_blocks_resubmission() {
        let h = harness(ScriptedBalances::new(vec![Ok(500)]), 0);
        assert_eq!(h.checker.check_and_top_up().await, CycleOutcome::TimedOut);

        let persisted = h.store.read().unwrap().unwrap();
        assert_eq!(persisted.baseline_balance, 500);
        assert_eq!(h.checker.pending(), Some(persisted));

        // Two deferred cycles, then an in-process reconciliation.
        assert_eq!(h.checker.check_and_top_up().await, CycleOutcome::PendingDeferred);
        assert_eq!(h.checker.check_and_top_up().await, CycleOutcome::PendingDeferred);
        assert_eq!(
            h.checker.check_and_top_up().await,
            CycleOutcome::Reconciled(ReconcileOutcome::Timeout)
        );
        assert_eq!(h.submitter.submitted(), 1);
        assert_eq!(h.store.read().unwrap(), Some(persisted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_risen_balance_reconciles_without_waiting() {
        let balances = ScriptedBalances::new(vec![Ok(500)]);
        let h = harness(balances.clone(), 0);
        assert_eq!(h.checker.check_and_top_up().await, CycleOutcome::TimedOut);

        // The bridge lands between cycles.
        balances.set(2500);
        assert_eq!(
            h.checker.check_and_top_up().await,
            CycleOutcome::Reconciled(ReconcileOutcome::Confirmed)
        );
        assert!(h.store.read().unwrap().is_none());
        assert!(h.checker.pending().is_none());
        assert_eq!(h.submitter.submitted(), 1);
        assert!(!h.ops.readiness().bridge_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_persist_is_retried_on_pending_cycles() {
        let h = harness_at(ScriptedBalances::new(vec![Ok(500)]), 0, "blocked/state.json");
        // A plain file where the state directory should be.
        let blocker = h.dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();

        assert_eq!(h.checker.check_and_top_up().await, CycleOutcome::TimedOut);
        let snapshot = h.ops.readiness();
        assert!(!snapshot.ready);
        assert_eq!(snapshot.reasons[0].code, "state_not_persisted");

        // Still failing: the next cycle tries again and stays unready.
        assert_eq!(h.checker.check_and_top_up().await, CycleOutcome::PendingDeferred);
        assert!(!h.ops.readiness().ready);

        std::fs::remove_file(&blocker).unwrap();
        assert_eq!(h.checker.check_and_top_up().await, CycleOutcome::PendingDeferred);
        assert_eq!(h.store.read().unwrap(), h.checker.pending());
        assert!(h.ops.readiness().ready);
        assert_eq!(h.submitter.submitted(), 1);
    }
}
