//! Reconciliation Engine - resumes confirmation of a persisted bridge
//!
//! Runs once at startup before the Checker's first cycle, and again from
//! the Checker while a persisted bridge stays unresolved. It never submits.

use crate::confirmation::{ConfirmationConfig, ConfirmationEngine, ConfirmationError, ConfirmationStatus};
use crate::flight::{FlightGate, FlightPermit};
use crate::ops::{BridgeEvent, OpsState};
use crate::shutdown::Shutdown;
use crate::state_store::{StateError, StateStore};
use l1_integration::BridgeSubmission;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing was persisted
    None,
    /// The persisted bridge landed and the state was cleared
    Confirmed,
    /// Still pending; state kept for a later attempt
    Timeout,
    /// Shutdown interrupted the wait; state kept
    Aborted,
}

impl ReconcileOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcileOutcome::None => "none",
            ReconcileOutcome::Confirmed => "confirmed",
            ReconcileOutcome::Timeout => "timeout",
            ReconcileOutcome::Aborted => "aborted",
        }
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),

    #[error("a bridge is already in flight")]
    InFlight,
}

pub struct Reconciler {
    store: Arc<StateStore>,
    engine: Arc<ConfirmationEngine>,
    confirmation: ConfirmationConfig,
    ops: Arc<OpsState>,
    gate: FlightGate,
    shutdown: Shutdown,
    /// Submission left persisted by the last attempt
    unresolved: Mutex<Option<BridgeSubmission>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<StateStore>,
        engine: Arc<ConfirmationEngine>,
        confirmation: ConfirmationConfig,
        ops: Arc<OpsState>,
        gate: FlightGate,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            store,
            engine,
            confirmation,
            ops,
            gate,
            shutdown,
            unresolved: Mutex::new(None),
        }
    }

    /// Read persisted state and resume its confirmation.
    ///
    /// Holds the in-flight gate for the whole call. Shutdown aborts the
    /// wait.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome, ReconcileError> {
        let permit = self.gate.try_acquire().ok_or(ReconcileError::InFlight)?;

        let Some(submission) = self.store.read()? else {
            tracing::info!("No persisted bridge to reconcile");
            *self.unresolved.lock() = None;
            return Ok(ReconcileOutcome::None);
        };

        self.resume(&permit, &submission, Some(&self.shutdown)).await
    }

    /// Submission that the last attempt left unresolved, if any
    pub fn unresolved(&self) -> Option<BridgeSubmission> {
        *self.unresolved.lock()
    }

    /// Confirm `submission` under an already held permit, clearing the
    /// persisted state on success.
    pub async fn resume(
        &self,
        _permit: &FlightPermit,
        submission: &BridgeSubmission,
        abort: Option<&Shutdown>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        *self.unresolved.lock() = Some(*submission);
        self.ops.set_bridge_pending(true);

        tracing::info!(
            baseline = %submission.baseline_balance,
            amount = %submission.amount,
            message_hash = %submission.claim.message_hash,
            leaf_index = submission.claim.message_leaf_index,
            submitted_at_ms = submission.submitted_at_ms,
            "Resuming confirmation of persisted bridge"
        );

        let result = match self
            .engine
            .confirm(submission.baseline_balance, &submission.claim, &self.confirmation, abort)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.ops.record_bridge_event(BridgeEvent::Failed);
                tracing::error!(event = "failed", "Reconciliation could not read the balance: {}", e);
                return Err(e.into());
            }
        };

        let outcome = match result.status {
            ConfirmationStatus::Confirmed => {
                self.store.clear()?;
                *self.unresolved.lock() = None;
                self.ops.set_bridge_pending(false);
                self.ops.record_bridge_event(BridgeEvent::Confirmed);
                ReconcileOutcome::Confirmed
            }
            ConfirmationStatus::Timeout => {
                self.ops.record_bridge_event(BridgeEvent::Timeout);
                ReconcileOutcome::Timeout
            }
            ConfirmationStatus::Aborted => {
                self.ops.record_bridge_event(BridgeEvent::Aborted);
                ReconcileOutcome::Aborted
            }
        };

        tracing::info!(
            event = outcome.as_str(),
            delta = %result.observed_delta,
            attempts = result.attempts,
            poll_errors = result.poll_errors,
            elapsed_ms = result.elapsed_ms,
            message_ready = result.message_ready,
            "Reconciliation finished"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::{claim, ScriptedBalances};
    use l1_bridge::BridgeError;
    use l1_integration::Address;
    use std::time::Duration;
    use tempfile::tempdir;

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<StateStore>,
        ops: Arc<OpsState>,
        gate: FlightGate,
        shutdown: Shutdown,
        reconciler: Reconciler,
    }

    fn harness(balances: Arc<ScriptedBalances>) -> Harness {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path().join("state.json")));
        let ops = Arc::new(OpsState::new(Duration::from_secs(60)).unwrap());
        let engine = Arc::new(ConfirmationEngine::new(Address::new([1u8; 32]), balances, None, ops.clone()));
        let gate = FlightGate::new();
        let shutdown = Shutdown::new();
        let reconciler = Reconciler::new(
            store.clone(),
            engine,
            ConfirmationConfig {
                timeout: Duration::from_secs(30),
                initial_poll: Duration::from_secs(2),
                max_poll: Duration::from_secs(15),
            },
            ops.clone(),
            gate.clone(),
            shutdown.clone(),
        );
        Harness {
            _dir: dir,
            store,
            ops,
            gate,
            shutdown,
            reconciler,
        }
    }

    fn persisted(baseline: u128) -> BridgeSubmission {
        BridgeSubmission {
            baseline_balance: baseline,
            amount: 2000,
            claim: claim(9),
            submitted_at_ms: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_persisted() {
        let h = harness(ScriptedBalances::new(vec![Ok(0)]));
        assert_eq!(h.reconciler.reconcile().await.unwrap(), ReconcileOutcome::None);
        assert!(h.reconciler.unresolved().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_clears_state() {
        let h = harness(ScriptedBalances::new(vec![Ok(2500)]));
        h.store.write(&persisted(500)).unwrap();

        assert_eq!(h.reconciler.reconcile().await.unwrap(), ReconcileOutcome::Confirmed);
        assert!(h.store.read().unwrap().is_none());
        assert!(h.reconciler.unresolved().is_none());
        assert_eq!(h.ops.bridge_event_count(BridgeEvent::Confirmed), 1);
        assert!(!h.gate.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_state() {
        let h = harness(ScriptedBalances::new(vec![Ok(500)]));
        h.store.write(&persisted(500)).unwrap();

        assert_eq!(h.reconciler.reconcile().await.unwrap(), ReconcileOutcome::Timeout);
        assert_eq!(h.store.read().unwrap(), Some(persisted(500)));
        assert_eq!(h.reconciler.unresolved(), Some(persisted(500)));
        assert_eq!(h.ops.bridge_event_count(BridgeEvent::Timeout), 1);
        assert!(h.ops.readiness().bridge_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_and_keeps_state() {
        let h = harness(ScriptedBalances::new(vec![Ok(500)]));
        h.store.write(&persisted(500)).unwrap();
        h.shutdown.trigger();

        assert_eq!(h.reconciler.reconcile().await.unwrap(), ReconcileOutcome::Aborted);
        assert_eq!(h.store.read().unwrap(), Some(persisted(500)));
        assert_eq!(h.ops.bridge_event_count(BridgeEvent::Aborted), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_state_is_an_error() {
        let h = harness(ScriptedBalances::new(vec![Ok(500)]));
        std::fs::write(h.store.path(), b"{\"version\":1,\"bridge\":{}}").unwrap();

        let err = h.reconciler.reconcile().await.unwrap_err();
        assert!(matches!(err, ReconcileError::State(StateError::MalformedState { .. })));
        assert!(!h.gate.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_keeps_state() {
        let h = harness(ScriptedBalances::new(vec![Err(BridgeError::BalanceUnavailable("down".into()))]));
        h.store.write(&persisted(500)).unwrap();

        let err = h.reconciler.reconcile().await.unwrap_err();
        assert!(matches!(err, ReconcileError::Confirmation(_)));
        assert_eq!(h.store.read().unwrap(), Some(persisted(500)));
        assert_eq!(h.reconciler.unresolved(), Some(persisted(500)));
        assert_eq!(h.ops.bridge_event_count(BridgeEvent::Failed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refuses_while_in_flight() {
        let h = harness(ScriptedBalances::new(vec![Ok(500)]));
        let _permit = h.gate.try_acquire().unwrap();
        assert!(matches!(h.reconciler.reconcile().await, Err(ReconcileError::InFlight)));
    }
}
