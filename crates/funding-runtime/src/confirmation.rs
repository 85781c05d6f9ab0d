//! Confirmation Engine - decides whether a bridge has landed on L2
//!
//! Two signals are combined:
//! - message readiness (precise, optional, may resolve late), run as a
//!   background task for the whole wait
//! - balance delta over the pre-submission baseline (always available)
//!
//! Balance polling uses bounded exponential backoff. The engine never writes
//! persisted state; its callers do.

use crate::ops::OpsState;
use crate::shutdown::Shutdown;
use futures::FutureExt;
use l1_bridge::{BalanceReader, BridgeError, MessageReadiness};
use l1_integration::{Address, ClaimMaterial};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Growth factor applied to the poll interval after every sleep
pub const POLL_BACKOFF_FACTOR: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmationConfig {
    pub timeout: Duration,
    pub initial_poll: Duration,
    pub max_poll: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Confirmed,
    Timeout,
    Aborted,
}

impl ConfirmationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfirmationStatus::Confirmed => "confirmed",
            ConfirmationStatus::Timeout => "timeout",
            ConfirmationStatus::Aborted => "aborted",
        }
    }
}

/// Outcome of one confirmation attempt. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfirmationResult {
    pub status: ConfirmationStatus,
    pub baseline_balance: u128,
    pub max_observed_balance: u128,
    pub last_observed_balance: Option<u128>,
    /// `max_observed_balance - baseline_balance`, floored at zero
    pub observed_delta: u128,
    pub elapsed_ms: u64,
    pub attempts: u32,
    pub poll_errors: u32,
    pub message_check_attempted: bool,
    pub message_ready: bool,
    pub message_check_failed: bool,
}

impl ConfirmationResult {
    fn new(baseline_balance: u128) -> Self {
        Self {
            status: ConfirmationStatus::Timeout,
            baseline_balance,
            max_observed_balance: baseline_balance,
            last_observed_balance: None,
            observed_delta: 0,
            elapsed_ms: 0,
            attempts: 0,
            poll_errors: 0,
            message_check_attempted: false,
            message_ready: false,
            message_check_failed: false,
        }
    }

    fn observe(&mut self, balance: u128) {
        self.last_observed_balance = Some(balance);
        self.max_observed_balance = self.max_observed_balance.max(balance);
        self.observed_delta = self.max_observed_balance.saturating_sub(self.baseline_balance);
    }

    fn finish(mut self, status: ConfirmationStatus, started: Instant) -> Self {
        self.status = status;
        self.elapsed_ms = started.elapsed().as_millis() as u64;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    /// Every balance read failed and no readiness signal arrived
    #[error("confirmation unreadable: all {attempts} balance reads failed over {elapsed_ms}ms")]
    ConfirmationUnreadable { attempts: u32, poll_errors: u32, elapsed_ms: u64 },
}

/// Next poll interval: `min(max, current * 1.5)`
pub fn next_poll_interval(current: Duration, max: Duration) -> Duration {
    current.mul_f64(POLL_BACKOFF_FACTOR).min(max)
}

/// How a raced wait inside `confirm` ended
enum Step<T> {
    Done(T),
    Ready,
    Aborted,
    Deadline,
}

/// Background readiness check, cancelled when the confirmation returns
struct ReadinessTask(JoinHandle<Result<bool, BridgeError>>);

impl Drop for ReadinessTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn resolve_readiness(task: &mut Option<ReadinessTask>) -> Result<bool, BridgeError> {
    match task {
        Some(task) => match (&mut task.0).await {
            Ok(outcome) => outcome,
            Err(e) => Err(BridgeError::MessageCheckFailed(e.to_string())),
        },
        None => std::future::pending().await,
    }
}

async fn wait_abort(abort: Option<&Shutdown>) {
    match abort {
        Some(shutdown) => shutdown.wait().await,
        None => std::future::pending().await,
    }
}

/// Drive `phase` while watching readiness, the abort signal and the deadline.
///
/// A readiness check that resolves `false` or fails is retired and the
/// phase keeps running.
async fn race<T>(
    phase: impl Future<Output = T>,
    readiness: &mut Option<ReadinessTask>,
    result: &mut ConfirmationResult,
    abort: Option<&Shutdown>,
    deadline: Instant,
) -> Step<T> {
    tokio::pin!(phase);
    loop {
        let outcome = tokio::select! {
            biased;
            r = resolve_readiness(readiness) => r,
            _ = wait_abort(abort) => return Step::Aborted,
            v = &mut phase => return Step::Done(v),
            _ = tokio::time::sleep_until(deadline) => return Step::Deadline,
        };
        *readiness = None;
        match outcome {
            Ok(true) => {
                result.message_ready = true;
                return Step::Ready;
            }
            Ok(false) => {}
            Err(e) => {
                result.message_check_failed = true;
                tracing::warn!("Message readiness check failed, using balance delta only: {}", e);
            }
        }
    }
}

pub struct ConfirmationEngine {
    account: Address,
    balances: Arc<dyn BalanceReader>,
    readiness: Option<Arc<dyn MessageReadiness>>,
    ops: Arc<OpsState>,
}

impl ConfirmationEngine {
    pub fn new(
        account: Address,
        balances: Arc<dyn BalanceReader>,
        readiness: Option<Arc<dyn MessageReadiness>>,
        ops: Arc<OpsState>,
    ) -> Self {
        Self {
            account,
            balances,
            readiness,
            ops,
        }
    }

    /// Wait for the bridge described by `claim` to land.
    ///
    /// With `abort` set, a shutdown ends the wait with `Aborted`; without it
    /// the wait always runs to `Confirmed` or `Timeout`. Balance reads and
    /// backoff sleeps are both cut off at `config.timeout`.
    pub async fn confirm(
        &self,
        baseline_balance: u128,
        claim: &ClaimMaterial,
        config: &ConfirmationConfig,
        abort: Option<&Shutdown>,
    ) -> Result<ConfirmationResult, ConfirmationError> {
        let started = Instant::now();
        let deadline = started + config.timeout;
        let mut result = ConfirmationResult::new(baseline_balance);
        let mut successful_reads = 0u32;

        let mut readiness = self.readiness.clone().map(|readiness| {
            let message_hash = claim.message_hash;
            ReadinessTask(tokio::spawn(async move {
                readiness.is_message_ready(&message_hash, deadline).await
            }))
        });
        result.message_check_attempted = readiness.is_some();

        let mut poll = config.initial_poll.min(config.max_poll);

        loop {
            if result.message_ready {
                tracing::debug!(message_hash = %claim.message_hash, "Message ready on L2");
                return Ok(result.finish(ConfirmationStatus::Confirmed, started));
            }
            if abort.map_or(false, Shutdown::is_triggered) {
                return Ok(result.finish(ConfirmationStatus::Aborted, started));
            }

            result.attempts += 1;
            let read = self.balances.get_balance(&self.account);
            match race(read, &mut readiness, &mut result, abort, deadline).await {
                Step::Done(Ok(balance)) => {
                    successful_reads += 1;
                    self.ops.record_balance_check_ok(balance);
                    result.observe(balance);
                    if result.observed_delta > 0 {
                        return Ok(result.finish(ConfirmationStatus::Confirmed, started));
                    }
                }
                Step::Done(Err(e)) => {
                    result.poll_errors += 1;
                    self.ops.record_balance_check_failed();
                    tracing::warn!(attempt = result.attempts, "Confirmation balance poll failed: {}", e);
                }
                Step::Ready => continue,
                Step::Aborted => return Ok(result.finish(ConfirmationStatus::Aborted, started)),
                Step::Deadline => {
                    tracing::warn!(attempt = result.attempts, "Confirmation balance poll still running at the deadline");
                    break;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let sleep = tokio::time::sleep(poll.min(deadline - now));
            match race(sleep, &mut readiness, &mut result, abort, deadline).await {
                Step::Done(()) => {}
                Step::Ready => continue,
                Step::Aborted => return Ok(result.finish(ConfirmationStatus::Aborted, started)),
                Step::Deadline => break,
            }

            poll = next_poll_interval(poll, config.max_poll);
        }

        // Last look at a readiness check that may have resolved meanwhile.
        if let Some(mut task) = readiness.take() {
            match (&mut task.0).now_or_never() {
                Some(Ok(Ok(true))) => {
                    result.message_ready = true;
                    return Ok(result.finish(ConfirmationStatus::Confirmed, started));
                }
                Some(Ok(Err(_))) | Some(Err(_)) => result.message_check_failed = true,
                Some(Ok(Ok(false))) | None => {}
            }
        }

        if successful_reads == 0 {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            return Err(ConfirmationError::ConfirmationUnreadable {
                attempts: result.attempts,
                poll_errors: result.poll_errors,
                elapsed_ms,
            });
        }

        Ok(result.finish(ConfirmationStatus::Timeout, started))
    }
}
