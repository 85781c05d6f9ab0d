//! Ops State - counters and readiness for the operator surface
//!
//! Written by the Checker, the Reconciler and the Confirmation Engine;
//! read by the HTTP ops server. Readiness is recomputed from the live
//! counters on every call.

use parking_lot::Mutex;
use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Lower bound on the balance-check staleness limit
pub const MIN_STALENESS: Duration = Duration::from_secs(30);

/// Bridge lifecycle events counted in `funder_bridge_events_total`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    Submitted,
    Confirmed,
    Timeout,
    Aborted,
    Failed,
}

impl BridgeEvent {
    pub const ALL: [BridgeEvent; 5] = [
        BridgeEvent::Submitted,
        BridgeEvent::Confirmed,
        BridgeEvent::Timeout,
        BridgeEvent::Aborted,
        BridgeEvent::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BridgeEvent::Submitted => "submitted",
            BridgeEvent::Confirmed => "confirmed",
            BridgeEvent::Timeout => "timeout",
            BridgeEvent::Aborted => "aborted",
            BridgeEvent::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessReason {
    pub code: &'static str,
    pub message: String,
}

/// Point-in-time view served by `/ready`
#[derive(Clone, Debug, Serialize)]
pub struct ReadinessSnapshot {
    pub ready: bool,
    pub reasons: Vec<ReadinessReason>,
    pub successful_balance_checks: u64,
    pub failed_balance_checks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_age_ms: Option<u64>,
    pub stale_after_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_balance: Option<String>,
    pub bridge_pending: bool,
}

#[derive(Debug, Default)]
struct Tracker {
    shutting_down: bool,
    successful_checks: u64,
    failed_checks: u64,
    last_check_ok: Option<bool>,
    last_success_at: Option<Instant>,
    last_balance: Option<u128>,
    bridge_pending: bool,
    state_unpersisted: bool,
}

pub struct OpsState {
    registry: Registry,
    bridge_events: IntCounterVec,
    balance_checks: IntCounterVec,
    ready: IntGauge,
    uptime: Gauge,
    last_balance: Gauge,
    bridge_pending: IntGauge,
    started: Instant,
    stale_after: Duration,
    tracker: Mutex<Tracker>,
}

impl OpsState {
    /// `check_interval` drives the staleness limit:
    /// `max(3 * check_interval, MIN_STALENESS)`.
    pub fn new(check_interval: Duration) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bridge_events = IntCounterVec::new(
            Opts::new("funder_bridge_events_total", "Bridge lifecycle events"),
            &["event"],
        )?;
        let balance_checks = IntCounterVec::new(
            Opts::new("funder_balance_checks_total", "L2 balance checks by outcome"),
            &["result"],
        )?;
        let ready = IntGauge::with_opts(Opts::new("funder_ready", "1 when the monitor is ready"))?;
        let uptime = Gauge::with_opts(Opts::new("funder_uptime_seconds", "Process uptime in seconds"))?;
        let last_balance = Gauge::with_opts(Opts::new(
            "funder_last_balance",
            "Last observed L2 fee-asset balance",
        ))?;
        let bridge_pending = IntGauge::with_opts(Opts::new(
            "funder_bridge_pending",
            "1 while a bridge submission awaits confirmation",
        ))?;

        registry.register(Box::new(bridge_events.clone()))?;
        registry.register(Box::new(balance_checks.clone()))?;
        registry.register(Box::new(ready.clone()))?;
        registry.register(Box::new(uptime.clone()))?;
        registry.register(Box::new(last_balance.clone()))?;
        registry.register(Box::new(bridge_pending.clone()))?;

        // Export every series from the start, even at zero.
        for event in BridgeEvent::ALL {
            bridge_events.with_label_values(&[event.as_str()]);
        }
        for result in ["success", "failure"] {
            balance_checks.with_label_values(&[result]);
        }

        Ok(Self {
            registry,
            bridge_events,
            balance_checks,
            ready,
            uptime,
            last_balance,
            bridge_pending,
            started: Instant::now(),
            stale_after: (check_interval * 3).max(MIN_STALENESS),
            tracker: Mutex::new(Tracker::default()),
        })
    }

    pub fn record_balance_check_ok(&self, balance: u128) {
        self.balance_checks.with_label_values(&["success"]).inc();
        self.last_balance.set(balance as f64);

        let mut t = self.tracker.lock();
        t.successful_checks += 1;
        t.last_check_ok = Some(true);
        t.last_success_at = Some(Instant::now());
        t.last_balance = Some(balance);
    }

    pub fn record_balance_check_failed(&self) {
        self.balance_checks.with_label_values(&["failure"]).inc();

        let mut t = self.tracker.lock();
        t.failed_checks += 1;
        t.last_check_ok = Some(false);
    }

    pub fn record_bridge_event(&self, event: BridgeEvent) {
        self.bridge_events.with_label_values(&[event.as_str()]).inc();
    }

    pub fn bridge_event_count(&self, event: BridgeEvent) -> u64 {
        self.bridge_events.with_label_values(&[event.as_str()]).get()
    }

    pub fn set_bridge_pending(&self, pending: bool) {
        self.bridge_pending.set(pending as i64);
        self.tracker.lock().bridge_pending = pending;
    }

    /// Flag a bridge that is in flight but missing from the state file
    pub fn set_state_unpersisted(&self, unpersisted: bool) {
        self.tracker.lock().state_unpersisted = unpersisted;
    }

    pub fn mark_shutting_down(&self) {
        self.tracker.lock().shutting_down = true;
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn readiness(&self) -> ReadinessSnapshot {
        self.readiness_at(Instant::now())
    }

    pub fn readiness_at(&self, now: Instant) -> ReadinessSnapshot {
        let t = self.tracker.lock();
        let mut reasons = Vec::new();

        if t.shutting_down {
            reasons.push(ReadinessReason {
                code: "shutting_down",
                message: "shutdown has been requested".to_string(),
            });
        }
        if t.successful_checks == 0 {
            reasons.push(ReadinessReason {
                code: "no_successful_balance_check",
                message: "no balance check has succeeded yet".to_string(),
            });
        }
        if t.last_check_ok == Some(false) {
            reasons.push(ReadinessReason {
                code: "last_balance_check_failed",
                message: "the most recent balance check failed".to_string(),
            });
        }

        if t.state_unpersisted {
            reasons.push(ReadinessReason {
                code: "state_not_persisted",
                message: "the bridge in flight could not be written to the state file".to_string(),
            });
        }

        let age = t.last_success_at.map(|at| now.saturating_duration_since(at));
        if let Some(age) = age {
            if age > self.stale_after {
                reasons.push(ReadinessReason {
                    code: "balance_check_stale",
                    message: format!(
                        "last successful balance check was {}ms ago (limit {}ms)",
                        age.as_millis(),
                        self.stale_after.as_millis()
                    ),
                });
            }
        }

        let ready = reasons.is_empty();
        self.ready.set(ready as i64);

        ReadinessSnapshot {
            ready,
            reasons,
            successful_balance_checks: t.successful_checks,
            failed_balance_checks: t.failed_checks,
            last_success_age_ms: age.map(|a| a.as_millis() as u64),
            stale_after_ms: self.stale_after.as_millis() as u64,
            last_balance: t.last_balance.map(|b| b.to_string()),
            bridge_pending: t.bridge_pending,
        }
    }

    /// Prometheus text exposition of every funder metric
    pub fn render_metrics(&self) -> Result<String, prometheus::Error> {
        self.uptime.set(self.started.elapsed().as_secs_f64());
        // Refresh the readiness gauge.
        self.readiness();

        let families = self.registry.gather();
        let mut out = Vec::new();
        TextEncoder::new().encode(&families, &mut out)?;
        String::from_utf8(out).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
