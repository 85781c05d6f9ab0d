//! Funding Runtime - keeps the fee-paying contract funded on L2
//!
//! Components, leaf first:
//! - [`ConfirmationEngine`]: has a bridge landed (message readiness or balance delta)
//! - [`StateStore`]: atomic single-slot persistence of the bridge in flight
//! - [`Reconciler`]: resumes a persisted bridge after a restart
//! - [`Checker`]: the per-cycle read/compare/submit/confirm decision
//! - [`Scheduler`]: startup reconciliation, then the Checker on a timer
//! - [`OpsState`]: counters and readiness for the ops HTTP surface

pub mod checker;
pub mod confirmation;
pub mod flight;
pub mod ops;
pub mod reconcile;
pub mod scheduler;
pub mod shutdown;
pub mod state_store;

pub use checker::{Checker, CheckerConfig, CycleOutcome};
pub use confirmation::{
    next_poll_interval, ConfirmationConfig, ConfirmationEngine, ConfirmationError, ConfirmationResult,
    ConfirmationStatus,
};
pub use flight::{FlightGate, FlightPermit};
pub use ops::{BridgeEvent, OpsState, ReadinessReason, ReadinessSnapshot};
pub use reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
pub use scheduler::Scheduler;
pub use shutdown::Shutdown;
pub use state_store::{StateError, StateStore, STATE_VERSION};

#[cfg(test)]
mod tests;
