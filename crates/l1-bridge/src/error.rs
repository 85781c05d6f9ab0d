//! Collaborator errors

use thiserror::Error;

/// Errors surfaced by the balance, bridge and readiness collaborators.
///
/// All of them are transient from the orchestrator's point of view: the
/// current cycle ends and the next timer tick retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("balance unavailable: {0}")]
    BalanceUnavailable(String),

    #[error("bridge submission failed: {0}")]
    BridgeSubmissionFailed(String),

    #[error("invalid bridge request: {0}")]
    InvalidRequest(String),

    #[error("message readiness check failed: {0}")]
    MessageCheckFailed(String),

    #[error("chain transport error: {0}")]
    Transport(String),
}
