//! L1 Bridge - fee-asset deposits and L2 reads
//!
//! Collaborators consumed by the funding orchestrator:
//! - Reading the fee-asset balance of an L2 account
//! - Depositing fee asset into the L1 portal for an L2 account
//! - Checking whether the resulting cross-layer message is consumable
//!
//! Each is a trait; the concrete implementations sit on a
//! [`FeeAssetChain`], either the JSON-RPC gateway or the in-memory
//! simulated chain.

pub mod balance;
pub mod chain;
pub mod error;
pub mod gateway;
pub mod readiness;
pub mod simulated;
pub mod submitter;

pub use balance::{BalanceReader, FeeAssetBalanceReader};
pub use chain::{DepositReceipt, FeeAssetChain};
pub use error::BridgeError;
pub use gateway::{GatewayClient, GatewayConfig};
pub use readiness::{MessageReadiness, PollingMessageReadiness};
pub use simulated::SimulatedChain;
pub use submitter::{claim_secret_hash, BridgeSubmitter, PortalBridgeSubmitter};
