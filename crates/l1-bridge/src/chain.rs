//! Chain access used by the collaborators
//!
//! `FeeAssetChain` is the narrow surface the orchestrator needs from the
//! underlying chain client. Transaction construction and signing live behind
//! it.

use crate::BridgeError;
use async_trait::async_trait;
use l1_integration::{uint_string_u64, Address, Hash32};
use serde::{Deserialize, Serialize};

/// What the L1 portal reports after a deposit is mined
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReceipt {
    pub message_hash: Hash32,
    #[serde(with = "uint_string_u64")]
    pub message_leaf_index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_tx_hash: Option<Hash32>,
}

#[async_trait]
pub trait FeeAssetChain: Send + Sync {
    /// Address of the gas-equivalent asset contract on L2
    async fn fee_asset_address(&self) -> Result<Address, BridgeError>;

    /// Public balance of `account` in `asset` on L2
    async fn balance_of(&self, asset: &Address, account: &Address) -> Result<u128, BridgeError>;

    /// Lock `amount` in the L1 portal and emit a message to `destination`
    async fn deposit_to_l2(
        &self,
        destination: &Address,
        amount: u128,
        claim_secret_hash: &Hash32,
    ) -> Result<DepositReceipt, BridgeError>;

    /// Whether the message is in the L2 message tree and consumable
    async fn is_message_ready(&self, message_hash: &Hash32) -> Result<bool, BridgeError>;
}
