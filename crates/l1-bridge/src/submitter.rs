//! Bridge Submitter - locks fee asset in the L1 portal for an L2 account
//!
//! Every successful call broadcasts an irreversible L1 transaction. The
//! submitter does not deduplicate; single-flight is enforced by the caller.

use crate::{BridgeError, FeeAssetChain};
use async_trait::async_trait;
use l1_integration::{Address, BridgeDeposit, ClaimMaterial, ClaimSecret, Hash32};
use std::sync::Arc;

#[async_trait]
pub trait BridgeSubmitter: Send + Sync {
    /// Deposit `amount` on L1 for `destination` on L2
    async fn submit(&self, destination: &Address, amount: u128) -> Result<BridgeDeposit, BridgeError>;
}

/// Hash committed on L1 for a claim secret
pub fn claim_secret_hash(secret: &ClaimSecret) -> Hash32 {
    Hash32::new(*blake3::hash(secret.expose()).as_bytes())
}

/// Submits deposits through the fee-asset portal of a [`FeeAssetChain`]
pub struct PortalBridgeSubmitter<C: ?Sized> {
    chain: Arc<C>,
}

impl<C: FeeAssetChain + ?Sized> PortalBridgeSubmitter<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl<C: FeeAssetChain + ?Sized> BridgeSubmitter for PortalBridgeSubmitter<C> {
    async fn submit(&self, destination: &Address, amount: u128) -> Result<BridgeDeposit, BridgeError> {
        if amount == 0 {
            return Err(BridgeError::InvalidRequest("amount must be greater than zero".into()));
        }
        if destination.is_zero() {
            return Err(BridgeError::InvalidRequest("destination is the zero address".into()));
        }

        let claim_secret = ClaimSecret::new(rand::random::<[u8; 32]>());
        let secret_hash = claim_secret_hash(&claim_secret);

        let receipt = self
            .chain
            .deposit_to_l2(destination, amount, &secret_hash)
            .await
            .map_err(|e| match e {
                BridgeError::BridgeSubmissionFailed(_) => e,
                other => BridgeError::BridgeSubmissionFailed(other.to_string()),
            })?;

        tracing::debug!(
            message_hash = %receipt.message_hash,
            leaf_index = receipt.message_leaf_index,
            "Portal deposit mined"
        );

        Ok(BridgeDeposit {
            claim: ClaimMaterial {
                claim_secret_hash: secret_hash,
                message_hash: receipt.message_hash,
                message_leaf_index: receipt.message_leaf_index,
            },
            claim_secret,
            amount,
            l1_tx_hash: receipt.l1_tx_hash,
        })
    }
}
