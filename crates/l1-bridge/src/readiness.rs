//! Message readiness - whether an L1 -> L2 message is consumable on L2

use crate::{BridgeError, FeeAssetChain};
use async_trait::async_trait;
use l1_integration::Hash32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Optional capability: deployments without message introspection simply
/// don't provide one, and confirmation falls back to balance deltas.
#[async_trait]
pub trait MessageReadiness: Send + Sync {
    /// Resolve `true` once the message is ready, or `false` at `deadline`
    async fn is_message_ready(&self, message_hash: &Hash32, deadline: Instant) -> Result<bool, BridgeError>;
}

/// Polls [`FeeAssetChain::is_message_ready`] until ready or the deadline
pub struct PollingMessageReadiness<C: ?Sized> {
    chain: Arc<C>,
    poll_interval: Duration,
}

impl<C: FeeAssetChain + ?Sized> PollingMessageReadiness<C> {
    pub fn new(chain: Arc<C>, poll_interval: Duration) -> Self {
        Self { chain, poll_interval }
    }
}

#[async_trait]
impl<C: FeeAssetChain + ?Sized> MessageReadiness for PollingMessageReadiness<C> {
    async fn is_message_ready(&self, message_hash: &Hash32, deadline: Instant) -> Result<bool, BridgeError> {
        loop {
            let ready = self
                .chain
                .is_message_ready(message_hash)
                .await
                .map_err(|e| BridgeError::MessageCheckFailed(e.to_string()))?;
            if ready {
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
