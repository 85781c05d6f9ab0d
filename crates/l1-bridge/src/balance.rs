//! Balance Reader - reads the fee-asset balance of an L2 account

use crate::{BridgeError, FeeAssetChain};
use async_trait::async_trait;
use l1_integration::Address;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Reads the current gas-equivalent balance of an account.
///
/// Implementations do not retry; callers own the retry policy.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    async fn get_balance(&self, account: &Address) -> Result<u128, BridgeError>;
}

/// Balance reader backed by a [`FeeAssetChain`].
///
/// The fee-asset contract address is resolved on first use and cached for
/// the lifetime of the reader. A failed resolution is not cached.
pub struct FeeAssetBalanceReader<C: ?Sized> {
    chain: Arc<C>,
    asset: OnceCell<Address>,
}

impl<C: FeeAssetChain + ?Sized> FeeAssetBalanceReader<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self {
            chain,
            asset: OnceCell::new(),
        }
    }

    /// Fee-asset contract address, resolving it if needed
    pub async fn fee_asset(&self) -> Result<Address, BridgeError> {
        self.asset
            .get_or_try_init(|| async {
                let asset = self.chain.fee_asset_address().await?;
                tracing::info!(asset = %asset, "Resolved fee asset address");
                Ok::<_, BridgeError>(asset)
            })
            .await
            .copied()
    }
}

#[async_trait]
impl<C: FeeAssetChain + ?Sized> BalanceReader for FeeAssetBalanceReader<C> {
    async fn get_balance(&self, account: &Address) -> Result<u128, BridgeError> {
        let asset = self
            .fee_asset()
            .await
            .map_err(|e| BridgeError::BalanceUnavailable(format!("fee asset lookup: {e}")))?;

        self.chain
            .balance_of(&asset, account)
            .await
            .map_err(|e| match e {
                BridgeError::BalanceUnavailable(_) => e,
                other => BridgeError::BalanceUnavailable(other.to_string()),
            })
    }
}
