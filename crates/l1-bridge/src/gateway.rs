//! Gateway Client - JSON-RPC access to the chain gateway
//!
//! The gateway owns L1 keys and L2 node connections and exposes the four
//! operations of [`FeeAssetChain`] over HTTP JSON-RPC:
//! - `gateway_feeAssetAddress() -> "0x.."`
//! - `gateway_balanceOf(asset, account) -> "<uint>"`
//! - `gateway_depositToL2(destination, "<uint>", secretHash) -> DepositReceipt`
//! - `gateway_isMessageReady(messageHash) -> bool`

use crate::{BridgeError, DepositReceipt, FeeAssetChain};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use l1_integration::{parse_uint, Address, Hash32};
use std::time::Duration;

/// Gateway connection settings
#[derive(Clone)]
pub struct GatewayConfig {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when set
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<REDACTED>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// HTTP JSON-RPC client for the chain gateway
pub struct GatewayClient {
    client: HttpClient,
    url: String,
}

impl GatewayClient {
    pub fn connect(config: &GatewayConfig) -> Result<Self, BridgeError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| BridgeError::Transport("gateway token is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert("authorization", value);
        }

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(config.request_timeout)
            .build(&config.url)
            .map_err(|e| BridgeError::Transport(format!("gateway client for {}: {e}", config.url)))?;

        tracing::info!("Gateway client configured for {}", config.url);

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn transport(method: &str, e: impl std::fmt::Display) -> BridgeError {
    BridgeError::Transport(format!("{method}: {e}"))
}

#[async_trait]
impl FeeAssetChain for GatewayClient {
    async fn fee_asset_address(&self) -> Result<Address, BridgeError> {
        self.client
            .request::<Address, _>("gateway_feeAssetAddress", rpc_params![])
            .await
            .map_err(|e| transport("gateway_feeAssetAddress", e))
    }

    async fn balance_of(&self, asset: &Address, account: &Address) -> Result<u128, BridgeError> {
        let raw: String = self
            .client
            .request("gateway_balanceOf", rpc_params![asset, account])
            .await
            .map_err(|e| BridgeError::BalanceUnavailable(format!("gateway_balanceOf: {e}")))?;
        parse_uint(&raw).map_err(|e| BridgeError::BalanceUnavailable(format!("gateway_balanceOf: {e}")))
    }

    async fn deposit_to_l2(
        &self,
        destination: &Address,
        amount: u128,
        claim_secret_hash: &Hash32,
    ) -> Result<DepositReceipt, BridgeError> {
        self.client
            .request(
                "gateway_depositToL2",
                rpc_params![destination, amount.to_string(), claim_secret_hash],
            )
            .await
            .map_err(|e| BridgeError::BridgeSubmissionFailed(format!("gateway_depositToL2: {e}")))
    }

    async fn is_message_ready(&self, message_hash: &Hash32) -> Result<bool, BridgeError> {
        self.client
            .request("gateway_isMessageReady", rpc_params![message_hash])
            .await
            .map_err(|e| BridgeError::MessageCheckFailed(format!("gateway_isMessageReady: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let config = GatewayConfig {
            url: "http://127.0.0.1:8547".to_string(),
            auth_token: Some("hunter2".to_string()),
            request_timeout: Duration::from_secs(10),
        };
        let printed = format!("{:?}", config);
        assert!(printed.contains("<REDACTED>"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_rejects_unusable_token() {
        let config = GatewayConfig {
            url: "http://127.0.0.1:8547".to_string(),
            auth_token: Some("bad\ntoken".to_string()),
            request_timeout: Duration::from_secs(10),
        };
        assert!(matches!(
            GatewayClient::connect(&config),
            Err(BridgeError::Transport(_))
        ));
    }
}
