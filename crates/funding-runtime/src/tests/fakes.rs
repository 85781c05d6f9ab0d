//! Scripted collaborators for timing-sensitive tests

use async_trait::async_trait;
use l1_bridge::{BalanceReader, BridgeError, MessageReadiness};
use l1_integration::{Address, ClaimMaterial, Hash32};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub fn claim(n: u8) -> ClaimMaterial {
    ClaimMaterial {
        claim_secret_hash: Hash32::new([n; 32]),
        message_hash: Hash32::new([n.wrapping_add(1); 32]),
        message_leaf_index: u64::from(n),
    }
}

/// Returns balances from a script, repeating the last entry once exhausted
pub struct ScriptedBalances {
    script: Mutex<VecDeque<Result<u128, BridgeError>>>,
    last: Mutex<Option<Result<u128, BridgeError>>>,
}

impl ScriptedBalances {
    pub fn new(script: Vec<Result<u128, BridgeError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
        })
    }

    /// Drop the rest of the script and report `balance` from now on
    pub fn set(&self, balance: u128) {
        self.script.lock().clear();
        *self.last.lock() = Some(Ok(balance));
    }
}

#[async_trait]
impl BalanceReader for ScriptedBalances {
    async fn get_balance(&self, _account: &Address) -> Result<u128, BridgeError> {
        let next = self.script.lock().pop_front();
        match next {
            Some(entry) => {
                *self.last.lock() = Some(entry.clone());
                entry
            }
            None => self
                .last
                .lock()
                .clone()
                .unwrap_or_else(|| Err(BridgeError::BalanceUnavailable("empty script".into()))),
        }
    }
}

/// Every read takes `delay` before returning `balance`
pub struct SlowBalances {
    delay: Duration,
    balance: u128,
}

impl SlowBalances {
    pub fn new(delay: Duration, balance: u128) -> Arc<Self> {
        Arc::new(Self { delay, balance })
    }
}

#[async_trait]
impl BalanceReader for SlowBalances {
    async fn get_balance(&self, _account: &Address) -> Result<u128, BridgeError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.balance)
    }
}

enum Behavior {
    ReadyAfter(Duration),
    FailAfter(Duration),
    Never,
}

/// Message readiness that resolves on a fixed schedule
pub struct DelayedReadiness {
    behavior: Behavior,
}

impl DelayedReadiness {
    pub fn ready_after(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::ReadyAfter(delay),
        })
    }

    pub fn failing_after(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::FailAfter(delay),
        })
    }

    pub fn never() -> Arc<Self> {
        Arc::new(Self { behavior: Behavior::Never })
    }
}

#[async_trait]
impl MessageReadiness for DelayedReadiness {
    async fn is_message_ready(&self, _message_hash: &Hash32, deadline: Instant) -> Result<bool, BridgeError> {
        match self.behavior {
            Behavior::ReadyAfter(delay) => {
                let at = Instant::now() + delay;
                if at <= deadline {
                    tokio::time::sleep_until(at).await;
                    Ok(true)
                } else {
                    tokio::time::sleep_until(deadline).await;
                    Ok(false)
                }
            }
            Behavior::FailAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(BridgeError::MessageCheckFailed("node rejected query".into()))
            }
            Behavior::Never => std::future::pending().await,
        }
    }
}
