//! Simulated Chain - in-memory L1 portal plus L2 fee-asset ledger
//!
//! Deposits land on L2 `landing_delay` after submission: the destination
//! balance is credited and the message becomes consumable at the same
//! instant. Used for `--simulate` runs and tests.

use crate::{BridgeError, DepositReceipt, FeeAssetChain};
use async_trait::async_trait;
use l1_integration::{Address, Hash32};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// Fee-asset contract address reported by the simulated chain
pub const SIMULATED_FEE_ASSET: Address = Address([0xfe; 32]);

#[derive(Debug)]
struct PendingDeposit {
    destination: Address,
    amount: u128,
    message_hash: Hash32,
    lands_at: Instant,
}

#[derive(Debug, Default)]
struct SimState {
    balances: HashMap<Address, u128>,
    pending: Vec<PendingDeposit>,
    ready_messages: HashSet<Hash32>,
    next_leaf_index: u64,
    deposits: u64,
    asset_lookups: u64,
    fail_balance_reads: u32,
    fail_deposits: u32,
}

impl SimState {
    /// Credit every deposit whose landing time has passed
    fn settle(&mut self, now: Instant) {
        let (landed, pending): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|d| d.lands_at <= now);
        self.pending = pending;

        for deposit in landed {
            let balance = self.balances.entry(deposit.destination).or_default();
            *balance = balance.saturating_add(deposit.amount);
            self.ready_messages.insert(deposit.message_hash);
        }
    }
}

/// In-memory chain used in place of a real gateway
pub struct SimulatedChain {
    landing_delay: Duration,
    state: Mutex<SimState>,
}

impl SimulatedChain {
    pub fn new(landing_delay: Duration) -> Self {
        Self {
            landing_delay,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Overwrite an account balance
    pub fn set_balance(&self, account: &Address, amount: u128) {
        self.state.lock().balances.insert(*account, amount);
    }

    /// Current balance, after settling landed deposits
    pub fn balance(&self, account: &Address) -> u128 {
        let mut state = self.state.lock();
        state.settle(Instant::now());
        state.balances.get(account).copied().unwrap_or(0)
    }

    /// Burn fee asset as if it had been spent on sponsored fees.
    /// Returns the new balance.
    pub fn spend(&self, account: &Address, amount: u128) -> u128 {
        let mut state = self.state.lock();
        state.settle(Instant::now());
        let balance = state.balances.entry(*account).or_default();
        *balance = balance.saturating_sub(amount);
        *balance
    }

    /// Number of deposits accepted so far
    pub fn deposit_count(&self) -> u64 {
        self.state.lock().deposits
    }

    /// Number of times the fee-asset address was requested
    pub fn asset_lookups(&self) -> u64 {
        self.state.lock().asset_lookups
    }

    /// Make the next `n` balance reads fail
    pub fn fail_next_balance_reads(&self, n: u32) {
        self.state.lock().fail_balance_reads = n;
    }

    /// Make the next `n` deposits fail
    pub fn fail_next_deposits(&self, n: u32) {
        self.state.lock().fail_deposits = n;
    }
}

fn message_hash(secret_hash: &Hash32, destination: &Address, amount: u128, leaf_index: u64) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(secret_hash.as_bytes());
    hasher.update(destination.as_bytes());
    hasher.update(&amount.to_le_bytes());
    hasher.update(&leaf_index.to_le_bytes());
    Hash32::new(*hasher.finalize().as_bytes())
}

#[async_trait]
impl FeeAssetChain for SimulatedChain {
    async fn fee_asset_address(&self) -> Result<Address, BridgeError> {
        self.state.lock().asset_lookups += 1;
        Ok(SIMULATED_FEE_ASSET)
    }

    async fn balance_of(&self, asset: &Address, account: &Address) -> Result<u128, BridgeError> {
        let mut state = self.state.lock();
        if state.fail_balance_reads > 0 {
            state.fail_balance_reads -= 1;
            return Err(BridgeError::BalanceUnavailable("simulated node unavailable".into()));
        }
        if *asset != SIMULATED_FEE_ASSET {
            return Err(BridgeError::BalanceUnavailable(format!("unknown asset {asset}")));
        }
        state.settle(Instant::now());
        Ok(state.balances.get(account).copied().unwrap_or(0))
    }

    async fn deposit_to_l2(
        &self,
        destination: &Address,
        amount: u128,
        claim_secret_hash: &Hash32,
    ) -> Result<DepositReceipt, BridgeError> {
        let mut state = self.state.lock();
        if state.fail_deposits > 0 {
            state.fail_deposits -= 1;
            return Err(BridgeError::BridgeSubmissionFailed("simulated revert".into()));
        }

        let leaf_index = state.next_leaf_index;
        state.next_leaf_index += 1;
        state.deposits += 1;

        let hash = message_hash(claim_secret_hash, destination, amount, leaf_index);
        state.pending.push(PendingDeposit {
            destination: *destination,
            amount,
            message_hash: hash,
            lands_at: Instant::now() + self.landing_delay,
        });

        tracing::debug!(%destination, amount, leaf_index, "Simulated portal deposit");

        Ok(DepositReceipt {
            message_hash: hash,
            message_leaf_index: leaf_index,
            l1_tx_hash: Some(Hash32::new(*blake3::hash(hash.as_bytes()).as_bytes())),
        })
    }

    async fn is_message_ready(&self, message_hash: &Hash32) -> Result<bool, BridgeError> {
        let mut state = self.state.lock();
        state.settle(Instant::now());
        Ok(state.ready_messages.contains(message_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deposit_lands_after_delay() {
        let chain = SimulatedChain::new(Duration::from_secs(10));
        let account = Address::new([2u8; 32]);
        chain.set_balance(&account, 500);

        let receipt = chain
            .deposit_to_l2(&account, 2000, &Hash32::new([4u8; 32]))
            .await
            .unwrap();
        assert_eq!(chain.balance(&account), 500);
        assert!(!chain.is_message_ready(&receipt.message_hash).await.unwrap());

        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(chain.balance(&account), 2500);
        assert!(chain.is_message_ready(&receipt.message_hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_spend_saturates_at_zero() {
        let chain = SimulatedChain::new(Duration::ZERO);
        let account = Address::new([2u8; 32]);
        chain.set_balance(&account, 100);

        assert_eq!(chain.spend(&account, 40), 60);
        assert_eq!(chain.spend(&account, 1000), 0);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let chain = SimulatedChain::new(Duration::ZERO);
        let account = Address::new([2u8; 32]);
        chain.fail_next_balance_reads(2);

        assert!(chain.balance_of(&SIMULATED_FEE_ASSET, &account).await.is_err());
        assert!(chain.balance_of(&SIMULATED_FEE_ASSET, &account).await.is_err());
        assert_eq!(chain.balance_of(&SIMULATED_FEE_ASSET, &account).await.unwrap(), 0);
    }
}
