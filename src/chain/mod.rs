//! Chain access layer.
//!
//! Everything above this module talks to the chain through the
//! [`ChainClient`] trait. [`ChainContext`] bundles a client with the gas
//! oracle and receipt polling policy, and offers typed `read`/`send` helpers
//! for `sol!` calls.

pub mod abi;
pub mod events;
pub mod rpc;
pub mod signer;

#[cfg(test)]
pub mod mock;

use crate::error::ChainError;
use crate::gas_oracle::GasOracle;
use alloy_primitives::{Address, Bytes, Log, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How often a pending transaction is polled for its receipt.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ============================================
// TYPES
// ============================================

/// A transaction to be signed and submitted by the wallet.
#[derive(Debug, Clone)]
pub struct TxRequest {
    pub to: Address,
    pub input: Bytes,
    pub value: U256,
    pub gas_price: u128,
}

/// The parts of a mined receipt the pipeline cares about.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub logs: Vec<Log>,
}

impl TxReceipt {
    /// Native cost paid for this transaction, in wei.
    pub fn gas_cost(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.effective_gas_price)
    }
}

// ============================================
// CHAIN CLIENT
// ============================================

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the wallet that signs outgoing transactions.
    fn wallet(&self) -> Address;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError>;

    /// Gas units the node expects `input` to consume when sent by the wallet.
    async fn estimate_gas(&self, to: Address, input: Bytes, value: U256) -> Result<u64, ChainError>;

    /// The node's current gas price in wei.
    async fn node_gas_price(&self) -> Result<u128, ChainError>;

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Sign and broadcast. Returns the transaction hash without waiting.
    async fn send_transaction(&self, request: TxRequest) -> Result<B256, ChainError>;

    async fn receipt(&self, tx: B256) -> Result<Option<TxReceipt>, ChainError>;
}

/// Poll for a receipt until it appears or `timeout` elapses.
pub async fn wait_for_receipt(
    chain: &dyn ChainClient,
    tx: B256,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<TxReceipt, ChainError> {
    let started = Instant::now();
    loop {
        if let Some(receipt) = chain.receipt(tx).await? {
            return Ok(receipt);
        }
        if started.elapsed() >= timeout {
            return Err(ChainError::ReceiptTimeout { tx, waited: started.elapsed() });
        }
        trace!("Receipt for {} not available yet", tx);
        tokio::time::sleep(poll_interval).await;
    }
}

// ============================================
// CHAIN CONTEXT
// ============================================

/// Shared handle used by every contract adapter.
#[derive(Clone)]
pub struct ChainContext {
    pub client: Arc<dyn ChainClient>,
    pub gas: Arc<GasOracle>,
    /// Deadline offset for router calls and the receipt wait bound.
    pub rpc_timeout: Duration,
    pub poll_interval: Duration,
}

impl ChainContext {
    pub fn new(client: Arc<dyn ChainClient>, gas: Arc<GasOracle>, rpc_timeout: Duration) -> Self {
        Self { client, gas, rpc_timeout, poll_interval: RECEIPT_POLL_INTERVAL }
    }

    pub fn wallet(&self) -> Address {
        self.client.wallet()
    }

    /// Call a view function and decode its return value.
    pub async fn read<C: SolCall + Send>(&self, to: Address, call: C) -> Result<C::Return, ChainError> {
        let output = self.client.call(to, call.abi_encode().into()).await?;
        Ok(C::abi_decode_returns(&output)?)
    }

    /// Send a state-changing call from the wallet and wait for it to be mined.
    ///
    /// A mined-but-reverted transaction is an error.
    pub async fn send<C: SolCall + Send>(
        &self,
        to: Address,
        call: C,
        value: U256,
    ) -> Result<TxReceipt, ChainError> {
        let gas_price = self.gas.gas_price().await?;
        let request = TxRequest { to, input: call.abi_encode().into(), value, gas_price };
        let tx = self.client.send_transaction(request).await?;
        debug!("Submitted {} to {} ({})", C::SIGNATURE, to, tx);

        let receipt = wait_for_receipt(&*self.client, tx, self.poll_interval, self.rpc_timeout).await?;
        if !receipt.success {
            return Err(ChainError::Reverted { tx });
        }
        Ok(receipt)
    }

    /// Unix deadline for router calls submitted now.
    pub fn deadline(&self) -> U256 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        U256::from(now + self.rpc_timeout.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockChain;
    use super::*;

    #[tokio::test]
    async fn test_wait_for_receipt_polls_until_mined() {
        let chain = MockChain::new();
        chain.delay_receipts(2);
        chain.push_receipt(vec![]);
        let hash = chain
            .send_transaction(TxRequest {
                to: Address::ZERO,
                input: Bytes::new(),
                value: U256::ZERO,
                gas_price: 1,
            })
            .await
            .unwrap();

        let receipt = wait_for_receipt(&chain, hash, Duration::from_millis(1), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.tx_hash, hash);
    }

    #[tokio::test]
    async fn test_wait_for_receipt_times_out() {
        let chain = MockChain::new();
        let err = wait_for_receipt(&chain, B256::ZERO, Duration::from_millis(1), Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::ReceiptTimeout { .. }));
    }

    #[tokio::test]
    async fn test_send_rejects_reverted_transaction() {
        let chain = Arc::new(MockChain::new());
        chain.push_reverted_receipt();
        let ctx = chain.context();

        let err = ctx
            .send(Address::ZERO, abi::IERC20::approveCall { spender: Address::ZERO, value: U256::ONE }, U256::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Reverted { .. }));
    }

    #[test]
    fn test_gas_cost() {
        let receipt = TxReceipt {
            tx_hash: B256::ZERO,
            success: true,
            gas_used: 21_000,
            effective_gas_price: 2_000_000_000,
            logs: vec![],
        };
        assert_eq!(receipt.gas_cost(), U256::from(42_000_000_000_000u64));
    }
}
