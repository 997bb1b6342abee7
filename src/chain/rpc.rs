//! JSON-RPC implementation of [`ChainClient`] over HTTP.

use super::signer::WalletSigner;
use super::{ChainClient, TxReceipt, TxRequest};
use crate::error::ChainError;
use alloy_consensus::TxLegacy;
use alloy_network::ReceiptResponse;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_transport::TransportError;
use async_trait::async_trait;
use std::future::IntoFuture;
use std::time::Duration;
use tracing::debug;

/// Headroom added on top of the node's gas estimate, in percent.
const GAS_LIMIT_BUFFER_PCT: u64 = 20;

pub struct RpcChain {
    rpc_url: String,
    chain_id: u64,
    timeout: Duration,
    wallet: WalletSigner,
}

impl RpcChain {
    pub fn new(rpc_url: String, chain_id: u64, timeout: Duration, wallet: WalletSigner) -> Self {
        Self { rpc_url, chain_id, timeout, wallet }
    }

    fn provider(&self) -> Result<impl Provider, ChainError> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| ChainError::InvalidUrl(format!("{}: {}", self.rpc_url, e)))?;
        Ok(ProviderBuilder::new().connect_http(url))
    }

    /// Bound a request by the RPC timeout.
    async fn timed<F, T>(&self, request: F) -> Result<T, ChainError>
    where
        F: IntoFuture<Output = Result<T, TransportError>>,
    {
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ChainError::Timeout(self.timeout))?
            .map_err(ChainError::from)
    }

    fn request(&self, to: Address, input: Bytes, value: U256) -> TransactionRequest {
        TransactionRequest::default()
            .from(self.wallet.address())
            .to(to)
            .value(value)
            .input(input.into())
    }
}

#[async_trait]
impl ChainClient for RpcChain {
    fn wallet(&self) -> Address {
        self.wallet.address()
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError> {
        let provider = self.provider()?;
        let tx = TransactionRequest::default().to(to).input(input.into());
        self.timed(provider.call(tx)).await
    }

    async fn estimate_gas(&self, to: Address, input: Bytes, value: U256) -> Result<u64, ChainError> {
        let provider = self.provider()?;
        self.timed(provider.estimate_gas(self.request(to, input, value))).await
    }

    async fn node_gas_price(&self) -> Result<u128, ChainError> {
        let provider = self.provider()?;
        self.timed(provider.get_gas_price()).await
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        let provider = self.provider()?;
        self.timed(provider.get_balance(owner)).await
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let provider = self.provider()?;
        self.timed(provider.get_block_number()).await
    }

    async fn send_transaction(&self, request: TxRequest) -> Result<B256, ChainError> {
        let provider = self.provider()?;
        let from = self.wallet.address();

        let nonce = self.timed(provider.get_transaction_count(from).pending()).await?;
        let estimate = self
            .timed(provider.estimate_gas(self.request(request.to, request.input.clone(), request.value)))
            .await?;
        let gas_limit = estimate + estimate * GAS_LIMIT_BUFFER_PCT / 100;

        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price: request.gas_price,
            gas_limit,
            to: TxKind::Call(request.to),
            value: request.value,
            input: request.input,
        };
        let raw = self.wallet.sign_legacy(tx).await?;

        let pending = self.timed(provider.send_raw_transaction(&raw)).await?;
        let hash = *pending.tx_hash();
        debug!("Broadcast {} (nonce {}, gas limit {})", hash, nonce, gas_limit);
        Ok(hash)
    }

    async fn receipt(&self, tx: B256) -> Result<Option<TxReceipt>, ChainError> {
        let provider = self.provider()?;
        let receipt = self.timed(provider.get_transaction_receipt(tx)).await?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash: r.transaction_hash,
            success: ReceiptResponse::status(&r),
            gas_used: r.gas_used,
            effective_gas_price: r.effective_gas_price,
            logs: r.inner.logs().iter().map(|log| log.inner.clone()).collect(),
        }))
    }
}
