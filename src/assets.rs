//! Fungible token adapter.

use crate::chain::abi::IERC20;
use crate::chain::{ChainContext, TxReceipt};
use crate::error::ChainError;
use alloy_primitives::{Address, U256};
use tracing::{debug, info};

/// Allowance already covering this multiple of the amount needs no approval.
const ALLOWANCE_SKIP_FACTOR: u64 = 2;

/// New approvals grant this multiple of the amount.
const APPROVAL_FACTOR: u64 = 5;

#[derive(Debug)]
pub enum Approval {
    Sufficient { allowance: U256 },
    Granted { amount: U256, receipt: TxReceipt },
}

#[derive(Clone)]
pub struct Erc20 {
    ctx: ChainContext,
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

impl Erc20 {
    pub fn new(ctx: ChainContext, address: Address, decimals: u8, symbol: impl Into<String>) -> Self {
        Self { ctx, address, decimals, symbol: symbol.into() }
    }

    pub async fn balance_of(&self, owner: Address) -> Result<U256, ChainError> {
        self.ctx.read(self.address, IERC20::balanceOfCall { owner }).await
    }

    /// Balance of the compounding wallet.
    pub async fn wallet_balance(&self) -> Result<U256, ChainError> {
        self.balance_of(self.ctx.wallet()).await
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, ChainError> {
        self.ctx.read(self.address, IERC20::allowanceCall { owner, spender }).await
    }

    pub async fn total_supply(&self) -> Result<U256, ChainError> {
        self.ctx.read(self.address, IERC20::totalSupplyCall {}).await
    }

    /// Make sure `spender` may pull `amount` from the wallet.
    ///
    /// Skips the transaction when the allowance already exceeds twice the
    /// amount; otherwise approves five times the amount so the next few
    /// cycles need no approval.
    pub async fn ensure_allowance(&self, spender: Address, amount: U256) -> Result<Approval, ChainError> {
        let allowance = self.allowance(self.ctx.wallet(), spender).await?;
        if allowance > amount.saturating_mul(U256::from(ALLOWANCE_SKIP_FACTOR)) {
            debug!("{} allowance for {} already {}", self.symbol, spender, allowance);
            return Ok(Approval::Sufficient { allowance });
        }

        let value = amount.saturating_mul(U256::from(APPROVAL_FACTOR));
        let receipt = self.ctx.send(self.address, IERC20::approveCall { spender, value }, U256::ZERO).await?;
        info!(
            step = "approve",
            token = %self.symbol,
            spender = %spender,
            amount = %value,
            gas = %receipt.gas_cost(),
            tx = %receipt.tx_hash,
            "Approved {} spending",
            self.symbol
        );
        Ok(Approval::Granted { amount: value, receipt })
    }

    pub async fn transfer(&self, recipient: Address, amount: U256) -> Result<TxReceipt, ChainError> {
        self.ctx.send(self.address, IERC20::transferCall { recipient, amount }, U256::ZERO).await
    }
}
