//! Single-pool farm with per-block emission.
//!
//! There is no pool id and no allocation: the farm is the pool. Emission is
//! quoted per block with a 12-decimal multiplier and converted to per-second
//! using the configured block time.

use super::{PoolWeight, UserInfo};
use crate::chain::abi::ISinglePoolPerBlock;
use crate::chain::{ChainContext, TxReceipt};
use crate::error::ChainError;
use alloy_primitives::{Address, U256};

/// Scale of `getMultiplier`'s result.
const MULTIPLIER_SCALE: u64 = 1_000_000_000_000;

#[derive(Clone)]
pub struct SinglePoolPerBlock {
    ctx: ChainContext,
    address: Address,
    block_time_secs: u64,
}

impl SinglePoolPerBlock {
    pub fn new(ctx: ChainContext, address: Address, block_time_secs: u64) -> Self {
        Self { ctx, address, block_time_secs: block_time_secs.max(1) }
    }

    pub async fn pending_reward(&self) -> Result<U256, ChainError> {
        let call = ISinglePoolPerBlock::pendingRewardCall { _user: self.ctx.wallet() };
        self.ctx.read(self.address, call).await
    }

    /// Emission over the latest block, per second.
    pub async fn reward_per_second(&self) -> Result<U256, ChainError> {
        let block = self.ctx.client.block_number().await?;
        let multiplier = self
            .ctx
            .read(
                self.address,
                ISinglePoolPerBlock::getMultiplierCall {
                    _fromBlock: U256::from(block.saturating_sub(1)),
                    _toBlock: U256::from(block),
                },
            )
            .await?;
        let per_block = self.ctx.read(self.address, ISinglePoolPerBlock::rewardPerBlockCall {}).await?;
        Ok(per_second(per_block, multiplier, self.block_time_secs))
    }

    pub async fn pool_weight(&self) -> Result<PoolWeight, ChainError> {
        Ok(PoolWeight { alloc_point: U256::ONE, total_alloc_point: U256::ONE })
    }

    pub async fn user_info(&self) -> Result<UserInfo, ChainError> {
        let call = ISinglePoolPerBlock::userInfoCall { user: self.ctx.wallet() };
        let info = self.ctx.read(self.address, call).await?;
        Ok(UserInfo { amount: info.amount, reward_debt: info.rewardDebt })
    }

    pub async fn deposit(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        self.ctx.send(self.address, ISinglePoolPerBlock::depositCall { _amount: amount }, U256::ZERO).await
    }

    pub async fn harvest(&self) -> Result<TxReceipt, ChainError> {
        self.ctx.send(self.address, ISinglePoolPerBlock::withdrawCall { _amount: U256::ZERO }, U256::ZERO).await
    }
}

fn per_second(per_block: U256, multiplier: U256, block_time_secs: u64) -> U256 {
    per_block * multiplier / (U256::from(block_time_secs) * U256::from(MULTIPLIER_SCALE))
}
