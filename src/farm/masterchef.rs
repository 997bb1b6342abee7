//! MasterChef with per-second emission and packed pool info.

use super::{PoolWeight, UserInfo};
use crate::chain::abi::IPerSecondMasterChef;
use crate::chain::{ChainContext, TxReceipt};
use crate::error::ChainError;
use alloy_primitives::{Address, U256};

#[derive(Clone)]
pub struct PerSecondMasterChef {
    ctx: ChainContext,
    address: Address,
    pid: U256,
}

impl PerSecondMasterChef {
    pub fn new(ctx: ChainContext, address: Address, pool_id: u64) -> Self {
        Self { ctx, address, pid: U256::from(pool_id) }
    }

    pub async fn pending_reward(&self) -> Result<U256, ChainError> {
        let call = IPerSecondMasterChef::pendingYelCall { _pid: self.pid, _user: self.ctx.wallet() };
        self.ctx.read(self.address, call).await
    }

    pub async fn reward_per_second(&self) -> Result<U256, ChainError> {
        self.ctx.read(self.address, IPerSecondMasterChef::yelPerSecondCall {}).await
    }

    pub async fn pool_weight(&self) -> Result<PoolWeight, ChainError> {
        let info = self.ctx.read(self.address, IPerSecondMasterChef::poolInfoCall { pid: self.pid }).await?;
        let total = self.ctx.read(self.address, IPerSecondMasterChef::totalAllocPointCall {}).await?;
        Ok(PoolWeight { alloc_point: U256::from(info.allocPoint), total_alloc_point: total })
    }

    pub async fn user_info(&self) -> Result<UserInfo, ChainError> {
        let call = IPerSecondMasterChef::userInfoCall { pid: self.pid, user: self.ctx.wallet() };
        let info = self.ctx.read(self.address, call).await?;
        Ok(UserInfo { amount: info.amount, reward_debt: info.rewardDebt })
    }

    pub async fn deposit(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        let call = IPerSecondMasterChef::depositCall { _pid: self.pid, _amount: amount };
        self.ctx.send(self.address, call, U256::ZERO).await
    }

    pub async fn harvest(&self) -> Result<TxReceipt, ChainError> {
        let call = IPerSecondMasterChef::withdrawCall { _pid: self.pid, _amount: U256::ZERO };
        self.ctx.send(self.address, call, U256::ZERO).await
    }
}
