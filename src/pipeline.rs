//! On-chain implementation of the compounding steps.

use crate::assets::{Approval, Erc20};
use crate::chain::{events, ChainContext};
use crate::error::StepError;
use crate::farm::FarmAdapter;
use crate::orchestrator::{CompoundSteps, Leg, LiquidityRoute, Sent};
use crate::router::{PoolRouter, SwapStrategy};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use tracing::{debug, info};

/// Developer fee in tenths of a percent.
const DEV_FEE_PER_MILLE: u64 = 10;

pub struct ChainSteps {
    ctx: ChainContext,
    farm: FarmAdapter,
    router: PoolRouter,
    dev_fee_recipient: Address,
    process_all: bool,
}

impl ChainSteps {
    pub fn new(
        ctx: ChainContext,
        farm: FarmAdapter,
        router: PoolRouter,
        dev_fee_recipient: Address,
        process_all: bool,
    ) -> Self {
        Self { ctx, farm, router, dev_fee_recipient, process_all }
    }

    pub fn farm(&self) -> &FarmAdapter {
        &self.farm
    }

    fn leg_token(&self, leg: Leg) -> &Erc20 {
        match leg {
            Leg::A => &self.farm.token_a,
            Leg::B => &self.farm.token_b,
        }
    }
}

fn granted(approval: &Approval) -> u32 {
    u32::from(matches!(approval, Approval::Granted { .. }))
}

#[async_trait]
impl CompoundSteps for ChainSteps {
    fn route(&self) -> LiquidityRoute {
        match self.router.strategy() {
            SwapStrategy::Split => LiquidityRoute::Split,
            SwapStrategy::Zap { .. } => LiquidityRoute::Zap,
        }
    }

    fn leg_is_reward(&self, leg: Leg) -> bool {
        self.leg_token(leg).address == self.farm.reward.address
    }

    async fn estimate_gas_per_txn(&self) -> Result<U256, StepError> {
        Ok(self.router.estimate_swap_cost(self.farm.reward.address).await?)
    }

    async fn check_reward(&self, reserve: U256) -> Result<U256, StepError> {
        self.farm.check_reward(reserve).await
    }

    async fn harvest(&self) -> Result<Sent<U256>, StepError> {
        Ok(Sent::one(self.farm.harvest().await?))
    }

    async fn approve_reward(&self, amount: U256) -> Result<Sent<()>, StepError> {
        let reward = &self.farm.reward;
        let mut txns = granted(&reward.ensure_allowance(self.router.address, amount).await?);
        if let SwapStrategy::Zap { zap } = self.router.strategy() {
            txns += granted(&reward.ensure_allowance(zap, amount).await?);
        }
        Ok(Sent::new((), txns))
    }

    async fn top_up_gas(&self, reserve: U256, reward: U256) -> Result<Sent<U256>, StepError> {
        if reserve.is_zero() {
            debug!("No gas reserve to top up");
            return Ok(Sent::new(U256::ZERO, 0));
        }
        let token = &self.farm.reward;
        let wrapped = self.router.wrapped_native;

        let needed = self.router.quote(reserve, wrapped, token.address).await?;
        let amount_in = needed.min(reward);
        let min_out = self.router.min_out(self.router.quote(amount_in, token.address, wrapped).await?);
        info!(step = "top_up_gas", amount = %amount_in, reserve = %reserve, "Swapping {} for gas", token.symbol);

        let receipt = self.router.swap_to_native(token.address, amount_in, min_out).await?;
        let spent = events::sent(&receipt, token.address, self.ctx.wallet());
        let native = events::unwrapped_native(&receipt, wrapped);
        if native.is_zero() {
            return Err(StepError::unexpected(format!("top-up {} delivered no native coin", receipt.tx_hash)));
        }

        info!(
            step = "top_up_gas",
            amount = %spent,
            native = %native,
            gas = %receipt.gas_cost(),
            tx = %receipt.tx_hash,
            "Topped up gas"
        );
        Ok(Sent::one(spent))
    }

    async fn send_dev_fee(&self, reward: U256) -> Result<Sent<U256>, StepError> {
        let fee = reward * U256::from(DEV_FEE_PER_MILLE) / U256::from(1_000);
        if fee.is_zero() {
            return Ok(Sent::new(U256::ZERO, 0));
        }
        let token = &self.farm.reward;
        let receipt = token.transfer(self.dev_fee_recipient, fee).await?;
        let sent = events::sent(&receipt, token.address, self.ctx.wallet());
        info!(
            step = "dev_fee",
            amount = %sent,
            gas = %receipt.gas_cost(),
            tx = %receipt.tx_hash,
            "Sent developer fee"
        );
        Ok(Sent::one(sent))
    }

    async fn zap(&self, reward: U256) -> Result<Sent<U256>, StepError> {
        let SwapStrategy::Zap { zap } = self.router.strategy() else {
            return Err(StepError::unexpected("zap requested without a zap contract"));
        };
        let (lp, receipt) = self.router.zap(zap, self.farm.reward.address, reward).await?;
        if lp.is_zero() {
            return Err(StepError::unexpected(format!("zap {} minted no LP", receipt.tx_hash)));
        }
        info!(step = "zap", amount = %lp, gas = %receipt.gas_cost(), tx = %receipt.tx_hash, "Zapped reward into LP");
        Ok(Sent::one(lp))
    }

    async fn swap_reward_to(&self, leg: Leg, amount: U256) -> Result<Sent<U256>, StepError> {
        let token = self.leg_token(leg);
        let (received, receipt) = self.router.swap(self.farm.reward.address, token.address, amount).await?;
        if received.is_zero() {
            return Err(StepError::unexpected(format!("swap {} delivered no {}", receipt.tx_hash, token.symbol)));
        }
        info!(
            step = "swap",
            token = %token.symbol,
            amount = %received,
            gas = %receipt.gas_cost(),
            tx = %receipt.tx_hash,
            "Swapped {} for {}",
            self.farm.reward.symbol,
            token.symbol
        );
        Ok(Sent::one(received))
    }

    async fn balance_legs(&self, amount_a: U256, amount_b: U256) -> Result<(U256, U256), StepError> {
        if !self.process_all {
            return Ok((amount_a, amount_b));
        }
        let (a, b) = (&self.farm.token_a, &self.farm.token_b);
        let (balance_a, balance_b) = futures::try_join!(a.wallet_balance(), b.wallet_balance())?;
        let (b_for_a, a_for_b) = futures::try_join!(
            self.router.quote(balance_a, a.address, b.address),
            self.router.quote(balance_b, b.address, a.address),
        )?;

        // Use whichever balance is the limiting side, matched by quote.
        let legs = if a_for_b > balance_a { (balance_a, b_for_a) } else { (a_for_b, balance_b) };
        debug!("Liquidity legs from balances: {} {} / {} {}", legs.0, a.symbol, legs.1, b.symbol);
        Ok(legs)
    }

    async fn approve_liquidity(&self, amount_a: U256, amount_b: U256) -> Result<Sent<()>, StepError> {
        let spender = self.router.liquidity_spender();
        let txns = granted(&self.farm.token_a.ensure_allowance(spender, amount_a).await?)
            + granted(&self.farm.token_b.ensure_allowance(spender, amount_b).await?);
        Ok(Sent::new((), txns))
    }

    async fn add_liquidity(&self, amount_a: U256, amount_b: U256) -> Result<Sent<U256>, StepError> {
        let (lp, receipt) = self.router.add_liquidity(amount_a, amount_b).await?;
        if lp.is_zero() {
            return Err(StepError::unexpected(format!("add liquidity {} minted no LP", receipt.tx_hash)));
        }
        info!(
            step = "add_liquidity",
            amount = %lp,
            gas = %receipt.gas_cost(),
            tx = %receipt.tx_hash,
            "Added liquidity"
        );
        Ok(Sent::one(lp))
    }

    async fn deposit(&self, lp: U256) -> Result<Sent<U256>, StepError> {
        let deposited = self.farm.deposit(lp).await?;
        Ok(Sent::new(deposited.amount, 1 + u32::from(deposited.approved)))
    }
}
