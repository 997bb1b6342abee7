//! Farm adapters.
//!
//! Three farm ABI families are supported. The family is picked once from the
//! instance's `farm_type` and dispatched through the [`Farm`] enum; the
//! pipeline-facing operations and the position/yield computation live on
//! [`FarmAdapter`] and are shared by all of them.

pub mod masterchef;
pub mod single_pool;
pub mod tshare;

pub use masterchef::PerSecondMasterChef;
pub use single_pool::SinglePoolPerBlock;
pub use tshare::TShareRewardPool;

use crate::assets::{Approval, Erc20};
use crate::chain::{events, ChainContext, TxReceipt};
use crate::config::Config;
use crate::error::{ChainError, FatalError, StepError, YieldError};
use crate::position::{Position, TokenValue, UnitPrices, YieldEstimate};
use crate::router::PoolRouter;
use crate::yield_model::{self, Emission, PoolReserves};
use alloy_primitives::{Address, U256};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Decimals of the native coin and its wrapped token.
const NATIVE_DECIMALS: u8 = 18;

// ============================================
// FARM KIND
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FarmKind {
    /// Pool-id keyed, per-second emission (`pendingShare`)
    TShareRewardPool,
    /// Pool-id keyed, per-second emission, packed `poolInfo`
    PerSecondMasterChef,
    /// One pool, per-block emission
    SinglePoolPerBlock,
}

impl FarmKind {
    /// Only the TShare family's tax office can add liquidity tax-free.
    pub fn supports_tax_free(&self) -> bool {
        matches!(self, FarmKind::TShareRewardPool)
    }
}

impl FromStr for FarmKind {
    type Err = FatalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WFTM-TOMB_TSHARE" | "tshare_reward_pool" => Ok(FarmKind::TShareRewardPool),
            "WFTM-YEL_YEL" | "masterchef_per_second" => Ok(FarmKind::PerSecondMasterChef),
            "WBNB-MOMA_MOMA" | "single_pool_per_block" => Ok(FarmKind::SinglePoolPerBlock),
            other => Err(FatalError::UnknownFarmType(other.to_string())),
        }
    }
}

impl fmt::Display for FarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FarmKind::TShareRewardPool => "TShare reward pool",
            FarmKind::PerSecondMasterChef => "MasterChef (per second)",
            FarmKind::SinglePoolPerBlock => "Single pool (per block)",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolWeight {
    pub alloc_point: U256,
    pub total_alloc_point: U256,
}

/// The wallet's stake in the farm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserInfo {
    pub amount: U256,
    pub reward_debt: U256,
}

// ============================================
// DISPATCH
// ============================================

#[derive(Clone)]
pub enum Farm {
    TShare(TShareRewardPool),
    MasterChef(PerSecondMasterChef),
    SinglePool(SinglePoolPerBlock),
}

impl Farm {
    pub fn new(kind: FarmKind, ctx: ChainContext, config: &Config) -> Self {
        let address = config.farm.contract;
        match kind {
            FarmKind::TShareRewardPool => Farm::TShare(TShareRewardPool::new(ctx, address, config.farm.pool_id)),
            FarmKind::PerSecondMasterChef => {
                Farm::MasterChef(PerSecondMasterChef::new(ctx, address, config.farm.pool_id))
            }
            FarmKind::SinglePoolPerBlock => {
                Farm::SinglePool(SinglePoolPerBlock::new(ctx, address, config.farm.block_time_secs))
            }
        }
    }

    pub async fn pending_reward(&self) -> Result<U256, ChainError> {
        match self {
            Farm::TShare(farm) => farm.pending_reward().await,
            Farm::MasterChef(farm) => farm.pending_reward().await,
            Farm::SinglePool(farm) => farm.pending_reward().await,
        }
    }

    pub async fn reward_per_second(&self) -> Result<U256, ChainError> {
        match self {
            Farm::TShare(farm) => farm.reward_per_second().await,
            Farm::MasterChef(farm) => farm.reward_per_second().await,
            Farm::SinglePool(farm) => farm.reward_per_second().await,
        }
    }

    pub async fn pool_weight(&self) -> Result<PoolWeight, ChainError> {
        match self {
            Farm::TShare(farm) => farm.pool_weight().await,
            Farm::MasterChef(farm) => farm.pool_weight().await,
            Farm::SinglePool(farm) => farm.pool_weight().await,
        }
    }

    pub async fn user_info(&self) -> Result<UserInfo, ChainError> {
        match self {
            Farm::TShare(farm) => farm.user_info().await,
            Farm::MasterChef(farm) => farm.user_info().await,
            Farm::SinglePool(farm) => farm.user_info().await,
        }
    }

    pub async fn deposit(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        match self {
            Farm::TShare(farm) => farm.deposit(amount).await,
            Farm::MasterChef(farm) => farm.deposit(amount).await,
            Farm::SinglePool(farm) => farm.deposit(amount).await,
        }
    }

    /// Claim pending reward by withdrawing nothing.
    pub async fn harvest(&self) -> Result<TxReceipt, ChainError> {
        match self {
            Farm::TShare(farm) => farm.harvest().await,
            Farm::MasterChef(farm) => farm.harvest().await,
            Farm::SinglePool(farm) => farm.harvest().await,
        }
    }
}

// ============================================
// FARM ADAPTER
// ============================================

/// Amount staked by one deposit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deposited {
    pub amount: U256,
    /// Whether an LP approval had to be sent first
    pub approved: bool,
}

#[derive(Clone)]
pub struct FarmAdapter {
    ctx: ChainContext,
    pub kind: FarmKind,
    pub address: Address,
    farm: Farm,
    pub reward: Erc20,
    pub lp: Erc20,
    pub token_a: Erc20,
    pub token_b: Erc20,
    fiat: Option<Erc20>,
    router: PoolRouter,
    process_all: bool,
    token_a_offset_pct: f64,
    token_b_offset_pct: f64,
    native_symbol: String,
    fiat_symbol: String,
}

impl FarmAdapter {
    pub fn new(ctx: ChainContext, config: &Config, router: PoolRouter) -> Result<Self, FatalError> {
        let kind = config.farm_kind()?;
        let symbols = config.symbols();
        let fiat = config
            .tokens
            .fiat
            .map(|address| Erc20::new(ctx.clone(), address, config.tokens.fiat_decimals, &config.tokens.fiat_symbol));

        Ok(Self {
            kind,
            address: config.farm.contract,
            farm: Farm::new(kind, ctx.clone(), config),
            reward: Erc20::new(ctx.clone(), config.farm.reward, config.farm.reward_decimals, &symbols.reward),
            lp: Erc20::new(
                ctx.clone(),
                config.pool.lp,
                config.pool.lp_decimals,
                format!("{}-{} LP", symbols.token_a, symbols.token_b),
            ),
            token_a: Erc20::new(ctx.clone(), config.pool.token_a, config.pool.token_a_decimals, &symbols.token_a),
            token_b: Erc20::new(ctx.clone(), config.pool.token_b, config.pool.token_b_decimals, &symbols.token_b),
            fiat,
            router,
            process_all: config.farm.process_all_rewards,
            token_a_offset_pct: config.pool.token_a_offset_pct,
            token_b_offset_pct: config.pool.token_b_offset_pct,
            native_symbol: config.gas.symbol.clone(),
            fiat_symbol: config.tokens.fiat_symbol.clone(),
            ctx,
        })
    }

    pub fn farm(&self) -> &Farm {
        &self.farm
    }

    /// Pending reward, if it is worth more than the gas reserve.
    pub async fn check_reward(&self, gas_reserve: U256) -> Result<U256, StepError> {
        let pending = self.farm.pending_reward().await?;
        if pending.is_zero() {
            return Err(StepError::postpone("no pending reward"));
        }

        let in_native = self.router.quote(pending, self.reward.address, self.router.wrapped_native).await?;
        info!(
            step = "check_reward",
            pending = %pending,
            native = %in_native,
            reserve = %gas_reserve,
            "Pending {}: {:.6} ({:.6} {})",
            self.reward.symbol,
            yield_model::to_units(pending, self.reward.decimals),
            yield_model::to_units(in_native, NATIVE_DECIMALS),
            self.native_symbol
        );

        if in_native <= gas_reserve.saturating_add(U256::ONE) {
            return Err(StepError::postpone(format!(
                "pending reward worth {} wei does not cover the {} wei gas reserve",
                in_native, gas_reserve
            )));
        }
        Ok(pending)
    }

    /// Harvest and return the reward amount to process.
    ///
    /// The realised amount comes from the receipt's reward transfers to the
    /// wallet; it must be positive and no more than the wallet now holds.
    pub async fn harvest(&self) -> Result<U256, StepError> {
        let receipt = self.farm.harvest().await?;
        let realized = events::received(&receipt, self.reward.address, self.ctx.wallet());
        let balance = self.reward.wallet_balance().await?;

        if realized.is_zero() {
            return Err(StepError::unexpected(format!("harvest {} moved no {}", receipt.tx_hash, self.reward.symbol)));
        }
        if realized > balance {
            return Err(StepError::unexpected(format!(
                "harvest {} reported {} {} but the wallet holds {}",
                receipt.tx_hash, realized, self.reward.symbol, balance
            )));
        }

        let amount = if self.process_all { balance } else { realized };
        info!(
            step = "harvest",
            amount = %amount,
            gas = %receipt.gas_cost(),
            tx = %receipt.tx_hash,
            "Harvested {:.6} {}",
            yield_model::to_units(realized, self.reward.decimals),
            self.reward.symbol
        );
        Ok(amount)
    }

    /// Stake LP tokens, approving the farm first when needed.
    pub async fn deposit(&self, lp_amount: U256) -> Result<Deposited, StepError> {
        let amount = if self.process_all { self.lp.wallet_balance().await? } else { lp_amount };
        if amount.is_zero() {
            return Err(StepError::postpone("no LP tokens to deposit"));
        }

        let approval = self.lp.ensure_allowance(self.address, amount).await?;
        let receipt = self.farm.deposit(amount).await?;
        info!(
            step = "deposit",
            amount = %amount,
            gas = %receipt.gas_cost(),
            tx = %receipt.tx_hash,
            "Deposited {:.10} {}",
            yield_model::to_units(amount, self.lp.decimals),
            self.lp.symbol
        );
        Ok(Deposited { amount, approved: matches!(approval, Approval::Granted { .. }) })
    }

    // ============================================
    // POSITION AND YIELD
    // ============================================

    /// Native value of one whole unit of `token`.
    async fn unit_price(&self, token: &Erc20) -> Result<f64, ChainError> {
        let one = U256::from(10u64).pow(U256::from(token.decimals));
        let out = self.router.quote(one, token.address, self.router.wrapped_native).await?;
        Ok(yield_model::to_units(out, NATIVE_DECIMALS))
    }

    async fn native_fiat_price(&self) -> Result<Option<f64>, ChainError> {
        let Some(fiat) = &self.fiat else {
            return Ok(None);
        };
        let one = U256::from(10u64).pow(U256::from(NATIVE_DECIMALS));
        let out = self.router.quote(one, self.router.wrapped_native, fiat.address).await?;
        Ok(Some(yield_model::to_units(out, fiat.decimals)))
    }

    pub async fn unit_prices(&self) -> Result<UnitPrices, ChainError> {
        let (reward, token_a, token_b, native_fiat) = futures::try_join!(
            self.unit_price(&self.reward),
            self.unit_price(&self.token_a),
            self.unit_price(&self.token_b),
            self.native_fiat_price(),
        )?;
        Ok(UnitPrices { reward, token_a, token_b, native_fiat })
    }

    /// Value the position and find the optimal compounding frequency for a
    /// cycle costing `gas_cost_per_cycle` wei.
    pub async fn compute_yield(&self, gas_cost_per_cycle: U256) -> Result<(Position, YieldEstimate), YieldError> {
        let pair = self.router.lp;
        let (prices, pending, per_second, weight, user, reserve_a, reserve_b, lp_supply, lp_in_farm) = futures::try_join!(
            self.unit_prices(),
            self.farm.pending_reward(),
            self.farm.reward_per_second(),
            self.farm.pool_weight(),
            self.farm.user_info(),
            self.token_a.balance_of(pair),
            self.token_b.balance_of(pair),
            self.lp.total_supply(),
            self.lp.balance_of(self.address),
        )?;

        let reserves = PoolReserves {
            token_a: yield_model::to_units(reserve_a, self.token_a.decimals),
            token_b: yield_model::to_units(reserve_b, self.token_b.decimals),
            lp_supply: yield_model::to_units(lp_supply, self.lp.decimals),
            lp_in_farm: yield_model::to_units(lp_in_farm, self.lp.decimals),
        };
        let valuation =
            yield_model::value_lp(&reserves, &prices, self.token_a_offset_pct, self.token_b_offset_pct)?;
        let emission = Emission {
            reward_per_second: yield_model::to_units(per_second, self.reward.decimals),
            alloc_point: yield_model::to_units(weight.alloc_point, 0),
            total_alloc_point: yield_model::to_units(weight.total_alloc_point, 0),
        };
        let apr = yield_model::compute_apr(&emission, &reserves, &valuation, prices.reward)?;

        let deposit = yield_model::to_units(user.amount, self.lp.decimals);
        let share = deposit / reserves.lp_supply;
        let fiat = prices.native_fiat;
        let position = Position {
            pending_reward: TokenValue::new(
                &self.reward.symbol,
                yield_model::to_units(pending, self.reward.decimals),
                prices.reward,
                fiat,
            ),
            deposit: TokenValue::new(&self.lp.symbol, deposit, valuation.per_lp, fiat),
            underlying_a: TokenValue::new(&self.token_a.symbol, reserves.token_a * share, prices.token_a, fiat),
            underlying_b: TokenValue::new(&self.token_b.symbol, reserves.token_b * share, prices.token_b, fiat),
            prices,
        };

        let gas_cost = yield_model::to_units(gas_cost_per_cycle, NATIVE_DECIMALS);
        let plan = yield_model::optimal_compounding(apr, gas_cost, position.deposit.native)?;
        let estimate = YieldEstimate {
            apr_pct: apr,
            optimal_apy_pct: plan.apy_pct,
            compounds_per_year: plan.compounds_per_year,
            interval_secs: plan.interval_secs,
        };

        self.log_summary(&position, &estimate);
        Ok((position, estimate))
    }

    fn log_summary(&self, position: &Position, estimate: &YieldEstimate) {
        let describe = |value: &TokenValue| value.describe(&self.native_symbol, &self.fiat_symbol);
        info!("Pending reward: {}", describe(&position.pending_reward));
        info!("Deposit:        {}", describe(&position.deposit));
        info!("  {}", describe(&position.underlying_a));
        info!("  {}", describe(&position.underlying_b));
        info!(
            apr = estimate.apr_pct,
            apy = estimate.optimal_apy_pct,
            compounds = estimate.compounds_per_year,
            "APR {:.2}% → optimal APY {:.2}% at {} compounds/year (every {}s)",
            estimate.apr_pct,
            estimate.optimal_apy_pct,
            estimate.compounds_per_year,
            estimate.interval_secs
        );
    }
}
