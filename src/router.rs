//! UniswapV2-style router adapter.
//!
//! Quotes are `getAmountsOut` along a path routed through the wrapped native
//! token. How liquidity is added (router or tax office) and how reward becomes
//! LP (split swaps or a single zap) are fixed when the router is built.

use crate::chain::abi::{ITaxOffice, IUniswapV2Factory, IUniswapV2Router02, IZapper};
use crate::chain::{events, ChainContext, TxReceipt};
use crate::config::Config;
use crate::error::{ChainError, FatalError};
use crate::farm::FarmKind;
use alloy_primitives::{Address, U256};
use tracing::{debug, info};

const BPS: u64 = 10_000;

/// Tax-free liquidity is supplied at this share of the desired amounts.
const TAX_FREE_DESIRED_PCT: u64 = 95;

/// How the pair's liquidity is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidityMode {
    Router,
    TaxFree { office: Address },
}

impl LiquidityMode {
    /// Pick the mode for an instance. Tax-free outside its farm family is fatal.
    pub fn select(config: &Config, kind: FarmKind) -> Result<Self, FatalError> {
        match config.pool.tax_free {
            Some(office) if kind.supports_tax_free() => Ok(LiquidityMode::TaxFree { office }),
            Some(_) => Err(FatalError::TaxFreeUnsupported(config.farm.farm_type.clone())),
            None => Ok(LiquidityMode::Router),
        }
    }
}

/// How harvested reward is turned into LP tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStrategy {
    /// Swap half to each token, then add liquidity.
    Split,
    /// One `zapInToken` call.
    Zap { zap: Address },
}

#[derive(Clone)]
pub struct PoolRouter {
    ctx: ChainContext,
    pub address: Address,
    pub factory: Address,
    pub wrapped_native: Address,
    pub token_a: Address,
    pub token_b: Address,
    pub lp: Address,
    slippage_bps: u64,
    liquidity: LiquidityMode,
    strategy: SwapStrategy,
}

impl PoolRouter {
    pub fn new(ctx: ChainContext, config: &Config, kind: FarmKind) -> Result<Self, FatalError> {
        let liquidity = LiquidityMode::select(config, kind)?;
        let strategy = match config.pool.zap {
            Some(zap) => SwapStrategy::Zap { zap },
            None => SwapStrategy::Split,
        };
        Ok(Self {
            ctx,
            address: config.pool.router,
            factory: config.pool.factory,
            wrapped_native: config.tokens.wrapped_native,
            token_a: config.pool.token_a,
            token_b: config.pool.token_b,
            lp: config.pool.lp,
            slippage_bps: (config.pool.slippage_pct * 100.0).round() as u64,
            liquidity,
            strategy,
        })
    }

    pub fn strategy(&self) -> SwapStrategy {
        self.strategy
    }

    /// Contract that pulls the pair tokens when liquidity is added.
    pub fn liquidity_spender(&self) -> Address {
        match self.liquidity {
            LiquidityMode::Router => self.address,
            LiquidityMode::TaxFree { office } => office,
        }
    }

    /// Swap path, hopping through wrapped native unless an endpoint is it.
    pub fn path(&self, from: Address, to: Address) -> Vec<Address> {
        if from == self.wrapped_native || to == self.wrapped_native {
            vec![from, to]
        } else {
            vec![from, self.wrapped_native, to]
        }
    }

    /// Minimum acceptable output for a quoted amount.
    pub fn min_out(&self, quoted: U256) -> U256 {
        quoted * U256::from(BPS.saturating_sub(self.slippage_bps)) / U256::from(BPS)
    }

    /// Expected output of swapping `amount_in` of `from` into `to`.
    pub async fn quote(&self, amount_in: U256, from: Address, to: Address) -> Result<U256, ChainError> {
        if from == to || amount_in.is_zero() {
            return Ok(amount_in);
        }
        let amounts = self
            .ctx
            .read(self.address, IUniswapV2Router02::getAmountsOutCall { amountIn: amount_in, path: self.path(from, to) })
            .await?;
        amounts
            .last()
            .copied()
            .ok_or_else(|| ChainError::Abi("getAmountsOut returned no amounts".to_string()))
    }

    /// Native cost of a reference swap (half the wallet's native balance
    /// into `token`) at the current gas price. A zero cost is an error.
    pub async fn estimate_swap_cost(&self, token: Address) -> Result<U256, ChainError> {
        let wallet = self.ctx.wallet();
        let balance = self.ctx.client.native_balance(wallet).await?;
        let call = IUniswapV2Router02::swapExactETHForTokensCall {
            amountOutMin: U256::ZERO,
            path: self.path(self.wrapped_native, token),
            to: wallet,
            deadline: self.ctx.deadline(),
        };
        let gas = self
            .ctx
            .client
            .estimate_gas(self.address, alloy_sol_types::SolCall::abi_encode(&call).into(), balance / U256::from(2))
            .await?;
        let gas_price = self.ctx.gas.gas_price().await?;
        let cost = U256::from(gas) * U256::from(gas_price);
        if cost.is_zero() {
            return Err(ChainError::ZeroGasEstimate);
        }
        Ok(cost)
    }

    /// Swap `amount_in` of `token` for the native coin.
    pub async fn swap_to_native(&self, token: Address, amount_in: U256, min_out: U256) -> Result<TxReceipt, ChainError> {
        let call = IUniswapV2Router02::swapExactTokensForETHCall {
            amountIn: amount_in,
            amountOutMin: min_out,
            path: self.path(token, self.wrapped_native),
            to: self.ctx.wallet(),
            deadline: self.ctx.deadline(),
        };
        self.ctx.send(self.address, call, U256::ZERO).await
    }

    /// Swap `amount_in` of `from` into `to`. Returns the amount received.
    pub async fn swap(&self, from: Address, to: Address, amount_in: U256) -> Result<(U256, TxReceipt), ChainError> {
        let quoted = self.quote(amount_in, from, to).await?;
        let min_out = self.min_out(quoted);
        debug!("Swapping {} of {} for at least {} of {}", amount_in, from, min_out, to);

        let wallet = self.ctx.wallet();
        let call = IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: amount_in,
            amountOutMin: min_out,
            path: self.path(from, to),
            to: wallet,
            deadline: self.ctx.deadline(),
        };
        let receipt = self.ctx.send(self.address, call, U256::ZERO).await?;
        Ok((events::received(&receipt, to, wallet), receipt))
    }

    /// Add liquidity for the pair. Returns the LP tokens minted to the wallet.
    pub async fn add_liquidity(&self, amount_a: U256, amount_b: U256) -> Result<(U256, TxReceipt), ChainError> {
        let wallet = self.ctx.wallet();
        let receipt = match self.liquidity {
            LiquidityMode::Router => {
                let call = IUniswapV2Router02::addLiquidityCall {
                    tokenA: self.token_a,
                    tokenB: self.token_b,
                    amountADesired: amount_a,
                    amountBDesired: amount_b,
                    amountAMin: amount_a / U256::from(2),
                    amountBMin: amount_b / U256::from(2),
                    to: wallet,
                    deadline: self.ctx.deadline(),
                };
                self.ctx.send(self.address, call, U256::ZERO).await?
            }
            LiquidityMode::TaxFree { office } => {
                // Token B is the taxed token; the office mints LP to the caller.
                let scale = |amount: U256| amount * U256::from(TAX_FREE_DESIRED_PCT) / U256::from(100);
                let call = ITaxOffice::addLiquidityTaxFreeCall {
                    token: self.token_a,
                    amtTomb: scale(amount_b),
                    amtToken: scale(amount_a),
                    amtTombMin: amount_b / U256::from(2),
                    amtTokenMin: amount_a / U256::from(2),
                };
                self.ctx.send(office, call, U256::ZERO).await?
            }
        };
        Ok((events::received(&receipt, self.lp, wallet), receipt))
    }

    /// Convert `amount` of `reward` into LP in one transaction.
    pub async fn zap(&self, zap: Address, reward: Address, amount: U256) -> Result<(U256, TxReceipt), ChainError> {
        let wallet = self.ctx.wallet();
        let call = IZapper::zapInTokenCall {
            _from: reward,
            amount,
            _to: self.lp,
            routerAddr: self.address,
            _recipient: wallet,
        };
        let receipt = self.ctx.send(zap, call, U256::ZERO).await?;
        Ok((events::received(&receipt, self.lp, wallet), receipt))
    }

    /// The factory's pair for (token A, token B) must be the configured LP.
    pub async fn check_pair(&self) -> Result<(), FatalError> {
        let pair = self
            .ctx
            .read(self.factory, IUniswapV2Factory::getPairCall { tokenA: self.token_a, tokenB: self.token_b })
            .await
            .map_err(|e| FatalError::PairCheckFailed(e.to_string()))?;

        if pair != self.lp {
            return Err(FatalError::PairMismatch { configured: self.lp, found: pair });
        }
        info!("✓ LP pair verified: {:?}", pair);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{transfer_log, MockChain, WALLET};
    use crate::config::tests::sample;
    use alloy_sol_types::{SolCall, SolValue};
    use std::sync::Arc;

    fn router(chain: &Arc<MockChain>, config: &Config) -> PoolRouter {
        PoolRouter::new(chain.context(), config, config.farm_kind().unwrap()).unwrap()
    }

    #[test]
    fn test_path_hops_through_wrapped_native() {
        let chain = Arc::new(MockChain::new());
        let config = sample();
        let r = router(&chain, &config);
        let reward = config.farm.reward;

        assert_eq!(r.path(reward, config.pool.token_b), vec![reward, r.wrapped_native, config.pool.token_b]);
        assert_eq!(r.path(reward, r.wrapped_native), vec![reward, r.wrapped_native]);
    }

    #[test]
    fn test_min_out_applies_slippage() {
        let chain = Arc::new(MockChain::new());
        let r = router(&chain, &sample());
        // 1.5% slippage
        assert_eq!(r.min_out(U256::from(10_000)), U256::from(9_850));
    }

    #[test]
    fn test_tax_free_mode_selection() {
        let mut config = sample();
        config.pool.tax_free = Some(Address::repeat_byte(7));
        let mode = LiquidityMode::select(&config, FarmKind::TShareRewardPool).unwrap();
        assert_eq!(mode, LiquidityMode::TaxFree { office: Address::repeat_byte(7) });

        let err = LiquidityMode::select(&config, FarmKind::SinglePoolPerBlock).unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }

    #[tokio::test]
    async fn test_quote_takes_last_amount() {
        let chain = Arc::new(MockChain::new());
        let config = sample();
        let r = router(&chain, &config);
        chain.on_call::<IUniswapV2Router02::getAmountsOutCall>(
            r.address,
            vec![U256::from(1_000), U256::from(50), U256::from(7)].abi_encode(),
        );

        let out = r.quote(U256::from(1_000), config.farm.reward, config.pool.token_b).await.unwrap();
        assert_eq!(out, U256::from(7));

        let same = r.quote(U256::from(5), config.farm.reward, config.farm.reward).await.unwrap();
        assert_eq!(same, U256::from(5));
    }

    #[tokio::test]
    async fn test_swap_reports_received_amount() {
        let chain = Arc::new(MockChain::new());
        let config = sample();
        let r = router(&chain, &config);
        let token_b = config.pool.token_b;
        chain.on_call::<IUniswapV2Router02::getAmountsOutCall>(
            r.address,
            vec![U256::from(100), U256::from(20), U256::from(10)].abi_encode(),
        );
        chain.push_receipt(vec![transfer_log(token_b, config.pool.lp, WALLET, U256::from(9))]);

        let (received, _) = r.swap(config.farm.reward, token_b, U256::from(100)).await.unwrap();
        assert_eq!(received, U256::from(9));

        let sent = chain.sent();
        let call = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(&sent[0].input).unwrap();
        assert_eq!(call.amountOutMin, U256::from(9));
    }

    #[tokio::test]
    async fn test_tax_free_liquidity_scales_amounts() {
        let chain = Arc::new(MockChain::new());
        let mut config = sample();
        let office = Address::repeat_byte(7);
        config.pool.tax_free = Some(office);
        let r = router(&chain, &config);
        chain.push_receipt(vec![transfer_log(config.pool.lp, Address::ZERO, WALLET, U256::from(33))]);

        let (lp, _) = r.add_liquidity(U256::from(1_000), U256::from(2_000)).await.unwrap();
        assert_eq!(lp, U256::from(33));

        let sent = chain.sent();
        assert_eq!(sent[0].to, office);
        let call = ITaxOffice::addLiquidityTaxFreeCall::abi_decode(&sent[0].input).unwrap();
        assert_eq!(call.amtTomb, U256::from(1_900));
        assert_eq!(call.amtToken, U256::from(950));
        assert_eq!(call.amtTombMin, U256::from(1_000));
        assert_eq!(call.amtTokenMin, U256::from(500));
    }

    #[tokio::test]
    async fn test_check_pair() {
        let chain = Arc::new(MockChain::new());
        let config = sample();
        let r = router(&chain, &config);

        let err = r.check_pair().await.unwrap_err();
        assert_eq!(err.exit_code(), 5);

        chain.on_call::<IUniswapV2Factory::getPairCall>(r.factory, Address::repeat_byte(3).abi_encode());
        let err = r.check_pair().await.unwrap_err();
        assert_eq!(err.exit_code(), 4);

        chain.on_call::<IUniswapV2Factory::getPairCall>(r.factory, config.pool.lp.abi_encode());
        assert!(r.check_pair().await.is_ok());
    }

    #[tokio::test]
    async fn test_swap_cost_uses_estimate_and_gas_price() {
        let chain = Arc::new(MockChain::new());
        chain.set_gas_estimate(200_000);
        chain.set_native_balance(U256::from(10u64.pow(18)));
        let config = sample();
        let r = router(&chain, &config);

        let cost = r.estimate_swap_cost(config.farm.reward).await.unwrap();
        // 200k gas at the mock's fixed 1 gwei
        assert_eq!(cost, U256::from(200_000u64 * 1_000_000_000));
    }

    #[tokio::test]
    async fn test_zero_swap_cost_is_an_error() {
        let chain = Arc::new(MockChain::new());
        chain.set_gas_estimate(0);
        let config = sample();
        let r = router(&chain, &config);

        let err = r.estimate_swap_cost(config.farm.reward).await.unwrap_err();
        assert!(matches!(err, ChainError::ZeroGasEstimate));
    }
}
