//! Yield model.
//!
//! Values the LP position from pool reserves, derives the farm's APR, and
//! searches for the compounding frequency that maximises APY net of gas.
//! All inputs are plain `f64` in token or native units; the caller converts
//! on-chain integers with [`to_units`].

use crate::error::YieldError;
use crate::position::UnitPrices;
use alloy_primitives::U256;

pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Convert an integer token amount to whole units.
pub fn to_units(amount: U256, decimals: u8) -> f64 {
    let raw: f64 = amount.to_string().parse().unwrap_or(0.0);
    raw / 10f64.powi(decimals as i32)
}

// ============================================
// LP VALUATION
// ============================================

/// Pool state in token units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolReserves {
    pub token_a: f64,
    pub token_b: f64,
    pub lp_supply: f64,
    /// LP tokens staked in the farm by everyone
    pub lp_in_farm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LpValuation {
    /// Native value of one LP token
    pub per_lp: f64,
    /// Per-LP value after the per-token offsets
    pub offset_per_lp: f64,
    /// Token A's share of the pool's value
    pub token_a_share: f64,
}

/// Native value of one LP token, raw and offset-adjusted.
pub fn value_lp(
    reserves: &PoolReserves,
    prices: &UnitPrices,
    token_a_offset_pct: f64,
    token_b_offset_pct: f64,
) -> Result<LpValuation, YieldError> {
    if reserves.lp_supply <= 0.0 {
        return Err(YieldError::EmptyPool("LP supply"));
    }
    let a = reserves.token_a * prices.token_a;
    let b = reserves.token_b * prices.token_b;
    if a + b <= 0.0 {
        return Err(YieldError::EmptyPool("liquidity"));
    }

    let offset_a = a * (1.0 + token_a_offset_pct / 100.0);
    let offset_b = b * (1.0 + token_b_offset_pct / 100.0);

    Ok(LpValuation {
        per_lp: (a + b) / reserves.lp_supply,
        offset_per_lp: (offset_a + offset_b) / reserves.lp_supply,
        token_a_share: a / (a + b),
    })
}

// ============================================
// APR
// ============================================

/// Farm emission in reward-token units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    pub reward_per_second: f64,
    pub alloc_point: f64,
    pub total_alloc_point: f64,
}

/// APR (percent) paid to LP stakers, in native terms.
pub fn compute_apr(
    emission: &Emission,
    reserves: &PoolReserves,
    valuation: &LpValuation,
    reward_price: f64,
) -> Result<f64, YieldError> {
    if emission.total_alloc_point <= 0.0 {
        return Err(YieldError::EmptyPool("allocation points"));
    }
    let farm_holding = reserves.lp_in_farm * valuation.per_lp;
    if farm_holding <= 0.0 {
        return Err(YieldError::EmptyPool("LP staked in farm"));
    }

    let weight = emission.alloc_point / emission.total_alloc_point;
    let reward_per_year = emission.reward_per_second * SECONDS_PER_YEAR as f64;
    let apr = weight * reward_per_year / farm_holding * 100.0 * reward_price
        * (valuation.offset_per_lp / valuation.per_lp);

    if !apr.is_finite() || apr <= 0.0 {
        return Err(YieldError::NonPositiveApr(apr));
    }
    Ok(apr)
}

// ============================================
// OPTIMAL COMPOUNDING
// ============================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompoundingPlan {
    pub apy_pct: f64,
    pub compounds_per_year: u64,
    pub interval_secs: u64,
}

/// APY (percent) of `apr_pct` compounded `n` times a year.
pub fn apy(apr_pct: f64, n: u64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    100.0 * ((1.0 + apr_pct / (100.0 * n)).powf(n) - 1.0)
}

/// APY after paying `gas_cost` per compound on a deposit worth `deposit_value`.
pub fn net_apy(apr_pct: f64, n: u64, gas_cost: f64, deposit_value: f64) -> f64 {
    apy(apr_pct, n) - 100.0 * n as f64 * gas_cost / deposit_value
}

/// Smallest-`n` local maximum of [`net_apy`], walking up from zero.
///
/// Fails when even a single yearly compound does not beat holding. The search
/// never goes past one compound per second.
pub fn optimal_compounding(apr_pct: f64, gas_cost: f64, deposit_value: f64) -> Result<CompoundingPlan, YieldError> {
    if !apr_pct.is_finite() || apr_pct <= 0.0 {
        return Err(YieldError::NonPositiveApr(apr_pct));
    }
    if !deposit_value.is_finite() || deposit_value <= 0.0 {
        return Err(YieldError::NoDeposit(deposit_value));
    }
    let gas_cost = gas_cost.max(0.0);

    let mut best_n = 0u64;
    let mut best_apy = 0.0;
    while best_n < SECONDS_PER_YEAR {
        let candidate = net_apy(apr_pct, best_n + 1, gas_cost, deposit_value);
        if candidate <= best_apy {
            break;
        }
        best_apy = candidate;
        best_n += 1;
    }

    if best_n == 0 {
        return Err(YieldError::NoImprovement);
    }
    Ok(CompoundingPlan {
        apy_pct: best_apy,
        compounds_per_year: best_n,
        interval_secs: SECONDS_PER_YEAR / best_n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices() -> UnitPrices {
        UnitPrices { reward: 2.0, token_a: 1.0, token_b: 0.5, native_fiat: None }
    }

    #[test]
    fn test_to_units() {
        assert_eq!(to_units(U256::from(1_500_000u64), 6), 1.5);
        assert_eq!(to_units(U256::from(10u128.pow(18)), 18), 1.0);
    }

    #[test]
    fn test_four_compounds_at_36_pct_and_half_pct_gas() {
        let plan = optimal_compounding(36.0, 0.5, 100.0).unwrap();
        assert_eq!(plan.compounds_per_year, 4);
        assert_eq!(plan.interval_secs, SECONDS_PER_YEAR / 4);
        assert!((plan.apy_pct - 39.158161).abs() < 1e-4);
    }

    #[test]
    fn test_result_is_local_maximum() {
        for (apr, gas, deposit) in [(36.0, 0.5, 100.0), (120.0, 0.01, 50.0), (8.0, 0.001, 1_000.0)] {
            let plan = optimal_compounding(apr, gas, deposit).unwrap();
            let n = plan.compounds_per_year;
            let at = net_apy(apr, n, gas, deposit);
            assert!(at > net_apy(apr, n - 1, gas, deposit) || n == 1);
            assert!(at >= net_apy(apr, n + 1, gas, deposit));
        }
    }

    #[test]
    fn test_more_gas_never_compounds_more_often() {
        let mut previous = u64::MAX;
        for gas in [0.0001, 0.001, 0.01, 0.1, 1.0, 5.0] {
            let plan = optimal_compounding(50.0, gas, 100.0).unwrap();
            assert!(plan.compounds_per_year <= previous);
            previous = plan.compounds_per_year;
        }
    }

    #[test]
    fn test_gas_exceeding_yield_fails() {
        let err = optimal_compounding(10.0, 20.0, 100.0).unwrap_err();
        assert!(matches!(err, YieldError::NoImprovement));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(optimal_compounding(0.0, 1.0, 100.0), Err(YieldError::NonPositiveApr(_))));
        assert!(matches!(optimal_compounding(10.0, 1.0, 0.0), Err(YieldError::NoDeposit(_))));
    }

    #[test]
    fn test_lp_valuation_with_offsets() {
        let reserves = PoolReserves { token_a: 100.0, token_b: 200.0, lp_supply: 50.0, lp_in_farm: 10.0 };
        let v = value_lp(&reserves, &prices(), 10.0, 0.0).unwrap();

        // A = 100 native, B = 100 native
        assert_eq!(v.per_lp, 4.0);
        assert!((v.offset_per_lp - 4.2).abs() < 1e-12);
        assert_eq!(v.token_a_share, 0.5);
    }

    #[test]
    fn test_apr() {
        let reserves = PoolReserves { token_a: 100.0, token_b: 200.0, lp_supply: 50.0, lp_in_farm: 10.0 };
        let v = value_lp(&reserves, &prices(), 0.0, 0.0).unwrap();
        let emission = Emission {
            reward_per_second: 1.0 / SECONDS_PER_YEAR as f64,
            alloc_point: 1.0,
            total_alloc_point: 4.0,
        };

        // 0.25 reward/yr * 2 native = 0.5 native/yr on 40 native staked
        let apr = compute_apr(&emission, &reserves, &v, prices().reward).unwrap();
        assert!((apr - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_apr_requires_staked_liquidity() {
        let reserves = PoolReserves { token_a: 100.0, token_b: 200.0, lp_supply: 50.0, lp_in_farm: 0.0 };
        let v = value_lp(&reserves, &prices(), 0.0, 0.0).unwrap();
        let emission = Emission { reward_per_second: 1.0, alloc_point: 1.0, total_alloc_point: 1.0 };
        assert!(compute_apr(&emission, &reserves, &v, 2.0).is_err());
    }
}
