//! Gas Price Oracle
//!
//! Applies the configured gas policy on top of a live quote:
//! a fixed price overrides everything, otherwise the live price plus an
//! offset, floored at a configured minimum.
//!
//! The live quote comes from Etherscan's `eth_gasPrice` proxy when an API key
//! is configured, falling back to the RPC node.
//!
//! API: https://api.etherscan.io/v2/api?chainid=1&module=proxy&action=eth_gasPrice

use crate::chain::ChainClient;
use crate::config::GasConfig;
use crate::error::ChainError;
use eyre::{eyre, Result};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

// ============================================
// CONSTANTS
// ============================================

/// Etherscan API base URL (v2 supports multiple chains)
const ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

/// Cache duration for live gas prices (avoid hitting rate limits)
const CACHE_DURATION_SECS: u64 = 10;

/// Timeout for API calls
const API_TIMEOUT_SECS: u64 = 5;

const WEI_PER_GWEI: f64 = 1e9;

// ============================================
// API RESPONSE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    result: Option<String>,
    error: Option<EtherscanError>,
}

#[derive(Debug, Deserialize)]
struct EtherscanError {
    code: i64,
    message: String,
}

// ============================================
// GAS POLICY
// ============================================

/// Fixed override, or live price plus offset floored at a minimum. All wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    pub fixed_wei: u128,
    pub min_wei: u128,
    pub offset_wei: u128,
}

impl GasPolicy {
    pub fn from_config(config: &GasConfig) -> Self {
        Self {
            fixed_wei: gwei_to_wei(config.fixed_gwei),
            min_wei: gwei_to_wei(config.min_gwei),
            offset_wei: gwei_to_wei(config.offset_gwei),
        }
    }

    #[cfg(test)]
    pub fn fixed(wei: u128) -> Self {
        Self { fixed_wei: wei, min_wei: 0, offset_wei: 0 }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_wei > 0
    }

    /// Final gas price for a given live quote.
    pub fn apply(&self, live_wei: u128) -> u128 {
        if self.is_fixed() {
            return self.fixed_wei;
        }
        live_wei.saturating_add(self.offset_wei).max(self.min_wei)
    }
}

pub fn gwei_to_wei(gwei: f64) -> u128 {
    if gwei <= 0.0 || !gwei.is_finite() {
        return 0;
    }
    (gwei * WEI_PER_GWEI).round() as u128
}

pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / WEI_PER_GWEI
}

// ============================================
// CACHED LIVE PRICE
// ============================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GasSource {
    Etherscan,
    RpcProvider,
}

impl std::fmt::Display for GasSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GasSource::Etherscan => write!(f, "Etherscan"),
            GasSource::RpcProvider => write!(f, "RPC"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GasPriceInfo {
    pub live_wei: u128,
    pub fetched_at: Instant,
    pub source: GasSource,
}

impl GasPriceInfo {
    pub fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() > Duration::from_secs(CACHE_DURATION_SECS)
    }
}

// ============================================
// GAS ORACLE
// ============================================

struct EtherscanSource {
    http_client: Client,
    api_key: String,
    chain_id: u64,
}

pub struct GasOracle {
    policy: GasPolicy,
    client: Arc<dyn ChainClient>,
    etherscan: Option<EtherscanSource>,
    cache: RwLock<Option<GasPriceInfo>>,
}

impl GasOracle {
    pub fn new(policy: GasPolicy, client: Arc<dyn ChainClient>) -> Self {
        Self { policy, client, etherscan: None, cache: RwLock::new(None) }
    }

    /// Prefer Etherscan for the live quote. The RPC node stays the fallback.
    pub fn with_etherscan(mut self, api_key: String, chain_id: u64) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;
        self.etherscan = Some(EtherscanSource { http_client, api_key, chain_id });
        Ok(self)
    }

    /// Gas price to submit with, in wei.
    pub async fn gas_price(&self) -> Result<u128, ChainError> {
        if self.policy.is_fixed() {
            return Ok(self.policy.fixed_wei);
        }
        let live = self.live_price().await?;
        let price = self.policy.apply(live.live_wei);
        trace!("Gas price {:.2} gwei (live {:.2} from {})", wei_to_gwei(price), wei_to_gwei(live.live_wei), live.source);
        Ok(price)
    }

    async fn live_price(&self) -> Result<GasPriceInfo, ChainError> {
        {
            let cache = self.cache.read().await;
            if let Some(ref info) = *cache {
                if !info.is_stale() {
                    trace!("Using cached gas price: {:.2} gwei", wei_to_gwei(info.live_wei));
                    return Ok(info.clone());
                }
            }
        }

        let info = self.fetch_live_price().await?;

        {
            let mut cache = self.cache.write().await;
            *cache = Some(info.clone());
        }

        Ok(info)
    }

    /// Tries Etherscan first (if configured), then the RPC node.
    async fn fetch_live_price(&self) -> Result<GasPriceInfo, ChainError> {
        if let Some(ref etherscan) = self.etherscan {
            match Self::fetch_from_etherscan(etherscan).await {
                Ok(live_wei) => {
                    debug!("⛽ Gas from Etherscan: {:.2} gwei", wei_to_gwei(live_wei));
                    return Ok(GasPriceInfo { live_wei, fetched_at: Instant::now(), source: GasSource::Etherscan });
                }
                Err(e) => warn!("Etherscan gas fetch failed: {}", e),
            }
        }

        let live_wei = self.client.node_gas_price().await?;
        debug!("⛽ Gas from RPC: {:.2} gwei", wei_to_gwei(live_wei));
        Ok(GasPriceInfo { live_wei, fetched_at: Instant::now(), source: GasSource::RpcProvider })
    }

    async fn fetch_from_etherscan(source: &EtherscanSource) -> Result<u128> {
        let url = format!(
            "{}?chainid={}&module=proxy&action=eth_gasPrice&apikey={}",
            ETHERSCAN_API_URL, source.chain_id, source.api_key
        );

        let response: EtherscanResponse = source.http_client.get(&url).send().await?.json().await?;

        if let Some(error) = response.error {
            return Err(eyre!("Etherscan error: {} (code {})", error.message, error.code));
        }

        let result = response.result.ok_or_else(|| eyre!("No result from Etherscan"))?;
        parse_hex_wei(&result)
    }
}

fn parse_hex_wei(value: &str) -> Result<u128> {
    u128::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| eyre!("Failed to parse gas price '{}': {}", value, e))
}

// ============================================
// TESTS
// ============================================
