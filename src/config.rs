//! Instance Configuration
//!
//! One TOML file describes one compounding instance: the network, the
//! wallet, the liquidity pool and the farm it is staked in. Secrets never live
//! in the file; see [`crate::chain::signer`] for how keys are supplied.

use crate::error::FatalError;
use crate::farm::FarmKind;
use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lowest slippage tolerance accepted, in percent.
pub const MIN_SLIPPAGE_PCT: f64 = 0.1;

// ============================================
// SECTIONS
// ============================================

/// Gas price policy. All values in gwei; zero disables a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// Native coin symbol, for display only
    #[serde(default = "default_gas_symbol")]
    pub symbol: String,

    /// When > 0, always submit at exactly this price
    #[serde(default)]
    pub fixed_gwei: f64,

    /// Floor applied to the live price
    #[serde(default)]
    pub min_gwei: f64,

    /// Added to the live price
    #[serde(default)]
    pub offset_gwei: f64,

    /// Use Etherscan's gas proxy for the live price
    #[serde(default)]
    pub etherscan_api_key: Option<String>,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            symbol: default_gas_symbol(),
            fixed_gwei: 0.0,
            min_gwei: 0.0,
            offset_gwei: 0.0,
            etherscan_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub address: Address,

    /// Encrypted JSON keystore. Without one the raw key is read from the environment.
    #[serde(default)]
    pub keystore: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Wrapped native token, the pricing hub for all quotes
    pub wrapped_native: Address,

    /// Fiat-pegged token for fiat valuations
    #[serde(default)]
    pub fiat: Option<Address>,

    #[serde(default = "default_fiat_decimals")]
    pub fiat_decimals: u8,

    #[serde(default = "default_fiat_symbol")]
    pub fiat_symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub token_a: Address,
    #[serde(default = "default_decimals")]
    pub token_a_decimals: u8,
    pub token_b: Address,
    #[serde(default = "default_decimals")]
    pub token_b_decimals: u8,
    pub lp: Address,
    #[serde(default = "default_decimals")]
    pub lp_decimals: u8,
    pub factory: Address,
    pub router: Address,

    /// Slippage tolerance in percent
    #[serde(default = "default_slippage")]
    pub slippage_pct: f64,

    /// Per-token valuation adjustment in percent, applied to the offset APR
    #[serde(default)]
    pub token_a_offset_pct: f64,
    #[serde(default)]
    pub token_b_offset_pct: f64,

    /// Zap contract converting reward to LP in one transaction
    #[serde(default)]
    pub zap: Option<Address>,

    /// Tax office for tax-free liquidity (token B must be the taxed token)
    #[serde(default)]
    pub tax_free: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Farm ABI family, e.g. "WFTM-TOMB_TSHARE"
    pub farm_type: String,
    pub contract: Address,
    pub reward: Address,
    #[serde(default = "default_decimals")]
    pub reward_decimals: u8,
    #[serde(default)]
    pub pool_id: u64,

    /// Use whole wallet balances instead of per-step realised amounts
    #[serde(default)]
    pub process_all_rewards: bool,

    /// Block time for per-block emission farms
    #[serde(default = "default_block_time")]
    pub block_time_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundConfig {
    /// Receives the developer fee
    pub dev_fee_recipient: Address,

    /// Retries per step; one more failure abandons the cycle
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// How often the yield estimate is refreshed while idle
    #[serde(default = "default_recompute_interval")]
    pub recompute_interval_secs: u64,
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Instance name; also names the state and report files
    pub name: String,

    pub rpc_url: String,

    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    pub chain_id: u64,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    #[serde(default)]
    pub gas: GasConfig,

    pub wallet: WalletConfig,
    pub tokens: TokenConfig,
    pub pool: PoolConfig,
    pub farm: FarmConfig,
    pub compound: CompoundConfig,
}

fn default_gas_symbol() -> String {
    "ETH".to_string()
}

fn default_fiat_symbol() -> String {
    "USD".to_string()
}

fn default_fiat_decimals() -> u8 {
    6
}

fn default_decimals() -> u8 {
    18
}

fn default_slippage() -> f64 {
    1.0
}

fn default_block_time() -> u64 {
    3
}

fn default_max_retries() -> u32 {
    20
}

fn default_retry_delay() -> u64 {
    5
}

fn default_recompute_interval() -> u64 {
    300
}

fn default_rpc_timeout() -> u64 {
    120
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("./logs")
}

impl Config {
    /// Load and validate an instance file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FatalError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FatalError::ConfigNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)
            .map_err(|e| FatalError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)
            .map_err(|e| FatalError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reject settings the compounder cannot run with.
    pub fn validate(&self) -> Result<(), FatalError> {
        let invalid = |msg: String| Err(FatalError::InvalidConfig(msg));

        if self.name.is_empty()
            || !self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return invalid(format!("name '{}' must be non-empty and file-name safe", self.name));
        }
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return invalid("rpc_url must point at a real node".to_string());
        }
        if self.rpc_timeout_secs == 0 {
            return invalid("rpc_timeout_secs must be positive".to_string());
        }
        if self.gas.fixed_gwei < 0.0 || self.gas.min_gwei < 0.0 || self.gas.offset_gwei < 0.0 {
            return invalid("gas settings must not be negative".to_string());
        }
        if !(MIN_SLIPPAGE_PCT..100.0).contains(&self.pool.slippage_pct) {
            return invalid(format!(
                "slippage_pct must be between {} and 100 (got {})",
                MIN_SLIPPAGE_PCT, self.pool.slippage_pct
            ));
        }
        if self.pool.token_a == self.pool.token_b {
            return invalid("token_a and token_b must differ".to_string());
        }
        if self.compound.max_retries == 0 {
            return invalid("max_retries must be at least 1".to_string());
        }

        let kind = self.farm_kind()?;
        if self.pool.tax_free.is_some() && !kind.supports_tax_free() {
            return Err(FatalError::TaxFreeUnsupported(self.farm.farm_type.clone()));
        }
        if self.pool.tax_free.is_some() && self.pool.zap.is_some() {
            return invalid("zap and tax_free are mutually exclusive".to_string());
        }

        Ok(())
    }

    pub fn farm_kind(&self) -> Result<FarmKind, FatalError> {
        self.farm.farm_type.parse()
    }

    /// Display symbols, taken from a farm type of the form `A-B_REWARD`.
    pub fn symbols(&self) -> PairSymbols {
        PairSymbols::from_farm_type(&self.farm.farm_type)
    }

    /// Default number of transactions per cycle, seeding the gas reserve.
    pub fn default_txn_count(&self) -> u32 {
        if self.pool.zap.is_some() {
            12
        } else if self.pool.tax_free.is_some() {
            9
        } else {
            8
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(format!("state_{}", self.name))
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_dir.join(format!("{}_cycles.jsonl", self.name))
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let symbols = self.symbols();
        let farm = match self.farm_kind() {
            Ok(kind) => kind.to_string(),
            Err(_) => self.farm.farm_type.clone(),
        };
        let gas = if self.gas.fixed_gwei > 0.0 {
            format!("fixed {:.2} gwei", self.gas.fixed_gwei)
        } else {
            format!("live +{:.2} (min {:.2}) gwei", self.gas.offset_gwei, self.gas.min_gwei)
        };
        let liquidity = if self.pool.zap.is_some() {
            "Zap"
        } else if self.pool.tax_free.is_some() {
            "Tax-free"
        } else {
            "Router"
        };

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║ {:^58} ║", format!("INSTANCE: {}", self.name));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:<40} ║", self.chain_id);
        println!("║ Wallet:            {:<40} ║", format!("{:?}", self.wallet.address));
        println!("║ Pair:              {:<40} ║", format!("{}-{}", symbols.token_a, symbols.token_b));
        println!("║ Reward:            {:<40} ║", symbols.reward);
        println!("║ Farm:              {:<40} ║", farm);
        println!("║ Pool ID:           {:<40} ║", self.farm.pool_id);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Liquidity Mode:    {:<40} ║", liquidity);
        println!("║ Slippage:          {:<40} ║", format!("{:.2}%", self.pool.slippage_pct));
        println!("║ Gas:               {:<40} ║", gas);
        println!("║ Process All:       {:<40} ║",
            if self.farm.process_all_rewards { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("║ Etherscan API:     {:<40} ║",
            if self.gas.etherscan_api_key.is_some() { "✓ Configured" } else { "✗ Using RPC" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

// ============================================
// SYMBOLS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairSymbols {
    pub token_a: String,
    pub token_b: String,
    pub reward: String,
}

impl PairSymbols {
    pub fn from_farm_type(farm_type: &str) -> Self {
        let parsed = farm_type.split_once('_').and_then(|(pair, reward)| {
            pair.split_once('-')
                .map(|(a, b)| (a.to_string(), b.to_string(), reward.to_string()))
        });
        match parsed {
            Some((token_a, token_b, reward)) => Self { token_a, token_b, reward },
            None => Self {
                token_a: "TOKEN_A".to_string(),
                token_b: "TOKEN_B".to_string(),
                reward: "REWARD".to_string(),
            },
        }
    }
}

// ============================================
// CYCLE REPORT LOG
// ============================================

/// One line of the per-instance cycle report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleLogEntry {
    pub timestamp: DateTime<Utc>,
    pub instance: String,
    pub outcome: String,
    pub txn_count: u32,
    pub duration_secs: f64,
    pub estimated_gas_per_txn: String,
    pub harvested: String,
    pub fee_sent: String,
    pub lp_deposited: String,
}

impl CycleLogEntry {
    /// Append this entry to a JSON-lines file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
name = "tomb-ftm"
rpc_url = "https://rpc.ftm.tools"
chain_id = 250

[gas]
symbol = "FTM"
min_gwei = 100.0

[wallet]
address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"

[tokens]
wrapped_native = "0x21be370D5312f44cB42ce377BC9b8a0cEF1A4C83"
fiat = "0x04068DA6C83AFCFA0e13ba15A6696662335D5B75"

[pool]
token_a = "0x21be370D5312f44cB42ce377BC9b8a0cEF1A4C83"
token_b = "0x6c021Ae822BEa943b2E66552bDe1D2696a53fbB7"
lp = "0x2A651563C9d3Af67aE0388a5c8F89b867038089e"
factory = "0x152eE697f2E276fA89E96742e9bB9aB1F2E61bE3"
router = "0xF491e7B69E4244ad4002BC14e878a34207E38c29"
slippage_pct = 1.5

[farm]
farm_type = "WFTM-TOMB_TSHARE"
contract = "0xcc0a87F7e7c693042a9Cc703661F5060c80ACb43"
reward = "0x4cdF39285D7Ca8eB3f090fDA0C069ba5F4145B37"
pool_id = 0

[compound]
dev_fee_recipient = "0x0000000000000000000000000000000000000001"
"#;

    pub(crate) fn sample() -> Config {
        Config::from_toml(SAMPLE).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = sample();
        assert!(config.validate().is_ok());
        assert_eq!(config.rpc_timeout_secs, 120);
        assert_eq!(config.tokens.fiat_decimals, 6);
        assert_eq!(config.compound.max_retries, 20);
        assert_eq!(config.compound.retry_delay_secs, 5);
        assert_eq!(config.farm.reward_decimals, 18);
        assert_eq!(config.default_txn_count(), 8);
        assert_eq!(config.state_path(), PathBuf::from("./state_tomb-ftm"));
    }

    #[test]
    fn test_slippage_floor() {
        let mut config = sample();
        config.pool.slippage_pct = 0.05;
        let err = config.validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_unknown_farm_type() {
        let mut config = sample();
        config.farm.farm_type = "SOMETHING_ELSE".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, FatalError::UnknownFarmType(_)));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_tax_free_requires_tshare_farm() {
        let mut config = sample();
        config.pool.tax_free = Some(Address::repeat_byte(9));
        assert!(config.validate().is_ok());
        assert_eq!(config.default_txn_count(), 9);

        config.farm.farm_type = "WFTM-YEL_YEL".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_zap_txn_count() {
        let mut config = sample();
        config.pool.zap = Some(Address::repeat_byte(9));
        assert_eq!(config.default_txn_count(), 12);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert_eq!(err.exit_code(), 11);
    }

    #[test]
    fn test_symbols_from_farm_type() {
        let symbols = sample().symbols();
        assert_eq!(symbols.token_a, "WFTM");
        assert_eq!(symbols.token_b, "TOMB");
        assert_eq!(symbols.reward, "TSHARE");

        assert_eq!(PairSymbols::from_farm_type("tshare_reward_pool").reward, "REWARD");
    }

    #[test]
    fn test_cycle_log_appends_lines() {
        let dir = std::env::temp_dir().join(format!("lp-compounder-log-{}", std::process::id()));
        let path = dir.join("x_cycles.jsonl");
        let entry = CycleLogEntry {
            timestamp: Utc::now(),
            instance: "x".to_string(),
            outcome: "completed".to_string(),
            txn_count: 8,
            duration_secs: 12.5,
            estimated_gas_per_txn: "1".to_string(),
            harvested: "2".to_string(),
            fee_sent: "0".to_string(),
            lp_deposited: "3".to_string(),
        };
        entry.append_to_file(&path).unwrap();
        entry.append_to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let _ = fs::remove_dir_all(dir);
    }
}
