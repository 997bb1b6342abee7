//! Position valuation and published snapshots.
//!
//! A [`Position`] is rebuilt from chain reads on every refresh and never
//! persisted. The latest view of each instance is published to the
//! [`SnapshotBoard`] as an immutable [`InstanceSnapshot`], replaced whole.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================
// VALUATION TYPES
// ============================================

/// Native-coin value of one unit of each token, plus the native fiat price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitPrices {
    pub reward: f64,
    pub token_a: f64,
    pub token_b: f64,
    /// Fiat per native coin, when a fiat token is configured
    pub native_fiat: Option<f64>,
}

/// An amount in token units with its native and fiat valuations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenValue {
    pub symbol: String,
    pub amount: f64,
    pub native: f64,
    pub fiat: Option<f64>,
}

impl TokenValue {
    pub fn new(symbol: &str, amount: f64, unit_price: f64, native_fiat: Option<f64>) -> Self {
        Self::from_native(symbol, amount, amount * unit_price, native_fiat)
    }

    pub fn from_native(symbol: &str, amount: f64, native: f64, native_fiat: Option<f64>) -> Self {
        Self {
            symbol: symbol.to_string(),
            amount,
            native,
            fiat: native_fiat.map(|price| native * price),
        }
    }

    /// e.g. `12.3456 TSHARE (0.4567 FTM / 123.45 USD)`
    pub fn describe(&self, native_symbol: &str, fiat_symbol: &str) -> String {
        match self.fiat {
            Some(fiat) => format!(
                "{:.6} {} ({:.6} {} / {:.2} {})",
                self.amount, self.symbol, self.native, native_symbol, fiat, fiat_symbol
            ),
            None => format!("{:.6} {} ({:.6} {})", self.amount, self.symbol, self.native, native_symbol),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub pending_reward: TokenValue,
    pub deposit: TokenValue,
    pub underlying_a: TokenValue,
    pub underlying_b: TokenValue,
    pub prices: UnitPrices,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YieldEstimate {
    pub apr_pct: f64,
    pub optimal_apy_pct: f64,
    pub compounds_per_year: u64,
    pub interval_secs: u64,
}

// ============================================
// SNAPSHOTS
// ============================================

/// Everything the reporting surface shows for one instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSnapshot {
    pub instance: String,
    pub updated_at: DateTime<Utc>,
    pub position: Option<Position>,
    pub yield_estimate: Option<YieldEstimate>,
    /// Native cost of one transaction, in native units
    pub gas_per_txn: f64,
    pub last_compound_at: Option<DateTime<Utc>>,
    pub last_cycle_secs: f64,
    pub next_compound_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
}

impl InstanceSnapshot {
    pub fn empty(instance: &str) -> Self {
        Self {
            instance: instance.to_string(),
            updated_at: Utc::now(),
            position: None,
            yield_estimate: None,
            gas_per_txn: 0.0,
            last_compound_at: None,
            last_cycle_secs: 0.0,
            next_compound_at: None,
            last_outcome: None,
        }
    }
}

/// Latest snapshot per instance. Readers get an `Arc` that never changes
/// under them.
#[derive(Debug, Default)]
pub struct SnapshotBoard {
    snapshots: RwLock<HashMap<String, Arc<InstanceSnapshot>>>,
}

impl SnapshotBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: InstanceSnapshot) {
        if let Ok(mut snapshots) = self.snapshots.write() {
            snapshots.insert(snapshot.instance.clone(), Arc::new(snapshot));
        }
    }

    /// Derive a new snapshot from the current one and publish it.
    pub fn update(&self, instance: &str, apply: impl FnOnce(&mut InstanceSnapshot)) {
        let mut next = match self.get(instance) {
            Some(current) => (*current).clone(),
            None => InstanceSnapshot::empty(instance),
        };
        apply(&mut next);
        next.updated_at = Utc::now();
        self.publish(next);
    }

    pub fn get(&self, instance: &str) -> Option<Arc<InstanceSnapshot>> {
        self.snapshots.read().ok()?.get(instance).cloned()
    }

    pub fn all(&self) -> Vec<Arc<InstanceSnapshot>> {
        match self.snapshots.read() {
            Ok(snapshots) => snapshots.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}
