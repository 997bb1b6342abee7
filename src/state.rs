//! Per-instance cycle state and its on-disk record.
//!
//! Only the last compound time and the last cycle's duration survive a
//! restart. The record is 16 bytes: unix seconds then the duration in 100 ns
//! ticks, both `i64` little-endian.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub const RECORD_LEN: usize = 16;

/// 100 ns ticks per second.
const TICKS_PER_SEC: u64 = 10_000_000;

/// State carried from one cycle to the next. Owned by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleState {
    /// Native cost of one transaction as estimated by the last cycle
    pub estimated_gas_per_txn: U256,
    /// Transactions attempted by the last cycle
    pub last_txn_count: u32,
    pub last_compound: Option<DateTime<Utc>>,
    pub last_duration: Duration,
}

impl CycleState {
    pub fn new(default_txn_count: u32) -> Self {
        Self {
            estimated_gas_per_txn: U256::ZERO,
            last_txn_count: default_txn_count,
            last_compound: None,
            last_duration: Duration::ZERO,
        }
    }

    /// Native units to keep back for gas: last estimate × last txn count.
    pub fn gas_reserve(&self) -> U256 {
        self.estimated_gas_per_txn * U256::from(self.last_txn_count)
    }

    pub fn record(&self) -> Option<CycleStateRecord> {
        self.last_compound.map(|at| CycleStateRecord { last_compound: at, last_duration: self.last_duration })
    }

    pub fn restore(&mut self, record: CycleStateRecord) {
        self.last_compound = Some(record.last_compound);
        self.last_duration = record.last_duration;
    }
}

/// The persisted part of [`CycleState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStateRecord {
    pub last_compound: DateTime<Utc>,
    pub last_duration: Duration,
}

impl CycleStateRecord {
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let ticks = self.last_duration.as_secs() * TICKS_PER_SEC + u64::from(self.last_duration.subsec_nanos()) / 100;
        let mut bytes = [0u8; RECORD_LEN];
        bytes[..8].copy_from_slice(&self.last_compound.timestamp().to_le_bytes());
        bytes[8..].copy_from_slice(&(ticks.min(i64::MAX as u64) as i64).to_le_bytes());
        bytes
    }

    /// `None` unless `bytes` is exactly one well-formed record.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RECORD_LEN {
            return None;
        }
        let secs = i64::from_le_bytes(bytes[..8].try_into().ok()?);
        let ticks = i64::from_le_bytes(bytes[8..].try_into().ok()?);
        let last_compound = DateTime::from_timestamp(secs, 0)?;
        let ticks = u64::try_from(ticks).ok()?;
        let last_duration =
            Duration::from_secs(ticks / TICKS_PER_SEC) + Duration::from_nanos((ticks % TICKS_PER_SEC) * 100);
        Some(Self { last_compound, last_duration })
    }

    /// Read the record at `path`. A missing or malformed file means no prior state.
    pub fn load(path: &Path) -> Option<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read state file {}: {}", path.display(), e);
                return None;
            }
        };
        let record = Self::decode(&bytes);
        if record.is_none() {
            warn!("Ignoring malformed state file {} ({} bytes)", path.display(), bytes.len());
        }
        record
    }

    /// Write via a temporary file and rename, so readers never see a partial record.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, self.encode())?;
        fs::rename(&tmp, path)?;
        debug!("Saved state to {}", path.display());
        Ok(())
    }
}
