//! Per-instance scheduling loop.
//!
//! ```text
//!   ┌──────────┐  next run time reached   ┌─────────┐
//!   │   Idle   │ ───────────────────────▶ │ Running │
//!   │ (1s tick)│ ◀─────────────────────── │ (cycle) │
//!   └──────────┘      cycle finished      └─────────┘
//!        │ terminate                           │ terminate
//!        ▼                                     ▼
//!   ┌─────────────────────────────────────────────┐
//!   │                 Terminating                 │
//!   └─────────────────────────────────────────────┘
//! ```
//!
//! A saved state record stands in for the first cycle: the loop goes straight
//! to idle and schedules from the recorded compound time. While idle, gas and
//! the yield model are refreshed every few minutes and the next run time is
//! recomputed from them.

use crate::error::{FatalError, StepError, YieldError};
use crate::orchestrator::{CycleOutcome, CycleReport, IncompleteReason};
use crate::position::{Position, SnapshotBoard, YieldEstimate};
use crate::shutdown::Terminate;
use crate::state::{CycleState, CycleStateRecord};
use crate::yield_model;
use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::fmt::Display;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// What the scheduler drives. Implemented by a configured instance.
#[async_trait]
pub trait Compounder: Send + Sync {
    async fn run_cycle(&self, state: &mut CycleState) -> Result<CycleReport, FatalError>;

    /// Native cost of one transaction at the current gas price.
    async fn estimate_gas_per_txn(&self) -> Result<U256, StepError>;

    /// Recompute the position and optimal compounding for a cycle costing
    /// `gas_cost_per_cycle` wei.
    async fn refresh_yield(&self, gas_cost_per_cycle: U256) -> Result<(Position, YieldEstimate), YieldError>;

    /// Called after every cycle with the updated state.
    fn cycle_finished(&self, _report: &CycleReport, _state: &CycleState) {}
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerTiming {
    pub idle_tick: Duration,
    pub recompute_every: Duration,
    pub retry_delay: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            idle_tick: Duration::from_secs(1),
            recompute_every: Duration::from_secs(300),
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// `last + interval − duration`, to whole seconds.
pub fn next_run_time(last: DateTime<Utc>, interval_secs: u64, last_duration: Duration) -> DateTime<Utc> {
    let offset = interval_secs as i64 - last_duration.as_secs() as i64;
    last + chrono::Duration::seconds(offset)
}

/// e.g. `1 d 02 hr 03 min 04 sec`
pub fn format_countdown(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!(
        "{} d {:02} hr {:02} min {:02} sec",
        secs / 86_400,
        secs % 86_400 / 3_600,
        secs % 3_600 / 60,
        secs % 60
    )
}

pub struct Scheduler<C> {
    name: String,
    compounder: C,
    timing: SchedulerTiming,
    terminate: Terminate,
    state_path: PathBuf,
    board: Arc<SnapshotBoard>,
}

impl<C: Compounder> Scheduler<C> {
    pub fn new(
        name: impl Into<String>,
        compounder: C,
        timing: SchedulerTiming,
        terminate: Terminate,
        state_path: PathBuf,
        board: Arc<SnapshotBoard>,
    ) -> Self {
        Self { name: name.into(), compounder, timing, terminate, state_path, board }
    }

    pub fn compounder(&self) -> &C {
        &self.compounder
    }

    /// Run until termination. Only fatal errors end the loop early.
    pub async fn run(&self, mut state: CycleState) -> Result<(), FatalError> {
        let mut resume = CycleStateRecord::load(&self.state_path);

        while !self.terminate.is_set() {
            match resume.take() {
                Some(record) => {
                    info!(
                        "Resuming: last compound at {} took {}s",
                        record.last_compound.format("%Y-%m-%d %H:%M:%S %Z"),
                        record.last_duration.as_secs()
                    );
                    state.restore(record);
                }
                None => self.run_cycle(&mut state).await?,
            }

            self.idle(&mut state).await;
        }

        info!("Scheduler for {} stopped", self.name);
        Ok(())
    }

    async fn run_cycle(&self, state: &mut CycleState) -> Result<(), FatalError> {
        let started_at = Utc::now();
        let started = Instant::now();

        // A panicking cycle is incomplete, not the end of the instance.
        let report = match AssertUnwindSafe(self.compounder.run_cycle(state)).catch_unwind().await {
            Ok(result) => result?,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Compound cycle panicked: {}", message);
                CycleReport {
                    outcome: CycleOutcome::Incomplete(IncompleteReason::Panicked(message)),
                    txn_count: state.last_txn_count,
                    estimated_gas_per_txn: state.estimated_gas_per_txn,
                    harvested: U256::ZERO,
                    fee_sent: U256::ZERO,
                    lp_deposited: U256::ZERO,
                    duration: started.elapsed(),
                }
            }
        };

        state.last_compound = Some(started_at);
        state.last_duration = started.elapsed();
        info!("Time taken: {}", format_countdown(state.last_duration));

        if let Some(record) = state.record() {
            if let Err(e) = record.save(&self.state_path) {
                warn!("Could not save state to {}: {}", self.state_path.display(), e);
            }
        }

        self.compounder.cycle_finished(&report, state);
        self.board.update(&self.name, |snapshot| {
            snapshot.last_compound_at = state.last_compound;
            snapshot.last_cycle_secs = state.last_duration.as_secs_f64();
            snapshot.last_outcome = Some(report.outcome.to_string());
        });
        Ok(())
    }

    /// Wait for the next run time, refreshing the estimate periodically.
    async fn idle(&self, state: &mut CycleState) {
        let mut next_run: Option<DateTime<Utc>> = None;
        let mut last_refresh: Option<Instant> = None;

        loop {
            if self.terminate.is_set() {
                return;
            }

            if last_refresh.map_or(true, |at| at.elapsed() >= self.timing.recompute_every) {
                let Some(estimate) = self.retry_until_ok(move || self.compounder.estimate_gas_per_txn()).await else {
                    return;
                };
                state.estimated_gas_per_txn = estimate;

                let reserve = state.gas_reserve();
                let Some((position, yield_estimate)) =
                    self.retry_until_ok(move || self.compounder.refresh_yield(reserve)).await
                else {
                    return;
                };
                last_refresh = Some(Instant::now());

                let last = state.last_compound.unwrap_or_else(Utc::now);
                let at = next_run_time(last, yield_estimate.interval_secs, state.last_duration);
                next_run = Some(at);

                let remaining = (at - Utc::now()).to_std().unwrap_or_default();
                info!("Next compound in {} ({})", format_countdown(remaining), at.format("%Y-%m-%d %H:%M:%S %Z"));
                self.board.update(&self.name, |snapshot| {
                    snapshot.position = Some(position);
                    snapshot.gas_per_txn = yield_model::to_units(estimate, 18);
                    snapshot.yield_estimate = Some(yield_estimate);
                    snapshot.next_compound_at = Some(at);
                });
            }

            if next_run.is_some_and(|at| Utc::now() >= at) {
                return;
            }
            if self.terminate.sleep(self.timing.idle_tick).await {
                return;
            }
        }
    }

    /// Repeat `op` every retry delay until it succeeds. `None` on termination.
    async fn retry_until_ok<T, E, F, Fut>(&self, mut op: F) -> Option<T>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        loop {
            match op().await {
                Ok(value) => return Some(value),
                Err(e) => warn!("Refresh failed, retrying: {}", e),
            }
            if self.terminate.sleep(self.timing.retry_delay).await {
                return None;
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
