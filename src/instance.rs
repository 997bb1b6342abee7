//! One configured compounding instance, wired to the chain.

use crate::chain::rpc::RpcChain;
use crate::chain::signer::WalletSigner;
use crate::chain::{ChainClient, ChainContext};
use crate::config::{Config, CycleLogEntry};
use crate::error::{FatalError, StepError, YieldError};
use crate::farm::FarmAdapter;
use crate::gas_oracle::{self, GasOracle, GasPolicy};
use crate::orchestrator::{CompoundSteps, CycleReport, Orchestrator, RetryPolicy};
use crate::pipeline::ChainSteps;
use crate::position::{Position, YieldEstimate};
use crate::router::PoolRouter;
use crate::scheduler::{Compounder, SchedulerTiming};
use crate::shutdown::Terminate;
use crate::state::CycleState;
use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct Instance {
    config: Config,
    orchestrator: Orchestrator<ChainSteps>,
}

impl Instance {
    /// Load the wallet, connect, and verify the pair before anything runs.
    pub async fn build(config: Config, terminate: Terminate) -> Result<Self, FatalError> {
        let kind = config.farm_kind()?;
        let wallet = WalletSigner::load(&config.wallet)?;
        info!("✓ Wallet key matches {:?}", wallet.address());

        let timeout = Duration::from_secs(config.rpc_timeout_secs);
        let client: Arc<dyn ChainClient> =
            Arc::new(RpcChain::new(config.rpc_url.clone(), config.chain_id, timeout, wallet));

        let policy = GasPolicy::from_config(&config.gas);
        let mut oracle = GasOracle::new(policy, client.clone());
        if let Some(api_key) = &config.gas.etherscan_api_key {
            oracle = oracle
                .with_etherscan(api_key.clone(), config.chain_id)
                .map_err(|e| FatalError::InvalidConfig(format!("etherscan gas oracle: {}", e)))?;
        }
        if policy.is_fixed() {
            info!("Gas price fixed at {:.2} gwei", gas_oracle::wei_to_gwei(policy.apply(0)));
        }
        let ctx = ChainContext::new(client, Arc::new(oracle), timeout);

        let router = PoolRouter::new(ctx.clone(), &config, kind)?;
        router.check_pair().await?;

        let farm = FarmAdapter::new(ctx.clone(), &config, router.clone())?;
        let steps = ChainSteps::new(
            ctx,
            farm,
            router,
            config.compound.dev_fee_recipient,
            config.farm.process_all_rewards,
        );
        let retry = RetryPolicy {
            max_attempts: config.compound.max_retries,
            delay: Duration::from_secs(config.compound.retry_delay_secs),
        };
        let orchestrator = Orchestrator::new(steps, retry, terminate, config.default_txn_count());

        Ok(Self { config, orchestrator })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state_path(&self) -> PathBuf {
        self.config.state_path()
    }

    pub fn initial_state(&self) -> CycleState {
        CycleState::new(self.config.default_txn_count())
    }

    pub fn timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            recompute_every: Duration::from_secs(self.config.compound.recompute_interval_secs),
            retry_delay: Duration::from_secs(self.config.compound.retry_delay_secs),
            ..SchedulerTiming::default()
        }
    }

    fn farm(&self) -> &FarmAdapter {
        self.orchestrator.steps().farm()
    }
}

#[async_trait]
impl Compounder for Instance {
    async fn run_cycle(&self, state: &mut CycleState) -> Result<CycleReport, FatalError> {
        self.orchestrator.run_cycle(state).await
    }

    async fn estimate_gas_per_txn(&self) -> Result<U256, StepError> {
        self.orchestrator.steps().estimate_gas_per_txn().await
    }

    async fn refresh_yield(&self, gas_cost_per_cycle: U256) -> Result<(Position, YieldEstimate), YieldError> {
        self.farm().compute_yield(gas_cost_per_cycle).await
    }

    fn cycle_finished(&self, report: &CycleReport, state: &CycleState) {
        let entry = CycleLogEntry {
            timestamp: Utc::now(),
            instance: self.config.name.clone(),
            outcome: report.outcome.to_string(),
            txn_count: report.txn_count,
            duration_secs: state.last_duration.as_secs_f64(),
            estimated_gas_per_txn: report.estimated_gas_per_txn.to_string(),
            harvested: report.harvested.to_string(),
            fee_sent: report.fee_sent.to_string(),
            lp_deposited: report.lp_deposited.to_string(),
        };
        if let Err(e) = entry.append_to_file(self.config.report_path()) {
            warn!("Could not append cycle report: {}", e);
        }
    }
}
