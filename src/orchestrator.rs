//! Compounding cycle.
//!
//! A cycle walks a fixed sequence of steps: estimate gas, check the reward,
//! harvest, approve, top up gas, pay the fee, turn the reward into LP and
//! deposit it. Each step is retried in place until it succeeds, the retry
//! budget runs out, termination is requested, or the step asks to postpone.
//! Nothing is rolled back; a cycle that stops part way is a valid end state.
//!
//! The steps themselves sit behind [`CompoundSteps`] so the sequencing can be
//! exercised without a chain.

use crate::error::{FatalError, StepError};
use crate::shutdown::Terminate;
use crate::state::CycleState;
use alloy_primitives::U256;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

// ============================================
// STEPS
// ============================================

/// One of the two tokens of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    A,
    B,
}

/// How harvested reward becomes LP tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidityRoute {
    /// Swap half to each token and add liquidity
    Split,
    /// Single zap transaction
    Zap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    EstimateGas,
    CheckReward,
    Harvest,
    ApproveReward,
    TopUpGas,
    DevFee,
    SwapToA,
    SwapToB,
    BalanceLegs,
    ApproveLiquidity,
    AddLiquidity,
    Zap,
    Deposit,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::EstimateGas => "estimate_gas",
            Step::CheckReward => "check_reward",
            Step::Harvest => "harvest",
            Step::ApproveReward => "approve_reward",
            Step::TopUpGas => "top_up_gas",
            Step::DevFee => "dev_fee",
            Step::SwapToA => "swap_to_a",
            Step::SwapToB => "swap_to_b",
            Step::BalanceLegs => "balance_legs",
            Step::ApproveLiquidity => "approve_liquidity",
            Step::AddLiquidity => "add_liquidity",
            Step::Zap => "zap",
            Step::Deposit => "deposit",
        }
    }

    /// Transactions charged for a failed or postponed attempt of this step.
    pub fn attempt_weight(&self) -> u32 {
        match self {
            Step::EstimateGas | Step::CheckReward | Step::BalanceLegs => 0,
            _ => 1,
        }
    }

    fn swap_to(leg: Leg) -> Self {
        match leg {
            Leg::A => Step::SwapToA,
            Leg::B => Step::SwapToB,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step's result and how many transactions it actually sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sent<T> {
    pub value: T,
    pub txns: u32,
}

impl<T> Sent<T> {
    pub fn new(value: T, txns: u32) -> Self {
        Self { value, txns }
    }

    /// Exactly one transaction.
    pub fn one(value: T) -> Self {
        Self::new(value, 1)
    }
}

/// The chain-facing half of a cycle. Amounts are raw token units.
#[async_trait]
pub trait CompoundSteps: Send + Sync {
    fn route(&self) -> LiquidityRoute;

    /// Whether `leg` is the reward token itself and needs no swap.
    fn leg_is_reward(&self, leg: Leg) -> bool;

    /// Native cost of one transaction at the current gas price.
    async fn estimate_gas_per_txn(&self) -> Result<U256, StepError>;

    /// Pending reward, or a postponement when it does not cover `reserve`.
    async fn check_reward(&self, reserve: U256) -> Result<U256, StepError>;

    /// Reward amount to process.
    async fn harvest(&self) -> Result<Sent<U256>, StepError>;

    /// Let every contract that pulls reward spend `amount`.
    async fn approve_reward(&self, amount: U256) -> Result<Sent<()>, StepError>;

    /// Swap enough reward for `reserve` native. Returns the reward spent.
    async fn top_up_gas(&self, reserve: U256, reward: U256) -> Result<Sent<U256>, StepError>;

    /// Returns the fee actually transferred.
    async fn send_dev_fee(&self, reward: U256) -> Result<Sent<U256>, StepError>;

    /// Returns LP received.
    async fn zap(&self, reward: U256) -> Result<Sent<U256>, StepError>;

    /// Returns the amount of the leg's token received.
    async fn swap_reward_to(&self, leg: Leg, amount: U256) -> Result<Sent<U256>, StepError>;

    /// Final liquidity amounts for the legs. Sends nothing.
    async fn balance_legs(&self, amount_a: U256, amount_b: U256) -> Result<(U256, U256), StepError>;

    async fn approve_liquidity(&self, amount_a: U256, amount_b: U256) -> Result<Sent<()>, StepError>;

    /// Returns LP received.
    async fn add_liquidity(&self, amount_a: U256, amount_b: U256) -> Result<Sent<U256>, StepError>;

    /// Returns LP deposited.
    async fn deposit(&self, lp: U256) -> Result<Sent<U256>, StepError>;
}

// ============================================
// OUTCOMES
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncompleteReason {
    RetriesExhausted { step: Step, error: String },
    Terminated,
    /// Nothing left to compound after the gas top-up
    RewardExhausted,
    /// The cycle panicked; carries the panic message
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    Postponed { step: Step, reason: String },
    Incomplete(IncompleteReason),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed)
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Completed => write!(f, "completed"),
            CycleOutcome::Postponed { step, reason } => write!(f, "postponed at {}: {}", step, reason),
            CycleOutcome::Incomplete(IncompleteReason::RetriesExhausted { step, error }) => {
                write!(f, "incomplete: {} failed too often ({})", step, error)
            }
            CycleOutcome::Incomplete(IncompleteReason::Terminated) => write!(f, "incomplete: terminated"),
            CycleOutcome::Incomplete(IncompleteReason::RewardExhausted) => {
                write!(f, "incomplete: reward exhausted by gas top-up")
            }
            CycleOutcome::Incomplete(IncompleteReason::Panicked(message)) => {
                write!(f, "incomplete: panicked ({})", message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub txn_count: u32,
    pub estimated_gas_per_txn: U256,
    pub harvested: U256,
    pub fee_sent: U256,
    pub lp_deposited: U256,
    pub duration: Duration,
}

/// Why a cycle stopped early.
enum Abort {
    Postponed(Step, String),
    Exhausted(Step, String),
    Terminated,
    RewardExhausted,
    Fatal(FatalError),
}

#[derive(Default)]
struct Progress {
    txns: u32,
    estimate: U256,
    harvested: U256,
    fee_sent: U256,
    lp_deposited: U256,
}

// ============================================
// ORCHESTRATOR
// ============================================

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed per step; one failure more abandons the cycle
    pub max_attempts: u32,
    pub delay: Duration,
}

pub struct Orchestrator<S> {
    steps: S,
    retry: RetryPolicy,
    terminate: Terminate,
    /// Seeds the next cycle's gas reserve after a reward postponement
    default_txn_count: u32,
}

impl<S: CompoundSteps> Orchestrator<S> {
    pub fn new(steps: S, retry: RetryPolicy, terminate: Terminate, default_txn_count: u32) -> Self {
        Self { steps, retry, terminate, default_txn_count }
    }

    pub fn steps(&self) -> &S {
        &self.steps
    }

    /// Run one cycle and update `state` for the next one.
    ///
    /// Whatever happens, `state` afterwards holds this cycle's gas estimate
    /// and transaction count. Only a fatal error escapes as `Err`.
    pub async fn run_cycle(&self, state: &mut CycleState) -> Result<CycleReport, FatalError> {
        let started = Instant::now();
        info!("Compound process starting...");

        let mut progress = Progress::default();
        let result = self.execute(state, &mut progress).await;

        state.estimated_gas_per_txn = progress.estimate;
        state.last_txn_count = if progress.txns == 0 { self.default_txn_count } else { progress.txns };

        let outcome = match result {
            Ok(()) => CycleOutcome::Completed,
            Err(Abort::Postponed(step, reason)) => CycleOutcome::Postponed { step, reason },
            Err(Abort::Exhausted(step, error)) => {
                CycleOutcome::Incomplete(IncompleteReason::RetriesExhausted { step, error })
            }
            Err(Abort::Terminated) => CycleOutcome::Incomplete(IncompleteReason::Terminated),
            Err(Abort::RewardExhausted) => CycleOutcome::Incomplete(IncompleteReason::RewardExhausted),
            Err(Abort::Fatal(e)) => {
                error!("Fatal error during cycle: {}", e);
                return Err(e);
            }
        };

        if outcome.is_completed() {
            info!(txns = progress.txns, "Compound process completed");
        } else {
            warn!(txns = progress.txns, "Compound process {}", outcome);
        }

        Ok(CycleReport {
            outcome,
            txn_count: progress.txns,
            estimated_gas_per_txn: progress.estimate,
            harvested: progress.harvested,
            fee_sent: progress.fee_sent,
            lp_deposited: progress.lp_deposited,
            duration: started.elapsed(),
        })
    }

    async fn execute(&self, state: &mut CycleState, progress: &mut Progress) -> Result<(), Abort> {
        let steps = &self.steps;

        progress.estimate = self.estimate_gas().await?;
        if state.estimated_gas_per_txn.is_zero() {
            state.estimated_gas_per_txn = progress.estimate;
        }
        let reserve = state.gas_reserve();

        match self.retry(Step::CheckReward, progress, move || steps.check_reward(reserve)).await {
            Ok(_) => {}
            Err(Abort::Postponed(step, reason)) => {
                progress.txns = self.default_txn_count;
                return Err(Abort::Postponed(step, reason));
            }
            Err(other) => return Err(other),
        }

        let harvested = self.retry_sent(Step::Harvest, progress, move || steps.harvest()).await?;
        progress.harvested = harvested;
        let mut reward = harvested;

        self.retry_sent(Step::ApproveReward, progress, move || steps.approve_reward(harvested)).await?;

        let working = reward;
        let spent = self.retry_sent(Step::TopUpGas, progress, move || steps.top_up_gas(reserve, working)).await?;
        reward = reward.saturating_sub(spent);
        if reward <= U256::ONE {
            return Err(Abort::RewardExhausted);
        }

        let working = reward;
        let fee = self.retry_sent(Step::DevFee, progress, move || steps.send_dev_fee(working)).await?;
        progress.fee_sent = fee;
        reward = reward.saturating_sub(fee);

        let lp = match steps.route() {
            LiquidityRoute::Zap => {
                let working = reward;
                self.retry_sent(Step::Zap, progress, move || steps.zap(working)).await?
            }
            LiquidityRoute::Split => self.split_into_lp(reward, progress).await?,
        };

        let deposited = self.retry_sent(Step::Deposit, progress, move || steps.deposit(lp)).await?;
        progress.lp_deposited = deposited;
        Ok(())
    }

    async fn split_into_lp(&self, reward: U256, progress: &mut Progress) -> Result<U256, Abort> {
        let steps = &self.steps;
        let half = reward / U256::from(2);

        let mut legs = [U256::ZERO; 2];
        for (slot, leg) in legs.iter_mut().zip([Leg::A, Leg::B]) {
            *slot = if steps.leg_is_reward(leg) {
                half
            } else {
                self.retry_sent(Step::swap_to(leg), progress, move || steps.swap_reward_to(leg, half)).await?
            };
        }

        let [a, b] = legs;
        let (a, b) = self.retry(Step::BalanceLegs, progress, move || steps.balance_legs(a, b)).await?;
        self.retry_sent(Step::ApproveLiquidity, progress, move || steps.approve_liquidity(a, b)).await?;
        self.retry_sent(Step::AddLiquidity, progress, move || steps.add_liquidity(a, b)).await
    }

    /// Gas estimation has no retry budget; it repeats until it works or the
    /// process is told to stop.
    async fn estimate_gas(&self) -> Result<U256, Abort> {
        loop {
            if self.terminate.is_set() {
                return Err(Abort::Terminated);
            }
            match self.steps.estimate_gas_per_txn().await {
                Ok(estimate) => {
                    info!(step = "estimate_gas", gas = %estimate, "Estimated gas cost per txn");
                    return Ok(estimate);
                }
                Err(StepError::Fatal(e)) => return Err(Abort::Fatal(e)),
                Err(e) => warn!(step = "estimate_gas", "Gas estimate failed: {}", e),
            }
            if self.terminate.sleep(self.retry.delay).await {
                return Err(Abort::Terminated);
            }
        }
    }

    /// [`Self::retry`] for steps that report their transactions.
    async fn retry_sent<T, F, Fut>(&self, step: Step, progress: &mut Progress, op: F) -> Result<T, Abort>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Sent<T>, StepError>>,
    {
        let sent = self.retry(step, progress, op).await?;
        progress.txns += sent.txns;
        Ok(sent.value)
    }

    async fn retry<T, F, Fut>(&self, step: Step, progress: &mut Progress, mut op: F) -> Result<T, Abort>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let mut attempts = 0u32;
        loop {
            if self.terminate.is_set() {
                return Err(Abort::Terminated);
            }
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(StepError::Postpone(reason)) => {
                    progress.txns += step.attempt_weight();
                    info!(step = %step, "Postponing: {}", reason);
                    return Err(Abort::Postponed(step, reason));
                }
                Err(StepError::Fatal(e)) => return Err(Abort::Fatal(e)),
                Err(e) => e,
            };

            progress.txns += step.attempt_weight();
            attempts += 1;
            warn!(step = %step, attempt = attempts, "Step failed: {}", error);

            if attempts > self.retry.max_attempts {
                return Err(Abort::Exhausted(step, error.to_string()));
            }
            info!("Retrying... ({}/{})", attempts, self.retry.max_attempts);
            if self.terminate.sleep(self.retry.delay).await {
                return Err(Abort::Terminated);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ChainError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const HARVEST: u64 = 1_000;
    const TOP_UP_SPEND: u64 = 100;

    /// Steps that succeed with fixed amounts unless told otherwise.
    pub(crate) struct ScriptedSteps {
        pub route: LiquidityRoute,
        pub reward_leg: Option<Leg>,
        pub top_up_spend: U256,
        failures: Mutex<HashMap<Step, u32>>,
        postpone_at: Mutex<Option<Step>>,
        fatal_at: Mutex<Option<Step>>,
        terminate_at: Mutex<Option<(Step, Terminate)>>,
        calls: Mutex<Vec<Step>>,
    }

    impl ScriptedSteps {
        pub(crate) fn new(route: LiquidityRoute) -> Self {
            Self {
                route,
                reward_leg: None,
                top_up_spend: U256::from(TOP_UP_SPEND),
                failures: Mutex::new(HashMap::new()),
                postpone_at: Mutex::new(None),
                fatal_at: Mutex::new(None),
                terminate_at: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn fail(&self, step: Step, times: u32) {
            self.failures.lock().unwrap().insert(step, times);
        }

        pub(crate) fn postpone_at(&self, step: Step) {
            *self.postpone_at.lock().unwrap() = Some(step);
        }

        fn fatal_at(&self, step: Step) {
            *self.fatal_at.lock().unwrap() = Some(step);
        }

        fn terminate_at(&self, step: Step, terminate: Terminate) {
            *self.terminate_at.lock().unwrap() = Some((step, terminate));
        }

        pub(crate) fn calls(&self) -> Vec<Step> {
            self.calls.lock().unwrap().clone()
        }

        fn enter(&self, step: Step) -> Result<(), StepError> {
            self.calls.lock().unwrap().push(step);
            if let Some((at, terminate)) = &*self.terminate_at.lock().unwrap() {
                if *at == step {
                    terminate.trigger();
                }
            }
            if *self.postpone_at.lock().unwrap() == Some(step) {
                return Err(StepError::postpone("scripted"));
            }
            if *self.fatal_at.lock().unwrap() == Some(step) {
                return Err(FatalError::InvalidConfig("scripted".into()).into());
            }
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&step) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    Err(ChainError::Rpc("scripted failure".into()).into())
                }
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl CompoundSteps for ScriptedSteps {
        fn route(&self) -> LiquidityRoute {
            self.route
        }

        fn leg_is_reward(&self, leg: Leg) -> bool {
            self.reward_leg == Some(leg)
        }

        async fn estimate_gas_per_txn(&self) -> Result<U256, StepError> {
            self.enter(Step::EstimateGas)?;
            Ok(U256::from(10))
        }

        async fn check_reward(&self, _reserve: U256) -> Result<U256, StepError> {
            self.enter(Step::CheckReward)?;
            Ok(U256::from(HARVEST))
        }

        async fn harvest(&self) -> Result<Sent<U256>, StepError> {
            self.enter(Step::Harvest)?;
            Ok(Sent::one(U256::from(HARVEST)))
        }

        async fn approve_reward(&self, _amount: U256) -> Result<Sent<()>, StepError> {
            self.enter(Step::ApproveReward)?;
            Ok(Sent::one(()))
        }

        async fn top_up_gas(&self, _reserve: U256, reward: U256) -> Result<Sent<U256>, StepError> {
            self.enter(Step::TopUpGas)?;
            Ok(Sent::one(self.top_up_spend.min(reward)))
        }

        async fn send_dev_fee(&self, reward: U256) -> Result<Sent<U256>, StepError> {
            self.enter(Step::DevFee)?;
            Ok(Sent::one(reward * U256::from(10) / U256::from(1_000)))
        }

        async fn zap(&self, reward: U256) -> Result<Sent<U256>, StepError> {
            self.enter(Step::Zap)?;
            Ok(Sent::one(reward / U256::from(3)))
        }

        async fn swap_reward_to(&self, leg: Leg, amount: U256) -> Result<Sent<U256>, StepError> {
            self.enter(Step::swap_to(leg))?;
            Ok(Sent::one(amount * U256::from(2)))
        }

        async fn balance_legs(&self, a: U256, b: U256) -> Result<(U256, U256), StepError> {
            self.enter(Step::BalanceLegs)?;
            Ok((a, b))
        }

        async fn approve_liquidity(&self, _a: U256, _b: U256) -> Result<Sent<()>, StepError> {
            self.enter(Step::ApproveLiquidity)?;
            Ok(Sent::new((), 0))
        }

        async fn add_liquidity(&self, a: U256, b: U256) -> Result<Sent<U256>, StepError> {
            self.enter(Step::AddLiquidity)?;
            Ok(Sent::one((a + b) / U256::from(4)))
        }

        async fn deposit(&self, lp: U256) -> Result<Sent<U256>, StepError> {
            self.enter(Step::Deposit)?;
            Ok(Sent::one(lp))
        }
    }

    fn orchestrator(steps: ScriptedSteps, max_attempts: u32) -> Orchestrator<ScriptedSteps> {
        let retry = RetryPolicy { max_attempts, delay: Duration::from_millis(1) };
        Orchestrator::new(steps, retry, Terminate::new(), 8)
    }

    #[tokio::test]
    async fn test_split_cycle_completes_in_order() {
        let orch = orchestrator(ScriptedSteps::new(LiquidityRoute::Split), 20);
        let mut state = CycleState::new(8);

        let report = orch.run_cycle(&mut state).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(
            orch.steps().calls(),
            vec![
                Step::EstimateGas,
                Step::CheckReward,
                Step::Harvest,
                Step::ApproveReward,
                Step::TopUpGas,
                Step::DevFee,
                Step::SwapToA,
                Step::SwapToB,
                Step::BalanceLegs,
                Step::ApproveLiquidity,
                Step::AddLiquidity,
                Step::Deposit,
            ]
        );

        // harvest, approve, top-up, fee, two swaps, add, deposit; approvals already in place
        assert_eq!(report.txn_count, 8);
        assert_eq!(state.last_txn_count, 8);
        assert_eq!(state.estimated_gas_per_txn, U256::from(10));

        // 1000 - 100 top-up = 900; fee 9; 891 split 445/445, swapped ×2, LP = 1780 / 4
        assert_eq!(report.harvested, U256::from(HARVEST));
        assert_eq!(report.fee_sent, U256::from(9));
        assert_eq!(report.lp_deposited, U256::from(445));
    }

    #[tokio::test]
    async fn test_zap_route_skips_swaps() {
        let orch = orchestrator(ScriptedSteps::new(LiquidityRoute::Zap), 20);
        let report = orch.run_cycle(&mut CycleState::new(12)).await.unwrap();

        assert!(report.outcome.is_completed());
        let calls = orch.steps().calls();
        assert!(calls.contains(&Step::Zap));
        assert!(!calls.contains(&Step::SwapToA));
        assert!(!calls.contains(&Step::AddLiquidity));
    }

    #[tokio::test]
    async fn test_reward_leg_is_not_swapped() {
        let mut steps = ScriptedSteps::new(LiquidityRoute::Split);
        steps.reward_leg = Some(Leg::B);
        let orch = orchestrator(steps, 20);
        orch.run_cycle(&mut CycleState::new(8)).await.unwrap();

        let calls = orch.steps().calls();
        assert!(calls.contains(&Step::SwapToA));
        assert!(!calls.contains(&Step::SwapToB));
    }

    #[tokio::test]
    async fn test_reward_postponement_stops_before_harvest() {
        let steps = ScriptedSteps::new(LiquidityRoute::Split);
        steps.postpone_at(Step::CheckReward);
        let orch = orchestrator(steps, 20);
        let mut state = CycleState::new(3);

        let report = orch.run_cycle(&mut state).await.unwrap();
        assert!(matches!(report.outcome, CycleOutcome::Postponed { step: Step::CheckReward, .. }));
        assert!(!orch.steps().calls().contains(&Step::Harvest));
        assert_eq!(state.last_txn_count, 8);
    }

    #[tokio::test]
    async fn test_deposit_postponement_counts_the_attempt() {
        let steps = ScriptedSteps::new(LiquidityRoute::Zap);
        steps.postpone_at(Step::Deposit);
        let orch = orchestrator(steps, 20);
        let mut state = CycleState::new(12);

        let report = orch.run_cycle(&mut state).await.unwrap();
        assert!(matches!(report.outcome, CycleOutcome::Postponed { step: Step::Deposit, .. }));
        // harvest, approve, top-up, fee, zap, deposit
        assert_eq!(state.last_txn_count, 6);
    }

    #[tokio::test]
    async fn test_twenty_failures_then_success_proceeds() {
        let steps = ScriptedSteps::new(LiquidityRoute::Split);
        steps.fail(Step::Harvest, 20);
        let orch = orchestrator(steps, 20);
        let mut state = CycleState::new(8);

        let report = orch.run_cycle(&mut state).await.unwrap();
        assert!(report.outcome.is_completed());
        assert_eq!(report.txn_count, 8 + 20);
    }

    #[tokio::test]
    async fn test_twenty_one_failures_abort() {
        let steps = ScriptedSteps::new(LiquidityRoute::Split);
        steps.fail(Step::Harvest, 21);
        let orch = orchestrator(steps, 20);
        let mut state = CycleState::new(8);

        let report = orch.run_cycle(&mut state).await.unwrap();
        assert!(matches!(
            report.outcome,
            CycleOutcome::Incomplete(IncompleteReason::RetriesExhausted { step: Step::Harvest, .. })
        ));
        assert!(!orch.steps().calls().contains(&Step::ApproveReward));
        assert_eq!(state.last_txn_count, 21);
    }

    #[tokio::test]
    async fn test_success_resets_attempts() {
        let steps = ScriptedSteps::new(LiquidityRoute::Split);
        steps.fail(Step::Harvest, 4);
        steps.fail(Step::DevFee, 4);
        let orch = orchestrator(steps, 4);

        let report = orch.run_cycle(&mut CycleState::new(8)).await.unwrap();
        assert!(report.outcome.is_completed());
    }

    #[tokio::test]
    async fn test_gas_estimate_retries_without_budget() {
        let steps = ScriptedSteps::new(LiquidityRoute::Split);
        steps.fail(Step::EstimateGas, 5);
        let orch = orchestrator(steps, 2);

        let report = orch.run_cycle(&mut CycleState::new(8)).await.unwrap();
        assert!(report.outcome.is_completed());
    }

    #[tokio::test]
    async fn test_reward_exhausted_by_top_up() {
        let mut steps = ScriptedSteps::new(LiquidityRoute::Split);
        steps.top_up_spend = U256::from(HARVEST - 1);
        let orch = orchestrator(steps, 20);

        let report = orch.run_cycle(&mut CycleState::new(8)).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Incomplete(IncompleteReason::RewardExhausted));
        assert!(!orch.steps().calls().contains(&Step::DevFee));
    }

    #[tokio::test]
    async fn test_termination_stops_at_next_step() {
        let terminate = Terminate::new();
        let steps = ScriptedSteps::new(LiquidityRoute::Split);
        steps.terminate_at(Step::Harvest, terminate.clone());
        let retry = RetryPolicy { max_attempts: 20, delay: Duration::from_millis(1) };
        let orch = Orchestrator::new(steps, retry, terminate, 8);

        let report = orch.run_cycle(&mut CycleState::new(8)).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Incomplete(IncompleteReason::Terminated));
        assert_eq!(orch.steps().calls().last(), Some(&Step::Harvest));
    }

    #[tokio::test]
    async fn test_fatal_error_escapes_after_state_update() {
        let steps = ScriptedSteps::new(LiquidityRoute::Split);
        steps.fatal_at(Step::ApproveReward);
        let orch = orchestrator(steps, 20);
        let mut state = CycleState::new(8);

        let err = orch.run_cycle(&mut state).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(state.last_txn_count, 1);
        assert_eq!(state.estimated_gas_per_txn, U256::from(10));
    }

    #[tokio::test]
    async fn test_first_cycle_reserve_uses_current_estimate() {
        let orch = orchestrator(ScriptedSteps::new(LiquidityRoute::Split), 20);
        let mut state = CycleState::new(8);
        assert!(state.estimated_gas_per_txn.is_zero());

        orch.run_cycle(&mut state).await.unwrap();
        assert_eq!(state.gas_reserve(), U256::from(10 * 8));
    }
}
