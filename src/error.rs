//! Error taxonomy for the compounder.
//!
//! Remote failures are [`ChainError`]s. Inside a compounding cycle every step
//! failure is classified as a [`StepError`] so the orchestrator can decide
//! between retrying, postponing, aborting the cycle, or exiting the process.
//! Configuration and wallet problems are [`FatalError`]s and carry the exit
//! code the process terminates with.

use alloy_primitives::{Address, B256};
use std::time::Duration;
use thiserror::Error;

// ============================================
// CHAIN ERRORS
// ============================================

/// A failed interaction with the node or a contract.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("RPC request timed out after {0:?}")]
    Timeout(Duration),

    #[error("ABI decoding failed: {0}")]
    Abi(String),

    #[error("transaction {tx} reverted")]
    Reverted { tx: B256 },

    #[error("no receipt for {tx} within {waited:?}")]
    ReceiptTimeout { tx: B256, waited: Duration },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid RPC url: {0}")]
    InvalidUrl(String),

    #[error("gas estimate came back as zero")]
    ZeroGasEstimate,
}

impl From<alloy_transport::TransportError> for ChainError {
    fn from(err: alloy_transport::TransportError) -> Self {
        ChainError::Rpc(err.to_string())
    }
}

impl From<alloy_sol_types::Error> for ChainError {
    fn from(err: alloy_sol_types::Error) -> Self {
        ChainError::Abi(err.to_string())
    }
}

// ============================================
// FATAL ERRORS
// ============================================

/// Unrecoverable configuration or environment problems.
///
/// Each variant maps to a distinct process exit code.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("invalid settings: {0}")]
    InvalidConfig(String),

    #[error("invalid wallet key: {0}")]
    InvalidWalletKey(String),

    #[error("unknown farm type '{0}'")]
    UnknownFarmType(String),

    #[error("LP pair mismatch: factory reports {found} but {configured} is configured")]
    PairMismatch { configured: Address, found: Address },

    #[error("LP pair check failed: {0}")]
    PairCheckFailed(String),

    #[error("tax-free liquidity is not supported for farm type {0}")]
    TaxFreeUnsupported(String),

    #[error("settings file not found: {0}")]
    ConfigNotFound(String),
}

impl FatalError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::InvalidConfig(_) => 2,
            FatalError::InvalidWalletKey(_) => 3,
            FatalError::UnknownFarmType(_) | FatalError::PairMismatch { .. } => 4,
            FatalError::PairCheckFailed(_) => 5,
            FatalError::TaxFreeUnsupported(_) => 6,
            FatalError::ConfigNotFound(_) => 11,
        }
    }
}

// ============================================
// STEP ERRORS
// ============================================

/// Classified failure of a single pipeline step.
#[derive(Debug, Error)]
pub enum StepError {
    /// Remote failure; the step may be retried.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The transaction went through but the expected events were not found.
    #[error("{0}")]
    Unexpected(String),

    /// Not worth continuing this cycle. Consumes no retry budget.
    #[error("postponed: {0}")]
    Postpone(String),

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl StepError {
    pub fn unexpected(msg: impl Into<String>) -> Self {
        StepError::Unexpected(msg.into())
    }

    pub fn postpone(reason: impl Into<String>) -> Self {
        StepError::Postpone(reason.into())
    }

    #[cfg(test)]
    pub fn is_postpone(&self) -> bool {
        matches!(self, StepError::Postpone(_))
    }
}

// ============================================
// YIELD ERRORS
// ============================================

#[derive(Debug, Error)]
pub enum YieldError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("APR is not positive ({0})")]
    NonPositiveApr(f64),

    #[error("deposit value is not positive ({0})")]
    NoDeposit(f64),

    #[error("pool has no {0}")]
    EmptyPool(&'static str),

    #[error("no compounding frequency improves on holding")]
    NoImprovement,
}
