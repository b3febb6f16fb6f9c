//! Error types for AutoSettle.

use crate::{Asset, SettlementPhase, Timestamp};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a price observation was rejected as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaleReason {
    /// The answer was carried over from an earlier round.
    RoundIncomplete { round_id: u128, answered_in_round: u128 },
    /// The feed never reported an update time.
    MissingTimestamp,
    /// The observation is older than the configured bound.
    TooOld { age: u64, max_age: u64 },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::RoundIncomplete {
                round_id,
                answered_in_round,
            } => write!(f, "answered in round {answered_in_round} < round {round_id}"),
            StaleReason::MissingTimestamp => write!(f, "no update timestamp"),
            StaleReason::TooOld { age, max_age } => {
                write!(f, "age {age}s exceeds max {max_age}s")
            }
        }
    }
}

/// Broad failure class, for callers that branch on cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Configuration,
    Pricing,
    Execution,
    Caller,
    Disbursement,
    Guard,
    Invariant,
}

/// Main error type for AutoSettle operations.
///
/// Every variant aborts the whole settlement call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettleError {
    /// A required address was the zero address.
    #[error("Zero address for {field}")]
    ZeroAddress { field: &'static str },

    /// The asset is not registered, or is disabled.
    #[error("Asset not supported: {0}")]
    AssetNotSupported(Asset),

    /// Token decimals could not be read at registration.
    #[error("Decimals unreadable for {0}")]
    DecimalsUnreadable(Asset),

    /// Configuration rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Administrative call without the matching capability.
    #[error("Unauthorized")]
    Unauthorized,

    /// No price feed configured or resolvable for the asset.
    #[error("Price feed missing for {0}")]
    PriceFeedMissing(Asset),

    /// The feed reported a non-positive price.
    #[error("Price feed invalid: answer {answer}")]
    PriceFeedInvalid { answer: i128 },

    /// The feed observation failed freshness checks.
    #[error("Oracle data stale: {0}")]
    OracleDataStale(StaleReason),

    /// The venue cannot quote the route.
    #[error("No liquidity: {reason}")]
    NoLiquidity { reason: String },

    /// The venue rejected the exact-output swap.
    #[error("Swap failed: {reason}")]
    SwapFailed { reason: String },

    /// A reservation or delivery transfer failed.
    #[error("Transfer of {asset} failed: {reason}")]
    TransferFailed { asset: Asset, reason: String },

    /// The venue's reported result does not match observed balances.
    #[error("Untrustworthy execution: {reason}")]
    UntrustworthyExecution { reason: String },

    /// Fixed-point arithmetic overflowed.
    #[error("Arithmetic overflow in {context}")]
    ArithmeticOverflow { context: &'static str },

    /// The request's deadline has passed.
    #[error("Deadline expired: deadline {deadline}, now {now}")]
    DeadlineExpired { deadline: Timestamp, now: Timestamp },

    /// Not enough native value attached to cover the reservation.
    #[error("Insufficient native value: required {required}, provided {provided}")]
    InsufficientNativeValue { required: U256, provided: U256 },

    /// The live requirement exceeds the caller's declared maximum.
    #[error("Slippage exceeded: needed {needed}, allowed {allowed}")]
    SlippageExceeded { needed: U256, allowed: U256 },

    /// Zero or otherwise unusable settlement amount.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A spot-priced payment was submitted without an input cap.
    #[error("Missing input cap for spot-priced payment")]
    MissingInputCap,

    /// The dust refund was rejected by the recipient.
    #[error("Refund of {amount} {asset} failed: {reason}")]
    RefundFailed {
        asset: Asset,
        amount: U256,
        reason: String,
    },

    /// The engine is administratively paused.
    #[error("Engine paused")]
    Paused,

    /// A settlement is already in flight.
    #[error("Reentrant call rejected")]
    Reentrancy,

    /// The engine would end the call holding funds.
    #[error("Residual balance of {amount} {asset} held by engine")]
    ResidualBalance { asset: Asset, amount: U256 },

    /// Invalid settlement phase transition.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SettlementPhase,
        to: SettlementPhase,
    },
}

impl SettleError {
    /// Get the failure class.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SettleError::ZeroAddress { .. }
            | SettleError::AssetNotSupported(_)
            | SettleError::DecimalsUnreadable(_)
            | SettleError::InvalidConfiguration(_)
            | SettleError::Unauthorized => ErrorCategory::Configuration,
            SettleError::PriceFeedMissing(_)
            | SettleError::PriceFeedInvalid { .. }
            | SettleError::OracleDataStale(_)
            | SettleError::NoLiquidity { .. } => ErrorCategory::Pricing,
            SettleError::SwapFailed { .. }
            | SettleError::TransferFailed { .. }
            | SettleError::UntrustworthyExecution { .. }
            | SettleError::ArithmeticOverflow { .. } => ErrorCategory::Execution,
            SettleError::DeadlineExpired { .. }
            | SettleError::InsufficientNativeValue { .. }
            | SettleError::SlippageExceeded { .. }
            | SettleError::InvalidAmount(_)
            | SettleError::MissingInputCap => ErrorCategory::Caller,
            SettleError::RefundFailed { .. } => ErrorCategory::Disbursement,
            SettleError::Paused | SettleError::Reentrancy => ErrorCategory::Guard,
            SettleError::ResidualBalance { .. } | SettleError::InvalidTransition { .. } => {
                ErrorCategory::Invariant
            }
        }
    }

    /// Get the stable error code for off-chain tooling.
    pub fn error_code(&self) -> &'static str {
        match self {
            SettleError::ZeroAddress { .. } => "ZERO_ADDRESS",
            SettleError::AssetNotSupported(_) => "ASSET_NOT_SUPPORTED",
            SettleError::DecimalsUnreadable(_) => "DECIMALS_UNREADABLE",
            SettleError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            SettleError::Unauthorized => "UNAUTHORIZED",
            SettleError::PriceFeedMissing(_) => "PRICE_FEED_MISSING",
            SettleError::PriceFeedInvalid { .. } => "PRICE_FEED_INVALID",
            SettleError::OracleDataStale(_) => "ORACLE_DATA_STALE",
            SettleError::NoLiquidity { .. } => "NO_LIQUIDITY",
            SettleError::SwapFailed { .. } => "SWAP_FAILED",
            SettleError::TransferFailed { .. } => "TRANSFER_FAILED",
            SettleError::UntrustworthyExecution { .. } => "UNTRUSTWORTHY_EXECUTION",
            SettleError::ArithmeticOverflow { .. } => "ARITHMETIC_OVERFLOW",
            SettleError::DeadlineExpired { .. } => "DEADLINE_EXPIRED",
            SettleError::InsufficientNativeValue { .. } => "INSUFFICIENT_NATIVE_VALUE",
            SettleError::SlippageExceeded { .. } => "SLIPPAGE_EXCEEDED",
            SettleError::InvalidAmount(_) => "INVALID_AMOUNT",
            SettleError::MissingInputCap => "MISSING_INPUT_CAP",
            SettleError::RefundFailed { .. } => "REFUND_FAILED",
            SettleError::Paused => "PAUSED",
            SettleError::Reentrancy => "REENTRANCY",
            SettleError::ResidualBalance { .. } => "RESIDUAL_BALANCE",
            SettleError::InvalidTransition { .. } => "INVALID_TRANSITION",
        }
    }
}

/// Result type alias for AutoSettle operations.
pub type Result<T> = std::result::Result<T, SettleError>;
