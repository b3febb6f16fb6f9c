//! Ledger error types.

use alloy_primitives::{Address, U256};
use autosettle_common::Asset;
use thiserror::Error;

/// Errors raised by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Token contract does not exist.
    #[error("Unknown token: {0}")]
    UnknownToken(Address),

    /// Token contract already exists.
    #[error("Token already exists: {0}")]
    TokenExists(Address),

    /// No wrapped native token has been deployed.
    #[error("Wrapped native token not configured")]
    NoWrappedNative,

    /// Debit exceeds balance.
    #[error("Insufficient {asset} balance for {account}: needed {needed}, available {available}")]
    InsufficientBalance {
        asset: Asset,
        account: Address,
        needed: U256,
        available: U256,
    },

    /// Spender allowance too small.
    #[error("Insufficient allowance on {token} for {spender}: needed {needed}, approved {approved}")]
    InsufficientAllowance {
        token: Address,
        spender: Address,
        needed: U256,
        approved: U256,
    },

    /// The recipient refuses native value.
    #[error("Recipient {0} rejected native transfer")]
    RecipientRejected(Address),

    /// Native value cannot be approved or pulled.
    #[error("Native asset has no allowances")]
    NativeAllowance,

    /// Balance would exceed 256 bits.
    #[error("Balance overflow for {account}")]
    Overflow { account: Address },

    /// Rollback or commit of a checkpoint that is not open.
    #[error("Checkpoint {0} is not open")]
    StaleCheckpoint(usize),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
