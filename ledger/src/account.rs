//! Account and token metadata.

use serde::{Deserialize, Serialize};

/// Behaviour of an account when receiving value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPolicy {
    /// The account's receive hook reverts on native transfers.
    pub rejects_native: bool,
}

impl AccountPolicy {
    /// An account that refuses native value.
    pub fn rejecting_native() -> Self {
        Self {
            rejects_native: true,
        }
    }

    /// Check if the account accepts native value.
    pub fn accepts_native(&self) -> bool {
        !self.rejects_native
    }
}

/// Metadata of a token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Ticker.
    pub symbol: String,
    /// Decimals.
    pub decimals: u8,
}

impl TokenInfo {
    /// Create token metadata.
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
        }
    }
}
