//! Assets and fixed-point amounts.

use alloy_primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis-point denominator (100.00 %).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Precision every oracle price is normalized to before dividing.
pub const PRICE_DECIMALS: u8 = 18;

/// Decimals of a settlement amount expressed in cents.
pub const CENT_DECIMALS: u8 = 2;

/// Decimals of the chain's native coin.
pub const NATIVE_DECIMALS: u8 = 18;

/// Largest decimal exponent the engine will scale by.
pub const MAX_DECIMALS: u8 = 36;

/// An asset a payer can offer: the chain's native coin or a token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// The chain's native coin, paid by attaching value to the call.
    Native,
    /// A fungible token identified by its contract address.
    Token(Address),
}

impl Asset {
    /// Check if this is the native coin.
    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    /// Token address, if this is a token.
    pub fn token(&self) -> Option<Address> {
        match self {
            Asset::Native => None,
            Asset::Token(address) => Some(*address),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Token(address) => write!(f, "{address}"),
        }
    }
}

impl From<Address> for Asset {
    fn from(address: Address) -> Self {
        Asset::Token(address)
    }
}

/// A requested settlement amount in cents of the fiat-like unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SettlementAmount(u64);

impl SettlementAmount {
    /// Create from a number of cents.
    pub fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Number of cents.
    pub fn cents(&self) -> u64 {
        self.0
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Human-readable value, e.g. `100.00`.
    pub fn as_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.0), u32::from(CENT_DECIMALS))
    }

    /// Convert into minor units of an asset with `decimals` decimals.
    ///
    /// Rounds up when the asset has fewer than two decimals, so the
    /// merchant is never short-changed.
    pub fn to_units(&self, decimals: u8) -> Option<U256> {
        let cents = U256::from(self.0);
        if decimals >= CENT_DECIMALS {
            cents.checked_mul(pow10(decimals - CENT_DECIMALS)?)
        } else {
            let divisor = pow10(CENT_DECIMALS - decimals)?;
            let quotient = cents / divisor;
            if (cents % divisor).is_zero() {
                Some(quotient)
            } else {
                quotient.checked_add(U256::from(1u64))
            }
        }
    }
}

impl fmt::Display for SettlementAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

/// `10^exp`, or `None` when `exp` exceeds [`MAX_DECIMALS`].
pub fn pow10(exp: u8) -> Option<U256> {
    if exp > MAX_DECIMALS {
        return None;
    }
    U256::from(10u64).checked_pow(U256::from(exp))
}

/// Render minor units as a decimal string, trimming trailing zeros.
pub fn format_units(amount: U256, decimals: u8) -> String {
    let Some(unit) = pow10(decimals) else {
        return amount.to_string();
    };
    let whole = amount / unit;
    let fraction = amount % unit;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let digits = format!("{:0>width$}", fraction.to_string(), width = usize::from(decimals));
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
