//! Per-asset configuration held by the token registry.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{SettleError, BPS_DENOMINATOR, MAX_DECIMALS};

/// How an engine instance prices payer assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingMode {
    /// External price feed, engine-derived input cap.
    Oracle,
    /// Live pool quote, caller-supplied input cap.
    Spot,
}

impl fmt::Display for PricingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingMode::Oracle => write!(f, "oracle"),
            PricingMode::Spot => write!(f, "spot"),
        }
    }
}

/// Where an asset's price comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceSource {
    /// A price feed quoting the asset in the settlement unit.
    Oracle {
        /// Feed address.
        feed: Address,
        /// Maximum accepted observation age in seconds.
        max_price_age: u64,
    },
    /// The venue's pools, optionally routed through one intermediate token.
    Spot { intermediate: Option<Address> },
}

impl PriceSource {
    /// The pricing mode this source belongs to.
    pub fn mode(&self) -> PricingMode {
        match self {
            PriceSource::Oracle { .. } => PricingMode::Oracle,
            PriceSource::Spot { .. } => PricingMode::Spot,
        }
    }
}

/// Configuration of one supported payer asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Price source reference.
    pub price_source: PriceSource,
    /// Buffer added to quotes, in basis points.
    pub slippage_bps: u16,
    /// Decimals, cached at registration.
    pub decimals: u8,
    /// Disabled assets are neither quotable nor payable.
    pub enabled: bool,
}

impl TokenConfig {
    /// Oracle-priced asset.
    pub fn oracle(feed: Address, max_price_age: u64, slippage_bps: u16, decimals: u8) -> Self {
        Self {
            price_source: PriceSource::Oracle {
                feed,
                max_price_age,
            },
            slippage_bps,
            decimals,
            enabled: true,
        }
    }

    /// Spot-priced asset.
    pub fn spot(intermediate: Option<Address>, slippage_bps: u16, decimals: u8) -> Self {
        Self {
            price_source: PriceSource::Spot { intermediate },
            slippage_bps,
            decimals,
            enabled: true,
        }
    }

    /// Validate risk parameters.
    pub fn validate(&self) -> Result<(), SettleError> {
        if u64::from(self.slippage_bps) > BPS_DENOMINATOR {
            return Err(SettleError::InvalidConfiguration(format!(
                "slippage {} bps exceeds {}",
                self.slippage_bps, BPS_DENOMINATOR
            )));
        }

        if self.decimals > MAX_DECIMALS {
            return Err(SettleError::InvalidConfiguration(format!(
                "decimals {} exceed {}",
                self.decimals, MAX_DECIMALS
            )));
        }

        match self.price_source {
            PriceSource::Oracle {
                feed,
                max_price_age,
            } => {
                if feed == Address::ZERO {
                    return Err(SettleError::ZeroAddress { field: "feed" });
                }
                if max_price_age == 0 {
                    return Err(SettleError::InvalidConfiguration(
                        "max price age cannot be 0".to_string(),
                    ));
                }
            }
            PriceSource::Spot { intermediate } => {
                if intermediate == Some(Address::ZERO) {
                    return Err(SettleError::ZeroAddress {
                        field: "intermediate",
                    });
                }
            }
        }

        Ok(())
    }
}
