//! Engine configuration.

use alloy_primitives::Address;
use autosettle_common::{Result, SettleError, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default upper bound on a registered asset's slippage buffer (5 %).
pub const DEFAULT_MAX_SLIPPAGE_BPS: u16 = 500;

/// Main engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Account the engine holds funds under during a call.
    pub engine_address: Address,
    /// Token every payment settles into.
    pub settlement_token: Address,
    /// Wrapped native token, used to route native payments.
    pub wrapped_native: Address,
    /// Initial merchant payout address.
    pub merchant: Address,
    /// Largest slippage buffer registration accepts.
    pub max_slippage_bps: u16,
    /// Start in the paused state.
    pub start_paused: bool,
    /// Log level for binaries embedding the engine.
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_address: Address::repeat_byte(0xe0),
            settlement_token: Address::ZERO,
            wrapped_native: Address::ZERO,
            merchant: Address::ZERO,
            max_slippage_bps: DEFAULT_MAX_SLIPPAGE_BPS,
            start_paused: false,
            log_level: "info".to_string(),
        }
    }
}

fn env_address(key: &str) -> Option<Address> {
    std::env::var(key)
        .ok()
        .and_then(|value| Address::from_str(value.trim()).ok())
}

impl EngineConfig {
    /// Create a configuration for the given market addresses.
    pub fn new(settlement_token: Address, wrapped_native: Address, merchant: Address) -> Self {
        Self {
            settlement_token,
            wrapped_native,
            merchant,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(address) = env_address("AUTOSETTLE_ENGINE_ADDRESS") {
            config.engine_address = address;
        }

        if let Some(address) = env_address("AUTOSETTLE_SETTLEMENT_TOKEN") {
            config.settlement_token = address;
        }

        if let Some(address) = env_address("AUTOSETTLE_WRAPPED_NATIVE") {
            config.wrapped_native = address;
        }

        if let Some(address) = env_address("AUTOSETTLE_MERCHANT") {
            config.merchant = address;
        }

        if let Ok(bps) = std::env::var("AUTOSETTLE_MAX_SLIPPAGE_BPS") {
            if let Ok(bps) = bps.parse() {
                config.max_slippage_bps = bps;
            }
        }

        if let Ok(paused) = std::env::var("AUTOSETTLE_START_PAUSED") {
            config.start_paused = matches!(paused.as_str(), "1" | "true" | "yes");
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        let addresses = [
            ("engine_address", self.engine_address),
            ("settlement_token", self.settlement_token),
            ("wrapped_native", self.wrapped_native),
            ("merchant", self.merchant),
        ];
        for (field, address) in addresses {
            if address == Address::ZERO {
                return Err(SettleError::ZeroAddress { field });
            }
        }

        if u64::from(self.max_slippage_bps) > BPS_DENOMINATOR {
            return Err(SettleError::InvalidConfiguration(format!(
                "max slippage {} bps exceeds {}",
                self.max_slippage_bps, BPS_DENOMINATOR
            )));
        }

        if self.merchant == self.engine_address {
            return Err(SettleError::InvalidConfiguration(
                "merchant cannot be the engine itself".to_string(),
            ));
        }

        Ok(())
    }
}
