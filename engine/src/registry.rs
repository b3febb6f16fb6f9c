//! Supported payer assets.
//!
//! A pure data store. The settlement path only reads snapshots; every
//! mutation goes through the admin capability.

use alloy_primitives::Address;
use autosettle_common::{
    Asset, PriceSource, PricingMode, Result, SettleError, TokenConfig,
};
use autosettle_ledger::Ledger;
use dashmap::DashMap;
use tracing::debug;

/// Registry of supported payer assets.
pub struct TokenRegistry {
    mode: PricingMode,
    max_slippage_bps: u16,
    entries: DashMap<Asset, TokenConfig>,
}

impl TokenRegistry {
    /// Create a registry accepting price sources of `mode`.
    pub fn new(mode: PricingMode, max_slippage_bps: u16) -> Self {
        Self {
            mode,
            max_slippage_bps,
            entries: DashMap::new(),
        }
    }

    /// Build and validate a configuration, reading decimals from the ledger.
    pub fn build_config(
        &self,
        ledger: &Ledger,
        asset: Asset,
        price_source: PriceSource,
        slippage_bps: u16,
    ) -> Result<TokenConfig> {
        if asset == Asset::Token(Address::ZERO) {
            return Err(SettleError::ZeroAddress { field: "asset" });
        }
        if price_source.mode() != self.mode {
            return Err(SettleError::InvalidConfiguration(format!(
                "{} price source on a {} engine",
                price_source.mode(),
                self.mode
            )));
        }
        if slippage_bps > self.max_slippage_bps {
            return Err(SettleError::InvalidConfiguration(format!(
                "slippage {} bps exceeds limit {}",
                slippage_bps, self.max_slippage_bps
            )));
        }

        let decimals = ledger
            .decimals(asset)
            .ok_or(SettleError::DecimalsUnreadable(asset))?;
        let config = TokenConfig {
            price_source,
            slippage_bps,
            decimals,
            enabled: true,
        };
        config.validate()?;
        Ok(config)
    }

    /// Insert or replace an entry.
    pub fn insert(&self, asset: Asset, config: TokenConfig) {
        debug!(asset = %asset, source = ?config.price_source, "Asset registered");
        self.entries.insert(asset, config);
    }

    /// Remove an entry.
    pub fn remove(&self, asset: &Asset) -> Result<TokenConfig> {
        self.entries
            .remove(asset)
            .map(|(_, config)| config)
            .ok_or(SettleError::AssetNotSupported(*asset))
    }

    /// Flip the enabled flag, returning the updated entry.
    pub fn set_enabled(&self, asset: &Asset, enabled: bool) -> Result<TokenConfig> {
        let mut entry = self
            .entries
            .get_mut(asset)
            .ok_or(SettleError::AssetNotSupported(*asset))?;
        entry.enabled = enabled;
        Ok(*entry)
    }

    /// Snapshot of an entry.
    pub fn get(&self, asset: &Asset) -> Option<TokenConfig> {
        self.entries.get(asset).map(|entry| *entry)
    }

    /// Snapshot of an entry that may be quoted and paid with.
    pub fn require_enabled(&self, asset: &Asset) -> Result<TokenConfig> {
        match self.get(asset) {
            Some(config) if config.enabled => Ok(config),
            _ => Err(SettleError::AssetNotSupported(*asset)),
        }
    }

    /// Every registered asset, sorted.
    pub fn assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self.entries.iter().map(|e| *e.key()).collect();
        assets.sort();
        assets
    }

    pub fn mode(&self) -> PricingMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
