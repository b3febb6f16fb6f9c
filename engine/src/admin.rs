//! Administration behind an unforgeable capability.
//!
//! Every mutation of engine-wide configuration takes an [`AdminCap`]. The
//! capability is neither `Clone` nor constructible outside this crate, so
//! holding it is the authorization.

use alloy_primitives::{Address, U256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use autosettle_common::{Asset, EngineEvent, PriceSource, Result, SettleError, TokenConfig};
use autosettle_pricing::PriceEngine;

use crate::executor::transfer_failed;
use crate::orchestrator::SettlementEngine;
use crate::state::OperationalState;

/// Authorization to administer one engine.
#[derive(Debug, PartialEq, Eq)]
pub struct AdminCap {
    id: Uuid,
}

impl AdminCap {
    pub(crate) fn issue() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<P: PriceEngine> SettlementEngine<P> {
    fn authorize(&self, cap: &AdminCap) -> Result<()> {
        if *self.admin.read() == cap.id {
            Ok(())
        } else {
            warn!(cap = %cap.id, "Unauthorized admin call");
            Err(SettleError::Unauthorized)
        }
    }

    /// Register or replace a supported payer asset.
    #[instrument(skip(self, cap), fields(asset = %asset))]
    pub fn register_asset(
        &self,
        cap: &AdminCap,
        asset: Asset,
        price_source: PriceSource,
        slippage_bps: u16,
    ) -> Result<TokenConfig> {
        self.authorize(cap)?;
        let _entered = self.guard.enter()?;

        let config = {
            let ledger = self.ledger.lock();
            self.registry
                .build_config(&ledger, asset, price_source, slippage_bps)?
        };
        self.registry.insert(asset, config);
        self.events.append(EngineEvent::TokenConfigChanged {
            asset,
            config: Some(config),
        });
        info!(decimals = config.decimals, slippage_bps, "Asset registered");
        Ok(config)
    }

    /// Remove a supported payer asset.
    #[instrument(skip(self, cap), fields(asset = %asset))]
    pub fn deregister_asset(&self, cap: &AdminCap, asset: Asset) -> Result<TokenConfig> {
        self.authorize(cap)?;
        let _entered = self.guard.enter()?;

        let removed = self.registry.remove(&asset)?;
        self.events.append(EngineEvent::TokenConfigChanged {
            asset,
            config: None,
        });
        info!("Asset deregistered");
        Ok(removed)
    }

    /// Enable or disable a registered asset without dropping its configuration.
    pub fn set_asset_enabled(&self, cap: &AdminCap, asset: Asset, enabled: bool) -> Result<TokenConfig> {
        self.authorize(cap)?;
        let _entered = self.guard.enter()?;

        let config = self.registry.set_enabled(&asset, enabled)?;
        self.events.append(EngineEvent::TokenConfigChanged {
            asset,
            config: Some(config),
        });
        info!(asset = %asset, enabled, "Asset toggled");
        Ok(config)
    }

    /// Change the merchant payout address. Returns the previous one.
    pub fn set_merchant(&self, cap: &AdminCap, merchant: Address) -> Result<Address> {
        self.authorize(cap)?;
        let _entered = self.guard.enter()?;

        if merchant == Address::ZERO {
            return Err(SettleError::ZeroAddress { field: "merchant" });
        }
        if merchant == self.config.engine_address {
            return Err(SettleError::InvalidConfiguration(
                "merchant cannot be the engine itself".to_string(),
            ));
        }

        let previous = std::mem::replace(&mut *self.merchant.write(), merchant);
        self.events.append(EngineEvent::MerchantChanged {
            previous,
            current: merchant,
        });
        info!(previous = %previous, current = %merchant, "Merchant changed");
        Ok(previous)
    }

    /// Reject every quote and payment until [`SettlementEngine::unpause`].
    pub fn pause(&self, cap: &AdminCap) -> Result<()> {
        self.set_state(cap, OperationalState::Paused)
    }

    pub fn unpause(&self, cap: &AdminCap) -> Result<()> {
        self.set_state(cap, OperationalState::Active)
    }

    fn set_state(&self, cap: &AdminCap, next: OperationalState) -> Result<()> {
        self.authorize(cap)?;
        let _entered = self.guard.enter()?;

        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            self.events.append(EngineEvent::PauseChanged {
                paused: next.is_paused(),
            });
            info!(state = %next, "Engine state changed");
        }
        Ok(())
    }

    /// Move any balance of `asset` the engine holds to `to`.
    ///
    /// Settlements never change the engine's balances, so a nonzero sweep
    /// points at funds sent to the engine directly.
    #[instrument(skip(self, cap), fields(asset = %asset, to = %to))]
    pub fn sweep(&self, cap: &AdminCap, asset: Asset, to: Address) -> Result<U256> {
        self.authorize(cap)?;
        let _entered = self.guard.enter()?;

        if to == Address::ZERO {
            return Err(SettleError::ZeroAddress { field: "to" });
        }

        let engine = self.config.engine_address;
        let mut ledger = self.ledger.lock();
        let amount = ledger.balance_of(asset, engine);
        if amount.is_zero() {
            return Ok(amount);
        }

        warn!(amount = %amount, "Sweeping residual engine balance");
        ledger
            .transfer(asset, engine, to, amount)
            .map_err(|e| transfer_failed(asset, e))?;
        drop(ledger);

        self.events.append(EngineEvent::Swept { asset, amount, to });
        Ok(amount)
    }

    /// Replace the capability. The old one stops working.
    pub fn rotate_admin(&self, cap: &AdminCap) -> Result<AdminCap> {
        self.authorize(cap)?;
        let _entered = self.guard.enter()?;

        let next = AdminCap::issue();
        *self.admin.write() = next.id;
        info!(admin = %next.id, "Admin capability rotated");
        Ok(next)
    }
}
