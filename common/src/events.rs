//! Audit events recorded by the engine.

use crate::{Asset, InvoiceId, SettlementAmount, SettlementId, Timestamp, TokenConfig};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Append-only audit signal. Not part of any pricing decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A payment settled.
    SettlementProcessed {
        id: SettlementId,
        payer: Address,
        payer_asset: Asset,
        amount_consumed: U256,
        settlement_amount: SettlementAmount,
        merchant: Address,
        invoice: InvoiceId,
        at: Timestamp,
    },
    /// An asset was registered, updated or removed (`config` is `None`).
    TokenConfigChanged {
        asset: Asset,
        config: Option<TokenConfig>,
    },
    /// The merchant payout address changed.
    MerchantChanged { previous: Address, current: Address },
    /// The engine was paused or resumed.
    PauseChanged { paused: bool },
    /// A residual balance was swept out of the engine.
    Swept {
        asset: Asset,
        amount: U256,
        to: Address,
    },
}

impl EngineEvent {
    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::SettlementProcessed { .. } => "settlement_processed",
            EngineEvent::TokenConfigChanged { .. } => "token_config_changed",
            EngineEvent::MerchantChanged { .. } => "merchant_changed",
            EngineEvent::PauseChanged { .. } => "pause_changed",
            EngineEvent::Swept { .. } => "swept",
        }
    }
}
