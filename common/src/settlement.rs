//! Settlement request/result types and the per-call state machine.

use crate::{Asset, InvoiceId, SettlementAmount, SettlementId, Timestamp};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a single settlement call.
///
/// Phases run strictly forward; any failure jumps to `Reverted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementPhase {
    /// Checking the caller's deadline.
    DeadlineCheck,
    /// Pricing the payer asset.
    Quote,
    /// Pulling the reserved input from the payer.
    Reserve,
    /// Choosing a route and swapping.
    RouteAndExecute,
    /// Returning unspent input.
    Refund,
    /// Paying the merchant.
    Deliver,
    /// Recording the audit event.
    Emit,
    /// Complete.
    Settled,
    /// Rolled back, no effects survive.
    Reverted,
}

impl SettlementPhase {
    /// Check if this is a final state.
    pub fn is_final(&self) -> bool {
        matches!(self, SettlementPhase::Settled | SettlementPhase::Reverted)
    }

    /// Get the single forward successor, if any.
    pub fn next(&self) -> Option<SettlementPhase> {
        match self {
            SettlementPhase::DeadlineCheck => Some(SettlementPhase::Quote),
            SettlementPhase::Quote => Some(SettlementPhase::Reserve),
            SettlementPhase::Reserve => Some(SettlementPhase::RouteAndExecute),
            SettlementPhase::RouteAndExecute => Some(SettlementPhase::Refund),
            SettlementPhase::Refund => Some(SettlementPhase::Deliver),
            SettlementPhase::Deliver => Some(SettlementPhase::Emit),
            SettlementPhase::Emit => Some(SettlementPhase::Settled),
            SettlementPhase::Settled | SettlementPhase::Reverted => None,
        }
    }

    /// Check if transition to given phase is valid.
    pub fn can_transition_to(&self, next: SettlementPhase) -> bool {
        if self.is_final() {
            return false;
        }
        next == SettlementPhase::Reverted || self.next() == Some(next)
    }
}

impl fmt::Display for SettlementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Shape of a conversion route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Payer asset is the settlement asset; no conversion.
    SameAsset,
    /// `asset -> settlement`.
    Direct,
    /// `asset -> intermediate -> settlement`.
    ViaIntermediate,
}

/// Ordered token hops used to convert the payer asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// Route shape.
    pub kind: RouteKind,
    /// Token path, first hop is the payer side. Empty for `SameAsset`.
    pub path: Vec<Address>,
}

impl Route {
    /// No conversion.
    pub fn same_asset() -> Self {
        Self {
            kind: RouteKind::SameAsset,
            path: Vec::new(),
        }
    }

    /// `input -> output`.
    pub fn direct(input: Address, output: Address) -> Self {
        Self {
            kind: RouteKind::Direct,
            path: vec![input, output],
        }
    }

    /// `input -> intermediate -> output`.
    pub fn via(input: Address, intermediate: Address, output: Address) -> Self {
        Self {
            kind: RouteKind::ViaIntermediate,
            path: vec![input, intermediate, output],
        }
    }

    /// Number of swaps along the route.
    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return write!(f, "same-asset");
        }
        let hops: Vec<String> = self.path.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", hops.join(" -> "))
    }
}

/// A payment request, scoped to one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    /// Account paying.
    pub payer: Address,
    /// Asset offered.
    pub asset: Asset,
    /// Amount the merchant must receive.
    pub amount: SettlementAmount,
    /// Caller-imposed input cap. Required for spot pricing.
    pub max_input: Option<U256>,
    /// Opaque invoice reference.
    pub invoice: InvoiceId,
    /// Last valid timestamp.
    pub deadline: Timestamp,
    /// Native value attached to the call.
    pub attached_value: U256,
}

impl SettlementRequest {
    /// Create a new request without input cap or attached value.
    pub fn new(
        payer: Address,
        asset: Asset,
        amount: SettlementAmount,
        invoice: impl Into<InvoiceId>,
        deadline: Timestamp,
    ) -> Self {
        Self {
            payer,
            asset,
            amount,
            max_input: None,
            invoice: invoice.into(),
            deadline,
            attached_value: U256::ZERO,
        }
    }

    /// Cap the input the payer is willing to spend.
    pub fn with_max_input(mut self, max_input: U256) -> Self {
        self.max_input = Some(max_input);
        self
    }

    /// Attach native value.
    pub fn with_value(mut self, value: U256) -> Self {
        self.attached_value = value;
        self
    }
}

/// Outcome of a successful settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    /// Settlement identifier.
    pub id: SettlementId,
    /// Account that paid.
    pub payer: Address,
    /// Asset paid with.
    pub asset: Asset,
    /// Input pulled from the payer before the swap.
    pub amount_reserved: U256,
    /// Input actually spent.
    pub amount_consumed: U256,
    /// Input returned to the payer.
    pub refund: U256,
    /// Requested amount in cents.
    pub settlement_amount: SettlementAmount,
    /// Settlement asset units delivered to the merchant.
    pub settlement_delivered: U256,
    /// Merchant that received the settlement asset.
    pub merchant: Address,
    /// Route used.
    pub route: Route,
    /// Invoice reference.
    pub invoice: InvoiceId,
    /// Block time of settlement.
    pub settled_at: Timestamp,
}

impl SettlementResult {
    /// Check the reservation accounting.
    pub fn is_balanced(&self) -> bool {
        self.amount_consumed <= self.amount_reserved
            && self.amount_reserved - self.amount_consumed == self.refund
    }
}

/// Error when attempting an invalid phase transition.
#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub from: SettlementPhase,
    pub to: SettlementPhase,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid transition from {:?} to {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Tracks the phases one settlement call passes through.
#[derive(Debug, Clone)]
pub struct SettlementRun {
    /// Settlement identifier.
    pub id: SettlementId,
    /// Current phase.
    pub phase: SettlementPhase,
    /// Phases entered, in order.
    pub history: Vec<SettlementPhase>,
}

impl SettlementRun {
    /// Start a new run at `DeadlineCheck`.
    pub fn new() -> Self {
        Self {
            id: SettlementId::new(),
            phase: SettlementPhase::DeadlineCheck,
            history: vec![SettlementPhase::DeadlineCheck],
        }
    }

    /// Transition to a new phase.
    pub fn transition_to(&mut self, next: SettlementPhase) -> Result<(), InvalidTransition> {
        if !self.phase.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// Mark the run as reverted.
    pub fn revert(&mut self) -> Result<(), InvalidTransition> {
        self.transition_to(SettlementPhase::Reverted)
    }
}

impl Default for SettlementRun {
    fn default() -> Self {
        Self::new()
    }
}
