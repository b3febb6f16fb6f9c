//! Simulation scenarios.

use autosettle_common::PricingMode;
use serde::{Deserialize, Serialize};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Pricing mode the engine runs in.
    pub mode: PricingMode,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Move the simulated clock forward.
    AdvanceClock { seconds: u64 },
    /// One payment from a named payer.
    Pay {
        payer: String,
        asset: String,
        /// Settlement amount, e.g. `"100.00"`.
        amount: String,
        /// Cap headroom over the quote. Spot payments always need one.
        cap_bps: Option<u16>,
        expect: Expectation,
    },
    /// Random payments drawn from every payer.
    RandomPayments { count: usize },
    /// Publish a new USD price on an asset's feed.
    SetPrice { asset: String, usd: String },
    /// Inject a fault.
    InjectFault { fault: Fault },
    /// Clear every venue fault.
    ClearFaults,
    /// Pause or resume the engine.
    SetPaused { paused: bool },
}

/// Faults that can be injected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Fault {
    /// Every swap reverts.
    VenueOutage,
    /// The venue keeps part of the output.
    VenueShortfall { units: u64 },
    /// An asset's feed stops answering.
    FeedDown { asset: String },
    /// A payer stops accepting native value.
    PayerRejectsNative { payer: String },
}

/// Expected outcome of a payment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expectation {
    /// Any outcome is fine.
    Any,
    /// The payment settles.
    Settled,
    /// The payment fails with this error code.
    Fails(String),
}

impl Expectation {
    fn fails(code: &str) -> Self {
        Self::Fails(code.to_string())
    }
}

fn pay(payer: &str, asset: &str, amount: &str, cap_bps: Option<u16>, expect: Expectation) -> ScenarioStep {
    ScenarioStep::Pay {
        payer: payer.to_string(),
        asset: asset.to_string(),
        amount: amount.to_string(),
        cap_bps,
        expect,
    }
}

impl Scenario {
    /// Names accepted by [`Scenario::load`].
    pub const NAMES: [&'static str; 5] = [
        "oracle-checkout",
        "spot-checkout",
        "stale-oracle",
        "venue-failure",
        "refund-rejected",
    ];

    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "oracle-checkout" => Ok(Self::oracle_checkout()),
            "spot-checkout" => Ok(Self::spot_checkout()),
            "stale-oracle" => Ok(Self::stale_oracle()),
            "venue-failure" => Ok(Self::venue_failure()),
            "refund-rejected" => Ok(Self::refund_rejected()),
            _ => Err(anyhow::anyhow!(
                "Unknown scenario: {} (expected one of {})",
                name,
                Self::NAMES.join(", ")
            )),
        }
    }

    /// Random traffic for `payments` payments in the given mode.
    pub fn random(mode: PricingMode, payments: usize) -> Self {
        Self {
            name: "random".to_string(),
            description: format!("{payments} random payments"),
            mode,
            steps: vec![ScenarioStep::RandomPayments { count: payments }],
        }
    }

    fn oracle_checkout() -> Self {
        Self {
            name: "oracle-checkout".to_string(),
            description: "Native, token and settlement-token payments priced by feeds".to_string(),
            mode: PricingMode::Oracle,
            steps: vec![
                pay("alice", "ETH", "100.00", None, Expectation::Settled),
                pay("bob", "DAI", "42.50", None, Expectation::Settled),
                pay("carol", "USDC", "9.99", None, Expectation::Settled),
                pay("alice", "LINK", "5.00", None, Expectation::fails("SWAP_FAILED")),
                ScenarioStep::RandomPayments { count: 10 },
            ],
        }
    }

    fn spot_checkout() -> Self {
        Self {
            name: "spot-checkout".to_string(),
            description: "Payments capped against live venue quotes".to_string(),
            mode: PricingMode::Spot,
            steps: vec![
                pay("alice", "ETH", "100.00", Some(50), Expectation::Settled),
                pay("bob", "DAI", "25.00", Some(50), Expectation::Settled),
                pay("bob", "DAI", "25.00", None, Expectation::fails("MISSING_INPUT_CAP")),
                ScenarioStep::RandomPayments { count: 10 },
            ],
        }
    }

    fn stale_oracle() -> Self {
        Self {
            name: "stale-oracle".to_string(),
            description: "Feeds age out and recover after a fresh answer".to_string(),
            mode: PricingMode::Oracle,
            steps: vec![
                pay("alice", "ETH", "10.00", None, Expectation::Settled),
                ScenarioStep::AdvanceClock { seconds: 7_200 },
                pay("alice", "ETH", "10.00", None, Expectation::fails("ORACLE_DATA_STALE")),
                ScenarioStep::SetPrice {
                    asset: "ETH".to_string(),
                    usd: "2100".to_string(),
                },
                pay("alice", "ETH", "10.00", None, Expectation::Settled),
                ScenarioStep::InjectFault {
                    fault: Fault::FeedDown {
                        asset: "DAI".to_string(),
                    },
                },
                pay("bob", "DAI", "10.00", None, Expectation::fails("PRICE_FEED_MISSING")),
            ],
        }
    }

    fn venue_failure() -> Self {
        Self {
            name: "venue-failure".to_string(),
            description: "Venue outages and short deliveries revert cleanly".to_string(),
            mode: PricingMode::Oracle,
            steps: vec![
                ScenarioStep::InjectFault {
                    fault: Fault::VenueOutage,
                },
                pay("alice", "ETH", "50.00", None, Expectation::fails("SWAP_FAILED")),
                ScenarioStep::InjectFault {
                    fault: Fault::VenueShortfall { units: 1 },
                },
                pay("bob", "DAI", "50.00", None, Expectation::fails("UNTRUSTWORTHY_EXECUTION")),
                ScenarioStep::ClearFaults,
                ScenarioStep::SetPaused { paused: true },
                pay("bob", "DAI", "50.00", None, Expectation::fails("PAUSED")),
                ScenarioStep::SetPaused { paused: false },
                pay("bob", "DAI", "50.00", None, Expectation::Settled),
            ],
        }
    }

    fn refund_rejected() -> Self {
        Self {
            name: "refund-rejected".to_string(),
            description: "A payer that refuses native refunds cannot pay in native".to_string(),
            mode: PricingMode::Oracle,
            steps: vec![
                ScenarioStep::InjectFault {
                    fault: Fault::PayerRejectsNative {
                        payer: "carol".to_string(),
                    },
                },
                pay("carol", "ETH", "20.00", None, Expectation::fails("REFUND_FAILED")),
                pay("carol", "DAI", "20.00", None, Expectation::Settled),
            ],
        }
    }
}
