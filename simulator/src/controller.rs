//! Simulation controller.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::{Address, U256};
use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use autosettle_common::{
    Asset, Clock, ManualClock, PriceSource, PricingMode, SettlementAmount, SettlementRequest, Timestamp,
};
use autosettle_engine::{AdminCap, EngineConfig, MetricsSnapshot, SettlementEngine};
use autosettle_ledger::{AccountPolicy, Ledger};
use autosettle_pricing::{
    ConstantProductVenue, FeedDirectory, OraclePriceEngine, PriceEngine, PushPriceFeed,
    ScriptedVenue, SpotPriceEngine, VenueScript,
};
use parking_lot::Mutex;

use crate::metrics::SimulationMetrics;
use crate::payer::{with_headroom, PayerFactory, SimulatedPayer};
use crate::scenario::{Expectation, Fault, Scenario, ScenarioStep};

pub const USDC: Address = Address::repeat_byte(0x10);
pub const WETH: Address = Address::repeat_byte(0x20);
pub const DAI: Address = Address::repeat_byte(0x30);
pub const LINK: Address = Address::repeat_byte(0x40);
pub const MERCHANT: Address = Address::repeat_byte(0x70);
pub const VENUE: Address = Address::repeat_byte(0x99);

const GENESIS: Timestamp = 1_700_000_000;
const FEED_DECIMALS: u8 = 8;
const MAX_PRICE_AGE: u64 = 3_600;

fn units(whole: u64, decimals: u8) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(decimals))
}

/// Symbol, feed address and USD price of every oracle-priced asset.
const LISTINGS: [(&str, Address, &str); 3] = [
    ("ETH", Address::repeat_byte(0xf1), "2000"),
    ("DAI", Address::repeat_byte(0xf2), "1"),
    ("LINK", Address::repeat_byte(0xf3), "15"),
];

/// Resolve a scenario asset symbol.
pub fn asset_by_symbol(symbol: &str) -> anyhow::Result<Asset> {
    match symbol {
        "ETH" => Ok(Asset::Native),
        "USDC" => Ok(Asset::Token(USDC)),
        "DAI" => Ok(Asset::Token(DAI)),
        "LINK" => Ok(Asset::Token(LINK)),
        _ => Err(anyhow::anyhow!("Unknown asset: {}", symbol)),
    }
}

/// Parse a dollar amount such as `"42.50"` into cents.
pub fn parse_amount(amount: &str) -> anyhow::Result<SettlementAmount> {
    let dollars = Decimal::from_str(amount).with_context(|| format!("bad amount {amount}"))?;
    let cents = (dollars * Decimal::ONE_HUNDRED)
        .to_u64()
        .filter(|_| dollars.scale() <= 2)
        .ok_or_else(|| anyhow::anyhow!("amount {} is not a whole number of cents", amount))?;
    Ok(SettlementAmount::from_cents(cents))
}

fn feed_answer(usd: &str) -> anyhow::Result<i128> {
    let price = Decimal::from_str(usd).with_context(|| format!("bad price {usd}"))?;
    (price * Decimal::from(10u64.pow(u32::from(FEED_DECIMALS))))
        .trunc()
        .to_i128()
        .ok_or_else(|| anyhow::anyhow!("price {} out of range", usd))
}

/// Tokens, pools and funded payers.
fn build_ledger(venue: &ConstantProductVenue, payers: &[SimulatedPayer], engine: Address) -> anyhow::Result<Ledger> {
    let mut ledger = Ledger::new();
    ledger.create_token(USDC, "USDC", 6)?;
    ledger.create_wrapped_native(WETH)?;
    ledger.create_token(DAI, "DAI", 18)?;
    ledger.create_token(LINK, "LINK", 18)?;

    // WETH/USDC at $2000 and DAI/WETH at $1. LINK has no pool.
    venue.create_pool(&mut ledger, WETH, USDC, units(50_000, 18), units(100_000_000, 6))?;
    venue.create_pool(&mut ledger, DAI, WETH, units(100_000_000, 18), units(50_000, 18))?;

    for payer in payers {
        ledger.mint(Asset::Native, payer.address, units(10_000, 18))?;
        for (token, decimals) in [(USDC, 6), (DAI, 18), (LINK, 18)] {
            ledger.mint(Asset::Token(token), payer.address, units(10_000_000, decimals))?;
            ledger.approve(token, payer.address, engine, U256::MAX)?;
        }
    }
    Ok(ledger)
}

/// Controls the simulation.
pub struct SimulationController<P: PriceEngine> {
    engine: Arc<SettlementEngine<P>>,
    cap: AdminCap,
    venue: Arc<ScriptedVenue>,
    feeds: BTreeMap<&'static str, Arc<PushPriceFeed>>,
    clock: ManualClock,
    payers: Vec<SimulatedPayer>,
    rng: StdRng,
    metrics: SimulationMetrics,
    invoices: u64,
    pace: Duration,
}

struct Parts {
    venue: Arc<ScriptedVenue>,
    clock: ManualClock,
    payers: Vec<SimulatedPayer>,
    ledger: Ledger,
    config: EngineConfig,
}

fn parts(payer_count: usize) -> anyhow::Result<Parts> {
    let venue = Arc::new(ScriptedVenue::new(ConstantProductVenue::new(VENUE)));
    let config = EngineConfig::new(USDC, WETH, MERCHANT);
    config.validate()?;

    let wallet = [Asset::Native, Asset::Token(DAI), Asset::Token(USDC)];
    let payers = PayerFactory::create_payers(payer_count.max(1), &wallet);
    let ledger = build_ledger(venue.inner(), &payers, config.engine_address)?;

    Ok(Parts {
        venue,
        clock: ManualClock::new(GENESIS),
        payers,
        ledger,
        config,
    })
}

impl SimulationController<OraclePriceEngine> {
    /// Market priced by push feeds.
    pub fn oracle(payer_count: usize, seed: Option<u64>) -> anyhow::Result<Self> {
        let Parts {
            venue,
            clock,
            payers,
            ledger,
            config,
        } = parts(payer_count)?;

        let directory = Arc::new(FeedDirectory::new());
        let mut feeds = BTreeMap::new();
        for (symbol, address, usd) in LISTINGS {
            let feed = Arc::new(PushPriceFeed::new(format!("{symbol} / USD"), FEED_DECIMALS));
            feed.set_answer(feed_answer(usd)?, GENESIS);
            directory.register(address, feed.clone());
            feeds.insert(symbol, feed);
        }

        let pricing = OraclePriceEngine::new(directory, venue.clone());
        let controller = Self::assemble(config, pricing, venue, ledger, clock, payers, feeds, seed)?;
        for (symbol, feed, _) in LISTINGS {
            controller.engine.register_asset(
                &controller.cap,
                asset_by_symbol(symbol)?,
                PriceSource::Oracle {
                    feed,
                    max_price_age: MAX_PRICE_AGE,
                },
                100,
            )?;
        }
        Ok(controller)
    }
}

impl SimulationController<SpotPriceEngine> {
    /// Market priced by live venue quotes.
    pub fn spot(payer_count: usize, seed: Option<u64>) -> anyhow::Result<Self> {
        let Parts {
            venue,
            clock,
            payers,
            ledger,
            config,
        } = parts(payer_count)?;

        let pricing = SpotPriceEngine::new(venue.clone());
        let controller =
            Self::assemble(config, pricing, venue, ledger, clock, payers, BTreeMap::new(), seed)?;
        controller.engine.register_asset(
            &controller.cap,
            Asset::Native,
            PriceSource::Spot { intermediate: None },
            50,
        )?;
        controller.engine.register_asset(
            &controller.cap,
            Asset::Token(DAI),
            PriceSource::Spot {
                intermediate: Some(WETH),
            },
            50,
        )?;
        Ok(controller)
    }
}

impl<P: PriceEngine> SimulationController<P> {
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        config: EngineConfig,
        pricing: P,
        venue: Arc<ScriptedVenue>,
        ledger: Ledger,
        clock: ManualClock,
        payers: Vec<SimulatedPayer>,
        feeds: BTreeMap<&'static str, Arc<PushPriceFeed>>,
        seed: Option<u64>,
    ) -> anyhow::Result<Self> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let (engine, cap) = SettlementEngine::new(
            config,
            pricing,
            venue.clone(),
            Arc::new(Mutex::new(ledger)),
            Arc::new(clock.clone()),
        )?;
        info!(
            engine = %engine.address(),
            mode = ?engine.pricing().mode(),
            payers = payers.len(),
            "Market initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            cap,
            venue,
            feeds,
            clock,
            payers,
            rng,
            metrics: SimulationMetrics::new(),
            invoices: 0,
            pace: Duration::ZERO,
        })
    }

    /// Sleep between payments.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// Run a scenario.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> anyhow::Result<()> {
        info!(name = %scenario.name, "Running scenario: {}", scenario.description);

        for step in &scenario.steps {
            self.execute_step(step).await?;
        }

        let stranded = self.engine.ledger().lock().holdings(self.engine.address());
        anyhow::ensure!(
            stranded.is_empty(),
            "engine ended the scenario holding {:?}",
            stranded
        );
        Ok(())
    }

    /// Execute a single scenario step.
    async fn execute_step(&mut self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::AdvanceClock { seconds } => {
                self.clock.advance(*seconds);
                info!(seconds, "Clock advanced");
            }
            ScenarioStep::Pay {
                payer,
                asset,
                amount,
                cap_bps,
                expect,
            } => {
                let payer = self
                    .payers
                    .iter()
                    .find(|p| &p.name == payer)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Unknown payer: {}", payer))?;
                let invoice = self.next_invoice();
                let request = payer.request(
                    asset_by_symbol(asset)?,
                    parse_amount(amount)?,
                    invoice,
                    self.clock.now() + 60,
                );
                self.submit(request, *cap_bps, expect).await;
            }
            ScenarioStep::RandomPayments { count } => {
                for _ in 0..*count {
                    let payer = self.payers[self.rng.gen_range(0..self.payers.len())].clone();
                    let invoice = self.next_invoice();
                    let Some(request) = payer.random_payment(&mut self.rng, invoice, self.clock.now()) else {
                        continue;
                    };
                    let cap_bps = self.rng.gen_range(0..200u16);
                    self.submit(request, Some(cap_bps), &Expectation::Any).await;
                }
            }
            ScenarioStep::SetPrice { asset, usd } => match self.feeds.get(asset.as_str()) {
                Some(feed) => {
                    feed.recover();
                    feed.set_answer(feed_answer(usd)?, self.clock.now());
                    info!(asset = %asset, usd = %usd, "Price published");
                }
                None => warn!(asset = %asset, "No feed to publish on"),
            },
            ScenarioStep::InjectFault { fault } => self.inject(fault)?,
            ScenarioStep::ClearFaults => {
                self.venue.set_script(VenueScript::Honest);
                for feed in self.feeds.values() {
                    feed.recover();
                }
                info!("Faults cleared");
            }
            ScenarioStep::SetPaused { paused } => {
                if *paused {
                    self.engine.pause(&self.cap)?;
                } else {
                    self.engine.unpause(&self.cap)?;
                }
            }
        }

        Ok(())
    }

    fn inject(&self, fault: &Fault) -> anyhow::Result<()> {
        info!(?fault, "Injecting fault");
        match fault {
            Fault::VenueOutage => self
                .venue
                .set_script(VenueScript::Reject("venue halted".to_string())),
            Fault::VenueShortfall { units } => self
                .venue
                .set_script(VenueScript::UnderDeliver(U256::from(*units))),
            Fault::FeedDown { asset } => match self.feeds.get(asset.as_str()) {
                Some(feed) => feed.fail("feed halted"),
                None => warn!(asset = %asset, "No feed to halt"),
            },
            Fault::PayerRejectsNative { payer } => {
                let address = self
                    .payers
                    .iter()
                    .find(|p| &p.name == payer)
                    .map(|p| p.address)
                    .ok_or_else(|| anyhow::anyhow!("Unknown payer: {}", payer))?;
                self.engine
                    .ledger()
                    .lock()
                    .set_policy(address, AccountPolicy::rejecting_native());
            }
        }
        Ok(())
    }

    /// Quote, cap and pay one request, then record the outcome.
    async fn submit(&mut self, mut request: SettlementRequest, cap_bps: Option<u16>, expect: &Expectation) {
        let quoted = self.engine.quote(request.asset, request.amount);
        if let (Ok(quoted), Some(bps)) = (&quoted, cap_bps) {
            request = request.with_max_input(with_headroom(*quoted, bps));
        }
        if request.asset.is_native() {
            let value = request
                .max_input
                .or_else(|| quoted.as_ref().ok().copied())
                .unwrap_or(U256::ZERO);
            request = request.with_value(value);
        }

        let amount = request.amount;
        let invoice = request.invoice.clone();
        let started = Instant::now();
        let outcome = self.engine.pay(request);
        let latency = started.elapsed().as_micros() as u64;

        let code = match &outcome {
            Ok(result) => {
                debug!(invoice = %invoice, route = %result.route, refund = %result.refund, "Paid");
                self.metrics
                    .record_success(amount, !result.refund.is_zero(), latency);
                None
            }
            Err(e) => {
                debug!(invoice = %invoice, code = e.error_code(), "Payment failed");
                self.metrics.record_failure(e.error_code(), latency);
                Some(e.error_code())
            }
        };

        let matched = match (expect, code) {
            (Expectation::Any, _) => true,
            (Expectation::Settled, None) => true,
            (Expectation::Fails(expected), Some(code)) => expected == code,
            _ => false,
        };
        if !matched {
            warn!(invoice = %invoice, ?expect, got = code.unwrap_or("SETTLED"), "Unexpected outcome");
            self.metrics.record_mismatch();
        }

        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }
    }

    fn next_invoice(&mut self) -> String {
        self.invoices += 1;
        format!("INV-{:05}", self.invoices)
    }

    /// Simulation metrics.
    pub fn metrics(&self) -> &SimulationMetrics {
        &self.metrics
    }

    /// Engine counters.
    pub fn engine_metrics(&self) -> MetricsSnapshot {
        self.engine.metrics().snapshot()
    }

    /// USDC the merchant has received.
    pub fn merchant_balance(&self) -> U256 {
        self.engine
            .ledger()
            .lock()
            .balance_of(Asset::Token(USDC), self.engine.merchant())
    }

    /// Engine events as JSON lines.
    pub fn events_json(&self) -> anyhow::Result<String> {
        Ok(self.engine.events().to_json_lines()?)
    }

    pub fn mode(&self) -> PricingMode {
        self.engine.pricing().mode()
    }
}
