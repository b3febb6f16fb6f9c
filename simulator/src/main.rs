//! AutoSettle Simulator
//!
//! Runs payment scenarios against an in-process market: a ledger, a
//! constant-product venue, push price feeds and one settlement engine.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autosettle_common::{format_units, PricingMode};
use autosettle_pricing::PriceEngine;

mod controller;
mod metrics;
mod payer;
mod scenario;

use controller::SimulationController;
use scenario::Scenario;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Oracle,
    Spot,
}

impl From<Mode> for PricingMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Oracle => PricingMode::Oracle,
            Mode::Spot => PricingMode::Spot,
        }
    }
}

/// AutoSettle Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "AutoSettle payment simulation environment")]
struct Args {
    /// Named scenario to run instead of random traffic
    #[arg(short, long)]
    scenario: Option<String>,

    /// Pricing mode for random traffic
    #[arg(long, value_enum, default_value = "oracle")]
    mode: Mode,

    /// Number of random payments
    #[arg(short, long, default_value = "50")]
    payments: usize,

    /// Number of simulated payers
    #[arg(long, default_value = "4")]
    payers: usize,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Delay between payments in milliseconds
    #[arg(long, default_value = "0")]
    pace_ms: u64,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the engine event log as JSON lines at the end
    #[arg(long)]
    events: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(args.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let scenario = match &args.scenario {
        Some(name) => Scenario::load(name)?,
        None => Scenario::random(args.mode.into(), args.payments),
    };

    info!("Starting AutoSettle Simulator");
    info!("Scenario: {} ({:?} pricing)", scenario.name, scenario.mode);

    match scenario.mode {
        PricingMode::Oracle => {
            let sim = SimulationController::oracle(args.payers, args.seed)?;
            run(sim, &scenario, &args).await
        }
        PricingMode::Spot => {
            let sim = SimulationController::spot(args.payers, args.seed)?;
            run(sim, &scenario, &args).await
        }
    }
}

async fn run<P: PriceEngine>(
    sim: SimulationController<P>,
    scenario: &Scenario,
    args: &Args,
) -> anyhow::Result<()> {
    let mut sim = sim.with_pace(Duration::from_millis(args.pace_ms));
    sim.run_scenario(scenario).await?;

    let metrics = sim.metrics();
    let engine = sim.engine_metrics();
    info!("Simulation complete");
    info!(mode = ?sim.mode(), "Payments: {}", metrics.total_payments);
    info!("Settled: {} ({:.1}%)", metrics.settled, metrics.success_rate() * 100.0);
    info!("Failed: {}", metrics.failed);
    for (code, count) in &metrics.failures_by_code {
        info!("  {}: {}", code, count);
    }
    info!("Refunds issued: {}", metrics.refunds);
    info!("Volume settled: ${}", metrics.volume);
    info!("Merchant balance: {} USDC", format_units(sim.merchant_balance(), 6));
    info!(
        "Routes: same-asset {}, direct {}, via {}",
        engine.routes_same_asset, engine.routes_direct, engine.routes_via
    );
    info!(
        "Latency: avg {}µs, p99 {}µs",
        metrics.average_latency_us(),
        metrics.p99_latency_us()
    );

    if args.events {
        print!("{}", sim.events_json()?);
    }

    anyhow::ensure!(
        metrics.mismatches == 0,
        "{} step(s) did not match their expected outcome",
        metrics.mismatches
    );
    Ok(())
}
