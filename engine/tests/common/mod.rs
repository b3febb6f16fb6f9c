//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use autosettle_common::{Asset, ManualClock, PriceSource};
use autosettle_engine::{AdminCap, EngineConfig, SettlementEngine};
use autosettle_ledger::Ledger;
use autosettle_pricing::{
    ConstantProductVenue, FeedDirectory, OraclePriceEngine, PushPriceFeed, ScriptedVenue,
    SpotPriceEngine, SwapOrder, SwapVenue, VenueError,
};
use parking_lot::Mutex;

pub const USDC: Address = Address::repeat_byte(0x10);
pub const WETH: Address = Address::repeat_byte(0x20);
pub const DAI: Address = Address::repeat_byte(0x30);
pub const LINK: Address = Address::repeat_byte(0x40);
pub const MERCHANT: Address = Address::repeat_byte(0x70);
pub const PAYER: Address = Address::repeat_byte(0x01);
pub const VENUE: Address = Address::repeat_byte(0x99);
pub const ETH_FEED: Address = Address::repeat_byte(0xf1);
pub const DAI_FEED: Address = Address::repeat_byte(0xf2);
pub const NOW: u64 = 1_700_000_000;

pub fn e18(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000_000_000_000_000u64)
}

pub fn e6(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000u64)
}

/// Tokens, a funded payer and deep WETH/USDC and DAI/WETH pools.
pub fn base_ledger(venue: &ConstantProductVenue) -> Ledger {
    let mut ledger = Ledger::new();
    ledger.create_token(USDC, "USDC", 6).unwrap();
    ledger.create_wrapped_native(WETH).unwrap();
    ledger.create_token(DAI, "DAI", 18).unwrap();
    ledger.create_token(LINK, "LINK", 18).unwrap();
    venue
        .create_pool(&mut ledger, WETH, USDC, e18(10_000), e6(20_000_000))
        .unwrap();
    venue
        .create_pool(&mut ledger, DAI, WETH, e18(20_000_000), e18(10_000))
        .unwrap();

    ledger.mint(Asset::Native, PAYER, e18(1_000)).unwrap();
    ledger.mint(Asset::Token(DAI), PAYER, e18(1_000_000)).unwrap();
    ledger.mint(Asset::Token(USDC), PAYER, e6(1_000_000)).unwrap();
    ledger
}

pub fn approve_engine(ledger: &mut Ledger, engine: Address) {
    for token in [DAI, USDC, LINK] {
        ledger.approve(token, PAYER, engine, U256::MAX).unwrap();
    }
}

pub struct OracleFixture {
    pub engine: Arc<SettlementEngine<OraclePriceEngine>>,
    pub cap: AdminCap,
    pub venue: Arc<ScriptedVenue>,
    pub clock: ManualClock,
    pub eth_feed: Arc<PushPriceFeed>,
    pub dai_feed: Arc<PushPriceFeed>,
}

pub fn oracle_fixture() -> OracleFixture {
    let venue = Arc::new(ScriptedVenue::new(ConstantProductVenue::new(VENUE)));
    let mut ledger = base_ledger(venue.inner());
    let config = EngineConfig::new(USDC, WETH, MERCHANT);
    approve_engine(&mut ledger, config.engine_address);

    let feeds = Arc::new(FeedDirectory::new());
    let eth_feed = Arc::new(PushPriceFeed::new("ETH / USD", 8));
    eth_feed.set_answer(2_000_0000_0000, NOW);
    let dai_feed = Arc::new(PushPriceFeed::new("DAI / USD", 8));
    dai_feed.set_answer(1_0000_0000, NOW);
    feeds.register(ETH_FEED, eth_feed.clone());
    feeds.register(DAI_FEED, dai_feed.clone());

    let clock = ManualClock::new(NOW);
    let (engine, cap) = SettlementEngine::new(
        config,
        OraclePriceEngine::new(feeds, venue.clone()),
        venue.clone(),
        Arc::new(Mutex::new(ledger)),
        Arc::new(clock.clone()),
    )
    .unwrap();

    engine
        .register_asset(
            &cap,
            Asset::Native,
            PriceSource::Oracle {
                feed: ETH_FEED,
                max_price_age: 3600,
            },
            100,
        )
        .unwrap();
    engine
        .register_asset(
            &cap,
            Asset::Token(DAI),
            PriceSource::Oracle {
                feed: DAI_FEED,
                max_price_age: 3600,
            },
            100,
        )
        .unwrap();

    OracleFixture {
        engine: Arc::new(engine),
        cap,
        venue,
        clock,
        eth_feed,
        dai_feed,
    }
}

pub struct SpotFixture {
    pub engine: Arc<SettlementEngine<SpotPriceEngine>>,
    pub cap: AdminCap,
    pub venue: Arc<ScriptedVenue>,
}

pub fn spot_fixture() -> SpotFixture {
    let venue = Arc::new(ScriptedVenue::new(ConstantProductVenue::new(VENUE)));
    let mut ledger = base_ledger(venue.inner());
    let config = EngineConfig::new(USDC, WETH, MERCHANT);
    approve_engine(&mut ledger, config.engine_address);

    let (engine, cap) = SettlementEngine::new(
        config,
        SpotPriceEngine::new(venue.clone()),
        venue.clone(),
        Arc::new(Mutex::new(ledger)),
        Arc::new(ManualClock::new(NOW)),
    )
    .unwrap();

    engine
        .register_asset(&cap, Asset::Native, PriceSource::Spot { intermediate: None }, 50)
        .unwrap();
    engine
        .register_asset(
            &cap,
            Asset::Token(DAI),
            PriceSource::Spot {
                intermediate: Some(WETH),
            },
            50,
        )
        .unwrap();

    SpotFixture {
        engine: Arc::new(engine),
        cap,
        venue,
    }
}

/// Venue that always needs exactly `required` input and pays out of its own inventory.
pub struct FixedPriceVenue {
    pub address: Address,
    pub required: U256,
}

impl SwapVenue for FixedPriceVenue {
    fn address(&self) -> Address {
        self.address
    }

    fn quote_exact_output(
        &self,
        _ledger: &Ledger,
        path: &[Address],
        _amount_out: U256,
    ) -> Result<U256, VenueError> {
        if path.len() < 2 {
            return Err(VenueError::InvalidPath("short".to_string()));
        }
        Ok(self.required)
    }

    fn swap_exact_output(
        &self,
        ledger: &mut Ledger,
        order: &SwapOrder,
        _now: u64,
    ) -> Result<U256, VenueError> {
        let input = Asset::Token(order.path[0]);
        let output = Asset::Token(order.path[order.path.len() - 1]);
        ledger.transfer_from(input, self.address, order.payer, self.address, self.required)?;
        ledger.transfer(output, self.address, order.recipient, order.amount_out)?;
        Ok(self.required)
    }
}

/// Number of nonzero balances the engine holds.
pub fn engine_holdings<P: autosettle_pricing::PriceEngine>(engine: &SettlementEngine<P>) -> usize {
    engine.ledger().lock().holdings(engine.address()).len()
}
