//! Settlement orchestrator.
//!
//! The single entry point for payments and quotes. One call runs
//! `DeadlineCheck -> Quote -> Reserve -> RouteAndExecute -> Refund ->
//! Deliver -> Emit` against a ledger checkpoint; any failure rolls the
//! ledger back to that checkpoint, so no partial effect survives.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use parking_lot::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use autosettle_common::{
    is_expired, Asset, Clock, EngineEvent, Result, Route, SettleError, SettlementAmount,
    SettlementPhase, SettlementRequest, SettlementResult, SettlementRun, Timestamp, TokenConfig,
};
use autosettle_ledger::Ledger;
use autosettle_pricing::conversion::settlement_units;
use autosettle_pricing::{Market, OraclePriceEngine, PriceEngine, QuoteContext, SpotPriceEngine, SwapVenue};

use crate::admin::AdminCap;
use crate::config::EngineConfig;
use crate::events::EventLog;
use crate::executor::SettlementExecutor;
use crate::guard::ReentrancyGuard;
use crate::metrics::{EngineMetrics, SharedMetrics};
use crate::refund::RefundCalculator;
use crate::registry::TokenRegistry;
use crate::state::OperationalState;

/// Engine priced from external feeds.
pub type OracleSettlementEngine = SettlementEngine<OraclePriceEngine>;

/// Engine priced from live pool quotes.
pub type SpotSettlementEngine = SettlementEngine<SpotPriceEngine>;

/// The settlement engine, generic over its pricing source.
pub struct SettlementEngine<P: PriceEngine> {
    pub(crate) config: EngineConfig,
    pub(crate) market: Market,
    pub(crate) pricing: P,
    pub(crate) venue: Arc<dyn SwapVenue>,
    pub(crate) ledger: Arc<Mutex<Ledger>>,
    pub(crate) registry: TokenRegistry,
    pub(crate) state: RwLock<OperationalState>,
    pub(crate) merchant: RwLock<Address>,
    pub(crate) admin: RwLock<Uuid>,
    pub(crate) guard: ReentrancyGuard,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) events: EventLog,
    pub(crate) metrics: SharedMetrics,
}

fn advance(run: &mut SettlementRun, next: SettlementPhase) -> Result<()> {
    run.transition_to(next)
        .map_err(|e| SettleError::InvalidTransition {
            from: e.from,
            to: e.to,
        })
}

impl<P: PriceEngine> SettlementEngine<P> {
    /// Create an engine and the capability that administers it.
    pub fn new(
        config: EngineConfig,
        pricing: P,
        venue: Arc<dyn SwapVenue>,
        ledger: Arc<Mutex<Ledger>>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, AdminCap)> {
        config.validate()?;

        let market = {
            let ledger = ledger.lock();
            let settlement = Asset::Token(config.settlement_token);
            let settlement_decimals = ledger
                .decimals(settlement)
                .ok_or(SettleError::DecimalsUnreadable(settlement))?;
            if ledger.wrapped_native() != Some(config.wrapped_native) {
                return Err(SettleError::InvalidConfiguration(format!(
                    "{} is not the ledger's wrapped native token",
                    config.wrapped_native
                )));
            }
            Market {
                settlement_token: config.settlement_token,
                settlement_decimals,
                wrapped_native: config.wrapped_native,
            }
        };
        market.validate()?;

        let state = if config.start_paused {
            OperationalState::Paused
        } else {
            OperationalState::Active
        };
        let cap = AdminCap::issue();

        info!(
            engine = %config.engine_address,
            mode = %pricing.mode(),
            settlement_token = %market.settlement_token,
            merchant = %config.merchant,
            state = %state,
            "Settlement engine created"
        );

        let engine = Self {
            registry: TokenRegistry::new(pricing.mode(), config.max_slippage_bps),
            merchant: RwLock::new(config.merchant),
            admin: RwLock::new(cap.id()),
            state: RwLock::new(state),
            guard: ReentrancyGuard::new(),
            events: EventLog::new(),
            metrics: Arc::new(EngineMetrics::new()),
            config,
            market,
            pricing,
            venue,
            ledger,
            clock,
        };
        Ok((engine, cap))
    }

    /// Settle one payment.
    #[instrument(skip(self, request), fields(
        payer = %request.payer,
        asset = %request.asset,
        cents = request.amount.cents(),
        invoice = %request.invoice
    ))]
    pub fn pay(&self, request: SettlementRequest) -> Result<SettlementResult> {
        let _entered = self.guard.enter().map_err(|e| {
            self.metrics.guard_rejected(&e);
            warn!("Rejected re-entrant payment");
            e
        })?;
        self.ensure_active()?;
        self.metrics.settlement_initiated();

        let mut run = SettlementRun::new();
        match self.settle(&mut run, &request) {
            Ok(result) => {
                self.metrics
                    .settlement_success(result.route.kind, !result.refund.is_zero());
                info!(
                    settlement_id = %result.id,
                    consumed = %result.amount_consumed,
                    refund = %result.refund,
                    route = %result.route,
                    "Settlement completed"
                );
                Ok(result)
            }
            Err(e) => {
                let failed_in = run.phase;
                if run.revert().is_err() {
                    error!(settlement_id = %run.id, phase = %failed_in, "Run already final");
                }
                self.metrics.settlement_reverted();
                warn!(
                    settlement_id = %run.id,
                    phase = %failed_in,
                    code = e.error_code(),
                    error = %e,
                    "Settlement reverted"
                );
                Err(e)
            }
        }
    }

    /// Input needed for `amount` of settlement value. Read-only.
    ///
    /// Oracle engines return the buffered maximum they would pull; spot
    /// engines return the buffered venue quote as guidance for the caller's cap.
    #[instrument(skip(self), fields(asset = %asset, cents = amount.cents()))]
    pub fn quote(&self, asset: Asset, amount: SettlementAmount) -> Result<U256> {
        let _entered = self.guard.enter().map_err(|e| {
            self.metrics.guard_rejected(&e);
            e
        })?;
        self.ensure_active()?;

        let quoted = self.quote_unguarded(asset, amount);
        match &quoted {
            Ok(_) => self.metrics.quote_served(),
            Err(_) => self.metrics.quote_failed(),
        }
        quoted
    }

    fn quote_unguarded(&self, asset: Asset, amount: SettlementAmount) -> Result<U256> {
        let amount_out = self.settlement_amount(amount)?;
        if self.market.is_settlement(asset) {
            self.check_settlement_asset_enabled()?;
            return Ok(amount_out);
        }

        let config = self.registry.require_enabled(&asset)?;
        let ledger = self.ledger.lock();
        let ctx = self.context(&ledger, asset, &config, amount, amount_out);
        Ok(self.pricing.quote(&ctx)?.advertised)
    }

    fn settle(&self, run: &mut SettlementRun, request: &SettlementRequest) -> Result<SettlementResult> {
        let now = self.clock.now();
        if is_expired(request.deadline, now) {
            return Err(SettleError::DeadlineExpired {
                deadline: request.deadline,
                now,
            });
        }
        self.validate_request(request)?;
        let merchant = *self.merchant.read();

        let mut ledger = self.ledger.lock();
        let checkpoint = ledger.checkpoint();
        match self.run_phases(&mut ledger, run, request, merchant, now) {
            Ok(result) => {
                // Checkpoints nest strictly under the lock, so commit only
                // fails if the phase sequence was broken.
                ledger
                    .commit(checkpoint)
                    .map_err(|_| SettleError::InvalidTransition {
                        from: run.phase,
                        to: SettlementPhase::Settled,
                    })?;
                drop(ledger);

                self.events.append(EngineEvent::SettlementProcessed {
                    id: result.id,
                    payer: result.payer,
                    payer_asset: result.asset,
                    amount_consumed: result.amount_consumed,
                    settlement_amount: result.settlement_amount,
                    merchant: result.merchant,
                    invoice: result.invoice.clone(),
                    at: result.settled_at,
                });
                advance(run, SettlementPhase::Settled)?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_error) = ledger.rollback(checkpoint) {
                    error!(error = %rollback_error, "Ledger rollback failed");
                }
                Err(e)
            }
        }
    }

    fn run_phases(
        &self,
        ledger: &mut Ledger,
        run: &mut SettlementRun,
        request: &SettlementRequest,
        merchant: Address,
        now: Timestamp,
    ) -> Result<SettlementResult> {
        let engine = self.config.engine_address;
        let executor = SettlementExecutor::new(engine, &self.market, self.venue.as_ref());

        advance(run, SettlementPhase::Quote)?;
        let amount_out = self.settlement_amount(request.amount)?;
        let baseline = self.touched_balances(ledger, request.asset);

        if self.market.is_settlement(request.asset) {
            self.check_settlement_asset_enabled()?;
            if let Some(allowed) = request.max_input {
                if amount_out > allowed {
                    return Err(SettleError::SlippageExceeded {
                        needed: amount_out,
                        allowed,
                    });
                }
            }
            advance(run, SettlementPhase::Reserve)?;
            advance(run, SettlementPhase::RouteAndExecute)?;
            executor.pay_direct(ledger, request.payer, merchant, amount_out)?;
            advance(run, SettlementPhase::Refund)?;
            advance(run, SettlementPhase::Deliver)?;
            self.check_residuals(ledger, &baseline)?;
            advance(run, SettlementPhase::Emit)?;
            return Ok(self.result(run, request, merchant, amount_out, amount_out, U256::ZERO, amount_out, Route::same_asset(), now));
        }

        let config = self.registry.require_enabled(&request.asset)?;
        let (quote, reserve) = {
            let ctx = self.context(ledger, request.asset, &config, request.amount, amount_out);
            let quote = self.pricing.quote(&ctx)?;
            let reserve = self.pricing.reservation(&quote, request.max_input)?;
            (quote, reserve)
        };

        advance(run, SettlementPhase::Reserve)?;
        executor.reserve(ledger, request, reserve)?;

        advance(run, SettlementPhase::RouteAndExecute)?;
        let route = {
            let ctx = self.context(ledger, request.asset, &config, request.amount, amount_out);
            self.pricing.execution_route(&ctx, &quote)?
        };
        let consumed =
            executor.execute(ledger, &route, reserve, amount_out, request.deadline, now)?;

        advance(run, SettlementPhase::Refund)?;
        let refund =
            RefundCalculator::new(engine).refund(ledger, request.payer, request.asset, reserve, consumed)?;

        advance(run, SettlementPhase::Deliver)?;
        executor.deliver(ledger, merchant, amount_out)?;
        self.check_residuals(ledger, &baseline)?;

        advance(run, SettlementPhase::Emit)?;
        Ok(self.result(run, request, merchant, reserve, consumed, refund, amount_out, route, now))
    }

    #[allow(clippy::too_many_arguments)]
    fn result(
        &self,
        run: &SettlementRun,
        request: &SettlementRequest,
        merchant: Address,
        reserved: U256,
        consumed: U256,
        refund: U256,
        delivered: U256,
        route: Route,
        now: Timestamp,
    ) -> SettlementResult {
        SettlementResult {
            id: run.id,
            payer: request.payer,
            asset: request.asset,
            amount_reserved: reserved,
            amount_consumed: consumed,
            refund,
            settlement_amount: request.amount,
            settlement_delivered: delivered,
            merchant,
            route,
            invoice: request.invoice.clone(),
            settled_at: now,
        }
    }

    fn context<'a>(
        &'a self,
        ledger: &'a Ledger,
        asset: Asset,
        config: &'a TokenConfig,
        amount: SettlementAmount,
        amount_out: U256,
    ) -> QuoteContext<'a> {
        QuoteContext {
            ledger,
            market: &self.market,
            asset,
            config,
            amount,
            amount_out,
            now: self.clock.now(),
        }
    }

    fn settlement_amount(&self, amount: SettlementAmount) -> Result<U256> {
        if amount.is_zero() {
            return Err(SettleError::InvalidAmount(
                "settlement amount must be positive".to_string(),
            ));
        }
        settlement_units(amount, self.market.settlement_decimals)
    }

    /// The settlement token needs no registry entry, but an explicit
    /// disabled entry still blocks it.
    fn check_settlement_asset_enabled(&self) -> Result<()> {
        let asset = Asset::Token(self.market.settlement_token);
        match self.registry.get(&asset) {
            Some(config) if !config.enabled => Err(SettleError::AssetNotSupported(asset)),
            _ => Ok(()),
        }
    }

    fn validate_request(&self, request: &SettlementRequest) -> Result<()> {
        if request.payer == Address::ZERO {
            return Err(SettleError::ZeroAddress { field: "payer" });
        }
        if request.payer == self.config.engine_address {
            return Err(SettleError::InvalidConfiguration(
                "engine cannot pay itself".to_string(),
            ));
        }
        if !request.asset.is_native() && !request.attached_value.is_zero() {
            return Err(SettleError::InvalidAmount(
                "native value attached to a token payment".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine balances of every asset a settlement in `asset` can move.
    ///
    /// Anything else the engine holds was sent to it directly and is left
    /// for [`SettlementEngine::sweep`].
    fn touched_balances(&self, ledger: &Ledger, asset: Asset) -> Vec<(Asset, U256)> {
        let mut assets = vec![
            asset,
            Asset::Token(self.market.wrapped_native),
            Asset::Token(self.market.settlement_token),
        ];
        assets.sort();
        assets.dedup();
        assets
            .into_iter()
            .map(|a| (a, ledger.balance_of(a, self.config.engine_address)))
            .collect()
    }

    /// Fail if the call left the engine holding more or less than it started with.
    fn check_residuals(&self, ledger: &Ledger, baseline: &[(Asset, U256)]) -> Result<()> {
        for &(asset, before) in baseline {
            let after = ledger.balance_of(asset, self.config.engine_address);
            if after != before {
                let amount = if after > before { after - before } else { before - after };
                error!(asset = %asset, before = %before, after = %after, "Engine holds residual balance");
                return Err(SettleError::ResidualBalance { asset, amount });
            }
        }
        Ok(())
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.state.read().accepts_requests() {
            Ok(())
        } else {
            Err(SettleError::Paused)
        }
    }

    /// Account the engine holds funds under.
    pub fn address(&self) -> Address {
        self.config.engine_address
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pricing(&self) -> &P {
        &self.pricing
    }

    /// Current merchant payout address.
    pub fn merchant(&self) -> Address {
        *self.merchant.read()
    }

    pub fn state(&self) -> OperationalState {
        *self.state.read()
    }

    pub fn is_paused(&self) -> bool {
        self.state().is_paused()
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn metrics(&self) -> SharedMetrics {
        Arc::clone(&self.metrics)
    }

    /// Shared handle to the ledger the engine settles on.
    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        Arc::clone(&self.ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosettle_common::{ManualClock, PriceSource, RouteKind};
    use autosettle_pricing::{ConstantProductVenue, FeedDirectory, PushPriceFeed};

    const USDC: Address = Address::repeat_byte(0x10);
    const WETH: Address = Address::repeat_byte(0x20);
    const DAI: Address = Address::repeat_byte(0x30);
    const MERCHANT: Address = Address::repeat_byte(0x70);
    const PAYER: Address = Address::repeat_byte(0x01);
    const FEED: Address = Address::repeat_byte(0xfe);
    const NOW: u64 = 1_700_000_000;

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000_000_000_000_000u64)
    }

    fn e6(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000u64)
    }

    fn oracle_engine() -> (OracleSettlementEngine, AdminCap, Arc<PushPriceFeed>) {
        let mut ledger = Ledger::new();
        ledger.create_token(USDC, "USDC", 6).unwrap();
        ledger.create_wrapped_native(WETH).unwrap();
        ledger.create_token(DAI, "DAI", 18).unwrap();
        let venue = Arc::new(ConstantProductVenue::new(Address::repeat_byte(0x99)));
        venue
            .create_pool(&mut ledger, WETH, USDC, e18(1_000), e6(2_000_000))
            .unwrap();
        ledger.mint(Asset::Native, PAYER, e18(10)).unwrap();

        let feeds = Arc::new(FeedDirectory::new());
        let feed = Arc::new(PushPriceFeed::new("ETH / USD", 8));
        feed.set_answer(2_000_0000_0000, NOW);
        feeds.register(FEED, feed.clone());

        let (engine, cap) = SettlementEngine::new(
            EngineConfig::new(USDC, WETH, MERCHANT),
            OraclePriceEngine::new(feeds, venue.clone()),
            venue,
            Arc::new(Mutex::new(ledger)),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap();
        engine
            .register_asset(
                &cap,
                Asset::Native,
                PriceSource::Oracle {
                    feed: FEED,
                    max_price_age: 3600,
                },
                100,
            )
            .unwrap();
        (engine, cap, feed)
    }

    #[test]
    fn test_native_payment_settles() {
        let (engine, _cap, _feed) = oracle_engine();
        let request = SettlementRequest::new(
            PAYER,
            Asset::Native,
            SettlementAmount::from_cents(10_000),
            "INV-1",
            NOW + 60,
        )
        .with_value(e18(1));

        let result = engine.pay(request).unwrap();
        assert_eq!(result.route.kind, RouteKind::Direct);
        assert_eq!(result.settlement_delivered, e6(100));
        assert!(result.is_balanced());
        assert!(!result.refund.is_zero());

        let ledger = engine.ledger();
        let ledger = ledger.lock();
        assert_eq!(ledger.balance_of(Asset::Token(USDC), MERCHANT), e6(100));
        assert!(ledger.holdings(engine.address()).is_empty());
        assert_eq!(
            ledger.balance_of(Asset::Native, PAYER),
            e18(10) - result.amount_consumed
        );
        assert_eq!(engine.events().len(), 2);
    }

    #[test]
    fn test_expired_deadline_reverts_before_quote() {
        let (engine, _cap, feed) = oracle_engine();
        // A failing feed would surface first if the quote ran.
        feed.fail("down");
        let request = SettlementRequest::new(
            PAYER,
            Asset::Native,
            SettlementAmount::from_cents(100),
            "late",
            NOW - 1,
        )
        .with_value(e18(1));

        assert_eq!(
            engine.pay(request),
            Err(SettleError::DeadlineExpired {
                deadline: NOW - 1,
                now: NOW
            })
        );
        assert_eq!(engine.metrics().snapshot().settlements_reverted, 1);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let (engine, _cap, _feed) = oracle_engine();
        assert!(matches!(
            engine.quote(Asset::Native, SettlementAmount::from_cents(0)),
            Err(SettleError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_unregistered_asset_rejected() {
        let (engine, _cap, _feed) = oracle_engine();
        assert_eq!(
            engine.quote(Asset::Token(DAI), SettlementAmount::from_cents(100)),
            Err(SettleError::AssetNotSupported(Asset::Token(DAI)))
        );
    }

    #[test]
    fn test_token_payment_with_value_rejected() {
        let (engine, _cap, _feed) = oracle_engine();
        let request = SettlementRequest::new(
            PAYER,
            Asset::Token(USDC),
            SettlementAmount::from_cents(100),
            "inv",
            NOW,
        )
        .with_value(U256::from(1u64));
        assert!(matches!(engine.pay(request), Err(SettleError::InvalidAmount(_))));
    }

    #[test]
    fn test_engine_rejects_foreign_wrapped_native() {
        let mut ledger = Ledger::new();
        ledger.create_token(USDC, "USDC", 6).unwrap();
        ledger.create_wrapped_native(WETH).unwrap();
        let venue = Arc::new(ConstantProductVenue::new(Address::repeat_byte(0x99)));
        let result = SettlementEngine::new(
            EngineConfig::new(USDC, DAI, MERCHANT),
            SpotPriceEngine::new(venue.clone()),
            venue,
            Arc::new(Mutex::new(ledger)),
            Arc::new(ManualClock::new(NOW)),
        );
        assert!(matches!(result, Err(SettleError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_residual_check_ignores_untouched_assets() {
        let (engine, _cap, _feed) = oracle_engine();
        let ledger = engine.ledger();
        let mut ledger = ledger.lock();
        let baseline = engine.touched_balances(&ledger, Asset::Native);

        ledger
            .mint(Asset::Token(DAI), engine.address(), U256::from(7u64))
            .unwrap();
        assert_eq!(engine.check_residuals(&ledger, &baseline), Ok(()));

        ledger
            .mint(Asset::Token(WETH), engine.address(), U256::from(3u64))
            .unwrap();
        assert_eq!(
            engine.check_residuals(&ledger, &baseline),
            Err(SettleError::ResidualBalance {
                asset: Asset::Token(WETH),
                amount: U256::from(3u64),
            })
        );
    }
}
