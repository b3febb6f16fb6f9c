//! Spot-priced engine.
//!
//! Quotes come straight from the venue on the configured route. The
//! buffered figure is advisory; at pay time the caller's own cap is what
//! gets reserved.

use alloy_primitives::U256;
use autosettle_common::{PriceSource, PricingMode, Result, Route, SettleError};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::conversion::apply_slippage;
use crate::engine::{PriceEngine, Quote, QuoteContext};
use crate::venue::SwapVenue;

/// Prices payer assets from live pool reserves.
pub struct SpotPriceEngine {
    venue: Arc<dyn SwapVenue>,
}

impl SpotPriceEngine {
    pub fn new(venue: Arc<dyn SwapVenue>) -> Self {
        Self { venue }
    }

    /// Route fixed by the asset's configuration.
    pub fn configured_route(ctx: &QuoteContext<'_>) -> Result<Route> {
        let input = ctx.input_token();
        let settlement = ctx.market.settlement_token;
        match ctx.config.price_source {
            PriceSource::Spot {
                intermediate: Some(mid),
            } if mid != input && mid != settlement => Ok(Route::via(input, mid, settlement)),
            PriceSource::Spot { .. } => Ok(Route::direct(input, settlement)),
            PriceSource::Oracle { .. } => Err(SettleError::InvalidConfiguration(format!(
                "{} is not spot-priced",
                ctx.asset
            ))),
        }
    }
}

impl PriceEngine for SpotPriceEngine {
    fn mode(&self) -> PricingMode {
        PricingMode::Spot
    }

    #[instrument(skip(self, ctx), fields(asset = %ctx.asset, cents = ctx.amount.cents()))]
    fn quote(&self, ctx: &QuoteContext<'_>) -> Result<Quote> {
        let route = Self::configured_route(ctx)?;
        let raw = self
            .venue
            .quote_exact_output(ctx.ledger, &route.path, ctx.amount_out)
            .map_err(|e| SettleError::NoLiquidity {
                reason: e.to_string(),
            })?;
        let advertised = apply_slippage(raw, ctx.config.slippage_bps)?;

        debug!(
            route = %route,
            raw = %raw,
            advertised = %advertised,
            "Spot quote"
        );

        Ok(Quote {
            advertised,
            required: raw,
            route: Some(route),
        })
    }

    fn reservation(&self, quote: &Quote, max_input: Option<U256>) -> Result<U256> {
        let allowed = max_input.ok_or(SettleError::MissingInputCap)?;
        if quote.required > allowed {
            return Err(SettleError::SlippageExceeded {
                needed: quote.required,
                allowed,
            });
        }
        Ok(allowed)
    }

    fn execution_route(&self, ctx: &QuoteContext<'_>, quote: &Quote) -> Result<Route> {
        match &quote.route {
            Some(route) => Ok(route.clone()),
            None => Self::configured_route(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Market;
    use crate::venue::ConstantProductVenue;
    use alloy_primitives::Address;
    use autosettle_common::{Asset, RouteKind, SettlementAmount, TokenConfig};
    use autosettle_ledger::Ledger;

    const USDC: Address = Address::repeat_byte(0x10);
    const WETH: Address = Address::repeat_byte(0x20);
    const DAI: Address = Address::repeat_byte(0x30);

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000_000_000_000_000u64)
    }

    fn e6(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000u64)
    }

    struct Fixture {
        ledger: Ledger,
        market: Market,
        venue: Arc<ConstantProductVenue>,
    }

    fn fixture() -> Fixture {
        let mut ledger = Ledger::new();
        ledger.create_token(USDC, "USDC", 6).unwrap();
        ledger.create_wrapped_native(WETH).unwrap();
        ledger.create_token(DAI, "DAI", 18).unwrap();
        let venue = Arc::new(ConstantProductVenue::new(Address::repeat_byte(0x99)));
        venue
            .create_pool(&mut ledger, WETH, USDC, e18(1_000), e6(2_000_000))
            .unwrap();
        venue
            .create_pool(&mut ledger, DAI, WETH, e18(2_000_000), e18(1_000))
            .unwrap();
        Fixture {
            ledger,
            market: Market {
                settlement_token: USDC,
                settlement_decimals: 6,
                wrapped_native: WETH,
            },
            venue,
        }
    }

    fn quote(f: &Fixture, asset: Asset, config: &TokenConfig) -> Result<Quote> {
        let amount = SettlementAmount::from_cents(10_000);
        let ctx = QuoteContext {
            ledger: &f.ledger,
            market: &f.market,
            asset,
            config,
            amount,
            amount_out: e6(100),
            now: 0,
        };
        SpotPriceEngine::new(f.venue.clone()).quote(&ctx)
    }

    #[test]
    fn test_direct_quote_applies_buffer() {
        let f = fixture();
        let config = TokenConfig::spot(None, 100, 18);
        let quote = quote(&f, Asset::Native, &config).unwrap();

        let raw = f
            .venue
            .quote_exact_output(&f.ledger, &[WETH, USDC], e6(100))
            .unwrap();
        assert_eq!(quote.required, raw);
        assert_eq!(quote.advertised, raw * U256::from(10_100u64) / U256::from(10_000u64));
        assert_eq!(quote.route, Some(Route::direct(WETH, USDC)));
    }

    #[test]
    fn test_configured_intermediate() {
        let f = fixture();
        let config = TokenConfig::spot(Some(WETH), 30, 18);
        let quote = quote(&f, Asset::Token(DAI), &config).unwrap();
        let route = quote.route.unwrap();
        assert_eq!(route.kind, RouteKind::ViaIntermediate);
        assert_eq!(route.path, vec![DAI, WETH, USDC]);
    }

    #[test]
    fn test_missing_pool_is_no_liquidity() {
        let f = fixture();
        let config = TokenConfig::spot(None, 30, 18);
        assert!(matches!(
            quote(&f, Asset::Token(DAI), &config),
            Err(SettleError::NoLiquidity { .. })
        ));
    }

    #[test]
    fn test_reservation_uses_caller_cap() {
        let engine = SpotPriceEngine::new(Arc::new(ConstantProductVenue::new(Address::ZERO)));
        let quote = Quote {
            advertised: U256::from(103u64),
            required: U256::from(100u64),
            route: None,
        };

        assert_eq!(engine.reservation(&quote, None), Err(SettleError::MissingInputCap));
        assert_eq!(
            engine.reservation(&quote, Some(U256::from(150u64))).unwrap(),
            U256::from(150u64)
        );
        assert_eq!(
            engine.reservation(&quote, Some(U256::from(99u64))),
            Err(SettleError::SlippageExceeded {
                needed: U256::from(100u64),
                allowed: U256::from(99u64)
            })
        );
    }
}
