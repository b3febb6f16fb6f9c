//! Route selection for oracle-priced payments.
//!
//! Both candidates are probed on the venue; a failed probe is a value
//! ([`RouteCost::Unavailable`]), never an error.

use alloy_primitives::{Address, U256};
use autosettle_common::{Result, Route, SettleError};
use std::sync::Arc;
use tracing::debug;

use crate::engine::QuoteContext;
use crate::venue::SwapVenue;

/// Input required by one candidate route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCost {
    Available(U256),
    Unavailable,
}

impl RouteCost {
    /// Cost with `Unavailable` mapped to the maximum value.
    pub fn as_sentinel(&self) -> U256 {
        match self {
            RouteCost::Available(cost) => *cost,
            RouteCost::Unavailable => U256::MAX,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, RouteCost::Available(_))
    }
}

/// Picks the cheaper of the direct and via-intermediate routes.
pub struct RouteSelector {
    venue: Arc<dyn SwapVenue>,
}

impl RouteSelector {
    pub fn new(venue: Arc<dyn SwapVenue>) -> Self {
        Self { venue }
    }

    /// Probe one path.
    pub fn probe(&self, ctx: &QuoteContext<'_>, path: &[Address]) -> RouteCost {
        match self.venue.quote_exact_output(ctx.ledger, path, ctx.amount_out) {
            Ok(cost) => RouteCost::Available(cost),
            Err(e) => {
                debug!(path = ?path, error = %e, "Route unavailable");
                RouteCost::Unavailable
            }
        }
    }

    /// Choose a route. Direct wins ties.
    pub fn select(&self, ctx: &QuoteContext<'_>) -> Result<Route> {
        let input = ctx.input_token();
        let settlement = ctx.market.settlement_token;
        let intermediate = ctx.market.wrapped_native;

        let direct = Route::direct(input, settlement);
        let direct_cost = self.probe(ctx, &direct.path);

        // The intermediate itself only has the direct route.
        let via = (input != intermediate).then(|| Route::via(input, intermediate, settlement));
        let via_cost = via
            .as_ref()
            .map(|route| self.probe(ctx, &route.path))
            .unwrap_or(RouteCost::Unavailable);

        debug!(
            direct = ?direct_cost,
            via = ?via_cost,
            "Route candidates probed"
        );

        match (direct_cost, via_cost, via) {
            (RouteCost::Unavailable, RouteCost::Unavailable, _) => Err(SettleError::SwapFailed {
                reason: format!("no route from {input} to {settlement}"),
            }),
            (RouteCost::Available(_), RouteCost::Unavailable, _) => Ok(direct),
            (_, RouteCost::Available(_), Some(via))
                if direct_cost.as_sentinel() > via_cost.as_sentinel() =>
            {
                Ok(via)
            }
            _ => Ok(direct),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Market;
    use crate::venue::ConstantProductVenue;
    use autosettle_common::{Asset, RouteKind, SettlementAmount, TokenConfig};
    use autosettle_ledger::Ledger;

    const USDC: Address = Address::repeat_byte(0x10);
    const WETH: Address = Address::repeat_byte(0x20);
    const DAI: Address = Address::repeat_byte(0x30);
    const VENUE: Address = Address::repeat_byte(0x99);

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000_000_000_000_000u64)
    }

    fn e6(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000u64)
    }

    fn market() -> Market {
        Market {
            settlement_token: USDC,
            settlement_decimals: 6,
            wrapped_native: WETH,
        }
    }

    fn setup() -> (Ledger, Arc<ConstantProductVenue>) {
        let mut ledger = Ledger::new();
        ledger.create_token(USDC, "USDC", 6).unwrap();
        ledger.create_wrapped_native(WETH).unwrap();
        ledger.create_token(DAI, "DAI", 18).unwrap();
        let venue = Arc::new(ConstantProductVenue::new(VENUE));
        venue
            .create_pool(&mut ledger, WETH, USDC, e18(1_000), e6(2_000_000))
            .unwrap();
        (ledger, venue)
    }

    fn select(ledger: &Ledger, venue: Arc<ConstantProductVenue>, asset: Asset) -> Result<Route> {
        let market = market();
        let config = TokenConfig::oracle(Address::repeat_byte(0xfe), 3600, 50, 18);
        let ctx = QuoteContext {
            ledger,
            market: &market,
            asset,
            config: &config,
            amount: SettlementAmount::from_cents(10_000),
            amount_out: e6(100),
            now: 0,
        };
        RouteSelector::new(venue).select(&ctx)
    }

    #[test]
    fn test_via_only_when_no_direct_pool() {
        let (mut ledger, venue) = setup();
        venue
            .create_pool(&mut ledger, DAI, WETH, e18(2_000_000), e18(1_000))
            .unwrap();

        let route = select(&ledger, venue, Asset::Token(DAI)).unwrap();
        assert_eq!(route.kind, RouteKind::ViaIntermediate);
        assert_eq!(route.path, vec![DAI, WETH, USDC]);
    }

    #[test]
    fn test_direct_preferred_when_cheaper() {
        let (mut ledger, venue) = setup();
        venue
            .create_pool(&mut ledger, DAI, WETH, e18(2_000_000), e18(1_000))
            .unwrap();
        venue
            .create_pool(&mut ledger, DAI, USDC, e18(10_000_000), e6(10_000_000))
            .unwrap();

        let route = select(&ledger, venue, Asset::Token(DAI)).unwrap();
        assert_eq!(route.kind, RouteKind::Direct);
    }

    #[test]
    fn test_via_chosen_when_direct_is_thin() {
        let (mut ledger, venue) = setup();
        venue
            .create_pool(&mut ledger, DAI, WETH, e18(20_000_000), e18(10_000))
            .unwrap();
        // A thin direct pool quotes far above the deep two-hop route.
        venue
            .create_pool(&mut ledger, DAI, USDC, e18(200), e6(200))
            .unwrap();

        let route = select(&ledger, venue, Asset::Token(DAI)).unwrap();
        assert_eq!(route.kind, RouteKind::ViaIntermediate);
    }

    #[test]
    fn test_native_has_only_direct_candidate() {
        let (ledger, venue) = setup();
        let route = select(&ledger, venue, Asset::Native).unwrap();
        assert_eq!(route, Route::direct(WETH, USDC));
    }

    #[test]
    fn test_both_unavailable_is_swap_failed() {
        let (ledger, venue) = setup();
        let err = select(&ledger, venue, Asset::Token(DAI)).unwrap_err();
        assert!(matches!(err, SettleError::SwapFailed { .. }));
    }

    #[test]
    fn test_sentinel() {
        assert_eq!(RouteCost::Unavailable.as_sentinel(), U256::MAX);
        assert!(RouteCost::Available(U256::from(3u64)).is_available());
    }
}
