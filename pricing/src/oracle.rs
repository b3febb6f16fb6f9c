//! Oracle-priced engine.
//!
//! The feed answer, normalized to 18 decimals, converts the settlement
//! amount into payer-asset units. The slippage buffer on top becomes the
//! maximum pulled from the payer; execution normally consumes less.

use alloy_primitives::U256;
use autosettle_common::{
    age, PriceSource, PricingMode, Result, Route, SettleError, StaleReason,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::conversion::{apply_slippage, normalize_price, value_to_input};
use crate::engine::{PriceEngine, Quote, QuoteContext};
use crate::feed::{FeedDirectory, RoundData};
use crate::route::RouteSelector;
use crate::venue::SwapVenue;

/// Prices payer assets from external feeds and routes via the cheaper path.
pub struct OraclePriceEngine {
    feeds: Arc<FeedDirectory>,
    selector: RouteSelector,
}

impl OraclePriceEngine {
    pub fn new(feeds: Arc<FeedDirectory>, venue: Arc<dyn SwapVenue>) -> Self {
        Self {
            feeds,
            selector: RouteSelector::new(venue),
        }
    }

    /// Feed directory the engine resolves feed addresses against.
    pub fn feeds(&self) -> &Arc<FeedDirectory> {
        &self.feeds
    }

    /// Read and validate the latest observation. Returns the 18-decimal price.
    ///
    /// `answered_in_round >= round_id` is trusted as the feed's own
    /// completeness signal; a feed that misreports it passes this check.
    fn fresh_price(&self, ctx: &QuoteContext<'_>) -> Result<U256> {
        let (feed_address, max_price_age) = match ctx.config.price_source {
            PriceSource::Oracle {
                feed,
                max_price_age,
            } => (feed, max_price_age),
            PriceSource::Spot { .. } => {
                return Err(SettleError::InvalidConfiguration(format!(
                    "{} is not oracle-priced",
                    ctx.asset
                )))
            }
        };

        let feed = self
            .feeds
            .get(&feed_address)
            .ok_or(SettleError::PriceFeedMissing(ctx.asset))?;
        let round = feed.latest_round_data().map_err(|e| {
            debug!(feed = %feed_address, error = %e, "Feed read failed");
            SettleError::PriceFeedMissing(ctx.asset)
        })?;

        check_round(&round, ctx.now, max_price_age)?;

        let answer = u128::try_from(round.answer)
            .map_err(|_| SettleError::PriceFeedInvalid {
                answer: round.answer,
            })?;
        let price = normalize_price(U256::from(answer), feed.decimals())?;
        // A sub-unit answer on a feed with more than 18 decimals rounds to nothing.
        if price.is_zero() {
            return Err(SettleError::PriceFeedInvalid {
                answer: round.answer,
            });
        }
        Ok(price)
    }
}

/// Reject non-positive, incomplete or aged observations.
pub fn check_round(round: &RoundData, now: u64, max_price_age: u64) -> Result<()> {
    if round.answer <= 0 {
        return Err(SettleError::PriceFeedInvalid {
            answer: round.answer,
        });
    }
    if round.answered_in_round < round.round_id {
        return Err(SettleError::OracleDataStale(StaleReason::RoundIncomplete {
            round_id: round.round_id,
            answered_in_round: round.answered_in_round,
        }));
    }
    if round.updated_at == 0 {
        return Err(SettleError::OracleDataStale(StaleReason::MissingTimestamp));
    }
    let observed_age = age(round.updated_at, now);
    if observed_age > max_price_age {
        return Err(SettleError::OracleDataStale(StaleReason::TooOld {
            age: observed_age,
            max_age: max_price_age,
        }));
    }
    Ok(())
}

impl PriceEngine for OraclePriceEngine {
    fn mode(&self) -> PricingMode {
        PricingMode::Oracle
    }

    #[instrument(skip(self, ctx), fields(asset = %ctx.asset, cents = ctx.amount.cents()))]
    fn quote(&self, ctx: &QuoteContext<'_>) -> Result<Quote> {
        let price = self.fresh_price(ctx)?;
        let base = value_to_input(ctx.amount, ctx.config.decimals, price)?;
        let max_input = apply_slippage(base, ctx.config.slippage_bps)?;

        debug!(
            price = %price,
            base = %base,
            max_input = %max_input,
            "Oracle quote"
        );

        Ok(Quote {
            advertised: max_input,
            required: max_input,
            route: None,
        })
    }

    fn reservation(&self, quote: &Quote, max_input: Option<U256>) -> Result<U256> {
        match max_input {
            Some(allowed) if quote.required > allowed => Err(SettleError::SlippageExceeded {
                needed: quote.required,
                allowed,
            }),
            _ => Ok(quote.required),
        }
    }

    fn execution_route(&self, ctx: &QuoteContext<'_>, _quote: &Quote) -> Result<Route> {
        self.selector.select(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Market;
    use crate::feed::PushPriceFeed;
    use crate::venue::ConstantProductVenue;
    use alloy_primitives::Address;
    use autosettle_common::{Asset, SettlementAmount, TokenConfig};
    use autosettle_ledger::Ledger;

    const USDC: Address = Address::repeat_byte(0x10);
    const WETH: Address = Address::repeat_byte(0x20);
    const DAI: Address = Address::repeat_byte(0x30);
    const FEED: Address = Address::repeat_byte(0xfe);
    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        ledger: Ledger,
        market: Market,
        feed: Arc<PushPriceFeed>,
        engine: OraclePriceEngine,
    }

    fn fixture(feed_decimals: u8) -> Fixture {
        let ledger = Ledger::new();
        let feeds = Arc::new(FeedDirectory::new());
        let feed = Arc::new(PushPriceFeed::new("DAI / USD", feed_decimals));
        feeds.register(FEED, feed.clone());
        let venue = Arc::new(ConstantProductVenue::new(Address::repeat_byte(0x99)));
        Fixture {
            ledger,
            market: Market {
                settlement_token: USDC,
                settlement_decimals: 6,
                wrapped_native: WETH,
            },
            feed,
            engine: OraclePriceEngine::new(feeds, venue),
        }
    }

    fn quote(f: &Fixture, config: &TokenConfig, cents: u64) -> Result<Quote> {
        let amount = SettlementAmount::from_cents(cents);
        let ctx = QuoteContext {
            ledger: &f.ledger,
            market: &f.market,
            asset: Asset::Token(DAI),
            config,
            amount,
            amount_out: amount.to_units(6).unwrap(),
            now: NOW,
        };
        f.engine.quote(&ctx)
    }

    #[test]
    fn test_dollar_asset_with_half_percent_buffer() {
        let f = fixture(8);
        f.feed.set_answer(1_0000_0000, NOW - 10);
        let config = TokenConfig::oracle(FEED, 3600, 50, 18);

        let quote = quote(&f, &config, 10_000).unwrap();
        assert_eq!(
            quote.advertised,
            U256::from(100_500_000_000_000_000_000u128)
        );
        assert_eq!(quote.required, quote.advertised);
        assert!(quote.route.is_none());
    }

    #[test]
    fn test_six_decimal_asset_priced_above_a_dollar() {
        let f = fixture(18);
        // $2.00 with an 18-decimal feed.
        f.feed.set_answer(2_000_000_000_000_000_000, NOW);
        let config = TokenConfig::oracle(FEED, 3600, 0, 6);

        let quote = quote(&f, &config, 1_000).unwrap();
        assert_eq!(quote.advertised, U256::from(5_000_000u64));
    }

    #[test]
    fn test_missing_feed() {
        let f = fixture(8);
        let config = TokenConfig::oracle(Address::repeat_byte(0xab), 3600, 50, 18);
        assert_eq!(
            quote(&f, &config, 100),
            Err(SettleError::PriceFeedMissing(Asset::Token(DAI)))
        );
    }

    #[test]
    fn test_reverting_feed_is_missing() {
        let f = fixture(8);
        f.feed.set_answer(1_0000_0000, NOW);
        f.feed.fail("paused");
        let config = TokenConfig::oracle(FEED, 3600, 50, 18);
        assert_eq!(
            quote(&f, &config, 100),
            Err(SettleError::PriceFeedMissing(Asset::Token(DAI)))
        );
    }

    #[test]
    fn test_non_positive_answer() {
        let f = fixture(8);
        f.feed.set_answer(0, NOW);
        let config = TokenConfig::oracle(FEED, 3600, 50, 18);
        assert_eq!(
            quote(&f, &config, 100),
            Err(SettleError::PriceFeedInvalid { answer: 0 })
        );

        f.feed.set_answer(-5, NOW);
        assert_eq!(
            quote(&f, &config, 100),
            Err(SettleError::PriceFeedInvalid { answer: -5 })
        );
    }

    #[test]
    fn test_high_precision_dust_answer_is_invalid() {
        let f = fixture(24);
        f.feed.set_answer(999_999, NOW);
        let config = TokenConfig::oracle(FEED, 3600, 50, 18);
        assert_eq!(
            quote(&f, &config, 100),
            Err(SettleError::PriceFeedInvalid { answer: 999_999 })
        );
    }

    #[test]
    fn test_stale_by_age() {
        let f = fixture(8);
        f.feed.set_answer(1_0000_0000, NOW - 3601);
        let config = TokenConfig::oracle(FEED, 3600, 50, 18);
        assert_eq!(
            quote(&f, &config, 100),
            Err(SettleError::OracleDataStale(StaleReason::TooOld {
                age: 3601,
                max_age: 3600
            }))
        );

        f.feed.set_answer(1_0000_0000, NOW - 3600);
        assert!(quote(&f, &config, 100).is_ok());
    }

    #[test]
    fn test_stale_by_round_ordering() {
        let f = fixture(8);
        f.feed.set_round(RoundData {
            round_id: 10,
            answer: 1_0000_0000,
            started_at: NOW,
            updated_at: NOW,
            answered_in_round: 9,
        });
        let config = TokenConfig::oracle(FEED, 3600, 50, 18);
        assert!(matches!(
            quote(&f, &config, 100),
            Err(SettleError::OracleDataStale(StaleReason::RoundIncomplete { .. }))
        ));
    }

    #[test]
    fn test_missing_timestamp() {
        let f = fixture(8);
        f.feed.set_round(RoundData {
            round_id: 1,
            answer: 1_0000_0000,
            started_at: 0,
            updated_at: 0,
            answered_in_round: 1,
        });
        let config = TokenConfig::oracle(FEED, 3600, 50, 18);
        assert_eq!(
            quote(&f, &config, 100),
            Err(SettleError::OracleDataStale(StaleReason::MissingTimestamp))
        );
    }

    #[test]
    fn test_future_update_counts_as_fresh() {
        let f = fixture(8);
        f.feed.set_answer(1_0000_0000, NOW + 30);
        let config = TokenConfig::oracle(FEED, 1, 50, 18);
        assert!(quote(&f, &config, 100).is_ok());
    }

    #[test]
    fn test_spot_config_rejected() {
        let f = fixture(8);
        let config = TokenConfig::spot(None, 50, 18);
        assert!(matches!(
            quote(&f, &config, 100),
            Err(SettleError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_reservation_respects_caller_cap() {
        let f = fixture(8);
        let quote = Quote {
            advertised: U256::from(1_005u64),
            required: U256::from(1_005u64),
            route: None,
        };
        assert_eq!(
            f.engine.reservation(&quote, None).unwrap(),
            U256::from(1_005u64)
        );
        assert_eq!(
            f.engine.reservation(&quote, Some(U256::from(2_000u64))).unwrap(),
            U256::from(1_005u64)
        );
        assert_eq!(
            f.engine.reservation(&quote, Some(U256::from(1_000u64))),
            Err(SettleError::SlippageExceeded {
                needed: U256::from(1_005u64),
                allowed: U256::from(1_000u64)
            })
        );
    }
}
