//! AutoSettle Pricing
//!
//! Computes how much of a payer asset is needed to produce a settlement
//! amount, from either an external price feed or live venue liquidity.
//!
//! # Features
//!
//! - Staleness-checked price feeds with decimal normalization
//! - Exact-output quotes against a constant-product venue
//! - Direct vs. via-intermediate route selection
//! - Basis-point slippage buffers
//!
//! # Example
//!
//! ```rust,ignore
//! use autosettle_pricing::{Market, OraclePriceEngine, PriceEngine};
//!
//! let engine = OraclePriceEngine::new(feeds, venue);
//! let quote = engine.quote(&ctx)?;
//! println!("pull at most {}", quote.advertised);
//! ```

pub mod conversion;
pub mod feed;
pub mod venue;
pub mod engine;
pub mod oracle;
pub mod spot;
pub mod route;

pub use engine::{Market, PriceEngine, Quote, QuoteContext};
pub use feed::{FeedDirectory, FeedError, PriceFeed, PushPriceFeed, RoundData};
pub use oracle::OraclePriceEngine;
pub use route::{RouteCost, RouteSelector};
pub use spot::SpotPriceEngine;
pub use venue::{ConstantProductVenue, SwapOrder, SwapVenue, VenueError, DEFAULT_FEE_BPS};

#[cfg(any(test, feature = "test-utils"))]
pub use venue::{ScriptedVenue, VenueScript};
