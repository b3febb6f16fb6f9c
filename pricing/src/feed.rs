//! Price feed abstraction and an in-process push feed.

use alloy_primitives::Address;
use autosettle_common::Timestamp;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// One observation returned by a price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundData {
    /// Round identifier.
    pub round_id: u128,
    /// Price answer in the feed's decimals.
    pub answer: i128,
    /// Time the round started.
    pub started_at: Timestamp,
    /// Time the answer was last updated. Zero means the round is incomplete.
    pub updated_at: Timestamp,
    /// Round in which the answer was computed.
    pub answered_in_round: u128,
}

/// Errors raised by a feed read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Feed has no data")]
    NoData,

    #[error("Feed call reverted: {0}")]
    Reverted(String),
}

/// A price feed quoting an asset in the settlement unit.
pub trait PriceFeed: Send + Sync {
    /// Human-readable feed description, e.g. `"ETH / USD"`.
    fn description(&self) -> &str;

    /// Decimals of `answer`.
    fn decimals(&self) -> u8;

    /// Latest observation.
    fn latest_round_data(&self) -> Result<RoundData, FeedError>;
}

/// Feeds reachable by address.
#[derive(Default)]
pub struct FeedDirectory {
    feeds: DashMap<Address, Arc<dyn PriceFeed>>,
}

impl FeedDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a feed at `address`, replacing any previous one.
    pub fn register(&self, address: Address, feed: Arc<dyn PriceFeed>) {
        debug!(feed = %address, description = feed.description(), "Registered price feed");
        self.feeds.insert(address, feed);
    }

    /// Resolve a feed.
    pub fn get(&self, address: &Address) -> Option<Arc<dyn PriceFeed>> {
        self.feeds.get(address).map(|f| Arc::clone(f.value()))
    }

    /// Remove a feed.
    pub fn remove(&self, address: &Address) -> Option<Arc<dyn PriceFeed>> {
        self.feeds.remove(address).map(|(_, feed)| feed)
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

#[derive(Debug)]
struct FeedState {
    round: Option<RoundData>,
    failure: Option<String>,
}

/// Feed whose answers are pushed by an operator or a test.
#[derive(Debug)]
pub struct PushPriceFeed {
    description: String,
    decimals: u8,
    state: RwLock<FeedState>,
}

impl PushPriceFeed {
    /// Create a feed with no rounds yet.
    pub fn new(description: impl Into<String>, decimals: u8) -> Self {
        Self {
            description: description.into(),
            decimals,
            state: RwLock::new(FeedState {
                round: None,
                failure: None,
            }),
        }
    }

    /// Publish a new answer as the next complete round.
    pub fn set_answer(&self, answer: i128, updated_at: Timestamp) {
        let mut state = self.state.write();
        let round_id = state.round.map(|r| r.round_id + 1).unwrap_or(1);
        state.round = Some(RoundData {
            round_id,
            answer,
            started_at: updated_at,
            updated_at,
            answered_in_round: round_id,
        });
    }

    /// Overwrite the latest round verbatim.
    pub fn set_round(&self, round: RoundData) {
        self.state.write().round = Some(round);
    }

    /// Make every read revert until [`PushPriceFeed::recover`] is called.
    pub fn fail(&self, reason: impl Into<String>) {
        self.state.write().failure = Some(reason.into());
    }

    pub fn recover(&self) {
        self.state.write().failure = None;
    }
}

impl PriceFeed for PushPriceFeed {
    fn description(&self) -> &str {
        &self.description
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn latest_round_data(&self) -> Result<RoundData, FeedError> {
        let state = self.state.read();
        if let Some(reason) = &state.failure {
            return Err(FeedError::Reverted(reason.clone()));
        }
        state.round.ok_or(FeedError::NoData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_feed_advances_rounds() {
        let feed = PushPriceFeed::new("ETH / USD", 8);
        assert_eq!(feed.latest_round_data(), Err(FeedError::NoData));

        feed.set_answer(2_000_0000_0000, 100);
        feed.set_answer(2_010_0000_0000, 160);

        let round = feed.latest_round_data().unwrap();
        assert_eq!(round.round_id, 2);
        assert_eq!(round.answered_in_round, 2);
        assert_eq!(round.updated_at, 160);
        assert_eq!(round.answer, 2_010_0000_0000);
    }

    #[test]
    fn test_push_feed_failure() {
        let feed = PushPriceFeed::new("BTC / USD", 8);
        feed.set_answer(1, 1);
        feed.fail("sequencer down");
        assert!(matches!(
            feed.latest_round_data(),
            Err(FeedError::Reverted(_))
        ));
        feed.recover();
        assert!(feed.latest_round_data().is_ok());
    }

    #[test]
    fn test_directory_lookup() {
        let directory = FeedDirectory::new();
        let address = Address::repeat_byte(0xfe);
        directory.register(address, Arc::new(PushPriceFeed::new("X / USD", 8)));

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get(&address).unwrap().decimals(), 8);
        assert!(directory.get(&Address::repeat_byte(1)).is_none());
        assert!(directory.remove(&address).is_some());
        assert!(directory.is_empty());
    }
}
