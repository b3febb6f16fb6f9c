//! The pricing capability shared by the oracle and spot engines.

use alloy_primitives::{Address, U256};
use autosettle_common::{
    Asset, PricingMode, Result, Route, SettleError, SettlementAmount, Timestamp, TokenConfig,
};
use autosettle_ledger::Ledger;
use serde::{Deserialize, Serialize};

/// Fixed market parameters of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Token every payment is converted into.
    pub settlement_token: Address,
    /// Decimals of the settlement token.
    pub settlement_decimals: u8,
    /// Wrapped native token, also the routing intermediate.
    pub wrapped_native: Address,
}

impl Market {
    /// Token that represents `asset` on a swap path.
    pub fn path_token(&self, asset: Asset) -> Address {
        match asset {
            Asset::Native => self.wrapped_native,
            Asset::Token(token) => token,
        }
    }

    /// Check if `asset` is the settlement token itself.
    pub fn is_settlement(&self, asset: Asset) -> bool {
        asset == Asset::Token(self.settlement_token)
    }

    pub fn validate(&self) -> Result<()> {
        if self.settlement_token == Address::ZERO {
            return Err(SettleError::ZeroAddress {
                field: "settlement_token",
            });
        }
        if self.wrapped_native == Address::ZERO {
            return Err(SettleError::ZeroAddress {
                field: "wrapped_native",
            });
        }
        if self.settlement_token == self.wrapped_native {
            return Err(SettleError::InvalidConfiguration(
                "settlement token cannot be the wrapped native token".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a price engine may read while quoting one request.
#[derive(Clone, Copy)]
pub struct QuoteContext<'a> {
    /// Ledger snapshot, read-only.
    pub ledger: &'a Ledger,
    pub market: &'a Market,
    /// Payer asset.
    pub asset: Asset,
    /// Registry entry of the payer asset.
    pub config: &'a TokenConfig,
    /// Requested settlement amount.
    pub amount: SettlementAmount,
    /// The same amount in settlement token units.
    pub amount_out: U256,
    /// Current block time.
    pub now: Timestamp,
}

impl QuoteContext<'_> {
    /// Path token of the payer asset.
    pub fn input_token(&self) -> Address {
        self.market.path_token(self.asset)
    }
}

/// Result of pricing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Input shown to callers of `quote`.
    pub advertised: U256,
    /// Input compared against a caller-supplied maximum at pay time.
    pub required: U256,
    /// Route fixed at quote time, if the engine fixes one.
    pub route: Option<Route>,
}

/// Prices a payer asset in settlement units.
pub trait PriceEngine: Send + Sync {
    /// Pricing mode this engine implements.
    fn mode(&self) -> PricingMode;

    /// Price the request.
    fn quote(&self, ctx: &QuoteContext<'_>) -> Result<Quote>;

    /// Amount to pull from the payer, given the caller's optional cap.
    fn reservation(&self, quote: &Quote, max_input: Option<U256>) -> Result<U256>;

    /// Route to execute the conversion on.
    fn execution_route(&self, ctx: &QuoteContext<'_>, quote: &Quote) -> Result<Route>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> Market {
        Market {
            settlement_token: Address::repeat_byte(0x10),
            settlement_decimals: 6,
            wrapped_native: Address::repeat_byte(0x20),
        }
    }

    #[test]
    fn test_path_token() {
        let market = market();
        assert_eq!(market.path_token(Asset::Native), market.wrapped_native);
        let dai = Address::repeat_byte(0x30);
        assert_eq!(market.path_token(Asset::Token(dai)), dai);
        assert!(market.is_settlement(Asset::Token(market.settlement_token)));
        assert!(!market.is_settlement(Asset::Native));
    }

    #[test]
    fn test_market_validation() {
        assert!(market().validate().is_ok());

        let same = Market {
            wrapped_native: Address::repeat_byte(0x10),
            ..market()
        };
        assert!(matches!(
            same.validate(),
            Err(SettleError::InvalidConfiguration(_))
        ));

        let zero = Market {
            settlement_token: Address::ZERO,
            ..market()
        };
        assert_eq!(
            zero.validate(),
            Err(SettleError::ZeroAddress {
                field: "settlement_token"
            })
        );
    }
}
