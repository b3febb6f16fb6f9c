//! Moves funds for one settlement: reservation, the venue swap and
//! delivery to the merchant.

use alloy_primitives::{Address, U256};
use autosettle_common::{Asset, Result, Route, SettleError, SettlementRequest, Timestamp};
use autosettle_ledger::{Ledger, LedgerError};
use autosettle_pricing::{Market, SwapOrder, SwapVenue};
use tracing::{debug, warn};

pub(crate) fn transfer_failed(asset: Asset, error: LedgerError) -> SettleError {
    SettleError::TransferFailed {
        asset,
        reason: error.to_string(),
    }
}

/// Executes the fund movements of a settlement on behalf of the engine account.
pub struct SettlementExecutor<'a> {
    engine: Address,
    market: &'a Market,
    venue: &'a dyn SwapVenue,
}

impl<'a> SettlementExecutor<'a> {
    pub fn new(engine: Address, market: &'a Market, venue: &'a dyn SwapVenue) -> Self {
        Self {
            engine,
            market,
            venue,
        }
    }

    /// Same-asset shortcut: move the settlement units straight from payer to merchant.
    pub fn pay_direct(
        &self,
        ledger: &mut Ledger,
        payer: Address,
        merchant: Address,
        units: U256,
    ) -> Result<U256> {
        let asset = Asset::Token(self.market.settlement_token);
        ledger
            .transfer_from(asset, self.engine, payer, merchant, units)
            .map_err(|e| transfer_failed(asset, e))?;
        Ok(units)
    }

    /// Pull exactly `amount` of the payer asset into the engine.
    ///
    /// Native value is wrapped so it can be routed like any token.
    pub fn reserve(
        &self,
        ledger: &mut Ledger,
        request: &SettlementRequest,
        amount: U256,
    ) -> Result<()> {
        match request.asset {
            Asset::Native => {
                if request.attached_value < amount {
                    return Err(SettleError::InsufficientNativeValue {
                        required: amount,
                        provided: request.attached_value,
                    });
                }
                ledger
                    .transfer(Asset::Native, request.payer, self.engine, amount)
                    .map_err(|e| transfer_failed(Asset::Native, e))?;
                ledger
                    .wrap_native(self.engine, amount)
                    .map_err(|e| transfer_failed(Asset::Native, e))?;
            }
            Asset::Token(_) => {
                ledger
                    .transfer_from(request.asset, self.engine, request.payer, self.engine, amount)
                    .map_err(|e| transfer_failed(request.asset, e))?;
            }
        }
        debug!(asset = %request.asset, amount = %amount, "Input reserved");
        Ok(())
    }

    /// Swap at most `amount_in_max` of the route's input for exactly
    /// `amount_out` settlement units, delivered to the engine.
    ///
    /// Returns the input consumed, as measured on the ledger.
    pub fn execute(
        &self,
        ledger: &mut Ledger,
        route: &Route,
        amount_in_max: U256,
        amount_out: U256,
        deadline: Timestamp,
        now: Timestamp,
    ) -> Result<U256> {
        let input = *route.path.first().ok_or_else(|| SettleError::SwapFailed {
            reason: "empty route".to_string(),
        })?;
        let input_asset = Asset::Token(input);
        let output_asset = Asset::Token(self.market.settlement_token);
        let spender = self.venue.address();

        let input_before = ledger.balance_of(input_asset, self.engine);
        let output_before = ledger.balance_of(output_asset, self.engine);

        ledger
            .approve(input, self.engine, spender, amount_in_max)
            .map_err(|e| transfer_failed(input_asset, e))?;

        let order = SwapOrder {
            path: route.path.clone(),
            amount_out,
            amount_in_max,
            payer: self.engine,
            recipient: self.engine,
            deadline,
        };
        let swapped = self.venue.swap_exact_output(ledger, &order, now);

        // Revoke whatever the venue left unused, whether or not the swap went through.
        ledger
            .approve(input, self.engine, spender, U256::ZERO)
            .map_err(|e| transfer_failed(input_asset, e))?;

        let reported = swapped.map_err(|e| {
            warn!(route = %route, error = %e, "Venue rejected swap");
            SettleError::SwapFailed {
                reason: e.to_string(),
            }
        })?;

        let input_after = ledger.balance_of(input_asset, self.engine);
        let output_after = ledger.balance_of(output_asset, self.engine);

        let consumed = input_before.checked_sub(input_after).ok_or_else(|| {
            SettleError::UntrustworthyExecution {
                reason: "input balance grew during swap".to_string(),
            }
        })?;
        let delivered = output_after.checked_sub(output_before).unwrap_or(U256::ZERO);

        if delivered != amount_out {
            return Err(SettleError::UntrustworthyExecution {
                reason: format!("delivered {delivered}, ordered {amount_out}"),
            });
        }
        if consumed > amount_in_max {
            return Err(SettleError::UntrustworthyExecution {
                reason: format!("consumed {consumed}, max {amount_in_max}"),
            });
        }
        if reported != consumed {
            return Err(SettleError::UntrustworthyExecution {
                reason: format!("venue reported {reported}, ledger shows {consumed}"),
            });
        }

        debug!(route = %route, consumed = %consumed, delivered = %delivered, "Swap verified");
        Ok(consumed)
    }

    /// Hand the settlement units to the merchant.
    pub fn deliver(&self, ledger: &mut Ledger, merchant: Address, units: U256) -> Result<()> {
        let asset = Asset::Token(self.market.settlement_token);
        ledger
            .transfer(asset, self.engine, merchant, units)
            .map_err(|e| transfer_failed(asset, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosettle_common::SettlementAmount;
    use autosettle_pricing::{ConstantProductVenue, ScriptedVenue, VenueScript};

    const USDC: Address = Address::repeat_byte(0x10);
    const WETH: Address = Address::repeat_byte(0x20);
    const ENGINE: Address = Address::repeat_byte(0xe0);
    const PAYER: Address = Address::repeat_byte(0x01);
    const MERCHANT: Address = Address::repeat_byte(0x70);

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

    fn setup() -> (Ledger, ScriptedVenue) {
        let mut ledger = Ledger::new();
        ledger.create_token(USDC, "USDC", 6).unwrap();
        ledger.create_wrapped_native(WETH).unwrap();
        let venue = ConstantProductVenue::new(Address::repeat_byte(0x99));
        venue
            .create_pool(&mut ledger, WETH, USDC, e18(1_000), e6(2_000_000))
            .unwrap();
        ledger.mint(Asset::Native, PAYER, e18(10)).unwrap();
        (ledger, ScriptedVenue::new(venue))
    }

    fn native_request(value: U256) -> SettlementRequest {
        SettlementRequest::new(
            PAYER,
            Asset::Native,
            SettlementAmount::from_cents(10_000),
            "inv",
            100,
        )
        .with_value(value)
    }

    #[test]
    fn test_native_reserve_checks_value() {
        let (mut ledger, venue) = setup();
        let market = market();
        let executor = SettlementExecutor::new(ENGINE, &market, &venue);

        let err = executor
            .reserve(&mut ledger, &native_request(e18(1)), e18(2))
            .unwrap_err();
        assert_eq!(
            err,
            SettleError::InsufficientNativeValue {
                required: e18(2),
                provided: e18(1)
            }
        );

        executor
            .reserve(&mut ledger, &native_request(e18(2)), e18(1))
            .unwrap();
        assert_eq!(ledger.balance_of(Asset::Token(WETH), ENGINE), e18(1));
        assert_eq!(ledger.balance_of(Asset::Native, ENGINE), U256::ZERO);
        assert_eq!(ledger.balance_of(Asset::Native, PAYER), e18(9));
    }

    #[test]
    fn test_execute_consumes_and_revokes() {
        let (mut ledger, venue) = setup();
        let market = market();
        let executor = SettlementExecutor::new(ENGINE, &market, &venue);
        executor
            .reserve(&mut ledger, &native_request(e18(1)), e18(1))
            .unwrap();

        let route = Route::direct(WETH, USDC);
        let consumed = executor
            .execute(&mut ledger, &route, e18(1), e6(100), 100, 0)
            .unwrap();

        assert!(consumed < e18(1));
        assert_eq!(ledger.balance_of(Asset::Token(USDC), ENGINE), e6(100));
        assert_eq!(ledger.allowance(WETH, ENGINE, venue.address()), U256::ZERO);
    }

    #[test]
    fn test_rejected_swap_revokes_approval() {
        let (mut ledger, venue) = setup();
        venue.set_script(VenueScript::Reject("paused".to_string()));
        let market = market();
        let executor = SettlementExecutor::new(ENGINE, &market, &venue);
        executor
            .reserve(&mut ledger, &native_request(e18(1)), e18(1))
            .unwrap();

        let err = executor
            .execute(&mut ledger, &Route::direct(WETH, USDC), e18(1), e6(100), 100, 0)
            .unwrap_err();
        assert!(matches!(err, SettleError::SwapFailed { .. }));
        assert_eq!(ledger.allowance(WETH, ENGINE, venue.address()), U256::ZERO);
    }

    #[test]
    fn test_short_delivery_is_untrustworthy() {
        let (mut ledger, venue) = setup();
        venue.set_script(VenueScript::UnderDeliver(U256::from(1u64)));
        let market = market();
        let executor = SettlementExecutor::new(ENGINE, &market, &venue);
        executor
            .reserve(&mut ledger, &native_request(e18(1)), e18(1))
            .unwrap();

        let err = executor
            .execute(&mut ledger, &Route::direct(WETH, USDC), e18(1), e6(100), 100, 0)
            .unwrap_err();
        assert!(matches!(err, SettleError::UntrustworthyExecution { .. }));
    }

    #[test]
    fn test_misreported_input_is_untrustworthy() {
        let (mut ledger, venue) = setup();
        venue.set_script(VenueScript::Misreport(U256::from(1u64)));
        let market = market();
        let executor = SettlementExecutor::new(ENGINE, &market, &venue);
        executor
            .reserve(&mut ledger, &native_request(e18(1)), e18(1))
            .unwrap();

        let err = executor
            .execute(&mut ledger, &Route::direct(WETH, USDC), e18(1), e6(100), 100, 0)
            .unwrap_err();
        assert!(matches!(err, SettleError::UntrustworthyExecution { .. }));
    }

    #[test]
    fn test_pay_direct_needs_approval() {
        let (mut ledger, venue) = setup();
        let market = market();
        let executor = SettlementExecutor::new(ENGINE, &market, &venue);
        ledger.mint(Asset::Token(USDC), PAYER, e6(50)).unwrap();

        assert!(matches!(
            executor.pay_direct(&mut ledger, PAYER, MERCHANT, e6(50)),
            Err(SettleError::TransferFailed { .. })
        ));

        ledger.approve(USDC, PAYER, ENGINE, e6(50)).unwrap();
        executor
            .pay_direct(&mut ledger, PAYER, MERCHANT, e6(50))
            .unwrap();
        assert_eq!(ledger.balance_of(Asset::Token(USDC), MERCHANT), e6(50));
        assert_eq!(venue.swap_calls(), 0);
    }
}
