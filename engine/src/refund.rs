//! Dust refunds.

use alloy_primitives::{Address, U256};
use autosettle_common::{Asset, Result, SettleError};
use autosettle_ledger::Ledger;
use tracing::debug;

/// Returns unspent input to the payer in the asset it was reserved in.
pub struct RefundCalculator {
    engine: Address,
}

impl RefundCalculator {
    pub fn new(engine: Address) -> Self {
        Self { engine }
    }

    /// Unspent input, `reserved - consumed`.
    pub fn dust(reserved: U256, consumed: U256) -> Result<U256> {
        reserved
            .checked_sub(consumed)
            .ok_or_else(|| SettleError::UntrustworthyExecution {
                reason: format!("consumed {consumed} exceeds reserved {reserved}"),
            })
    }

    /// Refund the dust and return its amount.
    ///
    /// Native reservations were wrapped, so the dust is unwrapped and sent
    /// as value; a recipient that refuses value fails the whole call.
    pub fn refund(
        &self,
        ledger: &mut Ledger,
        payer: Address,
        asset: Asset,
        reserved: U256,
        consumed: U256,
    ) -> Result<U256> {
        let dust = Self::dust(reserved, consumed)?;
        if dust.is_zero() {
            return Ok(dust);
        }

        let refund_failed = |reason: String| SettleError::RefundFailed {
            asset,
            amount: dust,
            reason,
        };

        match asset {
            Asset::Native => {
                ledger
                    .unwrap_native(self.engine, dust)
                    .map_err(|e| refund_failed(e.to_string()))?;
                ledger
                    .transfer(Asset::Native, self.engine, payer, dust)
                    .map_err(|e| refund_failed(e.to_string()))?;
            }
            Asset::Token(_) => {
                ledger
                    .transfer(asset, self.engine, payer, dust)
                    .map_err(|e| refund_failed(e.to_string()))?;
            }
        }

        debug!(asset = %asset, payer = %payer, dust = %dust, "Dust refunded");
        Ok(dust)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosettle_ledger::AccountPolicy;

    const WETH: Address = Address::repeat_byte(0x20);
    const DAI: Address = Address::repeat_byte(0x30);
    const ENGINE: Address = Address::repeat_byte(0xe0);
    const PAYER: Address = Address::repeat_byte(0x01);

    fn ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.create_wrapped_native(WETH).unwrap();
        ledger.create_token(DAI, "DAI", 18).unwrap();
        ledger
    }

    #[test]
    fn test_dust() {
        assert_eq!(
            RefundCalculator::dust(U256::from(10u64), U256::from(7u64)).unwrap(),
            U256::from(3u64)
        );
        assert!(RefundCalculator::dust(U256::from(7u64), U256::from(10u64)).is_err());
    }

    #[test]
    fn test_token_refund() {
        let mut ledger = ledger();
        ledger.mint(Asset::Token(DAI), ENGINE, U256::from(5u64)).unwrap();
        let refunded = RefundCalculator::new(ENGINE)
            .refund(&mut ledger, PAYER, Asset::Token(DAI), U256::from(105u64), U256::from(100u64))
            .unwrap();
        assert_eq!(refunded, U256::from(5u64));
        assert_eq!(ledger.balance_of(Asset::Token(DAI), PAYER), U256::from(5u64));
        assert_eq!(ledger.balance_of(Asset::Token(DAI), ENGINE), U256::ZERO);
    }

    #[test]
    fn test_native_refund_unwraps() {
        let mut ledger = ledger();
        ledger.mint(Asset::Native, ENGINE, U256::from(4u64)).unwrap();
        ledger.wrap_native(ENGINE, U256::from(4u64)).unwrap();

        RefundCalculator::new(ENGINE)
            .refund(&mut ledger, PAYER, Asset::Native, U256::from(10u64), U256::from(6u64))
            .unwrap();
        assert_eq!(ledger.balance_of(Asset::Native, PAYER), U256::from(4u64));
        assert_eq!(ledger.balance_of(Asset::Token(WETH), ENGINE), U256::ZERO);
        assert_eq!(ledger.balance_of(Asset::Native, ENGINE), U256::ZERO);
    }

    #[test]
    fn test_rejecting_recipient() {
        let mut ledger = ledger();
        ledger.mint(Asset::Native, ENGINE, U256::from(4u64)).unwrap();
        ledger.wrap_native(ENGINE, U256::from(4u64)).unwrap();
        ledger.set_policy(PAYER, AccountPolicy::rejecting_native());

        let err = RefundCalculator::new(ENGINE)
            .refund(&mut ledger, PAYER, Asset::Native, U256::from(10u64), U256::from(6u64))
            .unwrap_err();
        assert!(matches!(err, SettleError::RefundFailed { .. }));
    }

    #[test]
    fn test_zero_dust_moves_nothing() {
        let mut ledger = ledger();
        let before = ledger.postings().len();
        let refunded = RefundCalculator::new(ENGINE)
            .refund(&mut ledger, PAYER, Asset::Native, U256::from(6u64), U256::from(6u64))
            .unwrap();
        assert!(refunded.is_zero());
        assert_eq!(ledger.postings().len(), before);
    }
}
