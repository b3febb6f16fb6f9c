//! Decimal-normalized fixed-point conversions.
//!
//! All helpers are checked: overflow surfaces as
//! [`SettleError::ArithmeticOverflow`] instead of wrapping.

use alloy_primitives::U256;
use autosettle_common::{
    pow10, Result, SettleError, SettlementAmount, BPS_DENOMINATOR, CENT_DECIMALS, PRICE_DECIMALS,
};

fn overflow(context: &'static str) -> SettleError {
    SettleError::ArithmeticOverflow { context }
}

fn scale(exp: u8, context: &'static str) -> Result<U256> {
    pow10(exp).ok_or_else(|| overflow(context))
}

/// `floor(a * b / denominator)`.
pub fn mul_div(a: U256, b: U256, denominator: U256, context: &'static str) -> Result<U256> {
    if denominator.is_zero() {
        return Err(overflow(context));
    }
    let product = a.checked_mul(b).ok_or_else(|| overflow(context))?;
    Ok(product / denominator)
}

/// `ceil(a * b / denominator)`.
pub fn mul_div_ceil(a: U256, b: U256, denominator: U256, context: &'static str) -> Result<U256> {
    if denominator.is_zero() {
        return Err(overflow(context));
    }
    let product = a.checked_mul(b).ok_or_else(|| overflow(context))?;
    let quotient = product / denominator;
    if (product % denominator).is_zero() {
        Ok(quotient)
    } else {
        quotient
            .checked_add(U256::from(1u64))
            .ok_or_else(|| overflow(context))
    }
}

/// Rescale a feed answer with `feed_decimals` decimals to 18 decimals.
pub fn normalize_price(answer: U256, feed_decimals: u8) -> Result<U256> {
    if feed_decimals <= PRICE_DECIMALS {
        let factor = scale(PRICE_DECIMALS - feed_decimals, "price normalization")?;
        answer
            .checked_mul(factor)
            .ok_or_else(|| overflow("price normalization"))
    } else {
        let factor = scale(feed_decimals - PRICE_DECIMALS, "price normalization")?;
        Ok(answer / factor)
    }
}

/// Add a basis-point buffer: `amount * (10000 + bps) / 10000`.
pub fn apply_slippage(amount: U256, slippage_bps: u16) -> Result<U256> {
    let denominator = U256::from(BPS_DENOMINATOR);
    let numerator = denominator + U256::from(slippage_bps);
    mul_div(amount, numerator, denominator, "slippage buffer")
}

/// Input units of an asset worth `amount` at an 18-decimal unit price.
///
/// Computes `ceil(cents * 10^asset_decimals * 10^16 / price18)`, where
/// `10^16` converts cents to an 18-decimal settlement value. Rounds up so
/// the input never undershoots the requested value.
pub fn value_to_input(amount: SettlementAmount, asset_decimals: u8, price18: U256) -> Result<U256> {
    if price18.is_zero() {
        return Err(overflow("value conversion"));
    }
    let asset_scale = scale(asset_decimals, "value conversion")?;
    let cents_to_value = scale(PRICE_DECIMALS - CENT_DECIMALS, "value conversion")?;
    let numerator = U256::from(amount.cents())
        .checked_mul(asset_scale)
        .ok_or_else(|| overflow("value conversion"))?;
    mul_div_ceil(numerator, cents_to_value, price18, "value conversion")
}

/// Settlement asset units owed for `amount`.
pub fn settlement_units(amount: SettlementAmount, settlement_decimals: u8) -> Result<U256> {
    amount
        .to_units(settlement_decimals)
        .ok_or_else(|| overflow("settlement units"))
}
