// orderflow/src/model/money.rs
use rust_decimal::prelude::*;

const DECIMAL_PLACES: u32 = 2;

/// Rounds a monetary amount to 2 dp, half away from zero.
#[inline]
pub fn round_money(value: Decimal) -> Decimal {
  value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a percentage to a whole number, half away from zero.
#[inline]
pub fn round_percent(value: Decimal) -> u32 {
  value
    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    .to_u32()
    .unwrap_or_default()
}

/// Gateways take integer minor units (paise, cents).
pub fn to_minor_units(value: Decimal) -> i64 {
  (round_money(value) * Decimal::ONE_HUNDRED).to_i64().unwrap_or_default()
}
