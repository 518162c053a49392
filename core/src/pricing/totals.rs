// orderflow/src/pricing/totals.rs
use crate::model::money::round_money;
use crate::model::{OrderLine, OrderTotals};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Store-wide knobs that feed the totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPolicy {
  pub currency: String,
  pub tax_rate_percent: Decimal,
  pub shipping_fee: Decimal,
  /// Zero disables the free-shipping threshold.
  pub free_shipping_threshold: Decimal,
}

impl Default for PricingPolicy {
  fn default() -> Self {
    Self {
      currency: "INR".to_string(),
      tax_rate_percent: Decimal::ZERO,
      shipping_fee: Decimal::ZERO,
      free_shipping_threshold: Decimal::ZERO,
    }
  }
}

impl PricingPolicy {
  pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
    if self.free_shipping_threshold > Decimal::ZERO && subtotal >= self.free_shipping_threshold {
      Decimal::ZERO
    } else {
      self.shipping_fee
    }
  }
}

/// Σ unit price × shipped quantity. BOGO units are included here and credited
/// back through the discount.
pub fn subtotal_of(lines: &[OrderLine]) -> Decimal {
  lines
    .iter()
    .map(|l| l.unit_price * Decimal::from(l.shipped_quantity()))
    .sum()
}

/// Totals for a set of frozen lines. Tax is charged on the subtotal less the
/// goods discount; a shipping discount only offsets the shipping fee.
pub fn calculate_totals(
  lines: &[OrderLine],
  tax_rate_percent: Decimal,
  shipping: Decimal,
  goods_discount: Decimal,
  shipping_discount: Decimal,
) -> OrderTotals {
  let subtotal = round_money(subtotal_of(lines));
  let savings = round_money(lines.iter().map(|l| l.savings).sum());
  let goods_discount = round_money(goods_discount.clamp(Decimal::ZERO, subtotal));
  let shipping_discount = round_money(shipping_discount.clamp(Decimal::ZERO, shipping));
  let discount = goods_discount + shipping_discount;
  let tax = round_money((subtotal - goods_discount) * tax_rate_percent / Decimal::ONE_HUNDRED);
  let total = round_money((subtotal + tax + shipping - discount).max(Decimal::ZERO));

  OrderTotals {
    subtotal,
    savings,
    discount,
    shipping_discount,
    tax,
    shipping: round_money(shipping),
    total,
    tax_rate_percent,
  }
}

/// Re-runs the calculation over the frozen lines and compares with what was stored.
pub fn totals_match(lines: &[OrderLine], stored: &OrderTotals) -> bool {
  let recomputed = calculate_totals(
    lines,
    stored.tax_rate_percent,
    stored.shipping,
    stored.discount - stored.shipping_discount,
    stored.shipping_discount,
  );
  recomputed.total == stored.total && recomputed.subtotal == stored.subtotal
}
