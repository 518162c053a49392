// orderflow/src/pricing/promo.rs
use crate::error::{OrderflowError, Result};
use crate::model::money::round_money;
use crate::model::{DiscountKind, OrderLine, PromoCode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// What the evaluator needs to know about the cart.
#[derive(Debug, Clone, Copy)]
pub struct PromoCart<'a> {
  pub lines: &'a [OrderLine],
  pub subtotal: Decimal,
  pub shipping: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromoOutcome {
  pub code: String,
  pub discount: Decimal,
  /// The discount waives shipping rather than reducing the goods.
  pub covers_shipping: bool,
  /// Index of the line that receives one extra zero-cost unit (BOGO).
  pub bogo_line: Option<usize>,
}

impl PromoOutcome {
  /// Adds the BOGO unit to the frozen lines, if any.
  pub fn apply_to_lines(&self, lines: &mut [OrderLine]) {
    if let Some(line) = self.bogo_line.and_then(|idx| lines.get_mut(idx)) {
      line.free_quantity += 1;
    }
  }

  /// Splits the discount into its goods and shipping parts.
  pub fn goods_and_shipping(&self) -> (Decimal, Decimal) {
    if self.covers_shipping {
      (Decimal::ZERO, self.discount)
    } else {
      (self.discount, Decimal::ZERO)
    }
  }
}

fn invalid(code: &str, reason: impl Into<String>) -> OrderflowError {
  OrderflowError::PromoInvalid {
    code: code.to_string(),
    reason: reason.into(),
  }
}

/// Validates `code` against the looked-up promo and computes the discount.
///
/// `promo` is the lookup result for `code`; `None` means the code is unknown.
pub fn evaluate_promo(
  code: &str,
  promo: Option<&PromoCode>,
  cart: PromoCart<'_>,
  now: DateTime<Utc>,
) -> Result<PromoOutcome> {
  let promo = promo.ok_or_else(|| invalid(code, "code not found"))?;

  if !promo.active {
    return Err(invalid(code, "code is inactive"));
  }
  if now < promo.starts_at {
    return Err(invalid(code, format!("code is valid from {}", promo.starts_at)));
  }
  if now > promo.ends_at {
    return Err(invalid(code, format!("code expired at {}", promo.ends_at)));
  }
  if promo.usage_exhausted() {
    return Err(invalid(code, "usage limit reached"));
  }
  if cart.subtotal < promo.min_order_value {
    return Err(invalid(
      code,
      format!("minimum order value is {}", promo.min_order_value),
    ));
  }

  let (discount, bogo_line) = match &promo.kind {
    DiscountKind::Percentage { percent, max_discount } => {
      let raw = cart.subtotal * *percent / Decimal::ONE_HUNDRED;
      let capped = match max_discount {
        Some(cap) if *cap > Decimal::ZERO => raw.min(*cap),
        _ => raw,
      };
      (capped, None)
    }
    DiscountKind::Fixed { amount } => ((*amount).min(cart.subtotal), None),
    DiscountKind::FreeShipping => (cart.shipping, None),
    DiscountKind::Bogo => {
      let (idx, line) = cart
        .lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.quantity > 0 && l.unit_price > Decimal::ZERO)
        .min_by(|(_, a), (_, b)| a.unit_price.cmp(&b.unit_price))
        .ok_or_else(|| invalid(code, "no eligible line for buy-one-get-one"))?;
      (line.unit_price, Some(idx))
    }
  };

  Ok(PromoOutcome {
    code: promo.code.clone(),
    discount: round_money(discount.max(Decimal::ZERO)),
    covers_shipping: matches!(promo.kind, DiscountKind::FreeShipping),
    bogo_line,
  })
}
