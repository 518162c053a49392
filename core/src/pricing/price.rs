// orderflow/src/pricing/price.rs
use crate::error::{OrderflowError, Result};
use crate::model::money::{round_money, round_percent};
use crate::model::{PriceType, SizeVariant};
use rust_decimal::Decimal;

/// Tolerance when comparing a client-submitted price with the derived one.
pub const CLIENT_PRICE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Clone, PartialEq)]
pub struct EffectivePrice {
  pub unit_price: Decimal,
  pub price_type: PriceType,
  pub regular_price: Decimal,
  /// Per unit, never negative.
  pub savings: Decimal,
  pub discount_percentage: u32,
}

/// Sale price when one is set, otherwise regular price.
pub fn derive_effective_price(variant: &SizeVariant) -> Result<EffectivePrice> {
  let regular = variant.regular_price;
  let sale = variant.sale_price;

  if sale > Decimal::ZERO {
    let savings = (regular - sale).max(Decimal::ZERO);
    let discount_percentage = if regular > Decimal::ZERO {
      round_percent(savings / regular * Decimal::ONE_HUNDRED)
    } else {
      0
    };
    return Ok(EffectivePrice {
      unit_price: round_money(sale),
      price_type: PriceType::Sale,
      regular_price: regular,
      savings: round_money(savings),
      discount_percentage,
    });
  }

  if regular > Decimal::ZERO {
    return Ok(EffectivePrice {
      unit_price: round_money(regular),
      price_type: PriceType::Regular,
      regular_price: regular,
      savings: Decimal::ZERO,
      discount_percentage: 0,
    });
  }

  Err(OrderflowError::NoValidPrice {
    sku: variant.sku.clone(),
  })
}

/// Outcome of comparing what the client displayed with what we will bill.
/// Purely informational: billing always uses the derived price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientPriceCheck {
  pub mismatch: bool,
  pub difference: Decimal,
}

pub fn validate_client_price(client_price: Option<Decimal>, derived: &EffectivePrice) -> ClientPriceCheck {
  match client_price {
    None => ClientPriceCheck {
      mismatch: false,
      difference: Decimal::ZERO,
    },
    Some(client) => {
      let difference = (client - derived.unit_price).abs();
      ClientPriceCheck {
        mismatch: difference > CLIENT_PRICE_TOLERANCE,
        difference,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn d(s: &str) -> Decimal {
    s.parse().unwrap()
  }

  fn variant(regular: &str, sale: &str) -> SizeVariant {
    SizeVariant {
      size: "M".into(),
      sku: "SKU-M".into(),
      regular_price: d(regular),
      sale_price: d(sale),
      stock: 1,
      weight_kg: None,
      dims: None,
    }
  }

  #[test]
  fn sale_price_wins_and_reports_discount() {
    for (regular, sale, pct) in [("1000", "750", 25), ("999", "666", 33), ("1200", "799", 33), ("300", "299.5", 0)] {
      let p = derive_effective_price(&variant(regular, sale)).unwrap();
      assert_eq!(p.unit_price, d(sale));
      assert_eq!(p.price_type, PriceType::Sale);
      assert_eq!(p.savings, d(regular) - d(sale));
      assert_eq!(p.discount_percentage, pct, "{regular} -> {sale}");
    }
  }

  #[test]
  fn sale_above_regular_never_yields_negative_savings() {
    let p = derive_effective_price(&variant("500", "650")).unwrap();
    assert_eq!(p.unit_price, d("650"));
    assert_eq!(p.savings, Decimal::ZERO);
    assert_eq!(p.discount_percentage, 0);
  }

  #[test]
  fn regular_price_without_sale() {
    let p = derive_effective_price(&variant("1499", "0")).unwrap();
    assert_eq!(p.unit_price, d("1499"));
    assert_eq!(p.price_type, PriceType::Regular);
    assert_eq!(p.discount_percentage, 0);
  }

  #[test]
  fn no_price_at_all_fails() {
    let err = derive_effective_price(&variant("0", "0")).unwrap_err();
    assert!(matches!(err, OrderflowError::NoValidPrice { sku } if sku == "SKU-M"));
  }

  #[test]
  fn client_price_is_advisory_with_tolerance() {
    let p = derive_effective_price(&variant("100", "0")).unwrap();
    assert!(!validate_client_price(Some(d("100.01")), &p).mismatch);
    assert!(validate_client_price(Some(d("99.98")), &p).mismatch);
    assert!(!validate_client_price(None, &p).mismatch);
    assert_eq!(CLIENT_PRICE_TOLERANCE, d("0.01"));
  }
}
