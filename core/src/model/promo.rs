// orderflow/src/model/promo.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountKind {
  Percentage {
    percent: Decimal,
    #[serde(default)]
    max_discount: Option<Decimal>,
  },
  Fixed {
    amount: Decimal,
  },
  FreeShipping,
  /// Buy one, get the cheapest eligible line's unit free.
  Bogo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
  pub code: String,
  pub kind: DiscountKind,
  pub active: bool,
  pub starts_at: DateTime<Utc>,
  pub ends_at: DateTime<Utc>,
  /// Zero means uncapped.
  pub max_uses: u32,
  pub current_uses: u32,
  pub min_order_value: Decimal,
}

impl PromoCode {
  pub fn usage_exhausted(&self) -> bool {
    self.max_uses > 0 && self.current_uses >= self.max_uses
  }

  /// Codes are matched case-insensitively and stored upper-cased.
  pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
  }
}
