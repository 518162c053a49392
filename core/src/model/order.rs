// orderflow/src/model/order.rs
use crate::error::{OrderflowError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  AwaitingPayment,
  Paid,
  Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Confirmed,
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
  Pending,
  Processing,
  Shipped,
  Retrying,
  Failed,
  AwbFailed,
  PermissionDenied,
  Delivered,
  Cancelled,
}

impl ShippingStatus {
  pub const ALL: [ShippingStatus; 9] = [
    ShippingStatus::Pending,
    ShippingStatus::Processing,
    ShippingStatus::Shipped,
    ShippingStatus::Retrying,
    ShippingStatus::Failed,
    ShippingStatus::AwbFailed,
    ShippingStatus::PermissionDenied,
    ShippingStatus::Delivered,
    ShippingStatus::Cancelled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      ShippingStatus::Pending => "pending",
      ShippingStatus::Processing => "processing",
      ShippingStatus::Shipped => "shipped",
      ShippingStatus::Retrying => "retrying",
      ShippingStatus::Failed => "failed",
      ShippingStatus::AwbFailed => "awb_failed",
      ShippingStatus::PermissionDenied => "permission_denied",
      ShippingStatus::Delivered => "delivered",
      ShippingStatus::Cancelled => "cancelled",
    }
  }

  pub fn parse(value: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|s| s.as_str() == value)
  }

  /// The retry controller may re-enter booking only from these.
  pub fn is_retryable(self) -> bool {
    matches!(
      self,
      ShippingStatus::Pending | ShippingStatus::Failed | ShippingStatus::AwbFailed
    )
  }

  /// Allowed edges of the shipping state machine.
  ///
  /// Shipped only moves on to Delivered (tracking) or Cancelled (operator,
  /// after the carrier accepted the cancellation). Delivered and Cancelled are final.
  pub fn can_transition_to(self, next: ShippingStatus) -> bool {
    use ShippingStatus::*;
    match (self, next) {
      (Pending, Processing) | (Pending, Retrying) => true,
      (Processing, Shipped) | (Processing, Failed) | (Processing, AwbFailed) | (Processing, PermissionDenied) => true,
      (Failed, Retrying) | (AwbFailed, Retrying) => true,
      (Retrying, Processing) => true,
      (Shipped, Delivered) => true,
      (Delivered, _) | (Cancelled, _) => false,
      (_, Cancelled) => true,
      _ => false,
    }
  }
}

impl std::fmt::Display for ShippingStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
  Regular,
  Sale,
}

/// A line as it was priced when the order was created. Never re-priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
  pub item_id: String,
  pub item_name: String,
  pub sku: String,
  pub size: String,
  pub quantity: u32,
  pub unit_price: Decimal,
  pub price_type: PriceType,
  pub discount_percentage: u32,
  /// Savings against the regular price for the whole line.
  pub savings: Decimal,
  pub unit_weight_kg: Option<Decimal>,
  #[serde(default)]
  pub dims: Option<super::PackageDims>,
  /// Zero-cost units added by a buy-one-get-one promo.
  #[serde(default)]
  pub free_quantity: u32,
}

impl OrderLine {
  pub fn line_total(&self) -> Decimal {
    self.unit_price * Decimal::from(self.shipped_quantity())
  }

  /// Units that physically ship and leave stock.
  pub fn shipped_quantity(&self) -> u32 {
    self.quantity + self.free_quantity
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderTotals {
  pub subtotal: Decimal,
  pub savings: Decimal,
  /// Everything taken off, goods and shipping together.
  pub discount: Decimal,
  /// The share of `discount` that waives shipping. Not part of the tax base.
  #[serde(default)]
  pub shipping_discount: Decimal,
  pub tax: Decimal,
  pub shipping: Decimal,
  pub total: Decimal,
  /// Rate the tax was computed with, kept so the total can be re-derived later.
  #[serde(default)]
  pub tax_rate_percent: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
  pub name: String,
  pub phone: String,
  #[serde(default)]
  pub email: String,
  pub line1: String,
  #[serde(default)]
  pub line2: String,
  pub city: String,
  pub state: String,
  pub pincode: String,
  #[serde(default = "default_country")]
  pub country: String,
}

fn default_country() -> String {
  "India".to_string()
}

impl Address {
  pub fn validate(&self) -> Result<()> {
    let required = [
      ("name", &self.name),
      ("phone", &self.phone),
      ("line1", &self.line1),
      ("city", &self.city),
      ("state", &self.state),
      ("pincode", &self.pincode),
    ];
    if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
      return Err(OrderflowError::Validation(format!("delivery address is missing '{field}'")));
    }
    if !self.pincode.chars().all(|c| c.is_ascii_digit()) {
      return Err(OrderflowError::Validation(format!(
        "delivery pincode '{}' must be numeric",
        self.pincode
      )));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
  pub status: String,
  pub location: Option<String>,
  pub at: DateTime<Utc>,
}

/// Carrier-side state of the forward shipment. Lives inside the order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
  pub shipment_id: Option<String>,
  pub tracking_code: Option<String>,
  pub courier_name: Option<String>,
  pub courier_id: Option<u64>,
  pub freight_charge: Option<Decimal>,
  pub expected_delivery: Option<NaiveDate>,
  pub attempts: u32,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub failed_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub events: Vec<TrackingEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
  pub refund_id: String,
  pub amount: Decimal,
  pub reason: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
  pub id: Uuid,
  pub customer_id: String,
  pub lines: Vec<OrderLine>,
  pub totals: OrderTotals,
  pub currency: String,
  pub payment_status: PaymentStatus,
  pub order_status: OrderStatus,
  pub shipping_status: ShippingStatus,
  pub gateway_order_id: String,
  pub gateway_payment_id: Option<String>,
  pub shipment: ShipmentRecord,
  pub address: Address,
  pub promo_code: Option<String>,
  /// Empty when the last shipping attempt did not fail.
  pub shipping_error: String,
  #[serde(default)]
  pub refunds: Vec<Refund>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub paid_at: Option<DateTime<Utc>>,
  pub shipped_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
  pub fn is_paid(&self) -> bool {
    self.payment_status == PaymentStatus::Paid
  }

  /// Moves the shipping state machine, stamping the phase timestamps.
  pub fn transition_shipping(&mut self, next: ShippingStatus, now: DateTime<Utc>) -> Result<()> {
    if !self.shipping_status.can_transition_to(next) {
      return Err(OrderflowError::PreconditionFailed(format!(
        "order {} cannot move shipping from {} to {}",
        self.id, self.shipping_status, next
      )));
    }
    self.shipping_status = next;
    self.updated_at = now;
    match next {
      ShippingStatus::Processing => {
        self.shipment.attempts += 1;
        self.shipment.started_at = Some(now);
      }
      ShippingStatus::Shipped => {
        self.shipment.completed_at = Some(now);
        self.shipped_at = Some(now);
      }
      ShippingStatus::Failed | ShippingStatus::AwbFailed | ShippingStatus::PermissionDenied => {
        self.shipment.failed_at = Some(now);
      }
      ShippingStatus::Delivered => self.delivered_at = Some(now),
      ShippingStatus::Cancelled => self.cancelled_at = Some(now),
      ShippingStatus::Pending | ShippingStatus::Retrying => {}
    }
    Ok(())
  }

  /// Records a failed booking attempt in one place so status and error never disagree.
  pub fn record_shipping_failure(
    &mut self,
    status: ShippingStatus,
    message: impl Into<String>,
    now: DateTime<Utc>,
  ) -> Result<()> {
    self.transition_shipping(status, now)?;
    self.shipping_error = message.into();
    Ok(())
  }

  pub fn refunded_amount(&self) -> Decimal {
    self.refunds.iter().map(|r| r.amount).sum()
  }
}
