// orderflow/src/carrier/types.rs
use crate::model::Address;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierToken {
  pub token: String,
  /// Lifetime reported by the carrier, when it reports one.
  pub expires_in: Option<Duration>,
}

/// Where shipments are picked up from (and returned to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupOrigin {
  pub location_name: String,
  pub pincode: String,
}

impl Default for PickupOrigin {
  fn default() -> Self {
    Self {
      location_name: "Primary".to_string(),
      pincode: "110001".to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceabilityQuery {
  pub pickup_pincode: String,
  pub delivery_pincode: String,
  pub weight_kg: Decimal,
  pub reverse: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierOption {
  pub courier_id: u64,
  pub courier_name: String,
  pub rate: Decimal,
  pub estimated_days: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentDirection {
  Forward,
  /// Pickup from the customer's address back to the origin.
  Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Package {
  pub weight_kg: Decimal,
  pub length_cm: Decimal,
  pub breadth_cm: Decimal,
  pub height_cm: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingItem {
  pub name: String,
  pub sku: String,
  pub units: u32,
  pub selling_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingPayload {
  /// Our reference: the order id, or the RMA for reversals.
  pub reference: String,
  pub direction: ShipmentDirection,
  pub pickup_location: String,
  pub pickup_pincode: String,
  pub customer: Address,
  pub items: Vec<BookingItem>,
  pub sub_total: Decimal,
  pub package: Package,
  pub courier_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingAssignment {
  pub tracking_code: String,
  pub courier_name: String,
  pub courier_id: Option<u64>,
  pub freight_charge: Decimal,
  pub expected_delivery: Option<NaiveDate>,
}
