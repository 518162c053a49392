// orderflow/src/model/reversal.rs
use super::Refund;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReversalKind {
  Return,
  Exchange { new_size: String },
}

impl ReversalKind {
  pub fn label(&self) -> &'static str {
    match self {
      ReversalKind::Return => "return",
      ReversalKind::Exchange { .. } => "exchange",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRef {
  pub shipment_id: String,
  pub tracking_code: Option<String>,
  pub courier_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalRequest {
  pub id: Uuid,
  pub rma: String,
  pub order_id: Uuid,
  pub kind: ReversalKind,
  pub reason: String,
  pub images: Vec<String>,
  /// Pickup from the customer back to the warehouse.
  pub reverse_shipment: ShipmentRef,
  /// Replacement sent out for an exchange.
  pub forward_shipment: Option<ShipmentRef>,
  pub refund: Option<Refund>,
  pub created_at: DateTime<Utc>,
}
