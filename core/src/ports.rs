// orderflow/src/ports.rs

//! Collaborator seams. The pipeline components only ever talk to these traits;
//! the server wires PostgreSQL and HTTP implementations, tests wire fakes.

use crate::carrier::{BookingPayload, CarrierToken, CourierOption, ServiceabilityQuery, TrackingAssignment};
use crate::error::Result;
use crate::model::{CatalogItem, Order, PromoCode, ReversalRequest, ShippingStatus, TrackingEvent};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayIntent {
  pub gateway_order_id: String,
  pub amount: Decimal,
  pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_intent(&self, amount: Decimal, currency: &str, receipt: &str) -> Result<GatewayIntent>;

  /// Checks the callback signature over `gateway_order_id|payment_id`.
  fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool;

  /// Returns the gateway's refund id.
  async fn refund(&self, payment_id: &str, amount: Decimal) -> Result<String>;
}

/// Raw carrier aggregator API. Token handling and retries live in
/// [`crate::carrier::CarrierSession`], not in implementations of this trait.
#[async_trait]
pub trait CarrierClient: Send + Sync {
  async fn authenticate(&self) -> Result<CarrierToken>;

  async fn check_serviceability(&self, token: &str, query: &ServiceabilityQuery) -> Result<Vec<CourierOption>>;

  /// Books a forward or reverse shipment; returns the carrier shipment id.
  async fn create_shipment(&self, token: &str, payload: &BookingPayload) -> Result<String>;

  async fn assign_tracking(&self, token: &str, shipment_id: &str, courier_id: Option<u64>) -> Result<TrackingAssignment>;

  async fn cancel_shipment(&self, token: &str, shipment_id: &str) -> Result<bool>;

  async fn track(&self, token: &str, tracking_code: &str) -> Result<Vec<TrackingEvent>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
  async fn item(&self, item_id: &str) -> Result<Option<CatalogItem>>;
}

/// Idempotency key of a stock commit: one per (order, payment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitKey {
  pub order_id: Uuid,
  pub payment_id: String,
}

impl std::fmt::Display for CommitKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.order_id, self.payment_id)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
  pub sku: String,
  pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
  Applied,
  /// The same key was committed before; nothing changed.
  AlreadyApplied,
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
  async fn stock(&self, sku: &str) -> Result<Option<u32>>;

  /// Decrements every line or none of them.
  ///
  /// Fails with `InsufficientStock` naming the first short SKU; in that case no
  /// record has changed. Re-committing a key that was already applied is a no-op.
  async fn commit(&self, key: &CommitKey, lines: &[StockLine]) -> Result<CommitOutcome>;

  /// Puts back the stock taken by `key`. Returns false when there was nothing to release.
  async fn release(&self, key: &CommitKey) -> Result<bool>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn insert(&self, order: &Order) -> Result<()>;
  async fn get(&self, order_id: Uuid) -> Result<Option<Order>>;
  async fn find_by_gateway_order(&self, gateway_order_id: &str) -> Result<Option<Order>>;
  async fn save(&self, order: &Order) -> Result<()>;
  async fn list_paid_by_shipping_status(&self, statuses: &[ShippingStatus]) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait PromoStore: Send + Sync {
  async fn get(&self, code: &str) -> Result<Option<PromoCode>>;

  /// Atomically bumps `current_uses` unless the cap is reached. False when capped.
  async fn try_increment_usage(&self, code: &str) -> Result<bool>;

  /// Atomically lowers `current_uses`, never below zero.
  async fn decrement_usage(&self, code: &str) -> Result<()>;
}

#[async_trait]
pub trait ReversalStore: Send + Sync {
  async fn insert(&self, request: &ReversalRequest) -> Result<()>;
  async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<ReversalRequest>>;
}
