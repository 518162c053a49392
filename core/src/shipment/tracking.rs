// orderflow/src/shipment/tracking.rs
use crate::context::Collaborators;
use crate::error::{OrderflowError, Result};
use crate::model::{Order, PaymentStatus, ShippingStatus, TrackingEvent};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

/// The polling surface for an order's fulfilment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingStatusView {
  pub order_id: Uuid,
  pub payment_status: PaymentStatus,
  pub shipping_status: ShippingStatus,
  pub shipping_error: String,
  pub shipment_id: Option<String>,
  pub tracking_code: Option<String>,
  pub tracking_url: Option<String>,
  pub courier_name: Option<String>,
  pub expected_delivery: Option<NaiveDate>,
  pub attempts: u32,
  pub created_at: DateTime<Utc>,
  pub paid_at: Option<DateTime<Utc>>,
  pub shipment_started_at: Option<DateTime<Utc>>,
  pub shipment_failed_at: Option<DateTime<Utc>>,
  pub shipped_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub cancelled_at: Option<DateTime<Utc>>,
  pub events: Vec<TrackingEvent>,
}

impl ShippingStatusView {
  pub fn of(order: &Order, tracking_url_for: impl Fn(&str) -> String) -> Self {
    let shipment = &order.shipment;
    Self {
      order_id: order.id,
      payment_status: order.payment_status,
      shipping_status: order.shipping_status,
      shipping_error: order.shipping_error.clone(),
      shipment_id: shipment.shipment_id.clone(),
      tracking_code: shipment.tracking_code.clone(),
      tracking_url: shipment.tracking_code.as_deref().map(tracking_url_for),
      courier_name: shipment.courier_name.clone(),
      expected_delivery: shipment.expected_delivery,
      attempts: shipment.attempts,
      created_at: order.created_at,
      paid_at: order.paid_at,
      shipment_started_at: shipment.started_at,
      shipment_failed_at: shipment.failed_at,
      shipped_at: order.shipped_at,
      delivered_at: order.delivered_at,
      cancelled_at: order.cancelled_at,
      events: shipment.events.clone(),
    }
  }
}

pub async fn shipping_status(deps: &Collaborators, order_id: Uuid) -> Result<ShippingStatusView> {
  let order = deps
    .orders
    .get(order_id)
    .await?
    .ok_or_else(|| OrderflowError::NotFound(format!("order {order_id}")))?;
  Ok(ShippingStatusView::of(&order, |code| deps.settings.tracking_url(code)))
}

fn is_delivery(event: &TrackingEvent) -> bool {
  event.status.trim().eq_ignore_ascii_case("delivered")
}

/// Pulls carrier tracking for a shipped order and records delivery when the
/// carrier reports it.
#[instrument(name = "shipment::refresh_tracking", skip(deps))]
pub async fn refresh_tracking(deps: &Collaborators, order_id: Uuid) -> Result<Order> {
  let _lock = deps.locks.acquire(order_id).await;
  let mut order = deps
    .orders
    .get(order_id)
    .await?
    .ok_or_else(|| OrderflowError::NotFound(format!("order {order_id}")))?;

  match order.shipping_status {
    ShippingStatus::Shipped => {}
    ShippingStatus::Delivered => return Ok(order),
    other => {
      return Err(OrderflowError::PreconditionFailed(format!(
        "order {order_id} has no active shipment to track ({other})"
      )));
    }
  }
  let code = order
    .shipment
    .tracking_code
    .clone()
    .ok_or_else(|| OrderflowError::PreconditionFailed(format!("order {order_id} has no tracking code")))?;

  let mut events = deps.carrier.track(&code).await?;
  events.sort_by_key(|e| e.at);
  let delivered_at = events.iter().find(|e| is_delivery(e)).map(|e| e.at);
  order.shipment.events = events;
  order.updated_at = Utc::now();

  if let Some(at) = delivered_at {
    order.transition_shipping(ShippingStatus::Delivered, Utc::now())?;
    order.delivered_at = Some(at);
    info!(tracking_code = %code, delivered_at = %at, "Order delivered.");
  }
  deps.orders.save(&order).await?;
  Ok(order)
}
