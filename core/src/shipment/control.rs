// orderflow/src/shipment/control.rs
use super::queue::ShipmentQueue;
use crate::context::Collaborators;
use crate::error::{OrderflowError, Result};
use crate::model::{Order, OrderStatus, PaymentStatus, Refund, ShippingStatus};
use crate::ports::CommitKey;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

async fn load(deps: &Collaborators, order_id: Uuid) -> Result<Order> {
  deps
    .orders
    .get(order_id)
    .await?
    .ok_or_else(|| OrderflowError::NotFound(format!("order {order_id}")))
}

/// Puts a paid order whose booking failed back on the shipment queue.
///
/// Accepted from Pending, Failed and AwbFailed. An order already Retrying or
/// Processing is returned unchanged. Anything else is a precondition failure.
#[instrument(name = "shipment::retry", skip(deps, queue))]
pub async fn retry_shipping(deps: &Collaborators, queue: &ShipmentQueue, order_id: Uuid) -> Result<Order> {
  let order = {
    let _lock = deps.locks.acquire(order_id).await;
    let mut order = load(deps, order_id).await?;

    if !order.is_paid() {
      return Err(OrderflowError::PreconditionFailed(format!(
        "order {order_id} is not paid"
      )));
    }
    match order.shipping_status {
      ShippingStatus::Retrying | ShippingStatus::Processing => {
        info!(shipping_status = %order.shipping_status, "Shipment already in progress.");
      }
      status if status.is_retryable() => {
        order.shipping_error.clear();
        order.transition_shipping(ShippingStatus::Retrying, Utc::now())?;
        deps.orders.save(&order).await?;
        info!(from = %status, attempts = order.shipment.attempts, "Shipment retry scheduled.");
      }
      status => {
        return Err(OrderflowError::PreconditionFailed(format!(
          "order {order_id} cannot retry shipping from {status}"
        )));
      }
    }
    order
  };

  queue.enqueue(order_id);
  Ok(order)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOutcome {
  pub order: Order,
  pub carrier_cancelled: bool,
  pub refund: Option<Refund>,
}

/// Cancels an order that has not been delivered.
///
/// A booked shipment is cancelled at the carrier first; if the carrier refuses,
/// nothing changes locally. Paid orders are refunded, their stock released and
/// their promo use given back. Cancelling a cancelled order is a no-op.
#[instrument(name = "orders::cancel", skip(deps, reason))]
pub async fn cancel_order(deps: &Collaborators, order_id: Uuid, reason: &str) -> Result<CancelOutcome> {
  // waits for an in-flight shipment attempt on this order to finish
  let _lock = deps.locks.acquire(order_id).await;
  let mut order = load(deps, order_id).await?;

  match order.shipping_status {
    ShippingStatus::Delivered => {
      return Err(OrderflowError::PreconditionFailed(format!(
        "order {order_id} is delivered and cannot be cancelled; request a return instead"
      )));
    }
    ShippingStatus::Cancelled => {
      return Ok(CancelOutcome {
        order,
        carrier_cancelled: false,
        refund: None,
      });
    }
    _ => {}
  }

  let mut carrier_cancelled = false;
  if let Some(shipment_id) = order.shipment.shipment_id.clone() {
    if !deps.carrier.cancel_shipment(&shipment_id).await? {
      return Err(OrderflowError::PreconditionFailed(format!(
        "carrier refused to cancel shipment {shipment_id}"
      )));
    }
    carrier_cancelled = true;
    info!(shipment_id = %shipment_id, "Carrier shipment cancelled.");
  }

  let now = Utc::now();
  let mut refund = None;
  let mut promo_to_release = None;
  if order.is_paid() {
    let payment_id = order.gateway_payment_id.clone().unwrap_or_default();
    let amount = order.totals.total - order.refunded_amount();
    if amount > Decimal::ZERO {
      let refund_id = deps
        .gateway
        .refund(&payment_id, amount)
        .await
        .map_err(|e| OrderflowError::GatewayRefund {
          payment_id: payment_id.clone(),
          amount,
          message: e.to_string(),
        })?;
      let record = Refund {
        refund_id,
        amount,
        reason: format!("cancelled: {reason}"),
        created_at: now,
      };
      // recorded before anything else can fail so a retried cancel does not refund twice
      order.refunds.push(record.clone());
      order.updated_at = now;
      deps.orders.save(&order).await?;
      refund = Some(record);
    }

    let key = CommitKey {
      order_id,
      payment_id,
    };
    if !deps.inventory.release(&key).await? {
      warn!("No committed stock found to release.");
    }
    promo_to_release = order.promo_code.clone();
  } else if order.payment_status == PaymentStatus::AwaitingPayment {
    order.payment_status = PaymentStatus::Failed;
  }

  order.transition_shipping(ShippingStatus::Cancelled, now)?;
  order.order_status = OrderStatus::Cancelled;
  deps.orders.save(&order).await?;
  info!(refunded = ?refund.as_ref().map(|r| r.amount), reason, "Order cancelled.");

  // given back once the cancellation is stored; a cancelled order never reaches here again
  if let Some(code) = promo_to_release {
    if let Err(e) = deps.promos.decrement_usage(&code).await {
      warn!(code = %code, error = %e, "Promo use not given back after cancel.");
    }
  }

  Ok(CancelOutcome {
    order,
    carrier_cancelled,
    refund,
  })
}
