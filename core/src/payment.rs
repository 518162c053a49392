// orderflow/src/payment.rs

//! Payment verification: signature check, idempotent `Paid` transition and the
//! all-or-nothing stock commit.

use crate::context::Collaborators;
use crate::error::{OrderflowError, Result};
use crate::flow::{ContextData, Pipeline, PipelineControl, PipelineResult};
use crate::locks::OrderGuard;
use crate::model::{Order, OrderStatus, PaymentStatus, Refund, ShippingStatus};
use crate::ports::{CommitKey, StockLine};
use crate::pricing::totals_match;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCallback {
  pub gateway_order_id: String,
  pub payment_id: String,
  pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
  pub order_id: Uuid,
  pub payment_status: PaymentStatus,
  pub order_status: OrderStatus,
  pub shipping_status: ShippingStatus,
  /// True when this callback found the order already paid and changed nothing.
  pub already_paid: bool,
}

impl PaymentConfirmation {
  fn of(order: &Order, already_paid: bool) -> Self {
    Self {
      order_id: order.id,
      payment_status: order.payment_status,
      order_status: order.order_status,
      shipping_status: order.shipping_status,
      already_paid,
    }
  }

  /// Whether the shipment pipeline should be scheduled for this order.
  pub fn needs_shipment(&self) -> bool {
    !self.already_paid && self.payment_status == PaymentStatus::Paid
  }
}

pub struct PaymentCtxData {
  pub deps: Collaborators,
  pub callback: PaymentCallback,
  pub order: Option<Order>,
  pub already_paid: bool,
  pub lock: Option<OrderGuard>,
}

impl PaymentCtxData {
  fn order(&self) -> Result<&Order> {
    self
      .order
      .as_ref()
      .ok_or_else(|| OrderflowError::NotFound(format!("gateway order {}", self.callback.gateway_order_id)))
  }
}

pub struct PaymentVerifier {
  pipeline: Pipeline<PaymentCtxData, OrderflowError>,
}

impl Default for PaymentVerifier {
  fn default() -> Self {
    Self::new()
  }
}

impl PaymentVerifier {
  pub fn new() -> Self {
    let mut p = Pipeline::<PaymentCtxData, OrderflowError>::new(
      "payment_verification",
      &[
        ("verify_signature", false, None),
        ("load_order", false, None),
        ("check_totals", false, None),
        ("commit_inventory", false, None),
        ("mark_paid", false, None),
        (
          "count_promo_use",
          false,
          Some(Arc::new(|data: &PaymentCtxData| {
            data.order.as_ref().map_or(true, |o| o.promo_code.is_none())
          })),
        ),
      ],
    );

    p.on("verify_signature", |ctx: ContextData<PaymentCtxData>| {
      Box::pin(async move {
        let guard = ctx.read();
        let cb = &guard.callback;
        if cb.gateway_order_id.trim().is_empty() || cb.payment_id.trim().is_empty() {
          return Err(OrderflowError::Validation(
            "gateway_order_id and payment_id are required".into(),
          ));
        }
        if !guard
          .deps
          .gateway
          .verify_signature(&cb.gateway_order_id, &cb.payment_id, &cb.signature)
        {
          warn!(gateway_order_id = %cb.gateway_order_id, "Payment signature mismatch.");
          return Err(OrderflowError::SignatureMismatch {
            gateway_order_id: cb.gateway_order_id.clone(),
          });
        }
        Ok(PipelineControl::Continue)
      })
    });

    p.on("load_order", |ctx: ContextData<PaymentCtxData>| {
      Box::pin(async move {
        let (deps, gateway_order_id) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.callback.gateway_order_id.clone())
        };
        let found = deps
          .orders
          .find_by_gateway_order(&gateway_order_id)
          .await?
          .ok_or_else(|| OrderflowError::NotFound(format!("gateway order {gateway_order_id}")))?;

        // reload under the order lock; a concurrent duplicate callback may have just paid it
        let lock = deps.locks.acquire(found.id).await;
        let order = deps
          .orders
          .get(found.id)
          .await?
          .ok_or_else(|| OrderflowError::NotFound(format!("order {}", found.id)))?;

        let control = if order.is_paid() {
          info!(order_id = %order.id, "Order already paid; duplicate callback ignored.");
          PipelineControl::Stop
        } else if order.order_status == OrderStatus::Cancelled {
          return Err(OrderflowError::PreconditionFailed(format!(
            "order {} is cancelled and cannot be paid",
            order.id
          )));
        } else {
          PipelineControl::Continue
        };

        let mut guard = ctx.write();
        guard.already_paid = control == PipelineControl::Stop;
        guard.order = Some(order);
        guard.lock = Some(lock);
        Ok(control)
      })
    });

    p.on("check_totals", |ctx: ContextData<PaymentCtxData>| {
      Box::pin(async move {
        let guard = ctx.read();
        let order = guard.order()?;
        if !totals_match(&order.lines, &order.totals) {
          error!(order_id = %order.id, stored_total = %order.totals.total, "Stored totals do not match the frozen lines.");
          return Err(OrderflowError::PreconditionFailed(format!(
            "order {} totals do not match its line items",
            order.id
          )));
        }
        Ok(PipelineControl::Continue)
      })
    });

    p.on("commit_inventory", |ctx: ContextData<PaymentCtxData>| {
      Box::pin(async move {
        let (deps, order, payment_id) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.order()?.clone(), guard.callback.payment_id.clone())
        };
        let key = CommitKey {
          order_id: order.id,
          payment_id: payment_id.clone(),
        };
        let lines: Vec<StockLine> = order
          .lines
          .iter()
          .map(|l| StockLine {
            sku: l.sku.clone(),
            quantity: l.shipped_quantity(),
          })
          .collect();

        match deps.inventory.commit(&key, &lines).await {
          Ok(outcome) => {
            info!(order_id = %order.id, ?outcome, "Inventory committed.");
            Ok(PipelineControl::Continue)
          }
          Err(stock_err @ OrderflowError::InsufficientStock { .. }) => {
            let refunded = refund_short_order(&deps, order, &payment_id, &stock_err).await?;
            ctx.write().order = Some(refunded);
            Err(stock_err)
          }
          Err(e) => Err(e),
        }
      })
    });

    p.on("mark_paid", |ctx: ContextData<PaymentCtxData>| {
      Box::pin(async move {
        let (deps, mut order, payment_id) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.order()?.clone(), guard.callback.payment_id.clone())
        };
        let now = Utc::now();
        order.payment_status = PaymentStatus::Paid;
        order.order_status = OrderStatus::Confirmed;
        order.gateway_payment_id = Some(payment_id);
        order.paid_at = Some(now);
        order.updated_at = now;
        deps.orders.save(&order).await?;
        info!(order_id = %order.id, total = %order.totals.total, "Order paid and confirmed.");
        ctx.write().order = Some(order);
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("count_promo_use", |ctx: ContextData<PaymentCtxData>| {
      Box::pin(async move {
        let (deps, order_id, code) = {
          let guard = ctx.read();
          let order = guard.order()?;
          (guard.deps.clone(), order.id, order.promo_code.clone().unwrap_or_default())
        };
        if !deps.promos.try_increment_usage(&code).await? {
          // the customer already paid; honour the discount and flag the overrun
          warn!(order_id = %order_id, promo = %code, "Promo usage cap reached by a paid order.");
        }
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    Self { pipeline: p }
  }

  #[instrument(name = "payments::verify", skip_all, fields(gateway_order_id = %callback.gateway_order_id))]
  pub async fn verify(&self, deps: &Collaborators, callback: PaymentCallback) -> Result<PaymentConfirmation> {
    let ctx = ContextData::new(PaymentCtxData {
      deps: deps.clone(),
      callback,
      order: None,
      already_paid: false,
      lock: None,
    });
    let result = self.pipeline.run(ctx.clone()).await;

    let mut guard = ctx.write();
    guard.lock = None;
    if let PipelineResult::Stopped = result? {
      debug!(already_paid = guard.already_paid, "Verification stopped early.");
    }
    Ok(PaymentConfirmation::of(guard.order()?, guard.already_paid))
  }
}

/// Stock ran out between checkout and payment: the charge is returned in full and
/// the order closed. Nothing was decremented, the commit is all-or-nothing.
///
/// The order is stored closed before the gateway is asked for the refund, so a
/// repeated callback is turned away instead of refunding a second time.
async fn refund_short_order(
  deps: &Collaborators,
  mut order: Order,
  payment_id: &str,
  cause: &OrderflowError,
) -> Result<Order> {
  let amount = order.totals.total;
  warn!(order_id = %order.id, error = %cause, amount = %amount, "Refunding paid order that cannot be fulfilled.");

  let now = Utc::now();
  order.gateway_payment_id = Some(payment_id.to_string());
  order.payment_status = PaymentStatus::Failed;
  order.order_status = OrderStatus::Cancelled;
  order.transition_shipping(ShippingStatus::Cancelled, now)?;
  order.shipping_error = format!("{cause}; refund of {amount} pending");
  deps.orders.save(&order).await?;

  let refund_id = deps
    .gateway
    .refund(payment_id, amount)
    .await
    .map_err(|e| OrderflowError::GatewayRefund {
      payment_id: payment_id.to_string(),
      amount,
      message: e.to_string(),
    })?;

  order.shipping_error = cause.to_string();
  order.refunds.push(Refund {
    refund_id,
    amount,
    reason: "insufficient stock at payment".to_string(),
    created_at: Utc::now(),
  });
  deps.orders.save(&order).await?;
  Ok(order)
}

/// Gateway reported a failed or abandoned payment. Paid orders are left alone.
#[instrument(name = "payments::mark_failed", skip(deps, reason))]
pub async fn mark_payment_failed(deps: &Collaborators, gateway_order_id: &str, reason: &str) -> Result<Order> {
  let found = deps
    .orders
    .find_by_gateway_order(gateway_order_id)
    .await?
    .ok_or_else(|| OrderflowError::NotFound(format!("gateway order {gateway_order_id}")))?;

  let _lock = deps.locks.acquire(found.id).await;
  let mut order = deps
    .orders
    .get(found.id)
    .await?
    .ok_or_else(|| OrderflowError::NotFound(format!("order {}", found.id)))?;

  if order.payment_status != PaymentStatus::AwaitingPayment {
    info!(order_id = %order.id, payment_status = ?order.payment_status, "Payment failure ignored for settled order.");
    return Ok(order);
  }

  let now = Utc::now();
  order.payment_status = PaymentStatus::Failed;
  order.order_status = OrderStatus::Cancelled;
  order.transition_shipping(ShippingStatus::Cancelled, now)?;
  deps.orders.save(&order).await?;
  info!(order_id = %order.id, reason, "Payment failed; order cancelled.");
  Ok(order)
}
