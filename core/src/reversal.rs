// orderflow/src/reversal.rs

//! Returns and exchanges against delivered orders. Reuses the carrier session
//! for the reverse pickup (and the replacement for exchanges) and the gateway
//! for refunds.

use crate::carrier::{booking_payload, ShipmentDirection};
use crate::context::Collaborators;
use crate::error::{OrderflowError, Result};
use crate::flow::{ContextData, Pipeline, PipelineControl, SkipCondition};
use crate::locks::OrderGuard;
use crate::model::{Order, OrderLine, Refund, ReversalKind, ReversalRequest, ShipmentRef, ShippingStatus};
use crate::ports::{CommitKey, StockLine};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::mem;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalInput {
  pub order_id: Uuid,
  pub kind: ReversalKind,
  pub reason: String,
  #[serde(default)]
  pub images: Vec<String>,
}

/// `RMA-YYYYMMDD-XXXXXXXX`: issue date plus eight hex digits of a random id.
pub fn generate_rma(now: DateTime<Utc>) -> String {
  let random = Uuid::new_v4().simple().to_string();
  format!("RMA-{}-{}", now.format("%Y%m%d"), random[..8].to_ascii_uppercase())
}

pub struct ReversalCtxData {
  pub deps: Collaborators,
  pub input: ReversalInput,
  pub order: Option<Order>,
  pub existing: Option<ReversalRequest>,
  pub rma: String,
  pub replacement_lines: Vec<OrderLine>,
  pub reverse: Option<ShipmentRef>,
  pub forward: Option<ShipmentRef>,
  pub refund: Option<Refund>,
  pub created: Option<ReversalRequest>,
  pub lock: Option<OrderGuard>,
}

impl ReversalCtxData {
  fn order(&self) -> Result<&Order> {
    self
      .order
      .as_ref()
      .ok_or_else(|| OrderflowError::NotFound(format!("order {}", self.input.order_id)))
  }

  fn is_exchange(&self) -> bool {
    matches!(self.input.kind, ReversalKind::Exchange { .. })
  }

  fn replacement_key(&self) -> CommitKey {
    CommitKey {
      order_id: self.input.order_id,
      payment_id: self.rma.clone(),
    }
  }
}

/// Creates a carrier shipment and asks for its tracking number.
async fn book(
  deps: &Collaborators,
  reference: String,
  direction: ShipmentDirection,
  order: &Order,
  lines: &[OrderLine],
) -> Result<ShipmentRef> {
  let payload = booking_payload(reference, direction, &deps.settings.origin, &order.address, lines, None);
  let shipment_id = deps.carrier.create_shipment(&payload).await?;
  // the pickup stays booked even when the tracking number is late; it can be assigned later
  match deps.carrier.assign_tracking(&shipment_id, None).await {
    Ok(assignment) => Ok(ShipmentRef {
      shipment_id,
      tracking_code: Some(assignment.tracking_code),
      courier_name: Some(assignment.courier_name),
    }),
    Err(e) => {
      warn!(shipment_id = %shipment_id, error = %e, "Tracking number not assigned for reversal shipment.");
      Ok(ShipmentRef {
        shipment_id,
        tracking_code: None,
        courier_name: None,
      })
    }
  }
}

pub struct ReversalHandler {
  pipeline: Pipeline<ReversalCtxData, OrderflowError>,
}

impl Default for ReversalHandler {
  fn default() -> Self {
    Self::new()
  }
}

impl ReversalHandler {
  pub fn new() -> Self {
    let not_exchange: SkipCondition<ReversalCtxData> = Arc::new(|data: &ReversalCtxData| !data.is_exchange());
    let no_refund: SkipCondition<ReversalCtxData> = Arc::new(|data: &ReversalCtxData| {
      data.is_exchange() || data.order.as_ref().map_or(true, |o| !o.is_paid())
    });
    let no_promo: SkipCondition<ReversalCtxData> = Arc::new(|data: &ReversalCtxData| {
      data.is_exchange() || data.order.as_ref().map_or(true, |o| o.promo_code.is_none())
    });

    let mut p = Pipeline::<ReversalCtxData, OrderflowError>::new(
      "reversal",
      &[
        ("validate_request", false, None),
        ("load_order", false, None),
        ("check_eligibility", false, None),
        ("issue_rma", false, None),
        ("prepare_replacement", false, Some(not_exchange.clone())),
        ("book_reverse_pickup", false, None),
        ("book_replacement", false, Some(not_exchange)),
        ("refund_payment", false, Some(no_refund)),
        ("persist", false, None),
        ("release_promo", false, Some(no_promo)),
      ],
    );

    p.on("validate_request", |ctx: ContextData<ReversalCtxData>| {
      Box::pin(async move {
        let guard = ctx.read();
        let input = &guard.input;
        let max_images = guard.deps.settings.reversal.max_images;
        if input.reason.trim().is_empty() {
          return Err(OrderflowError::Validation("a reason is required".into()));
        }
        if input.images.len() > max_images {
          return Err(OrderflowError::Validation(format!(
            "at most {max_images} images may be attached, got {}",
            input.images.len()
          )));
        }
        if let ReversalKind::Exchange { new_size } = &input.kind {
          if new_size.trim().is_empty() {
            return Err(OrderflowError::Validation("exchange needs a new size".into()));
          }
        }
        Ok(PipelineControl::Continue)
      })
    });

    p.on("load_order", |ctx: ContextData<ReversalCtxData>| {
      Box::pin(async move {
        let (deps, order_id) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.input.order_id)
        };
        let lock = deps.locks.acquire(order_id).await;
        let order = deps
          .orders
          .get(order_id)
          .await?
          .ok_or_else(|| OrderflowError::NotFound(format!("order {order_id}")))?;
        let mut guard = ctx.write();
        guard.order = Some(order);
        guard.lock = Some(lock);
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("check_eligibility", |ctx: ContextData<ReversalCtxData>| {
      Box::pin(async move {
        let (deps, order, kind) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.order()?.clone(), guard.input.kind.clone())
        };

        // one reversal per order: a repeat of the same kind returns the one on file
        let existing = deps.reversals.list_for_order(order.id).await?.into_iter().next();
        if let Some(existing) = existing {
          if mem::discriminant(&existing.kind) != mem::discriminant(&kind) {
            return Err(OrderflowError::PreconditionFailed(format!(
              "order {} already has {} {}",
              order.id,
              existing.kind.label(),
              existing.rma
            )));
          }
          info!(order_id = %order.id, rma = %existing.rma, "Reversal already exists for this order.");
          ctx.write().existing = Some(existing);
          return Ok(PipelineControl::Stop);
        }

        if order.shipping_status != ShippingStatus::Delivered {
          return Err(OrderflowError::PreconditionFailed(format!(
            "order {} is {}, only delivered orders can be returned or exchanged",
            order.id, order.shipping_status
          )));
        }
        let window = Duration::days(deps.settings.reversal.return_window_days);
        let delivered_at = order.delivered_at.unwrap_or(order.updated_at);
        if Utc::now() > delivered_at + window {
          return Err(OrderflowError::PreconditionFailed(format!(
            "return window of {} days closed on {}",
            deps.settings.reversal.return_window_days,
            (delivered_at + window).format("%Y-%m-%d")
          )));
        }
        Ok(PipelineControl::Continue)
      })
    });

    p.on("issue_rma", |ctx: ContextData<ReversalCtxData>| {
      Box::pin(async move {
        let rma = generate_rma(Utc::now());
        let mut guard = ctx.write();
        info!(order_id = %guard.input.order_id, kind = guard.input.kind.label(), rma = %rma, "RMA issued.");
        guard.rma = rma;
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("prepare_replacement", |ctx: ContextData<ReversalCtxData>| {
      Box::pin(async move {
        let (deps, order, new_size) = {
          let guard = ctx.read();
          let new_size = match &guard.input.kind {
            ReversalKind::Exchange { new_size } => new_size.clone(),
            ReversalKind::Return => String::new(),
          };
          (guard.deps.clone(), guard.order()?.clone(), new_size)
        };

        let mut replacement = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
          let item = deps.catalog.item(&line.item_id).await?;
          let variant = item.as_ref().and_then(|i| i.resolve_variant("", &new_size));
          let Some(variant) = variant else {
            return Err(OrderflowError::LineItemUnavailable {
              item_id: line.item_id.clone(),
              requested_sku: String::new(),
              requested_size: new_size.clone(),
              available_sizes: item.as_ref().map(|i| i.available_sizes()).unwrap_or_default(),
              available_skus: item.as_ref().map(|i| i.available_skus()).unwrap_or_default(),
            });
          };
          // the customer keeps the price they paid; only size and sku change
          replacement.push(OrderLine {
            sku: variant.sku.clone(),
            size: variant.size.clone(),
            unit_weight_kg: variant.weight_kg.or(line.unit_weight_kg),
            dims: variant.dims.or(line.dims),
            ..line.clone()
          });
        }

        ctx.write().replacement_lines = replacement;
        Ok(PipelineControl::Continue)
      })
    });

    p.on("book_reverse_pickup", |ctx: ContextData<ReversalCtxData>| {
      Box::pin(async move {
        let (deps, order, rma) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.order()?.clone(), guard.rma.clone())
        };
        let reverse = book(&deps, rma.clone(), ShipmentDirection::Reverse, &order, &order.lines).await?;
        info!(order_id = %order.id, rma = %rma, shipment_id = %reverse.shipment_id, "Reverse pickup booked.");
        ctx.write().reverse = Some(reverse);
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("book_replacement", |ctx: ContextData<ReversalCtxData>| {
      Box::pin(async move {
        let (deps, order, rma, lines, key, reverse_id) = {
          let guard = ctx.read();
          (
            guard.deps.clone(),
            guard.order()?.clone(),
            guard.rma.clone(),
            guard.replacement_lines.clone(),
            guard.replacement_key(),
            guard.reverse.as_ref().map(|r| r.shipment_id.clone()),
          )
        };

        let stock: Vec<StockLine> = lines
          .iter()
          .map(|l| StockLine {
            sku: l.sku.clone(),
            quantity: l.shipped_quantity(),
          })
          .collect();
        if let Err(e) = deps.inventory.commit(&key, &stock).await {
          if let Some(reverse_id) = &reverse_id {
            if let Err(cancel_err) = deps.carrier.cancel_shipment(reverse_id).await {
              warn!(shipment_id = %reverse_id, error = %cancel_err, "Could not cancel reverse pickup after replacement failed.");
            }
          }
          return Err(e);
        }

        let forward = match book(&deps, format!("{rma}-X"), ShipmentDirection::Forward, &order, &lines).await {
          Ok(forward) => forward,
          Err(e) => {
            deps.inventory.release(&key).await?;
            if let Some(reverse_id) = reverse_id {
              if let Err(cancel_err) = deps.carrier.cancel_shipment(&reverse_id).await {
                warn!(shipment_id = %reverse_id, error = %cancel_err, "Could not cancel reverse pickup after replacement failed.");
              }
            }
            return Err(e);
          }
        };
        info!(order_id = %order.id, rma = %rma, shipment_id = %forward.shipment_id, "Replacement shipment booked.");
        ctx.write().forward = Some(forward);
        Ok(PipelineControl::Continue)
      })
    });

    p.on("refund_payment", |ctx: ContextData<ReversalCtxData>| {
      Box::pin(async move {
        let (deps, mut order, rma) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.order()?.clone(), guard.rma.clone())
        };
        let amount = order.totals.total - order.refunded_amount();
        if amount <= Decimal::ZERO {
          // refunded by an earlier attempt whose request was never filed
          let earlier = order.refunds.iter().rev().find(|r| r.reason.starts_with("return ")).cloned();
          ctx.write().refund = earlier;
          return Ok::<_, OrderflowError>(PipelineControl::Continue);
        }
        let payment_id = order.gateway_payment_id.clone().unwrap_or_default();
        let refund_id = deps
          .gateway
          .refund(&payment_id, amount)
          .await
          .map_err(|e| OrderflowError::GatewayRefund {
            payment_id: payment_id.clone(),
            amount,
            message: e.to_string(),
          })?;
        info!(order_id = %order.id, rma = %rma, amount = %amount, refund_id = %refund_id, "Return refunded.");
        let refund = Refund {
          refund_id,
          amount,
          reason: format!("return {rma}"),
          created_at: Utc::now(),
        };
        order.refunds.push(refund.clone());
        order.updated_at = refund.created_at;
        deps.orders.save(&order).await?;

        let mut guard = ctx.write();
        guard.order = Some(order);
        guard.refund = Some(refund);
        Ok(PipelineControl::Continue)
      })
    });

    p.on("release_promo", |ctx: ContextData<ReversalCtxData>| {
      Box::pin(async move {
        let (deps, code) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.order()?.promo_code.clone().unwrap_or_default())
        };
        // the request is already on file, so a failure here is not retried
        if let Err(e) = deps.promos.decrement_usage(&code).await {
          warn!(code = %code, error = %e, "Promo use not given back after return.");
        }
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("persist", |ctx: ContextData<ReversalCtxData>| {
      Box::pin(async move {
        let (deps, request) = {
          let guard = ctx.read();
          let request = ReversalRequest {
            id: Uuid::new_v4(),
            rma: guard.rma.clone(),
            order_id: guard.input.order_id,
            kind: guard.input.kind.clone(),
            reason: guard.input.reason.trim().to_string(),
            images: guard.input.images.clone(),
            reverse_shipment: guard.reverse.clone().unwrap_or_default(),
            forward_shipment: guard.forward.clone(),
            refund: guard.refund.clone(),
            created_at: Utc::now(),
          };
          (guard.deps.clone(), request)
        };

        deps.reversals.insert(&request).await?;
        ctx.write().created = Some(request);
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    Self { pipeline: p }
  }

  #[instrument(name = "reversals::create", skip_all, fields(order_id = %input.order_id, kind = input.kind.label()))]
  pub async fn create(&self, deps: &Collaborators, input: ReversalInput) -> Result<ReversalRequest> {
    let ctx = ContextData::new(ReversalCtxData {
      deps: deps.clone(),
      input,
      order: None,
      existing: None,
      rma: String::new(),
      replacement_lines: Vec::new(),
      reverse: None,
      forward: None,
      refund: None,
      created: None,
      lock: None,
    });
    let result = self.pipeline.run(ctx.clone()).await;

    let mut guard = ctx.write();
    guard.lock = None;
    result?;
    let created = guard.created.take();
    let existing = guard.existing.take();
    created
      .or(existing)
      .ok_or_else(|| OrderflowError::PreconditionFailed("reversal did not complete".into()))
  }

  pub async fn create_return(
    &self,
    deps: &Collaborators,
    order_id: Uuid,
    reason: String,
    images: Vec<String>,
  ) -> Result<ReversalRequest> {
    let input = ReversalInput {
      order_id,
      kind: ReversalKind::Return,
      reason,
      images,
    };
    self.create(deps, input).await
  }

  pub async fn create_exchange(
    &self,
    deps: &Collaborators,
    order_id: Uuid,
    new_size: String,
    reason: String,
    images: Vec<String>,
  ) -> Result<ReversalRequest> {
    let input = ReversalInput {
      order_id,
      kind: ReversalKind::Exchange { new_size },
      reason,
      images,
    };
    self.create(deps, input).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn rma_has_date_and_eight_hex_digits() {
    let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
    let rma = generate_rma(now);
    assert!(rma.starts_with("RMA-20240309-"), "{rma}");
    let suffix = &rma["RMA-20240309-".len()..];
    assert_eq!(suffix.len(), 8);
    assert!(suffix.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    assert_ne!(generate_rma(now), rma);
  }
}
