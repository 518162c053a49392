// orderflow/src/shipment/orchestrator.rs

//! Books the forward shipment of a paid order: token, serviceability, booking,
//! tracking number. Runs in the background; carrier failures end up on the
//! order (`shipping_status`, `shipping_error`) instead of bubbling to a caller.

use crate::carrier::{booking_payload, package_for, CourierOption, ServiceabilityQuery, ShipmentDirection};
use crate::context::Collaborators;
use crate::error::{OrderflowError, Result};
use crate::flow::{ContextData, Pipeline, PipelineControl, SkipCondition};
use crate::model::{Order, ShippingStatus};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct ShipmentCtxData {
  pub deps: Collaborators,
  pub order: Order,
  pub courier: Option<CourierOption>,
}

impl ShipmentCtxData {
  fn has_shipment_id(&self) -> bool {
    self.order.shipment.shipment_id.is_some()
  }
}

/// Writes a failed attempt onto the order and ends the run.
async fn record_failure(
  ctx: &ContextData<ShipmentCtxData>,
  status: ShippingStatus,
  cause: &OrderflowError,
) -> Result<PipelineControl> {
  let (deps, mut order) = {
    let guard = ctx.read();
    (guard.deps.clone(), guard.order.clone())
  };
  order.record_shipping_failure(status, cause.to_string(), Utc::now())?;
  deps.orders.save(&order).await?;
  warn!(
    order_id = %order.id,
    shipping_status = %status,
    attempts = order.shipment.attempts,
    error = %cause,
    "Shipment attempt failed."
  );
  ctx.write().order = order;
  Ok(PipelineControl::Stop)
}

fn booking_failure_status(e: &OrderflowError) -> ShippingStatus {
  match e {
    OrderflowError::CarrierPermission { .. } => ShippingStatus::PermissionDenied,
    _ => ShippingStatus::Failed,
  }
}

pub struct ShipmentOrchestrator {
  pipeline: Pipeline<ShipmentCtxData, OrderflowError>,
}

impl Default for ShipmentOrchestrator {
  fn default() -> Self {
    Self::new()
  }
}

impl ShipmentOrchestrator {
  pub fn new() -> Self {
    // a retry reuses the shipment id it already has instead of booking twice
    let booked: SkipCondition<ShipmentCtxData> = Arc::new(|data: &ShipmentCtxData| data.has_shipment_id());

    let mut p = Pipeline::<ShipmentCtxData, OrderflowError>::new(
      "shipment",
      &[
        ("begin_attempt", false, None),
        ("authenticate", false, None),
        ("check_serviceability", false, Some(booked.clone())),
        ("create_shipment", false, Some(booked)),
        ("assign_tracking", false, None),
        ("mark_shipped", false, None),
      ],
    );

    p.on("begin_attempt", |ctx: ContextData<ShipmentCtxData>| {
      Box::pin(async move {
        let (deps, mut order) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.order.clone())
        };
        if !order.is_paid() {
          warn!(order_id = %order.id, "Shipment requested for an unpaid order; skipping.");
          return Ok(PipelineControl::Stop);
        }
        let now = Utc::now();
        match order.shipping_status {
          ShippingStatus::Pending | ShippingStatus::Retrying => {
            order.transition_shipping(ShippingStatus::Processing, now)?;
          }
          ShippingStatus::Processing => {
            // picked up again after a restart mid-attempt
            order.shipment.attempts += 1;
            order.shipment.started_at = Some(now);
            order.updated_at = now;
          }
          other => {
            info!(order_id = %order.id, shipping_status = %other, "Nothing to book for this order.");
            return Ok(PipelineControl::Stop);
          }
        }
        deps.orders.save(&order).await?;
        info!(order_id = %order.id, attempt = order.shipment.attempts, "Shipment attempt started.");
        ctx.write().order = order;
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("authenticate", |ctx: ContextData<ShipmentCtxData>| {
      Box::pin(async move {
        let deps = ctx.read().deps.clone();
        match deps.carrier.tokens().get().await {
          Ok(_) => Ok(PipelineControl::Continue),
          Err(e) => record_failure(&ctx, ShippingStatus::Failed, &e).await,
        }
      })
    });

    p.on("check_serviceability", |ctx: ContextData<ShipmentCtxData>| {
      Box::pin(async move {
        let (deps, query) = {
          let guard = ctx.read();
          let package = package_for(&guard.order.lines);
          let query = ServiceabilityQuery {
            pickup_pincode: guard.deps.settings.origin.pincode.clone(),
            delivery_pincode: guard.order.address.pincode.clone(),
            weight_kg: package.weight_kg,
            reverse: false,
          };
          (guard.deps.clone(), query)
        };

        let couriers = match deps.carrier.check_serviceability(&query).await {
          Ok(couriers) => couriers,
          Err(e) => return record_failure(&ctx, booking_failure_status(&e), &e).await,
        };
        let Some(cheapest) = couriers.into_iter().min_by(|a, b| a.rate.cmp(&b.rate)) else {
          let e = OrderflowError::CarrierServiceability {
            pickup_pincode: query.pickup_pincode,
            delivery_pincode: query.delivery_pincode,
          };
          return record_failure(&ctx, ShippingStatus::Failed, &e).await;
        };
        info!(courier = %cheapest.courier_name, rate = %cheapest.rate, "Courier selected.");
        ctx.write().courier = Some(cheapest);
        Ok(PipelineControl::Continue)
      })
    });

    p.on("create_shipment", |ctx: ContextData<ShipmentCtxData>| {
      Box::pin(async move {
        let (deps, mut order, payload) = {
          let guard = ctx.read();
          let order = guard.order.clone();
          let payload = booking_payload(
            order.id.to_string(),
            ShipmentDirection::Forward,
            &guard.deps.settings.origin,
            &order.address,
            &order.lines,
            guard.courier.as_ref().map(|c| c.courier_id),
          );
          (guard.deps.clone(), order, payload)
        };

        let shipment_id = match deps.carrier.create_shipment(&payload).await {
          Ok(id) => id,
          Err(e) => return record_failure(&ctx, booking_failure_status(&e), &e).await,
        };
        // persisted right away so a later failure or crash never books twice
        order.shipment.shipment_id = Some(shipment_id.clone());
        order.updated_at = Utc::now();
        deps.orders.save(&order).await?;
        info!(order_id = %order.id, shipment_id = %shipment_id, "Carrier shipment created.");
        ctx.write().order = order;
        Ok(PipelineControl::Continue)
      })
    });

    p.on("assign_tracking", |ctx: ContextData<ShipmentCtxData>| {
      Box::pin(async move {
        let (deps, mut order, courier_id) = {
          let guard = ctx.read();
          let courier_id = guard.courier.as_ref().map(|c| c.courier_id).or(guard.order.shipment.courier_id);
          (guard.deps.clone(), guard.order.clone(), courier_id)
        };
        let shipment_id = order.shipment.shipment_id.clone().unwrap_or_default();

        let assignment = match deps.carrier.assign_tracking(&shipment_id, courier_id).await {
          Ok(a) => a,
          Err(e) => {
            let status = match e {
              OrderflowError::CarrierPermission { .. } => ShippingStatus::PermissionDenied,
              _ => ShippingStatus::AwbFailed,
            };
            return record_failure(&ctx, status, &e).await;
          }
        };

        let shipment = &mut order.shipment;
        shipment.tracking_code = Some(assignment.tracking_code);
        shipment.courier_name = Some(assignment.courier_name);
        shipment.courier_id = assignment.courier_id.or(courier_id);
        shipment.freight_charge = Some(assignment.freight_charge);
        shipment.expected_delivery = assignment.expected_delivery;
        ctx.write().order = order;
        Ok(PipelineControl::Continue)
      })
    });

    p.on("mark_shipped", |ctx: ContextData<ShipmentCtxData>| {
      Box::pin(async move {
        let (deps, mut order) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.order.clone())
        };
        order.transition_shipping(ShippingStatus::Shipped, Utc::now())?;
        order.shipping_error.clear();
        deps.orders.save(&order).await?;
        info!(
          order_id = %order.id,
          tracking_code = order.shipment.tracking_code.as_deref().unwrap_or_default(),
          courier = order.shipment.courier_name.as_deref().unwrap_or_default(),
          "Order shipped."
        );
        ctx.write().order = order;
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    Self { pipeline: p }
  }

  /// Runs one booking attempt for `order_id` under the order's lock and returns
  /// the order as persisted afterwards. Carrier failures are recorded, not returned.
  #[instrument(name = "shipment::process", skip(self, deps))]
  pub async fn process(&self, deps: &Collaborators, order_id: Uuid) -> Result<Order> {
    let _lock = deps.locks.acquire(order_id).await;
    let order = deps
      .orders
      .get(order_id)
      .await?
      .ok_or_else(|| OrderflowError::NotFound(format!("order {order_id}")))?;

    let ctx = ContextData::new(ShipmentCtxData {
      deps: deps.clone(),
      order,
      courier: None,
    });
    self.pipeline.run(ctx.clone()).await?;
    let order = ctx.read().order.clone();
    Ok(order)
  }
}
