// orderflow/src/checkout.rs

//! Order intent creation: cart -> priced, frozen order awaiting payment.

use crate::context::Collaborators;
use crate::error::{OrderflowError, Result};
use crate::flow::{ContextData, Pipeline, PipelineControl, SkipCondition};
use crate::model::{
  Address, Order, OrderLine, OrderStatus, OrderTotals, PaymentStatus, PromoCode, ShipmentRecord, ShippingStatus,
};
use crate::ports::GatewayIntent;
use crate::pricing::{
  calculate_totals, derive_effective_price, evaluate_promo, subtotal_of, validate_client_price, PromoCart, PromoOutcome,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
  pub item_id: String,
  #[serde(default)]
  pub sku: String,
  #[serde(default)]
  pub size: String,
  pub quantity: u32,
  /// What the storefront showed. Logged when it disagrees, never billed.
  #[serde(default)]
  pub client_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntentRequest {
  pub customer_id: String,
  pub lines: Vec<CartLine>,
  pub address: Address,
  #[serde(default)]
  pub promo_code: Option<String>,
}

/// What the caller needs to open the gateway checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
  pub order_id: Uuid,
  pub gateway_order_id: String,
  pub amount: Decimal,
  pub currency: String,
  pub totals: OrderTotals,
}

pub struct CheckoutCtxData {
  pub deps: Collaborators,
  pub request: OrderIntentRequest,
  pub order_id: Uuid,
  pub lines: Vec<OrderLine>,
  /// Stock seen during the advisory pre-check, parallel to `lines`.
  pub stock_seen: Vec<u32>,
  pub promo: Option<PromoOutcome>,
  pub totals: Option<OrderTotals>,
  pub intent: Option<GatewayIntent>,
  pub order: Option<Order>,
}

fn no_promo() -> SkipCondition<CheckoutCtxData> {
  Arc::new(|data: &CheckoutCtxData| {
    data
      .request
      .promo_code
      .as_deref()
      .map_or(true, |c| c.trim().is_empty())
  })
}

pub struct OrderIntentCreator {
  pipeline: Pipeline<CheckoutCtxData, OrderflowError>,
}

impl Default for OrderIntentCreator {
  fn default() -> Self {
    Self::new()
  }
}

impl OrderIntentCreator {
  pub fn new() -> Self {
    let mut p = Pipeline::<CheckoutCtxData, OrderflowError>::new(
      "order_intent",
      &[
        ("validate_request", false, None),
        ("resolve_lines", false, None),
        ("apply_promo", false, Some(no_promo())),
        ("compute_totals", false, None),
        ("open_gateway_intent", false, None),
        ("persist_order", false, None),
      ],
    );

    p.on("validate_request", |ctx: ContextData<CheckoutCtxData>| {
      Box::pin(async move {
        let guard = ctx.read();
        let request = &guard.request;
        if request.customer_id.trim().is_empty() {
          return Err(OrderflowError::Validation("customer_id is required".into()));
        }
        if request.lines.is_empty() {
          return Err(OrderflowError::Validation("cart is empty".into()));
        }
        if let Some(line) = request.lines.iter().find(|l| l.quantity == 0) {
          return Err(OrderflowError::Validation(format!(
            "quantity for item '{}' must be at least 1",
            line.item_id
          )));
        }
        if let Some(line) = request.lines.iter().find(|l| l.sku.trim().is_empty() && l.size.trim().is_empty()) {
          return Err(OrderflowError::Validation(format!(
            "line for item '{}' needs a sku or a size",
            line.item_id
          )));
        }
        request.address.validate()?;
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("resolve_lines", |ctx: ContextData<CheckoutCtxData>| {
      Box::pin(async move {
        let (deps, cart, order_id) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.request.lines.clone(), guard.order_id)
        };

        let mut lines = Vec::with_capacity(cart.len());
        let mut stock_seen = Vec::with_capacity(cart.len());
        for cart_line in &cart {
          let (line, stock) = resolve_line(&deps, cart_line, order_id).await?;
          lines.push(line);
          stock_seen.push(stock);
        }

        let mut guard = ctx.write();
        guard.lines = lines;
        guard.stock_seen = stock_seen;
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("apply_promo", |ctx: ContextData<CheckoutCtxData>| {
      Box::pin(async move {
        let (deps, raw_code) = {
          let guard = ctx.read();
          (guard.deps.clone(), guard.request.promo_code.clone().unwrap_or_default())
        };
        let code = PromoCode::normalize(&raw_code);
        let promo = deps.promos.get(&code).await?;

        let mut guard = ctx.write();
        let subtotal = subtotal_of(&guard.lines);
        let cart = PromoCart {
          lines: &guard.lines,
          subtotal,
          shipping: guard.deps.settings.pricing.shipping_for(subtotal),
        };
        let outcome = evaluate_promo(&code, promo.as_ref(), cart, Utc::now())?;

        if let Some(idx) = outcome.bogo_line {
          let line = &guard.lines[idx];
          let available = guard.stock_seen[idx];
          if available < line.shipped_quantity() + 1 {
            return Err(OrderflowError::PromoInvalid {
              code,
              reason: format!("not enough stock of '{}' for the free unit", line.sku),
            });
          }
        }
        outcome.apply_to_lines(&mut guard.lines);
        info!(order_id = %guard.order_id, promo = %outcome.code, discount = %outcome.discount, "Promo applied.");
        guard.promo = Some(outcome);
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("compute_totals", |ctx: ContextData<CheckoutCtxData>| {
      Box::pin(async move {
        let mut guard = ctx.write();
        let pricing = &guard.deps.settings.pricing;
        // free shipping is decided on what the customer pays for, not on BOGO units
        let paid_subtotal: Decimal = guard
          .lines
          .iter()
          .map(|l| l.unit_price * Decimal::from(l.quantity))
          .sum();
        let shipping = pricing.shipping_for(paid_subtotal);
        let (goods_discount, shipping_discount) = guard
          .promo
          .as_ref()
          .map_or((Decimal::ZERO, Decimal::ZERO), |p| p.goods_and_shipping());
        let totals = calculate_totals(
          &guard.lines,
          pricing.tax_rate_percent,
          shipping,
          goods_discount,
          shipping_discount,
        );
        guard.totals = Some(totals);
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("open_gateway_intent", |ctx: ContextData<CheckoutCtxData>| {
      Box::pin(async move {
        let (deps, order_id, amount) = {
          let guard = ctx.read();
          let amount = guard.totals.as_ref().map(|t| t.total).unwrap_or_default();
          (guard.deps.clone(), guard.order_id, amount)
        };
        if amount <= Decimal::ZERO {
          return Err(OrderflowError::Validation("order total must be positive".into()));
        }
        let currency = deps.settings.pricing.currency.clone();
        let intent = deps
          .gateway
          .create_intent(amount, &currency, &order_id.to_string())
          .await?;
        info!(order_id = %order_id, gateway_order_id = %intent.gateway_order_id, amount = %amount, "Gateway intent opened.");
        ctx.write().intent = Some(intent);
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    p.on("persist_order", |ctx: ContextData<CheckoutCtxData>| {
      Box::pin(async move {
        let (deps, order) = {
          let guard = ctx.read();
          let now = Utc::now();
          let order = Order {
            id: guard.order_id,
            customer_id: guard.request.customer_id.clone(),
            lines: guard.lines.clone(),
            totals: guard.totals.clone().unwrap_or_default(),
            currency: guard.deps.settings.pricing.currency.clone(),
            payment_status: PaymentStatus::AwaitingPayment,
            order_status: OrderStatus::Pending,
            shipping_status: ShippingStatus::Pending,
            gateway_order_id: guard.intent.as_ref().map(|i| i.gateway_order_id.clone()).unwrap_or_default(),
            gateway_payment_id: None,
            shipment: ShipmentRecord::default(),
            address: guard.request.address.clone(),
            promo_code: guard.promo.as_ref().map(|p| p.code.clone()),
            shipping_error: String::new(),
            refunds: Vec::new(),
            created_at: now,
            updated_at: now,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
          };
          (guard.deps.clone(), order)
        };
        deps.orders.insert(&order).await?;
        ctx.write().order = Some(order);
        Ok::<_, OrderflowError>(PipelineControl::Continue)
      })
    });

    Self { pipeline: p }
  }

  #[instrument(name = "orders::create_intent", skip_all, fields(customer_id = %request.customer_id, order_id = tracing::field::Empty))]
  pub async fn create(&self, deps: &Collaborators, request: OrderIntentRequest) -> Result<OrderIntent> {
    let order_id = Uuid::new_v4();
    tracing::Span::current().record("order_id", tracing::field::display(order_id));

    let ctx = ContextData::new(CheckoutCtxData {
      deps: deps.clone(),
      request,
      order_id,
      lines: Vec::new(),
      stock_seen: Vec::new(),
      promo: None,
      totals: None,
      intent: None,
      order: None,
    });
    self.pipeline.run(ctx.clone()).await?;

    let guard = ctx.read();
    let (Some(order), Some(intent)) = (guard.order.as_ref(), guard.intent.as_ref()) else {
      return Err(OrderflowError::PreconditionFailed(format!(
        "order intent {order_id} did not complete"
      )));
    };
    info!(order_id = %order.id, total = %order.totals.total, "Order created, awaiting payment.");
    Ok(OrderIntent {
      order_id: order.id,
      gateway_order_id: intent.gateway_order_id.clone(),
      amount: order.totals.total,
      currency: order.currency.clone(),
      totals: order.totals.clone(),
    })
  }
}

/// Resolves one cart line to a frozen order line, checking availability on the way.
async fn resolve_line(deps: &Collaborators, cart_line: &CartLine, order_id: Uuid) -> Result<(OrderLine, u32)> {
  let unavailable = |available_sizes: Vec<String>, available_skus: Vec<String>| OrderflowError::LineItemUnavailable {
    item_id: cart_line.item_id.clone(),
    requested_sku: cart_line.sku.clone(),
    requested_size: cart_line.size.clone(),
    available_sizes,
    available_skus,
  };

  let item = deps
    .catalog
    .item(&cart_line.item_id)
    .await?
    .ok_or_else(|| unavailable(Vec::new(), Vec::new()))?;
  if !item.is_purchasable() {
    return Err(unavailable(Vec::new(), Vec::new()));
  }
  let variant = item
    .resolve_variant(&cart_line.sku, &cart_line.size)
    .ok_or_else(|| unavailable(item.available_sizes(), item.available_skus()))?;

  // advisory only: stock is committed after payment, and a sku the inventory
  // does not track has none
  let stock = deps.inventory.stock(&variant.sku).await?.unwrap_or(0);
  if stock < cart_line.quantity {
    return Err(OrderflowError::InsufficientStock {
      sku: variant.sku.clone(),
      requested: cart_line.quantity,
      available: stock,
    });
  }

  let price = derive_effective_price(variant)?;
  let check = validate_client_price(cart_line.client_price, &price);
  if check.mismatch {
    warn!(
      order_id = %order_id,
      sku = %variant.sku,
      client_price = ?cart_line.client_price,
      server_price = %price.unit_price,
      difference = %check.difference,
      "Client price disagrees with catalog; billing the catalog price."
    );
  }

  let line = OrderLine {
    item_id: item.id.clone(),
    item_name: item.name.clone(),
    sku: variant.sku.clone(),
    size: variant.size.clone(),
    quantity: cart_line.quantity,
    unit_price: price.unit_price,
    price_type: price.price_type,
    discount_percentage: price.discount_percentage,
    savings: price.savings * Decimal::from(cart_line.quantity),
    unit_weight_kg: variant.weight_kg,
    dims: variant.dims,
    free_quantity: 0,
  };
  Ok((line, stock))
}
