// orderflow-server/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use orderflow::{OrderIntentRequest, ShippingStatusView};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
  #[serde(default)]
  pub reason: String,
}

#[instrument(
  name = "handler::create_order",
  skip(app_state, req_body),
  fields(customer_id = %req_body.customer_id, lines = req_body.lines.len())
)]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  req_body: web::Json<OrderIntentRequest>,
) -> Result<HttpResponse, AppError> {
  let intent = app_state.fulfilment.create_order_intent(req_body.into_inner()).await?;
  info!(order_id = %intent.order_id, amount = %intent.amount, "Order intent created.");
  Ok(HttpResponse::Created().json(intent))
}

#[instrument(name = "handler::cancel_order", skip(app_state, req_body), fields(order_id = %order_id))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  req_body: Option<web::Json<CancelRequest>>,
) -> Result<HttpResponse, AppError> {
  let reason = req_body.map(|b| b.into_inner().reason).unwrap_or_default();
  let reason = if reason.trim().is_empty() { "customer request".to_string() } else { reason };
  let outcome = app_state.fulfilment.cancel_order(order_id.into_inner(), &reason).await?;

  let settings = &app_state.fulfilment.deps().settings;
  Ok(HttpResponse::Ok().json(json!({
    "order": ShippingStatusView::of(&outcome.order, |code| settings.tracking_url(code)),
    "carrierCancelled": outcome.carrier_cancelled,
    "refund": outcome.refund,
  })))
}
