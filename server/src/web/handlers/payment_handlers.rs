// orderflow-server/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpResponse};
use orderflow::PaymentCallback;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentFailedRequest {
  pub gateway_order_id: String,
  #[serde(default)]
  pub reason: String,
}

/// Called by the storefront after checkout with the gateway's signed callback.
#[instrument(
  name = "handler::verify_payment",
  skip(app_state, req_body),
  fields(gateway_order_id = %req_body.gateway_order_id)
)]
pub async fn verify_payment_handler(
  app_state: web::Data<AppState>,
  req_body: web::Json<PaymentCallback>,
) -> Result<HttpResponse, AppError> {
  let confirmation = app_state.fulfilment.verify_payment(req_body.into_inner()).await?;
  info!(
    order_id = %confirmation.order_id,
    already_paid = confirmation.already_paid,
    "Payment verified."
  );
  Ok(HttpResponse::Ok().json(confirmation))
}

#[instrument(
  name = "handler::payment_failed",
  skip(app_state, req_body),
  fields(gateway_order_id = %req_body.gateway_order_id)
)]
pub async fn payment_failed_handler(
  app_state: web::Data<AppState>,
  req_body: web::Json<PaymentFailedRequest>,
) -> Result<HttpResponse, AppError> {
  let req = req_body.into_inner();
  let order = app_state
    .fulfilment
    .mark_payment_failed(&req.gateway_order_id, &req.reason)
    .await?;
  Ok(HttpResponse::Ok().json(json!({
    "orderId": order.id,
    "paymentStatus": order.payment_status,
    "orderStatus": order.order_status,
    "shippingStatus": order.shipping_status,
  })))
}
