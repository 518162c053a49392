// orderflow-server/src/web/handlers/shipping_handlers.rs

use actix_web::{web, HttpResponse};
use orderflow::model::Order;
use orderflow::ShippingStatusView;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

fn view(app_state: &AppState, order: &Order) -> ShippingStatusView {
  let settings = &app_state.fulfilment.deps().settings;
  ShippingStatusView::of(order, |code| settings.tracking_url(code))
}

/// Polling endpoint for the storefront's order page.
#[instrument(name = "handler::shipping_status", skip(app_state), fields(order_id = %order_id))]
pub async fn shipping_status_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let status = app_state.fulfilment.shipping_status(order_id.into_inner()).await?;
  Ok(HttpResponse::Ok().json(status))
}

#[instrument(name = "handler::retry_shipping", skip(app_state), fields(order_id = %order_id))]
pub async fn retry_shipping_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = app_state.fulfilment.retry_shipping(order_id.into_inner()).await?;
  Ok(HttpResponse::Accepted().json(view(&app_state, &order)))
}

#[instrument(name = "handler::refresh_tracking", skip(app_state), fields(order_id = %order_id))]
pub async fn refresh_tracking_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = app_state.fulfilment.refresh_tracking(order_id.into_inner()).await?;
  Ok(HttpResponse::Ok().json(view(&app_state, &order)))
}
