// orderflow-server/src/web/handlers/reversal_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
  pub reason: String,
  #[serde(default)]
  pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
  pub new_size: String,
  pub reason: String,
  #[serde(default)]
  pub images: Vec<String>,
}

#[instrument(name = "handler::create_return", skip(app_state, req_body), fields(order_id = %order_id))]
pub async fn create_return_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  req_body: web::Json<ReturnRequest>,
) -> Result<HttpResponse, AppError> {
  let req = req_body.into_inner();
  let request = app_state
    .fulfilment
    .create_return(order_id.into_inner(), req.reason, req.images)
    .await?;
  info!(rma = %request.rma, "Return registered.");
  Ok(HttpResponse::Created().json(request))
}

#[instrument(name = "handler::create_exchange", skip(app_state, req_body), fields(order_id = %order_id))]
pub async fn create_exchange_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  req_body: web::Json<ExchangeRequest>,
) -> Result<HttpResponse, AppError> {
  let req = req_body.into_inner();
  let request = app_state
    .fulfilment
    .create_exchange(order_id.into_inner(), req.new_size, req.reason, req.images)
    .await?;
  info!(rma = %request.rma, "Exchange registered.");
  Ok(HttpResponse::Created().json(request))
}
