// orderflow-server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use orderflow::OrderflowError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration Error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error(transparent)]
  Fulfilment(#[from] OrderflowError),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

/// Machine-readable detail for the errors a client can act on.
fn detail(err: &OrderflowError) -> serde_json::Value {
  match err {
    OrderflowError::LineItemUnavailable {
      item_id,
      requested_sku,
      requested_size,
      available_sizes,
      available_skus,
    } => json!({
      "itemId": item_id,
      "requestedSku": requested_sku,
      "requestedSize": requested_size,
      "availableSizes": available_sizes,
      "availableSkus": available_skus,
    }),
    OrderflowError::InsufficientStock { sku, requested, available } => json!({
      "sku": sku,
      "requested": requested,
      "available": available,
    }),
    OrderflowError::PromoInvalid { code, reason } => json!({ "code": code, "reason": reason }),
    OrderflowError::NoValidPrice { sku } => json!({ "sku": sku }),
    _ => serde_json::Value::Null,
  }
}

fn kind(err: &OrderflowError) -> &'static str {
  match err {
    OrderflowError::Validation(_) => "validation",
    OrderflowError::LineItemUnavailable { .. } => "line_item_unavailable",
    OrderflowError::NoValidPrice { .. } => "no_valid_price",
    OrderflowError::PromoInvalid { .. } => "promo_invalid",
    OrderflowError::SignatureMismatch { .. } => "signature_mismatch",
    OrderflowError::InsufficientStock { .. } => "insufficient_stock",
    OrderflowError::NotFound(_) => "not_found",
    OrderflowError::PreconditionFailed(_) => "precondition_failed",
    OrderflowError::Gateway(_) | OrderflowError::GatewayRefund { .. } => "gateway",
    OrderflowError::CarrierAuth(_)
    | OrderflowError::CarrierPermission { .. }
    | OrderflowError::CarrierServiceability { .. }
    | OrderflowError::CarrierRequest { .. }
    | OrderflowError::CarrierTimeout { .. }
    | OrderflowError::CarrierTransport(_) => "carrier",
    OrderflowError::Storage { .. } | OrderflowError::Flow(_) => "internal",
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Fulfilment(err) => match err {
        OrderflowError::Validation(_)
        | OrderflowError::LineItemUnavailable { .. }
        | OrderflowError::NoValidPrice { .. }
        | OrderflowError::PromoInvalid { .. } => StatusCode::BAD_REQUEST,
        OrderflowError::SignatureMismatch { .. } => StatusCode::UNAUTHORIZED,
        OrderflowError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderflowError::InsufficientStock { .. } => StatusCode::CONFLICT,
        OrderflowError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
        OrderflowError::Gateway(_)
        | OrderflowError::GatewayRefund { .. }
        | OrderflowError::CarrierAuth(_)
        | OrderflowError::CarrierPermission { .. }
        | OrderflowError::CarrierServiceability { .. }
        | OrderflowError::CarrierRequest { .. }
        | OrderflowError::CarrierTimeout { .. }
        | OrderflowError::CarrierTransport(_) => StatusCode::BAD_GATEWAY,
        OrderflowError::Storage { .. } | OrderflowError::Flow(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Migrate(_) | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, status = status.as_u16(), "Request rejected");
    }

    let body = match self {
      AppError::Fulfilment(_) if status.is_server_error() && status != StatusCode::BAD_GATEWAY => {
        json!({ "error": "internal", "message": "An internal error occurred" })
      }
      AppError::Fulfilment(err) => json!({
        "error": kind(err),
        "message": err.to_string(),
        "detail": detail(err),
      }),
      AppError::Sqlx(_) | AppError::Migrate(_) => json!({ "error": "internal", "message": "Database operation failed" }),
      AppError::Config(_) | AppError::Internal(_) => {
        json!({ "error": "internal", "message": "An internal error occurred" })
      }
    };
    HttpResponse::build(status).json(body)
  }
}

// Define a Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;
