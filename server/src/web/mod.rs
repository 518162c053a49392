// orderflow-server/src/web/mod.rs

pub mod handlers;
pub mod routes;

pub use routes::configure_app_routes;

use actix_web::error::InternalError;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Malformed JSON bodies get the same error shape as domain validation errors.
pub fn json_config() -> web::JsonConfig {
  web::JsonConfig::default()
    .limit(256 * 1024)
    .error_handler(|err, _req| {
      let message = err.to_string();
      tracing::warn!(error = %message, "Rejected request body.");
      InternalError::from_response(
        err,
        HttpResponse::BadRequest().json(json!({ "error": "validation", "message": message, "detail": null })),
      )
      .into()
    })
}
