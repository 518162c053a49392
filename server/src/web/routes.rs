// orderflow-server/src/web/routes.rs

use super::handlers::{order_handlers, payment_handlers, reversal_handlers, shipping_handlers};
use crate::config::StorageMode;
use crate::state::AppState;
use actix_web::web;

async fn health_check_handler(app_state: web::Data<AppState>) -> actix_web::HttpResponse {
  let storage = match app_state.config.storage {
    StorageMode::Postgres => "postgres",
    StorageMode::Memory => "memory",
  };
  actix_web::HttpResponse::Ok().json(serde_json::json!({
    "status": "ok",
    "storage": storage,
    "shipmentsInFlight": app_state.fulfilment.queue().in_flight(),
  }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/payments")
          .route("/verify", web::post().to(payment_handlers::verify_payment_handler))
          .route("/failed", web::post().to(payment_handlers::payment_failed_handler)),
      )
      .service(
        web::scope("/orders")
          .route("", web::post().to(order_handlers::create_order_handler))
          .route("/{order_id}/cancel", web::post().to(order_handlers::cancel_order_handler))
          .route("/{order_id}/shipping", web::get().to(shipping_handlers::shipping_status_handler))
          .route(
            "/{order_id}/shipping/retry",
            web::post().to(shipping_handlers::retry_shipping_handler),
          )
          .route(
            "/{order_id}/shipping/refresh",
            web::post().to(shipping_handlers::refresh_tracking_handler),
          )
          .route("/{order_id}/returns", web::post().to(reversal_handlers::create_return_handler))
          .route("/{order_id}/exchanges", web::post().to(reversal_handlers::create_exchange_handler)),
      ),
  );
}
