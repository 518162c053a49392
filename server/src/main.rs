// orderflow-server/src/main.rs

mod config;
mod db;
mod errors;
mod services;
mod state;
mod web;

use crate::config::AppConfig;
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan; // For span events in tracing

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO) // Default level
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // Allow RUST_LOG override
    .with_span_events(FmtSpan::CLOSE) // Log when spans close, showing duration
    .init();

  tracing::info!("Starting order fulfilment server...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(e.into());
    }
  };

  let (app_state, workers) = match AppState::build(app_config.clone()).await {
    Ok(built) => built,
    Err(e) => {
      tracing::error!(error = %e, "Failed to initialise application state.");
      return Err(e.into());
    }
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  let http_state = app_state.clone();
  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(http_state.clone())) // Share AppState with handlers
      .app_data(web::json_config())
      .wrap(tracing_actix_web::TracingLogger::default()) // Actix middleware for tracing requests
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await?;

  // Dropping the last queue handle closes the channel; workers finish their current job and exit.
  drop(app_state);
  let count = workers.len();
  match tokio::time::timeout(Duration::from_secs(30), futures_util::future::join_all(workers)).await {
    Ok(_) => tracing::info!(workers = count, "Shipment workers stopped."),
    Err(_) => tracing::warn!(workers = count, "Shipment workers still busy at shutdown; queued orders resume on next start."),
  }
  Ok(())
}
