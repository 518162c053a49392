// orderflow-server/src/db/mod.rs

//! PostgreSQL implementations of the engine's store traits. Documents (order,
//! reversal request, catalog sizes) are kept as JSONB next to the columns the
//! queries filter on.

pub mod catalog;
pub mod inventory;
pub mod orders;
pub mod promos;
pub mod reversals;

pub use catalog::PgCatalog;
pub use inventory::PgInventory;
pub use orders::PgOrders;
pub use promos::PgPromos;
pub use reversals::PgReversals;

use crate::config::AppConfig;
use crate::errors::{AppError, Result as AppResult};
use orderflow::OrderflowError;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub(crate) fn db_err(e: sqlx::Error) -> OrderflowError {
  OrderflowError::storage(e)
}

/// The snake_case name serde gives a unit enum variant.
pub(crate) fn variant_name<T: Serialize>(value: &T) -> orderflow::Result<String> {
  match serde_json::to_value(value).map_err(OrderflowError::storage)? {
    serde_json::Value::String(name) => Ok(name),
    other => Err(OrderflowError::storage(anyhow::anyhow!("expected a unit variant, got {other}"))),
  }
}

pub async fn connect(config: &AppConfig) -> AppResult<PgPool> {
  let url = config
    .database_url
    .as_deref()
    .ok_or_else(|| AppError::Config("DATABASE_URL is required for postgres storage".to_string()))?;
  let pool = PgPoolOptions::new()
    .max_connections(config.database_max_connections)
    .connect(url)
    .await?;
  sqlx::migrate!("./migrations").run(&pool).await?;
  tracing::info!("Connected to the database and applied migrations.");
  Ok(pool)
}
