// orderflow-server/src/db/inventory.rs

use super::db_err;
use async_trait::async_trait;
use orderflow::ports::{CommitKey, CommitOutcome, InventoryStore, StockLine};
use orderflow::{OrderflowError, Result};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct PgInventory {
  pool: PgPool,
}

impl PgInventory {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn set_stock(&self, sku: &str, stock: u32) -> Result<()> {
    sqlx::query(
      "INSERT INTO inventory (sku, stock, updated_at) VALUES ($1, $2, now())
       ON CONFLICT (sku) DO UPDATE SET stock = $2, updated_at = now()",
    )
    .bind(sku)
    .bind(to_db(stock)?)
    .execute(&self.pool)
    .await
    .map_err(db_err)?;
    Ok(())
  }
}

fn to_db(quantity: u32) -> Result<i32> {
  i32::try_from(quantity).map_err(|_| OrderflowError::Validation(format!("quantity {quantity} is out of range")))
}

/// Sums repeated SKUs, keeping the order in which each SKU first appears.
fn merge_lines(lines: &[StockLine]) -> Vec<(&str, u32)> {
  let mut merged: Vec<(&str, u32)> = Vec::with_capacity(lines.len());
  for line in lines {
    match merged.iter_mut().find(|(sku, _)| *sku == line.sku) {
      Some((_, quantity)) => *quantity += line.quantity,
      None => merged.push((line.sku.as_str(), line.quantity)),
    }
  }
  merged
}

#[async_trait]
impl InventoryStore for PgInventory {
  async fn stock(&self, sku: &str) -> Result<Option<u32>> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT stock FROM inventory WHERE sku = $1")
      .bind(sku)
      .fetch_optional(&self.pool)
      .await
      .map_err(db_err)?;
    Ok(row.map(|(stock,)| stock.max(0) as u32))
  }

  #[instrument(skip(self, lines), fields(commit = %key))]
  async fn commit(&self, key: &CommitKey, lines: &[StockLine]) -> Result<CommitOutcome> {
    let mut tx = self.pool.begin().await.map_err(db_err)?;

    // a concurrent commit with the same key blocks here until the first one finishes
    let claimed = sqlx::query(
      "INSERT INTO stock_commits (order_id, commit_ref, lines) VALUES ($1, $2, $3)
       ON CONFLICT (order_id, commit_ref) DO NOTHING",
    )
    .bind(key.order_id)
    .bind(&key.payment_id)
    .bind(Json(lines))
    .execute(&mut *tx)
    .await
    .map_err(db_err)?
    .rows_affected();
    if claimed == 0 {
      tx.rollback().await.map_err(db_err)?;
      debug!("Stock commit already applied.");
      return Ok(CommitOutcome::AlreadyApplied);
    }

    for (sku, quantity) in merge_lines(lines) {
      let updated = sqlx::query(
        "UPDATE inventory SET stock = stock - $1, updated_at = now()
         WHERE sku = $2 AND stock >= $1",
      )
      .bind(to_db(quantity)?)
      .bind(sku)
      .execute(&mut *tx)
      .await
      .map_err(db_err)?
      .rows_affected();

      if updated == 0 {
        let available: Option<(i32,)> = sqlx::query_as("SELECT stock FROM inventory WHERE sku = $1")
          .bind(sku)
          .fetch_optional(&mut *tx)
          .await
          .map_err(db_err)?;
        tx.rollback().await.map_err(db_err)?;
        return Err(OrderflowError::InsufficientStock {
          sku: sku.to_string(),
          requested: quantity,
          available: available.map_or(0, |(stock,)| stock.max(0) as u32),
        });
      }
    }

    tx.commit().await.map_err(db_err)?;
    Ok(CommitOutcome::Applied)
  }

  #[instrument(skip(self), fields(commit = %key))]
  async fn release(&self, key: &CommitKey) -> Result<bool> {
    let mut tx = self.pool.begin().await.map_err(db_err)?;
    let removed: Option<(Json<Vec<StockLine>>,)> = sqlx::query_as(
      "DELETE FROM stock_commits WHERE order_id = $1 AND commit_ref = $2 RETURNING lines",
    )
    .bind(key.order_id)
    .bind(&key.payment_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_err)?;

    let Some((Json(lines),)) = removed else {
      tx.rollback().await.map_err(db_err)?;
      return Ok(false);
    };
    for (sku, quantity) in merge_lines(&lines) {
      sqlx::query("UPDATE inventory SET stock = stock + $1, updated_at = now() WHERE sku = $2")
        .bind(to_db(quantity)?)
        .bind(sku)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
    }
    tx.commit().await.map_err(db_err)?;
    Ok(true)
  }
}
