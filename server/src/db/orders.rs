// orderflow-server/src/db/orders.rs

use super::{db_err, variant_name};
use async_trait::async_trait;
use orderflow::model::{Order, PaymentStatus, ShippingStatus};
use orderflow::ports::OrderStore;
use orderflow::{OrderflowError, Result};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgOrders {
  pool: PgPool,
}

impl PgOrders {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl OrderStore for PgOrders {
  async fn insert(&self, order: &Order) -> Result<()> {
    sqlx::query(
      "INSERT INTO orders (id, gateway_order_id, customer_id, payment_status, shipping_status, total, document, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(order.id)
    .bind(&order.gateway_order_id)
    .bind(&order.customer_id)
    .bind(variant_name(&order.payment_status)?)
    .bind(order.shipping_status.as_str())
    .bind(order.totals.total)
    .bind(Json(order))
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&self.pool)
    .await
    .map_err(db_err)?;
    Ok(())
  }

  async fn get(&self, order_id: Uuid) -> Result<Option<Order>> {
    let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT document FROM orders WHERE id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(db_err)?;
    Ok(row.map(|(Json(order),)| order))
  }

  async fn find_by_gateway_order(&self, gateway_order_id: &str) -> Result<Option<Order>> {
    let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT document FROM orders WHERE gateway_order_id = $1")
      .bind(gateway_order_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(db_err)?;
    Ok(row.map(|(Json(order),)| order))
  }

  async fn save(&self, order: &Order) -> Result<()> {
    let updated = sqlx::query(
      "UPDATE orders SET payment_status = $2, shipping_status = $3, total = $4, document = $5, updated_at = $6
       WHERE id = $1",
    )
    .bind(order.id)
    .bind(variant_name(&order.payment_status)?)
    .bind(order.shipping_status.as_str())
    .bind(order.totals.total)
    .bind(Json(order))
    .bind(order.updated_at)
    .execute(&self.pool)
    .await
    .map_err(db_err)?
    .rows_affected();
    if updated == 0 {
      return Err(OrderflowError::NotFound(format!("order {}", order.id)));
    }
    Ok(())
  }

  async fn list_paid_by_shipping_status(&self, statuses: &[ShippingStatus]) -> Result<Vec<Order>> {
    let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    let rows: Vec<(Json<Order>,)> = sqlx::query_as(
      "SELECT document FROM orders
       WHERE payment_status = $1 AND shipping_status = ANY($2)
       ORDER BY created_at",
    )
    .bind(variant_name(&PaymentStatus::Paid)?)
    .bind(&statuses)
    .fetch_all(&self.pool)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(|(Json(order),)| order).collect())
  }
}
