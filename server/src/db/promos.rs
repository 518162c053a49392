// orderflow-server/src/db/promos.rs

use super::db_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orderflow::model::{DiscountKind, PromoCode};
use orderflow::ports::PromoStore;
use orderflow::{OrderflowError, Result};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct PromoRow {
  code: String,
  kind: Json<DiscountKind>,
  active: bool,
  starts_at: DateTime<Utc>,
  ends_at: DateTime<Utc>,
  max_uses: i32,
  current_uses: i32,
  min_order_value: Decimal,
}

impl From<PromoRow> for PromoCode {
  fn from(row: PromoRow) -> Self {
    PromoCode {
      code: row.code,
      kind: row.kind.0,
      active: row.active,
      starts_at: row.starts_at,
      ends_at: row.ends_at,
      max_uses: row.max_uses.max(0) as u32,
      current_uses: row.current_uses.max(0) as u32,
      min_order_value: row.min_order_value,
    }
  }
}

#[derive(Clone)]
pub struct PgPromos {
  pool: PgPool,
}

impl PgPromos {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn upsert(&self, promo: &PromoCode) -> Result<()> {
    let max_uses = i32::try_from(promo.max_uses).map_err(OrderflowError::storage)?;
    sqlx::query(
      "INSERT INTO promo_codes (code, kind, active, starts_at, ends_at, max_uses, min_order_value)
       VALUES ($1, $2, $3, $4, $5, $6, $7)
       ON CONFLICT (code) DO UPDATE SET
          kind = $2, active = $3, starts_at = $4, ends_at = $5, max_uses = $6, min_order_value = $7",
    )
    .bind(PromoCode::normalize(&promo.code))
    .bind(Json(&promo.kind))
    .bind(promo.active)
    .bind(promo.starts_at)
    .bind(promo.ends_at)
    .bind(max_uses)
    .bind(promo.min_order_value)
    .execute(&self.pool)
    .await
    .map_err(db_err)?;
    Ok(())
  }
}

#[async_trait]
impl PromoStore for PgPromos {
  async fn get(&self, code: &str) -> Result<Option<PromoCode>> {
    let row: Option<PromoRow> = sqlx::query_as(
      "SELECT code, kind, active, starts_at, ends_at, max_uses, current_uses, min_order_value
       FROM promo_codes WHERE code = $1",
    )
    .bind(PromoCode::normalize(code))
    .fetch_optional(&self.pool)
    .await
    .map_err(db_err)?;
    Ok(row.map(PromoCode::from))
  }

  async fn try_increment_usage(&self, code: &str) -> Result<bool> {
    let code = PromoCode::normalize(code);
    let updated = sqlx::query(
      "UPDATE promo_codes SET current_uses = current_uses + 1
       WHERE code = $1 AND (max_uses = 0 OR current_uses < max_uses)",
    )
    .bind(&code)
    .execute(&self.pool)
    .await
    .map_err(db_err)?
    .rows_affected();
    if updated == 1 {
      return Ok(true);
    }

    let exists: Option<(String,)> = sqlx::query_as("SELECT code FROM promo_codes WHERE code = $1")
      .bind(&code)
      .fetch_optional(&self.pool)
      .await
      .map_err(db_err)?;
    match exists {
      Some(_) => Ok(false),
      None => Err(OrderflowError::NotFound(format!("promo {code}"))),
    }
  }

  async fn decrement_usage(&self, code: &str) -> Result<()> {
    sqlx::query("UPDATE promo_codes SET current_uses = GREATEST(current_uses - 1, 0) WHERE code = $1")
      .bind(PromoCode::normalize(code))
      .execute(&self.pool)
      .await
      .map_err(db_err)?;
    Ok(())
  }
}
