// orderflow-server/src/db/reversals.rs

use super::db_err;
use async_trait::async_trait;
use orderflow::model::ReversalRequest;
use orderflow::ports::ReversalStore;
use orderflow::Result;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgReversals {
  pool: PgPool,
}

impl PgReversals {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl ReversalStore for PgReversals {
  async fn insert(&self, request: &ReversalRequest) -> Result<()> {
    sqlx::query(
      "INSERT INTO reversal_requests (id, rma, order_id, kind, document, created_at)
       VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(request.id)
    .bind(&request.rma)
    .bind(request.order_id)
    .bind(request.kind.label())
    .bind(Json(request))
    .bind(request.created_at)
    .execute(&self.pool)
    .await
    .map_err(db_err)?;
    Ok(())
  }

  async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<ReversalRequest>> {
    let rows: Vec<(Json<ReversalRequest>,)> = sqlx::query_as(
      "SELECT document FROM reversal_requests WHERE order_id = $1 ORDER BY created_at",
    )
    .bind(order_id)
    .fetch_all(&self.pool)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(|(Json(request),)| request).collect())
  }
}
