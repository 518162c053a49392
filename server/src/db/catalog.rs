// orderflow-server/src/db/catalog.rs

use super::{db_err, variant_name};
use async_trait::async_trait;
use orderflow::model::{CatalogItem, ItemVisibility, SizeVariant};
use orderflow::ports::CatalogStore;
use orderflow::{OrderflowError, Result};
use sqlx::types::Json;
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct CatalogRow {
  id: String,
  name: String,
  visibility: String,
  sizes: Json<Vec<SizeVariant>>,
}

impl TryFrom<CatalogRow> for CatalogItem {
  type Error = OrderflowError;

  fn try_from(row: CatalogRow) -> Result<Self> {
    let visibility: ItemVisibility =
      serde_json::from_value(serde_json::Value::String(row.visibility)).map_err(OrderflowError::storage)?;
    Ok(CatalogItem {
      id: row.id,
      name: row.name,
      visibility,
      sizes: row.sizes.0,
    })
  }
}

#[derive(Clone)]
pub struct PgCatalog {
  pool: PgPool,
}

impl PgCatalog {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn upsert(&self, item: &CatalogItem) -> Result<()> {
    sqlx::query(
      "INSERT INTO catalog_items (id, name, visibility, sizes, updated_at)
       VALUES ($1, $2, $3, $4, now())
       ON CONFLICT (id) DO UPDATE SET
          name = $2, visibility = $3, sizes = $4, updated_at = now()",
    )
    .bind(&item.id)
    .bind(&item.name)
    .bind(variant_name(&item.visibility)?)
    .bind(Json(&item.sizes))
    .execute(&self.pool)
    .await
    .map_err(db_err)?;
    Ok(())
  }
}

#[async_trait]
impl CatalogStore for PgCatalog {
  async fn item(&self, item_id: &str) -> Result<Option<CatalogItem>> {
    let row: Option<CatalogRow> =
      sqlx::query_as("SELECT id, name, visibility, sizes FROM catalog_items WHERE id = $1")
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
    row.map(CatalogItem::try_from).transpose()
  }
}
