// orderflow/src/model/catalog.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemVisibility {
  Draft,
  Published,
  Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackageDims {
  pub length_cm: Decimal,
  pub breadth_cm: Decimal,
  pub height_cm: Decimal,
}

/// One purchasable size of a catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeVariant {
  pub size: String,
  pub sku: String,
  pub regular_price: Decimal,
  #[serde(default)]
  pub sale_price: Decimal,
  pub stock: u32,
  #[serde(default)]
  pub weight_kg: Option<Decimal>,
  #[serde(default)]
  pub dims: Option<PackageDims>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
  pub id: String,
  pub name: String,
  pub visibility: ItemVisibility,
  pub sizes: Vec<SizeVariant>,
}

impl CatalogItem {
  pub fn is_purchasable(&self) -> bool {
    self.visibility == ItemVisibility::Published
  }

  /// Finds the variant a cart line refers to: SKU and size together first, then
  /// SKU alone, then size alone. Blank inputs never match.
  pub fn resolve_variant(&self, sku: &str, size: &str) -> Option<&SizeVariant> {
    let sku = sku.trim();
    let size = size.trim();
    let sku_eq = |v: &&SizeVariant| !sku.is_empty() && v.sku.eq_ignore_ascii_case(sku);
    let size_eq = |v: &&SizeVariant| !size.is_empty() && v.size.eq_ignore_ascii_case(size);

    self
      .sizes
      .iter()
      .find(|v| sku_eq(v) && size_eq(v))
      .or_else(|| self.sizes.iter().find(sku_eq))
      .or_else(|| self.sizes.iter().find(size_eq))
  }

  pub fn available_sizes(&self) -> Vec<String> {
    self.sizes.iter().map(|v| v.size.clone()).collect()
  }

  pub fn available_skus(&self) -> Vec<String> {
    self.sizes.iter().map(|v| v.sku.clone()).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn variant(size: &str, sku: &str) -> SizeVariant {
    SizeVariant {
      size: size.into(),
      sku: sku.into(),
      regular_price: Decimal::ONE_HUNDRED,
      sale_price: Decimal::ZERO,
      stock: 3,
      weight_kg: None,
      dims: None,
    }
  }

  #[test]
  fn resolution_falls_back_from_sku_and_size_to_sku_to_size() {
    let item = CatalogItem {
      id: "tee".into(),
      name: "Tee".into(),
      visibility: ItemVisibility::Published,
      sizes: vec![variant("S", "TEE-S"), variant("M", "TEE-M"), variant("L", "TEE-SHARED")],
    };

    assert_eq!(item.resolve_variant("TEE-M", "M").unwrap().size, "M");
    // stale size on the client, SKU still wins
    assert_eq!(item.resolve_variant("tee-m", "XL").unwrap().size, "M");
    // unknown SKU, size still resolves
    assert_eq!(item.resolve_variant("OLD-SKU", "l").unwrap().sku, "TEE-SHARED");
    assert!(item.resolve_variant("", "").is_none());
    assert!(item.resolve_variant("NOPE", "XXL").is_none());
  }
}
