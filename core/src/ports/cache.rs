/// Prefix shared by every cached product listing.
pub const CATALOG_LISTING_PREFIX: &str = "catalog:";

pub fn product_cache_key(product_id: uuid::Uuid) -> String {
  format!("product:{}", product_id)
}

/// Cache-aside store for catalog reads, invalidated explicitly by writers.
pub trait CatalogCache: Send + Sync {
  fn get(&self, key: &str) -> Option<serde_json::Value>;

  fn put(&self, key: &str, value: serde_json::Value);

  /// Drops every entry whose key starts with `key_prefix`; returns how many.
  fn invalidate(&self, key_prefix: &str) -> usize;
}
