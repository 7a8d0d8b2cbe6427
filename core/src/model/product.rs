use super::Amount;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A priced option of a product. A positive `price` overrides the product price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
  pub id: Uuid,
  pub name: String,
  pub price: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
  pub id: Uuid,
  pub seller_id: Uuid,
  pub name: String,
  pub price: Amount,
  pub sale_price: Option<Amount>,
  /// May go negative: stock is checked at checkout but decremented at settlement.
  pub stock: i32,
  /// Units sold across settled orders.
  pub total_sales: i64,
  pub is_active: bool,
  #[serde(default)]
  pub variants: Vec<Variant>,
}

impl Product {
  pub fn new(seller_id: Uuid, name: &str, price: Amount, stock: i32) -> Self {
    Self {
      id: Uuid::new_v4(),
      seller_id,
      name: name.to_string(),
      price,
      sale_price: None,
      stock,
      total_sales: 0,
      is_active: true,
      variants: Vec::new(),
    }
  }

  pub fn with_sale_price(mut self, sale_price: Amount) -> Self {
    self.sale_price = Some(sale_price);
    self
  }

  pub fn with_variant(mut self, variant: Variant) -> Self {
    self.variants.push(variant);
    self
  }

  pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> {
    self.variants.iter().find(|v| v.id == variant_id)
  }
}
