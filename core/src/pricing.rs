//! Authoritative unit prices and order totals.
//!
//! Used when an order is assembled; the result is frozen into each
//! `OrderItem` and never recomputed from the live catalog afterwards.

use crate::model::{Amount, Product};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unit price after variant override and sale price.
///
/// A variant with a positive price replaces the product price; a positive
/// sale price then applies only if it is lower than whatever base was chosen.
pub fn resolve_unit_price(product: &Product, variant_id: Option<Uuid>) -> Amount {
  let mut base = product.price;

  if let Some(variant_price) = variant_id
    .and_then(|id| product.variant(id))
    .and_then(|variant| variant.price)
    .filter(|price| *price > 0)
  {
    base = variant_price;
  }

  match product.sale_price {
    Some(sale) if sale > 0 && sale < base => sale,
    _ => base,
  }
}

/// Line total for `quantity` units.
pub fn resolve_price(product: &Product, variant_id: Option<Uuid>, quantity: i32) -> Amount {
  resolve_unit_price(product, variant_id) * Amount::from(quantity)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
  pub subtotal: Amount,
  pub discount: Amount,
  pub shipping_cost: Amount,
  pub tax: Amount,
  pub total: Amount,
}

impl OrderTotals {
  pub fn compute(subtotal: Amount, discount: Amount, shipping_cost: Amount, tax: Amount) -> Self {
    Self {
      subtotal,
      discount,
      shipping_cost,
      tax,
      total: subtotal - discount + shipping_cost + tax,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Variant;

  fn product(price: Amount) -> Product {
    Product::new(Uuid::new_v4(), "Ankara tote", price, 10)
  }

  fn variant(price: Amount) -> Variant {
    Variant {
      id: Uuid::new_v4(),
      name: "Large".to_string(),
      price: Some(price),
    }
  }

  #[test]
  fn base_price_times_quantity() {
    assert_eq!(resolve_price(&product(1000), None, 2), 2000);
  }

  #[test]
  fn sale_price_undercuts_base() {
    let p = product(1000).with_sale_price(800);
    assert_eq!(resolve_price(&p, None, 1), 800);
  }

  #[test]
  fn variant_overrides_base() {
    let v = variant(1200);
    let vid = v.id;
    let p = product(1000).with_variant(v);
    assert_eq!(resolve_price(&p, Some(vid), 1), 1200);
  }

  #[test]
  fn sale_price_undercuts_variant() {
    let v = variant(1200);
    let vid = v.id;
    let p = product(1000).with_variant(v).with_sale_price(700);
    assert_eq!(resolve_price(&p, Some(vid), 1), 700);
  }

  #[test]
  fn cheaper_variant_beats_sale_price() {
    let v = variant(800);
    let vid = v.id;
    let p = product(1000).with_variant(v).with_sale_price(900);
    assert_eq!(resolve_price(&p, Some(vid), 1), 800);
  }

  #[test]
  fn sale_price_never_raises_price() {
    let p = product(1000).with_sale_price(1500);
    assert_eq!(resolve_unit_price(&p, None), 1000);
  }

  #[test]
  fn unknown_or_unpriced_variant_falls_back_to_product_price() {
    let unpriced = Variant {
      id: Uuid::new_v4(),
      name: "Default".to_string(),
      price: Some(0),
    };
    let vid = unpriced.id;
    let p = product(1000).with_variant(unpriced);
    assert_eq!(resolve_unit_price(&p, Some(vid)), 1000);
    assert_eq!(resolve_unit_price(&p, Some(Uuid::new_v4())), 1000);
  }

  #[test]
  fn totals_apply_discount_shipping_and_tax() {
    assert_eq!(OrderTotals::compute(5000, 0, 1500, 0).total, 6500);
    assert_eq!(OrderTotals::compute(5000, 500, 1500, 0).total, 6000);
    assert_eq!(OrderTotals::compute(5000, 0, 2000, 0).total, 7000);
    assert_eq!(OrderTotals::compute(5000, 0, 1500, 375).total, 6875);
  }
}
