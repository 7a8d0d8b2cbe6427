//! Row shapes as stored, and their conversion into core records.

use bazaar::model::NotificationKind;
use bazaar::{
  Notification, Order, OrderItem, OrderOwner, Product, Seller, SellerPayout, ShippingAddress, StoreError, Variant,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Text columns hold the snake_case name of a core enum.
pub(crate) fn parse_text<T>(column: &str, raw: &str) -> Result<T, StoreError>
where
  T: FromStr<Err = String>,
{
  raw
    .parse::<T>()
    .map_err(|e| StoreError::Backend(anyhow::anyhow!("column '{}': {}", column, e)))
}

#[derive(Debug, FromRow)]
pub struct SellerRow {
  pub id: Uuid,
  pub user_id: Uuid,
  pub store_name: String,
  pub total_sales: i64,
  pub total_orders: i64,
}

impl From<SellerRow> for Seller {
  fn from(row: SellerRow) -> Self {
    Seller {
      id: row.id,
      user_id: row.user_id,
      store_name: row.store_name,
      total_sales: row.total_sales,
      total_orders: row.total_orders,
    }
  }
}

#[derive(Debug, FromRow)]
pub struct ProductRow {
  pub id: Uuid,
  pub seller_id: Uuid,
  pub name: String,
  pub price: i64,
  pub sale_price: Option<i64>,
  pub stock: i32,
  pub total_sales: i64,
  pub is_active: bool,
}

#[derive(Debug, FromRow)]
pub struct VariantRow {
  pub id: Uuid,
  pub product_id: Uuid,
  pub name: String,
  pub price: Option<i64>,
}

impl ProductRow {
  pub fn into_product(self, variants: Vec<Variant>) -> Product {
    Product {
      id: self.id,
      seller_id: self.seller_id,
      name: self.name,
      price: self.price,
      sale_price: self.sale_price,
      stock: self.stock,
      total_sales: self.total_sales,
      is_active: self.is_active,
      variants,
    }
  }
}

impl From<VariantRow> for Variant {
  fn from(row: VariantRow) -> Self {
    Variant {
      id: row.id,
      name: row.name,
      price: row.price,
    }
  }
}

#[derive(Debug, FromRow)]
pub struct OrderRow {
  pub id: Uuid,
  pub user_id: Option<Uuid>,
  pub is_guest: bool,
  pub shipping_address: Option<Json<ShippingAddress>>,
  pub subtotal: i64,
  pub discount: i64,
  pub shipping_cost: i64,
  pub tax: i64,
  pub total: i64,
  pub currency: String,
  pub status: String,
  pub payment_status: String,
  pub payment_reference: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct OrderItemRow {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub variant_id: Option<Uuid>,
  pub seller_id: Uuid,
  pub product_name: String,
  pub quantity: i32,
  pub unit_price: i64,
}

impl From<OrderItemRow> for OrderItem {
  fn from(row: OrderItemRow) -> Self {
    OrderItem {
      id: row.id,
      order_id: row.order_id,
      product_id: row.product_id,
      variant_id: row.variant_id,
      seller_id: row.seller_id,
      product_name: row.product_name,
      quantity: row.quantity,
      unit_price: row.unit_price,
    }
  }
}

impl OrderRow {
  pub fn into_order(self, items: Vec<OrderItem>) -> Result<Order, StoreError> {
    let shipping_address = self.shipping_address.map(|Json(address)| address);
    let owner = match (self.is_guest, self.user_id, shipping_address) {
      (false, Some(user_id), shipping_address) => OrderOwner::Authenticated {
        user_id,
        shipping_address,
      },
      (true, None, Some(shipping_address)) => OrderOwner::Guest { shipping_address },
      _ => {
        return Err(StoreError::Backend(anyhow::anyhow!(
          "order {} has an inconsistent owner",
          self.id
        )))
      }
    };
    Ok(Order {
      id: self.id,
      owner,
      items,
      subtotal: self.subtotal,
      discount: self.discount,
      shipping_cost: self.shipping_cost,
      tax: self.tax,
      total: self.total,
      currency: self.currency,
      status: parse_text("orders.status", &self.status)?,
      payment_status: parse_text("orders.payment_status", &self.payment_status)?,
      payment_reference: self.payment_reference,
      created_at: self.created_at,
      updated_at: self.updated_at,
    })
  }
}

#[derive(Debug, FromRow)]
pub struct PayoutRow {
  pub id: Uuid,
  pub seller_id: Uuid,
  pub amount: i64,
  pub currency: String,
  pub method: String,
  pub account_details: Json<serde_json::Value>,
  pub reference: String,
  pub status: String,
  pub external_transfer_id: Option<String>,
  pub failure_reason: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PayoutRow> for SellerPayout {
  type Error = StoreError;

  fn try_from(row: PayoutRow) -> Result<Self, Self::Error> {
    Ok(SellerPayout {
      id: row.id,
      seller_id: row.seller_id,
      amount: row.amount,
      currency: row.currency,
      method: parse_text("seller_payouts.method", &row.method)?,
      account_details: row.account_details.0,
      reference: row.reference,
      status: parse_text("seller_payouts.status", &row.status)?,
      external_transfer_id: row.external_transfer_id,
      failure_reason: row.failure_reason,
      created_at: row.created_at,
      updated_at: row.updated_at,
      completed_at: row.completed_at,
    })
  }
}

#[derive(Debug, FromRow)]
pub struct NotificationRow {
  pub id: Uuid,
  pub user_id: Uuid,
  pub kind: String,
  pub title: String,
  pub message: String,
  pub is_read: bool,
  pub created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
  type Error = StoreError;

  fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
    Ok(Notification {
      id: row.id,
      user_id: row.user_id,
      kind: parse_text::<NotificationKind>("notifications.kind", &row.kind)?,
      title: row.title,
      message: row.message,
      is_read: row.is_read,
      created_at: row.created_at,
    })
  }
}
