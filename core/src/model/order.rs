use super::{text_enum, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Confirmed,
  Processing,
  Shipped,
  Delivered,
  Cancelled,
  Returned,
}

text_enum!(OrderStatus {
  Pending => "pending",
  Confirmed => "confirmed",
  Processing => "processing",
  Shipped => "shipped",
  Delivered => "delivered",
  Cancelled => "cancelled",
  Returned => "returned",
});

impl OrderStatus {
  /// Only orders that have not left the pre-fulfilment states can take money.
  pub fn accepts_payment(&self) -> bool {
    matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
  }

  /// Fulfilment transitions an operator may request.
  ///
  /// Cancellation is only open before fulfilment starts and while no money has
  /// settled; returns only follow delivery.
  pub fn can_transition_to(&self, next: OrderStatus, payment: PaymentStatus) -> bool {
    use OrderStatus::*;
    match (*self, next) {
      (Pending, Confirmed) | (Confirmed, Processing) | (Processing, Shipped) | (Shipped, Delivered) => true,
      (Pending | Confirmed, Cancelled) => matches!(payment, PaymentStatus::Pending | PaymentStatus::Processing),
      (Delivered, Returned) => true,
      _ => false,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

text_enum!(PaymentStatus {
  Pending => "pending",
  Processing => "processing",
  Completed => "completed",
  Failed => "failed",
});

impl PaymentStatus {
  /// Whether a fresh payment attempt may be started from this state.
  pub fn accepts_new_attempt(&self) -> bool {
    matches!(self, PaymentStatus::Pending | PaymentStatus::Failed)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub phone: String,
  pub address: String,
  pub city: String,
  #[serde(default)]
  pub state: Option<String>,
  #[serde(default)]
  pub country: Option<String>,
}

impl ShippingAddress {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name.trim(), self.last_name.trim())
  }

  /// Names of the required guest fields that are empty.
  pub fn missing_fields(&self) -> Vec<&'static str> {
    [
      ("first_name", &self.first_name),
      ("last_name", &self.last_name),
      ("email", &self.email),
      ("phone", &self.phone),
      ("address", &self.address),
      ("city", &self.city),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect()
  }
}

/// Who an order belongs to. Exactly one identity per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderOwner {
  Authenticated {
    user_id: Uuid,
    #[serde(default)]
    shipping_address: Option<ShippingAddress>,
  },
  Guest { shipping_address: ShippingAddress },
}

impl OrderOwner {
  pub fn user_id(&self) -> Option<Uuid> {
    match self {
      OrderOwner::Authenticated { user_id, .. } => Some(*user_id),
      OrderOwner::Guest { .. } => None,
    }
  }

  pub fn is_guest(&self) -> bool {
    matches!(self, OrderOwner::Guest { .. })
  }

  pub fn shipping_address(&self) -> Option<&ShippingAddress> {
    match self {
      OrderOwner::Authenticated { shipping_address, .. } => shipping_address.as_ref(),
      OrderOwner::Guest { shipping_address } => Some(shipping_address),
    }
  }

  /// Whether `requester` may act on an order with this owner. Guest orders
  /// are reachable by anyone holding the order id.
  pub fn permits(&self, requester: Option<Uuid>) -> bool {
    match self {
      OrderOwner::Authenticated { user_id, .. } => requester == Some(*user_id),
      OrderOwner::Guest { .. } => true,
    }
  }
}

/// Line item frozen at checkout; never re-priced from the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub variant_id: Option<Uuid>,
  pub seller_id: Uuid,
  pub product_name: String,
  pub quantity: i32,
  pub unit_price: Amount,
}

impl OrderItem {
  pub fn line_total(&self) -> Amount {
    self.unit_price * Amount::from(self.quantity)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
  pub id: Uuid,
  pub owner: OrderOwner,
  pub items: Vec<OrderItem>,
  pub subtotal: Amount,
  pub discount: Amount,
  pub shipping_cost: Amount,
  pub tax: Amount,
  pub total: Amount,
  pub currency: String,
  pub status: OrderStatus,
  pub payment_status: PaymentStatus,
  pub payment_reference: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  /// Distinct sellers with goods in this order, in first-seen order.
  pub fn seller_ids(&self) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = Vec::new();
    for item in &self.items {
      if !ids.contains(&item.seller_id) {
        ids.push(item.seller_id);
      }
    }
    ids
  }
}
