use super::text_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
  OrderPlaced,
  NewOrder,
  PaymentSuccess,
  PaymentFailed,
  PayoutProcessing,
  PayoutCompleted,
  PayoutFailed,
}

text_enum!(NotificationKind {
  OrderPlaced => "order_placed",
  NewOrder => "new_order",
  PaymentSuccess => "payment_success",
  PaymentFailed => "payment_failed",
  PayoutProcessing => "payout_processing",
  PayoutCompleted => "payout_completed",
  PayoutFailed => "payout_failed",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
  pub user_id: Uuid,
  pub kind: NotificationKind,
  pub title: String,
  pub message: String,
}

impl NewNotification {
  pub fn new(user_id: Uuid, kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      user_id,
      kind,
      title: title.into(),
      message: message.into(),
    }
  }
}

/// Stored notification; only `is_read` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub id: Uuid,
  pub user_id: Uuid,
  pub kind: NotificationKind,
  pub title: String,
  pub message: String,
  pub is_read: bool,
  pub created_at: DateTime<Utc>,
}

impl Notification {
  pub fn from_new(new: NewNotification) -> Self {
    Self {
      id: Uuid::new_v4(),
      user_id: new.user_id,
      kind: new.kind,
      title: new.title,
      message: new.message,
      is_read: false,
      created_at: Utc::now(),
    }
  }
}
