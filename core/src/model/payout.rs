use super::{text_enum, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
  BankTransfer,
  MobileMoney,
}

text_enum!(PayoutMethod {
  BankTransfer => "bank_transfer",
  MobileMoney => "mobile_money",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

text_enum!(PayoutStatus {
  Pending => "pending",
  Processing => "processing",
  Completed => "completed",
  Failed => "failed",
});

impl PayoutStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, PayoutStatus::Completed | PayoutStatus::Failed)
  }

  /// Failed payouts hand the money back to the seller's balance.
  pub fn holds_funds(&self) -> bool {
    !matches!(self, PayoutStatus::Failed)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerPayout {
  pub id: Uuid,
  pub seller_id: Uuid,
  pub amount: Amount,
  pub currency: String,
  pub method: PayoutMethod,
  /// Bank or wallet details, passed through to the transfer gateway untouched.
  pub account_details: serde_json::Value,
  /// Our reference, echoed back by transfer webhooks.
  pub reference: String,
  pub status: PayoutStatus,
  pub external_transfer_id: Option<String>,
  pub failure_reason: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}
