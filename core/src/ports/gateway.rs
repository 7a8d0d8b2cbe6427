//! Payment and transfer gateway contracts.
//!
//! Webhook bodies follow the processor's charge/transfer event shape
//! (`{"event": ..., "data": {...}}`); parsing lives on the traits so an
//! adapter for a different processor can override it.

use crate::model::Amount;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("gateway unreachable: {0}")]
  Transport(String),

  #[error("gateway rejected the request: {0}")]
  Rejected(String),

  #[error("unexpected gateway response: {0}")]
  Malformed(String),
}

impl GatewayError {
  /// The gateway's own wording, without our prefix.
  pub fn message(&self) -> &str {
    match self {
      GatewayError::Transport(m) | GatewayError::Rejected(m) | GatewayError::Malformed(m) => m,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCustomer {
  pub email: String,
  pub name: Option<String>,
  pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiation {
  pub reference: String,
  pub amount: Amount,
  pub currency: String,
  pub customer: PaymentCustomer,
  pub redirect_url: String,
  pub meta: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
  pub redirect_link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayPaymentStatus {
  Successful,
  Failed,
  /// Still awaiting the customer; settlement leaves the order untouched.
  Pending,
}

impl GatewayPaymentStatus {
  pub fn from_wire(status: &str) -> Self {
    match status.to_ascii_lowercase().as_str() {
      "successful" | "success" | "completed" => GatewayPaymentStatus::Successful,
      "pending" | "processing" | "new" => GatewayPaymentStatus::Pending,
      _ => GatewayPaymentStatus::Failed,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerification {
  pub transaction_id: String,
  /// Our order payment reference, echoed back by the gateway.
  pub reference: String,
  pub status: GatewayPaymentStatus,
  pub amount: Amount,
  pub currency: String,
  pub customer_email: Option<String>,
}

/// A charge event delivered by webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
  pub event: String,
  pub reference: String,
  pub transaction_id: Option<String>,
  pub status: GatewayPaymentStatus,
  pub amount: Option<Amount>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn initiate_payment(&self, request: &PaymentInitiation) -> Result<PaymentLink, GatewayError>;

  async fn verify_payment(&self, transaction_id: &str) -> Result<PaymentVerification, GatewayError>;

  fn verify_webhook_signature(&self, signature: &str, raw_payload: &[u8]) -> bool;

  fn parse_payment_event(&self, raw_payload: &[u8]) -> Result<PaymentEvent, GatewayError> {
    wire::parse_charge_event(raw_payload)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
  /// The payout reference; transfer webhooks echo it back.
  pub reference: String,
  pub amount: Amount,
  pub currency: String,
  pub account_details: serde_json::Value,
  pub narration: String,
  pub callback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayTransferStatus {
  Pending,
  Successful,
  Failed { reason: String },
}

impl GatewayTransferStatus {
  pub fn from_wire(status: &str, message: Option<&str>) -> Self {
    match status.to_ascii_uppercase().as_str() {
      "SUCCESSFUL" | "SUCCESS" | "COMPLETED" => GatewayTransferStatus::Successful,
      "FAILED" | "REVERSED" | "CANCELLED" => GatewayTransferStatus::Failed {
        reason: message.unwrap_or("transfer failed").to_string(),
      },
      _ => GatewayTransferStatus::Pending,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
  pub transfer_id: String,
  pub status: GatewayTransferStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
  pub event: String,
  pub reference: String,
  pub transfer_id: Option<String>,
  pub status: GatewayTransferStatus,
}

#[async_trait]
pub trait TransferGateway: Send + Sync {
  async fn initiate_bank_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError>;

  async fn initiate_mobile_money_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError>;

  async fn transfer_status(&self, transfer_id: &str) -> Result<GatewayTransferStatus, GatewayError>;

  fn verify_webhook_signature(&self, signature: &str, raw_payload: &[u8]) -> bool;

  fn parse_transfer_event(&self, raw_payload: &[u8]) -> Result<TransferEvent, GatewayError> {
    wire::parse_transfer_event(raw_payload)
  }
}

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
  // HMAC accepts keys of any length, so construction cannot fail.
  let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
    Ok(mac) => mac,
    Err(_) => return String::new(),
  };
  mac.update(payload);
  hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature produced by `sign_payload`.
pub fn verify_payload_signature(secret: &str, signature: &str, payload: &[u8]) -> bool {
  if secret.is_empty() {
    return false;
  }
  let Ok(expected) = hex::decode(signature.trim()) else {
    return false;
  };
  let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
    return false;
  };
  mac.update(payload);
  mac.verify_slice(&expected).is_ok()
}

pub mod wire {
  //! Charge and transfer webhook bodies.

  use super::{GatewayError, GatewayPaymentStatus, GatewayTransferStatus, PaymentEvent, TransferEvent};
  use crate::model::Amount;
  use serde::Deserialize;
  use serde_json::Value;

  #[derive(Debug, Deserialize)]
  struct Envelope<D> {
    #[serde(default)]
    event: String,
    data: D,
  }

  #[derive(Debug, Deserialize)]
  struct ChargeData {
    #[serde(default)]
    id: Option<Value>,
    tx_ref: String,
    status: String,
    #[serde(default)]
    amount: Option<Value>,
    #[serde(default)]
    currency: Option<String>,
  }

  #[derive(Debug, Deserialize)]
  struct TransferData {
    #[serde(default)]
    id: Option<Value>,
    reference: String,
    status: String,
    #[serde(default)]
    complete_message: Option<String>,
  }

  /// Ids arrive as numbers or strings depending on the event.
  pub fn id_to_string(value: &Value) -> Option<String> {
    match value {
      Value::String(s) if !s.is_empty() => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    }
  }

  /// Decimal places between the currency's major and minor unit.
  pub fn minor_unit_exponent(currency: &str) -> i32 {
    match currency.trim().to_ascii_uppercase().as_str() {
      "BIF" | "CLP" | "DJF" | "GNF" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "UGX" | "VND" | "VUV" | "XAF" | "XOF"
      | "XPF" => 0,
      _ => 2,
    }
  }

  /// The processor quotes amounts in major units; ours are minor units.
  pub fn to_major(amount: Amount, currency: &str) -> Value {
    let exponent = minor_unit_exponent(currency);
    if exponent == 0 {
      return Value::from(amount);
    }
    serde_json::Number::from_f64(amount as f64 / 10f64.powi(exponent))
      .map(Value::Number)
      .unwrap_or(Value::Null)
  }

  /// Major-unit amount from the processor, rounded to the nearest minor unit.
  pub fn amount_from(value: &Value, currency: &str) -> Option<Amount> {
    let major = match value {
      Value::Number(n) => n.as_f64()?,
      Value::String(s) => s.trim().parse::<f64>().ok()?,
      _ => return None,
    };
    let minor = (major * 10f64.powi(minor_unit_exponent(currency))).round();
    (minor.is_finite() && minor.abs() < i64::MAX as f64).then_some(minor as Amount)
  }

  pub fn parse_charge_event(raw: &[u8]) -> Result<PaymentEvent, GatewayError> {
    let envelope: Envelope<ChargeData> =
      serde_json::from_slice(raw).map_err(|e| GatewayError::Malformed(format!("charge event: {}", e)))?;
    Ok(PaymentEvent {
      event: envelope.event,
      reference: envelope.data.tx_ref,
      transaction_id: envelope.data.id.as_ref().and_then(id_to_string),
      status: GatewayPaymentStatus::from_wire(&envelope.data.status),
      amount: envelope
        .data
        .amount
        .as_ref()
        .and_then(|amount| amount_from(amount, envelope.data.currency.as_deref().unwrap_or_default())),
    })
  }

  pub fn parse_transfer_event(raw: &[u8]) -> Result<TransferEvent, GatewayError> {
    let envelope: Envelope<TransferData> =
      serde_json::from_slice(raw).map_err(|e| GatewayError::Malformed(format!("transfer event: {}", e)))?;
    Ok(TransferEvent {
      event: envelope.event,
      reference: envelope.data.reference,
      transfer_id: envelope.data.id.as_ref().and_then(id_to_string),
      status: GatewayTransferStatus::from_wire(&envelope.data.status, envelope.data.complete_message.as_deref()),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn signature_round_trips_and_rejects_tampering() {
    let payload = br#"{"event":"charge.completed"}"#;
    let signature = sign_payload("whsec_test", payload);
    assert!(verify_payload_signature("whsec_test", &signature, payload));
    assert!(!verify_payload_signature("whsec_other", &signature, payload));
    assert!(!verify_payload_signature("whsec_test", &signature, br#"{"event":"charge.failed"}"#));
    assert!(!verify_payload_signature("whsec_test", "not-hex", payload));
    assert!(!verify_payload_signature("", &signature, payload));
  }

  #[test]
  fn charge_event_parses_numeric_ids_and_statuses() {
    let raw = br#"{"event":"charge.completed","data":{"id":285959875,"tx_ref":"ORD-1","status":"successful","amount":55,"currency":"NGN"}}"#;
    let event = wire::parse_charge_event(raw).expect("parse");
    assert_eq!(event.reference, "ORD-1");
    assert_eq!(event.transaction_id.as_deref(), Some("285959875"));
    assert_eq!(event.status, GatewayPaymentStatus::Successful);
    assert_eq!(event.amount, Some(5500));
  }

  #[test]
  fn major_amounts_round_to_minor_units() {
    assert_eq!(wire::amount_from(&serde_json::json!(19.99), "NGN"), Some(1999));
    assert_eq!(wire::amount_from(&serde_json::json!("2500.5"), "ngn"), Some(250050));
    assert_eq!(wire::amount_from(&serde_json::json!(1500), "UGX"), Some(1500));
    assert_eq!(wire::amount_from(&serde_json::json!(true), "NGN"), None);
    assert_eq!(wire::to_major(5550, "NGN"), serde_json::json!(55.5));
    assert_eq!(wire::to_major(1500, "UGX"), serde_json::json!(1500));
  }

  #[test]
  fn transfer_event_carries_failure_message() {
    let raw = br#"{"event":"transfer.completed","data":{"id":"190626","reference":"PAYOUT-1","status":"FAILED","complete_message":"Insufficient funds in customer wallet"}}"#;
    let event = wire::parse_transfer_event(raw).expect("parse");
    assert_eq!(event.reference, "PAYOUT-1");
    assert_eq!(
      event.status,
      GatewayTransferStatus::Failed {
        reason: "Insufficient funds in customer wallet".to_string()
      }
    );
  }

  #[test]
  fn malformed_event_is_rejected() {
    assert!(matches!(
      wire::parse_charge_event(b"not json"),
      Err(GatewayError::Malformed(_))
    ));
  }
}
