//! Flutterwave v3 REST client for checkout links, verification and payouts.

use async_trait::async_trait;
use bazaar::ports::gateway::{verify_payload_signature, wire};
use bazaar::ports::{
  GatewayError, GatewayPaymentStatus, GatewayTransferStatus, PaymentGateway, PaymentInitiation, PaymentLink,
  PaymentVerification, TransferGateway, TransferReceipt, TransferRequest,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
  status: String,
  #[serde(default)]
  message: Option<String>,
  data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LinkData {
  link: String,
}

#[derive(Debug, Deserialize)]
struct CustomerData {
  #[serde(default)]
  email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
  id: Value,
  tx_ref: String,
  status: String,
  amount: Value,
  currency: String,
  #[serde(default)]
  customer: Option<CustomerData>,
}

#[derive(Debug, Deserialize)]
struct TransferData {
  id: Value,
  status: String,
  #[serde(default)]
  complete_message: Option<String>,
}

#[derive(Clone)]
pub struct FlutterwaveClient {
  http: reqwest::Client,
  base_url: String,
  secret_key: String,
  webhook_secret: String,
}

impl FlutterwaveClient {
  pub fn new(base_url: &str, secret_key: &str, webhook_secret: &str) -> Result<Self, GatewayError> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| GatewayError::Transport(e.to_string()))?;
    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      secret_key: secret_key.to_string(),
      webhook_secret: webhook_secret.to_string(),
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, GatewayError> {
    let response = request
      .bearer_auth(&self.secret_key)
      .send()
      .await
      .map_err(|e| GatewayError::Transport(e.to_string()))?;
    let status = response.status();
    let body = response
      .bytes()
      .await
      .map_err(|e| GatewayError::Transport(e.to_string()))?;
    if status.is_server_error() {
      return Err(GatewayError::Transport(format!("HTTP {}", status)));
    }
    unwrap_envelope(&body)
  }

  async fn transfer(&self, request: &TransferRequest, body: Value) -> Result<TransferReceipt, GatewayError> {
    let data: TransferData = self.send(self.http.post(self.url("transfers")).json(&body)).await?;
    let transfer_id = wire::id_to_string(&data.id)
      .ok_or_else(|| GatewayError::Malformed("transfer response without id".to_string()))?;
    debug!(reference = %request.reference, %transfer_id, "Transfer queued.");
    Ok(TransferReceipt {
      transfer_id,
      status: GatewayTransferStatus::from_wire(&data.status, data.complete_message.as_deref()),
    })
  }
}

/// Unpacks `{"status": "success", "data": ...}`; anything else is a rejection.
fn unwrap_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
  let envelope: ApiResponse<T> =
    serde_json::from_slice(body).map_err(|e| GatewayError::Malformed(e.to_string()))?;
  if !envelope.status.eq_ignore_ascii_case("success") {
    let message = envelope.message.unwrap_or_else(|| "request was not successful".to_string());
    return Err(GatewayError::Rejected(message));
  }
  envelope
    .data
    .ok_or_else(|| GatewayError::Malformed("response without data".to_string()))
}

fn payment_body(request: &PaymentInitiation) -> Value {
  json!({
    "tx_ref": request.reference,
    "amount": wire::to_major(request.amount, &request.currency),
    "currency": request.currency,
    "redirect_url": request.redirect_url,
    "customer": {
      "email": request.customer.email,
      "name": request.customer.name,
      "phonenumber": request.customer.phone,
    },
    "meta": request.meta,
  })
}

fn transfer_body(request: &TransferRequest, extra: Value) -> Value {
  let mut body = json!({
    "amount": wire::to_major(request.amount, &request.currency),
    "currency": request.currency,
    "narration": request.narration,
    "reference": request.reference,
    "debit_currency": request.currency,
  });
  if let Some(callback) = &request.callback_url {
    body["callback_url"] = json!(callback);
  }
  if let (Value::Object(target), Value::Object(fields)) = (&mut body, extra) {
    target.extend(fields);
  }
  body
}

#[async_trait]
impl PaymentGateway for FlutterwaveClient {
  #[instrument(name = "flutterwave::initiate_payment", skip_all, fields(reference = %request.reference), err(Display))]
  async fn initiate_payment(&self, request: &PaymentInitiation) -> Result<PaymentLink, GatewayError> {
    let body = payment_body(request);
    let data: LinkData = self.send(self.http.post(self.url("payments")).json(&body)).await?;
    Ok(PaymentLink { redirect_link: data.link })
  }

  #[instrument(name = "flutterwave::verify_payment", skip(self), err(Display))]
  async fn verify_payment(&self, transaction_id: &str) -> Result<PaymentVerification, GatewayError> {
    let path = format!("transactions/{}/verify", transaction_id);
    let data: TransactionData = self.send(self.http.get(self.url(&path))).await?;
    let amount = wire::amount_from(&data.amount, &data.currency)
      .ok_or_else(|| GatewayError::Malformed("transaction amount missing".to_string()))?;
    Ok(PaymentVerification {
      transaction_id: wire::id_to_string(&data.id).unwrap_or_else(|| transaction_id.to_string()),
      reference: data.tx_ref,
      status: GatewayPaymentStatus::from_wire(&data.status),
      amount,
      currency: data.currency,
      customer_email: data.customer.and_then(|c| c.email),
    })
  }

  fn verify_webhook_signature(&self, signature: &str, raw_payload: &[u8]) -> bool {
    let valid = verify_payload_signature(&self.webhook_secret, signature, raw_payload);
    if !valid {
      warn!("Payment webhook signature mismatch.");
    }
    valid
  }
}

#[async_trait]
impl TransferGateway for FlutterwaveClient {
  #[instrument(name = "flutterwave::bank_transfer", skip_all, fields(reference = %request.reference), err(Display))]
  async fn initiate_bank_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError> {
    let details = &request.account_details;
    let body = transfer_body(
      request,
      json!({
        "account_bank": details.get("bank_code").or_else(|| details.get("account_bank")),
        "account_number": details.get("account_number"),
        "beneficiary_name": details.get("account_name"),
      }),
    );
    self.transfer(request, body).await
  }

  #[instrument(name = "flutterwave::mobile_money_transfer", skip_all, fields(reference = %request.reference), err(Display))]
  async fn initiate_mobile_money_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError> {
    let details = &request.account_details;
    let body = transfer_body(
      request,
      json!({
        "account_bank": details.get("network").or_else(|| details.get("provider")),
        "account_number": details.get("phone_number").or_else(|| details.get("mobile_number")),
        "beneficiary_name": details.get("account_name"),
      }),
    );
    self.transfer(request, body).await
  }

  #[instrument(name = "flutterwave::transfer_status", skip(self), err(Display))]
  async fn transfer_status(&self, transfer_id: &str) -> Result<GatewayTransferStatus, GatewayError> {
    let path = format!("transfers/{}", transfer_id);
    let data: TransferData = self.send(self.http.get(self.url(&path))).await?;
    Ok(GatewayTransferStatus::from_wire(&data.status, data.complete_message.as_deref()))
  }

  fn verify_webhook_signature(&self, signature: &str, raw_payload: &[u8]) -> bool {
    verify_payload_signature(&self.webhook_secret, signature, raw_payload)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn error_envelopes_become_rejections_with_the_gateway_message() {
    let body = br#"{"status":"error","message":"Invalid account number","data":null}"#;
    match unwrap_envelope::<TransferData>(body) {
      Err(GatewayError::Rejected(message)) => assert_eq!(message, "Invalid account number"),
      other => panic!("expected rejection, got {:?}", other.map(|d| d.status)),
    }
  }

  #[test]
  fn verify_response_parses_numeric_ids_and_amounts() {
    let body = br#"{"status":"success","message":"ok","data":{"id":4412,"tx_ref":"ORD-a-b","status":"successful","amount":65.5,"currency":"NGN","customer":{"email":"ada@example.com"}}}"#;
    let data: TransactionData = unwrap_envelope(body).unwrap();
    assert_eq!(wire::id_to_string(&data.id).as_deref(), Some("4412"));
    assert_eq!(wire::amount_from(&data.amount, &data.currency), Some(6550));
    assert_eq!(GatewayPaymentStatus::from_wire(&data.status), GatewayPaymentStatus::Successful);
  }

  #[test]
  fn transfer_body_merges_destination_fields() {
    let request = TransferRequest {
      reference: "PAYOUT-1".into(),
      amount: 2000,
      currency: "NGN".into(),
      account_details: json!({}),
      narration: "Payout".into(),
      callback_url: Some("https://shop.test/api/v1/webhooks/transfers".into()),
    };
    let body = transfer_body(&request, json!({"account_bank": "044", "account_number": "0690000031"}));
    assert_eq!(body["account_bank"], "044");
    assert_eq!(body["reference"], "PAYOUT-1");
    assert_eq!(body["callback_url"], "https://shop.test/api/v1/webhooks/transfers");
    assert_eq!(body["amount"], json!(20.0));
  }

  #[test]
  fn checkout_body_quotes_major_units() {
    let request = PaymentInitiation {
      reference: "ORD-a-b".into(),
      amount: 11_550,
      currency: "NGN".into(),
      customer: bazaar::ports::PaymentCustomer {
        email: "ada@example.com".into(),
        name: None,
        phone: None,
      },
      redirect_url: "https://shop.test/api/v1/payments/verify".into(),
      meta: json!({}),
    };
    let body = payment_body(&request);
    assert_eq!(body["amount"], json!(115.5));
    assert_eq!(body["tx_ref"], "ORD-a-b");
  }
}
