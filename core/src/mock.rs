//! Deterministic gateways and a recording notifier.
//!
//! Every transaction the mock payment gateway initiates verifies as
//! successful unless a test scripts a different outcome for it.

use crate::model::{Amount, NewNotification, Order, PayoutMethod};
use crate::ports::gateway::{
  sign_payload, verify_payload_signature, GatewayError, GatewayPaymentStatus, GatewayTransferStatus, PaymentGateway,
  PaymentInitiation, PaymentLink, PaymentVerification, TransferGateway, TransferReceipt, TransferRequest,
};
use crate::ports::notify::Notifier;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;
use uuid::Uuid;

pub const MOCK_WEBHOOK_SECRET: &str = "mock-webhook-secret";

pub struct MockPaymentGateway {
  secret: String,
  fail_initiation: AtomicBool,
  next_tx: AtomicU64,
  initiations: Mutex<Vec<PaymentInitiation>>,
  /// Transaction id -> what `verify_payment` reports.
  verifications: Mutex<HashMap<String, PaymentVerification>>,
}

impl Default for MockPaymentGateway {
  fn default() -> Self {
    Self::new(MOCK_WEBHOOK_SECRET)
  }
}

impl MockPaymentGateway {
  pub fn new(webhook_secret: &str) -> Self {
    Self {
      secret: webhook_secret.to_string(),
      fail_initiation: AtomicBool::new(false),
      next_tx: AtomicU64::new(1),
      initiations: Mutex::new(Vec::new()),
      verifications: Mutex::new(HashMap::new()),
    }
  }

  /// While set, `initiate_payment` fails with a transport error.
  pub fn set_initiation_failure(&self, fail: bool) {
    self.fail_initiation.store(fail, Ordering::SeqCst);
  }

  /// Overrides what verifying `transaction_id` reports.
  pub fn script_verification(&self, transaction_id: &str, reference: &str, status: GatewayPaymentStatus, amount: Amount) {
    self.verifications.lock().insert(
      transaction_id.to_string(),
      PaymentVerification {
        transaction_id: transaction_id.to_string(),
        reference: reference.to_string(),
        status,
        amount,
        currency: "NGN".to_string(),
        customer_email: None,
      },
    );
  }

  /// Transaction id assigned when `reference` was initiated.
  pub fn transaction_for(&self, reference: &str) -> Option<String> {
    self
      .verifications
      .lock()
      .values()
      .find(|v| v.reference == reference)
      .map(|v| v.transaction_id.clone())
  }

  pub fn initiations(&self) -> Vec<PaymentInitiation> {
    self.initiations.lock().clone()
  }

  pub fn sign(&self, payload: &[u8]) -> String {
    sign_payload(&self.secret, payload)
  }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
  async fn initiate_payment(&self, request: &PaymentInitiation) -> Result<PaymentLink, GatewayError> {
    if self.fail_initiation.load(Ordering::SeqCst) {
      return Err(GatewayError::Transport("mock gateway offline".to_string()));
    }
    let transaction_id = format!("MOCKTX-{}", self.next_tx.fetch_add(1, Ordering::SeqCst));
    info!(reference = %request.reference, %transaction_id, amount = request.amount, "Mock payment initiated.");
    self.initiations.lock().push(request.clone());
    self.verifications.lock().insert(
      transaction_id.clone(),
      PaymentVerification {
        transaction_id: transaction_id.clone(),
        reference: request.reference.clone(),
        status: GatewayPaymentStatus::Successful,
        amount: request.amount,
        currency: request.currency.clone(),
        customer_email: Some(request.customer.email.clone()),
      },
    );
    Ok(PaymentLink {
      redirect_link: format!(
        "https://checkout.mock/pay/{}?transaction_id={}",
        request.reference, transaction_id
      ),
    })
  }

  async fn verify_payment(&self, transaction_id: &str) -> Result<PaymentVerification, GatewayError> {
    self
      .verifications
      .lock()
      .get(transaction_id)
      .cloned()
      .ok_or_else(|| GatewayError::Rejected(format!("No transaction found with id {}", transaction_id)))
  }

  fn verify_webhook_signature(&self, signature: &str, raw_payload: &[u8]) -> bool {
    verify_payload_signature(&self.secret, signature, raw_payload)
  }
}

pub struct MockTransferGateway {
  secret: String,
  next_transfer: AtomicU64,
  rejections: Mutex<HashMap<PayoutMethod, String>>,
  statuses: Mutex<HashMap<String, GatewayTransferStatus>>,
  requests: Mutex<Vec<(PayoutMethod, TransferRequest)>>,
}

impl Default for MockTransferGateway {
  fn default() -> Self {
    Self::new(MOCK_WEBHOOK_SECRET)
  }
}

impl MockTransferGateway {
  pub fn new(webhook_secret: &str) -> Self {
    Self {
      secret: webhook_secret.to_string(),
      next_transfer: AtomicU64::new(1),
      rejections: Mutex::new(HashMap::new()),
      statuses: Mutex::new(HashMap::new()),
      requests: Mutex::new(Vec::new()),
    }
  }

  /// Transfers via `method` are rejected with `reason` until cleared.
  pub fn reject(&self, method: PayoutMethod, reason: &str) {
    self.rejections.lock().insert(method, reason.to_string());
  }

  pub fn clear_rejections(&self) {
    self.rejections.lock().clear();
  }

  pub fn set_transfer_status(&self, transfer_id: &str, status: GatewayTransferStatus) {
    self.statuses.lock().insert(transfer_id.to_string(), status);
  }

  pub fn requests(&self) -> Vec<(PayoutMethod, TransferRequest)> {
    self.requests.lock().clone()
  }

  pub fn sign(&self, payload: &[u8]) -> String {
    sign_payload(&self.secret, payload)
  }

  fn submit(&self, method: PayoutMethod, request: &TransferRequest) -> Result<TransferReceipt, GatewayError> {
    self.requests.lock().push((method, request.clone()));
    if let Some(reason) = self.rejections.lock().get(&method) {
      return Err(GatewayError::Rejected(reason.clone()));
    }
    let transfer_id = format!("MOCKTRF-{}", self.next_transfer.fetch_add(1, Ordering::SeqCst));
    self
      .statuses
      .lock()
      .insert(transfer_id.clone(), GatewayTransferStatus::Pending);
    info!(reference = %request.reference, %transfer_id, %method, "Mock transfer queued.");
    Ok(TransferReceipt {
      transfer_id,
      status: GatewayTransferStatus::Pending,
    })
  }
}

#[async_trait]
impl TransferGateway for MockTransferGateway {
  async fn initiate_bank_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError> {
    self.submit(PayoutMethod::BankTransfer, request)
  }

  async fn initiate_mobile_money_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError> {
    self.submit(PayoutMethod::MobileMoney, request)
  }

  async fn transfer_status(&self, transfer_id: &str) -> Result<GatewayTransferStatus, GatewayError> {
    self
      .statuses
      .lock()
      .get(transfer_id)
      .cloned()
      .ok_or_else(|| GatewayError::Rejected(format!("unknown transfer {}", transfer_id)))
  }

  fn verify_webhook_signature(&self, signature: &str, raw_payload: &[u8]) -> bool {
    verify_payload_signature(&self.secret, signature, raw_payload)
  }
}

/// Keeps every notification in memory; can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
  failing: AtomicBool,
  created: Mutex<Vec<NewNotification>>,
  placed_orders: Mutex<Vec<Uuid>>,
}

impl RecordingNotifier {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  pub fn created(&self) -> Vec<NewNotification> {
    self.created.lock().clone()
  }

  pub fn created_for(&self, user_id: Uuid) -> Vec<NewNotification> {
    self
      .created
      .lock()
      .iter()
      .filter(|n| n.user_id == user_id)
      .cloned()
      .collect()
  }

  pub fn placed_orders(&self) -> Vec<Uuid> {
    self.placed_orders.lock().clone()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn create(&self, notification: NewNotification) -> anyhow::Result<()> {
    if self.failing.load(Ordering::SeqCst) {
      anyhow::bail!("notification sink unavailable");
    }
    self.created.lock().push(notification);
    Ok(())
  }

  async fn order_placed(&self, order: &Order) -> anyhow::Result<()> {
    if self.failing.load(Ordering::SeqCst) {
      anyhow::bail!("order workflow unavailable");
    }
    self.placed_orders.lock().push(order.id);
    Ok(())
  }
}
