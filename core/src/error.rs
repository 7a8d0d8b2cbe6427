//! Error types for the engine, the store and the settlement pipeline.

use crate::model::{OrderStatus, PaymentStatus};
use crate::ports::gateway::GatewayError;
use thiserror::Error;
use uuid::Uuid;

/// Engine-level failures: mis-wired pipelines and dispatch problems.
#[derive(Debug, Error)]
pub enum FlowError {
  #[error("Step not found: {step_name}")]
  StepNotFound { step_name: String },

  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Type mismatch during context dispatch (expected {expected_type}, step: '{step_name}')")]
  TypeMismatch { step_name: String, expected_type: String },

  #[error("Configuration error for step '{step_name}': {message}")]
  ConfigurationError { step_name: String, message: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("record not found: {0}")]
  NotFound(String),

  #[error("unique constraint violated: {0}")]
  Conflict(String),

  #[error("storage backend failure: {0}")]
  Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Everything a settlement operation can reject or fail with.
#[derive(Debug, Error)]
pub enum MarketError {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("product {0} not found")]
  ProductNotFound(Uuid),

  #[error("insufficient stock for '{product_name}': requested {requested}, available {available} (short by {shortfall})")]
  InsufficientStock {
    product_id: Uuid,
    product_name: String,
    requested: i32,
    available: i32,
    shortfall: i32,
  },

  #[error("order {0} not found or already paid")]
  OrderNotFoundOrAlreadyPaid(Uuid),

  #[error("order {0} not found")]
  OrderNotFound(Uuid),

  #[error("no order carries payment reference '{0}'")]
  UnknownPaymentReference(String),

  #[error("webhook signature is invalid")]
  InvalidSignature,

  #[error("payment gateway error: {0}")]
  Gateway(#[from] GatewayError),

  #[error("insufficient balance: requested {requested}, available {available}")]
  InsufficientBalance { requested: i64, available: i64 },

  #[error("payout amount {requested} is below the minimum of {minimum}")]
  BelowMinimum { requested: i64, minimum: i64 },

  #[error("payout '{0}' not found")]
  PayoutNotFound(String),

  #[error("seller {0} not found")]
  SellerNotFound(Uuid),

  #[error("transfer for payout '{reference}' failed: {reason}")]
  TransferFailed { reference: String, reason: String },

  #[error("order cannot move from {from} to {to} while payment is {payment}")]
  InvalidTransition {
    from: OrderStatus,
    to: OrderStatus,
    payment: PaymentStatus,
  },

  #[error("storage error: {0}")]
  Store(#[from] StoreError),

  #[error("workflow error: {0}")]
  Flow(#[from] FlowError),
}

impl MarketError {
  /// Gateway failures may succeed when the caller tries again.
  pub fn is_retryable(&self) -> bool {
    matches!(self, MarketError::Gateway(_))
  }
}

pub type Result<T, E = MarketError> = std::result::Result<T, E>;
