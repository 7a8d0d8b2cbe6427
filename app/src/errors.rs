use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use bazaar::MarketError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration Error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error(transparent)]
  Market(#[from] MarketError),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    AppError::Internal(err.to_string())
  }
}

impl AppError {
  fn market_status(err: &MarketError) -> StatusCode {
    match err {
      MarketError::Validation(_) | MarketError::BelowMinimum { .. } | MarketError::InvalidTransition { .. } => {
        StatusCode::BAD_REQUEST
      }
      MarketError::InsufficientStock { .. } | MarketError::InsufficientBalance { .. } => StatusCode::CONFLICT,
      MarketError::ProductNotFound(_)
      | MarketError::OrderNotFound(_)
      | MarketError::OrderNotFoundOrAlreadyPaid(_)
      | MarketError::UnknownPaymentReference(_)
      | MarketError::PayoutNotFound(_)
      | MarketError::SellerNotFound(_) => StatusCode::NOT_FOUND,
      MarketError::InvalidSignature => StatusCode::UNAUTHORIZED,
      MarketError::Gateway(_) => StatusCode::SERVICE_UNAVAILABLE,
      MarketError::TransferFailed { .. } => StatusCode::BAD_GATEWAY,
      MarketError::Store(bazaar::StoreError::Conflict(_)) => StatusCode::CONFLICT,
      MarketError::Store(_) | MarketError::Flow(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Message safe to show a client; internals stay in the logs.
  fn public_message(&self) -> String {
    match self {
      AppError::Validation(m) | AppError::Auth(m) | AppError::Forbidden(m) => m.clone(),
      AppError::Market(MarketError::Gateway(_)) => "Payment service unavailable, please retry".to_string(),
      AppError::Market(MarketError::Store(bazaar::StoreError::Conflict(_))) => {
        "Request conflicts with an existing record".to_string()
      }
      AppError::Market(MarketError::Store(_) | MarketError::Flow(_)) => "An internal error occurred".to_string(),
      AppError::Market(err) => err.to_string(),
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Migrate(_) | AppError::Internal(_) => {
        "An internal error occurred".to_string()
      }
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::Market(err) => Self::market_status(err),
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Migrate(_) | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Request rejected");
    }
    let mut body = json!({ "error": self.public_message() });
    if let AppError::Market(err) = self {
      body["retryable"] = json!(err.is_retryable());
      match err {
        MarketError::InsufficientStock {
          product_id,
          requested,
          available,
          ..
        } => {
          body["product_id"] = json!(product_id);
          body["requested"] = json!(requested);
          body["available"] = json!(available);
        }
        MarketError::InsufficientBalance { requested, available } => {
          body["requested"] = json!(requested);
          body["available"] = json!(available);
        }
        _ => {}
      }
    }
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
