//! Request identity. Authentication happens upstream; the caller's user id
//! arrives in the `X-User-ID` header.

use crate::errors::AppError;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "verif-hash";

fn user_from_header(req: &HttpRequest) -> Result<Option<Uuid>, AppError> {
  let Some(raw) = req.headers().get(USER_ID_HEADER) else {
    return Ok(None);
  };
  raw
    .to_str()
    .ok()
    .and_then(|value| Uuid::parse_str(value.trim()).ok())
    .map(Some)
    .ok_or_else(|| {
      warn!("Malformed X-User-ID header.");
      AppError::Auth("X-User-ID header is not a valid user id".to_string())
    })
}

/// A signed-in caller; requests without one are rejected.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(user_from_header(req).and_then(|user| {
      user
        .map(|user_id| AuthenticatedUser { user_id })
        .ok_or_else(|| AppError::Auth("User authentication required".to_string()))
    }))
  }
}

/// A caller who may be a guest.
#[derive(Debug, Clone, Copy)]
pub struct Requester(pub Option<Uuid>);

impl FromRequest for Requester {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(user_from_header(req).map(Requester))
  }
}

/// Gateway signature from the webhook headers; empty when absent so the
/// pipeline rejects it as an invalid signature.
pub fn webhook_signature(req: &HttpRequest) -> String {
  req
    .headers()
    .get(WEBHOOK_SIGNATURE_HEADER)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default()
    .to_string()
}
