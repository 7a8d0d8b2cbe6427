//! Domain records moved through the settlement pipeline.

/// Amounts are integer minor units of `currency` throughout.
pub type Amount = i64;

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum stored as text.
macro_rules! text_enum {
  ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
    impl $name {
      pub fn as_str(&self) -> &'static str {
        match self {
          $($name::$variant => $text),+
        }
      }
    }

    impl std::fmt::Display for $name {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl std::str::FromStr for $name {
      type Err = String;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
          $($text => Ok($name::$variant),)+
          other => Err(format!("unknown {} '{}'", stringify!($name), other)),
        }
      }
    }
  };
}

pub(crate) use text_enum;

pub mod notification;
pub mod order;
pub mod payout;
pub mod product;
pub mod seller;

pub use notification::{NewNotification, Notification, NotificationKind};
pub use order::{Order, OrderItem, OrderOwner, OrderStatus, PaymentStatus, ShippingAddress};
pub use payout::{PayoutMethod, PayoutStatus, SellerPayout};
pub use product::{Product, Variant};
pub use seller::{Seller, SellerBalance};
