use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Server-assigned order identifier, e.g. `ORD1718000000000123`.
pub type OrderId = String;
pub type UserId = i64;
pub type ItemId = i64;

/// Where an order sits in its lifecycle.
///
/// # Intuition
/// - An order starts at `PendingSellerConfirmation` when a buyer presses "buy".
/// - The seller either confirms it (`Confirmed`) or rejects it (`Cancelled`).
/// - Buyer and seller then mark the hand-over complete independently. The first
///   one to do so moves the order to `AwaitingMutualCompletion`; the second one
///   lands it on `Completed`.
///
/// Status only moves forward, except for the jump to `Cancelled`, which is
/// possible from any non-terminal status.
///
/// On the wire the status is the integer code (`0..=4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OrderStatus {
    PendingSellerConfirmation,
    Confirmed,
    AwaitingMutualCompletion,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn code(self) -> u8 {
        match self {
            OrderStatus::PendingSellerConfirmation => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::AwaitingMutualCompletion => 2,
            OrderStatus::Completed => 3,
            OrderStatus::Cancelled => 4,
        }
    }

    /// `Completed` and `Cancelled` accept no further status changes.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl TryFrom<u8> for OrderStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(OrderStatus::PendingSellerConfirmation),
            1 => Ok(OrderStatus::Confirmed),
            2 => Ok(OrderStatus::AwaitingMutualCompletion),
            3 => Ok(OrderStatus::Completed),
            4 => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status code `{}`", other)),
        }
    }
}

impl From<OrderStatus> for u8 {
    fn from(status: OrderStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::PendingSellerConfirmation => "pending seller confirmation",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::AwaitingMutualCompletion => "awaiting mutual completion",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rating must be between 1 and 5, got {0}")]
pub struct InvalidRating(pub u8);

/// A star rating, always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn value(self) -> u8 {
        self.0
    }

    /// Short wording shown next to the stars in the rating dialog.
    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Poor",
            2 => "Fair",
            3 => "Average",
            4 => "Good",
            _ => "Excellent",
        }
    }
}

impl TryFrom<u8> for Rating {
    type Error = InvalidRating;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Rating(value))
        } else {
            Err(InvalidRating(value))
        }
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

/// A rating record attached to an order once a party has rated the other.
///
/// The backend stores the bare integer while the client keeps `{rating}`;
/// both shapes are accepted when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Credit {
    pub rating: Rating,
}

impl<'de> Deserialize<'de> for Credit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Bare(u8),
            Record { rating: u8 },
        }

        let raw = match Wire::deserialize(deserializer)? {
            Wire::Bare(v) => v,
            Wire::Record { rating } => rating,
        };
        let rating = Rating::try_from(raw).map_err(serde::de::Error::custom)?;
        Ok(Credit { rating })
    }
}

/// A party to an order, as snapshotted into the order record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// The item an order was placed for, as it looked at purchase time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub item_id: ItemId,
    #[serde(default, alias = "name")]
    pub item_name: String,
    #[serde(default, alias = "image")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Confirmation flags travel as `0/1` (sometimes as booleans, sometimes null).
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Bool(bool),
            Int(i64),
        }

        Ok(match Option::<Wire>::deserialize(deserializer)? {
            None => false,
            Some(Wire::Bool(b)) => b,
            Some(Wire::Int(n)) => n != 0,
        })
    }

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(u8::from(*value))
    }
}

/// An order between one buyer and one seller for one item.
///
/// - `if_buyer_confirm` / `if_seller_confirm` are set independently by each
///   party once the order is confirmed; the order is `Completed` exactly when
///   both are set.
/// - `buyer_credit` is the rating the seller gave the buyer, `seller_credit`
///   the rating the buyer gave the seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: OrderId,
    pub buyer: UserRef,
    pub seller: UserRef,
    pub item: ItemRef,
    pub order_amount: Decimal,
    pub order_status: OrderStatus,
    #[serde(default, with = "flag")]
    pub if_buyer_confirm: bool,
    #[serde(default, with = "flag")]
    pub if_seller_confirm: bool,
    #[serde(default)]
    pub create_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub confirm_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub finish_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub cancel_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    #[serde(default)]
    pub buyer_credit: Option<Credit>,
    #[serde(default)]
    pub seller_credit: Option<Credit>,
}

/// One page of an order feed.
///
/// Only `content` and `last` are read; the rest of the server's page envelope
/// (`totalElements`, `number`, ...) is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPage {
    #[serde(default)]
    pub content: Vec<Order>,
    pub last: bool,
}
