//! Order requests and resting pending orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::Ticket;
use super::position::Side;

/// What the request asks the broker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    /// Immediate execution at the current quote.
    Deal,
    /// Resting order that fills when its trigger is crossed.
    Pending,
}

/// Side-qualified order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Buy,
    Sell,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
}

impl OrderType {
    pub fn side(self) -> Side {
        match self {
            OrderType::Buy | OrderType::BuyLimit | OrderType::BuyStop => Side::Buy,
            OrderType::Sell | OrderType::SellLimit | OrderType::SellStop => Side::Sell,
        }
    }

    /// The resting variant, if this is a pending order type.
    pub fn pending(self) -> Option<PendingOrderType> {
        match self {
            OrderType::BuyLimit => Some(PendingOrderType::BuyLimit),
            OrderType::SellLimit => Some(PendingOrderType::SellLimit),
            OrderType::BuyStop => Some(PendingOrderType::BuyStop),
            OrderType::SellStop => Some(PendingOrderType::SellStop),
            OrderType::Buy | OrderType::Sell => None,
        }
    }
}

/// Order types that can rest in the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingOrderType {
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
}

impl PendingOrderType {
    pub fn side(self) -> Side {
        match self {
            PendingOrderType::BuyLimit | PendingOrderType::BuyStop => Side::Buy,
            PendingOrderType::SellLimit | PendingOrderType::SellStop => Side::Sell,
        }
    }

    /// Intrabar crossing test against the bar's extremes.
    pub fn is_triggered(self, trigger: f64, high: f64, low: f64) -> bool {
        match self {
            PendingOrderType::BuyLimit | PendingOrderType::SellStop => low <= trigger,
            PendingOrderType::SellLimit | PendingOrderType::BuyStop => high >= trigger,
        }
    }
}

/// A request to the broker.
///
/// `expiration: None` means the order never expires. Callers holding an epoch
/// timestamp where 0 means "unset" should go through [`expiration_from_epoch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub action: TradeAction,
    pub symbol: String,
    pub volume: f64,
    pub order_type: OrderType,
    /// Trigger price for pending orders. Ignored for deals.
    pub price: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub magic: u64,
    pub comment: String,
    pub expiration: Option<DateTime<Utc>>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: Side, volume: f64) -> Self {
        Self {
            action: TradeAction::Deal,
            symbol: symbol.into(),
            volume,
            order_type: match side {
                Side::Buy => OrderType::Buy,
                Side::Sell => OrderType::Sell,
            },
            price: None,
            sl: None,
            tp: None,
            magic: 0,
            comment: String::new(),
            expiration: None,
        }
    }

    pub fn pending(
        symbol: impl Into<String>,
        order_type: PendingOrderType,
        volume: f64,
        price: f64,
    ) -> Self {
        Self {
            action: TradeAction::Pending,
            symbol: symbol.into(),
            volume,
            order_type: match order_type {
                PendingOrderType::BuyLimit => OrderType::BuyLimit,
                PendingOrderType::SellLimit => OrderType::SellLimit,
                PendingOrderType::BuyStop => OrderType::BuyStop,
                PendingOrderType::SellStop => OrderType::SellStop,
            },
            price: Some(price),
            sl: None,
            tp: None,
            magic: 0,
            comment: String::new(),
            expiration: None,
        }
    }

    pub fn with_sl(mut self, sl: f64) -> Self {
        self.sl = Some(sl);
        self
    }

    pub fn with_tp(mut self, tp: f64) -> Self {
        self.tp = Some(tp);
        self
    }

    pub fn with_magic(mut self, magic: u64) -> Self {
        self.magic = magic;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }
}

/// Map an epoch-seconds expiration to the broker's representation.
///
/// 0 (and anything non-positive) means "unset", which the broker treats as
/// never expiring.
pub fn expiration_from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(secs, 0)
}

/// A resting order owned by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub ticket: Ticket,
    pub symbol: String,
    pub order_type: PendingOrderType,
    pub volume: f64,
    pub price: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub magic: u64,
    pub comment: String,
    pub time_setup: DateTime<Utc>,
    pub expiration: Option<DateTime<Utc>>,
}

impl PendingOrder {
    /// Expired when `now >= expiration`. Orders without an expiration never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| now >= exp)
    }
}
