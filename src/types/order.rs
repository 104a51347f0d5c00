use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Fee;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    /// Lenient lookup for exchange payloads. Unknown tokens yield `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "buy" | "bid" => Some(OrderSide::Buy),
            "sell" | "ask" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OrderSide {
    /// Strict parse of a caller-supplied side; the error names `exchange`.
    pub fn parse_for(exchange: &'static str, s: &str) -> Result<Self> {
        match s {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => Err(Error::invalid_order(
                exchange,
                format!("side must be buy or sell, got {}", other),
            )),
        }
    }
}

impl FromStr for OrderSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_for("unified", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
        }
    }

    /// Anything mentioning "limit" is a limit order, plain "market" is market.
    pub fn from_token(token: &str) -> Option<Self> {
        let lower = token.to_lowercase();
        if lower.contains("limit") {
            Some(OrderType::Limit)
        } else if lower.contains("market") {
            Some(OrderType::Market)
        } else {
            None
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OrderType {
    pub fn parse_for(exchange: &'static str, s: &str) -> Result<Self> {
        match s {
            "limit" => Ok(OrderType::Limit),
            "market" => Ok(OrderType::Market),
            other => Err(Error::invalid_order(
                exchange,
                format!("type must be limit or market, got {}", other),
            )),
        }
    }
}

impl FromStr for OrderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_for("unified", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
    Expired,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Closed => "closed",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Expired => "expired",
            OrderStatus::Rejected => "rejected",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Open)
    }

    pub fn is_final(&self) -> bool {
        !self.is_open()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GTC,
    IOC,
    FOK,
    PO,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::GTC => "GTC",
            TimeInForce::IOC => "IOC",
            TimeInForce::FOK => "FOK",
            TimeInForce::PO => "PO",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_uppercase().as_str() {
            "GTC" | "GOOD_TIL_CANCELLED" | "GOOD_TILL_CANCEL" => Some(TimeInForce::GTC),
            "IOC" | "IMMEDIATE_OR_CANCEL" => Some(TimeInForce::IOC),
            "FOK" | "FILL_OR_KILL" => Some(TimeInForce::FOK),
            "PO" | "POST_ONLY_GOOD_TIL_CANCELLED" => Some(TimeInForce::PO),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    /// Idempotency hint forwarded to exchanges that accept one.
    pub client_order_id: String,
    pub time_in_force: Option<TimeInForce>,
}

impl OrderRequest {
    pub fn new(
        symbol: impl Into<String>,
        order_type: OrderType,
        side: OrderSide,
        amount: Decimal,
        price: Option<Decimal>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            order_type,
            side,
            amount,
            price,
            client_order_id: Uuid::new_v4().to_string(),
            time_in_force: None,
        }
    }

    pub fn market(symbol: impl Into<String>, side: OrderSide, amount: Decimal) -> Self {
        Self::new(symbol, OrderType::Market, side, amount, None)
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, amount: Decimal, price: Decimal) -> Self {
        let mut request = Self::new(symbol, OrderType::Limit, side, amount, Some(price));
        request.time_in_force = Some(TimeInForce::GTC);
        request
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = id.into();
        self
    }

    /// Client id with the dashes stripped, for exchanges that limit the charset.
    pub fn compact_client_order_id(&self) -> String {
        self.client_order_id.replace('-', "")
    }

    pub fn validate(&self, exchange: &'static str) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(Error::invalid_order(
                exchange,
                format!("amount must be positive, got {}", self.amount),
            ));
        }
        match (self.order_type, self.price) {
            (OrderType::Limit, None) => Err(Error::invalid_order(
                exchange,
                "limit orders require a price",
            )),
            (_, Some(price)) if price <= Decimal::ZERO => Err(Error::invalid_order(
                exchange,
                format!("price must be positive, got {}", price),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub client_order_id: Option<String>,
    pub timestamp: Option<i64>,
    pub last_trade_timestamp: Option<i64>,
    pub symbol: Option<String>,
    pub order_type: Option<OrderType>,
    pub time_in_force: Option<TimeInForce>,
    pub post_only: Option<bool>,
    pub side: Option<OrderSide>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub average: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub filled: Option<Decimal>,
    pub remaining: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub status: Option<OrderStatus>,
    pub fee: Option<Fee>,
    pub info: Value,
}

impl Order {
    pub fn new(id: impl Into<String>, info: Value) -> Self {
        Self {
            id: id.into(),
            client_order_id: None,
            timestamp: None,
            last_trade_timestamp: None,
            symbol: None,
            order_type: None,
            time_in_force: None,
            post_only: None,
            side: None,
            price: None,
            stop_price: None,
            average: None,
            amount: None,
            filled: None,
            remaining: None,
            cost: None,
            status: None,
            fee: None,
            info,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.map(|s| s.is_open()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_tokens() {
        assert_eq!(OrderSide::from_token("BUY"), Some(OrderSide::Buy));
        assert_eq!(OrderSide::from_token("sell"), Some(OrderSide::Sell));
        assert_eq!(OrderSide::from_token("long"), None);
        assert!("BUY".parse::<OrderSide>().is_err());
    }

    #[test]
    fn test_type_tokens() {
        assert_eq!(OrderType::from_token("stop_limit"), Some(OrderType::Limit));
        assert_eq!(OrderType::from_token("MARKET"), Some(OrderType::Market));
        assert_eq!(OrderType::from_token("trailing_stop"), None);
    }

    #[test]
    fn test_limit_without_price_is_invalid() {
        let request = OrderRequest::new("BTC/USD", OrderType::Limit, OrderSide::Buy, dec!(1), None);
        let err = request.validate("test").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidOrder));
    }

    #[test]
    fn test_unknown_type_is_invalid_order() {
        let err = "stop".parse::<OrderType>().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidOrder));
    }

    #[test]
    fn test_parse_for_names_the_adapter() {
        let err = OrderSide::parse_for("alpaca", "long").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidOrder));
        assert_eq!(err.exchange(), Some("alpaca"));
        let err = OrderType::parse_for("swyftx", "stop").unwrap_err();
        assert_eq!(err.exchange(), Some("swyftx"));
        assert_eq!(OrderSide::parse_for("alpaca", "sell").unwrap(), OrderSide::Sell);
    }

    #[test]
    fn test_non_positive_amount_is_invalid() {
        let request = OrderRequest::market("BTC/USD", OrderSide::Sell, dec!(0));
        assert!(request.validate("test").is_err());
        let request = OrderRequest::limit("BTC/USD", OrderSide::Sell, dec!(1), dec!(-5));
        assert!(request.validate("test").is_err());
    }

    #[test]
    fn test_client_order_id_is_unique() {
        let a = OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(1));
        let b = OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(1));
        assert_ne!(a.client_order_id, b.client_order_id);
        assert!(!a.compact_client_order_id().contains('-'));
    }
}
