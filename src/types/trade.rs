use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{OrderSide, OrderType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TakerOrMaker {
    Taker,
    Maker,
}

impl TakerOrMaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            TakerOrMaker::Taker => "taker",
            TakerOrMaker::Maker => "maker",
        }
    }

    pub fn from_is_taker(is_taker: bool) -> Self {
        if is_taker {
            TakerOrMaker::Taker
        } else {
            TakerOrMaker::Maker
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub cost: Option<Decimal>,
    pub currency: Option<String>,
    pub rate: Option<Decimal>,
}

impl Fee {
    pub fn new(cost: Option<Decimal>, currency: Option<String>) -> Option<Self> {
        cost.map(|cost| Self {
            cost: Some(cost),
            currency,
            rate: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Option<String>,
    pub order: Option<String>,
    pub timestamp: Option<i64>,
    pub symbol: String,
    pub side: Option<OrderSide>,
    pub order_type: Option<OrderType>,
    pub taker_or_maker: Option<TakerOrMaker>,
    pub price: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub fee: Option<Fee>,
    pub info: Value,
}

impl Trade {
    pub fn new(symbol: impl Into<String>, info: Value) -> Self {
        Self {
            id: None,
            order: None,
            timestamp: None,
            symbol: symbol.into(),
            side: None,
            order_type: None,
            taker_or_maker: None,
            price: None,
            amount: None,
            cost: None,
            fee: None,
            info,
        }
    }
}
