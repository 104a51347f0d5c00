use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub timestamp: Option<i64>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub bid_volume: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub ask_volume: Option<Decimal>,
    pub vwap: Option<Decimal>,
    pub open: Option<Decimal>,
    pub close: Option<Decimal>,
    pub last: Option<Decimal>,
    pub change: Option<Decimal>,
    pub percentage: Option<Decimal>,
    pub average: Option<Decimal>,
    pub base_volume: Option<Decimal>,
    pub quote_volume: Option<Decimal>,
    pub info: Value,
}

impl Ticker {
    pub fn new(symbol: impl Into<String>, info: Value) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp: None,
            high: None,
            low: None,
            bid: None,
            bid_volume: None,
            ask: None,
            ask_volume: None,
            vwap: None,
            open: None,
            close: None,
            last: None,
            change: None,
            percentage: None,
            average: None,
            base_volume: None,
            quote_volume: None,
            info,
        }
    }

    /// Fills the fields that can be derived from the ones the exchange sent.
    pub fn complete(mut self) -> Self {
        if self.close.is_none() {
            self.close = self.last;
        }
        if self.last.is_none() {
            self.last = self.close;
        }

        if let Some(last) = self.last {
            if self.open.is_none() {
                if let Some(change) = self.change {
                    self.open = Some(last - change);
                }
            }
            if let Some(open) = self.open {
                if self.change.is_none() {
                    self.change = Some(last - open);
                }
                if self.average.is_none() {
                    self.average = Some((last + open) / Decimal::TWO);
                }
            }
        }

        if self.percentage.is_none() {
            if let (Some(change), Some(open)) = (self.change, self.open) {
                if !open.is_zero() {
                    self.percentage = Some(change / open * Decimal::ONE_HUNDRED);
                }
            }
        }

        if self.vwap.is_none() {
            if let (Some(quote), Some(base)) = (self.quote_volume, self.base_volume) {
                if !base.is_zero() {
                    self.vwap = Some(quote / base);
                }
            }
        }

        self
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.ask? - self.bid?)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        Some((self.bid? + self.ask?) / Decimal::TWO)
    }
}
