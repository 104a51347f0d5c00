use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order book level (bid or ask). `amount` is unspecified for books that
/// were synthesized from best bid/offer quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub amount: Option<Decimal>,
}

impl OrderBookLevel {
    pub fn new(price: Decimal, amount: Decimal) -> Self {
        Self {
            price,
            amount: Some(amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub timestamp: Option<i64>,
    pub nonce: Option<i64>,
    /// Sorted best (highest) first.
    pub bids: Vec<OrderBookLevel>,
    /// Sorted best (lowest) first.
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    pub fn new(
        symbol: impl Into<String>,
        mut bids: Vec<OrderBookLevel>,
        mut asks: Vec<OrderBookLevel>,
        timestamp: Option<i64>,
    ) -> Self {
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self {
            symbol: symbol.into(),
            timestamp,
            nonce: None,
            bids,
            asks,
        }
    }

    /// Single-level book built from a best bid/offer quote. Consumers must
    /// treat books from such exchanges as depth-1.
    pub fn from_best_quotes(
        symbol: impl Into<String>,
        bid: Option<Decimal>,
        ask: Option<Decimal>,
        timestamp: Option<i64>,
    ) -> Self {
        let level = |price| OrderBookLevel { price, amount: None };
        Self::new(
            symbol,
            bid.map(level).into_iter().collect(),
            ask.map(level).into_iter().collect(),
            timestamp,
        )
    }

    pub fn limit(mut self, depth: Option<usize>) -> Self {
        if let Some(depth) = depth {
            self.bids.truncate(depth);
            self.asks.truncate(depth);
        }
        self
    }

    pub fn best_bid(&self) -> Option<OrderBookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<OrderBookLevel> {
        self.asks.first().copied()
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        Some((self.best_bid()?.price + self.best_ask()?.price) / Decimal::TWO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn mock_book() -> OrderBook {
        OrderBook::new(
            "BTC/USD",
            vec![
                OrderBookLevel::new(dec!(49990), dec!(0.5)),
                OrderBookLevel::new(dec!(50000), dec!(1.0)),
            ],
            vec![
                OrderBookLevel::new(dec!(50020), dec!(0.4)),
                OrderBookLevel::new(dec!(50010), dec!(0.8)),
            ],
            Some(1_700_000_000_000),
        )
    }

    #[test]
    fn test_levels_sorted() {
        let book = mock_book();
        assert_eq!(book.best_bid().unwrap().price, dec!(50000));
        assert_eq!(book.best_ask().unwrap().price, dec!(50010));
    }

    #[test]
    fn test_mid_price_and_spread() {
        let book = mock_book();
        assert_eq!(book.mid_price(), Some(dec!(50005)));
        assert_eq!(book.spread(), Some(dec!(10)));
    }

    #[test]
    fn test_from_best_quotes_is_depth_one() {
        let book = OrderBook::from_best_quotes("BTC/AUD", Some(dec!(99)), Some(dec!(101)), None);
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.bids[0].amount, None);

        let empty = OrderBook::from_best_quotes("BTC/AUD", None, None, None);
        assert!(empty.bids.is_empty() && empty.asks.is_empty());
    }

    #[test]
    fn test_limit_truncates() {
        let book = mock_book().limit(Some(1));
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.asks.len(), 1);
    }
}
