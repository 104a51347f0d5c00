use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Number of decimal places accepted for amounts and prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precision {
    pub amount: Option<u32>,
    pub price: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl MinMax {
    pub fn new(min: Option<Decimal>, max: Option<Decimal>) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub amount: MinMax,
    pub price: MinMax,
    pub cost: MinMax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub exchange: String,
    /// Exchange-native market id.
    pub id: String,
    /// Unified `BASE/QUOTE` symbol.
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub base_id: String,
    pub quote_id: String,
    pub active: Option<bool>,
    pub precision: Precision,
    pub limits: Limits,
    pub maker: Option<Decimal>,
    pub taker: Option<Decimal>,
    pub tier_based: bool,
    pub percentage: bool,
    pub info: Value,
}

impl Market {
    /// Builds a spot market. Entries whose base and quote resolve to the same
    /// currency are dropped because they cannot form a valid symbol.
    pub fn spot(
        exchange: &str,
        id: impl Into<String>,
        base_id: impl Into<String>,
        quote_id: impl Into<String>,
        base: impl Into<String>,
        quote: impl Into<String>,
        info: Value,
    ) -> Option<Self> {
        let id = id.into();
        let base = base.into();
        let quote = quote.into();
        if base.is_empty() || quote.is_empty() || base == quote {
            debug!("{}: skipping degenerate market {} ({}/{})", exchange, id, base, quote);
            return None;
        }

        Some(Self {
            exchange: exchange.to_string(),
            symbol: format!("{}/{}", base, quote),
            id,
            base,
            quote,
            base_id: base_id.into(),
            quote_id: quote_id.into(),
            active: None,
            precision: Precision::default(),
            limits: Limits::default(),
            maker: None,
            taker: None,
            tier_based: false,
            percentage: true,
            info,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub id: String,
    pub code: String,
    pub name: Option<String>,
    pub active: Option<bool>,
    pub deposit: Option<bool>,
    pub withdraw: Option<bool>,
    pub fee: Option<Decimal>,
    pub precision: Option<u32>,
    pub info: Value,
}

/// Maps an exchange currency id to its unified code.
pub fn currency_code(id: &str) -> String {
    let upper = id.to_uppercase();
    match upper.as_str() {
        "XBT" => "BTC".to_string(),
        "BCC" => "BCH".to_string(),
        _ => upper,
    }
}

/// Splits a unified symbol into base and quote.
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (base, quote) = symbol.split_once('/')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spot_symbol_is_base_slash_quote() {
        let market = Market::spot("test", "BTC-USD", "BTC", "USD", "BTC", "USD", json!({})).unwrap();
        assert_eq!(market.symbol, "BTC/USD");
        assert_eq!(market.symbol, format!("{}/{}", market.base, market.quote));
    }

    #[test]
    fn test_spot_skips_same_base_and_quote() {
        assert!(Market::spot("swyftx", "1", "1", "1", "AUD", "AUD", json!({})).is_none());
        assert!(Market::spot("test", "X", "", "USD", "", "USD", json!({})).is_none());
    }

    #[test]
    fn test_currency_code() {
        assert_eq!(currency_code("xbt"), "BTC");
        assert_eq!(currency_code("eth"), "ETH");
    }

    #[test]
    fn test_split_symbol() {
        assert_eq!(split_symbol("ETH/USD"), Some(("ETH", "USD")));
        assert_eq!(split_symbol("ETHUSD"), None);
        assert_eq!(split_symbol("/USD"), None);
    }
}
