pub mod binanceus;
pub mod bittrex;
pub mod alpaca;
pub mod deepwaters;
pub mod swyftx;
pub mod coinex_ws;

pub use alpaca::Alpaca;
pub use binanceus::BinanceUs;
pub use bittrex::Bittrex;
pub use coinex_ws::{CoinexWebSocket, Frame, StreamEvent};
pub use deepwaters::Deepwaters;
pub use swyftx::Swyftx;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::base::{MarketCatalog, MarketIndex, ReqwestTransport, Transport};
use crate::config::ExchangeConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{
    Balances, Candle, Currency, Market, Order, OrderBook, OrderRequest, Ticker, Timeframe, Trade,
    Transaction,
};

/// The unified trading surface. Every REST adapter implements the required
/// methods; optional ones default to `NotSupported`.
#[async_trait]
pub trait Exchange: Send + Sync {
    fn id(&self) -> &'static str;

    fn catalog(&self) -> &MarketCatalog;

    async fn fetch_markets(&self) -> Result<Vec<Market>>;

    /// Fetches markets once and serves the cached index afterwards.
    async fn load_markets(&self) -> Result<Arc<MarketIndex>> {
        if let Some(index) = self.catalog().get().await {
            return Ok(index);
        }
        let markets = self.fetch_markets().await?;
        Ok(self.catalog().replace(markets).await)
    }

    async fn market(&self, symbol: &str) -> Result<Market> {
        let index = self.load_markets().await?;
        index.market(self.id(), symbol).cloned()
    }

    async fn fetch_currencies(&self) -> Result<Vec<Currency>> {
        Err(Error::not_supported(self.id(), "fetch_currencies"))
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker>;

    async fn fetch_tickers(&self, symbols: Option<&[String]>) -> Result<Vec<Ticker>> {
        let symbols = match symbols {
            Some(symbols) => symbols.to_vec(),
            None => self.load_markets().await?.symbols(),
        };
        let mut tickers = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            tickers.push(self.fetch_ticker(symbol).await?);
        }
        Ok(tickers)
    }

    async fn fetch_order_book(&self, symbol: &str, limit: Option<u32>) -> Result<OrderBook>;

    async fn fetch_trades(
        &self,
        symbol: &str,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Trade>>;

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>>;

    async fn fetch_balance(&self) -> Result<Balances>;

    async fn create_order(&self, request: OrderRequest) -> Result<Order>;

    async fn cancel_order(&self, id: &str, symbol: Option<&str>) -> Result<Order>;

    async fn fetch_order(&self, id: &str, symbol: Option<&str>) -> Result<Order>;

    async fn fetch_orders(
        &self,
        _symbol: Option<&str>,
        _since: Option<i64>,
        _limit: Option<u32>,
    ) -> Result<Vec<Order>> {
        Err(Error::not_supported(self.id(), "fetch_orders"))
    }

    /// Defaults to filtering `fetch_orders` client-side.
    async fn fetch_open_orders(
        &self,
        symbol: Option<&str>,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Order>> {
        let orders = self.fetch_orders(symbol, since, limit).await?;
        Ok(orders.into_iter().filter(|o| o.is_open()).collect())
    }

    async fn fetch_closed_orders(
        &self,
        symbol: Option<&str>,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Order>> {
        let orders = self.fetch_orders(symbol, since, limit).await?;
        Ok(orders
            .into_iter()
            .filter(|o| o.status.map(|s| s.is_final()).unwrap_or(false))
            .collect())
    }

    async fn fetch_my_trades(
        &self,
        _symbol: Option<&str>,
        _since: Option<i64>,
        _limit: Option<u32>,
    ) -> Result<Vec<Trade>> {
        Err(Error::not_supported(self.id(), "fetch_my_trades"))
    }

    async fn withdraw(
        &self,
        _code: &str,
        _amount: Decimal,
        _address: &str,
        _tag: Option<&str>,
    ) -> Result<Transaction> {
        Err(Error::not_supported(self.id(), "withdraw"))
    }

    async fn fetch_deposits(
        &self,
        _code: Option<&str>,
        _since: Option<i64>,
        _limit: Option<u32>,
    ) -> Result<Vec<Transaction>> {
        Err(Error::not_supported(self.id(), "fetch_deposits"))
    }

    async fn fetch_withdrawals(
        &self,
        _code: Option<&str>,
        _since: Option<i64>,
        _limit: Option<u32>,
    ) -> Result<Vec<Transaction>> {
        Err(Error::not_supported(self.id(), "fetch_withdrawals"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeId {
    BinanceUs,
    Bittrex,
    Alpaca,
    Deepwaters,
    Swyftx,
}

impl ExchangeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::BinanceUs => binanceus::ID,
            ExchangeId::Bittrex => bittrex::ID,
            ExchangeId::Alpaca => alpaca::ID,
            ExchangeId::Deepwaters => deepwaters::ID,
            ExchangeId::Swyftx => swyftx::ID,
        }
    }

    pub fn all() -> Vec<ExchangeId> {
        vec![
            ExchangeId::BinanceUs,
            ExchangeId::Bittrex,
            ExchangeId::Alpaca,
            ExchangeId::Deepwaters,
            ExchangeId::Swyftx,
        ]
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ExchangeId::all()
            .into_iter()
            .find(|id| id.as_str() == s.to_lowercase())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::NotSupported,
                    "unified",
                    format!("unknown exchange {}", s),
                )
            })
    }
}

/// Builds the REST adapter named in `config` over a reqwest transport.
pub fn build_exchange(config: &ExchangeConfig) -> Result<Box<dyn Exchange>> {
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(
        config.timeout(),
        config.user_agent.as_deref(),
    )?);
    build_exchange_with(config, transport)
}

pub fn build_exchange_with(
    config: &ExchangeConfig,
    transport: Arc<dyn Transport>,
) -> Result<Box<dyn Exchange>> {
    let exchange: Box<dyn Exchange> = match config.exchange.parse::<ExchangeId>()? {
        ExchangeId::BinanceUs => Box::new(BinanceUs::new(config, transport)),
        ExchangeId::Bittrex => Box::new(Bittrex::new(config, transport)),
        ExchangeId::Alpaca => Box::new(Alpaca::new(config, transport)),
        ExchangeId::Deepwaters => Box::new(Deepwaters::new(config, transport)),
        ExchangeId::Swyftx => Box::new(Swyftx::new(config, transport)),
    };
    Ok(exchange)
}
