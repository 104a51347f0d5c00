use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::Exchange;
use crate::base::classify::classify_http_status;
use crate::base::precise::{number_to_string, precision_from_tick, round, truncate};
use crate::base::safe::{
    safe_array, safe_bool, safe_decimal, safe_decimal_at, safe_integer, safe_integer_at,
    safe_string, safe_string_n,
};
use crate::base::signer::{hmac_sha256_hex, urlencode, with_query};
use crate::base::{
    safe_order, safe_trade, ErrorTable, HttpMethod, MarketCatalog, NonceSource, Params,
    SignedRequest, Transport,
};
use crate::config::{Credential, Credentials, ExchangeConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::types::{
    currency_code, BalanceEntry, Balances, Candle, Fee, Market, MinMax, Order, OrderBook,
    OrderBookLevel, OrderRequest, OrderSide, OrderStatus, OrderType, TakerOrMaker, Ticker,
    TimeInForce, Timeframe, Trade,
};

pub const ID: &str = "binanceus";

const BINANCE_US_API: &str = "https://api.binance.us";
const BINANCE_US_TESTNET: &str = "https://testnet.binance.vision";

const EXCEPTIONS: ErrorTable = ErrorTable::new(
    &[
        ("-1003", ErrorKind::RateLimitExceeded),
        ("-1013", ErrorKind::InvalidOrder),
        ("-1021", ErrorKind::InvalidNonce),
        ("-1022", ErrorKind::AuthenticationError),
        ("-1100", ErrorKind::BadRequest),
        ("-1102", ErrorKind::BadRequest),
        ("-1104", ErrorKind::BadRequest),
        ("-1106", ErrorKind::BadRequest),
        ("-1121", ErrorKind::BadSymbol),
        ("-2011", ErrorKind::OrderNotFound),
        ("-2013", ErrorKind::OrderNotFound),
        ("-2014", ErrorKind::AuthenticationError),
        ("-2015", ErrorKind::AuthenticationError),
        (
            "Account has insufficient balance for requested action.",
            ErrorKind::InsufficientFunds,
        ),
    ],
    &[
        ("insufficient balance", ErrorKind::InsufficientFunds),
        ("Filter failure", ErrorKind::InvalidOrder),
        ("Invalid symbol", ErrorKind::BadSymbol),
    ],
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Api {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Time,
    ExchangeInfo,
    Ticker24hr,
    Depth,
    Trades,
    Klines,
    Account,
    CreateOrder,
    CancelOrder,
    QueryOrder,
    OpenOrders,
    AllOrders,
    MyTrades,
}

impl Endpoint {
    fn descriptor(&self) -> (Api, HttpMethod, &'static str) {
        match self {
            Endpoint::Time => (Api::Public, HttpMethod::Get, "/api/v3/time"),
            Endpoint::ExchangeInfo => (Api::Public, HttpMethod::Get, "/api/v3/exchangeInfo"),
            Endpoint::Ticker24hr => (Api::Public, HttpMethod::Get, "/api/v3/ticker/24hr"),
            Endpoint::Depth => (Api::Public, HttpMethod::Get, "/api/v3/depth"),
            Endpoint::Trades => (Api::Public, HttpMethod::Get, "/api/v3/trades"),
            Endpoint::Klines => (Api::Public, HttpMethod::Get, "/api/v3/klines"),
            Endpoint::Account => (Api::Private, HttpMethod::Get, "/api/v3/account"),
            Endpoint::CreateOrder => (Api::Private, HttpMethod::Post, "/api/v3/order"),
            Endpoint::CancelOrder => (Api::Private, HttpMethod::Delete, "/api/v3/order"),
            Endpoint::QueryOrder => (Api::Private, HttpMethod::Get, "/api/v3/order"),
            Endpoint::OpenOrders => (Api::Private, HttpMethod::Get, "/api/v3/openOrders"),
            Endpoint::AllOrders => (Api::Private, HttpMethod::Get, "/api/v3/allOrders"),
            Endpoint::MyTrades => (Api::Private, HttpMethod::Get, "/api/v3/myTrades"),
        }
    }
}

/// Binance.US spot REST adapter. Private calls carry an HMAC-SHA256
/// signature of the full query string.
pub struct BinanceUs {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    base_url: String,
    recv_window: u64,
    nonce: NonceSource,
    markets: MarketCatalog,
}

impl BinanceUs {
    pub fn new(config: &ExchangeConfig, transport: Arc<dyn Transport>) -> Self {
        let base_url = if config.sandbox {
            BINANCE_US_TESTNET.to_string()
        } else {
            BINANCE_US_API.to_string()
        };

        Self {
            transport,
            credentials: config.credentials.clone(),
            base_url,
            recv_window: config.recv_window_ms,
            nonce: NonceSource::new(),
            markets: MarketCatalog::new(),
        }
    }

    /// Signs `params` for `endpoint`. Private requests get `timestamp`,
    /// `recvWindow` and `signature` appended to the query.
    pub fn sign(&self, endpoint: Endpoint, params: &[(&'static str, String)], timestamp: i64) -> Result<SignedRequest> {
        let (api, method, path) = endpoint.descriptor();
        let url = format!("{}{}", self.base_url, path);

        match api {
            Api::Public => Ok(SignedRequest::new(method, with_query(url, params))),
            Api::Private => {
                let mut query: Params = params.to_vec();
                query.push(("timestamp", timestamp.to_string()));
                query.push(("recvWindow", self.recv_window.to_string()));
                let query = urlencode(&query);
                let signature = hmac_sha256_hex(self.credentials.secret().as_bytes(), query.as_bytes())?;
                Ok(
                    SignedRequest::new(method, format!("{}?{}&signature={}", url, query, signature))
                        .header("X-MBX-APIKEY", self.credentials.api_key()),
                )
            }
        }
    }

    async fn request(&self, endpoint: Endpoint, params: Params) -> Result<Value> {
        let (api, _, _) = endpoint.descriptor();
        if api == Api::Private {
            self.credentials
                .check_required(ID, &[Credential::ApiKey, Credential::Secret])?;
        }

        let request = self.sign(endpoint, &params, self.nonce.next_millis())?;
        let resp = self.transport.execute(request).await?;
        if let Some(err) = handle_errors(resp.status, &resp.body) {
            return Err(err);
        }
        resp.json(ID)
    }

    pub async fn fetch_time(&self) -> Result<i64> {
        let resp = self.request(Endpoint::Time, Vec::new()).await?;
        safe_integer(&resp, "serverTime").ok_or_else(|| Error::bad_response(ID, &resp.to_string()))
    }

    async fn market_for_id(&self, raw: &Value) -> Option<Market> {
        let id = safe_string(raw, "symbol")?;
        let index = self.markets.get().await?;
        index.by_id(&id).cloned()
    }
}

pub fn handle_errors(status: u16, body: &str) -> Option<Error> {
    let success = (200..300).contains(&status);
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|v| safe_string(v, "code"));
    let message = parsed.as_ref().and_then(|v| safe_string(v, "msg"));

    // successful payloads carry no code; error payloads carry a negative one
    let failed = !success || code.as_deref().map(|c| c.starts_with('-')).unwrap_or(false);
    if !failed {
        return None;
    }

    let kind = EXCEPTIONS
        .classify(code.as_deref(), message.as_deref())
        .or_else(|| classify_http_status(status))
        .unwrap_or(ErrorKind::ExchangeError);
    Some(Error::new(kind, ID, body))
}

fn filter<'a>(filters: &'a [Value], kind: &str) -> Option<&'a Value> {
    filters
        .iter()
        .find(|f| safe_string(f, "filterType").as_deref() == Some(kind))
}

pub fn parse_market(raw: &Value) -> Option<Market> {
    let id = safe_string(raw, "symbol")?;
    let base_id = safe_string(raw, "baseAsset")?;
    let quote_id = safe_string(raw, "quoteAsset")?;
    let mut market = Market::spot(
        ID,
        id,
        base_id.clone(),
        quote_id.clone(),
        currency_code(&base_id),
        currency_code(&quote_id),
        raw.clone(),
    )?;

    market.active = safe_string(raw, "status").map(|s| s == "TRADING");
    market.maker = Some(dec!(0.001));
    market.taker = Some(dec!(0.001));

    let filters = safe_array(raw, "filters");
    if let Some(price) = filter(filters, "PRICE_FILTER") {
        market.precision.price = safe_string(price, "tickSize").and_then(|t| precision_from_tick(&t));
        market.limits.price = MinMax::new(
            safe_decimal(price, "minPrice").filter(|v| !v.is_zero()),
            safe_decimal(price, "maxPrice").filter(|v| !v.is_zero()),
        );
    }
    if let Some(lot) = filter(filters, "LOT_SIZE") {
        market.precision.amount = safe_string(lot, "stepSize").and_then(|t| precision_from_tick(&t));
        market.limits.amount = MinMax::new(safe_decimal(lot, "minQty"), safe_decimal(lot, "maxQty"));
    }
    if let Some(notional) = filter(filters, "NOTIONAL").or_else(|| filter(filters, "MIN_NOTIONAL")) {
        market.limits.cost = MinMax::new(
            safe_decimal(notional, "minNotional"),
            safe_decimal(notional, "maxNotional"),
        );
    }

    Some(market)
}

pub fn parse_ticker(raw: &Value, market: Option<&Market>) -> Ticker {
    let symbol = market
        .map(|m| m.symbol.clone())
        .or_else(|| safe_string(raw, "symbol"))
        .unwrap_or_default();

    let mut ticker = Ticker::new(symbol, raw.clone());
    ticker.timestamp = safe_integer(raw, "closeTime");
    ticker.high = safe_decimal(raw, "highPrice");
    ticker.low = safe_decimal(raw, "lowPrice");
    ticker.bid = safe_decimal(raw, "bidPrice");
    ticker.bid_volume = safe_decimal(raw, "bidQty");
    ticker.ask = safe_decimal(raw, "askPrice");
    ticker.ask_volume = safe_decimal(raw, "askQty");
    ticker.vwap = safe_decimal(raw, "weightedAvgPrice");
    ticker.open = safe_decimal(raw, "openPrice");
    ticker.last = safe_decimal(raw, "lastPrice");
    ticker.change = safe_decimal(raw, "priceChange");
    ticker.percentage = safe_decimal(raw, "priceChangePercent");
    ticker.base_volume = safe_decimal(raw, "volume");
    ticker.quote_volume = safe_decimal(raw, "quoteVolume");
    ticker.complete()
}

fn parse_levels(rows: &[Value]) -> Vec<OrderBookLevel> {
    rows.iter()
        .filter_map(|row| {
            Some(OrderBookLevel::new(
                safe_decimal_at(row, 0)?,
                safe_decimal_at(row, 1)?,
            ))
        })
        .collect()
}

pub fn parse_order_book(raw: &Value, symbol: &str) -> OrderBook {
    let mut book = OrderBook::new(
        symbol,
        parse_levels(safe_array(raw, "bids")),
        parse_levels(safe_array(raw, "asks")),
        None,
    );
    book.nonce = safe_integer(raw, "lastUpdateId");
    book
}

/// Handles both public trades and account trades (`myTrades`).
pub fn parse_trade(raw: &Value, market: Option<&Market>) -> Trade {
    let symbol = market
        .map(|m| m.symbol.clone())
        .or_else(|| safe_string(raw, "symbol"))
        .unwrap_or_default();

    let mut trade = Trade::new(symbol, raw.clone());
    trade.id = safe_string(raw, "id");
    trade.order = safe_string(raw, "orderId");
    trade.timestamp = safe_integer(raw, "time");
    trade.price = safe_decimal(raw, "price");
    trade.amount = safe_decimal(raw, "qty");
    trade.cost = safe_decimal(raw, "quoteQty");

    if let Some(is_buyer) = safe_bool(raw, "isBuyer") {
        trade.side = Some(if is_buyer { OrderSide::Buy } else { OrderSide::Sell });
        trade.taker_or_maker = safe_bool(raw, "isMaker").map(|m| TakerOrMaker::from_is_taker(!m));
    } else if let Some(buyer_maker) = safe_bool(raw, "isBuyerMaker") {
        // the taker sold into a resting bid
        trade.side = Some(if buyer_maker { OrderSide::Sell } else { OrderSide::Buy });
        trade.taker_or_maker = Some(TakerOrMaker::Taker);
    }

    trade.fee = Fee::new(
        safe_decimal(raw, "commission"),
        safe_string(raw, "commissionAsset").map(|c| currency_code(&c)),
    );
    safe_trade(trade)
}

pub fn parse_ohlcv(row: &Value) -> Option<Candle> {
    Some(Candle {
        timestamp: safe_integer_at(row, 0)?,
        open: safe_decimal_at(row, 1),
        high: safe_decimal_at(row, 2),
        low: safe_decimal_at(row, 3),
        close: safe_decimal_at(row, 4),
        volume: safe_decimal_at(row, 5),
    })
}

pub fn parse_order_status(status: &str) -> Option<OrderStatus> {
    match status {
        "NEW" | "PARTIALLY_FILLED" => Some(OrderStatus::Open),
        "FILLED" => Some(OrderStatus::Closed),
        "CANCELED" | "PENDING_CANCEL" => Some(OrderStatus::Canceled),
        "REJECTED" => Some(OrderStatus::Rejected),
        "EXPIRED" | "EXPIRED_IN_MATCH" => Some(OrderStatus::Expired),
        _ => None,
    }
}

pub fn parse_order(raw: &Value, market: Option<&Market>) -> Order {
    let symbol = market
        .map(|m| m.symbol.clone())
        .or_else(|| safe_string(raw, "symbol"));

    let mut order = Order::new(safe_string(raw, "orderId").unwrap_or_default(), raw.clone());
    order.client_order_id = safe_string(raw, "clientOrderId");
    order.timestamp = safe_integer(raw, "time").or_else(|| safe_integer(raw, "transactTime"));
    order.last_trade_timestamp = safe_integer(raw, "updateTime");
    order.symbol = symbol;
    order.order_type = safe_string(raw, "type").and_then(|t| OrderType::from_token(&t));
    order.time_in_force = safe_string(raw, "timeInForce").and_then(|t| TimeInForce::from_token(&t));
    order.side = safe_string(raw, "side").and_then(|s| OrderSide::from_token(&s));
    // market orders report a zero price
    order.price = safe_decimal(raw, "price").filter(|p| !p.is_zero());
    order.stop_price = safe_decimal(raw, "stopPrice").filter(|p| !p.is_zero());
    order.amount = safe_decimal(raw, "origQty");
    order.filled = safe_decimal(raw, "executedQty");
    order.cost = safe_decimal(raw, "cummulativeQuoteQty");
    order.status = safe_string(raw, "status").and_then(|s| parse_order_status(&s));
    safe_order(order)
}

pub fn parse_balance(raw: &Value) -> Balances {
    let mut balances = Balances::new(raw.clone());
    balances.timestamp = safe_integer(raw, "updateTime");
    for entry in safe_array(raw, "balances") {
        if let Some(asset) = safe_string(entry, "asset") {
            balances.insert(
                currency_code(&asset),
                BalanceEntry::new(safe_decimal(entry, "free"), safe_decimal(entry, "locked"), None),
            );
        }
    }
    balances
}

/// Numeric ids go out as `orderId`, anything else is a client id.
fn order_id_param(id: &str) -> (&'static str, String) {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        ("orderId", id.to_string())
    } else {
        ("origClientOrderId", id.to_string())
    }
}

#[async_trait]
impl Exchange for BinanceUs {
    fn id(&self) -> &'static str {
        ID
    }

    fn catalog(&self) -> &MarketCatalog {
        &self.markets
    }

    async fn fetch_markets(&self) -> Result<Vec<Market>> {
        let resp = self.request(Endpoint::ExchangeInfo, Vec::new()).await?;
        let symbols = resp
            .get("symbols")
            .and_then(|s| s.as_array())
            .ok_or_else(|| Error::bad_response(ID, &resp.to_string()))?;
        let markets: Vec<Market> = symbols.iter().filter_map(parse_market).collect();
        info!("{}: loaded {} markets", ID, markets.len());
        Ok(markets)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let market = self.market(symbol).await?;
        let resp = self
            .request(Endpoint::Ticker24hr, vec![("symbol", market.id.clone())])
            .await?;
        Ok(parse_ticker(&resp, Some(&market)))
    }

    async fn fetch_tickers(&self, symbols: Option<&[String]>) -> Result<Vec<Ticker>> {
        let index = self.load_markets().await?;
        let resp = self.request(Endpoint::Ticker24hr, Vec::new()).await?;
        let tickers = resp
            .as_array()
            .ok_or_else(|| Error::bad_response(ID, &resp.to_string()))?
            .iter()
            .filter_map(|raw| {
                let market = index.by_id(&safe_string(raw, "symbol")?)?;
                Some(parse_ticker(raw, Some(market)))
            })
            .filter(|t| symbols.map(|s| s.contains(&t.symbol)).unwrap_or(true))
            .collect();
        Ok(tickers)
    }

    async fn fetch_order_book(&self, symbol: &str, limit: Option<u32>) -> Result<OrderBook> {
        let market = self.market(symbol).await?;
        let mut params: Params = vec![("symbol", market.id.clone())];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let resp = self.request(Endpoint::Depth, params).await?;
        Ok(parse_order_book(&resp, &market.symbol))
    }

    async fn fetch_trades(&self, symbol: &str, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Trade>> {
        let market = self.market(symbol).await?;
        let mut params: Params = vec![("symbol", market.id.clone())];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let resp = self.request(Endpoint::Trades, params).await?;
        let trades = resp
            .as_array()
            .map(|rows| rows.iter().map(|t| parse_trade(t, Some(&market))).collect())
            .unwrap_or_default();
        Ok(crate::base::filter_by_since_limit(trades, since, limit, |t: &Trade| t.timestamp))
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>> {
        let market = self.market(symbol).await?;
        let mut params: Params = vec![
            ("symbol", market.id.clone()),
            ("interval", timeframe.as_str().to_string()),
        ];
        if let Some(since) = since {
            params.push(("startTime", since.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let resp = self.request(Endpoint::Klines, params).await?;
        Ok(resp
            .as_array()
            .map(|rows| rows.iter().filter_map(parse_ohlcv).collect())
            .unwrap_or_default())
    }

    async fn fetch_balance(&self) -> Result<Balances> {
        let resp = self.request(Endpoint::Account, Vec::new()).await?;
        Ok(parse_balance(&resp))
    }

    async fn create_order(&self, request: OrderRequest) -> Result<Order> {
        request.validate(ID)?;
        let market = self.market(&request.symbol).await?;

        let mut params: Params = vec![
            ("symbol", market.id.clone()),
            ("side", request.side.as_str().to_uppercase()),
            ("type", request.order_type.as_str().to_uppercase()),
            (
                "quantity",
                number_to_string(truncate(request.amount, market.precision.amount)),
            ),
            ("newClientOrderId", request.client_order_id.clone()),
        ];
        if request.order_type == OrderType::Limit {
            if let Some(price) = request.price {
                params.push(("price", number_to_string(round(price, market.precision.price))));
            }
            let tif = request.time_in_force.unwrap_or(TimeInForce::GTC);
            params.push(("timeInForce", tif.as_str().to_string()));
        }

        debug!("{}: placing order {:?}", ID, request);
        let resp = self.request(Endpoint::CreateOrder, params).await?;
        let order = parse_order(&resp, Some(&market));
        info!("{}: order {} placed on {}", ID, order.id, market.symbol);
        Ok(order)
    }

    async fn cancel_order(&self, id: &str, symbol: Option<&str>) -> Result<Order> {
        let symbol = symbol.ok_or_else(|| Error::arguments_required(ID, "cancel_order", "symbol"))?;
        let market = self.market(symbol).await?;
        let resp = self
            .request(
                Endpoint::CancelOrder,
                vec![("symbol", market.id.clone()), order_id_param(id)],
            )
            .await?;
        info!("{}: order {} canceled", ID, id);
        Ok(parse_order(&resp, Some(&market)))
    }

    async fn fetch_order(&self, id: &str, symbol: Option<&str>) -> Result<Order> {
        let symbol = symbol.ok_or_else(|| Error::arguments_required(ID, "fetch_order", "symbol"))?;
        let market = self.market(symbol).await?;
        let resp = self
            .request(
                Endpoint::QueryOrder,
                vec![("symbol", market.id.clone()), order_id_param(id)],
            )
            .await?;
        Ok(parse_order(&resp, Some(&market)))
    }

    async fn fetch_orders(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Order>> {
        let symbol = symbol.ok_or_else(|| Error::arguments_required(ID, "fetch_orders", "symbol"))?;
        let market = self.market(symbol).await?;
        let mut params: Params = vec![("symbol", market.id.clone())];
        if let Some(since) = since {
            params.push(("startTime", since.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let resp = self.request(Endpoint::AllOrders, params).await?;
        Ok(resp
            .as_array()
            .map(|rows| rows.iter().map(|o| parse_order(o, Some(&market))).collect())
            .unwrap_or_default())
    }

    /// Served by `openOrders`, which accepts an optional symbol.
    async fn fetch_open_orders(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Order>> {
        let mut params: Params = Vec::new();
        let market = match symbol {
            Some(symbol) => {
                let market = self.market(symbol).await?;
                params.push(("symbol", market.id.clone()));
                Some(market)
            }
            None => {
                self.load_markets().await?;
                None
            }
        };

        let resp = self.request(Endpoint::OpenOrders, params).await?;
        let mut orders = Vec::new();
        for raw in resp.as_array().map(|v| v.as_slice()).unwrap_or(&[]) {
            let resolved = match &market {
                Some(m) => Some(m.clone()),
                None => self.market_for_id(raw).await,
            };
            orders.push(parse_order(raw, resolved.as_ref()));
        }
        Ok(crate::base::filter_by_since_limit(orders, since, limit, |o: &Order| o.timestamp))
    }

    async fn fetch_my_trades(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Trade>> {
        let symbol = symbol.ok_or_else(|| Error::arguments_required(ID, "fetch_my_trades", "symbol"))?;
        let market = self.market(symbol).await?;
        let mut params: Params = vec![("symbol", market.id.clone())];
        if let Some(since) = since {
            params.push(("startTime", since.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let resp = self.request(Endpoint::MyTrades, params).await?;
        Ok(resp
            .as_array()
            .map(|rows| rows.iter().map(|t| parse_trade(t, Some(&market))).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{HttpResponse, MockTransport};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn exchange_info() -> Value {
        json!({
            "symbols": [
                {
                    "symbol": "BTCUSD",
                    "status": "TRADING",
                    "baseAsset": "BTC",
                    "quoteAsset": "USD",
                    "filters": [
                        {"filterType": "PRICE_FILTER", "minPrice": "0.01000000", "maxPrice": "100000.00000000", "tickSize": "0.01000000"},
                        {"filterType": "LOT_SIZE", "minQty": "0.00000100", "maxQty": "9000.00000000", "stepSize": "0.00000100"},
                        {"filterType": "NOTIONAL", "minNotional": "10.00000000"}
                    ]
                },
                {"symbol": "USDUSD", "status": "BREAK", "baseAsset": "USD", "quoteAsset": "USD", "filters": []}
            ]
        })
    }

    fn with_transport(mock: MockTransport) -> BinanceUs {
        let config = ExchangeConfig::new(ID).with_credentials(Credentials::new("key", "secret"));
        BinanceUs::new(&config, Arc::new(mock))
    }

    #[test]
    fn test_parse_market_precision_from_filters() {
        let info = exchange_info();
        let markets: Vec<Market> = info["symbols"].as_array().unwrap().iter().filter_map(parse_market).collect();
        assert_eq!(markets.len(), 1);
        let btc = &markets[0];
        assert_eq!(btc.symbol, "BTC/USD");
        assert_eq!(btc.precision.price, Some(2));
        assert_eq!(btc.precision.amount, Some(6));
        assert_eq!(btc.limits.cost.min, Some(dec!(10)));
        assert_eq!(btc.active, Some(true));
    }

    #[test]
    fn test_sign_appends_signature() {
        let exchange = with_transport(MockTransport::new());
        let req = exchange
            .sign(Endpoint::QueryOrder, &[("symbol", "BTCUSD".into())], 1_700_000_000_000)
            .unwrap();
        let query = "symbol=BTCUSD&timestamp=1700000000000&recvWindow=5000";
        let expected = hmac_sha256_hex(b"secret", query.as_bytes()).unwrap();
        assert_eq!(
            req.url,
            format!("https://api.binance.us/api/v3/order?{}&signature={}", query, expected)
        );
        assert_eq!(req.header_value("X-MBX-APIKEY"), Some("key"));
    }

    #[test]
    fn test_public_requests_are_unsigned() {
        let exchange = with_transport(MockTransport::new());
        let req = exchange.sign(Endpoint::Depth, &[("symbol", "BTCUSD".into())], 1).unwrap();
        assert_eq!(req.url, "https://api.binance.us/api/v3/depth?symbol=BTCUSD");
        assert!(req.headers.is_empty());
    }

    #[test]
    fn test_parse_ticker_fixture() {
        let raw = json!({
            "symbol": "BTCUSD", "lastPrice": "60000", "bidPrice": "59990", "askPrice": "60010",
            "highPrice": "61000", "lowPrice": "58000", "volume": "12.5", "quoteVolume": "750000",
            "openPrice": "59000", "closeTime": 1700000000000i64
        });
        let ticker = parse_ticker(&raw, None);
        assert!(ticker.bid.unwrap() <= ticker.ask.unwrap());
        assert!(ticker.last.unwrap() >= ticker.low.unwrap() && ticker.last.unwrap() <= ticker.high.unwrap());
        assert_eq!(ticker.change, Some(dec!(1000)));
        assert_eq!(parse_ticker(&raw, None), ticker);
    }

    #[test]
    fn test_parse_order_statuses_and_cost() {
        let raw = json!({
            "symbol": "BTCUSD", "orderId": 28, "clientOrderId": "abc", "price": "0.00000000",
            "origQty": "2.0", "executedQty": "0.5", "cummulativeQuoteQty": "30000",
            "status": "PARTIALLY_FILLED", "type": "MARKET", "side": "SELL", "time": 1
        });
        let order = parse_order(&raw, None);
        assert_eq!(order.id, "28");
        assert_eq!(order.status, Some(OrderStatus::Open));
        assert_eq!(order.price, None);
        assert_eq!(order.remaining, Some(dec!(1.5)));
        assert_eq!(order.average, Some(dec!(60000)));
        assert_eq!(order.side, Some(OrderSide::Sell));
        assert_eq!(parse_order_status("PENDING_CANCEL"), Some(OrderStatus::Canceled));
        assert_eq!(parse_order_status("WHATEVER"), None);
    }

    #[test]
    fn test_parse_trade_sides() {
        let public = json!({"id": 1, "price": "100", "qty": "2", "time": 5, "isBuyerMaker": true});
        let trade = parse_trade(&public, None);
        assert_eq!(trade.side, Some(OrderSide::Sell));
        assert_eq!(trade.cost, Some(dec!(200)));

        let mine = json!({"id": 2, "price": "100", "qty": "1", "isBuyer": true, "isMaker": true, "commission": "0.1", "commissionAsset": "usd"});
        let trade = parse_trade(&mine, None);
        assert_eq!(trade.side, Some(OrderSide::Buy));
        assert_eq!(trade.taker_or_maker, Some(TakerOrMaker::Maker));
        assert_eq!(trade.fee.unwrap().currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_balance_total() {
        let raw = json!({"balances": [{"asset": "BTC", "free": "1.5", "locked": "0.5"}]});
        let balances = parse_balance(&raw);
        assert_eq!(balances.total("BTC"), Some(dec!(2.0)));
    }

    #[test]
    fn test_handle_errors() {
        let err = handle_errors(400, r#"{"code":-2013,"msg":"Order does not exist."}"#).unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::OrderNotFound));
        let err = handle_errors(400, r#"{"code":-2010,"msg":"Account has insufficient balance for requested action."}"#).unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::InsufficientFunds));
        let err = handle_errors(503, "").unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::ExchangeNotAvailable));
        assert!(handle_errors(200, r#"{"serverTime":1}"#).is_none());
    }

    #[tokio::test]
    async fn test_cancel_requires_symbol() {
        let exchange = with_transport(MockTransport::new());
        let err = exchange.cancel_order("1", None).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ArgumentsRequired));
    }

    #[tokio::test]
    async fn test_create_limit_order() {
        let mut mock = MockTransport::new();
        mock.expect_execute()
            .withf(|req| req.url.contains("/api/v3/exchangeInfo"))
            .returning(|_| Ok(HttpResponse::new(200, exchange_info().to_string())));
        mock.expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Post
                    && req.url.contains("/api/v3/order?symbol=BTCUSD&side=BUY&type=LIMIT&quantity=0.01")
                    && req.url.contains("price=50000")
                    && req.url.contains("timeInForce=GTC")
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    json!({
                        "symbol": "BTCUSD", "orderId": 7, "clientOrderId": "x", "transactTime": 1,
                        "price": "50000.00", "origQty": "0.01", "executedQty": "0", "cummulativeQuoteQty": "0",
                        "status": "NEW", "timeInForce": "GTC", "type": "LIMIT", "side": "BUY"
                    })
                    .to_string(),
                ))
            });

        let exchange = with_transport(mock);
        let order = exchange
            .create_order(OrderRequest::limit("BTC/USD", OrderSide::Buy, dec!(0.01), dec!(50000)))
            .await
            .unwrap();
        assert_eq!(order.status, Some(OrderStatus::Open));
        assert_eq!(order.order_type, Some(OrderType::Limit));
        assert_eq!(order.price, Some(dec!(50000)));
        assert_eq!(order.amount, Some(dec!(0.01)));
        assert_eq!(order.remaining, Some(dec!(0.01)));
    }
}
