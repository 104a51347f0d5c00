use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::Exchange;
use crate::base::classify::classify_http_status;
use crate::base::precise::{number_to_string, precision_from_tick, round, truncate};
use crate::base::safe::{
    iso8601, safe_array, safe_decimal, safe_string, safe_string_n, safe_timestamp8601, safe_value,
};
use crate::base::signer::{json_body, with_query};
use crate::base::{
    filter_by_since_limit, safe_order, safe_trade, ErrorTable, HttpMethod, MarketCatalog, Params,
    SignedRequest, Transport,
};
use crate::config::{Credential, Credentials, ExchangeConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::types::{
    currency_code, BalanceEntry, Balances, Candle, Fee, Market, MinMax, Order, OrderBook,
    OrderBookLevel, OrderRequest, OrderSide, OrderStatus, OrderType, TakerOrMaker, Ticker,
    TimeInForce, Timeframe, Trade,
};

pub const ID: &str = "alpaca";

const TRADER_API: &str = "https://api.alpaca.markets";
const TRADER_PAPER_API: &str = "https://paper-api.alpaca.markets";
const MARKET_DATA_API: &str = "https://data.alpaca.markets";
const LOCATION: &str = "us";

const EXCEPTIONS: ErrorTable = ErrorTable::new(
    &[
        ("40010001", ErrorKind::BadRequest),
        ("40110000", ErrorKind::PermissionDenied),
        ("40310000", ErrorKind::InsufficientFunds),
        ("40410000", ErrorKind::OrderNotFound),
        ("42210000", ErrorKind::InvalidOrder),
        ("42910000", ErrorKind::RateLimitExceeded),
        ("forbidden.", ErrorKind::PermissionDenied),
        ("buying power or shares is not sufficient.", ErrorKind::InsufficientFunds),
        ("order is not found", ErrorKind::OrderNotFound),
        ("order is not found.", ErrorKind::OrderNotFound),
        ("insufficient balance", ErrorKind::InsufficientFunds),
    ],
    &[
        ("Invalid format for parameter", ErrorKind::BadRequest),
        ("Invalid symbol", ErrorKind::BadSymbol),
        ("is not sufficient", ErrorKind::InsufficientFunds),
    ],
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Api {
    Trader,
    Market,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Clock,
    Assets,
    Account,
    Positions,
    Orders,
    CreateOrder,
    Order(String),
    CancelOrder(String),
    LatestOrderBooks,
    LatestQuotes,
    LatestTrades,
    LatestBars,
    Trades,
    Bars,
}

impl Endpoint {
    fn descriptor(&self) -> (Api, HttpMethod, String) {
        let crypto = |resource: &str| format!("v1beta3/crypto/{}/{}", LOCATION, resource);
        match self {
            Endpoint::Clock => (Api::Trader, HttpMethod::Get, "v2/clock".into()),
            Endpoint::Assets => (Api::Trader, HttpMethod::Get, "v2/assets".into()),
            Endpoint::Account => (Api::Trader, HttpMethod::Get, "v2/account".into()),
            Endpoint::Positions => (Api::Trader, HttpMethod::Get, "v2/positions".into()),
            Endpoint::Orders => (Api::Trader, HttpMethod::Get, "v2/orders".into()),
            Endpoint::CreateOrder => (Api::Trader, HttpMethod::Post, "v2/orders".into()),
            Endpoint::Order(id) => (Api::Trader, HttpMethod::Get, format!("v2/orders/{}", id)),
            Endpoint::CancelOrder(id) => {
                (Api::Trader, HttpMethod::Delete, format!("v2/orders/{}", id))
            }
            Endpoint::LatestOrderBooks => (Api::Market, HttpMethod::Get, crypto("latest/orderbooks")),
            Endpoint::LatestQuotes => (Api::Market, HttpMethod::Get, crypto("latest/quotes")),
            Endpoint::LatestTrades => (Api::Market, HttpMethod::Get, crypto("latest/trades")),
            Endpoint::LatestBars => (Api::Market, HttpMethod::Get, crypto("latest/bars")),
            Endpoint::Trades => (Api::Market, HttpMethod::Get, crypto("trades")),
            Endpoint::Bars => (Api::Market, HttpMethod::Get, crypto("bars")),
        }
    }
}

/// Alpaca crypto adapter. Authentication is a pair of static key headers,
/// so signing needs no clock or nonce.
pub struct Alpaca {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    trader_url: String,
    market_url: String,
    client_order_prefix: String,
    markets: MarketCatalog,
}

impl Alpaca {
    pub fn new(config: &ExchangeConfig, transport: Arc<dyn Transport>) -> Self {
        let trader_url = if config.sandbox {
            TRADER_PAPER_API
        } else {
            TRADER_API
        };

        Self {
            transport,
            credentials: config.credentials.clone(),
            trader_url: trader_url.to_string(),
            market_url: MARKET_DATA_API.to_string(),
            client_order_prefix: config.client_order_prefix.clone(),
            markets: MarketCatalog::new(),
        }
    }

    pub fn sign(&self, endpoint: &Endpoint, params: &[(&'static str, String)]) -> SignedRequest {
        let (api, method, path) = endpoint.descriptor();
        let base = match api {
            Api::Trader => &self.trader_url,
            Api::Market => &self.market_url,
        };
        let url = format!("{}/{}", base, path);

        let mut request = if method.has_body() && !params.is_empty() {
            SignedRequest::new(method, url).json_body(json_body(params))
        } else {
            SignedRequest::new(method, with_query(url, params))
        };
        if api == Api::Trader {
            request = request
                .header("APCA-API-KEY-ID", self.credentials.api_key())
                .header("APCA-API-SECRET-KEY", self.credentials.secret());
        }
        request
    }

    async fn request(&self, endpoint: Endpoint, params: Params) -> Result<Value> {
        let (api, _, _) = endpoint.descriptor();
        if api == Api::Trader {
            self.credentials
                .check_required(ID, &[Credential::ApiKey, Credential::Secret])?;
        }

        let resp = self.transport.execute(self.sign(&endpoint, &params)).await?;
        if let Some(err) = handle_errors(resp.status, &resp.body) {
            return Err(err);
        }
        resp.json(ID)
    }

    pub async fn fetch_time(&self) -> Result<i64> {
        let resp = self.request(Endpoint::Clock, Vec::new()).await?;
        safe_timestamp8601(&resp, "timestamp").ok_or_else(|| Error::bad_response(ID, &resp.to_string()))
    }

    /// `prefix` followed by the request's dashless client id, so a resent
    /// request carries the same token. Falls back to a fresh UUID when the
    /// request has none.
    fn client_order_id(&self, request: &OrderRequest) -> String {
        let id = request.compact_client_order_id();
        if id.is_empty() {
            format!("{}{}", self.client_order_prefix, Uuid::new_v4().simple())
        } else if id.starts_with(&self.client_order_prefix) {
            id
        } else {
            format!("{}{}", self.client_order_prefix, id)
        }
    }
}

pub fn handle_errors(status: u16, body: &str) -> Option<Error> {
    let success = (200..300).contains(&status);
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|v| safe_string(v, "code"));
    let message = parsed.as_ref().and_then(|v| safe_string(v, "message"));

    if let Some(kind) = EXCEPTIONS.classify(code.as_deref(), message.as_deref()) {
        return Some(Error::new(kind, ID, body));
    }
    // any unrecognized message is still a failure
    if message.is_some() && (!success || code.is_some()) {
        return Some(Error::new(ErrorKind::ExchangeError, ID, body));
    }
    if success {
        None
    } else {
        let kind = classify_http_status(status).unwrap_or(ErrorKind::ExchangeError);
        Some(Error::new(kind, ID, body))
    }
}

pub fn parse_market(raw: &Value) -> Option<Market> {
    let id = safe_string(raw, "symbol")?;
    let (base_id, quote_id) = id.split_once('/')?;
    let mut market = Market::spot(
        ID,
        id.clone(),
        base_id,
        quote_id,
        currency_code(base_id),
        currency_code(quote_id),
        raw.clone(),
    )?;

    market.active = safe_string(raw, "status").map(|s| s == "active");
    market.precision.amount = safe_string(raw, "min_trade_increment").and_then(|t| precision_from_tick(&t));
    market.precision.price = safe_string(raw, "price_increment").and_then(|t| precision_from_tick(&t));
    market.limits.amount = MinMax::new(safe_decimal(raw, "min_order_size"), None);
    market.tier_based = true;
    market.maker = Some(dec!(0.0015));
    market.taker = Some(dec!(0.0025));
    Some(market)
}

/// Builds a ticker from the latest `quote`, `trade` and `bar` objects of
/// one market, any of which may be missing.
pub fn parse_ticker(raw: &Value, market: Option<&Market>) -> Ticker {
    let symbol = market.map(|m| m.symbol.clone()).unwrap_or_default();
    let quote = &raw["quote"];
    let trade = &raw["trade"];
    let bar = &raw["bar"];

    let mut ticker = Ticker::new(symbol, raw.clone());
    ticker.timestamp = safe_timestamp8601(quote, "t").or_else(|| safe_timestamp8601(trade, "t"));
    ticker.bid = safe_decimal(quote, "bp");
    ticker.bid_volume = safe_decimal(quote, "bs");
    ticker.ask = safe_decimal(quote, "ap");
    ticker.ask_volume = safe_decimal(quote, "as");
    ticker.last = safe_decimal(trade, "p").or_else(|| safe_decimal(bar, "c"));
    ticker.open = safe_decimal(bar, "o");
    ticker.high = safe_decimal(bar, "h");
    ticker.low = safe_decimal(bar, "l");
    ticker.vwap = safe_decimal(bar, "vw");
    ticker.base_volume = safe_decimal(bar, "v");
    ticker.complete()
}

fn parse_levels(rows: &[Value]) -> Vec<OrderBookLevel> {
    rows.iter()
        .filter_map(|row| Some(OrderBookLevel::new(safe_decimal(row, "p")?, safe_decimal(row, "s")?)))
        .collect()
}

pub fn parse_order_book(raw: &Value, symbol: &str) -> OrderBook {
    OrderBook::new(
        symbol,
        parse_levels(safe_array(raw, "b")),
        parse_levels(safe_array(raw, "a")),
        safe_timestamp8601(raw, "t"),
    )
}

pub fn parse_trade_side(token: &str) -> Option<OrderSide> {
    match token {
        "B" => Some(OrderSide::Buy),
        "S" => Some(OrderSide::Sell),
        _ => None,
    }
}

pub fn parse_trade(raw: &Value, market: Option<&Market>) -> Trade {
    let symbol = market
        .map(|m| m.symbol.clone())
        .or_else(|| safe_string(raw, "S"))
        .unwrap_or_default();

    let mut trade = Trade::new(symbol, raw.clone());
    trade.id = safe_string(raw, "i");
    trade.timestamp = safe_timestamp8601(raw, "t");
    trade.side = safe_string(raw, "tks").and_then(|s| parse_trade_side(&s));
    trade.taker_or_maker = Some(TakerOrMaker::Taker);
    trade.price = safe_decimal(raw, "p");
    trade.amount = safe_decimal(raw, "s");
    safe_trade(trade)
}

pub fn parse_ohlcv(raw: &Value) -> Option<Candle> {
    Some(Candle {
        timestamp: safe_timestamp8601(raw, "t")?,
        open: safe_decimal(raw, "o"),
        high: safe_decimal(raw, "h"),
        low: safe_decimal(raw, "l"),
        close: safe_decimal(raw, "c"),
        volume: safe_decimal(raw, "v"),
    })
}

fn timeframe_token(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::M1 => "1Min",
        Timeframe::M5 => "5Min",
        Timeframe::M15 => "15Min",
        Timeframe::M30 => "30Min",
        Timeframe::H1 => "1Hour",
        Timeframe::H4 => "4Hour",
        Timeframe::D1 => "1Day",
        Timeframe::W1 => "1Week",
    }
}

pub fn parse_order_status(status: &str) -> Option<OrderStatus> {
    match status {
        "pending_new" | "accepted" | "new" | "partially_filled" | "activated" => Some(OrderStatus::Open),
        "filled" => Some(OrderStatus::Closed),
        "canceled" | "pending_cancel" | "done_for_day" => Some(OrderStatus::Canceled),
        "expired" => Some(OrderStatus::Expired),
        "rejected" => Some(OrderStatus::Rejected),
        _ => None,
    }
}

pub fn parse_order(raw: &Value, market: Option<&Market>) -> Order {
    let mut order = Order::new(safe_string(raw, "id").unwrap_or_default(), raw.clone());
    order.client_order_id = safe_string(raw, "client_order_id");
    order.timestamp = safe_timestamp8601(raw, "submitted_at");
    order.last_trade_timestamp = safe_timestamp8601(raw, "filled_at");
    order.symbol = market
        .map(|m| m.symbol.clone())
        .or_else(|| safe_string(raw, "symbol"));
    order.order_type = safe_string_n(raw, &["order_type", "type"]).and_then(|t| OrderType::from_token(&t));
    order.time_in_force = safe_string(raw, "time_in_force").and_then(|t| TimeInForce::from_token(&t));
    order.side = safe_string(raw, "side").and_then(|s| OrderSide::from_token(&s));
    order.price = safe_decimal(raw, "limit_price");
    order.stop_price = safe_decimal(raw, "stop_price");
    order.average = safe_decimal(raw, "filled_avg_price");
    order.amount = safe_decimal(raw, "qty");
    order.filled = safe_decimal(raw, "filled_qty");
    order.status = safe_string(raw, "status").and_then(|s| parse_order_status(&s));
    order.fee = Fee::new(safe_decimal(raw, "commission"), Some("USD".to_string()));
    safe_order(order)
}

/// Position symbols come as `BTCUSD` or `BTC/USD`.
fn position_currency(symbol: &str) -> String {
    if let Some((base, _)) = symbol.split_once('/') {
        return currency_code(base);
    }
    for quote in ["USDT", "USDC", "USD", "BTC"] {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return currency_code(base);
            }
        }
    }
    currency_code(symbol)
}

/// Merges account cash (as USD) with crypto positions by currency code.
pub fn parse_balance(account: &Value, positions: &[Value]) -> Balances {
    let mut balances = Balances::new(json!({ "account": account, "positions": positions }));

    let cash = safe_decimal(account, "cash");
    if cash.is_some() {
        balances.insert("USD", BalanceEntry::new(cash, None, cash));
    }

    // currencies only present as positions start from zero in the wallet map
    for position in positions {
        if let Some(symbol) = safe_string(position, "symbol") {
            let code = position_currency(&symbol);
            if balances.get(&code).is_none() {
                balances.insert(code, BalanceEntry::zero());
            }
        }
    }

    for position in positions {
        let Some(symbol) = safe_string(position, "symbol") else {
            continue;
        };
        let code = position_currency(&symbol);
        let free = safe_decimal(position, "qty_available");
        let total = safe_decimal(position, "qty");
        if free.is_some() || total.is_some() {
            balances.insert(code, BalanceEntry::new(free, None, total));
        }
    }
    balances
}

/// Market data endpoints wrap results by market id, e.g. `{"quotes": {"BTC/USD": {...}}}`.
fn keyed<'a>(resp: &'a Value, collection: &str, id: &str) -> &'a Value {
    safe_value(resp, collection)
        .and_then(|c| safe_value(c, id))
        .unwrap_or(&Value::Null)
}

#[async_trait]
impl Exchange for Alpaca {
    fn id(&self) -> &'static str {
        ID
    }

    fn catalog(&self) -> &MarketCatalog {
        &self.markets
    }

    async fn fetch_markets(&self) -> Result<Vec<Market>> {
        let params: Params = vec![
            ("asset_class", "crypto".to_string()),
            ("status", "active".to_string()),
        ];
        let resp = self.request(Endpoint::Assets, params).await?;
        let assets = resp
            .as_array()
            .ok_or_else(|| Error::bad_response(ID, &resp.to_string()))?;
        let markets: Vec<Market> = assets.iter().filter_map(parse_market).collect();
        info!("{}: loaded {} markets", ID, markets.len());
        Ok(markets)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let market = self.market(symbol).await?;
        let params: Params = vec![("symbols", market.id.clone())];

        let quotes = self.request(Endpoint::LatestQuotes, params.clone()).await?;
        let trades = self.request(Endpoint::LatestTrades, params.clone()).await?;
        let bars = self.request(Endpoint::LatestBars, params).await?;

        let raw = json!({
            "quote": keyed(&quotes, "quotes", &market.id),
            "trade": keyed(&trades, "trades", &market.id),
            "bar": keyed(&bars, "bars", &market.id),
        });
        Ok(parse_ticker(&raw, Some(&market)))
    }

    async fn fetch_order_book(&self, symbol: &str, limit: Option<u32>) -> Result<OrderBook> {
        let market = self.market(symbol).await?;
        let resp = self
            .request(Endpoint::LatestOrderBooks, vec![("symbols", market.id.clone())])
            .await?;
        let book = parse_order_book(keyed(&resp, "orderbooks", &market.id), &market.symbol);
        Ok(book.limit(limit.map(|l| l as usize)))
    }

    async fn fetch_trades(&self, symbol: &str, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Trade>> {
        let market = self.market(symbol).await?;
        let mut params: Params = vec![("symbols", market.id.clone())];
        if let Some(start) = since.and_then(iso8601) {
            params.push(("start", start));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let resp = self.request(Endpoint::Trades, params).await?;
        let rows = keyed(&resp, "trades", &market.id);
        let trades = rows
            .as_array()
            .map(|rows| rows.iter().map(|t| parse_trade(t, Some(&market))).collect())
            .unwrap_or_default();
        Ok(filter_by_since_limit(trades, since, limit, |t: &Trade| t.timestamp))
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
            ("symbols", market.id.clone()),
            ("timeframe", timeframe_token(timeframe).to_string()),
        ];
        if let Some(start) = since.and_then(iso8601) {
            params.push(("start", start));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let resp = self.request(Endpoint::Bars, params).await?;
        let candles = keyed(&resp, "bars", &market.id)
            .as_array()
            .map(|rows| rows.iter().filter_map(parse_ohlcv).collect())
            .unwrap_or_default();
        Ok(filter_by_since_limit(candles, since, limit, |c: &Candle| Some(c.timestamp)))
    }

    async fn fetch_balance(&self) -> Result<Balances> {
        let account = self.request(Endpoint::Account, Vec::new()).await?;
        let positions = self.request(Endpoint::Positions, Vec::new()).await?;
        let positions = positions.as_array().map(|p| p.as_slice()).unwrap_or(&[]);
        Ok(parse_balance(&account, positions))
    }

    async fn create_order(&self, request: OrderRequest) -> Result<Order> {
        request.validate(ID)?;
        let market = self.market(&request.symbol).await?;

        let mut params: Params = vec![
            ("symbol", market.id.clone()),
            (
                "qty",
                number_to_string(truncate(request.amount, market.precision.amount)),
            ),
            ("side", request.side.as_str().to_string()),
            ("type", request.order_type.as_str().to_string()),
        ];
        if let (OrderType::Limit, Some(price)) = (request.order_type, request.price) {
            params.push(("limit_price", number_to_string(round(price, market.precision.price))));
        }
        let tif = match request.time_in_force {
            Some(TimeInForce::IOC) => "ioc",
            Some(TimeInForce::FOK) => "fok",
            _ => "gtc",
        };
        params.push(("time_in_force", tif.to_string()));
        params.push(("client_order_id", self.client_order_id(&request)));

        debug!("{}: placing order {:?}", ID, request);
        let resp = self.request(Endpoint::CreateOrder, params).await?;
        let order = parse_order(&resp, Some(&market));
        info!("{}: order {} placed on {}", ID, order.id, market.symbol);
        Ok(order)
    }

    /// The cancel endpoint answers with an empty body, so the returned order
    /// only carries the id and the requested state.
    async fn cancel_order(&self, id: &str, symbol: Option<&str>) -> Result<Order> {
        let resp = self.request(Endpoint::CancelOrder(id.to_string()), Vec::new()).await?;
        let mut order = if resp.is_object() {
            parse_order(&resp, None)
        } else {
            Order::new(id, resp)
        };
        order.id = id.to_string();
        order.symbol = order.symbol.or_else(|| symbol.map(String::from));
        order.status = Some(OrderStatus::Canceled);
        info!("{}: order {} canceled", ID, id);
        Ok(order)
    }

    async fn fetch_order(&self, id: &str, _symbol: Option<&str>) -> Result<Order> {
        let index = self.load_markets().await?;
        let resp = self.request(Endpoint::Order(id.to_string()), Vec::new()).await?;
        let market = safe_string(&resp, "symbol").and_then(|m| index.by_id(&m).cloned());
        Ok(parse_order(&resp, market.as_ref()))
    }

    async fn fetch_orders(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Order>> {
        self.fetch_orders_with_status("all", symbol, since, limit).await
    }

    async fn fetch_open_orders(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Order>> {
        self.fetch_orders_with_status("open", symbol, since, limit).await
    }

    async fn fetch_closed_orders(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Order>> {
        self.fetch_orders_with_status("closed", symbol, since, limit).await
    }
}

impl Alpaca {
    /// Status filtering happens server-side.
    async fn fetch_orders_with_status(
        &self,
        status: &str,
        symbol: Option<&str>,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Order>> {
        let index = self.load_markets().await?;
        let mut params: Params = vec![("status", status.to_string())];
        if let Some(symbol) = symbol {
            params.push(("symbols", index.market(ID, symbol)?.id.clone()));
        }
        if let Some(after) = since.and_then(iso8601) {
            params.push(("after", after));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        let resp = self.request(Endpoint::Orders, params).await?;
        let orders = resp
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|raw| {
                        let market = safe_string(raw, "symbol").and_then(|id| index.by_id(&id));
                        parse_order(raw, market)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(filter_by_since_limit(orders, since, limit, |o: &Order| o.timestamp))
    }
}
