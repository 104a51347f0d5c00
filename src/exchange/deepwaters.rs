use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Exchange;
use crate::base::classify::classify_http_status;
use crate::base::precise::{number_to_string, round, truncate};
use crate::base::safe::{
    micros_to_millis, safe_array, safe_bool, safe_decimal, safe_integer, safe_string, safe_u32,
    safe_value,
};
use crate::base::signer::{ecdsa_recoverable_hex, json_body, keccak256, urlencode};
use crate::base::{
    safe_order, safe_trade, ErrorTable, HttpMethod, MarketCatalog, MarketIndex, NonceSource,
    Params, ServerNonce, SignedRequest, Transport,
};
use crate::config::{Credential, Credentials, ExchangeConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::types::{
    BalanceEntry, Balances, Candle, Currency, Market, Order, OrderBook, OrderBookLevel,
    OrderRequest, OrderSide, OrderStatus, OrderType, TakerOrMaker, Ticker, Timeframe, Trade,
};

pub const ID: &str = "deepwaters";

const DEEPWATERS_API: &str = "https://api.deepwaters.xyz/rest/v1";
const DEEPWATERS_TESTNET_API: &str = "https://testnet.api.deepwaters.xyz/rest/v1";
const SIGNED_PATH_PREFIX: &str = "/rest/v1";

const EXCEPTIONS: ErrorTable = ErrorTable::new(
    &[
        ("invalid nonce", ErrorKind::InvalidNonce),
        ("nonce could not be found", ErrorKind::InvalidNonce),
        ("nonce too low", ErrorKind::InvalidNonce),
    ],
    &[
        ("insufficient", ErrorKind::InsufficientFunds),
        ("not found", ErrorKind::OrderNotFound),
    ],
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Api {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Time,
    Assets,
    Pairs,
    OrderBook(String),
    Customer,
    ApiKeyStatus,
    Orders,
    OrderByVenueId(String),
    OrderByCustomerId(String),
    Trades,
    CreateOrder,
    CancelByVenueId(String),
    CancelByCustomerId(String),
}

impl Endpoint {
    fn descriptor(&self) -> (Api, HttpMethod, String) {
        match self {
            Endpoint::Time => (Api::Public, HttpMethod::Get, "time".into()),
            Endpoint::Assets => (Api::Public, HttpMethod::Get, "assets".into()),
            Endpoint::Pairs => (Api::Public, HttpMethod::Get, "pairs".into()),
            Endpoint::OrderBook(pair) => {
                (Api::Public, HttpMethod::Get, format!("pairs/{}/orderbook", pair))
            }
            Endpoint::Customer => (Api::Private, HttpMethod::Get, "customer".into()),
            Endpoint::ApiKeyStatus => {
                (Api::Private, HttpMethod::Get, "customer/api-key-status".into())
            }
            Endpoint::Orders => (Api::Private, HttpMethod::Get, "orders".into()),
            Endpoint::OrderByVenueId(id) => (
                Api::Private,
                HttpMethod::Get,
                format!("orders/by-venue-order-id/{}", id),
            ),
            Endpoint::OrderByCustomerId(id) => (
                Api::Private,
                HttpMethod::Get,
                format!("orders/by-customer-object-id/{}", id),
            ),
            Endpoint::Trades => (Api::Private, HttpMethod::Get, "trades".into()),
            Endpoint::CreateOrder => (Api::Private, HttpMethod::Post, "orders".into()),
            Endpoint::CancelByVenueId(id) => (
                Api::Private,
                HttpMethod::Delete,
                format!("orders/by-venue-order-id/{}", id),
            ),
            Endpoint::CancelByCustomerId(id) => (
                Api::Private,
                HttpMethod::Delete,
                format!("orders/by-customer-object-id/{}", id),
            ),
        }
    }

    /// Writes carry the account nonce; reads do not.
    fn needs_nonce(&self) -> bool {
        let (api, method, _) = self.descriptor();
        api == Api::Private && method != HttpMethod::Get
    }
}

/// Venue order ids are 0x-prefixed hashes; anything else is our own
/// customer object id.
fn is_venue_id(id: &str) -> bool {
    id.starts_with("0x")
}

pub struct Deepwaters {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    base_url: String,
    client_order_prefix: String,
    clock: NonceSource,
    nonce: ServerNonce,
    markets: MarketCatalog,
}

impl Deepwaters {
    pub fn new(config: &ExchangeConfig, transport: Arc<dyn Transport>) -> Self {
        let base_url = if config.sandbox {
            DEEPWATERS_TESTNET_API
        } else {
            DEEPWATERS_API
        };

        Self {
            transport,
            credentials: config.credentials.clone(),
            base_url: base_url.to_string(),
            client_order_prefix: config.client_order_prefix.clone(),
            clock: NonceSource::new(),
            nonce: ServerNonce::new(),
            markets: MarketCatalog::new(),
        }
    }

    /// Signs `METHOD + /rest/v1 + lowercase(path?query) + tsus + nonce + body`
    /// with keccak-256 and a recoverable secp256k1 signature.
    pub fn sign(
        &self,
        endpoint: &Endpoint,
        params: &[(&'static str, String)],
        timestamp_micros: i64,
        nonce: Option<u64>,
    ) -> Result<SignedRequest> {
        let (api, method, path) = endpoint.descriptor();
        let mut path = format!("/{}", path);

        let body = if method == HttpMethod::Post {
            Some(json_body(params))
        } else {
            if !params.is_empty() {
                path = format!("{}?{}", path, urlencode(params));
            }
            None
        };
        let url = format!("{}{}", self.base_url, path);

        if api == Api::Public {
            return Ok(SignedRequest::new(method, url));
        }

        let timestamp = timestamp_micros.to_string();
        let nonce = nonce.map(|n| n.to_string()).unwrap_or_default();
        let message = format!(
            "{}{}{}{}{}{}",
            method.as_str(),
            SIGNED_PATH_PREFIX,
            path.to_lowercase(),
            timestamp,
            nonce,
            body.as_deref().unwrap_or_default()
        );
        let signature = ecdsa_recoverable_hex(self.credentials.secret(), &keccak256(message.as_bytes()))?;

        let mut request = SignedRequest::new(method, url);
        if let Some(body) = body {
            request = request.json_body(body);
        }
        if !nonce.is_empty() {
            request = request.header("X-DW-NONCE", nonce);
        }
        Ok(request
            .header("X-DW-APIKEY", self.credentials.api_key())
            .header("X-DW-TSUS", timestamp)
            .header("X-DW-SIGHEX", signature))
    }

    /// Sends one request and unwraps the `{success, result}` envelope.
    async fn execute(&self, endpoint: &Endpoint, params: &Params, nonce: Option<u64>) -> Result<Value> {
        let (api, _, _) = endpoint.descriptor();
        if api == Api::Private {
            self.credentials
                .check_required(ID, &[Credential::ApiKey, Credential::Secret])?;
        }

        let request = self.sign(endpoint, params, self.clock.next_micros(), nonce)?;
        debug!("{}: {} {}", ID, request.method.as_str(), request.url);
        let resp = self.transport.execute(request).await?;
        if let Some(err) = handle_errors(resp.status, &resp.body) {
            return Err(err);
        }
        let body = resp.json(ID)?;
        Ok(safe_value(&body, "result").cloned().unwrap_or(body))
    }

    /// A failed write may leave the server's nonce behind ours, so the
    /// cached value is dropped and reloaded before the next write.
    async fn request(&self, endpoint: Endpoint, params: Params) -> Result<Value> {
        if !endpoint.needs_nonce() {
            return self.execute(&endpoint, &params, None).await;
        }
        let nonce = self.next_nonce().await?;
        let result = self.execute(&endpoint, &params, Some(nonce)).await;
        if let Err(e) = &result {
            warn!("{}: write with nonce {} failed ({}), reloading nonce", ID, nonce, e);
            self.nonce.reset();
        }
        result
    }

    /// Reads the account nonce from the api-key status once.
    pub async fn load_nonce(&self) -> Result<u64> {
        let result = self.execute(&Endpoint::ApiKeyStatus, &Vec::new(), None).await?;
        let nonce = safe_integer(&result, "nonce")
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| Error::new(ErrorKind::InvalidNonce, ID, "nonce could not be found"))?;
        self.nonce.set(nonce);
        info!("{}: loaded account nonce {}", ID, nonce);
        Ok(nonce)
    }

    async fn next_nonce(&self) -> Result<u64> {
        if !self.nonce.is_loaded() {
            self.load_nonce().await?;
        }
        self.nonce
            .advance()
            .ok_or_else(|| Error::new(ErrorKind::InvalidNonce, ID, "nonce not loaded"))
    }

    pub async fn fetch_time(&self) -> Result<i64> {
        let resp = self.request(Endpoint::Time, Vec::new()).await?;
        safe_integer(&resp, "timestampMicros")
            .map(micros_to_millis)
            .ok_or_else(|| Error::bad_response(ID, &resp.to_string()))
    }

    fn client_order_id(&self) -> String {
        format!("{}{}", self.client_order_prefix, Uuid::new_v4().simple())
    }

    async fn fetch_orders_with_status(
        &self,
        method: &str,
        status: Option<&str>,
        symbol: Option<&str>,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Order>> {
        let symbol = symbol.ok_or_else(|| Error::arguments_required(ID, method, "symbol"))?;
        let market = self.market(symbol).await?;

        let mut params: Params = vec![("pair", market.id.clone())];
        if let Some(status) = status {
            params.push(("status-in", status.to_string()));
        }
        if let Some(since) = since {
            params.push(("created-at-or-after-micros", (since * 1000).to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        let result = self.request(Endpoint::Orders, params).await?;
        Ok(safe_array(&result, "orders")
            .iter()
            .map(|raw| parse_order(raw, Some(&market)))
            .collect())
    }
}

pub fn handle_errors(status: u16, body: &str) -> Option<Error> {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        if safe_bool(&parsed, "success") == Some(false) {
            let message = safe_string(&parsed, "error").map(|m| m.to_lowercase());
            return Some(EXCEPTIONS.error(ID, None, message.as_deref(), body));
        }
    }
    if (200..300).contains(&status) {
        None
    } else {
        let kind = classify_http_status(status).unwrap_or(ErrorKind::ExchangeError);
        Some(Error::new(kind, ID, body))
    }
}

fn micros_field(raw: &Value, key: &str) -> Option<i64> {
    safe_integer(raw, key).map(micros_to_millis)
}

pub fn parse_market(raw: &Value) -> Option<Market> {
    let id = safe_string(raw, "name")?;
    let mut market = Market::spot(
        ID,
        id,
        safe_string(raw, "baseAssetID")?,
        safe_string(raw, "quoteAssetID")?,
        safe_string(raw, "baseAssetRootSymbol")?,
        safe_string(raw, "quoteAssetRootSymbol")?,
        raw.clone(),
    )?;

    market.active = Some(true);
    market.precision.amount = safe_u32(raw, "baseAssetIncrementPrecision");
    market.precision.price = safe_u32(raw, "quoteAssetIncrementPrecision");
    market.maker = Some(dec!(0.001));
    market.taker = Some(dec!(0.0015));
    Some(market)
}

pub fn parse_currency(raw: &Value) -> Option<Currency> {
    Some(Currency {
        id: safe_string(raw, "assetID")?,
        code: safe_string(raw, "rootSymbol")?,
        name: safe_string(raw, "name"),
        active: Some(true),
        deposit: Some(true),
        withdraw: Some(true),
        fee: None,
        precision: safe_u32(raw, "uiDecimals"),
        info: raw.clone(),
    })
}

/// Pair listings double as tickers: they carry the current best bid and ask.
pub fn parse_ticker(raw: &Value) -> Ticker {
    let symbol = match (
        safe_string(raw, "baseAssetRootSymbol"),
        safe_string(raw, "quoteAssetRootSymbol"),
    ) {
        (Some(base), Some(quote)) => format!("{}/{}", base, quote),
        _ => String::new(),
    };
    let mut ticker = Ticker::new(symbol, raw.clone());
    ticker.timestamp = micros_field(raw, "quotedAtMicros");
    ticker.bid = safe_decimal(raw, "bid");
    ticker.ask = safe_decimal(raw, "ask");
    ticker.complete()
}

fn parse_levels(rows: &[Value]) -> Vec<OrderBookLevel> {
    rows.iter()
        .filter_map(|row| {
            Some(OrderBookLevel::new(
                safe_decimal(row, "price")?,
                safe_decimal(row, "quantity")?,
            ))
        })
        .collect()
}

pub fn parse_order_book(raw: &Value, symbol: &str) -> OrderBook {
    OrderBook::new(
        symbol,
        parse_levels(safe_array(raw, "bids")),
        parse_levels(safe_array(raw, "asks")),
        micros_field(raw, "snapshotAtMicros"),
    )
}

pub fn parse_order_status(status: &str) -> Option<OrderStatus> {
    match status {
        "ACTIVE" | "PARTIALLY_FILLED" => Some(OrderStatus::Open),
        "FILLED" => Some(OrderStatus::Closed),
        "CANCELLED" => Some(OrderStatus::Canceled),
        "EXPIRED" => Some(OrderStatus::Expired),
        "REJECTED" => Some(OrderStatus::Rejected),
        _ => None,
    }
}

/// `quantity` is what is left on the book; `originalQuantity` is what was asked.
pub fn parse_order(raw: &Value, market: Option<&Market>) -> Order {
    let mut order = Order::new(safe_string(raw, "venueOrderID").unwrap_or_default(), raw.clone());
    order.client_order_id = safe_string(raw, "customerObjectID");
    order.symbol = market.map(|m| m.symbol.clone());
    order.timestamp = micros_field(raw, "createdAtMicros").or_else(|| micros_field(raw, "respondedAtMicros"));
    order.last_trade_timestamp = micros_field(raw, "modifiedAtMicros");
    order.order_type = safe_string(raw, "type").and_then(|t| OrderType::from_token(&t));
    order.side = safe_string(raw, "side").and_then(|s| OrderSide::from_token(&s));
    order.status = safe_string(raw, "status").and_then(|s| parse_order_status(&s));
    order.price = safe_decimal(raw, "price");
    order.average = safe_decimal(raw, "averagePrice");
    order.amount = safe_decimal(raw, "originalQuantity");
    order.remaining = safe_decimal(raw, "quantity");
    if let (Some(amount), Some(remaining)) = (order.amount, order.remaining) {
        order.filled = Some(amount - remaining);
    }
    if let (Some(price), Some(filled)) = (order.average.or(order.price), order.filled) {
        order.cost = Some(price * filled);
    }
    safe_order(order)
}

/// Side is derived from who made the trade and whether the maker bought.
pub fn parse_my_trade(raw: &Value, market: Option<&Market>) -> Trade {
    let symbol = market.map(|m| m.symbol.clone()).unwrap_or_default();
    let mut trade = Trade::new(symbol, raw.clone());
    trade.id = safe_string(raw, "tradeID");
    trade.timestamp = micros_field(raw, "createdAtMicros");

    let user_was_maker = safe_bool(raw, "userWasMaker").unwrap_or(false);
    let maker_was_buyer = safe_bool(raw, "makerWasBuyer").unwrap_or(false);
    trade.side = Some(if user_was_maker == maker_was_buyer {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    });
    trade.taker_or_maker = Some(TakerOrMaker::from_is_taker(!user_was_maker));
    trade.order_type = Some(if safe_bool(raw, "userWasAggressor").unwrap_or(false) {
        OrderType::Market
    } else {
        OrderType::Limit
    });
    trade.price = safe_decimal(raw, "price");
    trade.amount = safe_decimal(raw, "quantity");
    safe_trade(trade)
}

/// Maps asset ids (e.g. `WAVAX.AVALANCHE_FUJI.43113.TESTNET.PROD`) to codes
/// through the loaded pairs.
fn asset_code(index: &MarketIndex, asset_id: &str) -> Option<String> {
    index.markets().find_map(|m| {
        if m.base_id == asset_id {
            Some(m.base.clone())
        } else if m.quote_id == asset_id {
            Some(m.quote.clone())
        } else {
            None
        }
    })
}

/// `accounting.available` is free; `fee` and `swap.engine` holds add up to used.
pub fn parse_balance(raw: &Value, resolve: impl Fn(&str) -> Option<String>) -> Balances {
    let mut balances = Balances::new(raw.clone());
    balances.timestamp = micros_field(raw, "modifiedAtMicros");

    let mut sums: Vec<(String, Decimal, Decimal)> = Vec::new();
    for entry in safe_array(raw, "balances") {
        // unknown assets show up in sandbox airdrops
        let Some(code) = safe_string(entry, "assetID").and_then(|id| resolve(&id)) else {
            continue;
        };
        let amount = safe_decimal(entry, "amount").unwrap_or(Decimal::ZERO);
        let idx = match sums.iter().position(|(c, _, _)| *c == code) {
            Some(idx) => idx,
            None => {
                sums.push((code, Decimal::ZERO, Decimal::ZERO));
                sums.len() - 1
            }
        };
        match safe_string(entry, "serviceName").as_deref() {
            Some("accounting.available") => sums[idx].1 = amount,
            Some("fee") | Some("swap.engine") => sums[idx].2 += amount,
            _ => {}
        }
    }

    for (code, free, used) in sums {
        balances.insert(code, BalanceEntry::new(Some(free), Some(used), None));
    }
    balances
}

#[async_trait]
impl Exchange for Deepwaters {
    fn id(&self) -> &'static str {
        ID
    }

    fn catalog(&self) -> &MarketCatalog {
        &self.markets
    }

    async fn fetch_markets(&self) -> Result<Vec<Market>> {
        let result = self.request(Endpoint::Pairs, Vec::new()).await?;
        let pairs = result
            .as_array()
            .ok_or_else(|| Error::bad_response(ID, &result.to_string()))?;
        let markets: Vec<Market> = pairs.iter().filter_map(parse_market).collect();
        info!("{}: loaded {} markets", ID, markets.len());
        Ok(markets)
    }

    async fn fetch_currencies(&self) -> Result<Vec<Currency>> {
        let result = self.request(Endpoint::Assets, Vec::new()).await?;
        Ok(result
            .as_array()
            .map(|rows| rows.iter().filter_map(parse_currency).collect())
            .unwrap_or_default())
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let tickers = self.fetch_tickers(Some(&[symbol.to_string()])).await?;
        tickers
            .into_iter()
            .next()
            .ok_or_else(|| Error::bad_symbol(ID, symbol))
    }

    async fn fetch_tickers(&self, symbols: Option<&[String]>) -> Result<Vec<Ticker>> {
        let result = self.request(Endpoint::Pairs, Vec::new()).await?;
        let tickers = result
            .as_array()
            .map(|rows| rows.iter().map(parse_ticker).collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(match symbols {
            Some(symbols) => tickers
                .into_iter()
                .filter(|t| symbols.contains(&t.symbol))
                .collect(),
            None => tickers,
        })
    }

    async fn fetch_order_book(&self, symbol: &str, limit: Option<u32>) -> Result<OrderBook> {
        let market = self.market(symbol).await?;
        let mut params: Params = Vec::new();
        if let Some(limit) = limit {
            params.push(("depth", limit.to_string()));
        }
        let result = self.request(Endpoint::OrderBook(market.id.clone()), params).await?;
        Ok(parse_order_book(&result, &market.symbol).limit(limit.map(|l| l as usize)))
    }

    async fn fetch_trades(&self, _symbol: &str, _since: Option<i64>, _limit: Option<u32>) -> Result<Vec<Trade>> {
        Err(Error::not_supported(ID, "fetch_trades"))
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _since: Option<i64>,
        _limit: Option<u32>,
    ) -> Result<Vec<Candle>> {
        Err(Error::not_supported(ID, "fetch_ohlcv"))
    }

    async fn fetch_balance(&self) -> Result<Balances> {
        let index = self.load_markets().await?;
        let result = self.request(Endpoint::Customer, Vec::new()).await?;
        Ok(parse_balance(&result, |id| asset_code(&index, id)))
    }

    async fn create_order(&self, request: OrderRequest) -> Result<Order> {
        request.validate(ID)?;
        let market = self.market(&request.symbol).await?;

        let client_order_id = if request.client_order_id.is_empty() {
            self.client_order_id()
        } else {
            request.client_order_id.clone()
        };
        let mut params: Params = vec![
            ("baseAssetID", market.base_id.clone()),
            ("quoteAssetID", market.quote_id.clone()),
            ("type", request.order_type.as_str().to_uppercase()),
            ("side", request.side.as_str().to_uppercase()),
            (
                "quantity",
                number_to_string(truncate(request.amount, market.precision.amount)),
            ),
            ("durationType", "GOOD_TILL_CANCEL".to_string()),
            ("customerObjectID", client_order_id.clone()),
        ];
        if let (OrderType::Limit, Some(price)) = (request.order_type, request.price) {
            params.push(("price", number_to_string(round(price, market.precision.price))));
        }

        debug!("{}: placing order {:?}", ID, request);
        let result = self.request(Endpoint::CreateOrder, params).await?;

        let mut order = parse_order(&result, Some(&market));
        order.client_order_id = Some(client_order_id);
        order.order_type = Some(request.order_type);
        order.side = Some(request.side);
        order.amount = order.amount.or(Some(request.amount));
        if request.order_type == OrderType::Limit {
            order.price = request.price;
        }
        let order = safe_order(order);
        info!("{}: order {} placed on {}", ID, order.id, market.symbol);
        Ok(order)
    }

    async fn cancel_order(&self, id: &str, symbol: Option<&str>) -> Result<Order> {
        let endpoint = if is_venue_id(id) {
            Endpoint::CancelByVenueId(id.to_string())
        } else {
            Endpoint::CancelByCustomerId(id.to_string())
        };
        let result = self.request(endpoint, Vec::new()).await?;

        let mut order = Order::new(id, result.clone());
        order.symbol = symbol.map(String::from);
        order.status = Some(OrderStatus::Canceled);
        order.timestamp = micros_field(&result, "respondedAtMicros");
        info!("{}: order {} canceled", ID, id);
        Ok(order)
    }

    async fn fetch_order(&self, id: &str, _symbol: Option<&str>) -> Result<Order> {
        let index = self.load_markets().await?;
        let endpoint = if is_venue_id(id) {
            Endpoint::OrderByVenueId(id.to_string())
        } else {
            Endpoint::OrderByCustomerId(id.to_string())
        };
        let result = self.request(endpoint, Vec::new()).await?;
        let pair = match (safe_string(&result, "baseAssetID"), safe_string(&result, "quoteAssetID")) {
            (Some(base), Some(quote)) => index.by_id(&format!("{}-{}", base, quote)),
            _ => None,
        };
        Ok(parse_order(&result, pair))
    }

    async fn fetch_orders(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Order>> {
        self.fetch_orders_with_status("fetch_orders", None, symbol, since, limit)
            .await
    }

    async fn fetch_open_orders(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Order>> {
        self.fetch_orders_with_status("fetch_open_orders", Some("ACTIVE-PARTIALLY_FILLED"), symbol, since, limit)
            .await
    }

    async fn fetch_closed_orders(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Order>> {
        self.fetch_orders_with_status("fetch_closed_orders", Some("FILLED"), symbol, since, limit)
            .await
    }

    async fn fetch_my_trades(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Trade>> {
        let symbol = symbol.ok_or_else(|| Error::arguments_required(ID, "fetch_my_trades", "symbol"))?;
        let market = self.market(symbol).await?;

        let mut params: Params = vec![("pair", market.id.clone())];
        if let Some(since) = since {
            params.push(("created-at-or-after-micros", (since * 1000).to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let result = self.request(Endpoint::Trades, params).await?;
        Ok(safe_array(&result, "trades")
            .iter()
            .map(|raw| parse_my_trade(raw, Some(&market)))
            .collect())
    }
}
