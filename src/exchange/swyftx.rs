use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::Exchange;
use crate::base::classify::classify_http_status;
use crate::base::precise::{number_to_string, precision_from_tick, round, truncate};
use crate::base::safe::{
    milliseconds, safe_array, safe_bool, safe_decimal, safe_integer, safe_string, safe_u32,
    safe_value,
};
use crate::base::signer::{json_body, with_query};
use crate::base::{
    filter_by_since_limit, safe_order, ErrorTable, HttpMethod, MarketCatalog, MarketIndex,
    OrderCache, Params, SignedRequest, Transport,
};
use crate::config::{Credential, Credentials, ExchangeConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::types::{
    currency_code, BalanceEntry, Balances, Candle, Currency, Fee, Market, MinMax, Order,
    OrderBook, OrderRequest, OrderSide, OrderStatus, OrderType, Ticker, Timeframe, Trade,
};

pub const ID: &str = "swyftx";

const SWYFTX_API: &str = "https://api.swyftx.com.au";
const SWYFTX_DEMO_API: &str = "https://api.demo.swyftx.com.au";

/// AUD is the only quote asset.
const AUD_ID: &str = "1";

const EXCEPTIONS: ErrorTable = ErrorTable::new(
    &[
        ("Invalid API Key", ErrorKind::AuthenticationError),
        ("Invalid authentication credentials", ErrorKind::AuthenticationError),
        ("Insufficient funds", ErrorKind::InsufficientFunds),
        ("Insufficient balance", ErrorKind::InsufficientFunds),
        ("Invalid order", ErrorKind::InvalidOrder),
        ("Order not found", ErrorKind::OrderNotFound),
        ("Market not found", ErrorKind::BadSymbol),
        ("Asset not found", ErrorKind::BadSymbol),
        ("Rate limit exceeded", ErrorKind::RateLimitExceeded),
        ("Trading is disabled", ErrorKind::NotSupported),
    ],
    &[
        ("Invalid asset", ErrorKind::BadSymbol),
        ("Insufficient funds", ErrorKind::InsufficientFunds),
        ("Order not found", ErrorKind::OrderNotFound),
        ("API key", ErrorKind::AuthenticationError),
        ("Rate limit", ErrorKind::RateLimitExceeded),
    ],
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Api {
    Public,
    Auth,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Assets,
    LiveRates(String),
    Bars {
        base: String,
        quote: String,
        side: String,
    },
    RefreshToken,
    Balance,
    CreateOrder,
    CancelOrder(String),
    Order(String),
    Orders(Option<String>),
}

impl Endpoint {
    fn descriptor(&self) -> (Api, HttpMethod, String) {
        match self {
            Endpoint::Assets => (Api::Public, HttpMethod::Get, "markets/assets/".into()),
            Endpoint::LiveRates(asset) => {
                (Api::Public, HttpMethod::Get, format!("live-rates/{}/", asset))
            }
            Endpoint::Bars { base, quote, side } => (
                Api::Public,
                HttpMethod::Get,
                format!("charts/v2/getBars/{}/{}/{}/", base, quote, side),
            ),
            Endpoint::RefreshToken => (Api::Auth, HttpMethod::Post, "auth/refresh/".into()),
            Endpoint::Balance => (Api::Private, HttpMethod::Get, "user/balance/".into()),
            Endpoint::CreateOrder => (Api::Private, HttpMethod::Post, "orders/".into()),
            Endpoint::CancelOrder(id) => {
                (Api::Private, HttpMethod::Delete, format!("orders/{}/", id))
            }
            Endpoint::Order(id) => (Api::Private, HttpMethod::Get, format!("orders/byId/{}", id)),
            Endpoint::Orders(Some(asset)) => {
                (Api::Private, HttpMethod::Get, format!("orders/{}/", asset))
            }
            Endpoint::Orders(None) => (Api::Private, HttpMethod::Get, "orders/".into()),
        }
    }
}

/// Swyftx adapter. Private calls use a bearer token obtained from the API
/// key on first use; the token is kept for the lifetime of the adapter.
pub struct Swyftx {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    base_url: String,
    access_token: Mutex<Option<String>>,
    orders: OrderCache,
    markets: MarketCatalog,
}

impl Swyftx {
    pub fn new(config: &ExchangeConfig, transport: Arc<dyn Transport>) -> Self {
        let base_url = if config.sandbox {
            SWYFTX_DEMO_API
        } else {
            SWYFTX_API
        };

        Self {
            transport,
            credentials: config.credentials.clone(),
            base_url: base_url.to_string(),
            access_token: Mutex::new(None),
            orders: OrderCache::new(),
            markets: MarketCatalog::new(),
        }
    }

    pub fn sign(
        &self,
        endpoint: &Endpoint,
        params: &[(&'static str, String)],
        token: Option<&str>,
    ) -> SignedRequest {
        let (api, method, path) = endpoint.descriptor();
        let url = format!("{}/{}", self.base_url, path);

        let mut request = if method.has_body() {
            SignedRequest::new(method, url).json_body(json_body(params))
        } else {
            SignedRequest::new(method, with_query(url, params))
        };
        if let (Api::Private, Some(token)) = (api, token) {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request
    }

    async fn send(&self, request: SignedRequest) -> Result<Value> {
        debug!("{}: {} {}", ID, request.method.as_str(), request.url);
        let resp = self.transport.execute(request).await?;
        if let Some(err) = handle_errors(resp.status, &resp.body) {
            return Err(err);
        }
        resp.json(ID)
    }

    /// Exchanges the API key for an access token and caches it.
    pub async fn authenticate(&self) -> Result<String> {
        self.credentials.check_required(ID, &[Credential::ApiKey])?;
        let params: Params = vec![("apiKey", self.credentials.api_key().to_string())];
        let resp = self
            .send(self.sign(&Endpoint::RefreshToken, &params, None))
            .await?;
        let token = safe_string(&resp, "accessToken").ok_or_else(|| {
            Error::new(ErrorKind::AuthenticationError, ID, "login returned no access token")
        })?;
        *self.access_token.lock() = Some(token.clone());
        info!("{}: session token acquired", ID);
        Ok(token)
    }

    async fn token(&self) -> Result<String> {
        let cached = self.access_token.lock().clone();
        match cached {
            Some(token) => Ok(token),
            None => self.authenticate().await,
        }
    }

    async fn request(&self, endpoint: Endpoint, params: Params) -> Result<Value> {
        let (api, _, _) = endpoint.descriptor();
        let token = if api == Api::Private {
            Some(self.token().await?)
        } else {
            None
        };
        self.send(self.sign(&endpoint, &params, token.as_deref()))
            .await
    }

    fn market_for_order(index: &MarketIndex, raw: &Value) -> Option<Market> {
        let primary = safe_string(raw, "primary_asset")?;
        let secondary = safe_string(raw, "secondary_asset")?;
        index
            .by_id(&format!("{}/{}", secondary, primary))
            .or_else(|| index.by_id(&format!("{}/{}", primary, secondary)))
            .cloned()
    }
}

/// The error text may sit at the top level or inside an `error` object.
fn error_message(body: &Value) -> Option<String> {
    match safe_value(body, "error") {
        Some(inner @ Value::Object(_)) => {
            safe_string(inner, "message").or_else(|| safe_string(inner, "error"))
        }
        _ => safe_string(body, "message").or_else(|| safe_string(body, "error")),
    }
}

pub fn handle_errors(status: u16, body: &str) -> Option<Error> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let has_error = parsed
        .as_ref()
        .map(|v| ["error", "message", "code"].iter().any(|k| safe_value(v, k).is_some()))
        .unwrap_or(false);

    let by_status = match status {
        401 => Some(ErrorKind::AuthenticationError),
        403 => Some(ErrorKind::PermissionDenied),
        429 => Some(ErrorKind::RateLimitExceeded),
        400 => Some(ErrorKind::BadRequest),
        _ => None,
    };

    if has_error {
        if let Some(kind) = by_status {
            return Some(Error::new(kind, ID, body));
        }
        let message = parsed.as_ref().and_then(error_message);
        return Some(EXCEPTIONS.error(ID, None, message.as_deref(), body));
    }
    if (200..300).contains(&status) {
        return None;
    }
    let kind = by_status
        .or_else(|| classify_http_status(status))
        .unwrap_or(ErrorKind::ExchangeError);
    Some(Error::new(kind, ID, body))
}

/// One market per listed asset against AUD. `aud` supplies the quote's
/// price scale.
pub fn parse_market(asset: &Value, rate: &Value, aud: &Value) -> Option<Market> {
    let base_id = safe_string(asset, "id")?;
    if base_id == AUD_ID {
        return None;
    }
    let quote = currency_code(&safe_string(aud, "code")?);
    let mut market = Market::spot(
        ID,
        format!("{}/{}", base_id, AUD_ID),
        base_id,
        AUD_ID,
        currency_code(&safe_string(asset, "code")?),
        quote,
        json!({ "asset": asset, "rate": rate }),
    )?;

    let buy_liquidity = safe_bool(rate, "buyLiquidityFlag").unwrap_or(false);
    let sell_liquidity = safe_bool(rate, "sellLiquidityFlag").unwrap_or(false);
    let deposit = safe_bool(asset, "deposit_enabled").unwrap_or(true);
    let withdraw = safe_bool(asset, "withdraw_enabled").unwrap_or(true);
    market.active = Some(!buy_liquidity && !sell_liquidity && deposit && withdraw);

    market.precision.price = Some(safe_u32(aud, "price_scale").unwrap_or(6));
    market.precision.amount = safe_string(asset, "minimum_order_increment")
        .and_then(|tick| precision_from_tick(&tick))
        .or_else(|| Some(safe_u32(asset, "price_scale").unwrap_or(8)));
    market.limits.amount = MinMax::new(safe_decimal(asset, "minimum_order"), None);
    market.tier_based = true;
    market.maker = Some(dec!(0.006));
    market.taker = Some(dec!(0.006));
    Some(market)
}

pub fn parse_currency(raw: &Value) -> Option<Currency> {
    let deposit = safe_bool(raw, "deposit_enabled").unwrap_or(true);
    let withdraw = safe_bool(raw, "withdraw_enabled").unwrap_or(true);
    Some(Currency {
        id: safe_string(raw, "id")?,
        code: currency_code(&safe_string(raw, "code")?),
        name: safe_string(raw, "name"),
        active: Some(deposit || withdraw),
        deposit: Some(deposit),
        withdraw: Some(withdraw),
        fee: safe_decimal(raw, "mining_fee"),
        precision: Some(safe_u32(raw, "price_scale").unwrap_or(8)),
        info: raw.clone(),
    })
}

/// Live rates carry no timestamp; the mid price stands in for the last trade.
pub fn parse_ticker(rate: &Value, market: &Market) -> Ticker {
    let mut ticker = Ticker::new(market.symbol.clone(), rate.clone());
    ticker.bid = safe_decimal(rate, "bidPrice");
    ticker.ask = safe_decimal(rate, "askPrice");
    ticker.last = safe_decimal(rate, "midPrice");
    ticker.percentage = safe_decimal(rate, "dailyPriceChange");
    ticker.complete()
}

pub fn parse_ohlcv(raw: &Value) -> Option<Candle> {
    Some(Candle {
        timestamp: safe_integer(raw, "time")?,
        open: safe_decimal(raw, "open"),
        high: safe_decimal(raw, "high"),
        low: safe_decimal(raw, "low"),
        close: safe_decimal(raw, "close"),
        volume: safe_decimal(raw, "volume"),
    })
}

/// Numeric order type codes.
pub fn order_type_code(order_type: OrderType, side: OrderSide) -> &'static str {
    match (order_type, side) {
        (OrderType::Limit, OrderSide::Buy) => "1",
        (OrderType::Limit, OrderSide::Sell) => "2",
        (OrderType::Market, OrderSide::Buy) => "3",
        (OrderType::Market, OrderSide::Sell) => "4",
    }
}

pub fn parse_order_type_code(code: &str) -> Option<(OrderType, OrderSide)> {
    match code {
        "1" => Some((OrderType::Limit, OrderSide::Buy)),
        "2" => Some((OrderType::Limit, OrderSide::Sell)),
        "3" => Some((OrderType::Market, OrderSide::Buy)),
        "4" => Some((OrderType::Market, OrderSide::Sell)),
        _ => None,
    }
}

pub fn parse_order_status(code: &str) -> Option<OrderStatus> {
    match code {
        "1" | "3" | "5" => Some(OrderStatus::Open),
        "4" => Some(OrderStatus::Closed),
        "2" | "6" | "8" | "10" => Some(OrderStatus::Canceled),
        "7" | "9" => Some(OrderStatus::Rejected),
        _ => None,
    }
}

pub fn parse_order(raw: &Value, market: Option<&Market>) -> Order {
    let mut order = Order::new(safe_string(raw, "orderUuid").unwrap_or_default(), raw.clone());
    order.symbol = market.map(|m| m.symbol.clone());
    if let Some((order_type, side)) = safe_string(raw, "order_type").and_then(|c| parse_order_type_code(&c)) {
        order.order_type = Some(order_type);
        order.side = Some(side);
    }
    order.status = safe_string(raw, "status").and_then(|s| parse_order_status(&s));
    order.timestamp = safe_integer(raw, "created_time");
    order.last_trade_timestamp = safe_integer(raw, "updated_time");
    order.amount = safe_decimal(raw, "amount");
    order.cost = safe_decimal(raw, "total");
    order.average = safe_decimal(raw, "rate");

    // sell triggers are quoted inverted (quote per base)
    let trigger = safe_decimal(raw, "trigger").or(order.average);
    order.price = match order.side {
        Some(OrderSide::Sell) => trigger
            .filter(|t| *t > Decimal::ZERO)
            .map(|t| Decimal::ONE / t),
        _ => trigger,
    };
    order.stop_price = safe_decimal(raw, "trigger");
    order.fee = Fee::new(safe_decimal(raw, "feeAmount"), safe_string(raw, "feeAsset"));
    safe_order(order)
}

/// Balances are keyed by asset id; AUD and listed assets resolve to codes.
pub fn parse_balance(rows: &[Value], index: Option<&MarketIndex>) -> Balances {
    let mut balances = Balances::new(Value::Array(rows.to_vec()));
    for row in rows {
        let Some(asset_id) = safe_string(row, "assetId") else {
            continue;
        };
        let code = if asset_id == AUD_ID {
            "AUD".to_string()
        } else {
            index
                .and_then(|i| i.by_id(&format!("{}/{}", asset_id, AUD_ID)))
                .map(|m| m.base.clone())
                .unwrap_or(asset_id)
        };
        let available = safe_decimal(row, "availableBalance");
        balances.insert(code, BalanceEntry::new(available, Some(Decimal::ZERO), available));
    }
    balances
}

#[async_trait]
impl Exchange for Swyftx {
    fn id(&self) -> &'static str {
        ID
    }

    fn catalog(&self) -> &MarketCatalog {
        &self.markets
    }

    async fn fetch_markets(&self) -> Result<Vec<Market>> {
        let assets = self.request(Endpoint::Assets, Vec::new()).await?;
        let rates = self
            .request(Endpoint::LiveRates(AUD_ID.to_string()), Vec::new())
            .await?;
        let assets = assets
            .as_array()
            .ok_or_else(|| Error::bad_response(ID, &assets.to_string()))?;
        let aud = assets
            .iter()
            .find(|a| safe_string(a, "id").as_deref() == Some(AUD_ID))
            .ok_or_else(|| Error::bad_response(ID, "AUD asset missing from asset list"))?;

        let markets: Vec<Market> = assets
            .iter()
            .filter_map(|asset| {
                let rate = safe_string(asset, "id").and_then(|id| safe_value(&rates, &id))?;
                parse_market(asset, rate, aud)
            })
            .collect();
        info!("{}: loaded {} markets", ID, markets.len());
        Ok(markets)
    }

    async fn fetch_currencies(&self) -> Result<Vec<Currency>> {
        let assets = self.request(Endpoint::Assets, Vec::new()).await?;
        Ok(assets
            .as_array()
            .map(|rows| rows.iter().filter_map(parse_currency).collect())
            .unwrap_or_default())
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let market = self.market(symbol).await?;
        let rates = self
            .request(Endpoint::LiveRates(market.quote_id.clone()), Vec::new())
            .await?;
        let rate = safe_value(&rates, &market.base_id).ok_or_else(|| Error::bad_symbol(ID, symbol))?;
        Ok(parse_ticker(rate, &market))
    }

    async fn fetch_tickers(&self, symbols: Option<&[String]>) -> Result<Vec<Ticker>> {
        let index = self.load_markets().await?;
        let rates = self
            .request(Endpoint::LiveRates(AUD_ID.to_string()), Vec::new())
            .await?;
        let mut tickers: Vec<Ticker> = rates
            .as_object()
            .map(|rates| {
                rates
                    .iter()
                    .filter_map(|(asset_id, rate)| {
                        let market = index.by_id(&format!("{}/{}", asset_id, AUD_ID))?;
                        Some(parse_ticker(rate, market))
                    })
                    .collect()
            })
            .unwrap_or_default();
        if let Some(symbols) = symbols {
            tickers.retain(|t| symbols.contains(&t.symbol));
        }
        Ok(tickers)
    }

    /// There is no depth endpoint, so the book holds only the live best
    /// bid and ask with unknown amounts.
    async fn fetch_order_book(&self, symbol: &str, _limit: Option<u32>) -> Result<OrderBook> {
        let ticker = self.fetch_ticker(symbol).await?;
        Ok(OrderBook::from_best_quotes(symbol, ticker.bid, ticker.ask, ticker.timestamp))
    }

    async fn fetch_trades(&self, _symbol: &str, _since: Option<i64>, _limit: Option<u32>) -> Result<Vec<Trade>> {
        Err(Error::not_supported(ID, "fetch_trades"))
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>> {
        let market = self.market(symbol).await?;
        if limit.map(|l| l > 10_000).unwrap_or(false) {
            return Err(Error::new(ErrorKind::BadRequest, ID, "limit cannot exceed 10000"));
        }
        let now = milliseconds();
        let mut params: Params = vec![
            ("resolution", timeframe.as_str().to_string()),
            ("timeStart", since.unwrap_or(now - 86_400_000).to_string()),
            ("timeEnd", now.to_string()),
        ];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        let endpoint = Endpoint::Bars {
            base: market.base.clone(),
            quote: market.quote.clone(),
            side: "ask".to_string(),
        };
        let resp = self.request(endpoint, params).await?;
        let rows = resp
            .as_array()
            .map(|rows| rows.as_slice())
            .unwrap_or_else(|| safe_array(&resp, "candles"));
        let candles = rows.iter().filter_map(parse_ohlcv).collect();
        Ok(filter_by_since_limit(candles, since, limit, |c: &Candle| Some(c.timestamp)))
    }

    async fn fetch_balance(&self) -> Result<Balances> {
        let index = self.load_markets().await?;
        let resp = self.request(Endpoint::Balance, Vec::new()).await?;
        let rows = resp.as_array().map(|r| r.as_slice()).unwrap_or(&[]);
        Ok(parse_balance(rows, Some(index.as_ref())))
    }

    /// Limit buys are sized in the quote asset; limit sell triggers are
    /// the inverted price.
    async fn create_order(&self, request: OrderRequest) -> Result<Order> {
        request.validate(ID)?;
        let market = self.market(&request.symbol).await?;

        let amount = truncate(request.amount, market.precision.amount);
        let (primary, secondary, quantity, asset_quantity, trigger) =
            match (request.order_type, request.side, request.price) {
                (OrderType::Limit, OrderSide::Buy, Some(price)) => (
                    &market.quote,
                    &market.base,
                    number_to_string(round(amount * price, market.precision.price)),
                    &market.quote,
                    Some(number_to_string(round(price, market.precision.price))),
                ),
                (OrderType::Limit, OrderSide::Sell, Some(price)) => (
                    &market.base,
                    &market.quote,
                    number_to_string(amount),
                    &market.base,
                    Some(number_to_string(Decimal::ONE / price)),
                ),
                _ => (
                    &market.base,
                    &market.quote,
                    number_to_string(amount),
                    &market.base,
                    None,
                ),
            };

        let mut params: Params = vec![
            ("primary", primary.clone()),
            ("secondary", secondary.clone()),
            ("quantity", quantity),
            ("assetQuantity", asset_quantity.clone()),
            ("orderType", order_type_code(request.order_type, request.side).to_string()),
        ];
        if let Some(trigger) = trigger {
            params.push(("trigger", trigger));
        }

        debug!("{}: placing order {:?}", ID, request);
        let resp = self.request(Endpoint::CreateOrder, params).await?;

        let raw = safe_value(&resp, "order").cloned().unwrap_or_else(|| json!({}));
        let mut order = parse_order(&raw, Some(&market));
        order.id = safe_string(&resp, "orderUuid").unwrap_or(order.id);
        order.info = resp;
        order.order_type = Some(request.order_type);
        order.side = Some(request.side);
        order.amount = order.amount.or(Some(request.amount));
        order.price = order.price.or(request.price);
        order.status = order.status.or(Some(OrderStatus::Open));
        let order = safe_order(order);

        self.orders.remember(&order);
        info!("{}: order {} placed on {}", ID, order.id, market.symbol);
        Ok(order)
    }

    async fn cancel_order(&self, id: &str, symbol: Option<&str>) -> Result<Order> {
        let resp = self
            .request(Endpoint::CancelOrder(id.to_string()), Vec::new())
            .await?;
        let mut order = Order::new(id, resp);
        order.symbol = symbol.map(String::from);
        order.status = Some(OrderStatus::Canceled);
        info!("{}: order {} canceled", ID, id);
        Ok(self.orders.reconcile(order))
    }

    async fn fetch_order(&self, id: &str, _symbol: Option<&str>) -> Result<Order> {
        let index = self.load_markets().await?;
        let resp = self.request(Endpoint::Order(id.to_string()), Vec::new()).await?;
        let market = Self::market_for_order(&index, &resp);
        Ok(self.orders.reconcile(parse_order(&resp, market.as_ref())))
    }

    async fn fetch_orders(&self, symbol: Option<&str>, since: Option<i64>, limit: Option<u32>) -> Result<Vec<Order>> {
        let index = self.load_markets().await?;
        let market = match symbol {
            Some(symbol) => Some(index.market(ID, symbol)?.clone()),
            None => None,
        };
        let mut params: Params = Vec::new();
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        let endpoint = Endpoint::Orders(market.as_ref().map(|m| m.base.clone()));
        let resp = self.request(endpoint, params).await?;
        let rows = resp
            .as_array()
            .map(|rows| rows.as_slice())
            .unwrap_or_else(|| safe_array(&resp, "orders"));
        let orders = rows
            .iter()
            .map(|raw| {
                let market = market.clone().or_else(|| Self::market_for_order(&index, raw));
                self.orders.reconcile(parse_order(raw, market.as_ref()))
            })
            .collect();
        Ok(filter_by_since_limit(orders, since, limit, |o: &Order| o.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{HttpResponse, MockTransport};

    fn assets_fixture() -> Value {
        json!([
            {"id": 1, "code": "AUD", "name": "Australian Dollars", "price_scale": 2,
             "deposit_enabled": true, "withdraw_enabled": true},
            {"id": 3, "code": "BTC", "name": "Bitcoin", "price_scale": 8,
             "minimum_order": "0.000001", "minimum_order_increment": "0.00000001",
             "deposit_enabled": true, "withdraw_enabled": true, "mining_fee": "0.0001"},
            {"id": 5, "code": "ETH", "name": "Ethereum", "price_scale": 8,
             "deposit_enabled": false, "withdraw_enabled": true}
        ])
    }

    fn rates_fixture() -> Value {
        json!({
            "1": {"askPrice": "1", "bidPrice": "1", "midPrice": "1"},
            "3": {"askPrice": "50010", "bidPrice": "49990", "midPrice": "50000",
                  "dailyPriceChange": "1.5", "buyLiquidityFlag": false, "sellLiquidityFlag": false},
            "5": {"askPrice": "3010", "bidPrice": "2990", "midPrice": "3000"}
        })
    }

    fn markets() -> Vec<Market> {
        let assets = assets_fixture();
        let rates = rates_fixture();
        let aud = &assets[0];
        assets
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|a| {
                let id = safe_string(a, "id").unwrap();
                parse_market(a, &rates[id.as_str()], aud)
            })
            .collect()
    }

    fn exchange(mock: MockTransport) -> Swyftx {
        let config = ExchangeConfig::new(ID).with_credentials(Credentials::new("swyftx-key", ""));
        Swyftx::new(&config, Arc::new(mock))
    }

    fn mock_public(mock: &mut MockTransport) {
        mock.expect_execute()
            .withf(|req| req.url.ends_with("/markets/assets/"))
            .returning(|_| Ok(HttpResponse::new(200, assets_fixture().to_string())));
        mock.expect_execute()
            .withf(|req| req.url.ends_with("/live-rates/1/"))
            .returning(|_| Ok(HttpResponse::new(200, rates_fixture().to_string())));
    }

    #[test]
    fn test_parse_markets_skips_aud() {
        let markets = markets();
        assert_eq!(markets.len(), 2);
        let btc = &markets[0];
        assert_eq!(btc.symbol, "BTC/AUD");
        assert_eq!(btc.id, "3/1");
        assert_eq!(btc.precision.price, Some(2));
        assert_eq!(btc.precision.amount, Some(8));
        assert_eq!(btc.limits.amount.min, Some(dec!(0.000001)));
        assert_eq!(btc.active, Some(true));
        // deposits disabled
        assert_eq!(markets[1].active, Some(false));
    }

    #[test]
    fn test_parse_ticker() {
        let markets = markets();
        let ticker = parse_ticker(&rates_fixture()["3"], &markets[0]);
        assert_eq!(ticker.last, Some(dec!(50000)));
        assert_eq!(ticker.percentage, Some(dec!(1.5)));
        assert!(ticker.bid.unwrap() <= ticker.ask.unwrap());
    }

    #[test]
    fn test_order_codes() {
        assert_eq!(order_type_code(OrderType::Limit, OrderSide::Sell), "2");
        assert_eq!(parse_order_type_code("3"), Some((OrderType::Market, OrderSide::Buy)));
        assert_eq!(parse_order_status("5"), Some(OrderStatus::Open));
        assert_eq!(parse_order_status("10"), Some(OrderStatus::Canceled));
        assert_eq!(parse_order_status("9"), Some(OrderStatus::Rejected));
        assert_eq!(parse_order_status("42"), None);
    }

    #[test]
    fn test_sell_price_is_inverted_trigger() {
        let raw = json!({"orderUuid": "ord_1", "order_type": 2, "status": 1,
                         "amount": "0.5", "trigger": "0.00002", "created_time": 1700000000000i64});
        let order = parse_order(&raw, None);
        assert_eq!(order.side, Some(OrderSide::Sell));
        assert_eq!(order.price, Some(dec!(50000)));
        assert_eq!(order.status, Some(OrderStatus::Open));
    }

    #[test]
    fn test_parse_balance() {
        let index = MarketIndex::new(markets());
        let rows = vec![
            json!({"assetId": 1, "availableBalance": "250.5"}),
            json!({"assetId": 3, "availableBalance": "0.1"}),
            json!({"assetId": 99, "availableBalance": "7"}),
        ];
        let balances = parse_balance(&rows, Some(&index));
        assert_eq!(balances.total("AUD"), Some(dec!(250.5)));
        assert_eq!(balances.get("BTC").unwrap().used, Some(Decimal::ZERO));
        assert_eq!(balances.free("99"), Some(dec!(7)));
    }

    #[test]
    fn test_handle_errors() {
        let err = handle_errors(401, r#"{"error": {"error": "Unauthorized", "message": "bad token"}}"#).unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::AuthenticationError));
        let err = handle_errors(500, r#"{"error": {"error": "x", "message": "Insufficient funds"}}"#).unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::InsufficientFunds));
        let err = handle_errors(500, r#"{"message": "Invalid asset code ZZZ"}"#).unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::BadSymbol));
        let err = handle_errors(503, "").unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::ExchangeNotAvailable));
        assert!(handle_errors(200, r#"{"orderUuid": "x"}"#).is_none());
    }

    #[test]
    fn test_sign_attaches_bearer() {
        let swyftx = exchange(MockTransport::new());
        let req = swyftx.sign(&Endpoint::Balance, &[], Some("tok"));
        assert_eq!(req.header_value("Authorization"), Some("Bearer tok"));
        let req = swyftx.sign(&Endpoint::Assets, &[], Some("tok"));
        assert!(req.header_value("Authorization").is_none());
    }

    #[tokio::test]
    async fn test_order_book_is_depth_one() {
        let mut mock = MockTransport::new();
        mock_public(&mut mock);
        let book = exchange(mock).fetch_order_book("BTC/AUD", Some(20)).await.unwrap();
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.bids[0].price, dec!(49990));
        assert_eq!(book.bids[0].amount, None);
    }

    #[tokio::test]
    async fn test_token_reused_and_cache_fills_cancel() {
        let mut mock = MockTransport::new();
        mock_public(&mut mock);
        mock.expect_execute()
            .withf(|req| req.url.ends_with("/auth/refresh/"))
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"accessToken": "tok-1"}"#)));
        mock.expect_execute()
            .withf(|req| {
                let body: Value = serde_json::from_str(req.body.as_deref().unwrap_or("{}")).unwrap();
                req.method == HttpMethod::Post
                    && req.url.ends_with("/orders/")
                    && req.header_value("Authorization") == Some("Bearer tok-1")
                    && body["orderType"] == "1"
                    && body["primary"] == "AUD"
                    && body["quantity"] == "500"
                    && body["trigger"] == "50000"
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    json!({"orderUuid": "ord_abc", "order": {"order_type": 1, "status": 1, "amount": "0.01",
                           "created_time": 1700000000000i64}})
                    .to_string(),
                ))
            });
        mock.expect_execute()
            .withf(|req| req.method == HttpMethod::Delete && req.url.ends_with("/orders/ord_abc/"))
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "{}")));

        let swyftx = exchange(mock);
        let order = swyftx
            .create_order(OrderRequest::limit("BTC/AUD", OrderSide::Buy, dec!(0.01), dec!(50000)))
            .await
            .unwrap();
        assert_eq!(order.id, "ord_abc");
        assert_eq!(order.status, Some(OrderStatus::Open));
        assert_eq!(order.price, Some(dec!(50000)));

        let canceled = swyftx.cancel_order("ord_abc", None).await.unwrap();
        assert_eq!(canceled.status, Some(OrderStatus::Canceled));
        assert_eq!(canceled.symbol.as_deref(), Some("BTC/AUD"));
        assert_eq!(canceled.side, Some(OrderSide::Buy));
    }
}
