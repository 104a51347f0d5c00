use flate2::read::GzDecoder;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Read;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::base::safe::{
    milliseconds, safe_array, safe_bool, safe_decimal, safe_decimal_at, safe_integer,
    safe_string, safe_string_n,
};
use crate::base::signer::hmac_sha256_hex;
use crate::base::{safe_order, safe_trade, ErrorTable};
use crate::config::{Credential, Credentials, ExchangeConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::types::{
    currency_code, split_symbol, BalanceEntry, Balances, Fee, Order, OrderBook, OrderBookLevel,
    OrderSide, OrderStatus, OrderType, Ticker, Trade,
};

pub const ID: &str = "coinex";

const WS_URL: &str = "wss://socket.coinex.com/v2/spot/";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const DEPTH_LIMITS: [usize; 4] = [5, 10, 20, 50];

const EXCEPTIONS: ErrorTable = ErrorTable::new(
    &[
        ("1", ErrorKind::BadRequest),
        ("2", ErrorKind::ExchangeError),
        ("3", ErrorKind::ExchangeNotAvailable),
        ("4", ErrorKind::NotSupported),
        // request timeout
        ("5", ErrorKind::ExchangeNotAvailable),
        ("6", ErrorKind::AuthenticationError),
    ],
    &[],
);

/// Events pushed to the consumer of a socket session.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Ticker(Ticker),
    Trades { symbol: String, trades: Vec<Trade> },
    OrderBook(OrderBook),
    Balance(Balances),
    Orders(Vec<Order>),
    Authenticated,
    Disconnected,
    Error { kind: Option<ErrorKind>, message: String },
}

impl StreamEvent {
    /// The key a watcher waits on, e.g. `ticker:BTC/USDT`.
    pub fn message_hash(&self) -> Option<String> {
        match self {
            StreamEvent::Ticker(ticker) => Some(format!("ticker:{}", ticker.symbol)),
            StreamEvent::Trades { symbol, .. } => Some(format!("trades:{}", symbol)),
            StreamEvent::OrderBook(book) => Some(format!("orderbook:{}", book.symbol)),
            StreamEvent::Balance(_) => Some("balance".to_string()),
            StreamEvent::Orders(_) => Some("orders".to_string()),
            _ => None,
        }
    }

    fn from_error(err: &Error) -> Self {
        StreamEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Subscription {
    Ticker(String),
    Trades(String),
    OrderBook { symbol: String, limit: usize },
    Balance(Vec<String>),
    Orders(Vec<String>),
}

impl Subscription {
    fn method(&self) -> &'static str {
        match self {
            Subscription::Ticker(_) => "state.subscribe",
            Subscription::Trades(_) => "deals.subscribe",
            Subscription::OrderBook { .. } => "depth.subscribe",
            Subscription::Balance(_) => "balance.subscribe",
            Subscription::Orders(_) => "order.subscribe",
        }
    }

    fn params(&self) -> Value {
        match self {
            Subscription::Ticker(symbol) | Subscription::Trades(symbol) => {
                json!({ "market_list": [market_id(symbol)] })
            }
            Subscription::OrderBook { symbol, limit } => {
                json!({ "market_list": [[market_id(symbol), limit, "0", true]] })
            }
            Subscription::Balance(codes) => json!({ "ccy_list": codes }),
            Subscription::Orders(symbols) => {
                let ids: Vec<String> = symbols.iter().map(|s| market_id(s)).collect();
                json!({ "market_list": ids })
            }
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Subscription::Balance(_) | Subscription::Orders(_))
    }

    fn symbols(&self) -> Vec<&str> {
        match self {
            Subscription::Ticker(symbol) | Subscription::Trades(symbol) => vec![symbol.as_str()],
            Subscription::OrderBook { symbol, .. } => vec![symbol.as_str()],
            Subscription::Orders(symbols) => symbols.iter().map(String::as_str).collect(),
            Subscription::Balance(_) => Vec::new(),
        }
    }
}

/// `BTC/USDT` -> `BTCUSDT`.
pub fn market_id(symbol: &str) -> String {
    symbol.replace('/', "").to_uppercase()
}

/// Builds `{id, method, params}` request envelopes with increasing ids.
#[derive(Debug, Default)]
pub struct RequestIds {
    next: u64,
}

impl RequestIds {
    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next += 1;
        json!({ "id": self.next, "method": method, "params": params })
    }
}

pub fn sign_request(ids: &mut RequestIds, credentials: &Credentials, timestamp: i64) -> Result<Value> {
    let signed = hmac_sha256_hex(
        credentials.secret().as_bytes(),
        timestamp.to_string().as_bytes(),
    )?;
    Ok(ids.request(
        "server.sign",
        json!({
            "access_id": credentials.api_key(),
            "signed_str": signed.to_lowercase(),
            "timestamp": timestamp,
        }),
    ))
}

/// Inflates a gzip binary frame.
pub fn decode_frame(bytes: &[u8]) -> Result<String> {
    let mut text = String::new();
    GzDecoder::new(bytes)
        .read_to_string(&mut text)
        .map_err(|e| Error::bad_response(ID, &e.to_string()))?;
    Ok(text)
}

/// A data frame as read off the socket.
#[derive(Debug, Clone, Copy)]
pub enum Frame<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
}

type Handler = fn(&mut StreamState, &Value) -> Vec<StreamEvent>;

const HANDLERS: &[(&str, Handler)] = &[
    ("state.update", StreamState::handle_ticker),
    ("deals.update", StreamState::handle_trades),
    ("depth.update", StreamState::handle_order_book),
    ("balance.update", StreamState::handle_balance),
    ("order.update", StreamState::handle_orders),
];

/// Per-connection state: known symbols, live books and the running balance.
#[derive(Debug, Default)]
pub struct StreamState {
    symbols: HashMap<String, String>,
    depth_limits: HashMap<String, usize>,
    books: HashMap<String, OrderBook>,
    balance: Option<Balances>,
    auth_request: Option<u64>,
}

impl StreamState {
    pub fn new(subscriptions: &[Subscription]) -> Self {
        let mut state = Self::default();
        for subscription in subscriptions {
            for symbol in subscription.symbols() {
                state.symbols.insert(market_id(symbol), symbol.to_string());
            }
            if let Subscription::OrderBook { symbol, limit } = subscription {
                state.depth_limits.insert(symbol.clone(), *limit);
            }
        }
        state
    }

    fn symbol(&self, id: Option<String>) -> String {
        let id = id.unwrap_or_default();
        self.symbols.get(&id).cloned().unwrap_or(id)
    }

    pub fn book(&self, symbol: &str) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    /// Handles one raw frame. A frame that fails to inflate, parse or route
    /// becomes a single `Error` event; the session and its books carry on.
    pub fn handle_frame(&mut self, frame: Frame<'_>) -> Vec<StreamEvent> {
        let result = match frame {
            Frame::Text(text) => self.handle_text(text),
            Frame::Binary(bytes) => decode_frame(bytes).and_then(|text| self.handle_text(&text)),
        };
        match result {
            Ok(events) => events,
            Err(e) => {
                error!("{} stream error: {}", ID, e);
                vec![StreamEvent::from_error(&e)]
            }
        }
    }

    fn handle_text(&mut self, text: &str) -> Result<Vec<StreamEvent>> {
        let message: Value =
            serde_json::from_str(text).map_err(|e| Error::bad_response(ID, &e.to_string()))?;
        self.handle_message(&message)
    }

    /// Routes one decoded message. Replies carrying a non-zero `code` become
    /// classified errors; replies to our own requests are acknowledgements.
    pub fn handle_message(&mut self, message: &Value) -> Result<Vec<StreamEvent>> {
        if let Some(code) = safe_integer(message, "code").filter(|c| *c != 0) {
            let text = safe_string(message, "message");
            return Err(EXCEPTIONS.error(
                ID,
                Some(&code.to_string()),
                text.as_deref(),
                &message.to_string(),
            ));
        }

        let method = safe_string(message, "method").unwrap_or_default();
        if let Some((_, handler)) = HANDLERS.iter().find(|(name, _)| *name == method) {
            return Ok(handler(self, message));
        }

        let id = message.get("id").and_then(Value::as_u64);
        if id.is_some() && id == self.auth_request {
            self.auth_request = None;
            info!("{} websocket authenticated", ID);
            return Ok(vec![StreamEvent::Authenticated]);
        }
        debug!("{} ack {}", ID, message);
        Ok(Vec::new())
    }

    fn handle_ticker(&mut self, message: &Value) -> Vec<StreamEvent> {
        let data = message.get("data").unwrap_or(&Value::Null);
        safe_array(data, "state_list")
            .iter()
            .map(|raw| StreamEvent::Ticker(self.parse_ticker(raw)))
            .collect()
    }

    fn parse_ticker(&self, raw: &Value) -> Ticker {
        let mut ticker = Ticker::new(self.symbol(safe_string(raw, "market")), raw.clone());
        ticker.last = safe_decimal(raw, "last");
        ticker.open = safe_decimal(raw, "open");
        ticker.close = safe_decimal(raw, "close");
        ticker.high = safe_decimal(raw, "high");
        ticker.low = safe_decimal(raw, "low");
        ticker.base_volume = safe_decimal(raw, "volume");
        ticker.quote_volume = safe_decimal(raw, "value");
        ticker.complete()
    }

    fn handle_trades(&mut self, message: &Value) -> Vec<StreamEvent> {
        let data = message.get("data").unwrap_or(&Value::Null);
        let symbol = self.symbol(safe_string(data, "market"));
        let trades = safe_array(data, "deal_list")
            .iter()
            .map(|raw| {
                let mut trade = Trade::new(symbol.clone(), raw.clone());
                trade.id = safe_string(raw, "deal_id");
                trade.timestamp = safe_integer(raw, "created_at");
                trade.side = safe_string(raw, "side").and_then(|s| OrderSide::from_token(&s));
                trade.price = safe_decimal(raw, "price");
                trade.amount = safe_decimal(raw, "amount");
                safe_trade(trade)
            })
            .collect();
        vec![StreamEvent::Trades { symbol, trades }]
    }

    fn handle_order_book(&mut self, message: &Value) -> Vec<StreamEvent> {
        let data = message.get("data").unwrap_or(&Value::Null);
        let depth = data.get("depth").unwrap_or(&Value::Null);
        let symbol = self.symbol(safe_string(data, "market"));
        let timestamp = safe_integer(depth, "updated_at");
        let limit = self.depth_limits.get(&symbol).copied();

        let book = if safe_bool(data, "is_full").unwrap_or(false) {
            let mut book = OrderBook::new(
                symbol.clone(),
                parse_levels(safe_array(depth, "bids")),
                parse_levels(safe_array(depth, "asks")),
                timestamp,
            );
            book.nonce = timestamp;
            book
        } else {
            let Some(mut book) = self.books.remove(&symbol) else {
                debug!("{} depth delta for {} before snapshot", ID, symbol);
                return Vec::new();
            };
            apply_deltas(&mut book.bids, safe_array(depth, "bids"), true);
            apply_deltas(&mut book.asks, safe_array(depth, "asks"), false);
            book.timestamp = timestamp;
            book.nonce = timestamp;
            book
        };

        let book = book.limit(limit);
        self.books.insert(symbol, book.clone());
        vec![StreamEvent::OrderBook(book)]
    }

    fn handle_balance(&mut self, message: &Value) -> Vec<StreamEvent> {
        let data = message.get("data").unwrap_or(&Value::Null);
        let balance = self.balance.get_or_insert_with(|| Balances::new(Value::Null));
        for entry in safe_array(data, "balance_list") {
            let Some(id) = safe_string(entry, "ccy") else {
                continue;
            };
            balance.info = entry.clone();
            balance.insert(
                currency_code(&id),
                BalanceEntry::new(
                    safe_decimal(entry, "available"),
                    safe_decimal(entry, "frozen"),
                    None,
                ),
            );
        }
        balance.timestamp = Some(milliseconds());
        vec![StreamEvent::Balance(balance.clone())]
    }

    fn handle_orders(&mut self, message: &Value) -> Vec<StreamEvent> {
        let data = message.get("data").unwrap_or(&Value::Null);
        let raw = data.get("order").or_else(|| data.get("stop"));
        let Some(raw) = raw else {
            return Vec::new();
        };
        let event = safe_string(data, "event");
        vec![StreamEvent::Orders(vec![self.parse_order(raw, event.as_deref())])]
    }

    fn parse_order(&self, raw: &Value, event: Option<&str>) -> Order {
        let mut order = Order::new(
            safe_string_n(raw, &["order_id", "stop_id"]).unwrap_or_default(),
            raw.clone(),
        );
        let symbol = self.symbol(safe_string(raw, "market"));
        order.client_order_id = safe_string(raw, "client_id");
        order.timestamp = safe_integer(raw, "created_at");
        order.last_trade_timestamp = safe_integer(raw, "updated_at");
        order.order_type = safe_string(raw, "type").and_then(|t| OrderType::from_token(&t));
        order.side = safe_string(raw, "side").and_then(|s| OrderSide::from_token(&s));
        order.price = safe_decimal(raw, "price");
        order.stop_price = safe_decimal(raw, "trigger_price");
        order.amount = safe_decimal(raw, "amount");
        order.filled = safe_decimal(raw, "filled_amount");
        order.remaining = safe_decimal(raw, "unfilled_amount");
        order.status = parse_order_status(event, order.remaining);

        let fee = safe_decimal(raw, "fee").filter(|cost| !cost.is_zero());
        let fee_currency = safe_string(raw, "fee_ccy")
            .map(|c| currency_code(&c))
            .or_else(|| split_symbol(&symbol).map(|(_, q)| q.to_string()));
        order.fee = fee.and_then(|cost| Fee::new(Some(cost), fee_currency));
        order.symbol = Some(symbol);
        safe_order(order)
    }
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

/// Applies `[price, amount]` deltas to one side; zero amount removes the level.
fn apply_deltas(side: &mut Vec<OrderBookLevel>, rows: &[Value], descending: bool) {
    for level in parse_levels(rows) {
        let existing = side.iter().position(|l| l.price == level.price);
        match (existing, level.amount.is_some_and(|a| a.is_zero())) {
            (Some(index), true) => {
                side.remove(index);
            }
            (Some(index), false) => side[index] = level,
            (None, true) => {}
            (None, false) => side.push(level),
        }
    }
    if descending {
        side.sort_by(|a, b| b.price.cmp(&a.price));
    } else {
        side.sort_by(|a, b| a.price.cmp(&b.price));
    }
}

/// `put`/`update` leave the order open; `finish` closes it, or cancels it
/// when something was left unfilled.
pub fn parse_order_status(
    event: Option<&str>,
    remaining: Option<Decimal>,
) -> Option<OrderStatus> {
    match event? {
        "put" | "update" | "modify" => Some(OrderStatus::Open),
        "finish" => match remaining {
            Some(r) if !r.is_zero() => Some(OrderStatus::Canceled),
            _ => Some(OrderStatus::Closed),
        },
        _ => None,
    }
}

/// Streaming client for CoinEx spot. Collect subscriptions, then `connect`
/// to receive events on a channel. The session reconnects on its own.
pub struct CoinexWebSocket {
    url: String,
    credentials: Credentials,
    subscriptions: Vec<Subscription>,
}

impl CoinexWebSocket {
    pub fn new(config: &ExchangeConfig) -> Self {
        Self {
            url: WS_URL.to_string(),
            credentials: config.credentials.clone(),
            subscriptions: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn subscribe_ticker(&mut self, symbol: &str) -> &mut Self {
        self.subscriptions.push(Subscription::Ticker(symbol.to_string()));
        self
    }

    pub fn subscribe_trades(&mut self, symbol: &str) -> &mut Self {
        self.subscriptions.push(Subscription::Trades(symbol.to_string()));
        self
    }

    pub fn subscribe_order_book(&mut self, symbol: &str, limit: usize) -> Result<&mut Self> {
        if !DEPTH_LIMITS.contains(&limit) {
            return Err(Error::new(
                ErrorKind::BadRequest,
                ID,
                format!("order book limit must be one of {:?}", DEPTH_LIMITS),
            ));
        }
        self.subscriptions.push(Subscription::OrderBook {
            symbol: symbol.to_string(),
            limit,
        });
        Ok(self)
    }

    pub fn subscribe_balance(&mut self, codes: &[&str]) -> &mut Self {
        let codes = codes.iter().map(|c| c.to_uppercase()).collect();
        self.subscriptions.push(Subscription::Balance(codes));
        self
    }

    pub fn subscribe_orders(&mut self, symbols: &[&str]) -> &mut Self {
        let symbols = symbols.iter().map(|s| s.to_string()).collect();
        self.subscriptions.push(Subscription::Orders(symbols));
        self
    }

    fn needs_auth(&self) -> bool {
        self.subscriptions.iter().any(Subscription::is_private)
    }

    pub async fn connect(self) -> Result<mpsc::Receiver<StreamEvent>> {
        if self.subscriptions.is_empty() {
            return Err(Error::new(ErrorKind::BadRequest, ID, "no streams subscribed"));
        }
        if self.needs_auth() {
            self.credentials
                .check_required(ID, &[Credential::ApiKey, Credential::Secret])?;
        }

        let (tx, rx) = mpsc::channel(1000);
        info!("Connecting to WebSocket: {}", self.url);

        tokio::spawn(async move {
            loop {
                match self.run_connection(tx.clone()).await {
                    Ok(()) => warn!("WebSocket connection closed, reconnecting..."),
                    Err(e) => {
                        error!("WebSocket error: {}, reconnecting...", e);
                        let _ = tx.send(StreamEvent::from_error(&e)).await;
                    }
                }

                if tx.send(StreamEvent::Disconnected).await.is_err() {
                    debug!("{} receiver dropped, stopping", ID);
                    break;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });

        Ok(rx)
    }

    async fn run_connection(&self, tx: mpsc::Sender<StreamEvent>) -> Result<()> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();
        info!("WebSocket connected");

        let mut ids = RequestIds::default();
        let mut state = StreamState::new(&self.subscriptions);

        if self.needs_auth() {
            let request = sign_request(&mut ids, &self.credentials, milliseconds())?;
            state.auth_request = request.get("id").and_then(Value::as_u64);
            write.send(Message::Text(request.to_string())).await?;
        }
        for subscription in &self.subscriptions {
            let request = ids.request(subscription.method(), subscription.params());
            debug!("{} subscribe {}", ID, request);
            write.send(Message::Text(request.to_string())).await?;
        }

        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.tick().await;

        loop {
            let frame = tokio::select! {
                frame = read.next() => frame,
                _ = ping.tick() => {
                    debug!("Sending ping");
                    let request = ids.request("server.ping", json!({}));
                    write.send(Message::Text(request.to_string())).await?;
                    continue;
                }
            };

            let events = match frame {
                Some(Ok(Message::Text(text))) => state.handle_frame(Frame::Text(&text)),
                Some(Ok(Message::Binary(bytes))) => state.handle_frame(Frame::Binary(&bytes)),
                Some(Ok(Message::Ping(data))) => {
                    debug!("Received ping, sending pong");
                    write.send(Message::Pong(data)).await?;
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket closed by server");
                    return Ok(());
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };

            for event in events {
                if tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn state() -> StreamState {
        StreamState::new(&[
            Subscription::Ticker("BTC/USDT".to_string()),
            Subscription::OrderBook {
                symbol: "BTC/USDT".to_string(),
                limit: 5,
            },
        ])
    }

    fn depth(is_full: bool, bids: Value, asks: Value, ts: i64) -> Value {
        json!({
            "method": "depth.update",
            "data": {
                "market": "BTCUSDT",
                "is_full": is_full,
                "depth": { "bids": bids, "asks": asks, "updated_at": ts }
            },
            "id": null
        })
    }

    #[test]
    fn test_request_ids_increment() {
        let mut ids = RequestIds::default();
        let first = ids.request("state.subscribe", json!({}));
        let second = ids.request("deals.subscribe", json!({}));
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
        assert_eq!(second["method"], "deals.subscribe");
    }

    #[test]
    fn test_subscription_params() {
        let book = Subscription::OrderBook {
            symbol: "BTC/USDT".to_string(),
            limit: 20,
        };
        assert_eq!(book.method(), "depth.subscribe");
        assert_eq!(book.params(), json!({ "market_list": [["BTCUSDT", 20, "0", true]] }));
        assert_eq!(
            Subscription::Balance(vec!["USDT".to_string()]).params(),
            json!({ "ccy_list": ["USDT"] })
        );
        assert!(Subscription::Orders(vec![]).is_private());
        assert!(!Subscription::Ticker("BTC/USDT".into()).is_private());
    }

    #[test]
    fn test_order_book_limit_validated() {
        let mut ws = CoinexWebSocket::new(&ExchangeConfig::new(ID));
        assert!(ws.subscribe_order_book("BTC/USDT", 10).is_ok());
        let err = ws.subscribe_order_book("BTC/USDT", 7).err().unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::BadRequest));
        assert_eq!(ws.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn test_private_subscription_requires_credentials() {
        let mut ws = CoinexWebSocket::new(&ExchangeConfig::new(ID));
        ws.subscribe_balance(&["usdt"]);
        let err = ws.connect().await.err().unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::AuthenticationError));
    }

    #[test]
    fn test_sign_request() {
        let mut ids = RequestIds::default();
        let credentials = Credentials::new("key", "secret");
        let request = sign_request(&mut ids, &credentials, 1_700_000_000_000).unwrap();
        let expected = hmac_sha256_hex(b"secret", b"1700000000000").unwrap();
        assert_eq!(request["method"], "server.sign");
        assert_eq!(request["params"]["access_id"], "key");
        assert_eq!(request["params"]["signed_str"], expected);
        assert_eq!(request["params"]["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_decode_gzip_frame() {
        let payload = r#"{"method":"server.pong","id":3}"#;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload.as_bytes()).unwrap();
        let bytes = encoder.finish().unwrap();
        assert_eq!(decode_frame(&bytes).unwrap(), payload);
        assert_eq!(
            decode_frame(b"not gzip").unwrap_err().kind(),
            Some(ErrorKind::BadResponse)
        );
    }

    #[test]
    fn test_ticker_update() {
        let mut state = state();
        let message = json!({
            "method": "state.update",
            "data": { "state_list": [{
                "market": "BTCUSDT", "last": "30000", "open": "29000", "close": "30000",
                "high": "30500", "low": "28800", "volume": "12.5", "value": "375000",
                "volume_buy": "6", "volume_sell": "6.5"
            }]},
            "id": null
        });
        let events = state.handle_message(&message).unwrap();
        assert_eq!(events.len(), 1);
        let StreamEvent::Ticker(ticker) = &events[0] else {
            panic!("expected ticker");
        };
        assert_eq!(ticker.symbol, "BTC/USDT");
        assert_eq!(ticker.last, Some(dec!(30000)));
        assert_eq!(ticker.base_volume, Some(dec!(12.5)));
        assert_eq!(ticker.change, Some(dec!(1000)));
        assert_eq!(events[0].message_hash().as_deref(), Some("ticker:BTC/USDT"));
    }

    #[test]
    fn test_trades_update() {
        let mut state = state();
        let message = json!({
            "method": "deals.update",
            "data": {
                "market": "BTCUSDT",
                "deal_list": [
                    { "deal_id": 3514376759u64, "created_at": 1689152421692i64, "side": "buy", "price": "30718.42", "amount": "0.00000325" }
                ]
            },
            "id": null
        });
        let events = state.handle_message(&message).unwrap();
        let StreamEvent::Trades { symbol, trades } = &events[0] else {
            panic!("expected trades");
        };
        assert_eq!(symbol, "BTC/USDT");
        assert_eq!(trades[0].id.as_deref(), Some("3514376759"));
        assert_eq!(trades[0].side, Some(OrderSide::Buy));
        assert_eq!(trades[0].cost, Some(dec!(30718.42) * dec!(0.00000325)));
        assert_eq!(events[0].message_hash().as_deref(), Some("trades:BTC/USDT"));
    }

    #[test]
    fn test_depth_snapshot_then_deltas() {
        let mut state = state();
        let snapshot = depth(
            true,
            json!([["100", "1"], ["99", "2"]]),
            json!([["101", "1"], ["102", "3"]]),
            1,
        );
        state.handle_message(&snapshot).unwrap();

        let delta = depth(
            false,
            json!([["100", "0"], ["99.5", "4"]]),
            json!([["101", "2.5"]]),
            2,
        );
        let events = state.handle_message(&delta).unwrap();
        let StreamEvent::OrderBook(book) = &events[0] else {
            panic!("expected book");
        };
        assert_eq!(book.bids, vec![
            OrderBookLevel::new(dec!(99.5), dec!(4)),
            OrderBookLevel::new(dec!(99), dec!(2)),
        ]);
        assert_eq!(book.best_ask(), Some(OrderBookLevel::new(dec!(101), dec!(2.5))));
        assert_eq!(book.timestamp, Some(2));
        assert_eq!(state.book("BTC/USDT"), Some(book));

        let reset = depth(true, json!([["90", "1"]]), json!([]), 3);
        state.handle_message(&reset).unwrap();
        let book = state.book("BTC/USDT").unwrap();
        assert_eq!(book.bids.len(), 1);
        assert!(book.asks.is_empty());
    }

    #[test]
    fn test_depth_delta_without_snapshot_ignored() {
        let mut state = state();
        let delta = depth(false, json!([["100", "1"]]), json!([]), 1);
        assert!(state.handle_message(&delta).unwrap().is_empty());
        assert!(state.book("BTC/USDT").is_none());
    }

    #[test]
    fn test_balance_update_accumulates() {
        let mut state = state();
        let first = json!({
            "method": "balance.update",
            "data": { "balance_list": [{ "ccy": "USDT", "available": "100", "frozen": "20" }] },
            "id": null
        });
        let second = json!({
            "method": "balance.update",
            "data": { "balance_list": [{ "ccy": "BTC", "available": "0.5", "frozen": "0" }] },
            "id": null
        });
        state.handle_message(&first).unwrap();
        let events = state.handle_message(&second).unwrap();
        let StreamEvent::Balance(balance) = &events[0] else {
            panic!("expected balance");
        };
        assert_eq!(balance.total("USDT"), Some(dec!(120)));
        assert_eq!(balance.free("BTC"), Some(dec!(0.5)));
    }

    #[test]
    fn test_order_update() {
        let mut state = StreamState::new(&[Subscription::Orders(vec!["BTC/USDT".to_string()])]);
        let message = json!({
            "method": "order.update",
            "data": {
                "event": "finish",
                "order": {
                    "order_id": 98, "client_id": "x-1", "market": "BTCUSDT", "type": "limit",
                    "side": "sell", "price": "30000", "amount": "1", "filled_amount": "0.4",
                    "unfilled_amount": "0.6", "created_at": 1, "updated_at": 2,
                    "fee": "0.12", "fee_ccy": "USDT"
                }
            },
            "id": null
        });
        let events = state.handle_message(&message).unwrap();
        let StreamEvent::Orders(orders) = &events[0] else {
            panic!("expected orders");
        };
        let order = &orders[0];
        assert_eq!(order.id, "98");
        assert_eq!(order.symbol.as_deref(), Some("BTC/USDT"));
        assert_eq!(order.status, Some(OrderStatus::Canceled));
        assert_eq!(order.side, Some(OrderSide::Sell));
        assert_eq!(order.fee.as_ref().and_then(|f| f.cost), Some(dec!(0.12)));
        assert_eq!(events[0].message_hash().as_deref(), Some("orders"));
    }

    #[test]
    fn test_order_status_events() {
        assert_eq!(parse_order_status(Some("put"), None), Some(OrderStatus::Open));
        assert_eq!(parse_order_status(Some("finish"), Some(dec!(0))), Some(OrderStatus::Closed));
        assert_eq!(parse_order_status(Some("finish"), Some(dec!(1))), Some(OrderStatus::Canceled));
        assert_eq!(parse_order_status(Some("other"), None), None);
    }

    #[test]
    fn test_error_codes() {
        let mut state = state();
        let cases = [
            (1, ErrorKind::BadRequest),
            (2, ErrorKind::ExchangeError),
            (3, ErrorKind::ExchangeNotAvailable),
            (4, ErrorKind::NotSupported),
            (5, ErrorKind::ExchangeNotAvailable),
            (6, ErrorKind::AuthenticationError),
            (99, ErrorKind::ExchangeError),
        ];
        for (code, kind) in cases {
            let message = json!({ "id": 4, "code": code, "message": "failed" });
            assert_eq!(state.handle_message(&message).unwrap_err().kind(), Some(kind));
        }
    }

    #[test]
    fn test_acks_and_auth_reply() {
        let mut state = state();
        state.auth_request = Some(1);
        let ack = json!({ "id": 2, "code": 0, "message": "OK" });
        assert!(state.handle_message(&ack).unwrap().is_empty());

        let auth = json!({ "id": 1, "code": 0, "message": "OK" });
        assert_eq!(state.handle_message(&auth).unwrap(), vec![StreamEvent::Authenticated]);
    }

    #[test]
    fn test_malformed_frames_do_not_end_session() {
        let mut state = state();
        let snapshot = depth(true, json!([["100", "1"]]), json!([["101", "2"]]), 1);
        state.handle_message(&snapshot).unwrap();

        for events in [
            state.handle_frame(Frame::Text("{not json")),
            state.handle_frame(Frame::Binary(b"not gzip")),
        ] {
            assert_eq!(events.len(), 1);
            assert!(matches!(
                &events[0],
                StreamEvent::Error { kind: Some(ErrorKind::BadResponse), .. }
            ));
        }

        let delta = depth(false, json!([["100", "3"]]), json!([]), 2);
        let events = state.handle_frame(Frame::Text(&delta.to_string()));
        assert!(matches!(&events[0], StreamEvent::OrderBook(_)));
        assert_eq!(state.book("BTC/USDT").unwrap().bids[0].amount, Some(dec!(3)));
    }
}
