use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use exchange_adapters::exchange::{CoinexWebSocket, StreamEvent};
use exchange_adapters::types::Timeframe;
use exchange_adapters::{build_exchange, ExchangeConfig};

#[derive(Parser)]
#[command(name = "exchange-adapters")]
#[command(version = "0.1.0")]
#[command(about = "Query exchanges through one unified trading interface", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "exchange.toml")]
    config: PathBuf,

    /// Exchange id, overrides the configured one
    #[arg(short, long)]
    exchange: Option<String>,

    /// Use the exchange's sandbox or paper environment
    #[arg(long)]
    sandbox: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the exchange's spot markets
    Markets,
    /// Show the ticker for a symbol
    Ticker { symbol: String },
    /// Show the order book for a symbol
    Book {
        symbol: String,
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },
    /// Show recent public trades
    Trades {
        symbol: String,
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show candles for a symbol
    Ohlcv {
        symbol: String,
        /// Timeframe (1m, 5m, 15m, 30m, 1h, 4h, 1d, 1w)
        #[arg(short = 'f', long, default_value = "1h")]
        timeframe: String,
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show non-zero balances (requires API keys)
    Balance,
    /// Show open orders (requires API keys)
    OpenOrders { symbol: Option<String> },
    /// Stream CoinEx ticker, trades and depth for a symbol
    Watch {
        symbol: String,
        #[arg(short, long, default_value = "10")]
        depth: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = ExchangeConfig::load(Some(&cli.config))?;
    if let Some(exchange) = cli.exchange {
        config.exchange = exchange;
    }
    if cli.sandbox {
        config.sandbox = true;
    }
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        return Err(anyhow!("configuration has {} error(s)", errors.len()));
    }

    match cli.command {
        Commands::Watch { symbol, depth } => watch(&config, &symbol, depth).await,
        command => run(&config, command).await,
    }
}

async fn run(config: &ExchangeConfig, command: Commands) -> Result<()> {
    let exchange = build_exchange(config)?;
    info!("Using {}{}", exchange.id(), if config.sandbox { " (sandbox)" } else { "" });

    match command {
        Commands::Markets => {
            let markets = exchange.fetch_markets().await?;
            println!("\n=== {} markets ===", markets.len());
            for market in markets {
                println!(
                    "{:<14} id={:<12} active={:<5} price_dp={:?} amount_dp={:?}",
                    market.symbol,
                    market.id,
                    market.active.unwrap_or(false),
                    market.precision.price,
                    market.precision.amount
                );
            }
        }
        Commands::Ticker { symbol } => {
            let ticker = exchange.fetch_ticker(&symbol).await?;
            println!(
                "{}: last {} | bid {} | ask {} | 24h {}% | vol {}",
                ticker.symbol,
                show(ticker.last),
                show(ticker.bid),
                show(ticker.ask),
                show(ticker.percentage.map(|p| p.round_dp(2))),
                show(ticker.base_volume)
            );
        }
        Commands::Book { symbol, limit } => {
            let book = exchange.fetch_order_book(&symbol, Some(limit)).await?;
            println!("\n=== {} order book ===", book.symbol);
            for ask in book.asks.iter().rev() {
                println!("  ask {:>16} {:>16}", ask.price, show(ask.amount));
            }
            println!("  --- spread {} ---", show(book.spread()));
            for bid in &book.bids {
                println!("  bid {:>16} {:>16}", bid.price, show(bid.amount));
            }
        }
        Commands::Trades { symbol, limit } => {
            for trade in exchange.fetch_trades(&symbol, None, limit).await? {
                println!(
                    "{} {:<4} {} @ {}",
                    show(trade.timestamp),
                    trade.side.map(|s| s.as_str()).unwrap_or("-"),
                    show(trade.amount),
                    show(trade.price)
                );
            }
        }
        Commands::Ohlcv { symbol, timeframe, limit } => {
            let timeframe: Timeframe = timeframe.parse()?;
            for candle in exchange.fetch_ohlcv(&symbol, timeframe, None, limit).await? {
                println!(
                    "{} O {} H {} L {} C {} V {}",
                    candle.timestamp,
                    show(candle.open),
                    show(candle.high),
                    show(candle.low),
                    show(candle.close),
                    show(candle.volume)
                );
            }
        }
        Commands::Balance => {
            let balances = exchange.fetch_balance().await?;
            println!("\n=== Balances ===");
            for (code, entry) in balances.non_zero() {
                println!(
                    "{:<8} free {:>16} used {:>16} total {:>16}",
                    code,
                    show(entry.free),
                    show(entry.used),
                    show(entry.total)
                );
            }
        }
        Commands::OpenOrders { symbol } => {
            let orders = exchange.fetch_open_orders(symbol.as_deref(), None, None).await?;
            if orders.is_empty() {
                println!("No open orders");
            }
            for order in orders {
                println!(
                    "{} {} {} {} {} @ {} filled {}",
                    order.id,
                    order.symbol.as_deref().unwrap_or("-"),
                    order.side.map(|s| s.as_str()).unwrap_or("-"),
                    order.order_type.map(|t| t.as_str()).unwrap_or("-"),
                    show(order.amount),
                    show(order.price),
                    show(order.filled)
                );
            }
        }
        Commands::Watch { .. } => {}
    }

    Ok(())
}

async fn watch(config: &ExchangeConfig, symbol: &str, depth: usize) -> Result<()> {
    let mut ws = CoinexWebSocket::new(config);
    ws.subscribe_ticker(symbol)
        .subscribe_trades(symbol)
        .subscribe_order_book(symbol, depth)?;
    let mut events = ws.connect().await?;

    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Ticker(ticker) => {
                info!("{} last {} vol {}", ticker.symbol, show(ticker.last), show(ticker.base_volume));
            }
            StreamEvent::Trades { symbol, trades } => {
                for trade in trades {
                    info!(
                        "{} trade {} {} @ {}",
                        symbol,
                        trade.side.map(|s| s.as_str()).unwrap_or("-"),
                        show(trade.amount),
                        show(trade.price)
                    );
                }
            }
            StreamEvent::OrderBook(book) => {
                info!(
                    "{} bid {} ask {} spread {}",
                    book.symbol,
                    show(book.best_bid().map(|l| l.price)),
                    show(book.best_ask().map(|l| l.price)),
                    show(book.spread())
                );
            }
            StreamEvent::Disconnected => warn!("Stream disconnected, waiting to reconnect"),
            StreamEvent::Error { message, .. } => error!("Stream error: {}", message),
            _ => {}
        }
    }

    Ok(())
}

fn show<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
