//! Unified trading interface over several centralized and decentralized
//! exchanges. Each adapter translates the common [`exchange::Exchange`]
//! surface into the venue's REST dialect; CoinEx also streams over a socket.

pub mod base;
pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::{Credential, Credentials, ExchangeConfig};
pub use error::{Error, ErrorKind, Result};
pub use exchange::{build_exchange, build_exchange_with, Exchange, ExchangeId};
