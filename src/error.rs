use std::fmt;
use thiserror::Error;

/// Unified error vocabulary shared by every adapter. Each exchange's native
/// codes and messages collapse onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    BadSymbol,
    ArgumentsRequired,
    AuthenticationError,
    PermissionDenied,
    InsufficientFunds,
    InvalidOrder,
    OrderNotFound,
    RateLimitExceeded,
    DDoSProtection,
    ExchangeNotAvailable,
    OnMaintenance,
    InvalidNonce,
    NotSupported,
    BadResponse,
    ExchangeError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::BadSymbol => "BadSymbol",
            ErrorKind::ArgumentsRequired => "ArgumentsRequired",
            ErrorKind::AuthenticationError => "AuthenticationError",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::InsufficientFunds => "InsufficientFunds",
            ErrorKind::InvalidOrder => "InvalidOrder",
            ErrorKind::OrderNotFound => "OrderNotFound",
            ErrorKind::RateLimitExceeded => "RateLimitExceeded",
            ErrorKind::DDoSProtection => "DDoSProtection",
            ErrorKind::ExchangeNotAvailable => "ExchangeNotAvailable",
            ErrorKind::OnMaintenance => "OnMaintenance",
            ErrorKind::InvalidNonce => "InvalidNonce",
            ErrorKind::NotSupported => "NotSupported",
            ErrorKind::BadResponse => "BadResponse",
            ErrorKind::ExchangeError => "ExchangeError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A classified failure. `message` holds the raw body or message the
    /// exchange returned, or the local reason for client-side rejections.
    #[error("{exchange} {kind}: {message}")]
    Exchange {
        kind: ErrorKind,
        exchange: &'static str,
        message: String,
    },

    /// Transport failures are passed through as-is.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("signing error: {0}")]
    Signing(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, exchange: &'static str, message: impl Into<String>) -> Self {
        Error::Exchange {
            kind,
            exchange,
            message: message.into(),
        }
    }

    pub fn bad_symbol(exchange: &'static str, symbol: &str) -> Self {
        Self::new(
            ErrorKind::BadSymbol,
            exchange,
            format!("does not have market symbol {}", symbol),
        )
    }

    pub fn bad_response(exchange: &'static str, body: &str) -> Self {
        Self::new(ErrorKind::BadResponse, exchange, body)
    }

    pub fn arguments_required(exchange: &'static str, method: &str, argument: &str) -> Self {
        Self::new(
            ErrorKind::ArgumentsRequired,
            exchange,
            format!("{}() requires a {} argument", method, argument),
        )
    }

    pub fn not_supported(exchange: &'static str, method: &str) -> Self {
        Self::new(
            ErrorKind::NotSupported,
            exchange,
            format!("{}() is not supported yet", method),
        )
    }

    pub fn invalid_order(exchange: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOrder, exchange, message)
    }

    /// The unified kind, or `None` for transport-level failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Exchange { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn exchange(&self) -> Option<&'static str> {
        match self {
            Error::Exchange { exchange, .. } => Some(exchange),
            _ => None,
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_carries_exchange_and_body() {
        let err = Error::new(ErrorKind::InsufficientFunds, "alpaca", r#"{"code":40310000}"#);
        assert_eq!(err.kind(), Some(ErrorKind::InsufficientFunds));
        assert_eq!(err.exchange(), Some("alpaca"));
        assert_eq!(
            err.to_string(),
            r#"alpaca InsufficientFunds: {"code":40310000}"#
        );
    }

    #[test]
    fn test_signing_error_has_no_kind() {
        let err = Error::Signing("bad key".to_string());
        assert_eq!(err.kind(), None);
        assert!(!err.is(ErrorKind::ExchangeError));
    }
}
