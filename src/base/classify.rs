use crate::error::{Error, ErrorKind};

/// Two-tier lookup from exchange codes/messages to the unified taxonomy.
/// Keys in `exact` must match the whole code or message; keys in `broad`
/// match as substrings of the message.
#[derive(Debug, Clone, Copy)]
pub struct ErrorTable {
    pub exact: &'static [(&'static str, ErrorKind)],
    pub broad: &'static [(&'static str, ErrorKind)],
}

impl ErrorTable {
    pub const fn new(
        exact: &'static [(&'static str, ErrorKind)],
        broad: &'static [(&'static str, ErrorKind)],
    ) -> Self {
        Self { exact, broad }
    }

    pub fn exact_match(&self, key: &str) -> Option<ErrorKind> {
        self.exact
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, kind)| *kind)
    }

    pub fn broad_match(&self, message: &str) -> Option<ErrorKind> {
        self.broad
            .iter()
            .find(|(k, _)| message.contains(*k))
            .map(|(_, kind)| *kind)
    }

    /// Code first, then the message exactly, then the message by substring.
    pub fn classify(&self, code: Option<&str>, message: Option<&str>) -> Option<ErrorKind> {
        code.and_then(|c| self.exact_match(c)).or_else(|| {
            message.and_then(|m| self.exact_match(m).or_else(|| self.broad_match(m)))
        })
    }

    /// Builds the error to raise for a failed response, falling back to the
    /// generic `ExchangeError` when nothing in the table matches.
    pub fn error(
        &self,
        exchange: &'static str,
        code: Option<&str>,
        message: Option<&str>,
        body: &str,
    ) -> Error {
        let kind = self
            .classify(code, message)
            .unwrap_or(ErrorKind::ExchangeError);
        Error::new(kind, exchange, body)
    }
}

/// Generic HTTP status mapping used when a body carries nothing the
/// exchange table recognizes.
pub fn classify_http_status(status: u16) -> Option<ErrorKind> {
    match status {
        400 => Some(ErrorKind::BadRequest),
        401 | 511 => Some(ErrorKind::AuthenticationError),
        403 => Some(ErrorKind::PermissionDenied),
        404 => Some(ErrorKind::BadRequest),
        418 => Some(ErrorKind::DDoSProtection),
        429 => Some(ErrorKind::RateLimitExceeded),
        500 | 502 | 503 | 504 | 520..=530 => Some(ErrorKind::ExchangeNotAvailable),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: ErrorTable = ErrorTable::new(
        &[
            ("40310000", ErrorKind::InsufficientFunds),
            ("order is not found", ErrorKind::OrderNotFound),
        ],
        &[
            ("Invalid symbol", ErrorKind::BadSymbol),
            ("Invalid", ErrorKind::BadRequest),
        ],
    );

    #[test]
    fn test_exact_code_wins() {
        assert_eq!(
            TABLE.classify(Some("40310000"), Some("Invalid symbol")),
            Some(ErrorKind::InsufficientFunds)
        );
    }

    #[test]
    fn test_exact_message_before_broad() {
        assert_eq!(
            TABLE.classify(None, Some("order is not found")),
            Some(ErrorKind::OrderNotFound)
        );
    }

    #[test]
    fn test_broad_first_entry_wins() {
        assert_eq!(
            TABLE.classify(Some("999"), Some("Invalid symbol: FOO")),
            Some(ErrorKind::BadSymbol)
        );
        assert_eq!(TABLE.classify(None, Some("Invalid qty")), Some(ErrorKind::BadRequest));
    }

    #[test]
    fn test_unmatched_falls_back_to_exchange_error() {
        assert_eq!(TABLE.classify(None, Some("boom")), None);
        let err = TABLE.error("test", None, Some("boom"), r#"{"message":"boom"}"#);
        assert_eq!(err.kind(), Some(ErrorKind::ExchangeError));
        assert!(err.to_string().contains(r#"{"message":"boom"}"#));
    }

    #[test]
    fn test_http_status() {
        assert_eq!(classify_http_status(429), Some(ErrorKind::RateLimitExceeded));
        assert_eq!(classify_http_status(503), Some(ErrorKind::ExchangeNotAvailable));
        assert_eq!(classify_http_status(200), None);
    }
}
