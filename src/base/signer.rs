use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::{Digest, Sha256, Sha512};
use sha3::Keccak256;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Query/body parameters in insertion order.
pub type Params = Vec<(&'static str, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether parameters travel in the body rather than the query string.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The envelope handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl SignedRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self.header("Content-Type", "application/json")
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| Error::Signing(format!("invalid hmac key: {}", e)))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn hmac_sha512_hex(secret: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret)
        .map_err(|e| Error::Signing(format!("invalid hmac key: {}", e)))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn sha512_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Recoverable secp256k1 signature over a 32-byte digest, encoded as
/// `r || s || v` hex with `v` as two hex digits.
pub fn ecdsa_recoverable_hex(secret_hex: &str, digest: &[u8; 32]) -> Result<String> {
    let key_bytes = hex::decode(secret_hex.trim_start_matches("0x"))
        .map_err(|e| Error::Signing(format!("secret is not hex: {}", e)))?;
    let key = k256::ecdsa::SigningKey::from_slice(&key_bytes)
        .map_err(|e| Error::Signing(format!("invalid secp256k1 key: {}", e)))?;
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest)
        .map_err(|e| Error::Signing(e.to_string()))?;
    Ok(format!(
        "{}{:02x}",
        hex::encode(signature.to_bytes()),
        recovery_id.to_byte()
    ))
}

pub fn urlencode(params: &[(&'static str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

pub fn json_body(params: &[(&'static str, String)]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = params
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
        .collect();
    serde_json::Value::Object(map).to_string()
}

/// Appends `?query` when there is one.
pub fn with_query(url: String, params: &[(&'static str, String)]) -> String {
    if params.is_empty() {
        url
    } else {
        format!("{}?{}", url, urlencode(params))
    }
}

/// Client-side nonce/timestamp source. Every value handed out is strictly
/// greater than the previous one, even when the clock stalls or steps back.
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicI64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_after(&self, candidate: i64) -> i64 {
        let mut current = self.last.load(Ordering::Acquire);
        loop {
            let next = candidate.max(current + 1);
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn next_millis(&self) -> i64 {
        self.next_after(super::safe::milliseconds())
    }

    pub fn next_micros(&self) -> i64 {
        self.next_after(super::safe::microseconds())
    }
}

/// Sequence number assigned by the exchange. It is loaded once and then
/// incremented locally for every authenticated write.
#[derive(Debug, Default)]
pub struct ServerNonce {
    value: Mutex<Option<u64>>,
}

impl ServerNonce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.value.lock().is_some()
    }

    pub fn set(&self, nonce: u64) {
        *self.value.lock() = Some(nonce);
    }

    pub fn current(&self) -> Option<u64> {
        *self.value.lock()
    }

    /// Forgets the stored value so the next write reloads it from the server.
    pub fn reset(&self) {
        *self.value.lock() = None;
    }

    /// Returns the next value and stores it, or `None` when nothing was loaded.
    pub fn advance(&self) -> Option<u64> {
        let mut guard = self.value.lock();
        let next = (*guard)? + 1;
        *guard = Some(next);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_hmac_sha256_vector() {
        // RFC 4231 test case 2
        let sig = hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_sha512_empty() {
        assert!(sha512_hex(b"").starts_with("cf83e1357eefb8bdf1542850d66d8007"));
    }

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_ecdsa_signature_shape() {
        let secret = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
        let digest = keccak256(b"hello");
        let sig = ecdsa_recoverable_hex(secret, &digest).unwrap();
        assert_eq!(sig.len(), 130);
        let v = &sig[128..];
        assert!(v == "00" || v == "01");
        // deterministic (RFC 6979)
        assert_eq!(sig, ecdsa_recoverable_hex(secret, &digest).unwrap());
    }

    #[test]
    fn test_ecdsa_rejects_bad_secret() {
        assert!(ecdsa_recoverable_hex("zz", &[0u8; 32]).is_err());
    }

    #[test]
    fn test_urlencode_keeps_order() {
        let params: Params = vec![("symbol", "BTCUSD".into()), ("side", "BUY".into()), ("note", "a b".into())];
        assert_eq!(urlencode(&params), "symbol=BTCUSD&side=BUY&note=a+b");
        assert_eq!(with_query("https://x/y".into(), &[]), "https://x/y");
    }

    #[test]
    fn test_json_body() {
        let params: Params = vec![("qty", "0.01".into())];
        assert_eq!(json_body(&params), r#"{"qty":"0.01"}"#);
    }

    #[test]
    fn test_nonce_is_strictly_increasing() {
        let nonce = NonceSource::new();
        assert_eq!(nonce.next_after(100), 100);
        assert_eq!(nonce.next_after(100), 101);
        assert_eq!(nonce.next_after(50), 102);
        assert_eq!(nonce.next_after(500), 500);
    }

    #[test]
    fn test_nonce_across_threads() {
        let nonce = Arc::new(NonceSource::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let nonce = nonce.clone();
                std::thread::spawn(move || (0..250).map(|_| nonce.next_after(1)).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }

    #[test]
    fn test_server_nonce_advance() {
        let nonce = ServerNonce::new();
        assert_eq!(nonce.advance(), None);
        nonce.set(41);
        assert_eq!(nonce.advance(), Some(42));
        assert_eq!(nonce.advance(), Some(43));
        assert_eq!(nonce.current(), Some(43));
        nonce.reset();
        assert!(!nonce.is_loaded());
        assert_eq!(nonce.advance(), None);
    }
}
