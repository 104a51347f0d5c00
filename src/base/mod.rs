pub mod safe;
pub mod precise;
pub mod normalize;
pub mod classify;
pub mod signer;
pub mod transport;
pub mod markets;
pub mod order_cache;

pub use classify::{classify_http_status, ErrorTable};
pub use markets::{MarketCatalog, MarketIndex};
pub use normalize::{filter_by_since_limit, safe_order, safe_trade};
pub use order_cache::OrderCache;
pub use signer::{HttpMethod, NonceSource, Params, ServerNonce, SignedRequest};
pub use transport::{HttpResponse, ReqwestTransport, Transport};

#[cfg(test)]
pub use transport::MockTransport;
