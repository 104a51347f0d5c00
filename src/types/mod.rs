pub mod market;
pub mod ticker;
pub mod orderbook;
pub mod trade;
pub mod candle;
pub mod order;
pub mod balance;
pub mod transaction;

pub use market::*;
pub use ticker::*;
pub use orderbook::*;
pub use trade::*;
pub use candle::*;
pub use order::*;
pub use balance::*;
pub use transaction::*;
