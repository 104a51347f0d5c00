use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::types::Market;

/// Markets indexed by unified symbol and by exchange id.
#[derive(Debug, Default)]
pub struct MarketIndex {
    by_symbol: HashMap<String, Market>,
    symbol_by_id: HashMap<String, String>,
}

impl MarketIndex {
    pub fn new(markets: Vec<Market>) -> Self {
        let mut index = Self::default();
        for market in markets {
            index
                .symbol_by_id
                .insert(market.id.clone(), market.symbol.clone());
            index.by_symbol.insert(market.symbol.clone(), market);
        }
        index
    }

    pub fn market(&self, exchange: &'static str, symbol: &str) -> Result<&Market> {
        self.by_symbol
            .get(symbol)
            .ok_or_else(|| Error::bad_symbol(exchange, symbol))
    }

    pub fn by_id(&self, id: &str) -> Option<&Market> {
        self.symbol_by_id
            .get(id)
            .and_then(|symbol| self.by_symbol.get(symbol))
    }

    /// Unified symbol for an exchange id. Unknown ids come back verbatim.
    pub fn safe_symbol(&self, id: &str) -> String {
        self.by_id(id)
            .map(|m| m.symbol.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.by_symbol.values()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.by_symbol.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

/// Lazily loaded market catalog shared by one adapter instance.
#[derive(Debug, Default)]
pub struct MarketCatalog {
    index: RwLock<Option<Arc<MarketIndex>>>,
}

impl MarketCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<Arc<MarketIndex>> {
        self.index.read().await.clone()
    }

    pub async fn replace(&self, markets: Vec<Market>) -> Arc<MarketIndex> {
        let index = Arc::new(MarketIndex::new(markets));
        *self.index.write().await = Some(index.clone());
        index
    }

    pub async fn clear(&self) {
        *self.index.write().await = None;
    }
}
