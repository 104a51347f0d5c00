use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub free: Option<Decimal>,
    pub used: Option<Decimal>,
    pub total: Option<Decimal>,
}

impl BalanceEntry {
    /// Completes whichever of the three amounts is missing from the other two.
    /// A `total` supplied by the exchange is kept as-is.
    pub fn new(free: Option<Decimal>, used: Option<Decimal>, total: Option<Decimal>) -> Self {
        let (free, used, total) = match (free, used, total) {
            (Some(f), Some(u), None) => (Some(f), Some(u), Some(f + u)),
            (Some(f), None, Some(t)) => (Some(f), Some(t - f), Some(t)),
            (None, Some(u), Some(t)) => (Some(t - u), Some(u), Some(t)),
            other => other,
        };
        Self { free, used, total }
    }

    pub fn zero() -> Self {
        Self::new(Some(Decimal::ZERO), Some(Decimal::ZERO), None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    pub timestamp: Option<i64>,
    pub entries: BTreeMap<String, BalanceEntry>,
    pub info: Value,
}

impl Balances {
    pub fn new(info: Value) -> Self {
        Self {
            timestamp: None,
            entries: BTreeMap::new(),
            info,
        }
    }

    pub fn insert(&mut self, code: impl Into<String>, entry: BalanceEntry) {
        self.entries.insert(code.into(), entry);
    }

    pub fn get(&self, code: &str) -> Option<&BalanceEntry> {
        self.entries.get(code)
    }

    pub fn free(&self, code: &str) -> Option<Decimal> {
        self.get(code).and_then(|e| e.free)
    }

    pub fn total(&self, code: &str) -> Option<Decimal> {
        self.get(code).and_then(|e| e.total)
    }

    pub fn currencies(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Entries with a non-zero total.
    pub fn non_zero(&self) -> impl Iterator<Item = (&String, &BalanceEntry)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.total.map(|t| !t.is_zero()).unwrap_or(false))
    }
}
