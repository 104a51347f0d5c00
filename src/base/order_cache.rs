use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::base::normalize::safe_order;
use crate::types::Order;

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Default)]
struct Entries {
    orders: HashMap<String, Order>,
    /// Ids oldest first, for eviction.
    order_ids: VecDeque<String>,
}

impl Entries {
    fn insert(&mut self, order: Order, capacity: usize) {
        if self.orders.insert(order.id.clone(), order.clone()).is_none() {
            self.order_ids.push_back(order.id);
        }
        while self.order_ids.len() > capacity {
            if let Some(oldest) = self.order_ids.pop_front() {
                self.orders.remove(&oldest);
            }
        }
    }
}

/// Best-effort memory of orders this adapter has seen, used to fill fields
/// that later responses for the same id leave out. Last write wins; the
/// oldest ids are dropped once `capacity` is exceeded.
#[derive(Debug)]
pub struct OrderCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl Default for OrderCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn remember(&self, order: &Order) {
        self.entries.lock().insert(order.clone(), self.capacity);
    }

    pub fn get(&self, id: &str) -> Option<Order> {
        self.entries.lock().orders.get(id).cloned()
    }

    /// Copies symbol, side, type, amount and price from the cached order
    /// when `order` lacks them, re-derives filled/remaining/cost from the
    /// merged fields, then stores the result.
    pub fn reconcile(&self, mut order: Order) -> Order {
        let mut entries = self.entries.lock();
        if let Some(cached) = entries.orders.get(&order.id) {
            order.symbol = order.symbol.or_else(|| cached.symbol.clone());
            order.side = order.side.or(cached.side);
            order.order_type = order.order_type.or(cached.order_type);
            order.amount = order.amount.or(cached.amount);
            order.price = order.price.or(cached.price);
            order.client_order_id = order
                .client_order_id
                .or_else(|| cached.client_order_id.clone());
            order.timestamp = order.timestamp.or(cached.timestamp);
        }
        let order = safe_order(order);
        entries.insert(order.clone(), self.capacity);
        order
    }

    pub fn len(&self) -> usize {
        self.entries.lock().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderSide, OrderStatus};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_reconcile_fills_missing_fields() {
        let cache = OrderCache::new();
        let mut placed = Order::new("abc", json!({}));
        placed.symbol = Some("BTC/AUD".into());
        placed.side = Some(OrderSide::Buy);
        placed.amount = Some(dec!(0.1));
        cache.remember(&placed);

        let mut canceled = Order::new("abc", json!({}));
        canceled.status = Some(OrderStatus::Canceled);
        let merged = cache.reconcile(canceled);

        assert_eq!(merged.symbol.as_deref(), Some("BTC/AUD"));
        assert_eq!(merged.side, Some(OrderSide::Buy));
        assert_eq!(merged.status, Some(OrderStatus::Canceled));
        assert_eq!(cache.get("abc").unwrap().status, Some(OrderStatus::Canceled));
    }

    #[test]
    fn test_reconcile_unknown_id_is_stored() {
        let cache = OrderCache::new();
        assert!(cache.is_empty());
        cache.reconcile(Order::new("x", json!({})));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reconcile_derives_fill_from_cached_amount() {
        let cache = OrderCache::new();
        let mut placed = Order::new("abc", json!({}));
        placed.amount = Some(dec!(2));
        cache.remember(&placed);

        let mut update = Order::new("abc", json!({}));
        update.filled = Some(dec!(0.5));
        update.average = Some(dec!(100));
        let merged = cache.reconcile(update);

        assert_eq!(merged.amount, Some(dec!(2)));
        assert_eq!(merged.remaining, Some(dec!(1.5)));
        assert_eq!(merged.cost, Some(dec!(50)));
        assert_eq!(cache.get("abc").unwrap().remaining, Some(dec!(1.5)));
    }

    #[test]
    fn test_oldest_orders_are_evicted() {
        let cache = OrderCache::with_capacity(2);
        cache.remember(&Order::new("a", json!({})));
        cache.remember(&Order::new("b", json!({})));
        cache.remember(&Order::new("a", json!({})));
        assert_eq!(cache.len(), 2);

        cache.reconcile(Order::new("c", json!({})));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }
}
