use rust_decimal::Decimal;

use crate::types::{Order, OrderStatus, Trade};

/// Completes an order's numeric fields from whatever the exchange supplied.
/// Nothing is defaulted to zero: a field stays `None` unless it can be
/// derived from fields that are present.
pub fn safe_order(mut order: Order) -> Order {
    match (order.amount, order.filled, order.remaining) {
        (Some(amount), None, Some(remaining)) => order.filled = Some(amount - remaining),
        (Some(amount), Some(filled), None) => order.remaining = Some(amount - filled),
        (None, Some(filled), Some(remaining)) => order.amount = Some(filled + remaining),
        (Some(amount), None, None) if order.status == Some(OrderStatus::Closed) => {
            order.filled = Some(amount);
            order.remaining = Some(Decimal::ZERO);
        }
        _ => {}
    }

    if order.cost.is_none() {
        if let (Some(average), Some(filled)) = (order.average, order.filled) {
            order.cost = Some(average * filled);
        }
    }

    if order.average.is_none() {
        if let (Some(cost), Some(filled)) = (order.cost, order.filled) {
            if !filled.is_zero() {
                order.average = Some(cost / filled);
            }
        }
    }

    if order.last_trade_timestamp.is_none() && order.status == Some(OrderStatus::Closed) {
        order.last_trade_timestamp = order.timestamp;
    }

    order
}

pub fn safe_trade(mut trade: Trade) -> Trade {
    if trade.cost.is_none() {
        if let (Some(price), Some(amount)) = (trade.price, trade.amount) {
            trade.cost = Some(price * amount);
        }
    }
    trade
}

/// Applies the unified `since`/`limit` window to a list sorted by time.
pub fn filter_by_since_limit<T>(
    mut items: Vec<T>,
    since: Option<i64>,
    limit: Option<u32>,
    timestamp: impl Fn(&T) -> Option<i64>,
) -> Vec<T> {
    items.sort_by_key(|item| timestamp(item).unwrap_or(0));
    if let Some(since) = since {
        items.retain(|item| timestamp(item).map(|t| t >= since).unwrap_or(false));
    }
    if let Some(limit) = limit {
        let limit = limit as usize;
        if items.len() > limit {
            items.drain(..items.len() - limit);
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_filled_from_amount_and_remaining() {
        let mut order = Order::new("1", json!({}));
        order.amount = Some(dec!(2));
        order.remaining = Some(dec!(0.5));
        let order = safe_order(order);
        assert_eq!(order.filled, Some(dec!(1.5)));
    }

    #[test]
    fn test_remaining_from_amount_and_filled() {
        let mut order = Order::new("1", json!({}));
        order.amount = Some(dec!(2));
        order.filled = Some(dec!(0.5));
        let order = safe_order(order);
        assert_eq!(order.remaining, Some(dec!(1.5)));
        assert_eq!(order.remaining, Some(order.amount.unwrap() - order.filled.unwrap()));
    }

    #[test]
    fn test_cost_and_average() {
        let mut order = Order::new("1", json!({}));
        order.filled = Some(dec!(2));
        order.average = Some(dec!(100));
        assert_eq!(safe_order(order).cost, Some(dec!(200)));

        let mut order = Order::new("2", json!({}));
        order.filled = Some(dec!(4));
        order.cost = Some(dec!(200));
        assert_eq!(safe_order(order).average, Some(dec!(50)));
    }

    #[test]
    fn test_missing_inputs_stay_unspecified() {
        let mut order = Order::new("1", json!({}));
        order.amount = Some(dec!(1));
        let order = safe_order(order);
        assert_eq!(order.filled, None);
        assert_eq!(order.remaining, None);
        assert_eq!(order.cost, None);
    }

    #[test]
    fn test_zero_filled_leaves_average_unspecified() {
        let mut order = Order::new("1", json!({}));
        order.filled = Some(dec!(0));
        order.cost = Some(dec!(0));
        assert_eq!(safe_order(order).average, None);
    }

    #[test]
    fn test_trade_cost() {
        let mut trade = Trade::new("BTC/USD", json!({}));
        trade.price = Some(dec!(60000));
        trade.amount = Some(dec!(0.5));
        assert_eq!(safe_trade(trade).cost, Some(dec!(30000)));
    }

    #[test]
    fn test_filter_by_since_limit() {
        let items = vec![(3, "c"), (1, "a"), (2, "b"), (4, "d")];
        let out = filter_by_since_limit(items, Some(2), Some(2), |(t, _)| Some(*t));
        assert_eq!(out, vec![(3, "c"), (4, "d")]);
    }
}
