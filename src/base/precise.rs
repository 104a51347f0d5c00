use rust_decimal::{Decimal, RoundingStrategy};

use super::safe::parse_decimal;

/// Decimal places implied by a tick or lot size string: "0.00010000" is 4,
/// "1" and "10" are 0. Zero, negative or unparseable ticks give `None`.
pub fn precision_from_tick(tick: &str) -> Option<u32> {
    let value = parse_decimal(tick)?;
    if value <= Decimal::ZERO {
        return None;
    }
    Some(value.normalize().scale())
}

pub fn tick_from_precision(places: u32) -> Decimal {
    Decimal::new(1, places)
}

/// Truncates toward zero, the way amounts must be sent to avoid overspending.
pub fn truncate(value: Decimal, places: Option<u32>) -> Decimal {
    match places {
        Some(dp) => value.round_dp_with_strategy(dp, RoundingStrategy::ToZero),
        None => value,
    }
}

/// Prices are rounded to the nearest tick.
pub fn round(value: Decimal, places: Option<u32>) -> Decimal {
    match places {
        Some(dp) => value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        None => value,
    }
}

/// Canonical wire form without trailing zeros.
pub fn number_to_string(value: Decimal) -> String {
    value.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_precision_from_tick() {
        assert_eq!(precision_from_tick("0.00010000"), Some(4));
        assert_eq!(precision_from_tick("0.01"), Some(2));
        assert_eq!(precision_from_tick("1"), Some(0));
        assert_eq!(precision_from_tick("10"), Some(0));
        assert_eq!(precision_from_tick("1e-8"), Some(8));
        assert_eq!(precision_from_tick("0"), None);
        assert_eq!(precision_from_tick(""), None);
    }

    #[test]
    fn test_truncate_and_round() {
        assert_eq!(truncate(dec!(0.123456789), Some(4)), dec!(0.1234));
        assert_eq!(truncate(dec!(0.123456789), None), dec!(0.123456789));
        assert_eq!(round(dec!(50000.125), Some(2)), dec!(50000.13));
        assert_eq!(tick_from_precision(3), dec!(0.001));
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(dec!(0.0100)), "0.01");
        assert_eq!(number_to_string(dec!(50000)), "50000");
    }
}
