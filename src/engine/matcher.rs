//! Matcher (C5): price-time crossing rules over an already-sorted book.
//!
//! This module is intentionally side-effect free — it decides *whether* an
//! incoming order crosses a resting one, not what happens as a result. The
//! engine (`engine::engine`) drives the scan and calls `settlement::settle`
//! for each crossing pair it accepts.

use crate::protocol::{OrderMode, Side};

use super::order::Order;

/// Does an incoming order (`side`/`mode`/`limit_price`) cross a resting `order`?
///
/// Resting orders are always LIMIT: MARKET orders never rest (§4.4), so the
/// "MARKET vs MARKET does not cross" rule in §4.5 can never actually trigger
/// under this book's invariant — it is preserved here only as a guard in case
/// that invariant is ever relaxed.
pub fn crosses(side: Side, mode: OrderMode, limit_price: Option<f64>, resting: &Order) -> bool {
    let resting_price = match resting.limit_price {
        Some(p) => p,
        None => return false,
    };
    match mode {
        OrderMode::Market => !matches!(resting.mode, OrderMode::Market),
        OrderMode::Limit => {
            let Some(p) = limit_price else { return false };
            match side {
                Side::Buy => p >= resting_price,
                Side::Sell => p <= resting_price,
            }
        }
    }
}

/// Trade price for a crossing pair: always the resting order's price (§4.5).
pub fn trade_price(resting: &Order) -> f64 {
    resting.limit_price.expect("crosses() already guarded against missing price")
}

/// Trade quantity for a crossing pair: the smaller of the two remaining quantities.
pub fn trade_qty(incoming_remaining: u64, resting: &Order) -> u64 {
    incoming_remaining.min(resting.remaining())
}

/// The buyer/seller team names for a pair, given which side the incoming order is on.
pub fn counterparty_roles<'a>(
    incoming_side: Side,
    incoming_team: &'a str,
    resting: &'a Order,
) -> (&'a str, &'a str) {
    match incoming_side {
        Side::Buy => (incoming_team, resting.team_name.as_str()),
        Side::Sell => (resting.team_name.as_str(), incoming_team),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OrderStatus, Product};
    use chrono::Utc;

    fn resting(side: Side, price: f64) -> Order {
        Order {
            cl_ord_id: "R".into(),
            team_name: "R".into(),
            side,
            mode: OrderMode::Limit,
            product: Product::new("FOSFO"),
            quantity: 10,
            limit_price: Some(price),
            created_at: Utc::now(),
            filled_qty: 0,
            status: OrderStatus::Pending,
            expires_at: None,
            message: None,
            debug_flag: false,
        }
    }

    #[test]
    fn buy_limit_crosses_ask_at_or_below_bid() {
        let ask = resting(Side::Sell, 18.0);
        assert!(crosses(Side::Buy, OrderMode::Limit, Some(20.0), &ask));
        assert!(crosses(Side::Buy, OrderMode::Limit, Some(18.0), &ask));
        assert!(!crosses(Side::Buy, OrderMode::Limit, Some(17.99), &ask));
    }

    #[test]
    fn sell_limit_crosses_bid_at_or_above_ask() {
        let bid = resting(Side::Buy, 20.0);
        assert!(crosses(Side::Sell, OrderMode::Limit, Some(18.0), &bid));
        assert!(!crosses(Side::Sell, OrderMode::Limit, Some(20.01), &bid));
    }

    #[test]
    fn market_crosses_any_resting_limit() {
        let ask = resting(Side::Sell, 999.0);
        assert!(crosses(Side::Buy, OrderMode::Market, None, &ask));
    }

    #[test]
    fn trade_qty_takes_the_smaller_side() {
        let mut r = resting(Side::Buy, 20.0);
        r.filled_qty = 4; // remaining = 6
        assert_eq!(trade_qty(10, &r), 6);
        assert_eq!(trade_qty(3, &r), 3);
    }
}
