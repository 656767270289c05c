//! Per-product order book (C4): two sorted queues, price-time priority.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::order::Order;
use crate::protocol::{OrderMode, Side};

/// One side of a book: a FIFO-within-price-level queue, kept sorted on insert.
///
/// `VecDeque` is adequate here: books in this exchange run a handful of
/// products with modest resting depth, so O(n) insert/remove beats the
/// constant-factor overhead of a `BTreeMap<PriceLevel>` for the sizes this
/// deployment actually sees.
#[derive(Debug, Default)]
struct BookSide {
    side: Option<Side>,
    orders: VecDeque<Order>,
}

impl BookSide {
    fn new(side: Side) -> Self {
        Self {
            side: Some(side),
            orders: VecDeque::new(),
        }
    }

    /// Comparator key for sort order: BUY by (-price, created_at), SELL by (price, created_at).
    /// MARKET orders sort behind all LIMITs on their side (least price priority) but are never
    /// rested past the current match attempt (§4.4).
    fn sort_key(&self, order: &Order) -> (f64, DateTime<Utc>) {
        let side = self.side.expect("side set at construction");
        let price_rank = match order.mode {
            OrderMode::Market => f64::INFINITY,
            OrderMode::Limit => {
                let p = order.limit_price.unwrap_or(0.0);
                match side {
                    Side::Buy => -p,
                    Side::Sell => p,
                }
            }
        };
        (price_rank, order.created_at)
    }

    fn insert(&mut self, order: Order) {
        let key = self.sort_key(&order);
        let pos = self
            .orders
            .iter()
            .position(|o| self.sort_key(o) > key)
            .unwrap_or(self.orders.len());
        self.orders.insert(pos, order);
    }

    fn remove(&mut self, cl_ord_id: &str, team_name: &str) -> Option<Order> {
        let pos = self
            .orders
            .iter()
            .position(|o| o.cl_ord_id == cl_ord_id && o.team_name == team_name)?;
        self.orders.remove(pos)
    }

    fn front(&self) -> Option<&Order> {
        self.orders.front()
    }
}

/// The order book for one product: a BUY side and a SELL side.
#[derive(Debug)]
pub struct OrderBook {
    bids: BookSide,
    asks: BookSide,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    /// Insert a resting order onto its side, preserving price-time sort.
    /// MARKET orders are never inserted (§4.4); callers must not call this for one.
    pub fn add(&mut self, order: Order) {
        debug_assert!(matches!(order.mode, OrderMode::Limit), "MARKET never rests");
        self.side_mut(order.side).insert(order);
    }

    pub fn remove(&mut self, side: Side, cl_ord_id: &str, team_name: &str) -> Option<Order> {
        self.side_mut(side).remove(cl_ord_id, team_name)
    }

    /// Opposite-side queue for an incoming order of `side`, front-to-back match order.
    pub fn opposite(&self, side: Side) -> impl Iterator<Item = &Order> {
        self.side(side.opposite()).orders.iter()
    }

    pub fn opposite_len(&self, side: Side) -> usize {
        self.side(side.opposite()).orders.len()
    }

    /// Remove the resting order at `cl_ord_id`/`team_name` on the opposite side of `side`,
    /// used by the matcher to splice out a fully- or partially-consumed resting order.
    pub fn remove_opposite(&mut self, side: Side, cl_ord_id: &str, team_name: &str) -> Option<Order> {
        self.side_mut(side.opposite()).remove(cl_ord_id, team_name)
    }

    /// Re-insert a partially-filled resting order at the front of its side — it keeps its
    /// original time priority, so this is a front push, not a resort.
    pub fn requeue_front(&mut self, order: Order) {
        let s = self.side_mut(order.side);
        s.orders.push_front(order);
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.front().and_then(|o| o.limit_price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.front().and_then(|o| o.limit_price)
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        }
    }

    pub fn is_side_empty(&self, side: Side) -> bool {
        self.side(side).orders.is_empty()
    }

    /// Remove and return every resting order on `side` whose `expires_at` has passed.
    /// Called by the engine before each match attempt (§4.7 expiry policy).
    pub fn sweep_expired(&mut self, side: Side, now: DateTime<Utc>) -> Vec<Order> {
        let s = self.side_mut(side);
        let mut expired = Vec::new();
        let mut i = 0;
        while i < s.orders.len() {
            if s.orders[i].is_expired(now) {
                expired.push(s.orders.remove(i).expect("index in bounds"));
            } else {
                i += 1;
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OrderStatus, Product};

    fn limit_order(id: &str, side: Side, price: f64, created_at: DateTime<Utc>) -> Order {
        Order {
            cl_ord_id: id.into(),
            team_name: "T".into(),
            side,
            mode: OrderMode::Limit,
            product: Product::new("FOSFO"),
            quantity: 10,
            limit_price: Some(price),
            created_at,
            filled_qty: 0,
            status: OrderStatus::Pending,
            expires_at: None,
            message: None,
            debug_flag: false,
        }
    }

    #[test]
    fn bids_sort_best_price_first_then_time() {
        let mut book = OrderBook::new();
        let t0 = Utc::now();
        book.add(limit_order("a", Side::Buy, 18.0, t0));
        book.add(limit_order("b", Side::Buy, 20.0, t0 + chrono::Duration::seconds(1)));
        book.add(limit_order("c", Side::Buy, 20.0, t0));
        assert_eq!(book.best_bid(), Some(20.0));
        let ids: Vec<_> = book.opposite(Side::Sell).map(|o| o.cl_ord_id.clone()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn asks_sort_lowest_price_first_then_time() {
        let mut book = OrderBook::new();
        let t0 = Utc::now();
        book.add(limit_order("a", Side::Sell, 22.0, t0));
        book.add(limit_order("b", Side::Sell, 18.0, t0));
        assert_eq!(book.best_ask(), Some(18.0));
    }

    #[test]
    fn remove_splices_out_named_order() {
        let mut book = OrderBook::new();
        let t0 = Utc::now();
        book.add(limit_order("a", Side::Buy, 18.0, t0));
        let removed = book.remove(Side::Buy, "a", "T");
        assert!(removed.is_some());
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn mid_is_none_until_both_sides_present() {
        let mut book = OrderBook::new();
        let t0 = Utc::now();
        assert_eq!(book.mid(), None);
        book.add(limit_order("a", Side::Buy, 18.0, t0));
        assert_eq!(book.mid(), None);
        book.add(limit_order("b", Side::Sell, 22.0, t0));
        assert_eq!(book.mid(), Some(20.0));
    }
}
