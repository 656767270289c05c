//! Order and fill records (§3).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::protocol::{OrderMode, OrderStatus, Product, Side};

#[derive(Debug, Clone)]
pub struct Order {
    pub cl_ord_id: String,
    pub team_name: String,
    pub side: Side,
    pub mode: OrderMode,
    pub product: Product,
    pub quantity: u64,
    pub limit_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub filled_qty: u64,
    pub status: OrderStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub debug_flag: bool,
}

impl Order {
    pub fn remaining(&self) -> u64 {
        self.quantity.saturating_sub(self.filled_qty)
    }

    pub fn is_resting(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::PartiallyFilled)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Apply a fill of `qty` to this order, advancing `filled_qty` and status.
    /// Never regresses a terminal status (invariant: monotonic transitions).
    pub fn apply_fill(&mut self, qty: u64) {
        debug_assert!(qty > 0);
        self.filled_qty += qty;
        debug_assert!(self.filled_qty <= self.quantity);
        self.status = if self.filled_qty == self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }

    pub fn cancel(&mut self) {
        if !self.status.is_terminal() {
            self.status = OrderStatus::Cancelled;
        }
    }

    pub fn expire(&mut self) {
        if !self.status.is_terminal() {
            self.status = OrderStatus::Expired;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fill {
    pub fill_id: String,
    pub buyer_cl_ord_id: String,
    pub seller_cl_ord_id: String,
    pub buyer: String,
    pub seller: String,
    pub product: Product,
    pub quantity: u64,
    pub price: f64,
    pub buyer_message: Option<String>,
    pub seller_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl Fill {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// True if `team_name` is either counterparty of this fill (§8.9, resync).
    pub fn involves(&self, team_name: &str) -> bool {
        self.buyer == team_name || self.seller == team_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order(qty: u64) -> Order {
        Order {
            cl_ord_id: "X".into(),
            team_name: "A".into(),
            side: Side::Buy,
            mode: OrderMode::Limit,
            product: Product::new("FOSFO"),
            quantity: qty,
            limit_price: Some(20.0),
            created_at: Utc::now(),
            filled_qty: 0,
            status: OrderStatus::Pending,
            expires_at: None,
            message: None,
            debug_flag: false,
        }
    }

    #[test]
    fn partial_fill_keeps_order_resting() {
        let mut o = new_order(10);
        o.apply_fill(4);
        assert!(matches!(o.status, OrderStatus::PartiallyFilled));
        assert!(o.is_resting());
        assert_eq!(o.remaining(), 6);
    }

    #[test]
    fn exact_fill_terminates_order() {
        let mut o = new_order(5);
        o.apply_fill(5);
        assert!(matches!(o.status, OrderStatus::Filled));
        assert!(!o.is_resting());
    }

    #[test]
    fn cancel_does_not_override_terminal_status() {
        let mut o = new_order(5);
        o.apply_fill(5);
        o.cancel();
        assert!(matches!(o.status, OrderStatus::Filled));
    }
}
