//! Offer generator (C8): targeted secondary market invitations.
//!
//! Triggered when an incoming BUY has positive residual and no remaining
//! crossable SELL (§4.8). The offer table lives entirely in memory — an
//! offer that outlives the process is simply gone, which is acceptable since
//! acceptance races are resolved by whoever calls `try_accept` first.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::order::Order;
use crate::protocol::Product;

/// Default offer markup over mid (§9 open question: hard-coded 1.10x in the
/// source, promoted to configuration here).
pub const DEFAULT_OFFER_MARKUP: f64 = 1.10;

/// Fallback price when no mid exists yet for the product (no resting orders
/// on either side to derive one from).
pub const DEFAULT_OFFER_PRICE: f64 = 10.0;

/// Default offer lifetime.
pub const DEFAULT_OFFER_TTL_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct Offer {
    pub offer_id: String,
    pub buyer: String,
    pub product: Product,
    pub quantity_requested: u64,
    pub max_price: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// The residual BUY this offer exists to satisfy. Held here rather than
    /// in the book because MARKET orders never rest (§4.4); on acceptance it
    /// is fed back into the matcher as if it were still live.
    pub origin_order: Order,
}

impl Offer {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Heuristic offer price: `markup` times the current mid, or a configured
/// default when no mid can be derived (§4.8 step 1).
pub fn offer_price(mid: Option<f64>, markup: f64, default_price: f64) -> f64 {
    match mid {
        Some(m) if m > 0.0 => m * markup,
        _ => default_price,
    }
}

/// In-memory offer table. One entry per live offer, keyed by `offer_id`.
#[derive(Default)]
pub struct OfferTable {
    offers: Mutex<HashMap<String, Offer>>,
}

impl OfferTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        buyer: String,
        product: Product,
        quantity_requested: u64,
        max_price: f64,
        ttl_secs: i64,
        now: DateTime<Utc>,
        origin_order: Order,
    ) -> Offer {
        let offer = Offer {
            offer_id: Uuid::new_v4().to_string(),
            buyer,
            product,
            quantity_requested,
            max_price,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
            origin_order,
        };
        self.offers.lock().insert(offer.offer_id.clone(), offer.clone());
        offer
    }

    /// Atomically remove and return the offer if present and unexpired.
    /// Exactly one caller ever observes `Some` for a given `offer_id`
    /// (§4.8 concurrency: exactly one acceptance wins).
    pub fn try_take(&self, offer_id: &str, now: DateTime<Utc>) -> Option<Offer> {
        let mut guard = self.offers.lock();
        let offer = guard.get(offer_id)?;
        if offer.is_expired(now) {
            guard.remove(offer_id);
            return None;
        }
        guard.remove(offer_id)
    }

    /// Drop every expired offer, returning the ones removed so the caller can
    /// terminally cancel their origin orders.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<Offer> {
        let mut guard = self.offers.lock();
        let expired_ids: Vec<String> = guard
            .iter()
            .filter(|(_, o)| o.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        expired_ids
            .into_iter()
            .filter_map(|id| guard.remove(&id))
            .collect()
    }
}
