//! Lightweight in-process counters (§1.2 supplemental).
//!
//! Exposed only via the `/healthz` JSON body — no external exporter is
//! wired, keeping parity with "ambient stack yes, admin surface no."

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct Metrics {
    pub orders_submitted: AtomicU64,
    pub fills_settled: AtomicU64,
    pub offers_generated: AtomicU64,
    pub rate_limit_rejections: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub orders_submitted: u64,
    pub fills_settled: u64,
    pub offers_generated: u64,
    pub rate_limit_rejections: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_order_submitted(&self) {
        self.orders_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fill_settled(&self) {
        self.fills_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_offer_generated(&self) {
        self.offers_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            orders_submitted: self.orders_submitted.load(Ordering::Relaxed),
            fills_settled: self.fills_settled.load(Ordering::Relaxed),
            offers_generated: self.offers_generated.load(Ordering::Relaxed),
            rate_limit_rejections: self.rate_limit_rejections.load(Ordering::Relaxed),
        }
    }
}
