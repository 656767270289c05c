//! Ticker service (C9): periodic per-product market snapshots.
//!
//! Runs on a fixed `tokio::time::interval`; never touches the book, only
//! reads the engine's market-state cache and broadcasts (§4.9).

use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::protocol::ServerMessage;
use crate::session::Broadcaster;

use super::engine::MarketEngine;

pub const DEFAULT_TICKER_INTERVAL_SECS: u64 = 5;

/// Spawn the ticker loop. Returns a handle the caller can abort on shutdown.
pub fn spawn(
    engine: std::sync::Arc<MarketEngine>,
    broadcaster: std::sync::Arc<Broadcaster>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            for product in engine.known_products() {
                let state = engine.market_state(&product);
                let msg = ServerMessage::Ticker {
                    product: product.clone(),
                    best_bid: state.best_bid,
                    best_ask: state.best_ask,
                    mid: state.mid,
                    volume_24h: state.volume_24h,
                    server_time: Utc::now(),
                };
                broadcaster.broadcast(msg);
            }
            debug!("ticker tick complete");
        }
    })
}
