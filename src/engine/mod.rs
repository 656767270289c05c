//! Market engine module: order book, matcher, settlement, offers, ticker.
//!
//! `engine` is the only submodule most callers touch directly; the rest are
//! implementation detail it drives (§4: C4-C9).

mod book;
mod engine;
mod matcher;
mod offer;
mod order;
mod settlement;
mod ticker;

pub use engine::{EngineConfig, MarketEngine, MarketState};
pub use offer::{Offer, OfferTable};
pub use order::{Fill, Order};
pub use ticker::spawn as spawn_ticker;
