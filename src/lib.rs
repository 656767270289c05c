//! Interstellar trading-exchange market engine and session layer.
//!
//! `engine` owns matching/settlement state; `session` gates connections and
//! fans out events; `protocol` is the wire codec shared by both sides;
//! `client` is the companion SDK teams embed in their bots.

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod team;
