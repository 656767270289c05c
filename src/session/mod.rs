//! Session layer: registry, broadcaster, rate limiter, connection manager.

mod broadcaster;
mod manager;
mod rate_limit;
mod registry;

pub use broadcaster::Broadcaster;
pub use manager::SessionManager;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use registry::{ConnHandle, ConnId, RegisterOutcome, SessionRegistry, DEFAULT_SESSION_CAP};
