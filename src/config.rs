//! Server configuration (C15, supplemental): CLI flags + environment.
//!
//! Mirrors this codebase's `edge_receiver`/`route_quality_monitor` binaries:
//! a `clap::Parser` struct with `env = "..."` fallbacks, loaded after
//! `dotenv()` so a local `.env` can seed the same variables.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "stellar-exchange")]
#[command(about = "Interstellar trading-exchange market engine")]
pub struct Config {
    /// Address the WebSocket/HTTP server binds to.
    #[arg(long, env = "STELLAR_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Maximum concurrent sessions per team before the oldest is evicted.
    #[arg(long, env = "STELLAR_SESSION_CAP", default_value = "5")]
    pub session_cap: usize,

    /// Sustained actions/sec admitted per team by the rate limiter.
    #[arg(long, env = "STELLAR_RATE_PER_SEC", default_value = "10.0")]
    pub rate_per_sec: f64,

    /// Token bucket capacity (burst size) per team.
    #[arg(long, env = "STELLAR_RATE_BUCKET_CAPACITY", default_value = "10.0")]
    pub rate_bucket_capacity: f64,

    /// Secondary-offer markup applied over the current mid price.
    #[arg(long, env = "STELLAR_OFFER_MARKUP", default_value = "1.10")]
    pub offer_markup: f64,

    /// Fallback offer price used when no mid can be derived yet.
    #[arg(long, env = "STELLAR_OFFER_DEFAULT_PRICE", default_value = "10.0")]
    pub offer_default_price: f64,

    /// Offer lifetime in seconds before it is swept as expired.
    #[arg(long, env = "STELLAR_OFFER_TTL_SECS", default_value = "60")]
    pub offer_ttl_secs: i64,

    /// Ticker broadcast interval in seconds.
    #[arg(long, env = "STELLAR_TICKER_INTERVAL_SECS", default_value = "5")]
    pub ticker_interval_secs: u64,

    /// Bound on the market engine's ingest queue.
    #[arg(long, env = "STELLAR_QUEUE_CAPACITY", default_value = "4096")]
    pub queue_capacity: usize,

    /// Max accepted WebSocket text frame size, in bytes.
    #[arg(long, env = "STELLAR_MAX_FRAME_BYTES", default_value = "65536")]
    pub max_frame_bytes: usize,

    /// Path to a JSON fixture seeding the team roster (see `team::Team`).
    #[arg(long, env = "STELLAR_TEAMS_FILE")]
    pub teams_file: Option<String>,

    /// Login token for the admin-observer connection (§4.7, §8 testable
    /// property 7). A connection logging in with this token is registered
    /// as an observer, not a team, and receives `ADMIN_FILL` for every
    /// trade. Unset disables the admin observer entirely.
    #[arg(long, env = "STELLAR_ADMIN_TOKEN")]
    pub admin_token: Option<String>,
}

/// Load `.env` (if present) before `Config::parse()` reads the environment,
/// same order this codebase's binaries use (`load_env()` then clap parsing).
pub fn load_env() {
    let _ = dotenv::dotenv();
}

pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stellar_exchange=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
