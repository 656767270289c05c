//! stellar-exchange: interstellar trading-exchange market engine server.
//!
//! Wiring follows this codebase's `main.rs`/`edge_receiver.rs` shape: clap
//! args + dotenv, a tracing-subscriber registry, an axum router carrying a
//! `/ws` upgrade and a `/healthz` JSON status endpoint, CORS + trace layers,
//! and a ctrl_c-triggered graceful shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use stellar_exchange::config::{self, Config};
use stellar_exchange::engine::{self, EngineConfig, MarketEngine};
use stellar_exchange::metrics::{Metrics, MetricsSnapshot};
use stellar_exchange::session::{Broadcaster, RateLimitConfig, RateLimiter, SessionManager, SessionRegistry};
use stellar_exchange::team::{self, TeamStore};

#[derive(Clone)]
struct AppState {
    manager: Arc<SessionManager>,
    metrics: Arc<Metrics>,
    registry: Arc<SessionRegistry>,
    started_at: DateTime<Utc>,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env();
    let cfg = Config::parse();
    config::init_tracing();

    info!(bind_addr = %cfg.bind_addr, "stellar-exchange starting");

    let teams = match &cfg.teams_file {
        Some(path) => team::load_teams_from_file(path).with_context(|| format!("loading teams fixture from {path}"))?,
        None => {
            warn!("no --teams-file provided, starting with an empty team roster");
            Vec::new()
        }
    };
    info!(team_count = teams.len(), "team roster loaded");
    let teams = Arc::new(TeamStore::new(teams));

    let registry = Arc::new(SessionRegistry::new(cfg.session_cap));
    let broadcaster = Arc::new(Broadcaster::new(registry.clone()));
    let metrics = Arc::new(Metrics::new());

    let engine_config = EngineConfig {
        queue_capacity: cfg.queue_capacity,
        offer_markup: cfg.offer_markup,
        offer_default_price: cfg.offer_default_price,
        offer_ttl_secs: cfg.offer_ttl_secs,
    };
    let market_engine = MarketEngine::spawn(teams.clone(), broadcaster.clone(), metrics.clone(), engine_config);
    engine::spawn_ticker(market_engine.clone(), broadcaster.clone(), cfg.ticker_interval_secs);

    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        rate_per_sec: cfg.rate_per_sec,
        capacity: cfg.rate_bucket_capacity,
    }));
    spawn_rate_limiter_cleanup(rate_limiter.clone());

    if cfg.admin_token.is_none() {
        warn!("no --admin-token provided, admin-observer login is disabled");
    }

    let manager = Arc::new(SessionManager::new(
        teams,
        registry.clone(),
        broadcaster,
        market_engine,
        rate_limiter,
        metrics.clone(),
        cfg.max_frame_bytes,
        cfg.admin_token.clone(),
    ));

    let state = AppState {
        manager,
        metrics,
        registry,
        started_at: Utc::now(),
    };

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .route("/healthz", get(health_check))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!("listening on {}", cfg.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

/// Periodically drop idle token buckets so a long-lived process doesn't
/// accumulate one entry per team that has ever connected, win or lose.
fn spawn_rate_limiter_cleanup(rate_limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            rate_limiter.cleanup(std::time::Duration::from_secs(600));
        }
    });
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| state.manager.handle_socket(socket))
}

#[derive(serde::Serialize)]
struct HealthBody {
    status: &'static str,
    uptime_secs: i64,
    connected_teams: usize,
    total_connections: usize,
    metrics: MetricsSnapshot,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        connected_teams: state.registry.connected_team_count(),
        total_connections: state.registry.total_connection_count(),
        metrics: state.metrics.snapshot(),
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining connections");
}
