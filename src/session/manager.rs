//! Session manager (C10): per-connection handshake, auth gate, and dispatch.
//!
//! One `handle_socket` task per WebSocket connection. State is local to the
//! task (OPENED -> AUTHENTICATED -> CLOSED, §4.10) plus whatever it registers
//! into the shared `SessionRegistry`. Grounded on this codebase's
//! `websocket_handler`/`handle_socket` pair in `main.rs`, generalized from a
//! single broadcast subscription to a per-connection outbound queue plus an
//! auth gate in front of every inbound message.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::engine::MarketEngine;
use crate::error::EngineError;
use crate::metrics::Metrics;
use crate::protocol::{self, ClientMessage, OrderMode, OrderStatus, ServerMessage};
use crate::team::TeamStore;

use super::broadcaster::Broadcaster;
use super::rate_limit::RateLimiter;
use super::registry::{next_conn_id, ConnHandle, SessionRegistry};

/// What a connection has authenticated as, once past LOGIN. An
/// unauthenticated connection hasn't logged in yet; a team connection is a
/// normal trading session; an observer connection logged in with the
/// configured admin token and receives only `ADMIN_FILL` (§4.7, §8 testable
/// property 7) — it never touches book/inventory state, so it is never
/// routed through `teams.mutate`.
enum ConnRole {
    Unauthenticated,
    Team(String),
    Observer,
}

pub struct SessionManager {
    teams: Arc<TeamStore>,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<Broadcaster>,
    engine: Arc<MarketEngine>,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<Metrics>,
    max_frame_bytes: usize,
    admin_token: Option<String>,
}

impl SessionManager {
    pub fn new(
        teams: Arc<TeamStore>,
        registry: Arc<SessionRegistry>,
        broadcaster: Arc<Broadcaster>,
        engine: Arc<MarketEngine>,
        rate_limiter: Arc<RateLimiter>,
        metrics: Arc<Metrics>,
        max_frame_bytes: usize,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            teams,
            registry,
            broadcaster,
            engine,
            rate_limiter,
            metrics,
            max_frame_bytes,
            admin_token,
        }
    }

    /// Drive one WebSocket connection end to end. Never panics on client
    /// input — every decode/dispatch failure becomes an ERROR frame (or, for
    /// `is_fatal()` errors, an ERROR frame followed by closing the socket).
    pub async fn handle_socket(self: Arc<Self>, mut socket: WebSocket) {
        let conn_id = next_conn_id();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
        let mut role = ConnRole::Unauthenticated;

        loop {
            tokio::select! {
                outbound = out_rx.recv() => {
                    let Some(msg) = outbound else { break };
                    if socket.send(Message::Text(protocol::encode_server_message(&msg))).await.is_err() {
                        break;
                    }
                }
                incoming = socket.recv() => {
                    let Some(Ok(msg)) = incoming else { break };
                    match msg {
                        Message::Text(text) => {
                            if !self.dispatch(conn_id, &text, &mut role, &out_tx).await {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            }
        }

        self.registry.unregister(conn_id);
        if let ConnRole::Team(team) = role {
            info!(team = %team, conn_id, "connection closed");
        }
    }

    /// Handle one inbound text frame. Returns `false` if the connection
    /// should close (a fatal error was sent, or the frame could not even be
    /// attributed to an open session).
    async fn dispatch(
        &self,
        conn_id: super::registry::ConnId,
        text: &str,
        role: &mut ConnRole,
        out_tx: &mpsc::UnboundedSender<ServerMessage>,
    ) -> bool {
        let decoded = protocol::decode_client_message(text, self.max_frame_bytes);
        let msg = match decoded {
            Ok(msg) => msg,
            Err(e) => {
                let _ = out_tx.send(ServerMessage::error(e, None));
                return true;
            }
        };

        if let ClientMessage::Login { token, .. } = msg {
            return self.handle_login(conn_id, &token, role, out_tx);
        }

        if matches!(role, ConnRole::Observer) {
            // An observer never drives book/inventory state; it only ever
            // receives ADMIN_FILL and answers PING, like any other session.
            if let ClientMessage::Ping {} = msg {
                let _ = out_tx.send(ServerMessage::Pong {});
            } else {
                let _ = out_tx.send(ServerMessage::error(EngineError::InvalidMessage, None));
            }
            return true;
        }

        let team = match role {
            ConnRole::Team(team) => team.clone(),
            ConnRole::Unauthenticated => {
                // §4.10: the first non-LOGIN message on an unauthenticated connection
                // is a protocol violation, not a failed login attempt.
                let _ = out_tx.send(ServerMessage::error(EngineError::InvalidMessage, None));
                return false;
            }
            ConnRole::Observer => unreachable!("handled above"),
        };
        let team = &team;

        if !self.rate_limiter.try_acquire(team) {
            self.metrics.record_rate_limit_rejection();
            let _ = out_tx.send(ServerMessage::error(EngineError::RateLimitExceeded, None));
            return true;
        }

        match msg {
            ClientMessage::Login { .. } => unreachable!("handled above"),
            ClientMessage::Order {
                cl_ord_id,
                side,
                mode,
                product,
                qty,
                limit_price,
                expires_at,
                message,
                debug_mode,
            } => {
                if let Err(e) =
                    self.validate_order(team, &cl_ord_id, mode, qty, limit_price, &product, expires_at, &message)
                {
                    let _ = out_tx.send(ServerMessage::error(e, Some(cl_ord_id)));
                    return true;
                }
                let order = crate::engine::Order {
                    cl_ord_id,
                    team_name: team.clone(),
                    side,
                    mode,
                    product,
                    quantity: qty,
                    limit_price,
                    created_at: Utc::now(),
                    filled_qty: 0,
                    status: OrderStatus::Pending,
                    expires_at,
                    message,
                    debug_flag: debug_mode.unwrap_or(false),
                };
                if let Err(e) = self.engine.submit(order) {
                    let _ = out_tx.send(ServerMessage::error(e, None));
                }
            }
            ClientMessage::Cancel { cl_ord_id } => {
                if let Err(e) = self.engine.cancel(team.clone(), cl_ord_id.clone()) {
                    let _ = out_tx.send(ServerMessage::error(e, Some(cl_ord_id)));
                }
            }
            ClientMessage::ProductionUpdate { product, quantity } => {
                if quantity == 0 {
                    let _ = out_tx.send(ServerMessage::error(EngineError::InvalidQuantity, None));
                    return true;
                }
                if let Err(e) = self.engine.production_update(team.clone(), product, quantity) {
                    let _ = out_tx.send(ServerMessage::error(e, None));
                }
            }
            ClientMessage::AcceptOffer {
                offer_id,
                accept,
                quantity_offered,
                price_offered,
            } => {
                if let Err(e) = self
                    .engine
                    .accept_offer(team.clone(), offer_id, accept, quantity_offered, price_offered)
                {
                    let _ = out_tx.send(ServerMessage::error(e, None));
                }
            }
            ClientMessage::Resync { last_sync } => {
                let events = self
                    .engine
                    .fills_since(team, last_sync)
                    .into_iter()
                    .map(|f| ServerMessage::Fill {
                        cl_ord_id: if &f.buyer == team {
                            f.buyer_cl_ord_id.clone()
                        } else {
                            f.seller_cl_ord_id.clone()
                        },
                        fill_qty: f.quantity,
                        fill_price: f.price,
                        side: if &f.buyer == team {
                            crate::protocol::Side::Buy
                        } else {
                            crate::protocol::Side::Sell
                        },
                        product: f.product.clone(),
                        counterparty: if &f.buyer == team { f.seller.clone() } else { f.buyer.clone() },
                        counterparty_message: if &f.buyer == team {
                            f.seller_message.clone()
                        } else {
                            f.buyer_message.clone()
                        },
                        server_time: f.executed_at,
                        remaining_qty: None,
                        total_qty: None,
                    })
                    .collect();
                let _ = out_tx.send(ServerMessage::EventDelta {
                    events,
                    server_time: Utc::now(),
                });
            }
            ClientMessage::Ping {} => {
                let _ = out_tx.send(ServerMessage::Pong {});
            }
        }
        true
    }

    fn handle_login(
        &self,
        conn_id: super::registry::ConnId,
        token: &str,
        role: &mut ConnRole,
        out_tx: &mpsc::UnboundedSender<ServerMessage>,
    ) -> bool {
        if self.admin_token.as_deref().is_some_and(|t| t == token) {
            self.registry.register_observer(ConnHandle::new(conn_id, out_tx.clone()));
            *role = ConnRole::Observer;
            info!(conn_id, "admin observer connected");
            return true;
        }

        let Some(team) = self.teams.lookup_by_token(token) else {
            warn!(conn_id, "login failed: unknown token");
            let _ = out_tx.send(ServerMessage::error(EngineError::AuthFailed, None));
            return false;
        };

        let outcome = self
            .registry
            .register(&team.team_name, ConnHandle::new(conn_id, out_tx.clone()));
        if let Some(evicted) = outcome.evicted {
            warn!(team = %team.team_name, evicted_conn = evicted, "session cap reached, evicted oldest connection");
        }
        *role = ConnRole::Team(team.team_name.clone());

        let _ = out_tx.send(ServerMessage::LoginOk {
            team: team.team_name.clone(),
            species: team.species.clone(),
            initial_balance: team.initial_balance,
            current_balance: team.current_balance,
            inventory: team.inventory.clone(),
            authorized_products: team.authorized_products.clone(),
            recipes: team.recipes.clone(),
            role: team.role.clone(),
            server_time: Utc::now(),
        });
        info!(team = %team.team_name, conn_id, "login ok");
        true
    }

    /// Wire-layer validation independent of book/inventory state (§6.1, §7).
    fn validate_order(
        &self,
        _team_name: &str,
        cl_ord_id: &str,
        mode: OrderMode,
        qty: u64,
        limit_price: Option<f64>,
        product: &crate::protocol::Product,
        expires_at: Option<chrono::DateTime<Utc>>,
        message: &Option<String>,
    ) -> Result<(), EngineError> {
        if cl_ord_id.is_empty() {
            return Err(EngineError::InvalidOrder);
        }
        if qty == 0 || qty == u64::MAX {
            return Err(EngineError::InvalidQuantity);
        }
        if !product.is_well_formed() {
            return Err(EngineError::InvalidProduct);
        }
        if mode == OrderMode::Limit && limit_price.map(|p| p <= 0.0).unwrap_or(true) {
            return Err(EngineError::InvalidOrder);
        }
        if let Some(at) = expires_at {
            if at <= Utc::now() {
                return Err(EngineError::InvalidOrder);
            }
        }
        if let Some(msg) = message {
            if msg.chars().count() > 200 {
                return Err(EngineError::InvalidMessage);
            }
        }
        Ok(())
    }
}
