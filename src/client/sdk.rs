//! `StellarClient` (C11-C13 assembled): the SDK surface a team's bot embeds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::EngineError;
use crate::protocol::{OrderMode, Product, ServerMessage, Side};

use super::connection::{self, DEFAULT_HEARTBEAT_INTERVAL_SECS};
use super::router::Router;
use super::state::{ClientState, ConnectionState, Listener};

pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 10;

pub struct StellarClient {
    state: Arc<ClientState>,
    router: Arc<Router>,
}

impl StellarClient {
    /// Connect, send `LOGIN`, and wait for `LOGIN_OK` (or an `ERROR`/timeout).
    pub async fn connect(url: impl Into<String>, token: impl Into<String>) -> Result<Self, EngineError> {
        Self::connect_with_heartbeat(url, token, DEFAULT_HEARTBEAT_INTERVAL_SECS).await
    }

    pub async fn connect_with_heartbeat(
        url: impl Into<String>,
        token: impl Into<String>,
        heartbeat_interval_secs: u64,
    ) -> Result<Self, EngineError> {
        let token = token.into();
        // §6.5: the SDK validates the bearer token's `TK-` prefix before ever
        // opening a socket, rather than round-tripping an obviously bad token.
        if !token.starts_with("TK-") {
            return Err(EngineError::AuthFailed);
        }
        let state = Arc::new(ClientState::new());
        let login_gate = state.arm_login_gate();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let handle = connection::spawn(url.into(), token, state.clone(), inbound_tx, heartbeat_interval_secs);
        let router = Router::new(handle, state.clone(), inbound_rx);

        match timeout(Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS), login_gate).await {
            Ok(Ok(Ok(_login_ok))) => Ok(Self { state, router }),
            Ok(Ok(Err(_server_error))) => Err(EngineError::AuthFailed),
            Ok(Err(_gate_dropped)) => Err(EngineError::ServiceUnavailable),
            Err(_elapsed) => Err(EngineError::ServiceUnavailable),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Register a listener invoked, in delivery order, for every inbound
    /// server message (§6.5, "client ordering").
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.state.listeners.add(listener);
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn submit_order(
        &self,
        cl_ord_id: impl Into<String>,
        side: Side,
        mode: OrderMode,
        product: Product,
        qty: u64,
        limit_price: Option<f64>,
        message: Option<String>,
    ) -> Result<(), EngineError> {
        self.router
            .submit_order(cl_ord_id.into(), side, mode, product, qty, limit_price, message)
            .await
    }

    pub async fn cancel(&self, cl_ord_id: impl Into<String>) -> Result<(), EngineError> {
        self.router.cancel(cl_ord_id.into()).await
    }

    pub async fn production_update(&self, product: Product, quantity: u64) -> Result<(), EngineError> {
        self.router.production_update(product, quantity).await
    }

    pub async fn accept_offer(
        &self,
        offer_id: impl Into<String>,
        accept: bool,
        quantity_offered: Option<u64>,
        price_offered: Option<f64>,
    ) -> Result<(), EngineError> {
        self.router
            .accept_offer(offer_id.into(), accept, quantity_offered, price_offered)
            .await
    }

    pub async fn resync(&self, last_sync: chrono::DateTime<chrono::Utc>) -> Result<(), EngineError> {
        self.router.resync(last_sync).await
    }
}
