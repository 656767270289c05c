//! Router (C12): the single sequencer for inbound dispatch and the gate and
//! serialization point for outbound sends.
//!
//! One task drains the connection's inbound channel and fans each message
//! out to listeners in arrival order — no message is ever handed to a
//! listener out of the order the transport delivered it. Outbound sends go
//! through a one-permit semaphore: only one `ClientMessage` is ever in
//! flight to the socket at a time, and every send first awaits
//! `AUTHENTICATED`, so a caller can never race a send ahead of its own
//! login (§6.5, §8 "client send gate"/"client ordering").

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};

use crate::error::EngineError;
use crate::protocol::{ClientMessage, OrderMode, Product, ServerMessage, Side};

use super::connection::ConnectionHandle;
use super::state::ClientState;

pub struct Router {
    outbound: mpsc::Sender<ClientMessage>,
    state: Arc<ClientState>,
    write_permit: Semaphore,
    /// cl_ord_ids this client has already submitted, for the client-unique
    /// check in `submit_order` (§4.12).
    seen_cl_ord_ids: Mutex<HashSet<String>>,
}

impl Router {
    pub fn new(handle: ConnectionHandle, state: Arc<ClientState>, mut inbound_rx: mpsc::UnboundedReceiver<ServerMessage>) -> Arc<Self> {
        let router = Arc::new(Self {
            outbound: handle.outbound,
            state,
            write_permit: Semaphore::new(1),
            seen_cl_ord_ids: Mutex::new(HashSet::new()),
        });

        let dispatch_state = router.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbound_rx.recv().await {
                // One task per (listener, message), submitted in snapshot order from
                // this single sequencer so two listeners can run concurrently on this
                // message while still preserving per-listener enqueue order across
                // messages (§4.13, §8 "client ordering"). A listener that panics only
                // ever takes down its own spawned task.
                let msg = Arc::new(msg);
                for listener in dispatch_state.listeners.snapshot().iter().cloned() {
                    let msg = msg.clone();
                    tokio::spawn(async move { listener(msg.as_ref()) });
                }
            }
        });

        router
    }

    /// Submit a new order. Validated locally before it ever reaches the
    /// write permit (§6.1/§7: malformed frames are rejected client-side
    /// rather than round-tripped for an `ERROR`).
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_order(
        &self,
        cl_ord_id: String,
        side: Side,
        mode: OrderMode,
        product: Product,
        qty: u64,
        limit_price: Option<f64>,
        message: Option<String>,
    ) -> Result<(), EngineError> {
        if cl_ord_id.is_empty() {
            return Err(EngineError::InvalidOrder);
        }
        if qty == 0 {
            return Err(EngineError::InvalidQuantity);
        }
        if mode == OrderMode::Limit && limit_price.map(|p| p <= 0.0).unwrap_or(true) {
            return Err(EngineError::InvalidOrder);
        }
        if let Some(ref msg) = message {
            if msg.chars().count() > 200 {
                return Err(EngineError::InvalidMessage);
            }
        }
        if !self.seen_cl_ord_ids.lock().insert(cl_ord_id.clone()) {
            return Err(EngineError::DuplicateOrderId);
        }
        self.send(ClientMessage::Order {
            cl_ord_id,
            side,
            mode,
            product,
            qty,
            limit_price,
            expires_at: None,
            message,
            debug_mode: None,
        })
        .await
    }

    pub async fn cancel(&self, cl_ord_id: String) -> Result<(), EngineError> {
        if cl_ord_id.is_empty() {
            return Err(EngineError::InvalidOrder);
        }
        self.send(ClientMessage::Cancel { cl_ord_id }).await
    }

    pub async fn production_update(&self, product: Product, quantity: u64) -> Result<(), EngineError> {
        if quantity == 0 {
            return Err(EngineError::InvalidQuantity);
        }
        self.send(ClientMessage::ProductionUpdate { product, quantity }).await
    }

    pub async fn accept_offer(
        &self,
        offer_id: String,
        accept: bool,
        quantity_offered: Option<u64>,
        price_offered: Option<f64>,
    ) -> Result<(), EngineError> {
        if offer_id.is_empty() {
            return Err(EngineError::InvalidOrder);
        }
        self.send(ClientMessage::AcceptOffer {
            offer_id,
            accept,
            quantity_offered,
            price_offered,
        })
        .await
    }

    pub async fn resync(&self, last_sync: chrono::DateTime<chrono::Utc>) -> Result<(), EngineError> {
        self.send(ClientMessage::Resync { last_sync }).await
    }

    /// Await `AUTHENTICATED` (bounded by `DEFAULT_LOGIN_TIMEOUT_SECS`, mirroring
    /// `login_future.get(timeout)` in §4.12), take the single write permit, and
    /// enqueue one frame for the transport actor to send.
    async fn send(&self, msg: ClientMessage) -> Result<(), EngineError> {
        tokio::time::timeout(
            std::time::Duration::from_secs(super::sdk::DEFAULT_LOGIN_TIMEOUT_SECS),
            self.state.wait_authenticated(),
        )
        .await
        .map_err(|_| EngineError::AuthFailed)?;
        let _permit = self
            .write_permit
            .acquire()
            .await
            .map_err(|_| EngineError::ServiceUnavailable)?;
        self.outbound.send(msg).await.map_err(|_| EngineError::ServiceUnavailable)
    }
}
