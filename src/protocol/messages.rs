//! Wire codec (C1): framed JSON messages tagged by `type`, symmetric client/server.
//!
//! Each message is a plain struct; the two directions are modeled as closed
//! sum types (`ClientMessage`, `ServerMessage`) dispatched exhaustively by the
//! session manager (server side) and the router (client side). Unknown
//! top-level fields are ignored by serde's default behavior; an unknown `type`
//! fails to deserialize into either enum and is handled by the caller as
//! INVALID_MESSAGE / a logged drop (see `protocol::decode_client_message`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::product::Product;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderMode {
    #[serde(rename = "MARKET")]
    Market,
    #[serde(rename = "LIMIT")]
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PARTIALLY_FILLED")]
    PartiallyFilled,
    #[serde(rename = "FILLED")]
    Filled,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipeType {
    #[serde(rename = "BASIC")]
    Basic,
    #[serde(rename = "PREMIUM")]
    Premium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub recipe_type: RecipeType,
    pub inputs: HashMap<Product, u64>,
    pub output_qty: u64,
}

/// Production parameters for a team's role, per §3 (branches, max_depth, decay, base_energy, level_energy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub branches: u32,
    pub max_depth: u32,
    pub decay: f64,
    pub base_energy: f64,
    pub level_energy: f64,
}

// ---------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "LOGIN")]
    Login {
        token: String,
        #[serde(default)]
        tz: Option<String>,
    },
    #[serde(rename = "ORDER")]
    Order {
        cl_ord_id: String,
        side: Side,
        mode: OrderMode,
        product: Product,
        qty: u64,
        #[serde(default)]
        limit_price: Option<f64>,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        debug_mode: Option<bool>,
    },
    #[serde(rename = "CANCEL")]
    Cancel { cl_ord_id: String },
    #[serde(rename = "PRODUCTION_UPDATE")]
    ProductionUpdate { product: Product, quantity: u64 },
    #[serde(rename = "ACCEPT_OFFER")]
    AcceptOffer {
        offer_id: String,
        accept: bool,
        #[serde(default)]
        quantity_offered: Option<u64>,
        #[serde(default)]
        price_offered: Option<f64>,
    },
    #[serde(rename = "RESYNC")]
    Resync { last_sync: DateTime<Utc> },
    #[serde(rename = "PING")]
    Ping {},
}

// ---------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "LOGIN_OK")]
    LoginOk {
        team: String,
        species: String,
        initial_balance: f64,
        current_balance: f64,
        inventory: HashMap<Product, u64>,
        authorized_products: HashSet<Product>,
        recipes: HashMap<Product, Recipe>,
        role: Role,
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "ORDER_ACK")]
    OrderAck {
        cl_ord_id: String,
        status: OrderStatus,
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "FILL")]
    Fill {
        cl_ord_id: String,
        fill_qty: u64,
        fill_price: f64,
        side: Side,
        product: Product,
        counterparty: String,
        #[serde(default)]
        counterparty_message: Option<String>,
        server_time: DateTime<Utc>,
        #[serde(default)]
        remaining_qty: Option<u64>,
        #[serde(default)]
        total_qty: Option<u64>,
    },
    #[serde(rename = "TICKER")]
    Ticker {
        product: Product,
        #[serde(default)]
        best_bid: Option<f64>,
        #[serde(default)]
        best_ask: Option<f64>,
        #[serde(default)]
        mid: Option<f64>,
        volume_24h: f64,
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "OFFER")]
    Offer {
        offer_id: String,
        buyer: String,
        product: Product,
        quantity_requested: u64,
        max_price: f64,
        #[serde(default)]
        expires_in: Option<i64>,
        timestamp: DateTime<Utc>,
    },
    /// Aggregate, admin-observer-only view of one fill: both counterparties
    /// and the full trade, as opposed to the single-sided `FILL` each
    /// counterparty receives (§4.7, §8 testable property 7).
    #[serde(rename = "ADMIN_FILL")]
    AdminFill {
        fill_id: String,
        buyer: String,
        seller: String,
        buyer_cl_ord_id: String,
        seller_cl_ord_id: String,
        product: Product,
        quantity: u64,
        price: f64,
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "INVENTORY_UPDATE")]
    InventoryUpdate {
        inventory: HashMap<Product, u64>,
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "BALANCE_UPDATE")]
    BalanceUpdate {
        balance: f64,
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "EVENT_DELTA")]
    EventDelta {
        events: Vec<ServerMessage>,
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "ERROR")]
    Error {
        code: String,
        reason: String,
        #[serde(default)]
        cl_ord_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "BROADCAST_NOTIFICATION")]
    BroadcastNotification {
        message: String,
        sender: String,
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "PONG")]
    Pong {},
}

impl ServerMessage {
    pub fn error(err: crate::error::EngineError, cl_ord_id: Option<String>) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            reason: err.reason().to_string(),
            cl_ord_id,
            timestamp: Utc::now(),
        }
    }
}
