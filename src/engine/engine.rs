//! Market engine (C7): single ingestion queue, one worker, drives C4–C6/C8.
//!
//! The engine owns the per-product books and all in-flight order state; every
//! other component only ever sees snapshots or receives events (§9: ownership
//! graph). Mutation only ever happens inside the worker spawned by `run`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::protocol::{OrderMode, OrderStatus, Product, ServerMessage, Side};
use crate::session::Broadcaster;
use crate::team::TeamStore;

use super::book::OrderBook;
use super::matcher;
use super::offer::{self, OfferTable};
use super::order::{Fill, Order};
use super::settlement;

/// Derived market state for one product, refreshed after every fill and
/// read by the ticker (§3, §4.9). Cheap to clone; callers never hold the
/// engine's book lock while reading this.
#[derive(Debug, Clone, Default)]
pub struct MarketState {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mid: Option<f64>,
    pub last_price: Option<f64>,
    pub volume_24h: f64,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on the ingest channel (§4.7: "bounded buffered channel/queue").
    pub queue_capacity: usize,
    pub offer_markup: f64,
    pub offer_default_price: f64,
    pub offer_ttl_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            offer_markup: offer::DEFAULT_OFFER_MARKUP,
            offer_default_price: offer::DEFAULT_OFFER_PRICE,
            offer_ttl_secs: offer::DEFAULT_OFFER_TTL_SECS,
        }
    }
}

enum EngineOp {
    Submit(Order),
    Cancel { team_name: String, cl_ord_id: String },
    ProductionUpdate { team_name: String, product: Product, quantity: u64 },
    AcceptOffer {
        team_name: String,
        offer_id: String,
        accept: bool,
        quantity_offered: Option<u64>,
        price_offered: Option<f64>,
    },
}

/// A persisted order record: current state, regardless of whether it is
/// still resting. Used for CANCEL validation and DUPLICATE_ORDER_ID checks.
#[derive(Debug, Clone)]
struct OrderRecord {
    side: Side,
    status: OrderStatus,
}

pub struct MarketEngine {
    books: RwLock<HashMap<Product, OrderBook>>,
    market_state: RwLock<HashMap<Product, MarketState>>,
    orders: RwLock<HashMap<(String, String), OrderRecord>>,
    fills: RwLock<Vec<Fill>>,
    offers: OfferTable,
    teams: Arc<TeamStore>,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<crate::metrics::Metrics>,
    config: EngineConfig,
    tx: mpsc::Sender<EngineOp>,
}

impl MarketEngine {
    /// Construct the engine and spawn its single worker. The returned
    /// `Arc<MarketEngine>` is the handle every collaborator (session
    /// manager, ticker, offer reaper) shares.
    pub fn spawn(
        teams: Arc<TeamStore>,
        broadcaster: Arc<Broadcaster>,
        metrics: Arc<crate::metrics::Metrics>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let engine = Arc::new(Self {
            books: RwLock::new(HashMap::new()),
            market_state: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
            fills: RwLock::new(Vec::new()),
            offers: OfferTable::new(),
            teams,
            broadcaster,
            metrics,
            config,
            tx,
        });
        let worker_engine = engine.clone();
        tokio::spawn(async move { worker_engine.run(rx).await });
        engine
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<EngineOp>) {
        info!("market engine worker started");
        while let Some(op) = rx.recv().await {
            match op {
                EngineOp::Submit(order) => self.process_order(order),
                EngineOp::Cancel { team_name, cl_ord_id } => self.process_cancel(&team_name, &cl_ord_id),
                EngineOp::ProductionUpdate { team_name, product, quantity } => {
                    self.process_production_update(&team_name, &product, quantity)
                }
                EngineOp::AcceptOffer {
                    team_name,
                    offer_id,
                    accept,
                    quantity_offered,
                    price_offered,
                } => self.process_accept_offer(&team_name, &offer_id, accept, quantity_offered, price_offered),
            }
        }
        warn!("market engine ingest channel closed, worker exiting");
    }

    pub fn known_products(&self) -> Vec<Product> {
        self.books.read().keys().cloned().collect()
    }

    pub fn market_state(&self, product: &Product) -> MarketState {
        self.market_state.read().get(product).cloned().unwrap_or_default()
    }

    /// Fills involving `team_name` with `executed_at > since`, ascending (§4.10 RESYNC, testable property 9).
    pub fn fills_since(&self, team_name: &str, since: DateTime<Utc>) -> Vec<Fill> {
        let mut out: Vec<Fill> = self
            .fills
            .read()
            .iter()
            .filter(|f| f.involves(team_name) && f.executed_at > since)
            .cloned()
            .collect();
        out.sort_by_key(|f| f.executed_at);
        out
    }

    // -----------------------------------------------------------------
    // Public entry points (called from the session manager)
    // -----------------------------------------------------------------

    /// Validate, record the cl_ord_id as seen, emit the intake ACK, enqueue.
    /// Never blocks beyond queue backpressure (§4.7).
    pub fn submit(&self, order: Order) -> Result<(), EngineError> {
        let key = (order.team_name.clone(), order.cl_ord_id.clone());
        {
            let mut orders = self.orders.write();
            if orders.contains_key(&key) {
                return Err(EngineError::DuplicateOrderId);
            }
            orders.insert(
                key.clone(),
                OrderRecord {
                    side: order.side,
                    status: OrderStatus::Pending,
                },
            );
        }
        if self.tx.try_send(EngineOp::Submit(order.clone())).is_err() {
            self.orders.write().remove(&key);
            return Err(EngineError::ServiceUnavailable);
        }
        self.metrics.record_order_submitted();
        self.broadcaster.send(
            &order.team_name,
            ServerMessage::OrderAck {
                cl_ord_id: order.cl_ord_id,
                status: OrderStatus::Pending,
                server_time: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn cancel(&self, team_name: String, cl_ord_id: String) -> Result<(), EngineError> {
        self.tx
            .try_send(EngineOp::Cancel { team_name, cl_ord_id })
            .map_err(|_| EngineError::ServiceUnavailable)
    }

    pub fn production_update(&self, team_name: String, product: Product, quantity: u64) -> Result<(), EngineError> {
        self.tx
            .try_send(EngineOp::ProductionUpdate { team_name, product, quantity })
            .map_err(|_| EngineError::ServiceUnavailable)
    }

    pub fn accept_offer(
        &self,
        team_name: String,
        offer_id: String,
        accept: bool,
        quantity_offered: Option<u64>,
        price_offered: Option<f64>,
    ) -> Result<(), EngineError> {
        self.tx
            .try_send(EngineOp::AcceptOffer {
                team_name,
                offer_id,
                accept,
                quantity_offered,
                price_offered,
            })
            .map_err(|_| EngineError::ServiceUnavailable)
    }

    // -----------------------------------------------------------------
    // Worker-side handlers (single consumer, §5)
    // -----------------------------------------------------------------

    fn process_cancel(&self, team_name: &str, cl_ord_id: &str) {
        let key = (team_name.to_string(), cl_ord_id.to_string());
        let record = self.orders.read().get(&key).cloned();
        let Some(record) = record else {
            self.broadcaster.send(
                team_name,
                ServerMessage::error(EngineError::UnknownOrder, Some(cl_ord_id.to_string())),
            );
            return;
        };
        if record.status.is_terminal() {
            self.broadcaster.send(
                team_name,
                ServerMessage::error(EngineError::InvalidOrder, Some(cl_ord_id.to_string())),
            );
            return;
        }

        let removed = {
            let mut books = self.books.write();
            books
                .values_mut()
                .find_map(|book| book.remove(record.side, cl_ord_id, team_name))
        };
        match removed {
            Some(mut order) => {
                order.cancel();
                self.orders.write().insert(
                    key,
                    OrderRecord {
                        side: order.side,
                        status: OrderStatus::Cancelled,
                    },
                );
                self.refresh_market_state(&order.product);
                self.broadcaster.send(
                    team_name,
                    ServerMessage::OrderAck {
                        cl_ord_id: cl_ord_id.to_string(),
                        status: OrderStatus::Cancelled,
                        server_time: Utc::now(),
                    },
                );
            }
            None => {
                // Not resting (already terminal via fill, or awaiting an offer resolution).
                self.broadcaster.send(
                    team_name,
                    ServerMessage::error(EngineError::InvalidOrder, Some(cl_ord_id.to_string())),
                );
            }
        }
    }

    /// Run `quantity` production cycles of `product` for `team_name` (§3, §4.10).
    /// A team with a recipe on file for `product` must hold `quantity` batches'
    /// worth of every recipe input; those inputs are consumed and `quantity *
    /// output_qty` is credited. A product with no recipe on file is a raw
    /// resource — `quantity` is credited directly, since there is nothing to
    /// consume it from. `role` (branches/max_depth/decay/base_energy/
    /// level_energy) is carried on `LOGIN_OK` for a client's own yield
    /// planning but this deployment has no grounded formula for folding it
    /// into the server-side yield, so it does not scale `output_qty` here.
    fn process_production_update(&self, team_name: &str, product: &Product, quantity: u64) {
        let result = self.teams.mutate(team_name, |team| {
            if !team.authorized_products.contains(product) {
                return Err(EngineError::UnauthorizedProduction);
            }
            match team.recipes.get(product).cloned() {
                Some(recipe) => {
                    let mut required: Vec<(Product, u64)> = Vec::with_capacity(recipe.inputs.len());
                    for (input, per_batch) in &recipe.inputs {
                        let needed = per_batch.checked_mul(quantity).ok_or(EngineError::InvalidQuantity)?;
                        if team.inventory_of(input) < needed {
                            return Err(EngineError::InsufficientInventory);
                        }
                        required.push((input.clone(), needed));
                    }
                    for (input, needed) in required {
                        if let Some(held) = team.inventory.get_mut(&input) {
                            *held -= needed;
                        }
                    }
                    let produced = recipe.output_qty.checked_mul(quantity).ok_or(EngineError::InvalidQuantity)?;
                    *team.inventory.entry(product.clone()).or_insert(0) += produced;
                }
                None => {
                    *team.inventory.entry(product.clone()).or_insert(0) += quantity;
                }
            }
            Ok(())
        });
        if let Err(e) = result {
            self.broadcaster.send(team_name, ServerMessage::error(e, None));
            return;
        }
        if let Some(team) = self.teams.snapshot(team_name) {
            self.broadcaster.send(
                team_name,
                ServerMessage::InventoryUpdate {
                    inventory: team.inventory.clone(),
                    server_time: Utc::now(),
                },
            );
        }
    }

    fn process_accept_offer(
        &self,
        team_name: &str,
        offer_id: &str,
        accept: bool,
        quantity_offered: Option<u64>,
        price_offered: Option<f64>,
    ) {
        let Some(offer) = self.offers.try_take(offer_id, Utc::now()) else {
            self.broadcaster
                .send(team_name, ServerMessage::error(EngineError::OfferExpired, None));
            return;
        };
        if !accept {
            self.finalize_unfilled_origin(offer.origin_order, "offer declined");
            return;
        }

        let qty = quantity_offered.unwrap_or(offer.quantity_requested).min(offer.quantity_requested);
        let price = price_offered.unwrap_or(offer.max_price);
        if qty == 0 || price <= 0.0 {
            self.broadcaster
                .send(team_name, ServerMessage::error(EngineError::InvalidOrder, None));
            return;
        }

        let synthetic_sell = Order {
            cl_ord_id: format!("offer-{}", Uuid::new_v4()),
            team_name: team_name.to_string(),
            side: Side::Sell,
            mode: OrderMode::Limit,
            product: offer.product.clone(),
            quantity: qty,
            limit_price: Some(price),
            created_at: Utc::now(),
            filled_qty: 0,
            status: OrderStatus::Pending,
            expires_at: None,
            message: None,
            debug_flag: false,
        };

        let mut origin = offer.origin_order;
        let mut sell_order = synthetic_sell;
        let cross_qty = sell_order.remaining().min(origin.remaining());
        match settlement::settle(&self.teams, &mut origin, &mut sell_order, cross_qty, price, Utc::now()) {
            Ok(fill) => {
                self.record_fill(&fill);
                self.emit_fill_events(&fill, &origin, &sell_order);
                self.refresh_market_state(&offer.product);
                if origin.remaining() > 0 {
                    self.finalize_unfilled_origin(origin, "partial offer acceptance, residual cancelled");
                } else {
                    self.mark_order_terminal(&origin.team_name, &origin.cl_ord_id, OrderStatus::Filled);
                }
            }
            Err(e) => {
                self.broadcaster.send(team_name, ServerMessage::error(e, None));
                self.finalize_unfilled_origin(origin, "offer settlement failed");
            }
        }
    }

    // -----------------------------------------------------------------
    // Matching (§4.5) + settlement (§4.6) driven from one incoming order
    // -----------------------------------------------------------------

    fn process_order(&self, mut order: Order) {
        let now = Utc::now();
        self.sweep_expired(&order.product, now);

        let mut skip: Vec<(String, String)> = Vec::new();
        loop {
            if order.remaining() == 0 {
                break;
            }
            let candidate = {
                let books = self.books.read();
                books.get(&order.product).and_then(|book| {
                    book.opposite(order.side)
                        .find(|o| !skip.iter().any(|(t, c)| t == &o.team_name && c == &o.cl_ord_id))
                        .cloned()
                })
            };
            let Some(candidate) = candidate else { break };
            if !matcher::crosses(order.side, order.mode, order.limit_price, &candidate) {
                break;
            }

            let (buyer_team, seller_team) = matcher::counterparty_roles(order.side, &order.team_name, &candidate);
            let price = matcher::trade_price(&candidate);
            let qty = matcher::trade_qty(order.remaining(), &candidate);

            let buyer_ok = self
                .teams
                .snapshot(buyer_team)
                .map(|t| t.current_balance >= price * qty as f64)
                .unwrap_or(false);
            if !buyer_ok {
                if buyer_team == order.team_name {
                    break; // incoming buyer can't afford this price or any worse one ahead of it
                }
                skip.push((candidate.team_name.clone(), candidate.cl_ord_id.clone()));
                continue;
            }

            let seller_ok = self
                .teams
                .snapshot(seller_team)
                .map(|t| t.inventory_of(&order.product) >= qty)
                .unwrap_or(false);
            if !seller_ok {
                if seller_team == order.team_name {
                    break; // incoming seller doesn't hold enough to continue selling
                }
                // resting seller depleted: cancel it and move on (§4.5).
                let mut removed = {
                    let mut books = self.books.write();
                    books
                        .get_mut(&order.product)
                        .and_then(|b| b.remove_opposite(order.side, &candidate.cl_ord_id, &candidate.team_name))
                };
                if let Some(ref mut r) = removed {
                    r.cancel();
                    self.mark_order_terminal(&r.team_name, &r.cl_ord_id, OrderStatus::Cancelled);
                }
                continue;
            }

            let mut resting = {
                let mut books = self.books.write();
                books
                    .get_mut(&order.product)
                    .and_then(|b| b.remove_opposite(order.side, &candidate.cl_ord_id, &candidate.team_name))
            };
            let Some(ref resting_order) = resting else {
                // vanished between peek and remove — impossible under single-consumer, but stay safe.
                skip.push((candidate.team_name.clone(), candidate.cl_ord_id.clone()));
                continue;
            };

            let (mut buy_order, mut sell_order) = match order.side {
                Side::Buy => (order.clone(), resting_order.clone()),
                Side::Sell => (resting_order.clone(), order.clone()),
            };
            let incoming_side = order.side;
            match settlement::settle(&self.teams, &mut buy_order, &mut sell_order, qty, price, Utc::now()) {
                Ok(fill) => {
                    self.record_fill(&fill);
                    self.emit_fill_events(&fill, &buy_order, &sell_order);
                    let product = buy_order.product.clone();
                    let (new_incoming, resting_after) = match incoming_side {
                        Side::Buy => (buy_order, sell_order),
                        Side::Sell => (sell_order, buy_order),
                    };
                    order = new_incoming;
                    if resting_after.remaining() > 0 {
                        self.books.write().entry(product.clone()).or_default().requeue_front(resting_after);
                    } else {
                        self.mark_order_terminal(&resting_after.team_name, &resting_after.cl_ord_id, OrderStatus::Filled);
                    }
                    self.refresh_market_state(&product);
                }
                Err(_) => {
                    // Precondition went stale between check and settle: put the resting
                    // order back untouched and treat this pair as never-qualified (§4.6).
                    self.books.write().entry(order.product.clone()).or_default().requeue_front(resting.take().unwrap());
                    skip.push((candidate.team_name.clone(), candidate.cl_ord_id.clone()));
                }
            }
        }

        self.finalize_incoming(order);
    }

    fn finalize_incoming(&self, order: Order) {
        if order.status.is_terminal() {
            self.mark_order_terminal(&order.team_name, &order.cl_ord_id, order.status);
            return;
        }
        match order.mode {
            OrderMode::Limit => {
                if order.remaining() > 0 {
                    let key = (order.team_name.clone(), order.cl_ord_id.clone());
                    self.orders.write().insert(
                        key,
                        OrderRecord {
                            side: order.side,
                            status: order.status,
                        },
                    );
                    self.books.write().entry(order.product.clone()).or_default().add(order);
                }
            }
            OrderMode::Market => {
                if order.remaining() > 0 {
                    if order.side == Side::Buy {
                        self.try_generate_offer(order);
                    } else {
                        self.mark_order_terminal(&order.team_name, &order.cl_ord_id, OrderStatus::Cancelled);
                    }
                }
            }
        }
    }

    fn try_generate_offer(&self, order: Order) {
        let mid = self.market_state(&order.product).mid;
        let price = offer::offer_price(mid, self.config.offer_markup, self.config.offer_default_price);
        let residual = order.remaining();

        if order.debug_flag {
            // Debug auto-accept: synthesize a house counterparty that bypasses
            // the seller-side balance/inventory check (§4.6).
            let mut origin = order;
            let mut house_sell = Order {
                cl_ord_id: format!("house-{}", Uuid::new_v4()),
                team_name: "ENGINE".into(),
                side: Side::Sell,
                mode: OrderMode::Limit,
                product: origin.product.clone(),
                quantity: residual,
                limit_price: Some(price),
                created_at: Utc::now(),
                filled_qty: 0,
                status: OrderStatus::Pending,
                expires_at: None,
                message: None,
                debug_flag: true,
            };
            if let Ok(fill) = settlement::settle(&self.teams, &mut origin, &mut house_sell, residual, price, Utc::now()) {
                self.record_fill(&fill);
                self.emit_fill_events(&fill, &origin, &house_sell);
                self.refresh_market_state(&origin.product);
            }
            self.mark_order_terminal(&origin.team_name, &origin.cl_ord_id, origin.status);
            return;
        }

        let eligible = self.teams.teams_holding(&order.product, residual, &order.team_name);
        if eligible.is_empty() {
            self.finalize_unfilled_origin(order, "no liquidity");
            return;
        }

        let offer = self.offers.create(
            order.team_name.clone(),
            order.product.clone(),
            residual,
            price,
            self.config.offer_ttl_secs,
            Utc::now(),
            order,
        );
        self.metrics.record_offer_generated();
        for responder in eligible {
            self.broadcaster.send(
                &responder,
                ServerMessage::Offer {
                    offer_id: offer.offer_id.clone(),
                    buyer: offer.buyer.clone(),
                    product: offer.product.clone(),
                    quantity_requested: offer.quantity_requested,
                    max_price: offer.max_price,
                    expires_in: Some(self.config.offer_ttl_secs),
                    timestamp: offer.created_at,
                },
            );
        }
    }

    fn finalize_unfilled_origin(&self, mut order: Order, _reason: &str) {
        order.cancel();
        self.mark_order_terminal(&order.team_name, &order.cl_ord_id, OrderStatus::Cancelled);
        self.broadcaster.send(
            &order.team_name,
            ServerMessage::OrderAck {
                cl_ord_id: order.cl_ord_id,
                status: OrderStatus::Cancelled,
                server_time: Utc::now(),
            },
        );
    }

    fn mark_order_terminal(&self, team_name: &str, cl_ord_id: &str, status: OrderStatus) {
        let key = (team_name.to_string(), cl_ord_id.to_string());
        let side = self.orders.read().get(&key).map(|r| r.side).unwrap_or(Side::Buy);
        self.orders.write().insert(key, OrderRecord { side, status });
    }

    fn sweep_expired(&self, product: &Product, now: DateTime<Utc>) {
        let mut expired = Vec::new();
        {
            let mut books = self.books.write();
            if let Some(book) = books.get_mut(product) {
                expired.extend(book.sweep_expired(Side::Buy, now));
                expired.extend(book.sweep_expired(Side::Sell, now));
            }
        }
        for mut order in expired {
            order.expire();
            self.mark_order_terminal(&order.team_name, &order.cl_ord_id, OrderStatus::Expired);
        }
        for offer in self.offers.sweep_expired(now) {
            self.finalize_unfilled_origin(offer.origin_order, "offer expired");
        }
    }

    fn record_fill(&self, fill: &Fill) {
        self.fills.write().push(fill.clone());
        self.metrics.record_fill_settled();
    }

    fn emit_fill_events(&self, fill: &Fill, buy_order: &Order, sell_order: &Order) {
        self.broadcaster.send_to_observers(ServerMessage::AdminFill {
            fill_id: fill.fill_id.clone(),
            buyer: fill.buyer.clone(),
            seller: fill.seller.clone(),
            buyer_cl_ord_id: fill.buyer_cl_ord_id.clone(),
            seller_cl_ord_id: fill.seller_cl_ord_id.clone(),
            product: fill.product.clone(),
            quantity: fill.quantity,
            price: fill.price,
            server_time: fill.executed_at,
        });
        self.broadcaster.send(
            &fill.buyer,
            ServerMessage::Fill {
                cl_ord_id: fill.buyer_cl_ord_id.clone(),
                fill_qty: fill.quantity,
                fill_price: fill.price,
                side: Side::Buy,
                product: fill.product.clone(),
                counterparty: fill.seller.clone(),
                counterparty_message: fill.seller_message.clone(),
                server_time: fill.executed_at,
                remaining_qty: Some(buy_order.remaining()),
                total_qty: Some(buy_order.quantity),
            },
        );
        self.broadcaster.send(
            &fill.seller,
            ServerMessage::Fill {
                cl_ord_id: fill.seller_cl_ord_id.clone(),
                fill_qty: fill.quantity,
                fill_price: fill.price,
                side: Side::Sell,
                product: fill.product.clone(),
                counterparty: fill.buyer.clone(),
                counterparty_message: buy_order.message.clone(),
                server_time: fill.executed_at,
                remaining_qty: Some(sell_order.remaining()),
                total_qty: Some(sell_order.quantity),
            },
        );
        if let Some(team) = self.teams.snapshot(&fill.buyer) {
            self.broadcaster.send(
                &fill.buyer,
                ServerMessage::BalanceUpdate {
                    balance: team.current_balance,
                    server_time: fill.executed_at,
                },
            );
            self.broadcaster.send(
                &fill.buyer,
                ServerMessage::InventoryUpdate {
                    inventory: team.inventory.clone(),
                    server_time: fill.executed_at,
                },
            );
        }
        if let Some(team) = self.teams.snapshot(&fill.seller) {
            self.broadcaster.send(
                &fill.seller,
                ServerMessage::BalanceUpdate {
                    balance: team.current_balance,
                    server_time: fill.executed_at,
                },
            );
            self.broadcaster.send(
                &fill.seller,
                ServerMessage::InventoryUpdate {
                    inventory: team.inventory.clone(),
                    server_time: fill.executed_at,
                },
            );
        }
    }

    fn refresh_market_state(&self, product: &Product) {
        let (best_bid, best_ask, mid) = {
            let books = self.books.read();
            match books.get(product) {
                Some(book) => (book.best_bid(), book.best_ask(), book.mid()),
                None => (None, None, None),
            }
        };
        let last_price = self
            .fills
            .read()
            .iter()
            .rev()
            .find(|f| &f.product == product)
            .map(|f| f.price);
        let volume_24h = {
            let cutoff = Utc::now() - chrono::Duration::hours(24);
            self.fills
                .read()
                .iter()
                .filter(|f| &f.product == product && f.executed_at > cutoff)
                .map(|f| f.quantity as f64)
                .sum()
        };
        let mut states = self.market_state.write();
        let entry = states.entry(product.clone()).or_default();
        entry.best_bid = best_bid;
        entry.best_ask = best_ask;
        entry.mid = mid;
        if last_price.is_some() {
            entry.last_price = last_price;
        }
        entry.volume_24h = volume_24h;
        self.books.write().entry(product.clone()).or_default();
    }
}
