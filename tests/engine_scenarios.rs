//! End-to-end scenarios against the market engine, bypassing the WebSocket
//! transport (the session manager is exercised separately in
//! `client_sdk.rs`). Each test drives `MarketEngine` directly and observes
//! the `ServerMessage`s it broadcasts through per-team inboxes.

mod support;

use chrono::Utc;
use stellar_exchange::engine::Order;
use stellar_exchange::protocol::{OrderMode, OrderStatus, Product, ServerMessage, Side};
use support::{team, Harness};

fn order(cl_ord_id: &str, team_name: &str, side: Side, mode: OrderMode, product: &str, qty: u64, limit_price: Option<f64>) -> Order {
    Order {
        cl_ord_id: cl_ord_id.into(),
        team_name: team_name.into(),
        side,
        mode,
        product: Product::new(product),
        quantity: qty,
        limit_price,
        created_at: Utc::now(),
        filled_qty: 0,
        status: OrderStatus::Pending,
        expires_at: None,
        message: None,
        debug_flag: false,
    }
}

/// S1: a resting SELL and a crossing BUY settle at the resting price, fully
/// filled both sides, each side sees exactly its own counterparty.
#[tokio::test]
async fn s1_simple_cross() {
    let mut h = Harness::new(vec![team("A", 1000.0, &[], &[]), team("B", 0.0, &[("FOSFO", 10)], &[])]);

    h.engine.submit(order("B1", "B", Side::Sell, OrderMode::Limit, "FOSFO", 5, Some(18.0))).unwrap();
    assert!(matches!(h.recv("B").await, ServerMessage::OrderAck { status: OrderStatus::Pending, .. }));

    h.engine.submit(order("A1", "A", Side::Buy, OrderMode::Limit, "FOSFO", 5, Some(20.0))).unwrap();
    assert!(matches!(h.recv("A").await, ServerMessage::OrderAck { status: OrderStatus::Pending, .. }));

    let fill_a = h.recv("A").await;
    match fill_a {
        ServerMessage::Fill { cl_ord_id, fill_qty, fill_price, side, counterparty, .. } => {
            assert_eq!(cl_ord_id, "A1");
            assert_eq!(fill_qty, 5);
            assert_eq!(fill_price, 18.0); // resting order's price, not the aggressor's
            assert!(matches!(side, Side::Buy));
            assert_eq!(counterparty, "B");
        }
        other => panic!("expected FILL, got {other:?}"),
    }

    let fill_b = h.recv("B").await;
    match fill_b {
        ServerMessage::Fill { cl_ord_id, counterparty, .. } => {
            assert_eq!(cl_ord_id, "B1");
            assert_eq!(counterparty, "A");
        }
        other => panic!("expected FILL, got {other:?}"),
    }

    assert!(matches!(h.recv("A").await, ServerMessage::BalanceUpdate { balance, .. } if balance == 1000.0 - 90.0));
    assert!(matches!(h.recv("A").await, ServerMessage::InventoryUpdate { .. }));
    assert!(matches!(h.recv("B").await, ServerMessage::BalanceUpdate { balance, .. } if balance == 90.0));
    assert!(matches!(h.recv("B").await, ServerMessage::InventoryUpdate { .. }));

    let a = h.teams.snapshot("A").unwrap();
    assert_eq!(a.current_balance, 910.0);
    assert_eq!(a.inventory_of(&Product::new("FOSFO")), 5);
    let b = h.teams.snapshot("B").unwrap();
    assert_eq!(b.current_balance, 90.0);
    assert_eq!(b.inventory_of(&Product::new("FOSFO")), 5);
}

/// S2: a larger resting BUY only partially fills against a smaller SELL; the
/// residual keeps resting at its own limit price rather than the trade price.
#[tokio::test]
async fn s2_partial_fill_leaves_residual_resting() {
    let mut h = Harness::new(vec![team("A", 10_000.0, &[], &[]), team("B", 0.0, &[("GUACA", 4)], &[])]);

    h.engine.submit(order("A2", "A", Side::Buy, OrderMode::Limit, "GUACA", 10, Some(50.0))).unwrap();
    h.recv("A").await; // ORDER_ACK

    h.engine.submit(order("B2", "B", Side::Sell, OrderMode::Limit, "GUACA", 4, Some(45.0))).unwrap();
    h.recv("B").await; // ORDER_ACK

    let fill_a = h.recv("A").await;
    match fill_a {
        ServerMessage::Fill { fill_qty, fill_price, remaining_qty, .. } => {
            assert_eq!(fill_qty, 4);
            // Trade price is the resting (maker) order's limit, A2's 50 — not
            // the incoming aggressor B2's 45 (§4.5: "trade price = A"/"= B").
            assert_eq!(fill_price, 50.0);
            assert_eq!(remaining_qty, Some(6));
        }
        other => panic!("expected FILL, got {other:?}"),
    }
    assert!(matches!(h.recv("B").await, ServerMessage::Fill { fill_qty: 4, .. }));
    h.recv("A").await; // BALANCE_UPDATE
    h.recv("A").await; // INVENTORY_UPDATE
    h.recv("B").await; // BALANCE_UPDATE
    h.recv("B").await; // INVENTORY_UPDATE

    let state = h.engine.market_state(&Product::new("GUACA"));
    assert_eq!(state.best_bid, Some(50.0));
    assert_eq!(state.best_ask, None);
}

/// S3: a MARKET BUY with nobody resting, and no team holding enough inventory
/// to receive a secondary offer, cancels outright with no OFFER sent.
#[tokio::test]
async fn s3_market_with_no_liquidity_cancels() {
    let mut h = Harness::new(vec![team("A", 1000.0, &[], &[])]);

    h.engine.submit(order("A3", "A", Side::Buy, OrderMode::Market, "PITA", 10, None)).unwrap();
    h.recv("A").await; // ORDER_ACK Pending

    let ack = h.recv("A").await;
    match ack {
        ServerMessage::OrderAck { status, .. } => assert!(matches!(status, OrderStatus::Cancelled)),
        other => panic!("expected cancellation ORDER_ACK, got {other:?}"),
    }
    assert!(h.try_recv("A").is_none());
}

/// S4: same setup as S3, but Team C holds enough PITA to be offered the
/// residual; accepting settles a synthetic cross at the offered price.
#[tokio::test]
async fn s4_offer_accepted_settles() {
    let mut h = Harness::new(vec![team("A", 1000.0, &[], &[]), team("C", 0.0, &[("PITA", 12)], &[])]);

    h.engine.submit(order("A3", "A", Side::Buy, OrderMode::Market, "PITA", 10, None)).unwrap();
    h.recv("A").await; // ORDER_ACK Pending

    let offer_msg = h.recv("C").await;
    let offer_id = match offer_msg {
        ServerMessage::Offer { offer_id, buyer, product, quantity_requested, .. } => {
            assert_eq!(buyer, "A");
            assert_eq!(product, Product::new("PITA"));
            assert_eq!(quantity_requested, 10);
            offer_id
        }
        other => panic!("expected OFFER, got {other:?}"),
    };

    h.engine.accept_offer("C".into(), offer_id, true, Some(10), Some(22.0)).unwrap();

    let fill_a = h.recv("A").await;
    match fill_a {
        ServerMessage::Fill { fill_qty, fill_price, counterparty, .. } => {
            assert_eq!(fill_qty, 10);
            assert_eq!(fill_price, 22.0);
            assert_eq!(counterparty, "C");
        }
        other => panic!("expected FILL, got {other:?}"),
    }
    assert!(matches!(h.recv("C").await, ServerMessage::Fill { fill_qty: 10, .. }));
    h.recv("A").await; // BALANCE_UPDATE
    h.recv("A").await; // INVENTORY_UPDATE
    h.recv("C").await; // BALANCE_UPDATE
    h.recv("C").await; // INVENTORY_UPDATE

    assert!(matches!(h.recv("A").await, ServerMessage::OrderAck { status: OrderStatus::Filled, .. }));

    let a = h.teams.snapshot("A").unwrap();
    assert_eq!(a.inventory_of(&Product::new("PITA")), 10);
    assert_eq!(a.current_balance, 1000.0 - 220.0);
    let c = h.teams.snapshot("C").unwrap();
    assert_eq!(c.inventory_of(&Product::new("PITA")), 2);
    assert_eq!(c.current_balance, 220.0);
}

/// Testable property 8: an OFFER is never sent to the buyer itself, and never
/// to a team that doesn't hold enough of the product.
#[tokio::test]
async fn offer_eligibility_excludes_buyer_and_underfunded() {
    let mut h = Harness::new(vec![
        team("A", 1000.0, &[("PITA", 50)], &[]), // holds enough, but is the buyer
        team("D", 0.0, &[("PITA", 2)], &[]),     // not enough
        team("C", 0.0, &[("PITA", 12)], &[]),    // eligible
    ]);

    h.engine.submit(order("A3", "A", Side::Buy, OrderMode::Market, "PITA", 10, None)).unwrap();
    h.recv("A").await; // ORDER_ACK

    assert!(matches!(h.recv("C").await, ServerMessage::Offer { .. }));
    assert!(h.try_recv("D").is_none());
}

/// Testable property 1/2: conservation and non-negativity hold across a
/// chain of crosses on the same book.
#[tokio::test]
async fn conservation_holds_across_multiple_crosses() {
    let mut h = Harness::new(vec![
        team("A", 10_000.0, &[], &[]),
        team("B", 0.0, &[("FOSFO", 20)], &[]),
    ]);
    let total_cash = 10_000.0;
    let total_fosfo = 20u64;

    h.engine.submit(order("B1", "B", Side::Sell, OrderMode::Limit, "FOSFO", 20, Some(10.0))).unwrap();
    h.recv("B").await;

    h.engine.submit(order("A1", "A", Side::Buy, OrderMode::Limit, "FOSFO", 7, Some(10.0))).unwrap();
    h.recv("A").await;
    h.recv("A").await; // FILL
    h.recv("B").await; // FILL
    h.recv("A").await; // BALANCE_UPDATE
    h.recv("A").await; // INVENTORY_UPDATE
    h.recv("B").await; // BALANCE_UPDATE
    h.recv("B").await; // INVENTORY_UPDATE

    h.engine.submit(order("A2", "A", Side::Buy, OrderMode::Limit, "FOSFO", 13, Some(10.0))).unwrap();
    h.recv("A").await;
    h.recv("A").await; // FILL
    h.recv("B").await; // FILL
    h.recv("A").await; // BALANCE_UPDATE
    h.recv("A").await; // INVENTORY_UPDATE
    h.recv("B").await; // BALANCE_UPDATE
    h.recv("B").await; // INVENTORY_UPDATE

    let a = h.teams.snapshot("A").unwrap();
    let b = h.teams.snapshot("B").unwrap();
    assert_eq!(a.current_balance + b.current_balance, total_cash);
    assert_eq!(a.inventory_of(&Product::new("FOSFO")) + b.inventory_of(&Product::new("FOSFO")), total_fosfo);
    assert!(a.current_balance >= 0.0 && b.current_balance >= 0.0);
}

/// Testable property 5: crossing soundness — a BUY below the resting ask and
/// a SELL above the resting bid never trade. Proven by then sending a third
/// order that *does* cross each resting order at exactly its own limit,
/// which could only happen if both orders were still resting untouched.
#[tokio::test]
async fn crossing_soundness_non_crossing_orders_both_rest() {
    let mut h = Harness::new(vec![
        team("A", 1000.0, &[], &[]),
        team("B", 0.0, &[("FOSFO", 10)], &[]),
        team("C", 1000.0, &[("FOSFO", 10)], &[]),
    ]);

    h.engine.submit(order("B1", "B", Side::Sell, OrderMode::Limit, "FOSFO", 5, Some(25.0))).unwrap();
    h.recv("B").await;

    h.engine.submit(order("A1", "A", Side::Buy, OrderMode::Limit, "FOSFO", 5, Some(20.0))).unwrap();
    let ack = h.recv("A").await;
    assert!(matches!(ack, ServerMessage::OrderAck { status: OrderStatus::Pending, .. }));

    assert!(h.try_recv("A").is_none());
    assert!(h.try_recv("B").is_none());

    h.engine.submit(order("C1", "C", Side::Sell, OrderMode::Limit, "FOSFO", 5, Some(20.0))).unwrap();
    h.recv("C").await; // ORDER_ACK
    assert!(matches!(h.recv("A").await, ServerMessage::Fill { fill_price: 20.0, .. }));
}

/// S5 (engine-side half): the engine itself rejects a second submission
/// reusing an already-seen `(team, cl_ord_id)` pair, and the original order
/// is left resting untouched (proven the same way, by crossing it for real).
#[tokio::test]
async fn duplicate_cl_ord_id_is_rejected_and_book_unchanged() {
    let mut h = Harness::new(vec![team("A", 1000.0, &[], &[]), team("C", 0.0, &[("FOSFO", 10)], &[])]);

    h.engine.submit(order("X", "A", Side::Buy, OrderMode::Limit, "FOSFO", 5, Some(20.0))).unwrap();
    h.recv("A").await; // ORDER_ACK

    let err = h
        .engine
        .submit(order("X", "A", Side::Buy, OrderMode::Limit, "FOSFO", 9, Some(30.0)))
        .unwrap_err();
    assert_eq!(err, stellar_exchange::error::EngineError::DuplicateOrderId);
    assert!(h.try_recv("A").is_none());

    h.engine.submit(order("C1", "C", Side::Sell, OrderMode::Limit, "FOSFO", 5, Some(20.0))).unwrap();
    h.recv("C").await; // ORDER_ACK
    assert!(matches!(h.recv("A").await, ServerMessage::Fill { fill_qty: 5, fill_price: 20.0, .. }));
}

/// S6 (engine-side half): `fills_since` returns exactly the fills after the
/// watermark, ascending by `executed_at`.
#[tokio::test]
async fn resync_returns_fills_after_watermark_ascending() {
    let mut h = Harness::new(vec![
        team("A", 10_000.0, &[], &[]),
        team("B", 0.0, &[("FOSFO", 20)], &[]),
    ]);

    h.engine.submit(order("B1", "B", Side::Sell, OrderMode::Limit, "FOSFO", 20, Some(10.0))).unwrap();
    h.recv("B").await;

    let t0 = Utc::now();

    h.engine.submit(order("A1", "A", Side::Buy, OrderMode::Limit, "FOSFO", 3, Some(10.0))).unwrap();
    h.recv("A").await;
    h.recv("A").await;
    h.recv("B").await;
    h.recv("A").await;
    h.recv("A").await;
    h.recv("B").await;
    h.recv("B").await;

    h.engine.submit(order("A2", "A", Side::Buy, OrderMode::Limit, "FOSFO", 5, Some(10.0))).unwrap();
    h.recv("A").await;
    h.recv("A").await;
    h.recv("B").await;
    h.recv("A").await;
    h.recv("A").await;
    h.recv("B").await;
    h.recv("B").await;

    let since = h.engine.fills_since("A", t0);
    assert_eq!(since.len(), 2);
    assert_eq!(since[0].buyer_cl_ord_id, "A1");
    assert_eq!(since[1].buyer_cl_ord_id, "A2");
    assert!(since[0].executed_at <= since[1].executed_at);
    assert!(since.iter().all(|f| f.involves("A")));
}

fn recipe(inputs: &[(&str, u64)], output_qty: u64) -> stellar_exchange::protocol::Recipe {
    stellar_exchange::protocol::Recipe {
        recipe_type: stellar_exchange::protocol::RecipeType::Basic,
        inputs: inputs.iter().map(|(p, q)| (Product::new(*p), *q)).collect(),
        output_qty,
    }
}

/// PRODUCTION_UPDATE against a product with a recipe on file consumes the
/// recipe's inputs (scaled by the requested batch count) and credits
/// `quantity * output_qty`, rather than crediting the raw requested quantity.
#[tokio::test]
async fn production_update_consumes_recipe_inputs_and_credits_output() {
    let mut h = Harness::new(vec![team("A", 0.0, &[("RAW", 10)], &["GTRON"])]);
    h.teams
        .mutate("A", |t| {
            t.recipes.insert(Product::new("GTRON"), recipe(&[("RAW", 2)], 1));
            Ok::<_, ()>(())
        })
        .unwrap();

    h.engine.production_update("A".into(), Product::new("GTRON"), 3).unwrap();

    match h.recv("A").await {
        ServerMessage::InventoryUpdate { inventory, .. } => {
            assert_eq!(inventory.get(&Product::new("RAW")).copied().unwrap_or(0), 4);
            assert_eq!(inventory.get(&Product::new("GTRON")).copied().unwrap_or(0), 3);
        }
        other => panic!("expected INVENTORY_UPDATE, got {other:?}"),
    }
}

/// A recipe whose inputs aren't fully held is rejected with
/// `INSUFFICIENT_INVENTORY` and neither the inputs nor the output change.
#[tokio::test]
async fn production_update_rejects_when_recipe_inputs_insufficient() {
    let mut h = Harness::new(vec![team("A", 0.0, &[("RAW", 1)], &["GTRON"])]);
    h.teams
        .mutate("A", |t| {
            t.recipes.insert(Product::new("GTRON"), recipe(&[("RAW", 2)], 1));
            Ok::<_, ()>(())
        })
        .unwrap();

    h.engine.production_update("A".into(), Product::new("GTRON"), 3).unwrap();

    match h.recv("A").await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "INSUFFICIENT_INVENTORY"),
        other => panic!("expected ERROR, got {other:?}"),
    }
    let a = h.teams.snapshot("A").unwrap();
    assert_eq!(a.inventory_of(&Product::new("RAW")), 1);
    assert_eq!(a.inventory_of(&Product::new("GTRON")), 0);
}

/// A product with no recipe on file is a raw resource: the requested
/// quantity is credited directly, same as before recipes existed.
#[tokio::test]
async fn production_update_without_recipe_credits_raw_quantity() {
    let mut h = Harness::new(vec![team("A", 0.0, &[], &["FOSFO"])]);
    h.engine.production_update("A".into(), Product::new("FOSFO"), 7).unwrap();
    match h.recv("A").await {
        ServerMessage::InventoryUpdate { inventory, .. } => {
            assert_eq!(inventory.get(&Product::new("FOSFO")).copied().unwrap_or(0), 7);
        }
        other => panic!("expected INVENTORY_UPDATE, got {other:?}"),
    }
}
