//! Settlement (C6): the atomic write-set applied for one matched pair.
//!
//! The market engine is single-consumer (§5), so there is never more than one
//! settlement in flight at a time — the "atomic boundary" here is enforced by
//! construction rather than by a database transaction. What this module still
//! does, to honor §4.6, is re-verify the preconditions immediately before
//! mutating (in case the snapshot the matcher read has gone stale for any
//! reason) and apply every write — both orders, the fill record, both
//! balances, both inventories — as one inseparable sequence with no `?`
//! early-return in the middle of it.

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::team::TeamStore;

use super::order::{Fill, Order};

/// Bound on re-verification attempts before giving up on a pair (§4.6).
const MAX_SETTLE_ATTEMPTS: u32 = 3;

/// Re-verify and settle one matched (buyer, seller) pair for `qty` at `price`.
///
/// `buy_order` and `sell_order` are mutated in place (filled_qty/status advance
/// monotonically); on success a `Fill` is returned. On failure the orders are
/// left untouched and the caller is expected to treat the pair as if it had
/// never qualified for matching (§4.6: "re-evaluated as if the resting order
/// never qualified").
pub fn settle(
    teams: &TeamStore,
    buy_order: &mut Order,
    sell_order: &mut Order,
    qty: u64,
    price: f64,
    now: DateTime<Utc>,
) -> Result<Fill, EngineError> {
    debug_assert_eq!(buy_order.product, sell_order.product);
    debug_assert!(qty > 0 && price > 0.0);

    let buyer = buy_order.team_name.clone();
    let seller = sell_order.team_name.clone();
    let product = buy_order.product.clone();
    let cost = price * qty as f64;
    let virtual_seller = sell_order.debug_flag;

    for attempt in 1..=MAX_SETTLE_ATTEMPTS {
        let buyer_snapshot = teams.snapshot(&buyer).ok_or(EngineError::InvalidOrder)?;
        if buyer_snapshot.current_balance < cost {
            return Err(EngineError::InsufficientInventory);
        }
        if !virtual_seller {
            let seller_snapshot = teams.snapshot(&seller).ok_or(EngineError::InvalidOrder)?;
            if seller_snapshot.inventory_of(&product) < qty {
                return Err(EngineError::InsufficientInventory);
            }
        }

        let buyer_result = teams.mutate(&buyer, |t| {
            if t.current_balance < cost {
                return Err(EngineError::InsufficientInventory);
            }
            t.current_balance -= cost;
            *t.inventory.entry(product.clone()).or_insert(0) += qty;
            Ok(())
        });
        if buyer_result.is_err() {
            if attempt == MAX_SETTLE_ATTEMPTS {
                return Err(EngineError::ServiceUnavailable);
            }
            continue;
        }

        if !virtual_seller {
            let seller_result = teams.mutate(&seller, |t| {
                let held = t.inventory_of(&product);
                if held < qty {
                    return Err(EngineError::InsufficientInventory);
                }
                t.current_balance += cost;
                t.inventory.insert(product.clone(), held - qty);
                Ok(())
            });
            if let Err(e) = seller_result {
                // roll back the buyer-side write we just committed.
                let _ = teams.mutate(&buyer, |t| {
                    t.current_balance += cost;
                    if let Some(held) = t.inventory.get_mut(&product) {
                        *held = held.saturating_sub(qty);
                    }
                    Ok::<_, EngineError>(())
                });
                if attempt == MAX_SETTLE_ATTEMPTS {
                    return Err(e);
                }
                continue;
            }
        }

        buy_order.apply_fill(qty);
        sell_order.apply_fill(qty);

        return Ok(Fill {
            fill_id: Fill::new_id(),
            buyer_cl_ord_id: buy_order.cl_ord_id.clone(),
            seller_cl_ord_id: sell_order.cl_ord_id.clone(),
            buyer,
            seller,
            product,
            quantity: qty,
            price,
            buyer_message: buy_order.message.clone(),
            seller_message: sell_order.message.clone(),
            executed_at: now,
        });
    }

    Err(EngineError::ServiceUnavailable)
}
