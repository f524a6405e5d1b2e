//! End-to-end reservation scenarios over the in-memory store: the full
//! shopper path (availability -> hold -> confirm -> refund) with an
//! injected clock, no external services.

use std::sync::Arc;

use chrono::{Duration, Utc};

use seat_inventory::models::{BookingStatus, Seat};
use seat_inventory::services::lifecycle::{
    OrderCancelled, PurchaseCompleted, RefundIssued, SeatRefund,
};
use seat_inventory::services::{
    AvailabilityResolver, ExpirySweeper, HoldManager, LifecycleHandler, PricingResolver,
};
use seat_inventory::store::{MemorySeatStore, SeatStore};

const EVENT: i64 = 100;
const TTL_SECONDS: i64 = 600;

struct Harness {
    store: Arc<MemorySeatStore>,
    holds: HoldManager,
    availability: AvailabilityResolver,
    lifecycle: LifecycleHandler,
}

/// Row C4 with seats 12 and 13 (ids 12 and 13), standard tier at 25.00.
async fn harness() -> Harness {
    let store = Arc::new(MemorySeatStore::new());
    for number in [12, 13] {
        store
            .add_seat(Seat {
                id: number as i64,
                event_id: EVENT,
                section: "C".to_string(),
                row: 4,
                number,
                is_active: true,
            })
            .await;
        store.assign_tier(number as i64, 7, "standard").await;
    }
    store.set_event_pricing(EVENT, 7).await;
    store.set_price_point(EVENT, "standard", 25.0).await;

    let holds = HoldManager::new(store.clone(), TTL_SECONDS);
    let availability = AvailabilityResolver::new(store.clone());
    let pricing = PricingResolver::new(store.clone());
    let lifecycle = LifecycleHandler::new(store.clone(), pricing);

    Harness {
        store,
        holds,
        availability,
        lifecycle,
    }
}

#[tokio::test]
async fn hold_is_visible_to_others_until_ttl_elapses() {
    let h = harness().await;
    let t0 = Utc::now();

    let report = h.holds.claim_at("session-a", EVENT, &[12], t0).await.unwrap();
    assert_eq!(report.accepted, vec![12]);

    // session B sees C4-12 as unavailable while the hold is live
    let unavailable = h
        .availability
        .unavailable_seats_at(EVENT, Some("session-b"), t0 + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(unavailable, vec![12]);

    // at t+601s the unrenewed hold is gone for any reader
    let unavailable = h
        .availability
        .unavailable_seats_at(EVENT, Some("session-b"), t0 + Duration::seconds(601))
        .await
        .unwrap();
    assert!(unavailable.is_empty());
}

#[tokio::test]
async fn competing_claim_in_same_window_is_rejected() {
    let h = harness().await;
    let t0 = Utc::now();

    let a = h.holds.claim_at("session-a", EVENT, &[12], t0).await.unwrap();
    assert_eq!(a.accepted, vec![12]);

    let b = h
        .holds
        .claim_at("session-b", EVENT, &[12], t0 + Duration::seconds(5))
        .await
        .unwrap();
    assert!(b.accepted.is_empty());
    assert_eq!(b.rejected, vec![12]);
}

#[tokio::test]
async fn selective_refund_frees_only_the_named_seat() {
    let h = harness().await;
    let t0 = Utc::now();

    h.holds
        .claim_at("session-a", EVENT, &[12, 13], t0)
        .await
        .unwrap();
    h.lifecycle
        .confirm_at(
            &PurchaseCompleted {
                order_line_id: "line-L".to_string(),
                event_id: EVENT,
                seat_ids: vec![12, 13],
            },
            t0,
        )
        .await
        .unwrap();

    // both seats are sold: unavailable even to their own buyer's later reads
    let unavailable = h
        .availability
        .unavailable_seats_at(EVENT, Some("session-b"), t0)
        .await
        .unwrap();
    assert_eq!(unavailable, vec![12, 13]);

    // the refund names only C4-12, amount 25.00 covers its price
    let report = h
        .lifecycle
        .refund_at(
            &RefundIssued {
                order_line_id: "line-L".to_string(),
                event_id: EVENT,
                refund_id: None,
                seats: vec![SeatRefund {
                    seat_id: 12,
                    amount: 25.0,
                    reason: Some("customer request".to_string()),
                }],
            },
            t0 + Duration::seconds(60),
        )
        .await
        .unwrap();
    assert_eq!(report.released, vec![12]);

    // sibling seat stays confirmed; availability now excludes only C4-13
    let sibling = h.store.booking(EVENT, 13).await.unwrap().unwrap();
    assert_eq!(sibling.status, BookingStatus::Confirmed);

    let unavailable = h
        .availability
        .unavailable_seats_at(EVENT, Some("session-b"), t0 + Duration::seconds(61))
        .await
        .unwrap();
    assert_eq!(unavailable, vec![13]);
}

#[tokio::test]
async fn confirmed_seat_stays_taken_until_refund_frees_it() {
    let h = harness().await;
    let t0 = Utc::now();

    h.holds.claim_at("session-a", EVENT, &[12], t0).await.unwrap();
    h.lifecycle
        .confirm_at(
            &PurchaseCompleted {
                order_line_id: "line-L".to_string(),
                event_id: EVENT,
                seat_ids: vec![12],
            },
            t0,
        )
        .await
        .unwrap();

    // no TTL applies to a sale: a month later the seat is still taken
    let much_later = t0 + Duration::days(30);
    let report = h
        .holds
        .claim_at("session-b", EVENT, &[12], much_later)
        .await
        .unwrap();
    assert_eq!(report.rejected, vec![12]);

    h.lifecycle
        .cancel_at(
            &OrderCancelled {
                order_line_id: "line-L".to_string(),
                event_id: EVENT,
                refund_id: None,
                amount: 25.0,
                reason: None,
            },
            much_later,
        )
        .await
        .unwrap();

    let report = h
        .holds
        .claim_at("session-b", EVENT, &[12], much_later)
        .await
        .unwrap();
    assert_eq!(report.accepted, vec![12]);
}

#[tokio::test]
async fn released_and_swept_holds_free_the_seat_for_everyone() {
    let h = harness().await;
    let t0 = Utc::now();

    h.holds
        .claim_at("session-a", EVENT, &[12, 13], t0)
        .await
        .unwrap();
    // explicit release of one seat
    assert_eq!(h.holds.release("session-a", EVENT, &[12]).await.unwrap(), 1);

    let sweeper = ExpirySweeper::new(h.store.clone(), None);
    // the other hold dies by sweep after its TTL
    let released = sweeper.sweep(t0 + Duration::seconds(TTL_SECONDS + 1)).await.unwrap();
    assert_eq!(released, 1);

    let unavailable = h
        .availability
        .unavailable_seats_at(EVENT, Some("session-b"), t0 + Duration::seconds(TTL_SECONDS + 2))
        .await
        .unwrap();
    assert!(unavailable.is_empty());
}

#[tokio::test]
async fn block_overrides_everything_and_unblock_restores_nothing() {
    let h = harness().await;
    let t0 = Utc::now();

    h.holds.claim_at("session-a", EVENT, &[12], t0).await.unwrap();
    assert!(h.store.block_seat(EVENT, 13, "broken seat").await.unwrap());

    // blocked seat rejects claims from anyone
    let report = h.holds.claim_at("session-b", EVENT, &[13], t0).await.unwrap();
    assert_eq!(report.rejected, vec![13]);

    // unavailable to the blocking admin's view and every session alike
    let unavailable = h
        .availability
        .unavailable_seats_at(EVENT, Some("session-a"), t0)
        .await
        .unwrap();
    assert_eq!(unavailable, vec![13]);

    assert!(h.store.unblock_seat(EVENT, 13).await.unwrap());
    // unblocking never resurrects a prior booking status
    assert!(h.store.booking(EVENT, 13).await.unwrap().is_none());
    let report = h.holds.claim_at("session-b", EVENT, &[13], t0).await.unwrap();
    assert_eq!(report.accepted, vec![13]);
}
