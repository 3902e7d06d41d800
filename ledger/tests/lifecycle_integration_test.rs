//! Order lifecycle tests: end-to-end reservation, release, and manual
//! stock operations over a shared store.

#![allow(clippy::unwrap_used, clippy::panic)]

use stock_ledger::bridge::BridgeOutcome;
use stock_ledger::validator::ReservationFailure;
use stock_ledger_core::audit::AuditType;
use stock_ledger_core::error::LedgerError;
use stock_ledger_core::ids::OrderId;
use stock_ledger_core::query::{AuditFilter, PageRequest};
use stock_ledger_core::subject::SubjectRef;
use stock_ledger_testing::{LedgerFixture, init_test_tracing};

#[tokio::test]
async fn mixed_cart_reserves_tracked_items_only() {
    init_test_tracing();
    let fixture = LedgerFixture::new();
    let untracked = fixture.untracked_product().await.unwrap();
    let (product_id, variant_id, subject) = fixture.variant_level_product(10).await.unwrap();

    let outcome = fixture
        .bridge()
        .order_placed(
            OrderId::new(),
            &[
                LedgerFixture::line_item(untracked, None, 7),
                LedgerFixture::line_item(product_id, Some(variant_id), 2),
            ],
        )
        .await
        .unwrap();

    let BridgeOutcome::Applied(records) = outcome else {
        panic!("first placement must apply");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(fixture.quantity(subject).await, 8);
}

#[tokio::test]
async fn short_cart_leaves_every_subject_untouched() {
    let fixture = LedgerFixture::new();
    let (product_a, variant_a, subject_a) = fixture.variant_level_product(10).await.unwrap();
    let (product_b, variant_b, subject_b) = fixture.variant_level_product(1).await.unwrap();

    let err = fixture
        .bridge()
        .order_placed(
            OrderId::new(),
            &[
                LedgerFixture::line_item(product_a, Some(variant_a), 3),
                LedgerFixture::line_item(product_b, Some(variant_b), 2),
            ],
        )
        .await
        .unwrap_err();

    let ReservationFailure::Insufficient(issues) = err else {
        panic!("expected insufficient stock");
    };
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].available_quantity, 1);
    assert_eq!(issues[0].requested_quantity, 2);

    assert_eq!(fixture.quantity(subject_a).await, 10);
    assert_eq!(fixture.quantity(subject_b).await, 1);

    // No order_placed records anywhere.
    let summary = fixture
        .query_service()
        .summarize(AuditFilter::all().with_audit_type(AuditType::OrderPlaced))
        .await
        .unwrap();
    assert_eq!(summary.count, 0);
}

#[tokio::test]
async fn reserve_then_cancel_round_trips_exactly() {
    let fixture = LedgerFixture::new();
    let (product_id, variant_id, subject) = fixture.variant_level_product(10).await.unwrap();
    let order_id = OrderId::new();
    let items = [LedgerFixture::line_item(product_id, Some(variant_id), 4)];

    fixture.bridge().order_placed(order_id, &items).await.unwrap();
    assert_eq!(fixture.quantity(subject).await, 6);

    fixture
        .bridge()
        .order_cancelled(order_id, &items)
        .await
        .unwrap();
    assert_eq!(fixture.quantity(subject).await, 10);

    // Duplicate webhook deliveries change nothing.
    for _ in 0..3 {
        let outcome = fixture
            .bridge()
            .order_cancelled(order_id, &items)
            .await
            .unwrap();
        assert_eq!(outcome, BridgeOutcome::AlreadyApplied);
    }
    assert_eq!(fixture.quantity(subject).await, 10);

    // The trail shows the full round trip.
    let page = fixture
        .query_service()
        .query(
            AuditFilter::all().with_order(order_id),
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].audit_type, AuditType::OrderCancelled);
    assert_eq!(page.items[1].audit_type, AuditType::OrderPlaced);
}

#[tokio::test]
async fn refund_restock_applies_after_cancellation() {
    let fixture = LedgerFixture::new();
    let (product_id, variant_id, subject) = fixture.variant_level_product(10).await.unwrap();
    let order_id = OrderId::new();
    let items = [LedgerFixture::line_item(product_id, Some(variant_id), 2)];

    fixture.bridge().order_placed(order_id, &items).await.unwrap();
    fixture
        .bridge()
        .order_cancelled(order_id, &items)
        .await
        .unwrap();
    let refund = fixture
        .bridge()
        .order_refunded(order_id, &items)
        .await
        .unwrap();

    // Distinct transitions both release; only same-type replays dedupe.
    assert!(refund.is_applied());
    assert_eq!(fixture.quantity(subject).await, 12);

    let replay = fixture
        .bridge()
        .order_refunded(order_id, &items)
        .await
        .unwrap();
    assert_eq!(replay, BridgeOutcome::AlreadyApplied);
}

#[tokio::test]
async fn damaged_stock_cannot_go_negative() {
    let fixture = LedgerFixture::new();
    let (_, _, subject) = fixture.variant_level_product(3).await.unwrap();

    let err = fixture
        .bridge()
        .mark_damaged(
            SubjectRef::Tracked(subject),
            5,
            fixture.actor_id(),
            Some("flood damage".to_string()),
        )
        .await
        .unwrap_err();

    let LedgerError::InsufficientStock { shortages } = err else {
        panic!("expected InsufficientStock");
    };
    assert_eq!(shortages[0].available, 3);
    assert_eq!(shortages[0].requested, 5);
    assert_eq!(fixture.quantity(subject).await, 3);

    let record = fixture
        .bridge()
        .mark_damaged(
            SubjectRef::Tracked(subject),
            2,
            fixture.actor_id(),
            Some("flood damage".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(record.new_quantity, 1);
    assert_eq!(record.reason.as_deref(), Some("flood damage"));
    assert_eq!(record.actor_id, Some(fixture.actor_id()));
    assert_eq!(record.order_id, None);
}

#[tokio::test]
async fn import_seeds_an_auditable_opening_balance() {
    let fixture = LedgerFixture::new();
    let (product_id, subject) = fixture.product_level_product(0).await.unwrap();

    let record = fixture
        .bridge()
        .import_initial(SubjectRef::Tracked(subject), 40, fixture.actor_id())
        .await
        .unwrap();
    assert_eq!(record.audit_type, AuditType::Import);
    assert_eq!(record.previous_quantity, 0);
    assert_eq!(record.new_quantity, 40);
    assert_eq!(record.actor_id, Some(fixture.actor_id()));
    assert_eq!(fixture.quantity(subject).await, 40);

    // The product subject is reservable directly, no variants involved.
    let receipt = fixture
        .validator()
        .reserve_for_order(
            OrderId::new(),
            &[LedgerFixture::line_item(product_id, None, 10)],
        )
        .await
        .unwrap();
    assert_eq!(receipt.records.len(), 1);
    assert_eq!(fixture.quantity(subject).await, 30);
}

#[tokio::test]
async fn untracked_subject_rejects_manual_mutations() {
    let fixture = LedgerFixture::new();
    fixture.untracked_product().await.unwrap();

    let err = fixture
        .bridge()
        .restock(SubjectRef::Untracked, 5, fixture.actor_id(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::SubjectNotTracked));
}
