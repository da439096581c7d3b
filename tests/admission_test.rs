mod common;

use assert_matches::assert_matches;
use furnishop_api::{
    errors::{AdmissionFailure, ServiceError},
    events::Event,
    models::{AdmissionPayload, ComponentType, OrderStatus},
    services::admission::OrderAdmissionService,
};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;

use common::*;

fn payload(value: serde_json::Value) -> AdmissionPayload {
    serde_json::from_value(value).expect("payload shape")
}

#[rstest]
#[case::transactional(true)]
#[case::compensating(false)]
#[tokio::test]
async fn shop_envelope_expands_into_one_order_per_item(#[case] transactions: bool) {
    let pool = memory_pool().await;
    let ids = seed_chair_components(&pool, 100).await;
    let service = admission_service(&pool, transactions, unassigned());

    let orders = service
        .admit(payload(json!({
            "shop": "S1",
            "shopkeeper": "alice",
            "items": [
                {"furnitureType": "chair", "quantity": 2},
                {"furnitureType": "table", "quantity": 1}
            ]
        })))
        .await
        .expect("batch admitted");

    assert_eq!(orders.len(), 2);
    for order in &orders {
        assert_eq!(order.shop.as_deref(), Some("S1"));
        assert_eq!(order.shopkeeper.as_deref(), Some("alice"));
        assert_eq!(order.status(), Some(OrderStatus::Requested));
        assert!(order.assigned_factory.is_none());
        assert!(order.audit_entries().is_empty());
        assert!(order.order_number.starts_with("ORD-"));
    }
    assert_ne!(orders[0].order_number, orders[1].order_number);
    assert_eq!(all_orders(&pool).await.len(), 2);

    // Only the chair consumes components.
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Back]).await, 98);
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Arm]).await, 96);
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Castor]).await, 90);
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Headrest]).await, 100);
}

#[tokio::test]
async fn single_object_and_array_payloads_are_accepted() {
    let pool = memory_pool().await;
    seed_chair_components(&pool, 50).await;
    let service = admission_service(&pool, true, unassigned());

    let single = service
        .admit(payload(json!({"type": "chair", "quantity": "3", "headrest": true})))
        .await
        .expect("single admitted");
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].quantity, 3);
    assert!(single[0].headrest);

    let batch = service
        .admit(payload(json!([
            {"quantity": 1},
            {"furnitureType": "sofa", "quantity": 4, "orderNumber": "SOFA-1"}
        ])))
        .await
        .expect("array admitted");
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].furniture_type, "chair");
    assert_eq!(batch[1].order_number, "SOFA-1");
}

#[rstest]
#[case::transactional(true)]
#[case::compensating(false)]
#[tokio::test]
async fn back_model_prefers_matching_furniture_type(#[case] transactions: bool) {
    let pool = memory_pool().await;
    let ids = seed_chair_components(&pool, 100).await;
    let chair_back = seed_record(&pool, ComponentType::Back, Some("Aero X"), "chair", 5).await;
    let stool_back = seed_record(&pool, ComponentType::Back, Some("Aero X"), "stool", 50).await;
    let service = admission_service(&pool, transactions, unassigned());

    service
        .admit(payload(json!({"furnitureType": "chair", "backModel": "aero x", "quantity": 3})))
        .await
        .expect("admitted");

    assert_eq!(quantity_of(&pool, chair_back.id).await, 2);
    assert_eq!(quantity_of(&pool, stool_back.id).await, 50);
    // The named back replaces the generic one.
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Back]).await, 100);
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Seat]).await, 97);
}

#[tokio::test]
async fn back_model_matching_is_exact_not_substring() {
    let pool = memory_pool().await;
    seed_chair_components(&pool, 100).await;
    seed_record(&pool, ComponentType::Back, Some("Aero Xtra"), "chair", 10).await;
    let service = admission_service(&pool, true, unassigned());

    let err = service
        .admit(payload(json!({"backModel": "Aero", "quantity": 1})))
        .await
        .unwrap_err();
    let rejection = err.as_rejection().expect("rejection");
    assert_eq!(rejection.failure.code(), "insufficient_back_model");
}

#[tokio::test]
async fn non_chair_back_model_is_matched_against_products() {
    let pool = memory_pool().await;
    let table = seed_record(&pool, ComponentType::Product, Some("Oak 160"), "table", 4).await;
    let service = admission_service(&pool, false, unassigned());

    service
        .admit(payload(json!({"furnitureType": "table", "productModel": "oak 160", "quantity": 2})))
        .await
        .expect("admitted");

    assert_eq!(quantity_of(&pool, table.id).await, 2);
}

#[rstest]
#[case::transactional(true)]
#[case::compensating(false)]
#[tokio::test]
async fn insufficient_component_leaves_stock_untouched(#[case] transactions: bool) {
    let pool = memory_pool().await;
    let ids = seed_chair_components(&pool, 100).await;
    seed_record(&pool, ComponentType::Back, Some("Aero"), "chair", 10).await;
    // Enough for two chairs only.
    let castor = ids[&ComponentType::Castor];
    furnishop_api::services::stock_ledger::try_decrement(&*pool, castor, 90)
        .await
        .unwrap()
        .unwrap();
    let before = snapshot(&pool).await;
    let service = admission_service(&pool, transactions, unassigned());

    let err = service
        .admit(payload(json!({"backModel": "Aero", "quantity": 3})))
        .await
        .unwrap_err();

    let rejection = err.as_rejection().expect("rejection");
    assert_eq!(rejection.order_index, Some(0));
    assert_matches!(
        rejection.failure,
        AdmissionFailure::InsufficientComponent {
            component: ComponentType::Castor,
            needed: 15,
            available: Some(10),
        }
    );
    assert_eq!(snapshot(&pool).await, before);
    assert!(all_orders(&pool).await.is_empty());
}

#[rstest]
#[case::transactional(true)]
#[case::compensating(false)]
#[tokio::test]
async fn missing_back_model_reports_both_match_sets(#[case] transactions: bool) {
    let pool = memory_pool().await;
    seed_chair_components(&pool, 100).await;
    seed_record(&pool, ComponentType::Back, Some("Aero"), "chair", 1).await;
    seed_record(&pool, ComponentType::Back, Some("AERO"), "stool", 2).await;
    let before = snapshot(&pool).await;
    let service = admission_service(&pool, transactions, unassigned());

    let err = service
        .admit(payload(json!({"backModel": "aero", "quantity": 4})))
        .await
        .unwrap_err();

    let rejection = err.as_rejection().expect("rejection");
    match &rejection.failure {
        AdmissionFailure::InsufficientBackModel(d) => {
            assert_eq!(d.required, 4);
            assert_eq!(d.typed_matches.len(), 1);
            assert_eq!(d.all_matches.len(), 2);
        }
        other => panic!("unexpected failure {:?}", other),
    }
    let details = rejection.details();
    assert_eq!(details["typedMatches"][0]["quantity"], 1);
    assert_eq!(snapshot(&pool).await, before);
}

#[tokio::test]
async fn transactional_batch_is_all_or_nothing() {
    let pool = memory_pool().await;
    let ids = seed_chair_components(&pool, 10).await;
    let before = snapshot(&pool).await;
    let service = admission_service(&pool, true, unassigned());

    // The first chair fits, the second pushes castors past 50.
    let err = service
        .admit(payload(json!([
            {"quantity": 2},
            {"quantity": 9}
        ])))
        .await
        .unwrap_err();

    let rejection = err.as_rejection().expect("rejection");
    assert_eq!(rejection.order_index, Some(1));
    assert!(rejection.committed.is_empty());
    assert_eq!(snapshot(&pool).await, before);
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Seat]).await, 10);
    assert!(all_orders(&pool).await.is_empty());
}

#[tokio::test]
async fn compensating_batch_keeps_earlier_orders() {
    let pool = memory_pool().await;
    let ids = seed_chair_components(&pool, 10).await;
    let service = admission_service(&pool, false, unassigned());

    let err = service
        .admit(payload(json!([
            {"quantity": 2, "orderNumber": "FIRST"},
            {"quantity": 9}
        ])))
        .await
        .unwrap_err();

    let rejection = err.as_rejection().expect("rejection");
    assert_eq!(rejection.order_index, Some(1));
    assert_eq!(rejection.committed, vec!["FIRST".to_string()]);
    assert_eq!(rejection.details()["committedOrders"][0], "FIRST");

    let orders = all_orders(&pool).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_number, "FIRST");
    // Exactly the first order's consumption remains.
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Seat]).await, 8);
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Arm]).await, 6);
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Castor]).await, 0);
}

#[rstest]
#[case::transactional(true)]
#[case::compensating(false)]
#[tokio::test]
async fn invalid_order_rejects_batch_before_any_reservation(#[case] transactions: bool) {
    let pool = memory_pool().await;
    seed_chair_components(&pool, 100).await;
    let before = snapshot(&pool).await;
    let service = admission_service(&pool, transactions, unassigned());

    let err = service
        .admit(payload(json!([
            {"quantity": 1},
            {"quantity": 0}
        ])))
        .await
        .unwrap_err();

    let rejection = err.as_rejection().expect("rejection");
    assert_eq!(rejection.failure.code(), "invalid_order");
    assert_eq!(rejection.order_index, Some(1));
    assert_eq!(snapshot(&pool).await, before);
    assert!(all_orders(&pool).await.is_empty());
}

#[tokio::test]
async fn empty_and_oversized_batches_are_invalid() {
    let pool = memory_pool().await;
    let service = admission_service(&pool, true, unassigned()).with_max_batch_size(2);

    let err = service.admit(payload(json!([]))).await.unwrap_err();
    assert_eq!(err.as_rejection().unwrap().failure.code(), "invalid_order");

    let err = service
        .admit(payload(json!({"items": [
            {"furnitureType": "table", "quantity": 1},
            {"furnitureType": "table", "quantity": 1},
            {"furnitureType": "table", "quantity": 1}
        ]})))
        .await
        .unwrap_err();
    assert_eq!(err.as_rejection().unwrap().failure.code(), "invalid_order");
}

#[rstest]
#[case::transactional(true)]
#[case::compensating(false)]
#[tokio::test]
async fn active_factory_handler_is_pre_assigned(#[case] transactions: bool) {
    let pool = memory_pool().await;
    seed_chair_components(&pool, 10).await;
    let handler = factory_handler("North works");
    let directory = StubDirectory::with(Some(handler.clone()));
    let service = admission_service(&pool, transactions, directory.clone())
        .with_factory_role("factory");

    let orders = service
        .admit(payload(json!([{"quantity": 1}, {"quantity": 1}])))
        .await
        .expect("admitted");

    for order in &orders {
        assert_eq!(order.status(), Some(OrderStatus::Assigned));
        assert_eq!(order.assigned_factory, Some(handler.id.to_string()));
    }
    // One lookup per batch.
    assert_eq!(directory.lookups(), 1);
    assert_eq!(directory.roles.lock().unwrap()[0], "factory");
}

#[tokio::test]
async fn handler_lookup_failure_does_not_block_admission() {
    let pool = memory_pool().await;
    seed_chair_components(&pool, 10).await;
    let service = admission_service(&pool, true, Arc::new(FailingDirectory));

    let orders = service
        .admit(payload(json!({"quantity": 1})))
        .await
        .expect("admitted");
    assert_eq!(orders[0].status(), Some(OrderStatus::Requested));
}

#[tokio::test]
async fn preset_assigned_factory_is_kept() {
    let pool = memory_pool().await;
    let directory = StubDirectory::with(Some(factory_handler("Other")));
    let service = admission_service(&pool, false, directory);

    let orders = service
        .admit(payload(json!({"furnitureType": "desk", "quantity": 1, "assignedFactory": "F-7"})))
        .await
        .expect("admitted");
    assert_eq!(orders[0].assigned_factory.as_deref(), Some("F-7"));
    assert_eq!(orders[0].status(), Some(OrderStatus::Assigned));
}

#[tokio::test]
async fn strategies_produce_identical_results_on_the_happy_path() {
    let body = json!({
        "shop": "S2",
        "items": [
            {"furnitureType": "chair", "quantity": 2, "headrest": true, "backModel": "Aero", "orderNumber": "A-1"},
            {"furnitureType": "chair", "quantity": 1, "orderNumber": "A-2"},
            {"furnitureType": "table", "quantity": 1, "orderNumber": "A-3"}
        ]
    });

    let mut outcomes = Vec::new();
    for transactions in [true, false] {
        let pool = memory_pool().await;
        seed_chair_components(&pool, 40).await;
        seed_record(&pool, ComponentType::Back, Some("Aero"), "chair", 6).await;
        let service = admission_service(&pool, transactions, unassigned());

        let orders = service.admit(payload(body.clone())).await.expect("admitted");
        let summary: Vec<_> = orders
            .into_iter()
            .map(|o| {
                (
                    o.order_number,
                    o.shop,
                    o.furniture_type,
                    o.back_model,
                    o.quantity,
                    o.headrest,
                    o.status,
                    o.assigned_factory,
                    o.audit,
                )
            })
            .collect();
        outcomes.push((summary, ledger_by_key(&pool).await));
    }

    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn admission_emits_order_and_stock_events() {
    let pool = memory_pool().await;
    seed_chair_components(&pool, 10).await;
    let captured = CapturedEvents::start();
    let service = OrderAdmissionService::new(
        pool.clone(),
        capabilities(true),
        unassigned(),
        Some(captured.sender.clone()),
    );

    let orders = service
        .admit(payload(json!({"quantity": 1})))
        .await
        .expect("admitted");

    // Seven generic components (headrest is zero) plus the order itself.
    let events = captured.wait_for(8).await;
    let reserved = events
        .iter()
        .filter(|e| matches!(e, Event::StockReserved { .. }))
        .count();
    assert_eq!(reserved, 7);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::OrderAdmitted { order_number, .. } if *order_number == orders[0].order_number
    )));
}

#[tokio::test]
async fn rejection_errors_map_to_conflict() {
    let pool = memory_pool().await;
    let service = admission_service(&pool, false, unassigned());

    let err = service
        .admit(payload(json!({"quantity": 1})))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AdmissionRejected(_));
    assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    assert_eq!(err.as_rejection().unwrap().failure.code(), "insufficient_back");
}

#[tokio::test]
async fn reservation_rollback_restores_stock_newest_first() {
    use furnishop_api::services::{
        reservation::StockReservation,
        stock_ledger,
    };
    use uuid::Uuid;

    let pool = memory_pool().await;
    let ids = seed_chair_components(&pool, 10).await;
    let seat = ids[&ComponentType::Seat];
    let castor = ids[&ComponentType::Castor];
    let captured = CapturedEvents::start();

    let mut reservation = StockReservation::new();
    stock_ledger::try_decrement(&*pool, seat, 2).await.unwrap().unwrap();
    reservation.record(seat, ComponentType::Seat, 2);
    stock_ledger::try_decrement(&*pool, castor, 10).await.unwrap().unwrap();
    reservation.record(castor, ComponentType::Castor, 10);
    let vanished = Uuid::new_v4();
    reservation.record(vanished, ComponentType::Chrome, 1);

    let report = reservation.rollback(&*pool, Some(captured.sender.as_ref())).await;

    assert_eq!(report.restored, 2);
    assert!(!report.is_clean());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0.record_id, vanished);
    assert_eq!(quantity_of(&pool, seat).await, 10);
    assert_eq!(quantity_of(&pool, castor).await, 10);

    let events = captured.wait_for(3).await;
    assert!(matches!(
        events[0],
        Event::CompensationFailed { record_id, .. } if record_id == vanished
    ));
    assert_eq!(
        events[1],
        Event::StockCompensated {
            record_id: castor,
            quantity: 10
        }
    );
}

#[rstest]
#[case::transactional(true)]
#[case::compensating(false)]
#[tokio::test]
async fn existing_order_number_is_invalid_and_releases_stock(#[case] transactions: bool) {
    let pool = memory_pool().await;
    seed_chair_components(&pool, 20).await;
    let service = admission_service(&pool, transactions, unassigned());
    service
        .admit(payload(json!({"quantity": 1, "orderNumber": "DUP"})))
        .await
        .expect("first admitted");
    let before = snapshot(&pool).await;

    // The number only clashes at insert time, after stock was reserved.
    let err = service
        .admit(payload(json!([
            {"furnitureType": "table", "quantity": 1, "orderNumber": "FRESH"},
            {"quantity": 1, "orderNumber": "DUP"}
        ])))
        .await
        .unwrap_err();

    let rejection = err.as_rejection().expect("rejection");
    assert_eq!(rejection.failure.code(), "invalid_order");
    assert_eq!(rejection.order_index, Some(1));
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(snapshot(&pool).await, before);

    let numbers: Vec<String> = all_orders(&pool)
        .await
        .into_iter()
        .map(|o| o.order_number)
        .collect();
    if transactions {
        assert!(rejection.committed.is_empty());
        assert_eq!(numbers, vec!["DUP".to_string()]);
    } else {
        assert_eq!(rejection.committed, vec!["FRESH".to_string()]);
        assert_eq!(numbers, vec!["DUP".to_string(), "FRESH".to_string()]);
    }
}

#[tokio::test]
async fn repeated_order_number_in_batch_is_rejected_up_front() {
    let pool = memory_pool().await;
    seed_chair_components(&pool, 20).await;
    let before = snapshot(&pool).await;
    let service = admission_service(&pool, false, unassigned());

    let err = service
        .admit(payload(json!([
            {"quantity": 1, "orderNumber": "TWICE"},
            {"quantity": 1, "orderNumber": "TWICE"}
        ])))
        .await
        .unwrap_err();

    let rejection = err.as_rejection().expect("rejection");
    assert_eq!(rejection.failure.code(), "invalid_order");
    assert_eq!(rejection.order_index, Some(1));
    assert_eq!(snapshot(&pool).await, before);
    assert!(all_orders(&pool).await.is_empty());
}

#[rstest]
#[case::transactional(true)]
#[case::compensating(false)]
#[tokio::test]
async fn abandoned_admission_still_completes(#[case] transactions: bool) {
    use futures::FutureExt;

    let pool = memory_pool().await;
    let ids = seed_chair_components(&pool, 20).await;
    let captured = CapturedEvents::start();
    let service = OrderAdmissionService::new(
        pool.clone(),
        capabilities(transactions),
        unassigned(),
        Some(captured.sender.clone()),
    );

    // Polled once and dropped, like a request whose client went away.
    let pending = service
        .admit(payload(json!({"quantity": 2, "orderNumber": "GONE"})))
        .now_or_never();
    assert!(pending.is_none());

    let events = captured.wait_for(8).await;
    assert!(events.iter().any(|e| matches!(
        e,
        Event::OrderAdmitted { order_number, .. } if order_number == "GONE"
    )));
    let orders = all_orders(&pool).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Castor]).await, 10);
    assert_eq!(quantity_of(&pool, ids[&ComponentType::Seat]).await, 18);
}

#[tokio::test]
async fn abandoned_failing_admission_still_compensates() {
    use futures::FutureExt;

    let pool = memory_pool().await;
    seed_chair_components(&pool, 20).await;
    let captured = CapturedEvents::start();
    let service = OrderAdmissionService::new(
        pool.clone(),
        capabilities(false),
        unassigned(),
        Some(captured.sender.clone()),
    );
    service
        .admit(payload(json!({"quantity": 1, "orderNumber": "TAKEN"})))
        .await
        .expect("first admitted");
    let already = captured.wait_for(8).await.len();
    let before = snapshot(&pool).await;

    // Reserves every component, then fails on the order number and has to
    // give all seven back after the caller is gone.
    let pending = service
        .admit(payload(json!({"quantity": 1, "orderNumber": "TAKEN"})))
        .now_or_never();
    assert!(pending.is_none());

    let events = captured.wait_for(already + 7).await;
    let compensated = events[already..]
        .iter()
        .filter(|e| matches!(e, Event::StockCompensated { .. }))
        .count();
    assert_eq!(compensated, 7);
    assert_eq!(snapshot(&pool).await, before);
    assert_eq!(all_orders(&pool).await.len(), 1);
}
