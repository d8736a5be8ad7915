mod common;

use assert_matches::assert_matches;
use common::{admin_actor, branch_actor, drain_events, seed_stock, spawn_app};
use stockledger_api::{
    commands::inventory::{
        AdjustStockCommand, BulkCreateStockCommand, BulkStockEntry, CreateStockRecordCommand,
        MarkStockDamagedCommand, RestockStockCommand, SetStockLimitsCommand,
    },
    entities::stock_history::HistoryAction,
    errors::ServiceError,
    events::Event,
    services::history::HistoryQuery,
};
use uuid::Uuid;

#[tokio::test]
async fn create_stock_record_rejects_duplicate_pair() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();

    seed_stock(&app, product, branch, 10, 2, 50).await;

    let duplicate = app
        .services
        .inventory
        .create_stock_record(CreateStockRecordCommand {
            product_id: product,
            branch_id: branch,
            initial_stock: 5,
            min_stock_level: 0,
            max_stock_level: 10,
            reference: None,
            actor: admin_actor(),
        })
        .await;

    assert_matches!(duplicate, Err(ServiceError::Conflict(_)));

    // The same product at another branch is a different record.
    let other_branch = app
        .services
        .inventory
        .create_stock_record(CreateStockRecordCommand {
            product_id: product,
            branch_id: Uuid::new_v4(),
            initial_stock: 5,
            min_stock_level: 0,
            max_stock_level: 10,
            reference: None,
            actor: admin_actor(),
        })
        .await;
    assert!(other_branch.is_ok());
}

#[tokio::test]
async fn initial_stock_is_recorded_as_delivery() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();

    let record = seed_stock(&app, product, branch, 25, 2, 50).await;
    assert_eq!(record.current_stock, 25);

    let (entries, total) = app
        .services
        .history
        .query(
            HistoryQuery {
                product_id: Some(product),
                branch_id: Some(branch),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(entries[0].action, HistoryAction::Delivery.as_str());
    assert_eq!(entries[0].quantity, 25);

    let (movements, movement_total) = app
        .services
        .inventory
        .list_movements(record.id, 1, 20)
        .await
        .unwrap();
    assert_eq!(movement_total, 1);
    assert_eq!(movements[0].movement_type, "in");
    assert_eq!(movements[0].quantity, 25);
}

#[tokio::test]
async fn adjustment_pairs_movement_and_ledger_entry() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    let record = seed_stock(&app, product, branch, 10, 0, 100).await;

    let adjusted = app
        .services
        .inventory
        .adjust_stock(AdjustStockCommand {
            product_id: product,
            branch_id: branch,
            delta: -3,
            reason: "cycle count correction".to_string(),
            actor: admin_actor(),
        })
        .await
        .unwrap();
    assert_eq!(adjusted.current_stock, 7);

    let (entries, total) = app
        .services
        .history
        .query(
            HistoryQuery {
                product_id: Some(product),
                action: Some(HistoryAction::Adjustment),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(entries[0].quantity, -3);

    let (movements, movement_total) = app
        .services
        .inventory
        .list_movements(record.id, 1, 20)
        .await
        .unwrap();
    // Initial delivery plus the adjustment.
    assert_eq!(movement_total, 2);
    assert_eq!(movements[0].movement_type, "out");
    assert_eq!(movements[0].quantity, 3);
}

#[tokio::test]
async fn debit_below_zero_is_rejected() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 4, 0, 100).await;

    let result = app
        .services
        .inventory
        .adjust_stock(AdjustStockCommand {
            product_id: product,
            branch_id: branch,
            delta: -5,
            reason: "shrinkage".to_string(),
            actor: admin_actor(),
        })
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    let record = app
        .services
        .inventory
        .get_stock(product, branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.current_stock, 4);
}

#[tokio::test]
async fn adjusting_missing_record_is_not_found() {
    let app = spawn_app().await;

    let result = app
        .services
        .inventory
        .adjust_stock(AdjustStockCommand {
            product_id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            delta: 5,
            reason: "found in back room".to_string(),
            actor: admin_actor(),
        })
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn invalid_limits_leave_prior_limits_unchanged() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 2, 50).await;

    let result = app
        .services
        .inventory
        .set_stock_limits(SetStockLimitsCommand {
            product_id: product,
            branch_id: branch,
            min_stock_level: 30,
            max_stock_level: 10,
            actor: admin_actor(),
        })
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let record = app
        .services
        .inventory
        .get_stock(product, branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.min_stock_level, 2);
    assert_eq!(record.max_stock_level, 50);

    let updated = app
        .services
        .inventory
        .set_stock_limits(SetStockLimitsCommand {
            product_id: product,
            branch_id: branch,
            min_stock_level: 5,
            max_stock_level: 80,
            actor: admin_actor(),
        })
        .await
        .unwrap();
    assert_eq!(updated.min_stock_level, 5);
    assert_eq!(updated.max_stock_level, 80);
}

#[tokio::test]
async fn restock_credits_and_logs() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 3, 0, 100).await;

    let record = app
        .services
        .inventory
        .restock(RestockStockCommand {
            product_id: product,
            branch_id: branch,
            quantity: 12,
            reference: "supplier delivery DS-104".to_string(),
            actor: admin_actor(),
        })
        .await
        .unwrap();
    assert_eq!(record.current_stock, 15);

    let (entries, _) = app
        .services
        .history
        .query(
            HistoryQuery {
                product_id: Some(product),
                action: Some(HistoryAction::Restock),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quantity, 12);
    assert_eq!(entries[0].reference, "supplier delivery DS-104");
}

#[tokio::test]
async fn damaged_units_move_between_balances() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 100).await;

    let record = app
        .services
        .inventory
        .mark_damaged(MarkStockDamagedCommand {
            product_id: product,
            branch_id: branch,
            quantity: 4,
            notes: Some("water damage".to_string()),
            actor: admin_actor(),
        })
        .await
        .unwrap();

    assert_eq!(record.current_stock, 6);
    assert_eq!(record.damaged_stock, 4);
}

#[tokio::test]
async fn bulk_create_is_all_or_nothing() {
    let app = spawn_app().await;
    let branch = Uuid::new_v4();
    let existing = Uuid::new_v4();
    seed_stock(&app, existing, branch, 1, 0, 10).await;

    let fresh_a = Uuid::new_v4();
    let fresh_b = Uuid::new_v4();
    let result = app
        .services
        .inventory
        .bulk_create_stock(BulkCreateStockCommand {
            entries: vec![
                BulkStockEntry {
                    product_id: fresh_a,
                    branch_id: branch,
                    initial_stock: 5,
                    min_stock_level: 0,
                    max_stock_level: 10,
                },
                // Duplicate pair poisons the whole batch.
                BulkStockEntry {
                    product_id: existing,
                    branch_id: branch,
                    initial_stock: 5,
                    min_stock_level: 0,
                    max_stock_level: 10,
                },
                BulkStockEntry {
                    product_id: fresh_b,
                    branch_id: branch,
                    initial_stock: 5,
                    min_stock_level: 0,
                    max_stock_level: 10,
                },
            ],
            reference: None,
            actor: admin_actor(),
        })
        .await;

    assert_matches!(result, Err(ServiceError::Conflict(_)));
    assert!(app
        .services
        .inventory
        .get_stock(fresh_a, branch)
        .await
        .unwrap()
        .is_none());
    assert!(app
        .services
        .inventory
        .get_stock(fresh_b, branch)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn branch_scope_is_enforced_before_mutation() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 100).await;

    let outsider = branch_actor(Uuid::new_v4());
    let result = app
        .services
        .inventory
        .adjust_stock(AdjustStockCommand {
            product_id: product,
            branch_id: branch,
            delta: -1,
            reason: "should not happen".to_string(),
            actor: outsider,
        })
        .await;
    assert_matches!(result, Err(ServiceError::Unauthorized(_)));

    let record = app
        .services
        .inventory
        .get_stock(product, branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.current_stock, 10);
}

#[tokio::test]
async fn stock_events_carry_unique_ids_and_new_quantity() {
    let mut app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 100).await;
    drain_events(&mut app);

    app.services
        .inventory
        .adjust_stock(AdjustStockCommand {
            product_id: product,
            branch_id: branch,
            delta: -2,
            reason: "breakage".to_string(),
            actor: admin_actor(),
        })
        .await
        .unwrap();

    let events = drain_events(&mut app);
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::StockChanged {
            new_quantity,
            change_type,
            product_id,
            ..
        } => {
            assert_eq!(*new_quantity, 8);
            assert_eq!(change_type.as_str(), "adjustment");
            assert_eq!(*product_id, product);
        }
        other => panic!("unexpected event {:?}", other),
    }
}
