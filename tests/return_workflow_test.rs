mod common;

use assert_matches::assert_matches;
use common::{
    admin_actor, branch_actor, drain_events, seed_delivered_order, seed_stock, spawn_app, TestApp,
};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use stockledger_api::{
    commands::returns::{
        CreateReturnCommand, ReturnItemDecision, ReturnItemInput, ReturnWithItems, ReviewDecision,
        ReviewReturnCommand,
    },
    entities::{
        return_entity::ReturnKind, return_item::ReturnReason, stock_history::HistoryAction,
    },
    errors::ServiceError,
    events::Event,
    services::history::HistoryQuery,
};
use uuid::Uuid;

fn return_line(product_id: Uuid, quantity: i32) -> ReturnItemInput {
    ReturnItemInput {
        product_id,
        quantity,
        price: dec!(5),
        reason: ReturnReason::Damaged,
    }
}

async fn create_restock_return(
    app: &TestApp,
    branch: Uuid,
    items: Vec<ReturnItemInput>,
) -> ReturnWithItems {
    app.services
        .returns
        .create_return(CreateReturnCommand {
            kind: ReturnKind::Restock,
            order_id: None,
            sale_id: None,
            branch_id: branch,
            items,
            actor: admin_actor(),
        })
        .await
        .expect("Failed to create restock return")
}

#[tokio::test]
async fn approving_a_restock_return_credits_stock() {
    // Stock 10, return of 3 approved -> stock 13.
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 2, 50).await;

    let ret = create_restock_return(&app, branch, vec![return_line(product, 3)]).await;
    assert_eq!(ret.return_request.status, "pending_approval");
    assert!(ret.return_request.return_number.starts_with("RET-"));

    // Creation of a restock return does not move stock.
    let record = app
        .services
        .inventory
        .get_stock(product, branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.current_stock, 10);

    let reviewed = app
        .services
        .returns
        .review_return(ReviewReturnCommand {
            return_id: ret.return_request.id,
            decision: ReviewDecision::Approve,
            item_decisions: vec![ReturnItemDecision {
                product_id: product,
                quantity: 3,
                approve: true,
            }],
            notes: Some("ok to restock".to_string()),
            actor: admin_actor(),
        })
        .await
        .unwrap();

    assert_eq!(reviewed.return_request.status, "approved");
    assert!(reviewed.return_request.reviewed_at.is_some());
    assert_eq!(reviewed.items[0].status, "approved");

    let record = app
        .services
        .inventory
        .get_stock(product, branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.current_stock, 13);

    let (entries, _) = app
        .services
        .history
        .query(
            HistoryQuery {
                product_id: Some(product),
                action: Some(HistoryAction::ReturnApproved),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quantity, 3);

    let trail = app
        .services
        .returns
        .get_status_history(ret.return_request.id)
        .await
        .unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].status, "pending_approval");
    assert_eq!(trail[1].status, "approved");
}

#[tokio::test]
async fn a_reviewed_return_cannot_be_reviewed_again() {
    // A second review hits Conflict and changes no stock.
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 50).await;

    let ret = create_restock_return(&app, branch, vec![return_line(product, 3)]).await;
    app.services
        .returns
        .review_return(ReviewReturnCommand {
            return_id: ret.return_request.id,
            decision: ReviewDecision::Approve,
            item_decisions: vec![],
            notes: None,
            actor: admin_actor(),
        })
        .await
        .unwrap();

    let second = app
        .services
        .returns
        .review_return(ReviewReturnCommand {
            return_id: ret.return_request.id,
            decision: ReviewDecision::Approve,
            item_decisions: vec![],
            notes: None,
            actor: admin_actor(),
        })
        .await;
    assert_matches!(second, Err(ServiceError::Conflict(_)));

    let record = app
        .services
        .inventory
        .get_stock(product, branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.current_stock, 13);
}

#[tokio::test]
async fn rejecting_a_return_leaves_stock_untouched() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 50).await;

    let ret = create_restock_return(&app, branch, vec![return_line(product, 3)]).await;
    let reviewed = app
        .services
        .returns
        .review_return(ReviewReturnCommand {
            return_id: ret.return_request.id,
            decision: ReviewDecision::Reject,
            item_decisions: vec![],
            notes: Some("resellable".to_string()),
            actor: admin_actor(),
        })
        .await
        .unwrap();

    assert_eq!(reviewed.return_request.status, "rejected");
    assert_eq!(reviewed.items[0].status, "rejected");

    let record = app
        .services
        .inventory
        .get_stock(product, branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.current_stock, 10);

    // The ledger still records the workflow transition, with zero delta.
    let (entries, _) = app
        .services
        .history
        .query(
            HistoryQuery {
                product_id: Some(product),
                action: Some(HistoryAction::ReturnRejected),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quantity, 0);
}

#[tokio::test]
async fn per_item_decisions_credit_only_approved_lines() {
    let app = spawn_app().await;
    let branch = Uuid::new_v4();
    let kept = Uuid::new_v4();
    let refused = Uuid::new_v4();
    seed_stock(&app, kept, branch, 10, 0, 50).await;
    seed_stock(&app, refused, branch, 10, 0, 50).await;

    let ret = create_restock_return(
        &app,
        branch,
        vec![return_line(kept, 2), return_line(refused, 4)],
    )
    .await;

    let reviewed = app
        .services
        .returns
        .review_return(ReviewReturnCommand {
            return_id: ret.return_request.id,
            decision: ReviewDecision::Approve,
            item_decisions: vec![
                ReturnItemDecision {
                    product_id: kept,
                    quantity: 2,
                    approve: true,
                },
                ReturnItemDecision {
                    product_id: refused,
                    quantity: 4,
                    approve: false,
                },
            ],
            notes: None,
            actor: admin_actor(),
        })
        .await
        .unwrap();

    assert_eq!(reviewed.return_request.status, "approved");
    let kept_record = app
        .services
        .inventory
        .get_stock(kept, branch)
        .await
        .unwrap()
        .unwrap();
    let refused_record = app
        .services
        .inventory
        .get_stock(refused, branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept_record.current_stock, 12);
    assert_eq!(refused_record.current_stock, 10);

    let kept_item = reviewed
        .items
        .iter()
        .find(|i| i.product_id == kept)
        .unwrap();
    let refused_item = reviewed
        .items
        .iter()
        .find(|i| i.product_id == refused)
        .unwrap();
    assert_eq!(kept_item.status, "approved");
    assert_eq!(refused_item.status, "rejected");
}

#[tokio::test]
async fn mismatched_item_decision_aborts_the_whole_review() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 50).await;

    let ret = create_restock_return(&app, branch, vec![return_line(product, 3)]).await;

    // Wrong quantity: hard failure, no partial updates.
    let result = app
        .services
        .returns
        .review_return(ReviewReturnCommand {
            return_id: ret.return_request.id,
            decision: ReviewDecision::Approve,
            item_decisions: vec![ReturnItemDecision {
                product_id: product,
                quantity: 2,
                approve: true,
            }],
            notes: None,
            actor: admin_actor(),
        })
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let after = app
        .services
        .returns
        .get_return(ret.return_request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.return_request.status, "pending_approval");
    assert_eq!(after.items[0].status, "pending");

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
async fn restock_return_requires_an_existing_stock_record() {
    let app = spawn_app().await;
    let branch = Uuid::new_v4();

    let result = app
        .services
        .returns
        .create_return(CreateReturnCommand {
            kind: ReturnKind::Restock,
            order_id: None,
            sale_id: None,
            branch_id: branch,
            items: vec![return_line(Uuid::new_v4(), 1)],
            actor: admin_actor(),
        })
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn reviewers_are_confined_to_their_branch() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 50).await;

    let ret = create_restock_return(&app, branch, vec![return_line(product, 3)]).await;

    let outsider = branch_actor(Uuid::new_v4());
    let result = app
        .services
        .returns
        .review_return(ReviewReturnCommand {
            return_id: ret.return_request.id,
            decision: ReviewDecision::Approve,
            item_decisions: vec![],
            notes: None,
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
async fn delivery_return_debits_stock_at_creation() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 50).await;
    let order = seed_delivered_order(&app, branch, &[(product, 5, dec!(8))], 1).await;

    let ret = app
        .services
        .returns
        .create_return(CreateReturnCommand {
            kind: ReturnKind::Delivery,
            order_id: Some(order.id),
            sale_id: None,
            branch_id: branch,
            items: vec![return_line(product, 2)],
            actor: admin_actor(),
        })
        .await
        .unwrap();

    let record = app
        .services
        .inventory
        .get_stock(product, branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.current_stock, 8);

    let (entries, _) = app
        .services
        .history
        .query(
            HistoryQuery {
                product_id: Some(product),
                action: Some(HistoryAction::ReturnPending),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quantity, -2);
    assert_eq!(entries[0].reference, ret.return_request.return_number);
}

#[tokio::test]
async fn delivery_return_gates_on_order_state_and_window() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 50).await;

    // Outside the 3-day window.
    let stale_order = seed_delivered_order(&app, branch, &[(product, 5, dec!(8))], 5).await;
    let result = app
        .services
        .returns
        .create_return(CreateReturnCommand {
            kind: ReturnKind::Delivery,
            order_id: Some(stale_order.id),
            sale_id: None,
            branch_id: branch,
            items: vec![return_line(product, 2)],
            actor: admin_actor(),
        })
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    // Quantity above the ordered quantity.
    let order = seed_delivered_order(&app, branch, &[(product, 2, dec!(8))], 1).await;
    let result = app
        .services
        .returns
        .create_return(CreateReturnCommand {
            kind: ReturnKind::Delivery,
            order_id: Some(order.id),
            sale_id: None,
            branch_id: branch,
            items: vec![return_line(product, 3)],
            actor: admin_actor(),
        })
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    // Product not on the order at all.
    let result = app
        .services
        .returns
        .create_return(CreateReturnCommand {
            kind: ReturnKind::Delivery,
            order_id: Some(order.id),
            sale_id: None,
            branch_id: branch,
            items: vec![return_line(Uuid::new_v4(), 1)],
            actor: admin_actor(),
        })
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    // Missing order reference entirely.
    let result = app
        .services
        .returns
        .create_return(CreateReturnCommand {
            kind: ReturnKind::Delivery,
            order_id: None,
            sale_id: None,
            branch_id: branch,
            items: vec![return_line(product, 1)],
            actor: admin_actor(),
        })
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    // None of the failed attempts moved stock.
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
async fn approving_a_delivery_return_settles_the_order_total() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 50).await;
    // Order total 40 (5 x 8).
    let order = seed_delivered_order(&app, branch, &[(product, 5, dec!(8))], 1).await;

    let ret = app
        .services
        .returns
        .create_return(CreateReturnCommand {
            kind: ReturnKind::Delivery,
            order_id: Some(order.id),
            sale_id: None,
            branch_id: branch,
            items: vec![return_line(product, 2)],
            actor: admin_actor(),
        })
        .await
        .unwrap();

    let reviewed = app
        .services
        .returns
        .review_return(ReviewReturnCommand {
            return_id: ret.return_request.id,
            decision: ReviewDecision::Approve,
            item_decisions: vec![],
            notes: None,
            actor: admin_actor(),
        })
        .await
        .unwrap();
    assert_eq!(reviewed.return_request.status, "approved");

    // Refund 2 x 8 = 16 against the 40 total; approval credits no stock
    // back, the goods already left toward the supplier.
    let order_after = stockledger_api::entities::order::Entity::find_by_id(order.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order_after.total_amount, dec!(24));
    assert!(order_after
        .notes
        .as_deref()
        .unwrap()
        .contains(&ret.return_request.return_number));

    let record = app
        .services
        .inventory
        .get_stock(product, branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.current_stock, 8);
}

#[tokio::test]
async fn order_total_is_floored_at_zero() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 50).await;
    let order = seed_delivered_order(&app, branch, &[(product, 5, dec!(8))], 1).await;

    // Shrink the order total below the refund that approval will compute.
    {
        use sea_orm::{ActiveModelTrait, Set};
        let mut active: stockledger_api::entities::order::ActiveModel = order.clone().into();
        active.total_amount = Set(dec!(10));
        active.update(app.state.db.as_ref()).await.unwrap();
    }

    let ret = app
        .services
        .returns
        .create_return(CreateReturnCommand {
            kind: ReturnKind::Delivery,
            order_id: Some(order.id),
            sale_id: None,
            branch_id: branch,
            items: vec![return_line(product, 4)],
            actor: admin_actor(),
        })
        .await
        .unwrap();

    app.services
        .returns
        .review_return(ReviewReturnCommand {
            return_id: ret.return_request.id,
            decision: ReviewDecision::Approve,
            item_decisions: vec![],
            notes: None,
            actor: admin_actor(),
        })
        .await
        .unwrap();

    let order_after = stockledger_api::entities::order::Entity::find_by_id(order.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    // Refund would be 32; the total clamps at zero instead of going negative.
    assert_eq!(order_after.total_amount, dec!(0));
}

#[tokio::test]
async fn return_events_are_emitted_after_commit() {
    let mut app = spawn_app().await;
    let product = Uuid::new_v4();
    let branch = Uuid::new_v4();
    seed_stock(&app, product, branch, 10, 0, 50).await;
    drain_events(&mut app);

    let ret = create_restock_return(&app, branch, vec![return_line(product, 3)]).await;
    let creation_events = drain_events(&mut app);
    assert_eq!(creation_events.len(), 1);
    assert_matches!(&creation_events[0], Event::ReturnCreated { .. });

    app.services
        .returns
        .review_return(ReviewReturnCommand {
            return_id: ret.return_request.id,
            decision: ReviewDecision::Approve,
            item_decisions: vec![],
            notes: None,
            actor: admin_actor(),
        })
        .await
        .unwrap();

    let review_events = drain_events(&mut app);
    assert_eq!(review_events.len(), 2);
    assert_matches!(
        &review_events[0],
        Event::ReturnStatusUpdated { status, .. } if status.as_str() == "approved"
    );
    assert_matches!(
        &review_events[1],
        Event::StockChanged { new_quantity: 13, .. }
    );
}
