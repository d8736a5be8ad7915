use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use stockledger_api::{
    auth::Actor,
    commands::inventory::CreateStockRecordCommand,
    config::AppConfig,
    db,
    entities::{order, order_item, stock_record},
    events::Event,
    AppServices, AppState,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Helper harness spinning up the engine over a private in-memory
/// SQLite database with migrations applied.
pub struct TestApp {
    pub state: AppState,
    pub services: AppServices,
    pub events: mpsc::Receiver<Event>,
}

pub async fn spawn_app() -> TestApp {
    // A named shared-cache memory database so every pooled connection
    // sees the same data, while each test keeps its own database.
    let url = format!(
        "sqlite:file:stockledger_test_{}?mode=memory&cache=shared",
        Uuid::new_v4().simple()
    );

    let pool = db::establish_connection(&url)
        .await
        .expect("Failed to create DB pool");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let config = AppConfig {
        database_url: url,
        environment: "test".to_string(),
        log_level: "warn".to_string(),
        db_max_connections: 5,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_idle_timeout_secs: 60,
        db_acquire_timeout_secs: 5,
        event_buffer_size: 64,
    };

    let (state, services, events) = AppState::new(Arc::new(pool), config);
    TestApp {
        state,
        services,
        events,
    }
}

#[allow(dead_code)]
pub fn admin_actor() -> Actor {
    Actor::unscoped(Uuid::new_v4(), "test-admin")
}

#[allow(dead_code)]
pub fn branch_actor(branch_id: Uuid) -> Actor {
    Actor::scoped(Uuid::new_v4(), "test-clerk", branch_id)
}

#[allow(dead_code)]
pub async fn seed_stock(
    app: &TestApp,
    product_id: Uuid,
    branch_id: Uuid,
    initial_stock: i32,
    min: i32,
    max: i32,
) -> stock_record::Model {
    app.services
        .inventory
        .create_stock_record(CreateStockRecordCommand {
            product_id,
            branch_id,
            initial_stock,
            min_stock_level: min,
            max_stock_level: max,
            reference: None,
            actor: admin_actor(),
        })
        .await
        .expect("Failed to seed stock record")
}

/// Inserts a delivered order with one line per (product, quantity,
/// unit_price), delivered `delivered_days_ago` days in the past.
#[allow(dead_code)]
pub async fn seed_delivered_order(
    app: &TestApp,
    branch_id: Uuid,
    lines: &[(Uuid, i32, Decimal)],
    delivered_days_ago: i64,
) -> order::Model {
    let db = app.state.db.as_ref();
    let now = Utc::now();
    let order_id = Uuid::new_v4();
    let total: Decimal = lines
        .iter()
        .map(|(_, qty, price)| *price * Decimal::from(*qty))
        .sum();

    let order_model = order::ActiveModel {
        id: Set(order_id),
        order_number: Set(format!("ORD-{}", Uuid::new_v4().simple())),
        branch_id: Set(branch_id),
        status: Set("delivered".to_string()),
        total_amount: Set(total),
        delivered_at: Set(Some(now - Duration::days(delivered_days_ago))),
        notes: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let order_model = order_model.insert(db).await.expect("Failed to seed order");

    for (product_id, quantity, unit_price) in lines {
        let line = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(*product_id),
            quantity: Set(*quantity),
            unit_price: Set(*unit_price),
        };
        line.insert(db).await.expect("Failed to seed order line");
    }

    order_model
}

/// Drains every event currently buffered on the channel.
#[allow(dead_code)]
pub fn drain_events(app: &mut TestApp) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = app.events.try_recv() {
        events.push(event);
    }
    events
}
