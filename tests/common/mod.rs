#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as Days, NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use rentstock_api::{
    config::AppConfig,
    db,
    entities::{item, reservation_item},
    events::{process_events, EventSender},
    identity::{Actor, IdentityProvider, Role, StaticIdentityProvider},
    notifications::LogNotifier,
    services::item_locks::ItemLockRegistry,
    services::reservations::{LineRequest, ReservationService},
};

/// Test harness over an in-memory SQLite database. A single pooled
/// connection keeps every task on the same in-memory database.
pub struct TestApp {
    pub db: Arc<db::DbPool>,
    pub service: ReservationService,
    pub locks: Arc<ItemLockRegistry>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(5)).await
    }

    pub async fn with_lock_timeout(lock_wait: Duration) -> Self {
        let cfg = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            db_min_connections: 1,
            ..Default::default()
        };

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("db connect");
        db::run_migrations(&pool).await.expect("migrations");

        let db_arc = Arc::new(pool);
        let (tx, rx) = mpsc::channel(64);
        let event_sender = EventSender::new(tx);
        let identity: Arc<dyn IdentityProvider> = Arc::new(StaticIdentityProvider::default());
        let event_task = tokio::spawn(process_events(rx, identity, Arc::new(LogNotifier)));

        let locks = Arc::new(ItemLockRegistry::new(lock_wait));
        let service = ReservationService::new(
            db_arc.clone(),
            Some(Arc::new(event_sender)),
            locks.clone(),
        );

        Self {
            db: db_arc,
            service,
            locks,
            _event_task: event_task,
        }
    }

    /// Inserts a rentable item with the given total, fully in storage.
    pub async fn seed_item(&self, total_quantity: i32) -> Uuid {
        let id = Uuid::new_v4();
        item::ActiveModel {
            id: Set(id),
            name: Set(format!("test item {}", id)),
            location_id: Set(Uuid::new_v4()),
            total_quantity: Set(total_quantity),
            quantity_in_storage: Set(total_quantity),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed item");
        id
    }

    /// Overrides the physical ledger directly, simulating shrinkage or a
    /// manual stock correction outside the service layer.
    pub async fn set_in_storage(&self, item_id: Uuid, quantity: i32) {
        let item = item::Entity::find_by_id(item_id)
            .one(&*self.db)
            .await
            .expect("query item")
            .expect("item exists");

        let mut active: item::ActiveModel = item.into();
        active.quantity_in_storage = Set(quantity);
        active.update(&*self.db).await.expect("set storage");
    }

    pub async fn in_storage(&self, item_id: Uuid) -> i32 {
        item::Entity::find_by_id(item_id)
            .one(&*self.db)
            .await
            .expect("query item")
            .expect("item exists")
            .quantity_in_storage
    }

    /// Moves a line's rental window back so its pickup window is open
    /// today, without going through the service layer.
    pub async fn backdate_line(&self, line_id: Uuid, days_back: i64) {
        let line = reservation_item::Entity::find_by_id(line_id)
            .one(&*self.db)
            .await
            .expect("query line")
            .expect("line exists");

        let shift = Days::days(days_back);
        let mut active: reservation_item::ActiveModel = line.clone().into();
        active.start_date = Set(line.start_date - shift);
        active.end_date = Set(line.end_date - shift);
        active.update(&*self.db).await.expect("backdate line");
    }
}

pub fn member() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Member)
}

pub fn admin() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Admin)
}

pub fn manager() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Manager)
}

pub fn days_from_now(days: i64) -> NaiveDate {
    Utc::now().date_naive() + Days::days(days)
}

pub fn line(item_id: Uuid, quantity: i32, start_in: i64, end_in: i64) -> LineRequest {
    LineRequest {
        item_id,
        quantity,
        start_date: days_from_now(start_in),
        end_date: days_from_now(end_in),
    }
}
