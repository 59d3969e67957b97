#![allow(dead_code)]

use sea_orm::{Database, DatabaseConnection};

use engine::{Engine, Money, OpContext, SystemConfig};
use migration::MigratorTrait;

pub async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

pub fn ctx() -> OpContext {
    OpContext::new("tester").request_id("test")
}

/// Creates `username` and credits `balance` major units to its wallet.
pub async fn funded_user(engine: &Engine, username: &str, balance: i64) {
    engine.create_user(&ctx(), username).await.unwrap();
    if balance > 0 {
        engine
            .adjust_balance(&ctx(), username, Money::major(balance), "opening balance")
            .await
            .unwrap();
    }
}

pub async fn update_config(engine: &Engine, change: impl FnOnce(&mut SystemConfig)) {
    let mut config = engine.system_config().await.unwrap();
    change(&mut config);
    engine.update_config(&ctx(), config).await.unwrap();
}
