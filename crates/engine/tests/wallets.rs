mod common;

use sea_orm::{ConnectionTrait, Statement};

use engine::{AuditAction, AuditSubject, EngineError, Money, SystemConfig};

use common::{ctx, engine_with_db, funded_user};

#[tokio::test]
async fn create_user_opens_an_empty_wallet() {
    let (engine, _db) = engine_with_db().await;

    let wallet = engine.create_user(&ctx(), "alice").await.unwrap();
    assert_eq!(wallet.user_id, "alice");
    assert_eq!(wallet.balance, Money::ZERO);
    assert_eq!(wallet.held_balance, Money::ZERO);

    let stored = engine.wallet("alice").await.unwrap();
    assert_eq!(stored.id, wallet.id);
}

#[tokio::test]
async fn create_user_rejects_duplicates_and_blank_names() {
    let (engine, _db) = engine_with_db().await;
    engine.create_user(&ctx(), "alice").await.unwrap();

    let err = engine.create_user(&ctx(), " alice ").await.unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("alice".to_string()));

    let err = engine.create_user(&ctx(), "   ").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn unknown_user_has_no_wallet() {
    let (engine, _db) = engine_with_db().await;
    let err = engine.wallet("ghost").await.unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn adjust_balance_credits_and_debits_with_audit() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 1_000).await;

    let wallet = engine
        .adjust_balance(&ctx(), "alice", Money::major(-250), "correction")
        .await
        .unwrap();
    assert_eq!(wallet.balance, Money::major(750));

    let trail = engine
        .audit_trail(AuditSubject::Wallet(wallet.id))
        .await
        .unwrap();
    assert_eq!(trail.len(), 2);
    let last = trail.last().unwrap();
    assert_eq!(last.action, AuditAction::BalanceAdjusted.as_str());
    assert_eq!(last.actor, "tester");
    assert_eq!(last.request_id.as_deref(), Some("test"));
    assert_eq!(last.before_state.unwrap().balance, Money::major(1_000));
    assert_eq!(last.after_state.unwrap().balance, Money::major(750));
    assert_eq!(last.details["reason"], "correction");
}

#[tokio::test]
async fn adjust_balance_rejects_overdraft_and_zero() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 100).await;

    let err = engine
        .adjust_balance(&ctx(), "alice", Money::major(-101), "too much")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));

    let err = engine
        .adjust_balance(&ctx(), "alice", Money::ZERO, "nothing")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(100)
    );
}

#[tokio::test]
async fn reconcile_replays_the_audit_chain() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 10_000).await;
    funded_user(&engine, "bob", 0).await;

    let transfer = engine
        .create_transfer(
            &ctx(),
            engine::TransferCmd::new("alice", "bob", Money::major(2_000)),
        )
        .await
        .unwrap();
    engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap();
    engine
        .create_hold(
            &ctx(),
            engine::HoldCmd::new("alice", Money::major(1_000), "deposit"),
        )
        .await
        .unwrap();

    let report = engine.reconcile_wallet("alice").await.unwrap();
    assert!(report.is_consistent(), "{report:?}");
    assert_eq!(report.entries, 3);
    assert_eq!(report.stored.balance, Money::major(7_900));
    assert_eq!(report.stored.held_balance, Money::major(1_000));

    let bob = engine.reconcile_wallet("bob").await.unwrap();
    assert!(bob.is_consistent());
    assert_eq!(bob.stored.balance, Money::major(2_000));
}

#[tokio::test]
async fn statistics_count_completed_operations() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 10_000).await;
    funded_user(&engine, "bob", 0).await;

    for _ in 0..2 {
        let transfer = engine
            .create_transfer(
                &ctx(),
                engine::TransferCmd::new("alice", "bob", Money::major(1_000)),
            )
            .await
            .unwrap();
        engine
            .process_transfer(&ctx(), transfer.reference)
            .await
            .unwrap();
    }

    let alice = engine.wallet_statistics("alice").await.unwrap();
    assert_eq!(alice.transfers_sent, 2);
    assert_eq!(alice.transfers_received, 0);
    assert_eq!(alice.max_balance, Money::major(10_000));

    let bob = engine.wallet_statistics("bob").await.unwrap();
    assert_eq!(bob.transfers_received, 2);
    assert_eq!(bob.max_balance, Money::major(2_000));
}

#[tokio::test]
async fn config_defaults_are_seeded_and_updates_validated() {
    let (engine, _db) = engine_with_db().await;

    let config = engine.system_config().await.unwrap();
    assert_eq!(config, SystemConfig::default());

    let mut bad = config.clone();
    bad.max_verification_attempts = 0;
    let err = engine.update_config(&ctx(), bad).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let mut next = config;
    next.max_daily_operations = 25;
    engine.update_config(&ctx(), next.clone()).await.unwrap();
    assert_eq!(engine.system_config().await.unwrap(), next);
}

#[tokio::test]
async fn config_update_records_who_changed_it() {
    let (engine, db) = engine_with_db().await;

    let mut next = engine.system_config().await.unwrap();
    next.default_hold_days = 7;
    engine
        .update_config(&engine::OpContext::new("ops-lead"), next)
        .await
        .unwrap();

    let row = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            "SELECT updated_by, default_hold_days FROM system_config".to_string(),
        ))
        .await
        .unwrap()
        .unwrap();
    let updated_by: Option<String> = row.try_get("", "updated_by").unwrap();
    let days: i32 = row.try_get("", "default_hold_days").unwrap();
    assert_eq!(updated_by.as_deref(), Some("ops-lead"));
    assert_eq!(days, 7);
}
