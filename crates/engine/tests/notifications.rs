mod common;

use engine::{Money, NotificationKind, TransferCmd};

use common::{ctx, engine_with_db, funded_user};

#[tokio::test]
async fn outbox_is_drained_once() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 10_000).await;
    funded_user(&engine, "bob", 0).await;

    let transfer = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(1_000)))
        .await
        .unwrap();
    engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap();

    let pending = engine.undelivered_notifications(100).await.unwrap();
    let kinds: Vec<_> = pending.iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        [
            NotificationKind::BalanceAdjusted,
            NotificationKind::TransferSent,
            NotificationKind::TransferReceived,
        ]
    );
    assert!(pending.iter().all(|n| n.delivered_at.is_none()));
    assert_eq!(pending[2].user_id, "bob");
    assert_eq!(pending[2].metadata["reference"], transfer.reference.to_string());

    let ids: Vec<i64> = pending.iter().map(|n| n.id).collect();
    assert_eq!(engine.mark_notifications_delivered(&ids).await.unwrap(), 3);
    assert_eq!(engine.mark_notifications_delivered(&ids).await.unwrap(), 0);
    assert!(engine.undelivered_notifications(100).await.unwrap().is_empty());

    let bob = engine.notifications_for("bob").await.unwrap();
    assert_eq!(bob.len(), 1);
    assert!(bob[0].delivered_at.is_some());
}

#[tokio::test]
async fn rolled_back_operations_leave_no_notification() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 100).await;

    let err = engine
        .adjust_balance(&ctx(), "alice", Money::major(-500), "too much")
        .await;
    assert!(err.is_err());

    let alice = engine.notifications_for("alice").await.unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].kind, NotificationKind::BalanceAdjusted);
}

#[tokio::test]
async fn undelivered_batch_respects_the_limit() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 100).await;
    for _ in 0..4 {
        engine
            .adjust_balance(&ctx(), "alice", Money::major(1), "bonus")
            .await
            .unwrap();
    }

    let first = engine.undelivered_notifications(2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(first[0].id < first[1].id);
}
