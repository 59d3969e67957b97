mod common;

use chrono::{Duration, Utc};
use engine::{
    AuditAction, AuditSubject, EngineError, Money, NotificationKind, TransferCmd, TransferStatus,
};

use common::{ctx, engine_with_db, funded_user, update_config};

#[tokio::test]
async fn transfer_of_5000_charges_minimum_commission() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 10_000).await;
    funded_user(&engine, "bob", 1_000).await;

    let transfer = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(5_000)))
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::Pending);
    assert_eq!(transfer.commission, Money::major(100));

    let done = engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap();
    assert_eq!(done.status, TransferStatus::Completed);
    assert!(done.processed_at.is_some());

    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(4_900)
    );
    assert_eq!(
        engine.wallet("bob").await.unwrap().balance,
        Money::major(6_000)
    );

    let kinds: Vec<_> = engine
        .notifications_for("bob")
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert!(kinds.contains(&NotificationKind::TransferReceived));

    let trail = engine
        .audit_trail(AuditSubject::Transfer(transfer.reference))
        .await
        .unwrap();
    let actions: Vec<_> = trail.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        [
            AuditAction::TransferCreated.as_str(),
            AuditAction::TransferCompleted.as_str()
        ]
    );
}

#[tokio::test]
async fn commission_is_frozen_at_creation() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 20_000).await;
    funded_user(&engine, "bob", 0).await;

    let transfer = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(10_000)))
        .await
        .unwrap();
    update_config(&engine, |c| c.transfer_commission_min = Money::major(500)).await;

    engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap();
    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(9_900)
    );
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_any_write() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 10_000).await;
    funded_user(&engine, "bob", 0).await;

    let err = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "alice", Money::major(2_000)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(999)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "ghost", Money::major(2_000)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    let stats = engine.wallet_statistics("alice").await.unwrap();
    assert_eq!(stats.transfers_sent, 0);
}

#[tokio::test]
async fn amount_plus_commission_cannot_overflow() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 10_000).await;
    funded_user(&engine, "bob", 0).await;

    let err = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::new(i64::MAX)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(engine.wallet_statistics("alice").await.unwrap().transfers_sent, 0);
    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(10_000)
    );
}

#[tokio::test]
async fn insufficient_funds_marks_transfer_failed() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 2_000).await;
    funded_user(&engine, "bob", 0).await;

    let transfer = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(2_000)))
        .await
        .unwrap();
    let err = engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));

    let failed = engine.transfer(transfer.reference).await.unwrap();
    assert_eq!(failed.status, TransferStatus::Failed);
    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(2_000)
    );
    assert_eq!(engine.wallet("bob").await.unwrap().balance, Money::ZERO);

    let trail = engine
        .audit_trail(AuditSubject::Transfer(transfer.reference))
        .await
        .unwrap();
    let last = trail.last().unwrap();
    assert_eq!(last.action, AuditAction::TransferFailed.as_str());
    assert!(last.error.is_some());

    let notified = engine.notifications_for("alice").await.unwrap();
    assert!(
        notified
            .iter()
            .any(|n| n.kind == NotificationKind::TransferFailed && n.important)
    );
}

#[tokio::test]
async fn processing_twice_is_rejected_without_side_effects() {
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
    let wallet_audits = engine.reconcile_wallet("alice").await.unwrap().entries;

    let err = engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition(_)));

    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(8_900)
    );
    assert_eq!(
        engine.reconcile_wallet("alice").await.unwrap().entries,
        wallet_audits
    );
    assert_eq!(
        engine.transfer(transfer.reference).await.unwrap().status,
        TransferStatus::Completed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transfers_never_double_spend() {
    const N: i64 = 8;
    let (engine, _db) = engine_with_db().await;
    // Each transfer costs 1000 + 100 commission; funds cover N - 1 of them.
    funded_user(&engine, "alice", (N - 1) * 1_100).await;
    funded_user(&engine, "bob", 0).await;

    let mut references = Vec::new();
    for _ in 0..N {
        let transfer = engine
            .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(1_000)))
            .await
            .unwrap();
        references.push(transfer.reference);
    }

    let mut tasks = tokio::task::JoinSet::new();
    for reference in references {
        let engine = engine.clone();
        tasks.spawn(async move { engine.process_transfer(&ctx(), reference).await });
    }

    let mut completed = 0;
    let mut insufficient = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => completed += 1,
            Err(EngineError::InsufficientFunds(_)) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(completed, N - 1);
    assert_eq!(insufficient, 1);

    assert_eq!(engine.wallet("alice").await.unwrap().balance, Money::ZERO);
    assert_eq!(
        engine.wallet("bob").await.unwrap().balance,
        Money::major((N - 1) * 1_000)
    );
    assert!(engine.reconcile_wallet("alice").await.unwrap().is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_transfers_do_not_deadlock() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 50_000).await;
    funded_user(&engine, "bob", 50_000).await;

    let mut references = Vec::new();
    for i in 0..6 {
        let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
        let transfer = engine
            .create_transfer(&ctx(), TransferCmd::new(from, to, Money::major(1_000)))
            .await
            .unwrap();
        references.push(transfer.reference);
    }

    let mut tasks = tokio::task::JoinSet::new();
    for reference in references {
        let engine = engine.clone();
        tasks.spawn(async move { engine.process_transfer(&ctx(), reference).await });
    }
    let outcome = tokio::time::timeout(std::time::Duration::from_secs(30), async {
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }
    })
    .await;
    assert!(outcome.is_ok(), "transfers did not finish");

    let alice = engine.wallet("alice").await.unwrap().balance;
    let bob = engine.wallet("bob").await.unwrap().balance;
    assert_eq!(alice, Money::major(50_000 - 300));
    assert_eq!(bob, Money::major(50_000 - 300));
}

#[tokio::test]
async fn daily_transfer_limit_fails_the_transfer() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 100_000).await;
    funded_user(&engine, "bob", 0).await;
    update_config(&engine, |c| c.daily_transfer_limit = Money::major(5_000)).await;

    let first = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(4_000)))
        .await
        .unwrap();
    engine
        .process_transfer(&ctx(), first.reference)
        .await
        .unwrap();

    let second = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(1_500)))
        .await
        .unwrap();
    let err = engine
        .process_transfer(&ctx(), second.reference)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DailyLimitExceeded(_)));
    assert_eq!(
        engine.transfer(second.reference).await.unwrap().status,
        TransferStatus::Failed
    );
}

#[tokio::test]
async fn daily_operation_count_is_enforced_at_creation() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 100_000).await;
    funded_user(&engine, "bob", 0).await;
    update_config(&engine, |c| c.max_daily_operations = 2).await;

    for _ in 0..2 {
        engine
            .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(1_000)))
            .await
            .unwrap();
    }
    let err = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(1_000)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DailyLimitExceeded(_)));
}

#[tokio::test]
async fn scheduled_transfer_waits_for_its_time() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 10_000).await;
    funded_user(&engine, "bob", 0).await;

    let at = Utc::now() + Duration::hours(2);
    let transfer = engine
        .create_transfer(
            &ctx(),
            TransferCmd::new("alice", "bob", Money::major(1_000)).execute_at(at),
        )
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::Scheduled);

    let err = engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition(_)));
    assert_eq!(
        engine.transfer(transfer.reference).await.unwrap().status,
        TransferStatus::Scheduled
    );

    assert!(
        engine
            .due_scheduled_transfers(Utc::now(), 10)
            .await
            .unwrap()
            .is_empty()
    );
    let due = engine
        .due_scheduled_transfers(at + Duration::seconds(1), 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].reference, transfer.reference);
}

#[tokio::test]
async fn schedule_transfer_moves_pending_to_scheduled() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 10_000).await;
    funded_user(&engine, "bob", 0).await;

    let transfer = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(1_000)))
        .await
        .unwrap();
    let at = Utc::now() + Duration::minutes(30);
    let trigger = engine
        .schedule_transfer(&ctx(), transfer.reference, at)
        .await
        .unwrap();
    assert_eq!(trigger.reference, transfer.reference);
    assert_eq!(trigger.execute_at, at);

    let err = engine
        .schedule_transfer(&ctx(), transfer.reference, at)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition(_)));

    let err = engine
        .schedule_transfer(&ctx(), transfer.reference, Utc::now() - Duration::minutes(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn large_transfer_needs_verification_code() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 100_000).await;
    funded_user(&engine, "bob", 0).await;

    let transfer = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(50_000)))
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::PendingVerification);
    let code = transfer.verification_code.clone().unwrap();
    assert_eq!(code.len(), 6);

    let notice = engine.notifications_for("alice").await.unwrap();
    assert!(notice.iter().any(|n| n.kind == NotificationKind::VerificationRequired));

    let err = engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition(_)));

    let wrong = if code == "000000" { "111111" } else { "000000" };
    let err = engine
        .verify_transfer(&ctx(), transfer.reference, wrong)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::PinIncorrect { remaining: 2 });

    let verified = engine
        .verify_transfer(&ctx(), transfer.reference, &code)
        .await
        .unwrap();
    assert_eq!(verified.status, TransferStatus::Pending);
    engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap();
    assert_eq!(
        engine.wallet("bob").await.unwrap().balance,
        Money::major(50_000)
    );
}

#[tokio::test]
async fn exhausted_verification_fails_the_transfer() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 100_000).await;
    funded_user(&engine, "bob", 0).await;

    let transfer = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(60_000)))
        .await
        .unwrap();
    let code = transfer.verification_code.clone().unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    for remaining in [2, 1, 0] {
        let err = engine
            .verify_transfer(&ctx(), transfer.reference, wrong)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::PinIncorrect { remaining });
    }
    assert_eq!(
        engine.transfer(transfer.reference).await.unwrap().status,
        TransferStatus::Failed
    );

    let err = engine
        .verify_transfer(&ctx(), transfer.reference, &code)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition(_)));
}

#[tokio::test]
async fn revert_restores_both_wallets() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 10_000).await;
    funded_user(&engine, "bob", 0).await;

    let transfer = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(3_000)))
        .await
        .unwrap();
    engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap();

    let reverted = engine
        .revert_transfer(&ctx(), transfer.reference, "disputed")
        .await
        .unwrap();
    assert_eq!(reverted.status, TransferStatus::Reverted);
    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(10_000)
    );
    assert_eq!(engine.wallet("bob").await.unwrap().balance, Money::ZERO);

    let err = engine
        .revert_transfer(&ctx(), transfer.reference, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition(_)));
}

#[tokio::test]
async fn revert_needs_receiver_funds() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 10_000).await;
    funded_user(&engine, "bob", 0).await;

    let transfer = engine
        .create_transfer(&ctx(), TransferCmd::new("alice", "bob", Money::major(3_000)))
        .await
        .unwrap();
    engine
        .process_transfer(&ctx(), transfer.reference)
        .await
        .unwrap();
    engine
        .adjust_balance(&ctx(), "bob", Money::major(-2_500), "withdrawal")
        .await
        .unwrap();

    let err = engine
        .revert_transfer(&ctx(), transfer.reference, "disputed")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(
        engine.transfer(transfer.reference).await.unwrap().status,
        TransferStatus::Completed
    );
}
