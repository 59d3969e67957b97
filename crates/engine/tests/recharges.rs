mod common;

use engine::{
    AgentCmd, AuditAction, AuditSubject, Engine, EngineError, Money, NotificationKind,
    RechargeCmd, RechargeStatus,
};
use serde_json::json;
use uuid::Uuid;

use common::{ctx, engine_with_db, funded_user, update_config};

async fn agent_of(engine: &Engine, user: &str) -> Uuid {
    funded_user(engine, user, 0).await;
    if engine.agency("AG1").await.is_err() {
        engine.create_agency(&ctx(), "AG1", "Main street").await.unwrap();
    }
    engine
        .create_agent(&ctx(), AgentCmd::new(user, "AG1", format!("A-{user}")))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn recharge_of_10000_splits_agent_commission() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 0).await;
    let agent = agent_of(&engine, "carol").await;

    let recharge = engine
        .create_recharge(
            &ctx(),
            RechargeCmd::new("alice", Money::major(10_000), "cash")
                .payment_data(json!({ "receipt": "R-1" })),
        )
        .await
        .unwrap();
    assert_eq!(recharge.status, RechargeStatus::Pending);
    assert_eq!(recharge.agent_commission, Money::major(100));
    assert_eq!(recharge.net_amount, Money::major(9_900));

    let done = engine
        .process_recharge(&ctx(), recharge.reference, agent)
        .await
        .unwrap();
    assert_eq!(done.status, RechargeStatus::Completed);
    assert_eq!(done.agent_id, Some(agent));
    assert!(done.processed_at.is_some());
    assert_eq!(done.payment_data["receipt"], "R-1");

    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(9_900)
    );
    assert_eq!(
        engine.wallet("carol").await.unwrap().balance,
        Money::major(100)
    );
    assert_eq!(
        engine.agent(agent).await.unwrap().accumulated_commission,
        Money::major(100)
    );

    let alice_kinds: Vec<_> = engine
        .notifications_for("alice")
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert!(alice_kinds.contains(&NotificationKind::RechargeCompleted));
    let carol_kinds: Vec<_> = engine
        .notifications_for("carol")
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert!(carol_kinds.contains(&NotificationKind::CommissionEarned));

    let agent_trail = engine.audit_trail(AuditSubject::Agent(agent)).await.unwrap();
    assert_eq!(
        agent_trail.last().unwrap().action,
        AuditAction::CommissionEarned.as_str()
    );
}

#[tokio::test]
async fn recharge_split_is_frozen_at_creation() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 0).await;
    let agent = agent_of(&engine, "carol").await;

    let recharge = engine
        .create_recharge(&ctx(), RechargeCmd::new("alice", Money::major(10_000), "cash"))
        .await
        .unwrap();
    update_config(&engine, |c| c.agent_commission_pct = engine::Percent::whole(5)).await;

    engine
        .process_recharge(&ctx(), recharge.reference, agent)
        .await
        .unwrap();
    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(9_900)
    );
    assert_eq!(
        engine.wallet("carol").await.unwrap().balance,
        Money::major(100)
    );
}

#[tokio::test]
async fn processing_a_completed_recharge_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 0).await;
    let agent = agent_of(&engine, "carol").await;

    let recharge = engine
        .create_recharge(&ctx(), RechargeCmd::new("alice", Money::major(2_000), "card"))
        .await
        .unwrap();
    engine
        .process_recharge(&ctx(), recharge.reference, agent)
        .await
        .unwrap();

    let err = engine
        .process_recharge(&ctx(), recharge.reference, agent)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition(_)));
    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(1_980)
    );
    assert_eq!(
        engine.recharge(recharge.reference).await.unwrap().status,
        RechargeStatus::Completed
    );
}

#[tokio::test]
async fn daily_recharge_limit_rejects_the_recharge() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 0).await;
    let agent = agent_of(&engine, "carol").await;
    update_config(&engine, |c| c.daily_recharge_limit = Money::major(15_000)).await;

    let first = engine
        .create_recharge(&ctx(), RechargeCmd::new("alice", Money::major(10_000), "cash"))
        .await
        .unwrap();
    engine
        .process_recharge(&ctx(), first.reference, agent)
        .await
        .unwrap();

    let second = engine
        .create_recharge(&ctx(), RechargeCmd::new("alice", Money::major(10_000), "cash"))
        .await
        .unwrap();
    let err = engine
        .process_recharge(&ctx(), second.reference, agent)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DailyLimitExceeded(_)));

    let rejected = engine.recharge(second.reference).await.unwrap();
    assert_eq!(rejected.status, RechargeStatus::Rejected);
    assert_eq!(
        engine.wallet("alice").await.unwrap().balance,
        Money::major(9_900)
    );
    let notified = engine.notifications_for("alice").await.unwrap();
    assert!(
        notified
            .iter()
            .any(|n| n.kind == NotificationKind::RechargeFailed)
    );
    let trail = engine
        .audit_trail(AuditSubject::Recharge(second.reference))
        .await
        .unwrap();
    assert_eq!(
        trail.last().unwrap().action,
        AuditAction::RechargeRejected.as_str()
    );
}

#[tokio::test]
async fn dispatched_recharge_is_picked_up_by_the_worker() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 0).await;
    let agent = agent_of(&engine, "carol").await;

    let recharge = engine
        .create_recharge(&ctx(), RechargeCmd::new("alice", Money::major(5_000), "transfer"))
        .await
        .unwrap();
    let dispatched = engine
        .dispatch_recharge(&ctx(), recharge.reference)
        .await
        .unwrap();
    assert_eq!(dispatched.status, RechargeStatus::InProgress);

    let err = engine
        .dispatch_recharge(&ctx(), recharge.reference)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition(_)));

    let queue = engine.recharges_in_progress(10).await.unwrap();
    assert_eq!(queue.len(), 1);
    let picked = engine.first_active_agent().await.unwrap().unwrap();
    assert_eq!(picked.id, agent);

    engine
        .process_recharge(&ctx(), queue[0].reference, picked.id)
        .await
        .unwrap();
    assert!(engine.recharges_in_progress(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn reject_recharge_is_terminal() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 0).await;
    let agent = agent_of(&engine, "carol").await;

    let recharge = engine
        .create_recharge(&ctx(), RechargeCmd::new("alice", Money::major(5_000), "cash"))
        .await
        .unwrap();
    let rejected = engine
        .reject_recharge(&ctx(), recharge.reference, "payment bounced")
        .await
        .unwrap();
    assert_eq!(rejected.status, RechargeStatus::Rejected);

    let err = engine
        .process_recharge(&ctx(), recharge.reference, agent)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition(_)));
    assert_eq!(engine.wallet("alice").await.unwrap().balance, Money::ZERO);
}

#[tokio::test]
async fn agent_cannot_settle_own_recharge_or_when_inactive() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 0).await;
    let agent = agent_of(&engine, "carol").await;

    let own = engine
        .create_recharge(&ctx(), RechargeCmd::new("carol", Money::major(1_000), "cash"))
        .await
        .unwrap();
    let err = engine
        .process_recharge(&ctx(), own.reference, agent)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    engine.set_agent_active(&ctx(), agent, false).await.unwrap();
    let other = engine
        .create_recharge(&ctx(), RechargeCmd::new("alice", Money::major(1_000), "cash"))
        .await
        .unwrap();
    let err = engine
        .process_recharge(&ctx(), other.reference, agent)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(
        engine.recharge(other.reference).await.unwrap().status,
        RechargeStatus::Pending
    );
}

#[tokio::test]
async fn process_with_pin_authorizes_the_agent_first() {
    let (engine, _db) = engine_with_db().await;
    funded_user(&engine, "alice", 0).await;
    let agent = agent_of(&engine, "carol").await;
    engine.set_agent_pin(&ctx(), agent, "482913").await.unwrap();

    let recharge = engine
        .create_recharge(&ctx(), RechargeCmd::new("alice", Money::major(3_000), "cash"))
        .await
        .unwrap();

    let err = engine
        .process_recharge_with_pin(&ctx(), recharge.reference, agent, "000000")
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::PinIncorrect { remaining: 2 });
    assert_eq!(
        engine.recharge(recharge.reference).await.unwrap().status,
        RechargeStatus::Pending
    );

    let done = engine
        .process_recharge_with_pin(&ctx(), recharge.reference, agent, "482913")
        .await
        .unwrap();
    assert_eq!(done.status, RechargeStatus::Completed);
    assert_eq!(engine.agent(agent).await.unwrap().failed_pin_attempts, 0);
}
