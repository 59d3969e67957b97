mod common;

use sea_orm::{ConnectionTrait, Statement};

use engine::{AgentCmd, AuditAction, AuditSubject, EngineError, Money, RechargeCmd, validate_pin};

use common::{ctx, engine_with_db, funded_user, update_config};

#[tokio::test]
async fn agency_codes_are_unique() {
    let (engine, _db) = engine_with_db().await;
    let agency = engine.create_agency(&ctx(), " AG1 ", "Main street").await.unwrap();
    assert_eq!(agency.code, "AG1");
    assert!(agency.active);

    let err = engine
        .create_agency(&ctx(), "AG1", "Elsewhere")
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("AG1".to_string()));
    assert_eq!(engine.agency("AG1").await.unwrap().id, agency.id);
}

#[tokio::test]
async fn create_agent_requires_user_agency_and_unique_codes() {
    let (engine, _db) = engine_with_db().await;
    engine.create_agency(&ctx(), "AG1", "Main street").await.unwrap();
    funded_user(&engine, "carol", 0).await;
    funded_user(&engine, "dave", 0).await;

    let err = engine
        .create_agent(&ctx(), AgentCmd::new("ghost", "AG1", "A-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    let err = engine
        .create_agent(&ctx(), AgentCmd::new("carol", "NOPE", "A-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    let agent = engine
        .create_agent(&ctx(), AgentCmd::new("carol", "AG1", "A-1"))
        .await
        .unwrap();
    assert!(agent.active);
    assert!(!agent.has_pin);
    assert_eq!(engine.agent_by_user("carol").await.unwrap().id, agent.id);

    let err = engine
        .create_agent(&ctx(), AgentCmd::new("dave", "AG1", "A-1"))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("A-1".to_string()));

    let err = engine
        .create_agent(&ctx(), AgentCmd::new("carol", "AG1", "A-2"))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("carol".to_string()));

    let trail = engine.audit_trail(AuditSubject::Agent(agent.id)).await.unwrap();
    assert_eq!(trail[0].action, AuditAction::AgentCreated.as_str());
}

#[tokio::test]
async fn pin_is_sealed_and_verified() {
    let (engine, db) = engine_with_db().await;
    engine.create_agency(&ctx(), "AG1", "Main street").await.unwrap();
    funded_user(&engine, "carol", 0).await;
    let agent = engine
        .create_agent(&ctx(), AgentCmd::new("carol", "AG1", "A-1"))
        .await
        .unwrap();

    assert!(!engine.verify_agent_pin(agent.id, "123456").await);

    let err = engine
        .set_agent_pin(&ctx(), agent.id, "12ab56")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(validate_pin("1234567").is_err());

    let updated = engine.set_agent_pin(&ctx(), agent.id, "123456").await.unwrap();
    assert!(updated.has_pin);
    assert!(engine.verify_agent_pin(agent.id, "123456").await);
    assert!(!engine.verify_agent_pin(agent.id, "654321").await);
    assert!(!engine.verify_agent_pin(uuid::Uuid::new_v4(), "123456").await);

    let row = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            "SELECT operations_pin FROM agents".to_string(),
        ))
        .await
        .unwrap()
        .unwrap();
    let stored: String = row.try_get("", "operations_pin").unwrap();
    assert!(!stored.contains("123456"));
}

#[tokio::test]
async fn wrong_pins_lock_the_agent() {
    let (engine, _db) = engine_with_db().await;
    engine.create_agency(&ctx(), "AG1", "Main street").await.unwrap();
    funded_user(&engine, "carol", 0).await;
    let agent = engine
        .create_agent(&ctx(), AgentCmd::new("carol", "AG1", "A-1"))
        .await
        .unwrap();
    engine.set_agent_pin(&ctx(), agent.id, "482913").await.unwrap();

    for remaining in [2, 1, 0] {
        let err = engine
            .authorize_agent(&ctx(), agent.id, "000000")
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::PinIncorrect { remaining });
    }
    let locked = engine.agent(agent.id).await.unwrap();
    assert!(!locked.active);
    assert_eq!(locked.failed_pin_attempts, 3);

    let err = engine
        .authorize_agent(&ctx(), agent.id, "482913")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let trail = engine.audit_trail(AuditSubject::Agent(agent.id)).await.unwrap();
    assert!(
        trail
            .iter()
            .any(|e| e.action == AuditAction::AgentLocked.as_str())
    );

    engine.set_agent_active(&ctx(), agent.id, true).await.unwrap();
    let agent = engine
        .authorize_agent(&ctx(), agent.id, "482913")
        .await
        .unwrap();
    assert_eq!(agent.failed_pin_attempts, 0);
    assert!(agent.last_activity.is_some());
}

#[tokio::test]
async fn set_pin_resets_failed_attempts() {
    let (engine, _db) = engine_with_db().await;
    engine.create_agency(&ctx(), "AG1", "Main street").await.unwrap();
    funded_user(&engine, "carol", 0).await;
    update_config(&engine, |c| c.max_verification_attempts = 5).await;
    let agent = engine
        .create_agent(&ctx(), AgentCmd::new("carol", "AG1", "A-1"))
        .await
        .unwrap();
    engine.set_agent_pin(&ctx(), agent.id, "482913").await.unwrap();

    let err = engine
        .authorize_agent(&ctx(), agent.id, "111111")
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::PinIncorrect { remaining: 4 });

    engine.set_agent_pin(&ctx(), agent.id, "222222").await.unwrap();
    assert_eq!(engine.agent(agent.id).await.unwrap().failed_pin_attempts, 0);
}

#[tokio::test]
async fn agent_and_agency_statistics_count_completed_recharges() {
    let (engine, _db) = engine_with_db().await;
    engine.create_agency(&ctx(), "AG1", "Main street").await.unwrap();
    engine.create_agency(&ctx(), "AG2", "Harbour").await.unwrap();
    for user in ["alice", "bob", "carol", "dave"] {
        funded_user(&engine, user, 0).await;
    }
    let carol = engine
        .create_agent(&ctx(), AgentCmd::new("carol", "AG1", "A-1"))
        .await
        .unwrap();
    let dave = engine
        .create_agent(&ctx(), AgentCmd::new("dave", "AG1", "A-2"))
        .await
        .unwrap();
    engine.set_agent_active(&ctx(), dave.id, false).await.unwrap();

    for (user, major) in [("alice", 10_000), ("alice", 2_000), ("bob", 1_000)] {
        let recharge = engine
            .create_recharge(&ctx(), RechargeCmd::new(user, Money::major(major), "cash"))
            .await
            .unwrap();
        engine
            .process_recharge(&ctx(), recharge.reference, carol.id)
            .await
            .unwrap();
    }
    engine
        .create_recharge(&ctx(), RechargeCmd::new("bob", Money::major(5_000), "cash"))
        .await
        .unwrap();

    let stats = engine.agent_statistics(carol.id).await.unwrap();
    assert_eq!(stats.recharges_total, 3);
    assert_eq!(stats.recharges_today, 3);
    assert_eq!(stats.commission_today, Money::major(130));
    assert_eq!(stats.commission_month, Money::major(130));
    assert_eq!(stats.accumulated_commission, Money::major(130));
    assert_eq!(stats.unique_clients, 2);

    let idle = engine.agent_statistics(dave.id).await.unwrap();
    assert_eq!(idle.recharges_total, 0);
    assert_eq!(idle.commission_month, Money::ZERO);

    let agency = engine.agency_statistics("AG1").await.unwrap();
    assert_eq!(agency.agents_total, 2);
    assert_eq!(agency.agents_active, 1);
    assert_eq!(agency.recharges_total, 3);
    assert_eq!(agency.recharges_month, 3);
    assert_eq!(agency.commission_total, Money::major(130));

    let empty = engine.agency_statistics("AG2").await.unwrap();
    assert_eq!(empty.agents_total, 0);
    assert_eq!(empty.recharges_total, 0);
    assert_eq!(empty.commission_total, Money::ZERO);

    assert!(matches!(
        engine.agency_statistics("NOPE").await,
        Err(EngineError::KeyNotFound(_))
    ));
}
