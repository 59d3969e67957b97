//! Periodic jobs driving the parts of the ledger that nobody calls directly:
//! due scheduled transfers, recharges claimed for async processing, expired
//! holds and the notification outbox.
use std::{future::Future, time::Duration};

use chrono::Utc;
use engine::{Engine, EngineError, ErrorKind, OpContext};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::settings::Workers;

const WORKER_ACTOR: &str = "worker";

/// Runs `job` every `secs` seconds until the task is aborted.
pub async fn every<F, Fut>(name: &'static str, secs: u64, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), EngineError>>,
{
    let mut interval = tokio::time::interval(Duration::from_secs(secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(job = name, every_secs = secs, "worker started");
    loop {
        interval.tick().await;
        if let Err(err) = job().await {
            warn!(job = name, error = %err, "worker tick failed");
        }
    }
}

/// Retries `op` while it fails with a storage error. Business rejections are
/// returned on the first attempt.
async fn with_retry<T, F, Fut>(workers: &Workers, mut op: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.kind() == ErrorKind::Persistence && attempt < workers.retry_attempts => {
                warn!(attempt, error = %err, "storage error, retrying");
                tokio::time::sleep(Duration::from_millis(workers.retry_backoff_ms * u64::from(attempt)))
                    .await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn context(job: &str) -> OpContext {
    OpContext::new(WORKER_ACTOR).request_id(format!("{job}-{}", Uuid::new_v4()))
}

pub async fn scheduled_transfers(engine: &Engine, workers: &Workers) -> Result<(), EngineError> {
    let due = engine
        .due_scheduled_transfers(Utc::now(), workers.batch_size)
        .await?;
    for transfer in due {
        let ctx = context("scheduled-transfer");
        match with_retry(workers, || engine.process_transfer(&ctx, transfer.reference)).await {
            Ok(done) => debug!(reference = %done.reference, "scheduled transfer settled"),
            Err(err) => warn!(
                reference = %transfer.reference,
                kind = err.kind().as_str(),
                "scheduled transfer not settled: {}",
                err.safe_message()
            ),
        }
    }
    Ok(())
}

pub async fn recharges(engine: &Engine, workers: &Workers) -> Result<(), EngineError> {
    let pending = engine.recharges_in_progress(workers.batch_size).await?;
    if pending.is_empty() {
        return Ok(());
    }
    let agent_id = match workers.recharge_agent {
        Some(id) => id,
        None => match engine.first_active_agent().await? {
            Some(agent) => agent.id,
            None => {
                warn!(pending = pending.len(), "no active agent for in-progress recharges");
                return Ok(());
            }
        },
    };
    for recharge in pending {
        let ctx = context("recharge");
        match with_retry(workers, || {
            engine.process_recharge(&ctx, recharge.reference, agent_id)
        })
        .await
        {
            Ok(done) => debug!(reference = %done.reference, agent = %agent_id, "recharge settled"),
            Err(err) => warn!(
                reference = %recharge.reference,
                kind = err.kind().as_str(),
                "recharge not settled: {}",
                err.safe_message()
            ),
        }
    }
    Ok(())
}

pub async fn hold_sweep(engine: &Engine) -> Result<(), EngineError> {
    let report = engine
        .sweep_expired_holds(&context("hold-sweep"), Utc::now())
        .await?;
    if !report.released.is_empty() || !report.applied.is_empty() || !report.failed.is_empty() {
        info!(
            released = report.released.len(),
            applied = report.applied.len(),
            failed = report.failed.len(),
            "expired holds swept"
        );
    }
    Ok(())
}

/// Hands undelivered notifications to the log and marks them delivered.
pub async fn outbox(engine: &Engine, workers: &Workers) -> Result<(), EngineError> {
    let batch = engine.undelivered_notifications(workers.batch_size).await?;
    if batch.is_empty() {
        return Ok(());
    }
    for notification in &batch {
        info!(
            id = notification.id,
            user = %notification.user_id,
            kind = notification.kind.as_str(),
            important = notification.important,
            "{}: {}",
            notification.title,
            notification.message
        );
    }
    let ids: Vec<i64> = batch.iter().map(|n| n.id).collect();
    engine.mark_notifications_delivered(&ids).await?;
    Ok(())
}
