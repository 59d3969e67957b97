use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;
mod workers;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "monedero={level},engine={level},migration={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.database).await?;
    let engine = engine::Engine::builder().database(db).build().await?;
    let config = Arc::new(settings.workers);

    if config.scheduled_transfers_secs > 0 {
        let (engine, config) = (engine.clone(), config.clone());
        tasks.spawn(async move {
            let secs = config.scheduled_transfers_secs;
            workers::every("scheduled_transfers", secs, || {
                workers::scheduled_transfers(&engine, &config)
            })
            .await;
        });
    }

    if config.recharges_secs > 0 {
        let (engine, config) = (engine.clone(), config.clone());
        tasks.spawn(async move {
            let secs = config.recharges_secs;
            workers::every("recharges", secs, || workers::recharges(&engine, &config)).await;
        });
    }

    if config.hold_sweep_secs > 0 {
        let (engine, secs) = (engine.clone(), config.hold_sweep_secs);
        tasks.spawn(async move {
            workers::every("hold_sweep", secs, || workers::hold_sweep(&engine)).await;
        });
    }

    if config.outbox_secs > 0 {
        let (engine, config) = (engine.clone(), config.clone());
        tasks.spawn(async move {
            let secs = config.outbox_secs;
            workers::every("outbox", secs, || workers::outbox(&engine, &config)).await;
        });
    }

    tasks.spawn(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for shutdown signal: {err}");
        }
        tracing::info!("shutting down");
    });

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn parse_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
        Database::Url(url) => url.clone(),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
