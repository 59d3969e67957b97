use clap::{Parser, ValueEnum};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;

use migration::Migrator;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Step {
    Up,
    Down,
    Fresh,
    Reset,
    Status,
}

/// Applies the monedero schema.
#[derive(Debug, Parser)]
#[command(name = "migration")]
struct Cli {
    #[arg(value_enum, default_value = "up")]
    step: Step,
    /// Only used by `up` and `down`; all pending (or applied) when omitted.
    #[arg(long)]
    count: Option<u32>,
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./monedero.db?mode=rwc"
    )]
    database_url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let db = Database::connect(&cli.database_url).await?;

    match cli.step {
        Step::Up => Migrator::up(&db, cli.count).await?,
        Step::Down => Migrator::down(&db, cli.count.or(Some(1))).await?,
        Step::Fresh => Migrator::fresh(&db).await?,
        Step::Reset => Migrator::reset(&db).await?,
        Step::Status => Migrator::status(&db).await?,
    }
    Ok(())
}
