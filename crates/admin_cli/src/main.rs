use std::{error::Error, io::Write};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::Print,
    terminal,
    terminal::ClearType,
};
use engine::{
    AgentCmd, Engine, HoldCmd, HoldExpiryPolicy, Money, OpContext, Percent, RechargeCmd,
    RelatedEntity, RelatedEntityType, TransferCmd, TransferStatus, validate_pin,
};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "monedero_admin")]
#[command(about = "Operator utilities for the Monedero ledger")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./monedero.db?mode=rwc"
    )]
    database_url: String,

    /// Name recorded as the actor on every audit row.
    #[arg(long, env = "MONEDERO_OPERATOR", default_value = "admin")]
    operator: String,

    /// Log filter, e.g. `engine=debug`.
    #[arg(long, env = "RUST_LOG", default_value = "engine=warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand)]
    User(UserCommand),
    #[command(subcommand)]
    Wallet(WalletCommand),
    #[command(subcommand)]
    Agency(AgencyCommand),
    #[command(subcommand)]
    Agent(AgentCommand),
    #[command(subcommand)]
    Config(ConfigCommand),
    #[command(subcommand)]
    Recharge(RechargeCommand),
    #[command(subcommand)]
    Transfer(TransferCommand),
    #[command(subcommand)]
    Hold(HoldCommand),
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Creates a user together with its empty wallet.
    Create {
        #[arg(long)]
        username: String,
    },
}

#[derive(Subcommand, Debug)]
enum WalletCommand {
    Show {
        #[arg(long)]
        user: String,
    },
    /// Credits (positive) or debits (negative) a wallet by hand.
    Adjust {
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = parse_money, allow_hyphen_values = true)]
        amount: Money,
        #[arg(long)]
        reason: String,
    },
    /// Replays the wallet's audit trail against its stored balances.
    Reconcile {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand, Debug)]
enum AgencyCommand {
    Create {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
    },
    /// Agents and completed recharges of an agency.
    Stats {
        #[arg(long)]
        code: String,
    },
}

#[derive(Subcommand, Debug)]
enum AgentCommand {
    Create {
        #[arg(long)]
        user: String,
        #[arg(long)]
        agency: String,
        #[arg(long)]
        code: String,
    },
    /// Prompts for a new six-digit PIN.
    SetPin {
        #[arg(long)]
        agent: Uuid,
    },
    Activate {
        #[arg(long)]
        agent: Uuid,
    },
    Deactivate {
        #[arg(long)]
        agent: Uuid,
    },
    Stats {
        #[arg(long)]
        agent: Uuid,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    /// Changes only the given fields.
    Set(ConfigSetArgs),
}

#[derive(Args, Debug)]
struct ConfigSetArgs {
    #[arg(long, value_parser = parse_money)]
    daily_transfer_limit: Option<Money>,
    #[arg(long, value_parser = parse_money)]
    daily_recharge_limit: Option<Money>,
    #[arg(long, value_parser = parse_money)]
    min_transfer_amount: Option<Money>,
    #[arg(long, value_parser = parse_percent)]
    transfer_commission_pct: Option<Percent>,
    #[arg(long, value_parser = parse_money)]
    transfer_commission_min: Option<Money>,
    #[arg(long, value_parser = parse_percent)]
    agent_commission_pct: Option<Percent>,
    #[arg(long, value_parser = parse_money)]
    verification_threshold: Option<Money>,
    #[arg(long)]
    max_verification_attempts: Option<u32>,
    #[arg(long)]
    max_daily_operations: Option<u32>,
    #[arg(long, value_parser = parse_policy)]
    hold_expiry_policy: Option<HoldExpiryPolicy>,
    #[arg(long)]
    default_hold_days: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum RechargeCommand {
    Create {
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = parse_money)]
        amount: Money,
        #[arg(long)]
        method: String,
        /// Opaque JSON passed through to the recharge record.
        #[arg(long)]
        payment_data: Option<String>,
    },
    /// Hands a pending recharge to the background worker.
    Dispatch {
        #[arg(long)]
        reference: Uuid,
    },
    /// Settles a recharge through an agent. Prompts for the agent PIN
    /// unless `--no-pin` is given.
    Process {
        #[arg(long)]
        reference: Uuid,
        #[arg(long)]
        agent: Uuid,
        #[arg(long)]
        no_pin: bool,
    },
    Reject {
        #[arg(long)]
        reference: Uuid,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand, Debug)]
enum TransferCommand {
    Create {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, value_parser = parse_money)]
        amount: Money,
        /// RFC 3339 timestamp; schedules the transfer instead of leaving it pending.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    Verify {
        #[arg(long)]
        reference: Uuid,
        #[arg(long)]
        code: String,
    },
    Process {
        #[arg(long)]
        reference: Uuid,
    },
    Revert {
        #[arg(long)]
        reference: Uuid,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand, Debug)]
enum HoldCommand {
    Create {
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = parse_money)]
        amount: Money,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        days: Option<u32>,
        /// `order`, `transfer`, `recharge` or `external`.
        #[arg(long, requires = "related_id")]
        related_type: Option<String>,
        #[arg(long, requires = "related_type")]
        related_id: Option<String>,
    },
    Release {
        #[arg(long)]
        reference: Uuid,
    },
    Apply {
        #[arg(long)]
        reference: Uuid,
    },
    Cancel {
        #[arg(long)]
        reference: Uuid,
    },
    /// Settles every expired hold according to the configured policy.
    Sweep,
}

fn parse_money(raw: &str) -> Result<Money, String> {
    raw.parse::<Money>().map_err(|err| err.to_string())
}

fn parse_percent(raw: &str) -> Result<Percent, String> {
    raw.parse::<Percent>().map_err(|err| err.to_string())
}

fn parse_policy(raw: &str) -> Result<HoldExpiryPolicy, String> {
    HoldExpiryPolicy::try_from(raw).map_err(|err| err.to_string())
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self, Box<dyn Error + Send + Sync>> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn prompt_secret(prompt: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    let _raw = RawModeGuard::enter()?;

    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(prompt)
    )?;
    out.flush()?;

    let mut buf = String::new();
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };

        match code {
            KeyCode::Enter => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                break;
            }
            KeyCode::Backspace => {
                if buf.pop().is_some() {
                    execute!(out, cursor::MoveLeft(1), Print(" "), cursor::MoveLeft(1))?;
                    out.flush()?;
                }
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                return Err("interrupted".into());
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() && !modifiers.contains(KeyModifiers::CONTROL) => {
                buf.push(ch);
                execute!(out, Print("*"))?;
                out.flush()?;
            }
            _ => {}
        }
    }

    Ok(buf)
}

fn say(line: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(line),
        Print("\r\n")
    )?;
    Ok(())
}

fn prompt_new_pin() -> Result<String, Box<dyn Error + Send + Sync>> {
    for _ in 0..3 {
        let p1 = prompt_secret("New PIN (6 digits): ")?;
        if let Err(err) = validate_pin(&p1) {
            say(&err.safe_message())?;
            continue;
        }

        let p2 = prompt_secret("Confirm PIN: ")?;
        if p1 == p2 {
            return Ok(p1);
        }

        say("PINs do not match. Try again.")?;
    }

    Err("too many attempts".into())
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log.as_str())
        .with_writer(std::io::stderr)
        .init();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;
    let ctx = OpContext::new(cli.operator.as_str()).request_id(format!("cli-{}", Uuid::new_v4()));

    match cli.command {
        Command::User(UserCommand::Create { username }) => {
            let wallet = engine.create_user(&ctx, &username).await?;
            println!("created user: {username} (wallet {})", wallet.id);
        }
        Command::Wallet(command) => wallet(&engine, &ctx, command).await?,
        Command::Agency(AgencyCommand::Create { code, name }) => {
            let agency = engine.create_agency(&ctx, &code, &name).await?;
            println!("created agency: {} ({})", agency.code, agency.id);
        }
        Command::Agency(AgencyCommand::Stats { code }) => {
            let stats = engine.agency_statistics(&code).await?;
            println!("agency {code}");
            println!("  agents active/total: {}/{}", stats.agents_active, stats.agents_total);
            println!(
                "  recharges this month/total: {}/{}",
                stats.recharges_month, stats.recharges_total
            );
            println!("  commission paid: {}", stats.commission_total);
        }
        Command::Agent(command) => agent(&engine, &ctx, command).await?,
        Command::Config(command) => config(&engine, &ctx, command).await?,
        Command::Recharge(command) => recharge(&engine, &ctx, command).await?,
        Command::Transfer(command) => transfer(&engine, &ctx, command).await?,
        Command::Hold(command) => hold(&engine, &ctx, command).await?,
    }

    Ok(())
}

async fn wallet(
    engine: &Engine,
    ctx: &OpContext,
    command: WalletCommand,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        WalletCommand::Show { user } => {
            let wallet = engine.wallet(&user).await?;
            let stats = engine.wallet_statistics(&user).await?;
            println!("wallet {} of {}", wallet.id, wallet.user_id);
            println!("  balance:   {}", wallet.balance);
            println!("  held:      {}", wallet.held_balance);
            println!("  available: {}", wallet.available_balance());
            println!(
                "  transfers sent/received: {}/{}",
                stats.transfers_sent, stats.transfers_received
            );
            println!("  recharges completed: {}", stats.recharges_completed);
            println!("  max balance: {}", stats.max_balance);
        }
        WalletCommand::Adjust {
            user,
            amount,
            reason,
        } => {
            let wallet = engine.adjust_balance(ctx, &user, amount, &reason).await?;
            println!(
                "adjusted {user} by {amount}: balance {} (available {})",
                wallet.balance,
                wallet.available_balance()
            );
        }
        WalletCommand::Reconcile { user } => {
            let report = engine.reconcile_wallet(&user).await?;
            println!(
                "{} audit entries, replayed {:?}, stored {:?}",
                report.entries, report.replayed, report.stored
            );
            if report.is_consistent() {
                println!("consistent");
            } else {
                eprintln!("inconsistent; breaks at audit rows {:?}", report.breaks);
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

async fn agent(
    engine: &Engine,
    ctx: &OpContext,
    command: AgentCommand,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        AgentCommand::Create { user, agency, code } => {
            let agent = engine
                .create_agent(ctx, AgentCmd::new(user, agency, code))
                .await?;
            println!("created agent: {} ({})", agent.agent_code, agent.id);
        }
        AgentCommand::SetPin { agent } => {
            let pin = prompt_new_pin()?;
            engine.set_agent_pin(ctx, agent, &pin).await?;
            println!("PIN set for agent {agent}");
        }
        AgentCommand::Activate { agent } => {
            engine.set_agent_active(ctx, agent, true).await?;
            println!("agent {agent} active");
        }
        AgentCommand::Deactivate { agent } => {
            engine.set_agent_active(ctx, agent, false).await?;
            println!("agent {agent} inactive");
        }
        AgentCommand::Stats { agent } => {
            let stats = engine.agent_statistics(agent).await?;
            println!("agent {agent}");
            println!(
                "  recharges today/total: {}/{}",
                stats.recharges_today, stats.recharges_total
            );
            println!(
                "  commission today/month: {}/{}",
                stats.commission_today, stats.commission_month
            );
            println!("  accumulated commission: {}", stats.accumulated_commission);
            println!("  unique clients: {}", stats.unique_clients);
        }
    }
    Ok(())
}

async fn config(
    engine: &Engine,
    ctx: &OpContext,
    command: ConfigCommand,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let current = engine.system_config().await?;
    let shown = match command {
        ConfigCommand::Show => current,
        ConfigCommand::Set(args) => {
            let mut next = current;
            if let Some(v) = args.daily_transfer_limit {
                next.daily_transfer_limit = v;
            }
            if let Some(v) = args.daily_recharge_limit {
                next.daily_recharge_limit = v;
            }
            if let Some(v) = args.min_transfer_amount {
                next.min_transfer_amount = v;
            }
            if let Some(v) = args.transfer_commission_pct {
                next.transfer_commission_pct = v;
            }
            if let Some(v) = args.transfer_commission_min {
                next.transfer_commission_min = v;
            }
            if let Some(v) = args.agent_commission_pct {
                next.agent_commission_pct = v;
            }
            if let Some(v) = args.verification_threshold {
                next.verification_threshold = v;
            }
            if let Some(v) = args.max_verification_attempts {
                next.max_verification_attempts = v;
            }
            if let Some(v) = args.max_daily_operations {
                next.max_daily_operations = v;
            }
            if let Some(v) = args.hold_expiry_policy {
                next.hold_expiry_policy = v;
            }
            if let Some(v) = args.default_hold_days {
                next.default_hold_days = v;
            }
            engine.update_config(ctx, next).await?
        }
    };

    println!("daily_transfer_limit      {}", shown.daily_transfer_limit);
    println!("daily_recharge_limit      {}", shown.daily_recharge_limit);
    println!("min_transfer_amount       {}", shown.min_transfer_amount);
    println!("transfer_commission_pct   {}", shown.transfer_commission_pct);
    println!("transfer_commission_min   {}", shown.transfer_commission_min);
    println!("agent_commission_pct      {}", shown.agent_commission_pct);
    println!("verification_threshold    {}", shown.verification_threshold);
    println!("max_verification_attempts {}", shown.max_verification_attempts);
    println!("max_daily_operations      {}", shown.max_daily_operations);
    println!("hold_expiry_policy        {}", shown.hold_expiry_policy.as_str());
    println!("default_hold_days         {}", shown.default_hold_days);
    Ok(())
}

async fn recharge(
    engine: &Engine,
    ctx: &OpContext,
    command: RechargeCommand,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        RechargeCommand::Create {
            user,
            amount,
            method,
            payment_data,
        } => {
            let mut cmd = RechargeCmd::new(user, amount, method);
            if let Some(raw) = payment_data {
                cmd = cmd.payment_data(serde_json::from_str(&raw)?);
            }
            let recharge = engine.create_recharge(ctx, cmd).await?;
            println!(
                "created recharge {}: {} (commission {}, net {})",
                recharge.reference, recharge.amount, recharge.agent_commission, recharge.net_amount
            );
        }
        RechargeCommand::Dispatch { reference } => {
            let recharge = engine.dispatch_recharge(ctx, reference).await?;
            println!("recharge {reference}: {}", recharge.status.as_str());
        }
        RechargeCommand::Process {
            reference,
            agent,
            no_pin,
        } => {
            let recharge = if no_pin {
                engine.process_recharge(ctx, reference, agent).await?
            } else {
                let pin = prompt_secret("Agent PIN: ")?;
                engine
                    .process_recharge_with_pin(ctx, reference, agent, &pin)
                    .await?
            };
            println!(
                "recharge {reference}: {} ({} credited)",
                recharge.status.as_str(),
                recharge.net_amount
            );
        }
        RechargeCommand::Reject { reference, reason } => {
            let recharge = engine.reject_recharge(ctx, reference, &reason).await?;
            println!("recharge {reference}: {}", recharge.status.as_str());
        }
    }
    Ok(())
}

async fn transfer(
    engine: &Engine,
    ctx: &OpContext,
    command: TransferCommand,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        TransferCommand::Create {
            from,
            to,
            amount,
            at,
        } => {
            let mut cmd = TransferCmd::new(from, to, amount);
            if let Some(at) = at {
                cmd = cmd.execute_at(at);
            }
            let transfer = engine.create_transfer(ctx, cmd).await?;
            println!(
                "created transfer {}: {} + {} commission, {}",
                transfer.reference,
                transfer.amount,
                transfer.commission,
                transfer.status.as_str()
            );
            if transfer.status == TransferStatus::PendingVerification
                && let Some(code) = &transfer.verification_code
            {
                println!("verification code: {code}");
            }
        }
        TransferCommand::Verify { reference, code } => {
            let transfer = engine.verify_transfer(ctx, reference, &code).await?;
            println!("transfer {reference}: {}", transfer.status.as_str());
        }
        TransferCommand::Process { reference } => {
            let transfer = engine.process_transfer(ctx, reference).await?;
            println!("transfer {reference}: {}", transfer.status.as_str());
        }
        TransferCommand::Revert { reference, reason } => {
            let transfer = engine.revert_transfer(ctx, reference, &reason).await?;
            println!("transfer {reference}: {}", transfer.status.as_str());
        }
    }
    Ok(())
}

async fn hold(
    engine: &Engine,
    ctx: &OpContext,
    command: HoldCommand,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let hold = match command {
        HoldCommand::Create {
            user,
            amount,
            reason,
            days,
            related_type,
            related_id,
        } => {
            let mut cmd = HoldCmd::new(user, amount, reason);
            if let Some(days) = days {
                cmd = cmd.expires_in_days(days);
            }
            if let (Some(kind), Some(id)) = (related_type, related_id) {
                cmd = cmd.related(RelatedEntity::new(RelatedEntityType::try_from(kind.as_str())?, id));
            }
            engine.create_hold(ctx, cmd).await?
        }
        HoldCommand::Release { reference } => engine.release_hold(ctx, reference).await?,
        HoldCommand::Apply { reference } => engine.apply_hold(ctx, reference).await?,
        HoldCommand::Cancel { reference } => engine.cancel_hold(ctx, reference).await?,
        HoldCommand::Sweep => {
            let report = engine.sweep_expired_holds(ctx, Utc::now()).await?;
            println!(
                "released {}, applied {}, failed {}",
                report.released.len(),
                report.applied.len(),
                report.failed.len()
            );
            return Ok(());
        }
    };
    println!(
        "hold {}: {} {} (expires {})",
        hold.reference,
        hold.amount,
        hold.status.as_str(),
        hold.expires_at
    );
    Ok(())
}
