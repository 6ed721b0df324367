//! Reminder Bot daemon
//!
//! CLI for running the bot and for operator tasks against its database.

use anyhow::Context;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use reminder_bot::bot::Bot;
use reminder_bot::config::Config;
use reminder_bot::dispatcher::{Dispatcher, ParsedCommand};
use reminder_bot::format::Formatter;
use reminder_bot::scheduler::{parse_schedule, ReminderScheduler};
use reminder_bot::server::{self, AppState, PairingState};
use reminder_bot::store::{SqliteStore, Store};
use reminder_bot::transport::{BridgeTransport, RecordingTransport, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Reminder Bot - chat commands and scheduled reminders
#[derive(Parser)]
#[command(name = "reminder-bot")]
#[command(about = "Run the reminder bot or manage its database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: HTTP surface, message handling and scheduled jobs
    Run,

    /// Seed an admin who may register and list users
    AddAdmin {
        /// Phone identifier as the chat client reports it
        number: String,

        /// Display name
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },

    /// Print active users
    Users,

    /// Run one reminder sweep now
    Sweep {
        /// Ignore the active-hour window
        #[arg(long)]
        force: bool,

        /// Record reminders instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete response log rows past the retention period
    Cleanup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Config::from_env().context("loading configuration")?;

    match cli.command {
        Commands::Run => cmd_run(&config).await,
        Commands::AddAdmin { number, name } => cmd_add_admin(&config, &number, &name.join(" ")),
        Commands::Users => cmd_users(&config),
        Commands::Sweep { force, dry_run } => cmd_sweep(&config, force, dry_run).await,
        Commands::Cleanup => cmd_cleanup(&config),
    }
}

fn open_store(config: &Config) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    Ok(Arc::new(store))
}

// ============================================================================
// CLI Commands
// ============================================================================

fn cmd_add_admin(config: &Config, number: &str, name: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    store.add_admin(number, name, Utc::now())?;
    println!("Added admin {} ({})", name, number);
    Ok(())
}

fn cmd_users(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let dispatcher = Dispatcher::new(
        store,
        Arc::new(RecordingTransport::new()),
        Formatter::new(config.locale.clone()),
    );

    let list = ParsedCommand {
        name: "list".to_string(),
        args: Vec::new(),
    };
    if let Some(text) = dispatcher.execute(&list, "", true) {
        println!("{}", text);
    }
    Ok(())
}

async fn cmd_sweep(config: &Config, force: bool, dry_run: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let recorder = Arc::new(RecordingTransport::new());
    let transport: Arc<dyn Transport> = if dry_run {
        recorder.clone()
    } else {
        Arc::new(BridgeTransport::new(&config.bridge_url)?)
    };

    let scheduler = ReminderScheduler::new(
        store,
        transport,
        Formatter::new(config.locale.clone()),
        config.reminder.clone(),
    );

    let now = Local::now();
    let report = if force {
        Some(scheduler.send_reminders(now).await?)
    } else {
        scheduler.hourly_tick(now).await
    };

    match report {
        Some(r) => println!("Checked {}, sent {}, failed {}", r.checked, r.sent, r.failed),
        None => println!("Outside the reminder window (use --force to override)"),
    }

    for (chat_id, text) in recorder.sent() {
        println!("\n--- {} ---\n{}", chat_id, text);
    }
    Ok(())
}

fn cmd_cleanup(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let scheduler = ReminderScheduler::new(
        store,
        Arc::new(RecordingTransport::new()),
        Formatter::new(config.locale.clone()),
        config.reminder.clone(),
    );

    let removed = scheduler.cleanup(Utc::now())?;
    println!("Removed {} response rows", removed);
    Ok(())
}

// ============================================================================
// Daemon
// ============================================================================

async fn cmd_run(config: &Config) -> anyhow::Result<()> {
    info!("Reminder bot starting");

    let store = open_store(config)?;
    let transport: Arc<dyn Transport> = Arc::new(BridgeTransport::new(&config.bridge_url)?);
    let formatter = Formatter::new(config.locale.clone());

    let sweep = parse_schedule(&config.sweep_cron).context("parsing sweep schedule")?;
    let cleanup = parse_schedule(&config.cleanup_cron).context("parsing cleanup schedule")?;

    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        transport.clone(),
        formatter.clone(),
        config.reminder.clone(),
    ));
    let _jobs = scheduler.spawn(sweep, cleanup);
    info!(
        "Reminders scheduled ({}, hours {}-{})",
        config.sweep_cron, config.reminder.start_hour, config.reminder.end_hour
    );

    let dispatcher = Arc::new(Dispatcher::new(store, transport, formatter));
    let pairing = PairingState::new();
    let (events_tx, events_rx) = mpsc::channel(256);

    let bot = Bot::new(dispatcher, pairing.clone());
    let pump = tokio::spawn(bot.run(events_rx));

    let app = server::router(AppState {
        pairing,
        events: events_tx,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server running on port {}", config.port);

    axum::serve(listener, app).await?;

    warn!("HTTP server stopped");
    pump.abort();
    Ok(())
}
