//! # Moogly, the Seventh Haven community bot
//!
//! Usage:
//!   moogly                          # Config from ~/.moogly/config.toml
//!   moogly --config ./moogly.toml   # Custom config file
//!   moogly --verbose                # Debug logging

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use moogly_admission::{AdmissionDesk, SqliteApplicationStore};
use moogly_channels::{DiscordClient, GatewayListener};
use moogly_core::MooglyConfig;
use moogly_gateway::{Router, serve};
use moogly_scheduler::{
    EventController, EventLocks, ReminderEngine, ReminderSettings, SqliteEventStore,
    spawn_reminder_loop,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const CRATES: &[&str] = &[
    "moogly",
    "moogly_core",
    "moogly_scheduler",
    "moogly_admission",
    "moogly_channels",
    "moogly_gateway",
];

#[derive(Parser)]
#[command(
    name = "moogly",
    version,
    about = "🐾 Moogly: maps runs and FC applications for Discord"
)]
struct Cli {
    /// Config file (default: ~/.moogly/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = CRATES
        .iter()
        .map(|c| format!("{c}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => MooglyConfig::load_from(&PathBuf::from(shellexpand::tilde(path).to_string()))?,
        None => MooglyConfig::load()?,
    };
    config.validate()?;

    let db_path = config.database_path();
    let event_store = Arc::new(SqliteEventStore::open(&db_path)?);
    let application_store = Arc::new(SqliteApplicationStore::open(&db_path)?);
    tracing::info!("🗄️ Database: {}", db_path.display());

    let discord = Arc::new(DiscordClient::new(config.token.clone(), config.guild_id));
    let locks = Arc::new(EventLocks::new());

    let events = Arc::new(EventController::new(
        event_store.clone(),
        discord.clone(),
        locks.clone(),
        &config.events,
    ));
    let pending = events.recover_pending_events().await?;
    if pending > 0 {
        tracing::info!("⏰ {pending} maps runs are waiting for their reminder");
    }

    let engine = Arc::new(ReminderEngine::new(
        event_store,
        discord.clone(),
        locks,
        ReminderSettings::from(&config.events),
    ));
    let admission = Arc::new(AdmissionDesk::new(
        application_store,
        discord.clone(),
        discord.clone(),
        config.admission.clone(),
    ));
    let router = Arc::new(Router::new(
        config.prefix.clone(),
        config.admin_role_id,
        events,
        admission,
    ));

    let shutdown = CancellationToken::new();
    let reminders = spawn_reminder_loop(engine, shutdown.clone());

    let listener = GatewayListener::new(config.token.clone(), discord.gateway_url().await?);
    let (tx, rx) = mpsc::channel(256);
    let mut gateway = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { listener.run(tx, shutdown).await }
    });
    let server = tokio::spawn(serve(router, discord, rx, shutdown.clone()));

    println!("🐾 Moogly v{}", env!("CARGO_PKG_VERSION"));
    println!("   📅 Events channel:    {}", config.events.channel_id);
    println!("   📝 Admission channel: {}", config.admission.channel_id);
    println!();

    let mut failure = None;
    let gateway_done = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("🛑 Shutting down");
            false
        }
        res = &mut gateway => {
            match res {
                Ok(Ok(())) => tracing::warn!("⚠️ Discord gateway stopped"),
                Ok(Err(e)) => failure = Some(anyhow::anyhow!("Discord gateway failed: {e}")),
                Err(e) => failure = Some(anyhow::anyhow!("Discord gateway task panicked: {e}")),
            }
            true
        }
    };

    shutdown.cancel();
    if !gateway_done {
        gateway.await.ok();
    }
    server.await.ok();
    reminders.await.ok();
    tracing::info!("👋 Moogly stopped");

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
