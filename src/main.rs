//! capwatch binary: the polling service plus operator commands.
//!
//! `run` owns the store for writing. Query commands open it read-only so
//! they can run alongside the service.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use capwatch_lib::cli::{Cli, Command};
use capwatch_lib::commands;
use capwatch_lib::db::EventDb;
use capwatch_lib::poller::{BatchPoller, CancelSignal, PollerSettings, TokioSleeper};
use capwatch_lib::runescape::RuneScapeClient;
use capwatch_lib::scheduler::PeriodicDriver;
use capwatch_lib::state::{database_path, load_config, AppState};
use capwatch_lib::types::Config;
use capwatch_lib::util::now_timestamp;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Run => run_service(config).await,
        Command::Once => run_once(config).await,
        Command::Caplist { days } => {
            let db = open_for_reading(&config)?;
            println!("{}", commands::caplist(&db, days, now_timestamp())?);
            Ok(())
        }
        Command::Private => {
            let db = open_for_reading(&config)?;
            println!("{}", commands::list_private(&db)?);
            Ok(())
        }
        Command::SetCapped { name, at, by } => {
            let db = open_for_writing(&config)?;
            let message = commands::set_capped(&db, &name, at.as_deref(), &by, now_timestamp())?;
            println!("{}", message);
            Ok(())
        }
        Command::Remap { old, new } => {
            let db = open_for_writing(&config)?;
            println!("{}", commands::remap(&db, &old, &new)?);
            Ok(())
        }
    }
}

fn build_poller(state: &AppState) -> Result<BatchPoller> {
    let settings = PollerSettings::from_config(&state.config)?;
    let client = Arc::new(
        RuneScapeClient::new(&state.config.roster_url, &state.config.activity_url)
            .context("failed to build HTTP client")?,
    );
    Ok(BatchPoller::new(
        Arc::clone(&state.db),
        client.clone(),
        client,
        Arc::new(TokioSleeper),
        settings,
    ))
}

async fn run_service(config: Config) -> Result<()> {
    let polling = config.polling.clone();
    let state = AppState::open(config).context("failed to open store")?;
    let poller = build_poller(&state)?;
    let driver = Arc::new(PeriodicDriver::from_config(Arc::new(poller), &polling));

    let ticking = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move { driver.run().await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    log::info!("Received Ctrl-C, shutting down");

    if let Err(e) = driver.shutdown().await {
        log::error!("Shutdown incomplete: {}", e);
    }
    let _ = ticking.await;
    Ok(())
}

async fn run_once(config: Config) -> Result<()> {
    let state = AppState::open(config).context("failed to open store")?;
    let poller = build_poller(&state)?;

    let (cancel_tx, cancel) = CancelSignal::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received Ctrl-C, stopping after the current request");
            let _ = cancel_tx.send(true);
        }
    });

    let report = poller.run_pass(&cancel).await.context("polling pass failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn open_for_reading(config: &Config) -> Result<EventDb> {
    let path = database_path(config)?;
    // Missing or unmigrated (e.g. a legacy bot file): migrate once, then read
    if !path.exists() || !EventDb::schema_is_current_at(&path)? {
        return open_for_writing(config);
    }
    EventDb::open_readonly_at(&path)
        .with_context(|| format!("failed to open {} read-only", path.display()))
}

fn open_for_writing(config: &Config) -> Result<EventDb> {
    let path = database_path(config)?;
    EventDb::open_at(path.clone()).with_context(|| format!("failed to open {}", path.display()))
}
