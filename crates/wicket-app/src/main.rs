// Wicket auction draw entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file; stdout belongs to the operator)
// 2. Load config
// 3. Open database
// 4. Build the auction controller and optional roster source
// 5. Create mpsc channels
// 6. Spawn the app event loop (resumes any saved auction)
// 7. Read operator commands from stdin, print updates to stdout
// 8. Cleanup on exit

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use wicket_app::app::{self, AppOptions};
use wicket_app::controller::{AuctionController, ControllerOptions};
use wicket_app::protocol::{DrawSnapshot, UiUpdate, UserCommand};
use wicket_app::roster::{HttpRosterSource, RosterSource};
use wicket_core::config;
use wicket_core::db::Database;
use wicket_core::draw::Phase;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Wicket starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} cards, reveal {}..={} frames at {} ms",
        config.auction.pool_size,
        config.animation.min_ticks,
        config.animation.max_ticks,
        config.animation.tick_ms
    );

    // 3. Open database
    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    // 4. Controller and roster source
    let controller = AuctionController::new(Box::new(db), ControllerOptions::from_config(&config));
    let source: Option<Arc<dyn RosterSource>> = match &config.roster.base_url {
        Some(url) => {
            info!("Team stats from {}", url);
            Some(Arc::new(HttpRosterSource::new(url.as_str())))
        }
        None => {
            info!("No roster base_url configured, team stats disabled");
            None
        }
    };
    let options = AppOptions::from_config(&config, source);

    // 5. Channels
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, mut ui_rx) = mpsc::channel(256);

    // 6. App event loop
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(cmd_rx, ui_tx, controller, options).await {
            error!("Application loop error: {}", e);
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(update) = ui_rx.recv().await {
            print_update(&update);
        }
    });

    // 7. Operator input
    println!("Commands: start, sold (s), unsold (u), reauction, stats, reset, quit (q)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<UserCommand>() {
            Ok(cmd) => {
                if cmd_tx.send(cmd).await.is_err() || cmd == UserCommand::Quit {
                    break;
                }
            }
            Err(msg) => println!("! {msg}"),
        }
    }
    let _ = cmd_tx.send(UserCommand::Quit).await;

    // 8. Cleanup: wait for the loop to finish (with timeout)
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
        let _ = printer.await;
    })
    .await;

    info!("Wicket shut down cleanly");
    Ok(())
}

fn print_update(update: &UiUpdate) {
    match update {
        UiUpdate::Snapshot(snap) => println!("{}", describe(snap)),
        UiUpdate::AnimationFrame { display } => println!("  ... {display}"),
        UiUpdate::Revealed { id } => println!(">>> Player {id}"),
        UiUpdate::TeamStats(entries) => {
            for entry in entries {
                let s = &entry.stats;
                println!(
                    "  {:<24} used {:>7}  balance {:>7}  bought {:>2}  max bid {:>7}",
                    entry.team_name, s.points_used, s.balance, s.players_bought, s.max_bid_allowed
                );
            }
        }
        UiUpdate::Notice(msg) => println!("! {msg}"),
    }
}

fn describe(snap: &DrawSnapshot) -> String {
    let phase = match snap.phase {
        Phase::NotStarted => "not started",
        Phase::Main => "main round",
        Phase::UnsoldRound => "unsold round",
        Phase::Complete => "complete",
    };
    let mut line = format!(
        "[{phase}] sold {} | unsold {} | left {} | requeued {}",
        snap.sold, snap.unsold, snap.main_remaining, snap.unsold_queued
    );
    if let Some(asset) = &snap.current_asset {
        line.push_str(&format!(" | on offer: {asset}"));
    }
    if snap.can_re_auction {
        line.push_str(" | reauction available");
    }
    if let Some(err) = &snap.persist_error {
        line.push_str(&format!(" | NOT SAVED: {err}"));
    }
    line
}

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "wicket=info,wicket_app=info,wicket_core=info,warn";

/// Route tracing to `logs/wicket.log`. The file is appended to, so a session
/// resumed after a crash keeps the log of the one before it.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let log_path = log_dir.join("wicket.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {e}"))
}
