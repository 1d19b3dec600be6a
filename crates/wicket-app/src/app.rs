// Application event loop.
//
// Single owner of the auction controller. Operator commands, reveal frames
// and team stats results arrive over mpsc channels and are handled one at a
// time inside a `tokio::select!`; every handled event ends with a fresh
// snapshot pushed to the front-end, so the view is always re-rendered from
// in-memory state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wicket_core::config::Config;
use wicket_core::stats::StatsRules;

use crate::animation::{RevealEvent, RevealPlan, RevealTask};
use crate::controller::AuctionController;
use crate::protocol::{TeamStatsEntry, UiUpdate, UserCommand};
use crate::roster::{load_team_stats, RosterSource};

/// Everything needed to refresh team budgets on demand.
#[derive(Clone)]
pub struct StatsRefresher {
    pub source: Arc<dyn RosterSource>,
    pub gender: String,
    pub rules: StatsRules,
}

/// Outcome of one background stats refresh, tagged like reveal events.
struct StatsResult {
    generation: u64,
    result: anyhow::Result<Vec<TeamStatsEntry>>,
}

impl StatsRefresher {
    /// Fetch and project in the background, reporting back to the loop.
    fn fetch(&self, generation: u64, tx: mpsc::Sender<StatsResult>) -> JoinHandle<()> {
        let refresher = self.clone();
        tokio::spawn(async move {
            let result =
                load_team_stats(refresher.source.as_ref(), &refresher.gender, &refresher.rules)
                    .await;
            let _ = tx.send(StatsResult { generation, result }).await;
        })
    }
}

pub struct AppOptions {
    /// Delay between reveal frames.
    pub tick_interval: Duration,
    /// Team budget refresh; `None` when no roster API is configured.
    pub stats: Option<StatsRefresher>,
}

impl AppOptions {
    pub fn from_config(config: &Config, source: Option<Arc<dyn RosterSource>>) -> Self {
        AppOptions {
            tick_interval: config.animation.tick_interval(),
            stats: source.map(|source| StatsRefresher {
                source,
                gender: config.roster.team_gender.clone(),
                rules: config.budget,
            }),
        }
    }
}

/// The controller plus whichever reveal and stats refresh are in flight.
struct DrawSession {
    controller: AuctionController,
    reveal: Option<RevealTask>,
    /// Bumped whenever a reveal starts or is cancelled; events tagged with
    /// any other value are stale.
    reveal_generation: u64,
    reveal_tx: mpsc::Sender<RevealEvent>,
    tick: Duration,
    stats: Option<StatsRefresher>,
    stats_task: Option<JoinHandle<()>>,
    /// Only the most recently requested refresh may reach the front-end.
    stats_generation: u64,
    stats_tx: mpsc::Sender<StatsResult>,
}

impl DrawSession {
    fn play(&mut self, plan: RevealPlan) {
        self.cancel_reveal();
        self.reveal_generation += 1;
        debug!(
            "Revealing {} over {} frames (gen: {})",
            plan.target,
            plan.frames.len(),
            self.reveal_generation
        );
        self.reveal = Some(RevealTask::spawn(
            self.reveal_generation,
            plan,
            self.tick,
            self.reveal_tx.clone(),
        ));
    }

    fn cancel_reveal(&mut self) {
        if let Some(task) = self.reveal.take() {
            debug!("Cancelling reveal of {} (gen: {})", task.target(), task.generation());
            task.cancel();
            self.reveal_generation += 1;
        }
    }

    /// Start a stats refresh, superseding any still running. Returns `false`
    /// when no roster source is configured.
    fn refresh_stats(&mut self) -> bool {
        let Some(stats) = &self.stats else {
            return false;
        };
        if let Some(task) = self.stats_task.take() {
            task.abort();
        }
        self.stats_generation += 1;
        debug!("Refreshing team stats (gen: {})", self.stats_generation);
        self.stats_task = Some(stats.fetch(self.stats_generation, self.stats_tx.clone()));
        true
    }

    fn shutdown(&mut self) {
        self.cancel_reveal();
        if let Some(task) = self.stats_task.take() {
            task.abort();
        }
    }

    async fn push_snapshot(&self, ui_tx: &mpsc::Sender<UiUpdate>) {
        let snapshot = UiUpdate::Snapshot(Box::new(self.controller.snapshot()));
        let _ = ui_tx.send(snapshot).await;
    }
}

/// Run the event loop until `Quit` or until the command channel closes.
///
/// On entry the saved auction is resumed; an interrupted reveal is replayed
/// from the start.
pub async fn run(
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    controller: AuctionController,
    options: AppOptions,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    let (reveal_tx, mut reveal_rx) = mpsc::channel(64);
    let (stats_tx, mut stats_rx) = mpsc::channel(8);
    let mut session = DrawSession {
        controller,
        reveal: None,
        reveal_generation: 0,
        reveal_tx,
        tick: options.tick_interval,
        stats: options.stats,
        stats_task: None,
        stats_generation: 0,
        stats_tx,
    };

    let replay = session.controller.resume();
    session.push_snapshot(&ui_tx).await;
    if let Some(plan) = replay {
        session.play(plan);
    }
    session.refresh_stats();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => {
                        handle_user_command(&mut session, cmd, &ui_tx).await;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            Some(event) = reveal_rx.recv() => {
                handle_reveal_event(&mut session, event, &ui_tx).await;
            }

            Some(stats) = stats_rx.recv() => {
                handle_stats_result(&mut session, stats, &ui_tx).await;
            }
        }
    }

    session.shutdown();
    info!("Application event loop exiting");
    Ok(())
}

async fn handle_user_command(
    session: &mut DrawSession,
    cmd: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    debug!("User command: {:?}", cmd);

    let reveal = match cmd {
        UserCommand::Start => {
            let plan = session.controller.start();
            if plan.is_none() && session.controller.state().is_started() {
                notice(ui_tx, "auction already started").await;
            }
            plan
        }
        UserCommand::Sold | UserCommand::Unsold => {
            if !session.controller.snapshot().can_resolve() {
                notice(ui_tx, "no revealed player to resolve").await;
                return;
            }
            let plan = if cmd == UserCommand::Sold {
                session.controller.sold()
            } else {
                session.controller.unsold()
            };
            session.refresh_stats();
            plan
        }
        UserCommand::ReAuctionUnsold => {
            if !session.controller.can_re_auction_unsold() {
                notice(ui_tx, "re-auction needs a completed auction with unsold players").await;
                return;
            }
            session.controller.re_auction_unsold()
        }
        UserCommand::Reset => {
            // A failed reset leaves the auction as it was, running reveal
            // included.
            match session.controller.reset() {
                Ok(()) => session.cancel_reveal(),
                Err(e) => {
                    error!("Reset failed: {:#}", e);
                    notice(ui_tx, &format!("reset failed: {e:#}")).await;
                }
            }
            None
        }
        UserCommand::RefreshStats => {
            if !session.refresh_stats() {
                notice(ui_tx, "no roster source configured").await;
            }
            return;
        }
        // Handled by the loop.
        UserCommand::Quit => return,
    };

    if let Some(plan) = reveal {
        session.play(plan);
    }
    session.push_snapshot(ui_tx).await;
}

async fn handle_reveal_event(
    session: &mut DrawSession,
    event: RevealEvent,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    if event.generation() != session.reveal_generation {
        debug!(
            "Discarding stale reveal event (gen {} != current {})",
            event.generation(),
            session.reveal_generation
        );
        return;
    }

    match event {
        RevealEvent::Frame { display, .. } => {
            let _ = ui_tx.send(UiUpdate::AnimationFrame { display }).await;
        }
        RevealEvent::Done { target, .. } => {
            session.reveal = None;
            if session.controller.finish_reveal(target) {
                let _ = ui_tx.send(UiUpdate::Revealed { id: target }).await;
            }
            session.push_snapshot(ui_tx).await;
        }
    }
}

async fn handle_stats_result(
    session: &mut DrawSession,
    stats: StatsResult,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    if stats.generation != session.stats_generation {
        debug!(
            "Discarding stale team stats (gen {} != current {})",
            stats.generation, session.stats_generation
        );
        return;
    }
    session.stats_task = None;

    match stats.result {
        Ok(entries) => {
            let _ = ui_tx.send(UiUpdate::TeamStats(entries)).await;
        }
        Err(e) => {
            warn!("Team stats refresh failed: {:#}", e);
            notice(ui_tx, &format!("team stats unavailable: {e}")).await;
        }
    }
}

async fn notice(ui_tx: &mpsc::Sender<UiUpdate>, message: &str) {
    let _ = ui_tx.send(UiUpdate::Notice(message.to_string())).await;
}
