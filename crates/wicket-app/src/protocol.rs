// Messages exchanged between the event loop and the operator front-end.

use std::str::FromStr;

use serde::Serialize;
use wicket_core::draw::{Identifier, Phase};
use wicket_core::stats::TeamStats;

/// Commands issued by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Start,
    Sold,
    Unsold,
    Reset,
    ReAuctionUnsold,
    RefreshStats,
    Quit,
}

impl FromStr for UserCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(UserCommand::Start),
            "sold" | "s" => Ok(UserCommand::Sold),
            "unsold" | "u" => Ok(UserCommand::Unsold),
            "reset" => Ok(UserCommand::Reset),
            "reauction" | "re-auction" | "reauction-unsold" => Ok(UserCommand::ReAuctionUnsold),
            "stats" => Ok(UserCommand::RefreshStats),
            "quit" | "q" | "exit" => Ok(UserCommand::Quit),
            other => Err(format!("unknown command: {other}")),
        }
    }
}

/// Everything a front-end needs to render the draw panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawSnapshot {
    pub phase: Phase,
    pub current_id: Option<Identifier>,
    /// Image asset for the current card, if one is on offer.
    pub current_asset: Option<String>,
    /// A reveal is running; Sold/Unsold are disabled.
    pub revealing: bool,
    pub main_remaining: usize,
    pub unsold_queued: usize,
    pub sold: usize,
    pub unsold: usize,
    pub can_re_auction: bool,
    /// Most recent persistence failure, cleared by the next successful save.
    pub persist_error: Option<String>,
}

impl DrawSnapshot {
    /// Sold/Unsold are only meaningful for a fully revealed card.
    pub fn can_resolve(&self) -> bool {
        self.current_id.is_some() && !self.revealing
    }
}

/// Budget figures for one team, tagged with the team it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamStatsEntry {
    pub team_id: i64,
    pub team_name: String,
    pub stats: TeamStats,
}

/// Updates pushed from the event loop to the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Snapshot(Box<DrawSnapshot>),
    /// One frame of a running reveal.
    AnimationFrame { display: Identifier },
    /// The reveal settled on `id`.
    Revealed { id: Identifier },
    TeamStats(Vec<TeamStatsEntry>),
    /// Informational message (ignored command, failed refresh, ...).
    Notice(String),
}
