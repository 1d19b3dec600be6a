// Read-only roster data source.
//
// Teams and their rostered players come from a Directus-style HTTP API that
// wraps every listing in `{"data": [...]}`. Only the budget projection reads
// from here; nothing is ever written back.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::Deserialize;
use tracing::{debug, info};
use wicket_core::stats::{project_stats_value, StatsRules};

use crate::protocol::TeamStatsEntry;

/// Upper bound on listing size; the API pages by default.
const LIST_LIMIT: u32 = 100_000;

/// A franchise as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Team {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub team_logo: Option<String>,
}

impl Team {
    fn matches_gender(&self, gender: &str) -> bool {
        self.gender
            .as_deref()
            .is_some_and(|g| g.eq_ignore_ascii_case(gender))
    }
}

#[derive(Debug, Deserialize)]
struct ItemsResponse<T> {
    data: T,
}

/// Where team and roster listings come from.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch_teams(&self) -> Result<Vec<Team>>;

    /// The raw player listing for one team. Kept loosely typed; the
    /// projection tolerates missing or malformed fields.
    async fn fetch_team_players(&self, team_id: i64) -> Result<serde_json::Value>;
}

/// [`RosterSource`] backed by the HTTP API.
pub struct HttpRosterSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRosterSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpRosterSource {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn teams_url(&self) -> String {
        format!("{}/items/Teams?limit={}", self.base_url, LIST_LIMIT)
    }

    pub fn team_players_url(&self, team_id: i64) -> String {
        format!(
            "{}/items/Players?filter[team][_eq]={}&limit={}",
            self.base_url, team_id, LIST_LIMIT
        )
    }

    async fn get_items<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{url} returned an error status"))?;
        let body: ItemsResponse<T> = response
            .json()
            .await
            .with_context(|| format!("unexpected response body from {url}"))?;
        Ok(body.data)
    }
}

#[async_trait]
impl RosterSource for HttpRosterSource {
    async fn fetch_teams(&self) -> Result<Vec<Team>> {
        self.get_items(&self.teams_url()).await
    }

    async fn fetch_team_players(&self, team_id: i64) -> Result<serde_json::Value> {
        self.get_items(&self.team_players_url(team_id)).await
    }
}

/// Fetch every team of the given gender and project its budget figures.
/// Any failed request fails the whole refresh.
pub async fn load_team_stats(
    source: &dyn RosterSource,
    gender: &str,
    rules: &StatsRules,
) -> Result<Vec<TeamStatsEntry>> {
    let teams: Vec<Team> = source
        .fetch_teams()
        .await
        .context("failed to fetch teams")?
        .into_iter()
        .filter(|team| team.matches_gender(gender))
        .collect();

    let rosters = try_join_all(teams.iter().map(|team| async move {
        source
            .fetch_team_players(team.id)
            .await
            .with_context(|| format!("failed to fetch roster for team {}", team.id))
    }))
    .await?;

    let entries: Vec<TeamStatsEntry> = teams
        .into_iter()
        .zip(rosters)
        .map(|(team, roster)| TeamStatsEntry {
            team_id: team.id,
            team_name: team.name,
            stats: project_stats_value(rules, &roster),
        })
        .collect();

    info!("Projected budgets for {} {} teams", entries.len(), gender);
    Ok(entries)
}
