// Team budget projection.
//
// Derives a team's budget figures from its current roster. Always computed
// fresh from the roster handed in; nothing here is cached.

use serde::{Deserialize, Serialize};

/// Points each team starts the auction with.
pub const TOTAL_BUDGET: i64 = 400_000;
/// Squad size every team must reach.
pub const REQUIRED_PLAYERS: u32 = 11;
/// Minimum price of a player.
pub const BASE_POINT: i64 = 1_000;

/// The budget rules the projection applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRules {
    pub total_points: i64,
    pub required_players: u32,
    pub base_point: i64,
}

impl Default for StatsRules {
    fn default() -> Self {
        StatsRules {
            total_points: TOTAL_BUDGET,
            required_players: REQUIRED_PLAYERS,
            base_point: BASE_POINT,
        }
    }
}

/// A rostered player as delivered by the data API. Only `points` matters to
/// the projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterPlayer {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub points: Option<i64>,
}

impl RosterPlayer {
    pub fn with_points(points: i64) -> Self {
        RosterPlayer {
            id: None,
            points: Some(points),
        }
    }
}

/// Budget figures for one team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub total_budget: i64,
    pub points_used: i64,
    pub balance: i64,
    pub players_bought: usize,
    /// Highest bid that still leaves the base price for every remaining
    /// slot. Not clamped: an overspent team reports a negative value.
    pub max_bid_allowed: i64,
}

/// Project budget figures using the standard auction rules.
pub fn project_stats(players: &[RosterPlayer]) -> TeamStats {
    project_stats_with(&StatsRules::default(), players)
}

pub fn project_stats_with(rules: &StatsRules, players: &[RosterPlayer]) -> TeamStats {
    let points_used: i64 = players.iter().map(|p| p.points.unwrap_or(0)).sum();
    let balance = rules.total_points - points_used;
    let players_bought = players.len();

    let required = rules.required_players as usize;
    let max_bid_allowed = if players_bought < required {
        let slots_after_this = (required - players_bought - 1) as i64;
        balance - slots_after_this * rules.base_point
    } else {
        0
    };

    TeamStats {
        total_budget: rules.total_points,
        points_used,
        balance,
        players_bought,
        max_bid_allowed,
    }
}

/// Project from loosely-typed JSON. Anything other than an array counts as
/// an empty roster; entries without numeric points count as zero points.
pub fn project_stats_value(rules: &StatsRules, roster: &serde_json::Value) -> TeamStats {
    let players: Vec<RosterPlayer> = roster
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|entry| RosterPlayer {
                    id: entry.get("id").and_then(|v| v.as_i64()),
                    points: entry.get("points").and_then(|v| {
                        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
                    }),
                })
                .collect()
        })
        .unwrap_or_default();
    project_stats_with(rules, &players)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_roster() {
        let stats = project_stats(&[]);
        assert_eq!(
            stats,
            TeamStats {
                total_budget: 400_000,
                points_used: 0,
                balance: 400_000,
                players_bought: 0,
                max_bid_allowed: 390_000,
            }
        );
    }

    #[test]
    fn partial_roster() {
        let players = vec![
            RosterPlayer::with_points(25_000),
            RosterPlayer::with_points(10_000),
            RosterPlayer::default(),
        ];
        let stats = project_stats(&players);
        assert_eq!(stats.points_used, 35_000);
        assert_eq!(stats.balance, 365_000);
        assert_eq!(stats.players_bought, 3);
        // 365000 - (11 - 3 - 1) * 1000
        assert_eq!(stats.max_bid_allowed, 358_000);
    }

    #[test]
    fn overspent_team_goes_negative() {
        let players = vec![RosterPlayer::with_points(50_000); 8];
        let stats = project_stats(&players);
        assert_eq!(stats.points_used, 400_000);
        assert_eq!(stats.balance, 0);
        assert_eq!(stats.players_bought, 8);
        assert_eq!(stats.max_bid_allowed, -2_000);
    }

    #[test]
    fn full_squad_has_no_bid_allowance() {
        let players = vec![RosterPlayer::with_points(1_000); 11];
        let stats = project_stats(&players);
        assert_eq!(stats.players_bought, 11);
        assert_eq!(stats.max_bid_allowed, 0);
        assert_eq!(stats.balance, 389_000);
    }

    #[test]
    fn last_slot_may_spend_entire_balance() {
        let players = vec![RosterPlayer::with_points(20_000); 10];
        let stats = project_stats(&players);
        assert_eq!(stats.max_bid_allowed, stats.balance);
    }

    #[test]
    fn custom_rules_apply() {
        let rules = StatsRules {
            total_points: 100,
            required_players: 3,
            base_point: 10,
        };
        let stats = project_stats_with(&rules, &[RosterPlayer::with_points(40)]);
        assert_eq!(stats.total_budget, 100);
        assert_eq!(stats.balance, 60);
        assert_eq!(stats.max_bid_allowed, 50);
    }

    #[test]
    fn json_non_list_is_empty_roster() {
        let rules = StatsRules::default();
        assert_eq!(project_stats_value(&rules, &json!(null)), project_stats(&[]));
        assert_eq!(
            project_stats_value(&rules, &json!({"data": []})),
            project_stats(&[])
        );
    }

    #[test]
    fn json_missing_points_count_as_zero() {
        let rules = StatsRules::default();
        let roster = json!([
            {"id": 1, "points": 12000},
            {"id": 2, "points": null},
            {"id": 3},
            {"id": 4, "points": 3000.0}
        ]);
        let stats = project_stats_value(&rules, &roster);
        assert_eq!(stats.points_used, 15_000);
        assert_eq!(stats.players_bought, 4);
    }
}
