use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::json_value::{as_f64_any, as_i32_any, as_u32_any, as_u64_any, str_at};
use crate::model::{
    Match, Matchday, Player, PlayerStat, Team, UNLISTED_POSITION, matchday_id,
};
use crate::stat_normalizer::normalize_member_stats;

const SIDES: [&str; 2] = ["homeCompetitor", "awayCompetitor"];
const UNKNOWN_NAME: &str = "Unknown";

/// Every row one match record contributes.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchExtract {
    pub round: u32,
    pub matchday: Matchday,
    pub game: Match,
    pub teams: Vec<Team>,
    pub players: Vec<Player>,
    pub stats: Vec<PlayerStat>,
}

pub fn extract_match_file(
    path: &Path,
    season_id: u64,
    folder_round: Option<u32>,
) -> Result<MatchExtract, SyncError> {
    let label = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|err| SyncError::parse(&label, err.to_string()))?;
    let record = serde_json::from_str::<Value>(raw.trim())
        .map_err(|err| SyncError::parse(&label, format!("invalid match json: {err}")))?;
    extract_match(&record, season_id, folder_round).map_err(|err| match err {
        SyncError::Parse { message, .. } => SyncError::parse(label, message),
        other => other,
    })
}

/// Pure transform of one provider match record. `folder_round` is used when the record carries
/// no `roundNum`.
pub fn extract_match(
    record: &Value,
    season_id: u64,
    folder_round: Option<u32>,
) -> Result<MatchExtract, SyncError> {
    let match_id = record
        .get("id")
        .and_then(as_u64_any)
        .ok_or_else(|| SyncError::parse("<record>", "missing match id"))?;

    let round = match (record.get("roundNum").and_then(as_u32_any), folder_round) {
        (Some(declared), Some(folder)) if declared != folder => {
            warn!(match_id, declared, folder, "roundNum disagrees with source folder");
            declared
        }
        (Some(declared), _) => declared,
        (None, Some(folder)) => folder,
        (None, None) => {
            return Err(SyncError::parse(
                "<record>",
                format!("match {match_id} has no roundNum"),
            ));
        }
    };
    let matchday = Matchday {
        matchday_id: matchday_id(season_id, round)?,
        season_id,
    };

    let directory = member_directory(record);
    let mut teams = Vec::with_capacity(2);
    let mut scores = [0i32; 2];
    let mut players = Vec::new();
    let mut stats = Vec::new();
    let mut seen_players = HashSet::new();

    for (idx, side) in SIDES.iter().enumerate() {
        let competitor = record.get(*side).unwrap_or(&Value::Null);
        let team_id = competitor
            .get("id")
            .and_then(as_u64_any)
            .ok_or_else(|| SyncError::parse("<record>", format!("{side} has no id")))?;
        let team_name = str_at(competitor, "name")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_NAME)
            .to_string();
        scores[idx] = competitor
            .get("score")
            .and_then(as_i32_any)
            .unwrap_or_else(|| {
                debug!(match_id, side = *side, "missing score, defaulting to 0");
                0
            });
        if !teams.iter().any(|t: &Team| t.team_id == team_id) {
            teams.push(Team {
                team_id,
                team_name,
                season_id,
            });
        }

        let members = competitor
            .get("lineups")
            .and_then(|l| l.get("members"))
            .and_then(|m| m.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        for member in members {
            let Some(player_id) = member.get("id").and_then(as_u64_any) else {
                debug!(match_id, side = *side, "lineup member without id skipped");
                continue;
            };
            if !seen_players.insert(player_id) {
                continue;
            }
            let listed = directory.get(&player_id);
            let player_name = listed
                .and_then(|d| d.name.clone())
                .or_else(|| str_at(member, "name").map(str::to_string))
                .unwrap_or_else(|| UNKNOWN_NAME.to_string());
            let jersey_number = listed
                .and_then(|d| d.jersey_number)
                .or_else(|| member.get("jerseyNumber").and_then(as_u32_any))
                .unwrap_or(0);
            let position = member
                .get("position")
                .and_then(|p| str_at(p, "shortName"))
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .unwrap_or(UNLISTED_POSITION)
                .to_string();
            players.push(Player {
                player_id,
                team_id,
                player_name,
                jersey_number,
                position,
                season_id,
            });

            let raw_stats = member
                .get("stats")
                .and_then(|s| s.as_array())
                .map(Vec::as_slice)
                .unwrap_or_default();
            stats.push(PlayerStat {
                player_id,
                team_id,
                match_id,
                season_id,
                values: normalize_member_stats(raw_stats),
            });
        }
    }

    let game = Match {
        match_id,
        matchday_id: matchday.matchday_id,
        home_team_id: teams[0].team_id,
        away_team_id: teams.last().map(|t| t.team_id).unwrap_or(teams[0].team_id),
        home_score: scores[0],
        away_score: scores[1],
        duration_minutes: match_duration(record),
        season_id,
    };

    Ok(MatchExtract {
        round,
        matchday,
        game,
        teams,
        players,
        stats,
    })
}

#[derive(Debug, Default)]
struct ListedMember {
    name: Option<String>,
    jersey_number: Option<u32>,
}

/// Top-level `members[]`: the provider's name/jersey directory for everyone in the lineups.
fn member_directory(record: &Value) -> HashMap<u64, ListedMember> {
    let mut out = HashMap::new();
    let Some(members) = record.get("members").and_then(|m| m.as_array()) else {
        return out;
    };
    for m in members {
        let Some(id) = m.get("id").and_then(as_u64_any) else {
            continue;
        };
        out.insert(
            id,
            ListedMember {
                name: str_at(m, "name")
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
                jersey_number: m.get("jerseyNumber").and_then(as_u32_any),
            },
        );
    }
    out
}

/// Played minutes from `actualPlayTime.totalTime.name` ("Tiempo total 99:06"), else the flat
/// `gameTime`, else 0.
pub fn match_duration(record: &Value) -> f64 {
    let total = record
        .get("actualPlayTime")
        .and_then(|a| a.get("totalTime"))
        .and_then(|t| str_at(t, "name"))
        .unwrap_or_default();
    if let Some(minutes) = parse_clock(total) {
        return minutes;
    }
    record
        .get("gameTime")
        .and_then(as_f64_any)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .unwrap_or(0.0)
}

/// Last whitespace token as `MM:SS`, in fractional minutes.
pub fn parse_clock(raw: &str) -> Option<f64> {
    let token = raw.split_whitespace().last()?;
    let (minutes, seconds) = token.split_once(':')?;
    let minutes = minutes.parse::<u32>().ok()?;
    let seconds = seconds.parse::<u32>().ok()?;
    if seconds >= 60 {
        return None;
    }
    Some(f64::from(minutes) + f64::from(seconds) / 60.0)
}
