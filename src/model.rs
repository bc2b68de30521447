use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Matchday ids are `season_id * MATCHDAY_STRIDE + round`.
pub const MATCHDAY_STRIDE: u64 = 50;
pub const MAX_ROUND: u32 = (MATCHDAY_STRIDE - 1) as u32;

/// Position given to roster members the provider lists without one.
pub const UNLISTED_POSITION: &str = "Bench";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Matchday,
    Team,
    Player,
    FootballGame,
    PlayerStats,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Matchday => "matchday",
            Table::Team => "team",
            Table::Player => "player",
            Table::FootballGame => "football_game",
            Table::PlayerStats => "player_stats",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn matchday_id(season_id: u64, round: u32) -> Result<u64, SyncError> {
    if round == 0 || round > MAX_ROUND {
        return Err(SyncError::RoundOutOfRange {
            round,
            max: MAX_ROUND,
        });
    }
    Ok(season_id * MATCHDAY_STRIDE + u64::from(round))
}

pub fn round_of_matchday(season_id: u64, matchday_id: u64) -> Option<u32> {
    let round = matchday_id.checked_sub(season_id * MATCHDAY_STRIDE)?;
    if round == 0 || round > u64::from(MAX_ROUND) {
        return None;
    }
    u32::try_from(round).ok()
}

/// `"Premier League"` -> `"premier_league"`.
pub fn normalize_competition_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// `"2024/2025"` -> `"2024_2025"`.
pub fn normalize_season_name(raw: &str) -> String {
    raw.trim().replace(['/', ' '], "_")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Competition {
    pub competition_id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonInfo {
    pub season_id: u64,
    pub competition_id: u64,
    pub competition_name: String,
    pub season_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matchday {
    pub matchday_id: u64,
    pub season_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub team_id: u64,
    pub team_name: String,
    pub season_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub player_id: u64,
    pub team_id: u64,
    pub player_name: String,
    pub jersey_number: u32,
    pub position: String,
    pub season_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub match_id: u64,
    pub matchday_id: u64,
    pub home_team_id: u64,
    pub away_team_id: u64,
    pub home_score: i32,
    pub away_score: i32,
    pub duration_minutes: f64,
    pub season_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStat {
    pub player_id: u64,
    pub team_id: u64,
    pub match_id: u64,
    pub season_id: u64,
    pub values: BTreeMap<String, f64>,
}

impl PlayerStat {
    pub fn key(&self) -> (u64, u64, u64) {
        (self.player_id, self.team_id, self.match_id)
    }

    /// Absent categories read as zero.
    pub fn value(&self, category: &str) -> f64 {
        self.values.get(category).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamMetadata {
    pub city: String,
    pub stadium: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matchday_ids_are_offset_by_season() {
        assert_eq!(matchday_id(3, 1).unwrap(), 151);
        assert_eq!(matchday_id(3, 49).unwrap(), 199);
        assert_eq!(matchday_id(4, 1).unwrap(), 201);
        assert_eq!(round_of_matchday(3, 151), Some(1));
        assert_eq!(round_of_matchday(3, 150), None);
    }

    #[test]
    fn rounds_that_would_collide_are_rejected() {
        assert_eq!(
            matchday_id(3, 50),
            Err(SyncError::RoundOutOfRange { round: 50, max: 49 })
        );
        assert!(matchday_id(3, 0).is_err());
    }

    #[test]
    fn catalog_names_are_normalized() {
        assert_eq!(normalize_competition_name(" Premier  League "), "premier_league");
        assert_eq!(normalize_season_name("2024/2025"), "2024_2025");
    }
}
