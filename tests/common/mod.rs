#![allow(dead_code)]

use std::fs;
use std::path::Path;

use serde_json::{Value, json};

use matchday_sync::db::SqliteStore;
use matchday_sync::model::SeasonInfo;
use matchday_sync::scanner::SeasonPaths;

pub const COMPETITION: &str = "La Liga";
pub const SEASON: &str = "2024/2025";

pub struct Side<'a> {
    pub team_id: u64,
    pub name: &'a str,
    pub score: i64,
    pub players: &'a [u64],
}

pub fn side<'a>(team_id: u64, name: &'a str, score: i64, players: &'a [u64]) -> Side<'a> {
    Side {
        team_id,
        name,
        score,
        players,
    }
}

/// A provider match record; every lineup member gets minutes, goals and a pass ratio, plus any
/// `extra` stats.
pub fn match_json(match_id: u64, round: u32, home: Side<'_>, away: Side<'_>, extra: &[(&str, Value)]) -> Value {
    let lineup = |s: &Side<'_>| {
        s.players
            .iter()
            .map(|id| {
                let mut stats = vec![
                    json!({"name": "Minutos", "value": "90'"}),
                    json!({"name": "Goles", "value": format!("{} (0 pen)", id % 2)}),
                    json!({"name": "Pases completados", "value": "10/12"}),
                ];
                for (name, value) in extra {
                    stats.push(json!({"name": name, "value": value}));
                }
                json!({
                    "id": id,
                    "position": {"shortName": "MED"},
                    "stats": stats,
                })
            })
            .collect::<Vec<_>>()
    };
    let directory = home
        .players
        .iter()
        .chain(away.players.iter())
        .map(|id| json!({"id": id, "name": format!("Player {id}"), "jerseyNumber": id % 99}))
        .collect::<Vec<_>>();
    json!({
        "id": match_id,
        "roundNum": round,
        "actualPlayTime": {"totalTime": {"name": "Total 95:00"}},
        "homeCompetitor": {
            "id": home.team_id,
            "name": home.name,
            "score": home.score,
            "lineups": {"members": lineup(&home)},
        },
        "awayCompetitor": {
            "id": away.team_id,
            "name": away.name,
            "score": away.score,
            "lineups": {"members": lineup(&away)},
        },
        "members": directory,
    })
}

pub fn write_match(paths: &SeasonPaths, round: u32, n: u32, record: &Value) {
    let dir = paths.round_dir(round);
    fs::create_dir_all(&dir).expect("round dir");
    let json = serde_json::to_string_pretty(record).expect("serialize match");
    fs::write(dir.join(format!("{n}.json")), json).expect("write match");
}

pub fn write_raw(paths: &SeasonPaths, round: u32, name: &str, raw: &str) {
    let dir = paths.round_dir(round);
    fs::create_dir_all(&dir).expect("round dir");
    fs::write(dir.join(name), raw).expect("write raw file");
}

pub fn seeded_store() -> (SqliteStore, SeasonInfo) {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    let competition = store.ensure_competition(COMPETITION).expect("competition");
    let season = store
        .ensure_season(competition.competition_id, SEASON)
        .expect("season");
    (store, season)
}

pub fn season_paths(root: &Path, season: &SeasonInfo) -> SeasonPaths {
    SeasonPaths::new(root, &season.competition_name, &season.season_name)
}

pub fn count(store: &SqliteStore, sql: &str) -> i64 {
    store
        .connection()
        .query_row(sql, [], |row| row.get::<_, i64>(0))
        .expect("count query")
}

/// Two matches per round between four teams, eleven-ish players each.
pub fn write_standard_round(paths: &SeasonPaths, round: u32) {
    let base = u64::from(round) * 1000;
    write_match(
        paths,
        round,
        1,
        &match_json(
            base + 1,
            round,
            side(10, "Real Betis", 1, &[101, 102, 103]),
            side(20, "Sevilla", 0, &[201, 202]),
            &[],
        ),
    );
    write_match(
        paths,
        round,
        2,
        &match_json(
            base + 2,
            round,
            side(30, "Valencia", 2, &[301, 302]),
            side(40, "Villarreal", 2, &[401, 402, 403]),
            &[],
        ),
    );
}
