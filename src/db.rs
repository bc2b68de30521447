use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Params, params};

use crate::gateway::{ResetCounts, Store, SyncRun};
use crate::model::{
    Competition, MAX_ROUND, Match, Matchday, Player, PlayerStat, SeasonInfo, Team, TeamMetadata,
    matchday_id, normalize_competition_name, normalize_season_name, round_of_matchday,
};
use crate::stat_normalizer::Vocabulary;

const DB_FILE: &str = "matchday_sync.sqlite";

pub fn default_db_path() -> Option<PathBuf> {
    crate::config::app_data_dir().map(|dir| dir.join(DB_FILE))
}

/// Where a season stands, for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonStatus {
    pub last_round: Option<u32>,
    pub last_inserted_at: Option<DateTime<Utc>>,
    pub days_since_update: Option<i64>,
}

/// Player stats of a season laid out one column per category, zero where a row has no value.
#[derive(Debug, Clone, PartialEq)]
pub struct WideStats {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db dir {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("enable foreign keys")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `sql` once per parameter set inside a single transaction.
    fn execute_many<P, I>(&mut self, sql: &str, rows: I) -> Result<usize>
    where
        P: Params,
        I: IntoIterator<Item = P>,
    {
        let tx = self.conn.transaction().context("begin batch transaction")?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare_cached(sql).context("prepare batch statement")?;
            for params in rows {
                inserted += stmt.execute(params).context("execute batch row")?;
            }
        }
        tx.commit().context("commit batch transaction")?;
        Ok(inserted)
    }

    fn query_set<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<HashSet<T>>
    where
        T: Eq + std::hash::Hash,
        P: Params,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare_cached(sql).context("prepare key query")?;
        let rows = stmt.query_map(params, map).context("run key query")?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row.context("decode key row")?);
        }
        Ok(out)
    }

    pub fn ensure_competition(&mut self, raw_name: &str) -> Result<Competition> {
        let name = normalize_competition_name(raw_name);
        if name.is_empty() {
            return Err(anyhow!("competition name is empty"));
        }
        self.conn
            .execute(
                "INSERT OR IGNORE INTO competition (competition_name) VALUES (?1)",
                params![name],
            )
            .context("insert competition")?;
        let competition_id = self
            .conn
            .query_row(
                "SELECT competition_id FROM competition WHERE competition_name = ?1",
                params![name],
                |row| row.get::<_, u64>(0),
            )
            .context("query competition id")?;
        Ok(Competition {
            competition_id,
            name,
        })
    }

    pub fn competitions(&self) -> Result<Vec<Competition>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT competition_id, competition_name FROM competition ORDER BY competition_id",
            )
            .context("prepare competitions query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Competition {
                    competition_id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .context("query competitions")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode competition row")?);
        }
        Ok(out)
    }

    pub fn ensure_season(&mut self, competition_id: u64, raw_name: &str) -> Result<SeasonInfo> {
        let season_name = normalize_season_name(raw_name);
        if season_name.is_empty() {
            return Err(anyhow!("season name is empty"));
        }
        self.conn
            .execute(
                "INSERT OR IGNORE INTO season (competition_id, season_name) VALUES (?1, ?2)",
                params![competition_id as i64, season_name],
            )
            .context("insert season")?;
        self.seasons(competition_id)?
            .into_iter()
            .find(|s| s.season_name == season_name)
            .ok_or_else(|| anyhow!("season {season_name} missing after insert"))
    }

    pub fn seasons(&self, competition_id: u64) -> Result<Vec<SeasonInfo>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT s.season_id, s.competition_id, c.competition_name, s.season_name
                FROM season s
                JOIN competition c ON c.competition_id = s.competition_id
                WHERE s.competition_id = ?1
                ORDER BY s.season_id
                "#,
            )
            .context("prepare seasons query")?;
        let rows = stmt
            .query_map(params![competition_id as i64], season_from_row)
            .context("query seasons")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode season row")?);
        }
        Ok(out)
    }

    /// Creates matchday rows 1..=rounds up front. Existing rows are left alone.
    pub fn preallocate_matchdays(&mut self, season_id: u64, rounds: u32) -> Result<usize> {
        if rounds > MAX_ROUND {
            return Err(anyhow!(
                "season {season_id}: {rounds} rounds exceed the {MAX_ROUND} a matchday id can encode"
            ));
        }
        let mut rows = Vec::with_capacity(rounds as usize);
        for round in 1..=rounds {
            rows.push((matchday_id(season_id, round)? as i64, season_id as i64));
        }
        self.execute_many(
            "INSERT OR IGNORE INTO matchday (matchday_id, season_id) VALUES (?1, ?2)",
            rows,
        )
    }

    pub fn season_status(&self, season_id: u64) -> Result<SeasonStatus> {
        let last_round = self.last_synced_round(season_id)?;
        let last_inserted_at = self
            .conn
            .query_row(
                "SELECT MAX(inserted_at) FROM football_game WHERE season_id = ?1",
                params![season_id as i64],
                |row| row.get::<_, Option<String>>(0),
            )
            .context("query last insert time")?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc));
        let days_since_update = last_inserted_at.map(|t| (Utc::now() - t).num_days());
        Ok(SeasonStatus {
            last_round,
            last_inserted_at,
            days_since_update,
        })
    }

    pub fn player_stats_wide(&self, season_id: u64) -> Result<WideStats> {
        let season = self
            .season(season_id)?
            .ok_or_else(|| anyhow!("season {season_id} is not registered"))?;
        let vocabulary = Vocabulary::with_categories(self.categories(season.competition_id)?);
        let columns = vocabulary.columns();
        let index = columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect::<HashMap<_, _>>();

        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT ps.player_id, ps.match_id, v.stat_name, v.value
                FROM player_stats ps
                LEFT JOIN player_stat_value v
                  ON v.player_id = ps.player_id
                 AND v.team_id = ps.team_id
                 AND v.match_id = ps.match_id
                WHERE ps.season_id = ?1
                ORDER BY ps.match_id, ps.player_id, ps.team_id
                "#,
            )
            .context("prepare wide stats query")?;
        let rows = stmt
            .query_map(params![season_id as i64], |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                ))
            })
            .context("query wide stats")?;

        let mut out: Vec<Vec<f64>> = Vec::new();
        let mut current: Option<(u64, u64)> = None;
        for row in rows {
            let (player_id, match_id, stat_name, value) = row.context("decode wide stat row")?;
            if current != Some((player_id, match_id)) {
                let mut fresh = vec![0.0; columns.len()];
                fresh[0] = player_id as f64;
                fresh[1] = match_id as f64;
                out.push(fresh);
                current = Some((player_id, match_id));
            }
            if let (Some(name), Some(value), Some(last)) = (stat_name, value, out.last_mut())
                && let Some(idx) = index.get(name.as_str())
            {
                last[*idx] = value;
            }
        }
        Ok(WideStats { columns, rows: out })
    }
}

fn season_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SeasonInfo> {
    Ok(SeasonInfo {
        season_id: row.get(0)?,
        competition_id: row.get(1)?,
        competition_name: row.get(2)?,
        season_name: row.get(3)?,
    })
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS competition (
            competition_id INTEGER PRIMARY KEY AUTOINCREMENT,
            competition_name TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS season (
            season_id INTEGER PRIMARY KEY AUTOINCREMENT,
            competition_id INTEGER NOT NULL REFERENCES competition(competition_id),
            season_name TEXT NOT NULL,
            UNIQUE (competition_id, season_name)
        );
        CREATE TABLE IF NOT EXISTS team (
            team_id INTEGER NOT NULL,
            team_name TEXT NOT NULL,
            season_id INTEGER NOT NULL REFERENCES season(season_id),
            city TEXT NULL,
            stadium TEXT NULL,
            PRIMARY KEY (team_id, season_id)
        );
        CREATE TABLE IF NOT EXISTS matchday (
            matchday_id INTEGER PRIMARY KEY,
            season_id INTEGER NOT NULL REFERENCES season(season_id)
        );
        CREATE TABLE IF NOT EXISTS football_game (
            match_id INTEGER PRIMARY KEY,
            matchday_id INTEGER NOT NULL REFERENCES matchday(matchday_id),
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            home_score INTEGER NOT NULL,
            away_score INTEGER NOT NULL,
            duration REAL NOT NULL,
            season_id INTEGER NOT NULL,
            inserted_at TEXT NOT NULL,
            FOREIGN KEY (home_team_id, season_id) REFERENCES team(team_id, season_id),
            FOREIGN KEY (away_team_id, season_id) REFERENCES team(team_id, season_id)
        );
        CREATE INDEX IF NOT EXISTS idx_football_game_season ON football_game(season_id);
        CREATE TABLE IF NOT EXISTS player (
            player_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            player_name TEXT NOT NULL,
            jersey_number INTEGER NOT NULL,
            position TEXT NOT NULL,
            season_id INTEGER NOT NULL,
            PRIMARY KEY (player_id, season_id),
            FOREIGN KEY (team_id, season_id) REFERENCES team(team_id, season_id)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_player_team_season
            ON player(player_id, team_id, season_id);
        CREATE TABLE IF NOT EXISTS player_stats (
            player_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            match_id INTEGER NOT NULL REFERENCES football_game(match_id),
            season_id INTEGER NOT NULL,
            PRIMARY KEY (player_id, team_id, match_id),
            FOREIGN KEY (player_id, team_id, season_id)
                REFERENCES player(player_id, team_id, season_id)
        );
        CREATE INDEX IF NOT EXISTS idx_player_stats_season ON player_stats(season_id);
        CREATE TABLE IF NOT EXISTS player_stat_value (
            player_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            match_id INTEGER NOT NULL,
            stat_name TEXT NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY (player_id, team_id, match_id, stat_name),
            FOREIGN KEY (player_id, team_id, match_id)
                REFERENCES player_stats(player_id, team_id, match_id) ON DELETE CASCADE
        );
        CREATE TABLE IF NOT EXISTS stat_category (
            competition_id INTEGER NOT NULL REFERENCES competition(competition_id),
            stat_name TEXT NOT NULL,
            first_seen_at TEXT NOT NULL,
            PRIMARY KEY (competition_id, stat_name)
        );
        CREATE TABLE IF NOT EXISTS sync_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            rounds_json TEXT NOT NULL,
            rows_inserted_json TEXT NOT NULL,
            errors_json TEXT NOT NULL,
            outcome TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

impl Store for SqliteStore {
    fn season(&self, season_id: u64) -> Result<Option<SeasonInfo>> {
        self.conn
            .query_row(
                r#"
                SELECT s.season_id, s.competition_id, c.competition_name, s.season_name
                FROM season s
                JOIN competition c ON c.competition_id = s.competition_id
                WHERE s.season_id = ?1
                "#,
                params![season_id as i64],
                season_from_row,
            )
            .optional()
            .context("query season")
    }

    fn last_synced_round(&self, season_id: u64) -> Result<Option<u32>> {
        let max_matchday = self
            .conn
            .query_row(
                "SELECT MAX(matchday_id) FROM football_game WHERE season_id = ?1",
                params![season_id as i64],
                |row| row.get::<_, Option<u64>>(0),
            )
            .context("query last synced matchday")?;
        Ok(max_matchday.and_then(|id| round_of_matchday(season_id, id)))
    }

    fn matchday_ids(&self, season_id: u64) -> Result<HashSet<u64>> {
        self.query_set(
            "SELECT matchday_id FROM matchday WHERE season_id = ?1",
            params![season_id as i64],
            |row| row.get::<_, u64>(0),
        )
    }

    fn team_ids(&self, season_id: u64) -> Result<HashSet<u64>> {
        self.query_set(
            "SELECT team_id FROM team WHERE season_id = ?1",
            params![season_id as i64],
            |row| row.get::<_, u64>(0),
        )
    }

    fn player_team_pairs(&self, season_id: u64) -> Result<HashSet<(u64, u64)>> {
        self.query_set(
            "SELECT player_id, team_id FROM player WHERE season_id = ?1",
            params![season_id as i64],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )
    }

    fn match_ids(&self) -> Result<HashSet<u64>> {
        self.query_set("SELECT match_id FROM football_game", [], |row| {
            row.get::<_, u64>(0)
        })
    }

    fn player_stat_keys(&self) -> Result<HashSet<(u64, u64, u64)>> {
        self.query_set(
            "SELECT player_id, team_id, match_id FROM player_stats",
            [],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, u64>(2)?,
                ))
            },
        )
    }

    fn insert_matchdays(&mut self, rows: &[Matchday]) -> Result<usize> {
        self.execute_many(
            "INSERT INTO matchday (matchday_id, season_id) VALUES (?1, ?2)",
            rows.iter()
                .map(|m| (m.matchday_id as i64, m.season_id as i64)),
        )
        .context("insert matchdays")
    }

    fn insert_teams(&mut self, rows: &[Team]) -> Result<usize> {
        self.execute_many(
            "INSERT INTO team (team_id, team_name, season_id) VALUES (?1, ?2, ?3)",
            rows.iter()
                .map(|t| (t.team_id as i64, t.team_name.as_str(), t.season_id as i64)),
        )
        .context("insert teams")
    }

    fn insert_players(&mut self, rows: &[Player]) -> Result<usize> {
        self.execute_many(
            r#"
            INSERT INTO player (player_id, team_id, player_name, jersey_number, position, season_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            rows.iter().map(|p| {
                (
                    p.player_id as i64,
                    p.team_id as i64,
                    p.player_name.as_str(),
                    i64::from(p.jersey_number),
                    p.position.as_str(),
                    p.season_id as i64,
                )
            }),
        )
        .context("insert players")
    }

    fn insert_matches(&mut self, rows: &[Match]) -> Result<usize> {
        let inserted_at = Utc::now().to_rfc3339();
        self.execute_many(
            r#"
            INSERT INTO football_game (
                match_id, matchday_id, home_team_id, away_team_id,
                home_score, away_score, duration, season_id, inserted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            rows.iter().map(|m| {
                (
                    m.match_id as i64,
                    m.matchday_id as i64,
                    m.home_team_id as i64,
                    m.away_team_id as i64,
                    m.home_score,
                    m.away_score,
                    m.duration_minutes,
                    m.season_id as i64,
                    inserted_at.as_str(),
                )
            }),
        )
        .context("insert football games")
    }

    fn insert_player_stats(&mut self, rows: &[PlayerStat]) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .context("begin player stats transaction")?;
        let mut inserted = 0usize;
        {
            let mut head = tx
                .prepare_cached(
                    "INSERT INTO player_stats (player_id, team_id, match_id, season_id)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .context("prepare player stats insert")?;
            let mut value = tx
                .prepare_cached(
                    "INSERT INTO player_stat_value (player_id, team_id, match_id, stat_name, value)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .context("prepare stat value insert")?;
            for s in rows {
                let key = (s.player_id as i64, s.team_id as i64, s.match_id as i64);
                inserted += head
                    .execute((key.0, key.1, key.2, s.season_id as i64))
                    .with_context(|| format!("insert player stats {:?}", s.key()))?;
                for (name, v) in &s.values {
                    value
                        .execute((key.0, key.1, key.2, name.as_str(), *v))
                        .with_context(|| format!("insert stat {name} for {:?}", s.key()))?;
                }
            }
        }
        tx.commit().context("commit player stats transaction")?;
        Ok(inserted)
    }

    fn categories(&self, competition_id: u64) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT stat_name FROM stat_category WHERE competition_id = ?1 ORDER BY stat_name",
            )
            .context("prepare categories query")?;
        let rows = stmt
            .query_map(params![competition_id as i64], |row| row.get::<_, String>(0))
            .context("query categories")?;
        let mut out = BTreeSet::new();
        for row in rows {
            out.insert(row.context("decode category row")?);
        }
        Ok(out)
    }

    fn record_categories(
        &mut self,
        competition_id: u64,
        categories: &BTreeSet<String>,
    ) -> Result<usize> {
        let first_seen_at = Utc::now().to_rfc3339();
        self.execute_many(
            "INSERT OR IGNORE INTO stat_category (competition_id, stat_name, first_seen_at)
             VALUES (?1, ?2, ?3)",
            categories
                .iter()
                .map(|c| (competition_id as i64, c.as_str(), first_seen_at.as_str())),
        )
        .context("record stat categories")
    }

    fn update_team_metadata(
        &mut self,
        season_id: u64,
        metadata: &[(u64, TeamMetadata)],
    ) -> Result<usize> {
        self.execute_many(
            "UPDATE team SET city = ?1, stadium = ?2 WHERE team_id = ?3 AND season_id = ?4",
            metadata.iter().map(|(team_id, m)| {
                (
                    m.city.as_str(),
                    m.stadium.as_str(),
                    *team_id as i64,
                    season_id as i64,
                )
            }),
        )
        .context("update team metadata")
    }

    fn delete_season_data(&mut self, season_id: u64) -> Result<ResetCounts> {
        let season = season_id as i64;
        let tx = self.conn.transaction().context("begin reset transaction")?;
        tx.execute(
            r#"
            DELETE FROM player_stat_value
            WHERE match_id IN (
                SELECT match_id FROM football_game
                WHERE matchday_id IN (SELECT matchday_id FROM matchday WHERE season_id = ?1)
            )
            "#,
            params![season],
        )
        .context("delete stat values")?;
        let player_stats = tx
            .execute(
                r#"
                DELETE FROM player_stats
                WHERE match_id IN (
                    SELECT match_id FROM football_game
                    WHERE matchday_id IN (SELECT matchday_id FROM matchday WHERE season_id = ?1)
                )
                "#,
                params![season],
            )
            .context("delete player stats")?;
        let matches = tx
            .execute(
                "DELETE FROM football_game
                 WHERE matchday_id IN (SELECT matchday_id FROM matchday WHERE season_id = ?1)",
                params![season],
            )
            .context("delete football games")?;
        let players = tx
            .execute(
                "DELETE FROM player
                 WHERE season_id = ?1
                   AND team_id IN (SELECT team_id FROM team WHERE season_id = ?1)",
                params![season],
            )
            .context("delete players")?;
        tx.commit().context("commit reset transaction")?;
        Ok(ResetCounts {
            player_stats,
            matches,
            players,
        })
    }

    fn record_sync_run(&mut self, run: &SyncRun) -> Result<()> {
        let rounds_json = serde_json::to_string(&run.rounds).context("serialize rounds")?;
        let rows_json =
            serde_json::to_string(&run.rows_inserted).context("serialize row counts")?;
        let errors_json = serde_json::to_string(&run.errors).context("serialize errors")?;
        self.conn
            .execute(
                r#"
                INSERT INTO sync_runs (
                    season_id, started_at, finished_at, rounds_json,
                    rows_inserted_json, errors_json, outcome
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    run.season_id as i64,
                    run.started_at,
                    run.finished_at,
                    rounds_json,
                    rows_json,
                    errors_json,
                    run.outcome,
                ],
            )
            .context("insert sync run")?;
        Ok(())
    }
}
