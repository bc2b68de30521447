//! Canonical per-player statistic names and values.
//!
//! The provider labels statistics in the requested locale ("Duelos aéreos ganados", "Goles") and
//! encodes several of them as `made/attempted` strings. Everything downstream works on the
//! canonical snake_case vocabulary produced here.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::SyncError;
use crate::json_value::{as_f64_any, str_at};

/// Ratio statistics and the name their attempted count is stored under.
pub const RATIO_STATS: &[(&str, &str)] = &[
    ("barridas_ganadas", "barridas_totales"),
    ("centros", "centros_totales"),
    ("duelos_aereos_ganados", "duelos_aereos_totales"),
    ("pases_completados", "pases_totales"),
    ("pases_largos_completados", "pases_largos_totales"),
    ("duelos_en_el_suelo_ganados", "duelos_en_el_suelo_totales"),
    ("regates", "regates_totales"),
    ("penales_atajados", "penales_totales"),
];

/// Identity columns that lead every wide stat row.
pub const KEY_COLUMNS: &[&str] = &["player_id", "match_id"];

const LABEL_ALIASES: &[(&str, &str)] = &[
    ("goals", "goles"),
    ("minutes", "minutos"),
    ("minutes_played", "minutos"),
    ("assists", "asistencias"),
    ("key_passes", "pases_claves"),
    ("tackles_won", "barridas_ganadas"),
    ("crosses", "centros"),
    ("aerial_duels_won", "duelos_aereos_ganados"),
    ("passes_completed", "pases_completados"),
    ("long_balls_completed", "pases_largos_completados"),
    ("ground_duels_won", "duelos_en_el_suelo_ganados"),
    ("dribbles", "regates"),
    ("penalties_saved", "penales_atajados"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Ratio { attempted: &'static str },
    Minutes,
    Goals,
    Plain,
}

pub fn classify(canonical: &str) -> StatKind {
    if let Some((_, attempted)) = RATIO_STATS.iter().find(|(made, _)| *made == canonical) {
        return StatKind::Ratio { attempted };
    }
    match canonical {
        "minutos" | "minutes" => StatKind::Minutes,
        "goles" | "goals" => StatKind::Goals,
        _ => StatKind::Plain,
    }
}

pub fn canonical_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.chars().flat_map(char::to_lowercase) {
        let ch = fold_accent(ch);
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_sep = true;
        }
    }
    match LABEL_ALIASES.iter().find(|(label, _)| *label == out) {
        Some((_, canonical)) => (*canonical).to_string(),
        None => out,
    }
}

pub(crate) fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// `"12/20 (duels)"` -> `(12, 20)`. Anything unparsable on either side gives `(0, 0)`.
pub fn parse_ratio(raw: &str) -> (f64, f64) {
    let Some((made, rest)) = raw.split_once('/') else {
        return (0.0, 0.0);
    };
    let attempted = rest
        .trim_start()
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or_default();
    match (made.trim().parse::<i64>(), attempted.parse::<i64>()) {
        (Ok(made), Ok(attempted)) => (made as f64, attempted as f64),
        _ => (0.0, 0.0),
    }
}

/// `"90'"` -> 90.
pub fn parse_minutes(raw: &str) -> f64 {
    raw.trim()
        .trim_end_matches(['\'', '’', '′'])
        .trim()
        .parse::<i64>()
        .map(|n| n as f64)
        .unwrap_or(0.0)
}

/// `"2 (1 pen)"` -> 2.
pub fn parse_goals(raw: &str) -> f64 {
    raw.split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .parse::<i64>()
        .map(|n| n as f64)
        .unwrap_or(0.0)
}

fn parse_plain(value: &Value) -> f64 {
    as_f64_any(value).filter(|n| n.is_finite()).unwrap_or(0.0)
}

/// One raw `{name, value}` pair becomes zero, one or two canonical values.
pub fn normalize_stat(raw_name: &str, value: &Value) -> Vec<(String, f64)> {
    let name = canonical_name(raw_name);
    if name.is_empty() {
        return Vec::new();
    }
    match (classify(&name), value) {
        (StatKind::Ratio { attempted }, Value::String(raw)) if raw.contains('/') => {
            let (made, total) = parse_ratio(raw);
            vec![(name, made), (attempted.to_string(), total)]
        }
        (StatKind::Minutes, Value::String(raw)) => vec![(name, parse_minutes(raw))],
        (StatKind::Goals, Value::String(raw)) => vec![(name, parse_goals(raw))],
        (StatKind::Minutes | StatKind::Goals, other) => {
            vec![(name, parse_plain(other).trunc())]
        }
        (_, other) => vec![(name, parse_plain(other))],
    }
}

pub fn normalize_member_stats(stats: &[Value]) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for entry in stats {
        let Some(raw_name) = str_at(entry, "name") else {
            continue;
        };
        let value = entry.get("value").unwrap_or(&Value::Null);
        for (name, v) in normalize_stat(raw_name, value) {
            out.insert(name, v);
        }
    }
    out
}

/// Union of category names seen for a competition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    categories: BTreeSet<String>,
}

impl Vocabulary {
    /// The categories every competition carries whether or not a file mentions them.
    pub fn baseline() -> Self {
        Self {
            categories: RATIO_STATS
                .iter()
                .map(|(_, attempted)| (*attempted).to_string())
                .collect(),
        }
    }

    /// Baseline plus previously recorded categories.
    pub fn with_categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocabulary = Self::baseline();
        for category in categories {
            vocabulary.insert(category);
        }
        vocabulary
    }

    pub fn observe_match(&mut self, record: &Value) {
        for side in ["homeCompetitor", "awayCompetitor"] {
            let Some(members) = record
                .get(side)
                .and_then(|c| c.get("lineups"))
                .and_then(|l| l.get("members"))
                .and_then(|m| m.as_array())
            else {
                continue;
            };
            for member in members {
                let Some(stats) = member.get("stats").and_then(|s| s.as_array()) else {
                    continue;
                };
                for entry in stats {
                    if let Some(raw) = str_at(entry, "name") {
                        let name = canonical_name(raw);
                        if !name.is_empty() {
                            self.categories.insert(name);
                        }
                    }
                }
            }
        }
    }

    pub fn insert(&mut self, category: impl Into<String>) -> bool {
        self.categories.insert(category.into())
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains(category)
    }

    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Key columns followed by the sorted categories.
    pub fn columns(&self) -> Vec<String> {
        KEY_COLUMNS
            .iter()
            .map(|c| (*c).to_string())
            .chain(
                self.categories
                    .iter()
                    .filter(|c| !KEY_COLUMNS.contains(&c.as_str()))
                    .cloned(),
            )
            .collect()
    }
}

/// Rebuilds the vocabulary from every file given. Unreadable files are reported and skipped.
pub fn collect_vocabulary<P: AsRef<Path>>(files: &[P]) -> (Vocabulary, Vec<SyncError>) {
    let mut vocabulary = Vocabulary::baseline();
    let mut errors = Vec::new();
    for path in files {
        let path = path.as_ref();
        let parsed = fs::read_to_string(path)
            .map_err(|err| err.to_string())
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|err| err.to_string()));
        match parsed {
            Ok(record) => vocabulary.observe_match(&record),
            Err(message) => errors.push(SyncError::parse(path.display().to_string(), message)),
        }
    }
    debug!(
        files = files.len(),
        categories = vocabulary.len(),
        "stat vocabulary collected"
    );
    (vocabulary, errors)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn names_fold_to_ascii_snake_case() {
        assert_eq!(canonical_name("Duelos aéreos ganados"), "duelos_aereos_ganados");
        assert_eq!(canonical_name("Pases  (completados)"), "pases_completados");
        assert_eq!(canonical_name("Año-Señal"), "ano_senal");
        assert_eq!(canonical_name("  Goles  "), "goles");
        assert_eq!(canonical_name("Aerial Duels Won"), "duelos_aereos_ganados");
        assert_eq!(canonical_name("()"), "");
    }

    #[test]
    fn ratio_values_split_into_made_and_attempted() {
        assert_eq!(parse_ratio("12/20 (duels)"), (12.0, 20.0));
        assert_eq!(parse_ratio("3/4"), (3.0, 4.0));
        assert_eq!(parse_ratio("abc/def"), (0.0, 0.0));
        assert_eq!(parse_ratio("7/"), (0.0, 0.0));
    }

    #[test]
    fn minutes_and_goals_strip_their_suffixes() {
        assert_eq!(parse_minutes("90'"), 90.0);
        assert_eq!(parse_minutes(""), 0.0);
        assert_eq!(parse_minutes("noventa"), 0.0);
        assert_eq!(parse_goals("2 (1 pen)"), 2.0);
        assert_eq!(parse_goals("1"), 1.0);
        assert_eq!(parse_goals("x (y)"), 0.0);
    }

    #[test]
    fn normalize_stat_routes_by_kind() {
        assert_eq!(
            normalize_stat("Duelos aéreos ganados", &json!("12/20 (duels)")),
            vec![
                ("duelos_aereos_ganados".to_string(), 12.0),
                ("duelos_aereos_totales".to_string(), 20.0)
            ]
        );
        assert_eq!(
            normalize_stat("Regates", &json!("abc/def")),
            vec![
                ("regates".to_string(), 0.0),
                ("regates_totales".to_string(), 0.0)
            ]
        );
        assert_eq!(
            normalize_stat("Minutes", &json!("90'")),
            vec![("minutos".to_string(), 90.0)]
        );
        assert_eq!(
            normalize_stat("Goles", &json!("2 (1 pen)")),
            vec![("goles".to_string(), 2.0)]
        );
        assert_eq!(
            normalize_stat("Valoración", &json!("7.4")),
            vec![("valoracion".to_string(), 7.4)]
        );
        assert_eq!(
            normalize_stat("Tiros", &json!("n/a")),
            vec![("tiros".to_string(), 0.0)]
        );
    }

    #[test]
    fn baseline_vocabulary_holds_every_totals_column() {
        let vocabulary = Vocabulary::baseline();
        for (_, attempted) in RATIO_STATS {
            assert!(vocabulary.contains(attempted));
        }
        let columns = vocabulary.columns();
        assert_eq!(&columns[..2], &["player_id".to_string(), "match_id".to_string()]);
    }
}
