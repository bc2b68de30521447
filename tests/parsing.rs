use std::fs;
use std::path::PathBuf;

use serde_json::Value;

use matchday_sync::error::SyncError;
use matchday_sync::extract::{extract_match, extract_match_file};
use matchday_sync::stat_normalizer::collect_vocabulary;

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn read_fixture(name: &str) -> Value {
    let raw = fs::read_to_string(fixture_path(name)).expect("fixture file should be readable");
    serde_json::from_str(&raw).expect("fixture should be valid json")
}

#[test]
fn extracts_match_row_from_fixture() {
    let extract = extract_match_file(&fixture_path("match_round3.json"), 2, Some(4))
        .expect("fixture should extract");

    assert_eq!(extract.round, 3);
    assert_eq!(extract.matchday.matchday_id, 103);
    assert_eq!(extract.game.match_id, 4412087);
    assert_eq!(extract.game.matchday_id, 103);
    assert_eq!(extract.game.home_team_id, 131);
    assert_eq!(extract.game.away_team_id, 225);
    assert_eq!(extract.game.home_score, 2);
    assert_eq!(extract.game.away_score, 0);
    assert!((extract.game.duration_minutes - 97.5).abs() < 1e-9);

    let names = extract
        .teams
        .iter()
        .map(|t| t.team_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Real Betis", "Sevilla"]);
}

#[test]
fn players_take_names_and_numbers_from_the_member_directory() {
    let extract = extract_match(&read_fixture("match_round3.json"), 2, None)
        .expect("fixture should extract");

    assert_eq!(extract.players.len(), 4, "repeated lineup member is kept once");
    let striker = extract
        .players
        .iter()
        .find(|p| p.player_id == 90002)
        .expect("striker listed");
    assert_eq!(striker.player_name, "Vitor Roque");
    assert_eq!(striker.jersey_number, 8);
    assert_eq!(striker.position, "DEL");
    assert_eq!(striker.team_id, 131);

    let sub = extract
        .players
        .iter()
        .find(|p| p.player_id == 90003)
        .expect("sub listed");
    assert_eq!(sub.position, "Bench");
    assert_eq!(sub.jersey_number, 0);

    let defender = extract
        .players
        .iter()
        .find(|p| p.player_id == 91001)
        .expect("defender listed");
    assert_eq!(defender.player_name, "Loïc Badé");
    assert_eq!(defender.team_id, 225);
}

#[test]
fn stat_values_are_normalized_per_player() {
    let extract = extract_match(&read_fixture("match_round3.json"), 2, None)
        .expect("fixture should extract");
    let stat = |player_id: u64| {
        extract
            .stats
            .iter()
            .find(|s| s.player_id == player_id)
            .expect("stat row present")
    };

    let keeper = stat(90001);
    assert_eq!(keeper.value("minutos"), 90.0);
    assert_eq!(keeper.value("penales_atajados"), 1.0);
    assert_eq!(keeper.value("penales_totales"), 2.0);
    assert_eq!(keeper.value("pases_completados"), 21.0);
    assert_eq!(keeper.value("pases_totales"), 30.0);

    let striker = stat(90002);
    assert_eq!(striker.value("goles"), 2.0);
    assert_eq!(striker.value("minutos"), 78.0);
    assert_eq!(striker.value("duelos_aereos_ganados"), 3.0);
    assert_eq!(striker.value("duelos_aereos_totales"), 7.0);
    assert_eq!(striker.value("tiros_al_arco"), 4.0);

    let defender = stat(91001);
    assert_eq!(defender.value("barridas_ganadas"), 0.0);
    assert_eq!(defender.value("barridas_totales"), 0.0);
    assert_eq!(defender.value("pases_totales"), 44.0);
    assert_eq!(defender.key(), (91001, 225, 4412087));

    assert_eq!(extract.stats.len(), 4);
}

#[test]
fn missing_match_id_is_a_parse_error_naming_the_file() {
    let err = extract_match_file(&fixture_path("match_no_id.json"), 1, Some(1))
        .expect_err("match without id must fail");
    match err {
        SyncError::Parse { file, message } => {
            assert!(file.ends_with("match_no_id.json"));
            assert!(message.contains("match id"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn rounds_past_the_matchday_stride_are_rejected() {
    let mut record = read_fixture("match_round3.json");
    record["roundNum"] = Value::from(50);
    let err = extract_match(&record, 2, None).expect_err("round 50 must be rejected");
    assert_eq!(err, SyncError::RoundOutOfRange { round: 50, max: 49 });
}

#[test]
fn folder_round_is_used_when_the_record_has_none() {
    let mut record = read_fixture("match_round3.json");
    if let Some(map) = record.as_object_mut() {
        map.remove("roundNum");
    }
    let extract = extract_match(&record, 2, Some(7)).expect("folder round applies");
    assert_eq!(extract.round, 7);
    assert_eq!(extract.matchday.matchday_id, 107);

    assert!(extract_match(&record, 2, None).is_err());
}

#[test]
fn vocabulary_collects_every_category_seen() {
    let (vocabulary, errors) = collect_vocabulary(&[
        fixture_path("match_round3.json"),
        fixture_path("does_not_exist.json"),
    ]);
    assert_eq!(errors.len(), 1);
    assert!(vocabulary.contains("tiros_al_arco"));
    assert!(vocabulary.contains("duelos_aereos_ganados"));
    assert!(vocabulary.contains("centros_totales"), "baseline totals are always present");
    assert_eq!(
        &vocabulary.columns()[..2],
        &["player_id".to_string(), "match_id".to_string()]
    );
}
