use std::collections::{BTreeMap, HashSet};

use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;

use matchday_sync::extract::extract_match;
use matchday_sync::merge::merge_player_stats;
use matchday_sync::model::PlayerStat;
use matchday_sync::stat_normalizer::normalize_member_stats;

fn bench_stat_normalize(c: &mut Criterion) {
    let stats = vec![
        json!({"name": "Minutos", "value": "90'"}),
        json!({"name": "Goles", "value": "2 (1 pen)"}),
        json!({"name": "Pases completados", "value": "31/40 (77%)"}),
        json!({"name": "Duelos aéreos ganados", "value": "4/9"}),
        json!({"name": "Regates", "value": "abc/def"}),
        json!({"name": "Tiros al arco", "value": 3}),
        json!({"name": "Expected Goals (xG)", "value": "0.42"}),
    ];
    c.bench_function("stat_normalize", |b| {
        b.iter(|| {
            let values = normalize_member_stats(black_box(&stats));
            black_box(values.len());
        })
    });
}

fn bench_match_extract(c: &mut Criterion) {
    let record = serde_json::from_str::<Value>(MATCH_JSON).expect("valid fixture json");
    c.bench_function("match_extract", |b| {
        b.iter(|| {
            let extract = extract_match(black_box(&record), 3, Some(3)).unwrap();
            black_box(extract.stats.len());
        })
    });
}

fn bench_stat_merge(c: &mut Criterion) {
    let rows = (0..400u64)
        .flat_map(|m| {
            (0..28u64).map(move |p| PlayerStat {
                player_id: 10_000 + p + (m % 20) * 28,
                team_id: (m % 20) + 1,
                match_id: m,
                season_id: 1,
                values: BTreeMap::new(),
            })
        })
        .collect::<Vec<_>>();
    let players = rows
        .iter()
        .map(|s| (s.player_id, s.team_id))
        .collect::<HashSet<_>>();
    let matches = (0..400u64).collect::<HashSet<_>>();
    let existing = rows
        .iter()
        .take(rows.len() / 2)
        .map(PlayerStat::key)
        .collect::<HashSet<_>>();

    c.bench_function("stat_merge", |b| {
        b.iter(|| {
            let outcome =
                merge_player_stats(black_box(rows.clone()), &players, &matches, &existing);
            black_box(outcome.rows.len());
        })
    });
}

criterion_group!(
    perf,
    bench_stat_normalize,
    bench_match_extract,
    bench_stat_merge
);
criterion_main!(perf);

static MATCH_JSON: &str = include_str!("../tests/fixtures/match_round3.json");
