use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fraud_signal_engine::anomaly::{Entity, MethodKind};
use fraud_signal_engine::{score_anomalies, top_anomalies, ClaimRecord, ClaimTable, EngineError, MethodConfig};

fn table_of(amounts: &[f64]) -> ClaimTable {
    let records = amounts
        .iter()
        .enumerate()
        .map(|(i, &amount)| ClaimRecord::new(i as i64 % 7, 100 + i as i64 % 3, amount, "I10"))
        .collect();
    ClaimTable::new(records).unwrap()
}

fn random_table(rows: usize, seed: u64) -> ClaimTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let records = (0..rows)
        .map(|_| {
            let amount = if rng.gen_bool(0.05) {
                rng.gen_range(20_000.0..50_000.0)
            } else {
                rng.gen_range(50.0..3_000.0)
            };
            ClaimRecord::new(rng.gen_range(0..40), rng.gen_range(0..8), amount, "E11")
                .with_date(start + chrono::Duration::days(rng.gen_range(0..60)))
        })
        .collect();
    ClaimTable::new(records).unwrap()
}

fn all_methods() -> Vec<MethodConfig> {
    vec![
        MethodConfig::threshold_percentile(95.0),
        MethodConfig::zscore(2.5),
        MethodConfig::ensemble(0.05).with_seed(7),
        MethodConfig::frequency(5.0, 7),
    ]
}

#[test]
fn test_one_result_per_row_with_rank_permutation() {
    let table = random_table(300, 11);
    let results = score_anomalies(&table, &all_methods()).unwrap();

    assert_eq!(results.len(), table.len());
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.row_index, i);
        assert!((0.0..=1.0).contains(&result.combined_score));
    }

    let mut ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, (1..=table.len()).collect::<Vec<_>>());

    // Rank order follows combined score
    let top = top_anomalies(&results, results.len());
    for pair in top.windows(2) {
        assert!(pair[0].combined_score >= pair[1].combined_score);
    }
}

#[test]
fn test_equal_amounts_give_zero_zscores() {
    let table = table_of(&[1234.56; 12]);
    let results = score_anomalies(&table, &[MethodConfig::zscore(3.0)]).unwrap();

    for result in &results {
        assert_eq!(result.scores[&MethodKind::ZScore], 0.0);
        assert!(!result.is_anomaly);
    }
}

#[test]
fn test_threshold_scores_and_flags() {
    let table = table_of(&[500.0, 1000.0, 1500.0]);
    let results = score_anomalies(&table, &[MethodConfig::threshold(1000.0)]).unwrap();

    let scores: Vec<f64> = results.iter().map(|r| r.scores[&MethodKind::Threshold]).collect();
    let flags: Vec<bool> = results.iter().map(|r| r.is_anomaly).collect();
    assert_eq!(scores, vec![0.5, 1.0, 1.0]);
    assert_eq!(flags, vec![false, false, true]);
}

#[test]
fn test_equal_weights_average_method_scores() {
    // mean 180, population std dev 160, so z is 0.5 for the small rows and 2.0 for the large one
    let table = table_of(&[100.0, 100.0, 100.0, 100.0, 500.0]);
    let methods = [MethodConfig::threshold(400.0), MethodConfig::zscore(2.0)];
    let results = score_anomalies(&table, &methods).unwrap();

    let expected_combined = [0.25, 0.25, 0.25, 0.25, 1.0];
    for (result, expected) in results.iter().zip(expected_combined) {
        let threshold = result.scores[&MethodKind::Threshold];
        let zscore = result.scores[&MethodKind::ZScore];
        assert!((result.combined_score - (threshold + zscore) / 2.0).abs() < 1e-12);
        assert!((result.combined_score - expected).abs() < 1e-9);
    }

    assert_eq!(results[4].rank, 1);
    // Ties keep row order
    let tied: Vec<usize> = results[..4].iter().map(|r| r.rank).collect();
    assert_eq!(tied, vec![2, 3, 4, 5]);
}

#[test]
fn test_weights_shift_the_mean() {
    let table = table_of(&[100.0, 100.0, 100.0, 100.0, 500.0]);
    let methods = [
        MethodConfig::threshold(400.0).with_weight(3.0),
        MethodConfig::zscore(2.0),
    ];
    let results = score_anomalies(&table, &methods).unwrap();

    for result in &results {
        let expected = (3.0 * result.scores[&MethodKind::Threshold] + result.scores[&MethodKind::ZScore]) / 4.0;
        assert!((result.combined_score - expected).abs() < 1e-12);
    }
}

#[test]
fn test_undated_rows_excluded_from_frequency() {
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let table = ClaimTable::new(vec![
        ClaimRecord::new(1, 10, 200.0, "I10").with_date(day),
        ClaimRecord::new(2, 10, 200.0, "I10").with_date(day),
        ClaimRecord::new(3, 10, 200.0, "I10").with_date(day),
        ClaimRecord::new(4, 10, 200.0, "I10"),
    ])
    .unwrap();
    let methods = [
        MethodConfig::threshold(1000.0),
        MethodConfig::frequency(2.0, 1).with_entity(Entity::Provider),
    ];
    let results = score_anomalies(&table, &methods).unwrap();

    for result in &results[..3] {
        assert_eq!(result.scores[&MethodKind::Frequency], 1.0);
        assert!(result.flags[&MethodKind::Frequency]);
        assert!((result.combined_score - 0.6).abs() < 1e-12);
    }

    let undated = &results[3];
    assert!(!undated.scores.contains_key(&MethodKind::Frequency));
    assert_eq!(undated.combined_score, 0.2);
    assert!(!undated.is_anomaly);
}

#[test]
fn test_repeat_runs_are_byte_identical() {
    let table = random_table(200, 3);
    let first = serde_json::to_string(&score_anomalies(&table, &all_methods()).unwrap()).unwrap();
    let second = serde_json::to_string(&score_anomalies(&table, &all_methods()).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_invalid_configs_rejected_before_scoring() {
    let table = table_of(&[1.0, 2.0, 3.0]);

    let unknown = MethodConfig {
        method: "median".to_string(),
        ..MethodConfig::zscore(3.0)
    };
    let unknown = score_anomalies(&table, &[unknown]);
    assert!(matches!(unknown, Err(EngineError::UnknownMethod(_))));

    let duplicate = score_anomalies(&table, &[MethodConfig::zscore(3.0), MethodConfig::zscore(2.0)]);
    assert!(matches!(duplicate, Err(EngineError::DuplicateMethod(_))));

    let zero_weight = score_anomalies(&table, &[MethodConfig::zscore(3.0).with_weight(0.0)]);
    assert!(matches!(zero_weight, Err(EngineError::InvalidParameter { .. })));
}

#[test]
fn test_empty_table_scores_nothing() {
    let results = score_anomalies(&ClaimTable::empty(), &all_methods()).unwrap();
    assert!(results.is_empty());
}
