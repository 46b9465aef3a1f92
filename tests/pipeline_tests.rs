//! End-to-end runs of the three stages through the driver

use bio_anomaly_pipeline::{
    AnomalyFlag, ErrorKind, ExportFormat, PipelineConfig, PipelineDriver, PipelineError,
    ScorerConfig, StateConfig, UpdateRecord,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn scenario() -> Vec<UpdateRecord> {
    vec![
        UpdateRecord::new("P1", "2024-01", 10.0),
        UpdateRecord::new("P1", "2024-02", 15.0),
        UpdateRecord::new("P1", "2024-03", 10.0),
        UpdateRecord::new("P2", "2024-01", 100.0),
        UpdateRecord::new("P2", "2024-02", 100.0),
    ]
}

fn regional_table() -> Vec<UpdateRecord> {
    let mut rng = StdRng::seed_from_u64(2023);
    let mut records = Vec::new();
    for r in 0..25 {
        for m in 0..12 {
            let mut count = 300.0 + (r * 41 % 97) as f64 + rng.gen_range(0.0..40.0);
            if r == 7 && m == 9 {
                count *= 12.0;
            }
            records.push(UpdateRecord::new(
                format!("{}", 500001 + r),
                format!("2023-{:02}", m + 1),
                count,
            ));
        }
    }
    records
}

#[test]
fn test_scenario_features_and_flags() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();
    let output = driver.run(scenario()).unwrap();

    let volatility: Vec<f64> = output
        .anomalies
        .iter()
        .map(|r| r.features.volatility)
        .collect();
    assert_eq!(volatility, vec![0.0, 5.0, 5.0, 0.0, 0.0]);

    for row in output.anomalies.iter().filter(|r| r.region() == "P2") {
        assert_eq!(row.features.instability_score, 0.0);
        assert_eq!(row.features.volatility_norm, 0.0);
    }

    // ceil(5 * 0.05) = 1
    let flagged = output
        .anomalies
        .iter()
        .filter(|r| r.anomaly_flag == AnomalyFlag::Anomalous)
        .count();
    assert_eq!(flagged, 1);
    assert_eq!(output.report.flagged, 1);
}

#[test]
fn test_scenario_state_table() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();
    let output = driver.run(scenario()).unwrap();

    assert_eq!(
        output.state.columns(),
        &[
            "risk_score_scaled",
            "anomaly_score_scaled",
            "volatility_scaled",
            "instability_score_scaled"
        ]
    );
    assert_eq!(output.state.len(), 5);

    for row in output.state.rows() {
        assert!(row.values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    // P1 2024-02 and 2024-03 carry the largest volatility
    assert_eq!(output.state.value(0, "volatility_scaled"), Some(0.0));
    assert_eq!(output.state.value(1, "volatility_scaled"), Some(1.0));
    assert_eq!(output.state.value(2, "volatility_scaled"), Some(1.0));
}

#[test]
fn test_surge_is_flagged() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();
    let output = driver.run(regional_table()).unwrap();

    let surge = output
        .anomalies
        .iter()
        .find(|r| r.region() == "500008" && r.month() == "2023-10")
        .unwrap();
    assert_eq!(surge.anomaly_flag, AnomalyFlag::Anomalous);
    assert_eq!(output.report.flagged, 15);
    assert_eq!(output.report.regions, 25);
}

#[test]
fn test_rerun_is_byte_identical() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();

    let a = driver.run(regional_table()).unwrap();
    let b = driver.run(regional_table()).unwrap();

    assert_eq!(a.anomalies_json().unwrap(), b.anomalies_json().unwrap());
    assert_eq!(a.state_json().unwrap(), b.state_json().unwrap());
    assert_eq!(a.digest(), b.digest());
}

#[test]
fn test_input_order_does_not_change_output() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();

    let mut reversed = regional_table();
    reversed.reverse();

    let a = driver.run(regional_table()).unwrap();
    let b = driver.run(reversed).unwrap();
    assert_eq!(a.digest(), b.digest());
}

#[test]
fn test_seed_is_part_of_the_contract() {
    let base = PipelineDriver::new(&PipelineConfig::default()).unwrap();
    let reseeded = PipelineDriver::new(&PipelineConfig {
        anomaly: ScorerConfig {
            seed: 7,
            ..ScorerConfig::default()
        },
        ..PipelineConfig::default()
    })
    .unwrap();

    let a = base.run(regional_table()).unwrap();
    let b = reseeded.run(regional_table()).unwrap();

    // features do not depend on the seed, scores do
    for (x, y) in a.anomalies.iter().zip(&b.anomalies) {
        assert_eq!(x.features, y.features);
    }
    assert_ne!(a.digest(), b.digest());
}

#[test]
fn test_error_kinds_reach_the_caller() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();

    let mut duplicated = scenario();
    duplicated.push(UpdateRecord::new("P2", "2024-02", 3.0));
    assert_eq!(
        driver.run(duplicated).unwrap_err().kind(),
        ErrorKind::MalformedInput
    );

    assert_eq!(
        driver.run(scenario()[..3].to_vec()).unwrap_err().kind(),
        ErrorKind::InsufficientData
    );

    // every region flat: both scoring features are constant
    let flat = vec![
        UpdateRecord::new("A", "2024-01", 5.0),
        UpdateRecord::new("A", "2024-02", 5.0),
        UpdateRecord::new("B", "2024-01", 9.0),
        UpdateRecord::new("B", "2024-02", 9.0),
        UpdateRecord::new("C", "2024-01", 1.0),
    ];
    assert_eq!(
        driver.run(flat).unwrap_err().kind(),
        ErrorKind::FeatureMissing
    );
}

#[test]
fn test_unknown_state_feature_is_feature_missing() {
    let err = PipelineDriver::new(&PipelineConfig {
        state: StateConfig {
            feature_order: vec!["risk_score".to_string(), "bio_volatility".to_string()],
        },
        ..PipelineConfig::default()
    })
    .unwrap_err();

    assert!(matches!(err, PipelineError::FeatureMissing { ref feature, .. } if feature == "bio_volatility"));
}

#[test]
fn test_anomaly_table_columns() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();
    let output = driver.run(scenario()).unwrap();

    let json: serde_json::Value = serde_json::from_str(&output.anomalies_json().unwrap()).unwrap();
    let first = json[0].as_object().unwrap();
    let columns: Vec<&str> = first.keys().map(|k| k.as_str()).collect();

    for column in [
        "region",
        "month",
        "update_count",
        "volatility",
        "instability_score",
        "volatility_norm",
        "risk_score",
        "anomaly_flag",
        "anomaly_score",
    ] {
        assert!(columns.contains(&column), "missing {column}");
    }
}

#[test]
fn test_identical_regions_share_flags() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();

    // twelve regions with the same shape produce twelve identical feature rows per
    // month; two extra regions keep the scores from being uniform
    let mut records = Vec::new();
    for r in 0..12 {
        for (m, count) in [100.0, 140.0, 120.0].into_iter().enumerate() {
            records.push(UpdateRecord::new(
                format!("T{:02}", r),
                format!("2024-{:02}", m + 1),
                count + r as f64,
            ));
        }
    }
    for (m, count) in [50.0, 900.0, 60.0].into_iter().enumerate() {
        records.push(UpdateRecord::new("S1", format!("2024-{:02}", m + 1), count));
    }
    for (m, count) in [300.0, 310.0, 700.0].into_iter().enumerate() {
        records.push(UpdateRecord::new("S2", format!("2024-{:02}", m + 1), count));
    }

    let output = driver.run(records).unwrap();

    for (i, a) in output.anomalies.iter().enumerate() {
        for b in &output.anomalies[i + 1..] {
            if a.anomaly_score == b.anomaly_score {
                assert_eq!(a.anomaly_flag, b.anomaly_flag, "{} {} vs {} {}", a.region(), a.month(), b.region(), b.month());
            }
            if a.anomaly_flag.is_anomalous() && !b.anomaly_flag.is_anomalous() {
                assert!(a.anomaly_score < b.anomaly_score);
            }
            if b.anomaly_flag.is_anomalous() && !a.anomaly_flag.is_anomalous() {
                assert!(b.anomaly_score < a.anomaly_score);
            }
        }
    }
    assert!(output.report.flagged >= 1);
    assert!(output.report.flagged < output.anomalies.len());
}

#[test]
fn test_uniform_scores_are_rejected() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();

    // every region rises by the same step: two mirror-image groups of identical rows
    let records: Vec<UpdateRecord> = (0..10)
        .flat_map(|r| {
            [
                UpdateRecord::new(format!("R{:02}", r), "2024-01", 100.0),
                UpdateRecord::new(format!("R{:02}", r), "2024-02", 200.0),
            ]
        })
        .collect();

    let err = driver.run(records).unwrap_err();
    assert!(matches!(err, PipelineError::FeatureMissing { ref feature, .. } if feature == "anomaly_score"));
}

#[test]
fn test_report_digest_matches_output() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();
    let output = driver.run(scenario()).unwrap();

    assert_eq!(output.report.digest, output.digest());
    let report: serde_json::Value = serde_json::to_value(&output.report).unwrap();
    assert_eq!(report["digest"].as_str(), Some(output.digest()));
}

#[test]
fn test_csv_tables_align() {
    let driver = PipelineDriver::new(&PipelineConfig::default()).unwrap();
    let output = driver.run(scenario()).unwrap();

    let anomalies = output.render_anomalies(ExportFormat::Csv).unwrap();
    let state = output.render_state(ExportFormat::Csv).unwrap();
    let anomaly_lines: Vec<&str> = anomalies.lines().collect();
    let state_lines: Vec<&str> = state.lines().collect();

    assert_eq!(anomaly_lines.len(), 6);
    assert_eq!(state_lines.len(), 6);
    assert_eq!(
        state_lines[0],
        "region,month,risk_score_scaled,anomaly_score_scaled,volatility_scaled,instability_score_scaled"
    );
    for (a, s) in anomaly_lines.iter().zip(&state_lines).skip(1) {
        let key = |line: &str| line.split(',').take(2).collect::<Vec<_>>().join(",");
        assert_eq!(key(a), key(s));
    }
    assert!(anomaly_lines[1].starts_with("P1,2024-01,10,0,"));
}
