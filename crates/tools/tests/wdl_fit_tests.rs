use std::fmt::Write as _;

use assert_cmd::Command;
use predicates::prelude::*;

/// 勝率 `(s + 650) / 1500` の直線データ。50% を横切るのは s = 100。
fn linear_table() -> String {
    let mut table = String::new();
    for score in (-500..=500).step_by(25) {
        let wins = score + 650;
        let losses = 1500 - wins;
        for _ in 0..wins {
            writeln!(table, "50;{score};1").unwrap();
        }
        for _ in 0..losses {
            writeln!(table, "50;{score};-1").unwrap();
        }
    }
    // 窓の外（手数・スコア）は無視される
    writeln!(table, "5;0;-1").unwrap();
    writeln!(table, "150;0;-1").unwrap();
    writeln!(table, "50;900;-1").unwrap();
    table
}

#[test]
fn fits_linear_data_and_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("out.txt");
    std::fs::write(&input, linear_table()).unwrap();
    let json = dir.path().join("fit.json");

    Command::cargo_bin("wdl_fit")
        .unwrap()
        .arg(&input)
        .arg("--json")
        .arg(&json)
        .assert()
        .success()
        .stdout(predicate::str::contains("Pawn scale: "))
        .stdout(predicate::str::starts_with("["));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    let scale = report["pawn_scale"].as_f64().unwrap();
    assert!((scale - 100.0).abs() < 1e-6, "{scale}");
    assert_eq!(report["buckets"], 41);
    assert_eq!(report["win"].as_array().unwrap().len(), 5);
    assert_eq!(report["config"]["score_limit"], 500);
}

#[test]
fn convert_then_fit_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("data.plain");
    let mut text = String::new();
    for score in (-500..=500).step_by(25) {
        let wins = score + 650;
        for i in 0..1500 {
            // 黒番の行は結果を黒視点で書いておき、変換で白視点に戻す
            let (side, outcome) = match (i % 2 == 0, i < wins) {
                (true, true) => ("w", 1),
                (true, false) => ("w", -1),
                (false, true) => ("b", -1),
                (false, false) => ("b", 1),
            };
            writeln!(text, "8/8/8/8/8/8/8/8 {side} - - 0 1;40;a1a2;{score};{outcome};0").unwrap();
        }
    }
    std::fs::write(&corpus, text).unwrap();
    let table = dir.path().join("out.txt");

    Command::cargo_bin("convert_for_wdl_fit")
        .unwrap()
        .arg(&corpus)
        .arg("--output")
        .arg(&table)
        .assert()
        .success();

    let assert = Command::cargo_bin("wdl_fit").unwrap().arg(&table).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let scale: f64 = stdout
        .lines()
        .find_map(|l| l.strip_prefix("Pawn scale: "))
        .unwrap()
        .parse()
        .unwrap();
    assert!((scale - 100.0).abs() < 1e-6, "{stdout}");
}

#[test]
fn too_few_buckets_is_singular() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("out.txt");
    std::fs::write(&input, "50;0;1\n50;10;-1\n50;20;0\n").unwrap();
    Command::cargo_bin("wdl_fit")
        .unwrap()
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("singular"));
}

#[test]
fn malformed_row_reports_location() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("out.txt");
    std::fs::write(&input, "50;0;1\n50;zero;1\n").unwrap();
    Command::cargo_bin("wdl_fit")
        .unwrap()
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("out.txt:2"));
}

#[test]
fn negative_limits_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("out.txt");
    std::fs::write(&input, "50;0;1\n").unwrap();
    for flag in ["--score-limit=-2147483648", "--blunder-threshold=-1"] {
        Command::cargo_bin("wdl_fit")
            .unwrap()
            .arg(&input)
            .arg(flag)
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }
}
