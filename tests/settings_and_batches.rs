use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use spend_reconcile::config::ReconcileSettings;
use spend_reconcile::execution::reconcile_batch;
use spend_reconcile::ingestion::{batch_from_dir, batch_from_glob};
use spend_reconcile::types::ManualAdjustment;

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("spend-reconcile-{name}-{nanos}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

const ACME_SETTINGS: &str = r#"
report_sources = ["acme", "partner", "other"]
partner_channel = "partner"
other_bucket = "other"
category_a_keywords = ["coverage"]
summary_markers = ["total"]
fallback_ratio = 0.5

[[formats]]
source = "acme"
name_pattern = "acme_daily"
separator_hint = ";"

[formats.cost_field]
keywords = ["spend"]
blacklist = ["per"]

[formats.label_field]
keywords = ["campaign"]

[formats.count_rule]
kind = "column"
keywords = ["leads"]
"#;

#[test]
fn toml_settings_drive_a_custom_source() {
    let dir = tmp_dir("settings");
    let path = dir.join("reconcile.toml");
    std::fs::write(&path, ACME_SETTINGS).unwrap();
    std::fs::write(
        dir.join("acme_daily_0105.csv"),
        "campaign;spend per lead;spend;leads\ncoverage-a;10;1000;8\nproduct-b;10;500;2\nTotal;;1500;10\n",
    )
    .unwrap();

    let settings = ReconcileSettings::from_path(&path).unwrap();
    let files = batch_from_glob(&format!("{}/*.csv", dir.display())).unwrap();
    assert_eq!(files.len(), 1);

    let snap = reconcile_batch(settings, &files, &[]).unwrap();
    let names: Vec<&str> = snap.sources.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(names, vec!["acme", "partner", "other"]);
    let acme = snap.source("acme").unwrap();
    assert_eq!(acme.category_a_count, 8.0);
    assert_eq!(acme.category_b_count, 2.0);
    assert_eq!(acme.cost, 1500.0);
    assert_eq!(acme.unit_cost, 150.0);
    assert_eq!(snap.category_ratio, 0.8);
}

#[test]
fn manual_adjustments_deserialize_from_json() {
    let adjustments: Vec<ManualAdjustment> = serde_json::from_str(
        r#"[
            {"kind": "override", "spend": 11270000, "unit_cost": 14000},
            {"kind": "additive_correction", "delta_count": 3, "delta_cost": 300}
        ]"#,
    )
    .unwrap();

    let snap = reconcile_batch(ReconcileSettings::default(), &[], &adjustments).unwrap();
    assert_eq!(snap.partner.total_count, 805.0);
    assert_eq!(snap.source("기타").unwrap().total_count, 3.0);
    assert_eq!(snap.total_count, 808.0);
    assert_eq!(snap.total_cost, 11_270_300.0);
}

#[test]
fn directory_batches_skip_hidden_and_lock_files() {
    let dir = tmp_dir("batch");
    std::fs::create_dir_all(dir.join("naver")).unwrap();
    std::fs::write(dir.join("naver").join("result.csv"), "캠페인 이름,총 비용\n상품,10\n").unwrap();
    std::fs::write(dir.join("~$result.csv"), "lock").unwrap();
    std::fs::write(dir.join(".DS_Store"), "junk").unwrap();

    let files = batch_from_dir(&dir).unwrap();
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["result.csv"]);

    let snap = reconcile_batch(ReconcileSettings::default(), &files, &[]).unwrap();
    assert_eq!(snap.total_cost, 10.0);
}

#[test]
fn snapshot_serializes_for_downstream_consumers() {
    let snap = reconcile_batch(ReconcileSettings::default(), &[], &[]).unwrap();
    let json = serde_json::to_value(&snap).unwrap();
    assert_eq!(json["ratio_is_fallback"], serde_json::Value::Bool(true));
    assert_eq!(json["sources"].as_array().map(Vec::len), Some(6));
}
