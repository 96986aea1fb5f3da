use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

fn ahp() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ahp"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn write_hierarchy(path: &Path) {
    let hierarchy = serde_json::json!({
        "goal": "Choose a car",
        "main_criteria": ["Cost", "Safety", "Comfort"],
        "sub_criteria": {"Cost": ["Price", "Fuel"]}
    });
    std::fs::write(path, serde_json::to_string_pretty(&hierarchy).unwrap()).unwrap();
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn cli_validate_and_pairs_print_json() {
    let dir = tempdir().unwrap();
    let hierarchy_path = dir.path().join("hierarchy.json");
    write_hierarchy(&hierarchy_path);

    let output = ahp()
        .args(["validate", "--hierarchy"])
        .arg(&hierarchy_path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let groups: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(groups[0]["label"], "Main criteria");
    assert_eq!(groups[0]["pairs"], 3);
    assert_eq!(groups[1]["label"], "Cost sub-criteria");

    let output = ahp()
        .args(["pairs", "--items", "a,b,c", "--ranks", "3,1,2"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let pairs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(pairs.as_array().unwrap().len(), 3);
    assert_eq!(pairs[0]["first"], "b");
    assert_eq!(pairs[0]["second"], "c");

    let status = ahp()
        .args(["pairs", "--items", "a,b", "--ranks", "1,1"])
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn cli_simulate_store_aggregate_and_reset() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("responses.sqlite");
    let hierarchy_path = dir.path().join("hierarchy.json");
    let records_path = dir.path().join("records.json");
    let report_path = dir.path().join("report.json");
    write_hierarchy(&hierarchy_path);

    let status = ahp()
        .args(["simulate", "--respondents", "4", "--seed", "11", "--store", "--project", "demo"])
        .arg("--hierarchy")
        .arg(&hierarchy_path)
        .arg("--db")
        .arg(&db)
        .arg("--out")
        .arg(&records_path)
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(read_json(&records_path).as_array().unwrap().len(), 4);

    let status = ahp()
        .args(["aggregate", "--goal", "Choose a car", "--project", "demo"])
        .arg("--db")
        .arg(&db)
        .arg("--out")
        .arg(&report_path)
        .status()
        .unwrap();
    assert!(status.success());
    let report = read_json(&report_path);
    assert_eq!(report["status"].as_array().unwrap().len(), 4);
    assert!(!report["ranking"].as_array().unwrap().is_empty());

    let output = ahp()
        .args(["aggregate", "--goal", "Choose a car", "--project", "demo", "--format", "md"])
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("# AHP Aggregation Report"));

    let output = ahp()
        .args(["surveys", "--project", "demo"])
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();
    assert!(output.status.success());
    let surveys: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(surveys[0]["responses"], 4);

    let export_path = dir.path().join("export.jsonl");
    let status = ahp()
        .args(["export", "--goal", "Choose a car", "--project", "demo"])
        .arg("--db")
        .arg(&db)
        .arg("--out")
        .arg(&export_path)
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(std::fs::read_to_string(&export_path).unwrap().lines().count(), 4);

    let status = ahp()
        .args(["reset", "--goal", "Choose a car", "--project", "demo"])
        .arg("--db")
        .arg(&db)
        .status()
        .unwrap();
    assert!(status.success());

    let output = ahp()
        .args(["surveys", "--project", "demo"])
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();
    let surveys: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(surveys.as_array().unwrap().is_empty());
}

#[test]
fn cli_replay_writes_record_and_trace() {
    let dir = tempdir().unwrap();
    let hierarchy_path = dir.path().join("hierarchy.json");
    let script_path = dir.path().join("script.json");
    let record_path = dir.path().join("record.json");
    let trace_path = dir.path().join("trace.jsonl");
    let db = dir.path().join("responses.sqlite");
    write_hierarchy(&hierarchy_path);

    let script = serde_json::json!([
        {"op": "ranks", "ranks": [2, 1, 3]},
        {"op": "judge", "pair": 1, "judgment": -2},
        {"op": "judge", "pair": 0, "judgment": -1},
        {"op": "judge", "pair": 2, "judgment": 0},
        {"op": "complete_group"},
        {"op": "ranks", "ranks": [1, 2]},
        {"op": "judge", "pair": 0, "judgment": 2},
        {"op": "resolve", "resolution": "revise"},
        {"op": "judge", "pair": 0, "judgment": -1},
        {"op": "complete_group"}
    ]);
    std::fs::write(&script_path, script.to_string()).unwrap();

    let status = ahp()
        .args(["replay", "--respondent", "kim"])
        .arg("--hierarchy")
        .arg(&hierarchy_path)
        .arg("--script")
        .arg(&script_path)
        .arg("--out")
        .arg(&record_path)
        .arg("--trace")
        .arg(&trace_path)
        .status()
        .unwrap();
    assert!(status.success());

    let record = read_json(&record_path);
    assert_eq!(record["respondent"], "kim");
    assert_eq!(record["answers"]["[Main criteria] Safety vs Cost"], 2.0);
    assert_eq!(record["answers"]["[Cost sub-criteria] Price vs Fuel"], 2.0);

    let trace = std::fs::read_to_string(&trace_path).unwrap();
    let events: Vec<serde_json::Value> = trace
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let judgments = events.iter().filter(|e| e["event"] == "judgment").count();
    let groups = events.iter().filter(|e| e["event"] == "group_completed").count();
    assert_eq!((judgments, groups), (5, 2));
    assert_eq!(events.last().unwrap()["group"], "Cost sub-criteria");
    assert!(trace.contains("\"revise\""));

    let status = ahp()
        .args(["submit", "--project", "demo"])
        .arg("--records")
        .arg(&record_path)
        .arg("--hierarchy")
        .arg(&hierarchy_path)
        .arg("--db")
        .arg(&db)
        .status()
        .unwrap();
    assert!(status.success());
}

#[test]
fn cli_custom_main_group_label_still_aggregates() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("responses.sqlite");
    let hierarchy_path = dir.path().join("hierarchy.json");
    let config_path = dir.path().join("config.json");
    let report_path = dir.path().join("report.json");
    write_hierarchy(&hierarchy_path);
    let config = serde_json::json!({"survey": {"labels": {"main_group_label": "Top level"}}});
    std::fs::write(&config_path, config.to_string()).unwrap();

    let status = ahp()
        .arg("--config")
        .arg(&config_path)
        .args(["simulate", "--respondents", "2", "--noise-sigma", "0", "--store"])
        .arg("--hierarchy")
        .arg(&hierarchy_path)
        .arg("--db")
        .arg(&db)
        .arg("--out")
        .arg(dir.path().join("records.json"))
        .status()
        .unwrap();
    assert!(status.success());

    let status = ahp()
        .arg("--config")
        .arg(&config_path)
        .args(["aggregate", "--goal", "Choose a car"])
        .arg("--db")
        .arg(&db)
        .arg("--out")
        .arg(&report_path)
        .status()
        .unwrap();
    assert!(status.success());
    let report = read_json(&report_path);
    let rows = report["status"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["valid"] == true));
}

#[test]
fn cli_rejects_non_positive_scale_in_config() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    std::fs::write(&config_path, r#"{"survey": {"scale": {"max_step": -2}}}"#).unwrap();
    let status = ahp()
        .arg("--config")
        .arg(&config_path)
        .args(["pairs", "--items", "a,b"])
        .status()
        .unwrap();
    assert!(!status.success());
}
