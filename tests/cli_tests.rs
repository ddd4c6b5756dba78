//! Integration tests for the Sheetflow CLI
//!
//! These tests run the actual CLI binary and verify output.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get the binary to test
fn sheetflow_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sheetflow").unwrap();
    cmd.current_dir(dir)
        .env_remove("SHEETFLOW_PREVIEW_ROWS")
        .env_remove("SHEETFLOW_OUTPUT_DIR")
        .env_remove("SHEETFLOW_RUN_TIMEOUT_SECS")
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("NO_COLOR", "1");
    cmd
}

fn write_inputs(dir: &Path, workflow: Value) -> (PathBuf, PathBuf) {
    let input = dir.join("sales.json");
    fs::write(
        &input,
        json!([
            {"dept": "A", "amt": 10},
            {"dept": "B", "amt": 5},
            {"dept": "A", "amt": 7}
        ])
        .to_string(),
    )
    .unwrap();

    let wf = dir.join("workflow.json");
    fs::write(&wf, workflow.to_string()).unwrap();
    (wf, input)
}

fn group_sum_workflow() -> Value {
    json!({"steps": [
        {"type": "group_sum", "group_by": "dept", "field": "amt", "target_sheet": "totals"}
    ]})
}

fn single_execution_record(out: &Path) -> Value {
    let records: Vec<_> = fs::read_dir(out.join("executions"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(records.len(), 1);
    serde_json::from_str(&fs::read_to_string(&records[0]).unwrap()).unwrap()
}

#[test]
fn test_help_flag() {
    let temp_dir = TempDir::new().unwrap();
    sheetflow_cmd(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("declarative spreadsheet workflows"));
}

#[test]
fn test_rules_lists_builtins() {
    let temp_dir = TempDir::new().unwrap();
    sheetflow_cmd(temp_dir.path())
        .arg("rules")
        .assert()
        .success()
        .stdout("filter\nmove\ngroup_sum\n");
}

#[test]
fn test_validate_valid_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let (wf, input) = write_inputs(temp_dir.path(), group_sum_workflow());

    sheetflow_cmd(temp_dir.path())
        .args(["validate", wf.to_str().unwrap(), input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("Steps: 1"));
}

#[test]
fn test_validate_unknown_column_shows_fix() {
    let temp_dir = TempDir::new().unwrap();
    let (wf, input) = write_inputs(
        temp_dir.path(),
        json!({"steps": [{"type": "filter", "column": "region", "operator": "=", "value": "x"}]}),
    );

    sheetflow_cmd(temp_dir.path())
        .args(["validate", wf.to_str().unwrap(), input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[SF-008]"))
        .stderr(predicate::str::contains("Step 0"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_run_writes_outputs_and_record() {
    let temp_dir = TempDir::new().unwrap();
    let (wf, input) = write_inputs(temp_dir.path(), group_sum_workflow());
    let out = temp_dir.path().join("out");

    sheetflow_cmd(temp_dir.path())
        .args([
            "run",
            wf.to_str().unwrap(),
            input.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Execution succeeded"))
        .stdout(predicate::str::contains("totals"));

    let record = single_execution_record(&out);
    assert_eq!(record["status"], "success");
    assert_eq!(record["logs"][0]["affected_rows"], 2);

    let id = record["id"].as_str().unwrap();
    let table: Value = serde_json::from_str(
        &fs::read_to_string(out.join(format!("output_{}_totals.json", id))).unwrap(),
    )
    .unwrap();
    assert_eq!(
        table,
        json!([{"dept": "A", "amt": 17}, {"dept": "B", "amt": 5}])
    );
}

#[test]
fn test_run_failure_is_recorded() {
    let temp_dir = TempDir::new().unwrap();
    let (wf, input) = write_inputs(temp_dir.path(), json!({"steps": [{"type": "bogus"}]}));
    let out = temp_dir.path().join("out");

    sheetflow_cmd(temp_dir.path())
        .args([
            "run",
            wf.to_str().unwrap(),
            input.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown rule type: bogus"))
        .stderr(predicate::str::contains("sheetflow rules"));

    let record = single_execution_record(&out);
    assert_eq!(record["status"], "failed");
    assert!(record["error_message"]
        .as_str()
        .unwrap()
        .contains("step 0 (bogus)"));
    assert!(record["finished_at"].is_string());
}

#[test]
fn test_bad_sheet_name_fails_validate_and_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let (wf, input) = write_inputs(
        temp_dir.path(),
        json!({"steps": [
            {"type": "move", "target_sheet": "ok"},
            {"type": "move", "target_sheet": "Q1.2024"}
        ]}),
    );
    let out = temp_dir.path().join("out");

    sheetflow_cmd(temp_dir.path())
        .args(["validate", wf.to_str().unwrap(), input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[SF-007] Step 1"))
        .stderr(predicate::str::contains("target_sheet"));

    sheetflow_cmd(temp_dir.path())
        .args([
            "run",
            wf.to_str().unwrap(),
            input.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[SF-007]"));

    assert_eq!(single_execution_record(&out)["status"], "failed");
    let outputs: Vec<_> = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("output_"))
        .collect();
    assert!(outputs.is_empty(), "unexpected outputs: {:?}", outputs);
}

#[test]
fn test_run_uses_output_dir_from_env() {
    let temp_dir = TempDir::new().unwrap();
    let (wf, input) = write_inputs(temp_dir.path(), group_sum_workflow());
    let out = temp_dir.path().join("from-env");

    sheetflow_cmd(temp_dir.path())
        .env("SHEETFLOW_OUTPUT_DIR", &out)
        .args(["run", wf.to_str().unwrap(), input.to_str().unwrap()])
        .assert()
        .success();

    assert_eq!(single_execution_record(&out)["status"], "success");
}

#[test]
fn test_preview_prints_json() {
    let temp_dir = TempDir::new().unwrap();
    let (wf, input) = write_inputs(temp_dir.path(), group_sum_workflow());

    let output = sheetflow_cmd(temp_dir.path())
        .args(["preview", wf.to_str().unwrap(), input.to_str().unwrap(), "-n", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let preview: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(preview["before"], json!([{"dept": "A", "amt": 10}]));
    assert_eq!(preview["after"]["sheet"], "totals");
    assert_eq!(preview["after"]["rows"], json!([{"dept": "A", "amt": 17}]));
    assert!(!temp_dir.path().join("uploads").exists());
}

#[test]
fn test_yaml_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let (_, input) = write_inputs(temp_dir.path(), group_sum_workflow());
    let wf = temp_dir.path().join("workflow.yaml");
    fs::write(
        &wf,
        "steps:\n  - type: filter\n    column: dept\n    operator: contains\n    value: a\n  - type: move\n    target_sheet: A rows\n",
    )
    .unwrap();

    sheetflow_cmd(temp_dir.path())
        .args(["validate", wf.to_str().unwrap(), input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Steps: 2"));
}

#[test]
fn test_missing_input_file() {
    let temp_dir = TempDir::new().unwrap();
    let (wf, _) = write_inputs(temp_dir.path(), group_sum_workflow());

    sheetflow_cmd(temp_dir.path())
        .args(["validate", wf.to_str().unwrap(), "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load input table"));
}

#[test]
fn test_malformed_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let (_, input) = write_inputs(temp_dir.path(), group_sum_workflow());
    let wf = temp_dir.path().join("broken.json");
    fs::write(&wf, "{\"steps\": [").unwrap();

    sheetflow_cmd(temp_dir.path())
        .args(["validate", wf.to_str().unwrap(), input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[SF-030]"));
}
