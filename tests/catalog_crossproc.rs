// tests/catalog_crossproc.rs

//! Runs the harness binary end to end on simulated backends, so faulting
//! scenarios really take down their worker processes.

use serde_json::Value;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Output};

const BIN: &str = env!("CARGO_BIN_EXE_cas-harness");

fn harness(args: &[&str]) -> Command {
    let mut cmd = Command::new(BIN);
    cmd.args(args)
        .env("RUST_LOG", "warn")
        .env_remove("CAS_HARNESS_CONFIG")
        .env_remove("CAS_HARNESS_CONFIG_JSON")
        .env_remove("CAS_LIBRARY_PATH");
    cmd
}

fn run_json(args: &[&str]) -> (Output, Value) {
    let output = harness(args).output().expect("failed to run cas-harness");
    let report: Value = serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not a JSON report ({}):\n{}\nstderr:\n{}",
            e,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (output, report)
}

fn outcome<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["outcomes"]
        .as_array()
        .expect("outcomes array")
        .iter()
        .find(|o| o["scenario"] == name)
        .unwrap_or_else(|| panic!("no outcome for {}", name))
}

#[test]
fn full_catalog_on_simulated_backends() {
    let (output, report) = run_json(&[
        "run",
        "--backend",
        "simulated",
        "--compute",
        "simulated",
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(0), "report: {:#}", report);
    assert_eq!(report["outcomes"].as_array().unwrap().len(), 9);
    assert_eq!(report["summary"]["failed"], 0);
    assert_eq!(report["summary"]["inconclusive"], 0);

    let double_destroy = outcome(&report, "double_destroy");
    assert_eq!(double_destroy["verdict"], "pass");
    assert_eq!(double_destroy["observed"]["result"], "fault");
    assert_eq!(double_destroy["observed"]["signal"], "SIGABRT");
    assert_eq!(double_destroy["observed"]["step"], "destroy_again");

    let null_image = outcome(&report, "null_image_supply");
    assert_eq!(null_image["observed"]["result"], "fault");
    assert_eq!(null_image["observed"]["signal"], "SIGSEGV");

    let oversized = outcome(&report, "oversized_work_group");
    assert_eq!(oversized["verdict"], "pass");
    assert_eq!(oversized["observed"]["result"], "native_error");
    assert_eq!(oversized["observed"]["status"], -54);

    let out_of_range = outcome(&report, "out_of_range_sharpen");
    assert_eq!(out_of_range["verdict"], "recorded");

    for name in ["sharpen_before_supply", "short_image_buffer"] {
        let o = outcome(&report, name);
        assert_eq!(o["verdict"], "pass", "{}: {:#}", name, o);
        assert_eq!(o["observed"]["result"], "host_rejected");
    }
}

#[test]
fn text_report_separates_expected_crashes() {
    let output = harness(&[
        "run",
        "double_destroy",
        "baseline_lifecycle",
        "--backend",
        "simulated",
    ])
    .output()
    .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let text = String::from_utf8_lossy(&output.stdout);
    let (_, crashes) = text
        .split_once("Expected abnormal terminations:")
        .unwrap_or_else(|| panic!("no crash section in:\n{}", text));
    assert!(crashes.contains("double_destroy"));
    assert!(!crashes.contains("baseline_lifecycle"));
}

#[test]
fn worker_dies_with_the_step_in_flight_announced() {
    let output = harness(&["worker", "double_destroy"])
        .env(
            "CAS_HARNESS_CONFIG_JSON",
            r#"{ "library": { "backend": "simulated" } }"#,
        )
        .output()
        .unwrap();
    assert_eq!(output.status.signal(), Some(libc::SIGABRT));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let last: Value = serde_json::from_str(stdout.lines().last().unwrap()).unwrap();
    assert_eq!(last["phase"], "begin");
    assert_eq!(last["step"], "destroy_again");
}

#[test]
fn worker_without_library_reports_setup_failure() {
    let output = harness(&["worker", "baseline_lifecycle"])
        .env(
            "CAS_HARNESS_CONFIG_JSON",
            r#"{ "library": { "backend": "native", "path": "/nonexistent/libCAS.so" } }"#,
        )
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"phase\":\"setup_failed\""), "{}", stdout);
}

#[test]
fn missing_library_fails_the_run() {
    let (output, report) = run_json(&[
        "run",
        "baseline_lifecycle",
        "--backend",
        "native",
        "--library",
        "/nonexistent/libCAS.so",
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let o = outcome(&report, "baseline_lifecycle");
    assert_eq!(o["verdict"], "fail");
    assert_eq!(o["observed"]["result"], "harness_error");
}

#[test]
fn repeats_are_counted() {
    let (output, report) = run_json(&[
        "run",
        "null_image_supply",
        "--backend",
        "simulated",
        "--repeats",
        "2",
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let o = outcome(&report, "null_image_supply");
    assert_eq!(o["attempts"], 2);
    assert_eq!(o["verdict"], "pass");
}

#[test]
fn unknown_scenario_is_a_usage_error() {
    let output = harness(&["run", "no_such_scenario"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn unreadable_config_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harness.json");
    std::fs::write(&path, "{ not json").unwrap();
    let output = harness(&["run", "--config", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn config_file_selects_backends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harness.json");
    std::fs::write(
        &path,
        r#"{ "library": { "backend": "simulated" }, "compute": { "backend": "simulated" } }"#,
    )
    .unwrap();
    let (output, report) = run_json(&[
        "run",
        "baseline_sharpen",
        "--config",
        path.to_str().unwrap(),
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(outcome(&report, "baseline_sharpen")["observed"]["result"], "success");
}

#[test]
fn oversized_work_group_needs_a_device_that_runs_the_compliant_launch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harness.json");
    std::fs::write(
        &path,
        r#"{ "compute": { "backend": "simulated", "simulated_max_work_group_size": 64 } }"#,
    )
    .unwrap();
    let (output, report) = run_json(&[
        "run",
        "oversized_work_group",
        "--config",
        path.to_str().unwrap(),
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let o = outcome(&report, "oversized_work_group");
    assert_eq!(o["verdict"], "fail");
    assert_eq!(o["observed"]["result"], "harness_error");
}

#[test]
fn list_prints_the_catalog() {
    let mut session = rexpect::spawn(&format!("{} list", BIN), Some(10_000)).unwrap();
    session.exp_string("baseline_lifecycle").unwrap();
    session.exp_string("double_destroy").unwrap();
    session.exp_string("sanitizer-only-detectable").unwrap();
    session.exp_string("oversized_work_group").unwrap();
    session.exp_eof().unwrap();
}
