// src/runner/tests.rs

use super::*;
use crate::compute::{ClStatus, DispatchOutcome};
use std::time::Duration;
use test_log::test;

fn begin(index: usize, step: &str) -> StepRecord {
    StepRecord::Begin {
        index,
        step: step.to_string(),
    }
}

fn end(index: usize, step: &str, status: StepStatus) -> StepRecord {
    StepRecord::End {
        index,
        step: step.to_string(),
        status,
    }
}

fn worker_run(records: Vec<StepRecord>, termination: Termination) -> WorkerRun {
    WorkerRun {
        records,
        termination,
        elapsed: Duration::from_millis(5),
    }
}

fn exited(code: i32) -> Termination {
    Termination::Exited { code }
}

fn dispatched(outcome: DispatchOutcome) -> StepStatus {
    StepStatus::Dispatched { outcome }
}

// --- Classification ---

#[test]
fn signal_in_flight_is_a_fault_naming_the_step() {
    let run = worker_run(
        vec![
            begin(0, "initialize"),
            end(0, "initialize", StepStatus::Completed),
            begin(1, "destroy"),
            end(1, "destroy", StepStatus::Completed),
            begin(2, "destroy_again"),
        ],
        Termination::Signaled {
            signal: "SIGABRT".to_string(),
            number: 6,
        },
    );
    let observed = classify(&run);
    assert_eq!(
        observed,
        ObservedResult::Fault {
            step: Some("destroy_again".to_string()),
            signal: Some("SIGABRT".to_string()),
            exit_code: None,
        }
    );
    assert_eq!(observed.detectability(), Some(Detectability::SanitizerOnly));
}

#[test]
fn sanitizer_exit_code_with_step_in_flight_is_a_fault() {
    let run = worker_run(
        vec![
            begin(0, "initialize"),
            end(0, "initialize", StepStatus::Completed),
            begin(1, "supply_image(256x256, null)"),
        ],
        exited(1),
    );
    assert!(matches!(
        classify(&run),
        ObservedResult::Fault { exit_code: Some(1), signal: None, .. }
    ));
}

#[test]
fn setup_failure_is_a_harness_error() {
    let run = worker_run(
        vec![StepRecord::SetupFailed {
            message: "Failed to load CAS library libCAS.so".to_string(),
        }],
        exited(3),
    );
    match classify(&run) {
        ObservedResult::HarnessError { message } => assert!(message.contains("libCAS.so")),
        other => panic!("expected harness error, got {:?}", other),
    }
}

#[test]
fn timeout_is_a_hang() {
    let run = worker_run(
        vec![begin(0, "sharpen(mode=0, strength=0.5, contrast=0.5)")],
        Termination::TimedOut,
    );
    assert_eq!(
        classify(&run),
        ObservedResult::Hang {
            step: Some("sharpen(mode=0, strength=0.5, contrast=0.5)".to_string())
        }
    );
}

#[test]
fn first_non_ok_step_decides() {
    let rejected = StepStatus::HostRejected {
        reason: "sharpen_image is not allowed in state Initialized".to_string(),
        violated: Preconditions::IMAGE_SUPPLIED,
    };
    let run = worker_run(
        vec![
            begin(0, "initialize"),
            end(0, "initialize", StepStatus::Completed),
            begin(1, "sharpen"),
            end(1, "sharpen", rejected.clone()),
            begin(2, "destroy"),
            end(2, "destroy", rejected),
        ],
        exited(0),
    );
    let observed = classify(&run);
    assert_eq!(
        observed,
        ObservedResult::HostRejected {
            step: "sharpen".to_string(),
            violated: Preconditions::IMAGE_SUPPLIED,
        }
    );
    assert_eq!(observed.detectability(), Some(Detectability::HostAnalyzer));
}

#[test]
fn rejected_launch_is_a_native_error() {
    let run = worker_run(
        vec![
            end(0, "dispatch ok", dispatched(DispatchOutcome::Identical)),
            end(
                1,
                "dispatch big",
                dispatched(DispatchOutcome::Rejected {
                    status: ClStatus::INVALID_WORK_GROUP_SIZE,
                }),
            ),
            end(2, "dispatch ok", dispatched(DispatchOutcome::Identical)),
        ],
        exited(0),
    );
    let observed = classify(&run);
    assert_eq!(
        observed,
        ObservedResult::NativeError {
            step: "dispatch big".to_string(),
            status: ClStatus::INVALID_WORK_GROUP_SIZE,
        }
    );
    assert_eq!(observed.detectability(), Some(Detectability::RuntimeError));
}

#[test]
fn refused_follow_up_launch_fails_the_scenario() {
    let run = worker_run(
        vec![
            end(0, "dispatch ok", dispatched(DispatchOutcome::Identical)),
            end(
                1,
                "dispatch big",
                dispatched(DispatchOutcome::Rejected {
                    status: ClStatus::INVALID_WORK_GROUP_SIZE,
                }),
            ),
            end(
                2,
                "dispatch ok",
                dispatched(DispatchOutcome::CompliantRejected {
                    status: ClStatus::INVALID_COMMAND_QUEUE,
                }),
            ),
        ],
        exited(0),
    );
    let observed = classify(&run);
    assert_eq!(
        observed,
        ObservedResult::CompliantLaunchFailed {
            step: "dispatch ok".to_string(),
            status: ClStatus::INVALID_COMMAND_QUEUE,
        }
    );
    assert_eq!(
        verdict(Expectation::Detected(Detectability::RuntimeError), &observed),
        Verdict::Fail
    );
}

#[test]
fn unrelated_status_for_oversized_launch_fails_the_scenario() {
    let run = worker_run(
        vec![
            end(0, "dispatch ok", dispatched(DispatchOutcome::Identical)),
            end(
                1,
                "dispatch big",
                dispatched(DispatchOutcome::UnexpectedStatus {
                    status: ClStatus::OUT_OF_HOST_MEMORY,
                }),
            ),
            end(2, "dispatch ok", dispatched(DispatchOutcome::Identical)),
        ],
        exited(0),
    );
    let observed = classify(&run);
    assert_eq!(observed.kind(), "unexpected_status");
    assert_eq!(observed.detectability(), None);
    assert_eq!(
        verdict(Expectation::Detected(Detectability::RuntimeError), &observed),
        Verdict::Fail
    );
}

#[test]
fn refused_first_launch_does_not_hide_silent_acceptance() {
    let run = worker_run(
        vec![
            end(
                0,
                "dispatch ok",
                dispatched(DispatchOutcome::CompliantRejected {
                    status: ClStatus::OUT_OF_RESOURCES,
                }),
            ),
            end(1, "dispatch big", dispatched(DispatchOutcome::UnexpectedlyAccepted)),
            end(2, "dispatch ok", dispatched(DispatchOutcome::Identical)),
        ],
        exited(0),
    );
    let observed = classify(&run);
    assert_eq!(observed.kind(), "compliant_launch_failed");
    assert_eq!(
        verdict(Expectation::Detected(Detectability::RuntimeError), &observed),
        Verdict::Fail
    );
}

#[test]
fn silent_acceptance_after_a_good_launch_is_reported() {
    let run = worker_run(
        vec![
            end(0, "dispatch ok", dispatched(DispatchOutcome::Identical)),
            end(1, "dispatch big", dispatched(DispatchOutcome::UnexpectedlyAccepted)),
        ],
        exited(0),
    );
    assert_eq!(
        classify(&run),
        ObservedResult::UnexpectedlyAccepted {
            step: "dispatch big".to_string()
        }
    );
}

#[test]
fn mismatch_outranks_an_earlier_rejection() {
    let run = worker_run(
        vec![
            end(
                0,
                "dispatch big",
                dispatched(DispatchOutcome::Rejected {
                    status: ClStatus::INVALID_WORK_GROUP_SIZE,
                }),
            ),
            end(1, "dispatch ok", dispatched(DispatchOutcome::Mismatch { offset: 12 })),
        ],
        exited(0),
    );
    assert_eq!(
        classify(&run),
        ObservedResult::OutputMismatch {
            step: "dispatch ok".to_string(),
            offset: 12,
        }
    );
}

#[test]
fn all_ok_steps_are_a_success() {
    let run = worker_run(
        vec![
            begin(0, "initialize"),
            end(0, "initialize", StepStatus::Completed),
            begin(1, "destroy"),
            end(1, "destroy", StepStatus::Completed),
        ],
        exited(0),
    );
    assert_eq!(classify(&run), ObservedResult::Success);
}

#[test]
fn clean_exit_without_steps_is_a_harness_error() {
    let run = worker_run(Vec::new(), exited(0));
    assert!(matches!(classify(&run), ObservedResult::HarnessError { .. }));
}

// --- Verdicts ---

#[test]
fn verdicts_follow_the_declared_expectation() {
    let fault = ObservedResult::Fault {
        step: Some("destroy_again".to_string()),
        signal: Some("SIGSEGV".to_string()),
        exit_code: None,
    };
    let sanitizer = Expectation::Detected(Detectability::SanitizerOnly);

    assert_eq!(verdict(sanitizer, &fault), Verdict::Pass);
    // A double destroy that no longer faults is a regression.
    assert_eq!(verdict(sanitizer, &ObservedResult::Success), Verdict::Fail);
    assert_eq!(verdict(Expectation::Succeeds, &ObservedResult::Success), Verdict::Pass);
    assert_eq!(verdict(Expectation::Succeeds, &fault), Verdict::Fail);
    assert_eq!(verdict(Expectation::Discover, &fault), Verdict::Recorded);
    assert_eq!(
        verdict(
            Expectation::Discover,
            &ObservedResult::HarnessError {
                message: "no library".to_string()
            }
        ),
        Verdict::Fail
    );
    assert_eq!(
        verdict(
            Expectation::Detected(Detectability::RuntimeError),
            &ObservedResult::UnexpectedlyAccepted {
                step: "dispatch".to_string()
            }
        ),
        Verdict::Fail
    );
}

#[test]
fn disagreeing_attempts_are_inconclusive() {
    let fault = ObservedResult::Fault {
        step: None,
        signal: Some("SIGSEGV".to_string()),
        exit_code: None,
    };
    let sanitizer = Expectation::Detected(Detectability::SanitizerOnly);

    assert_eq!(
        verdict_over(sanitizer, &[fault.clone(), fault.clone()]),
        Verdict::Pass
    );
    assert_eq!(
        verdict_over(sanitizer, &[fault, ObservedResult::Success]),
        Verdict::Inconclusive
    );
    assert_eq!(verdict_over(sanitizer, &[]), Verdict::Fail);
}

// --- Worker stream ---

#[test]
fn malformed_lines_are_skipped() {
    let stream = concat!(
        "{\"phase\":\"begin\",\"index\":0,\"step\":\"initialize\"}\n",
        "AddressSanitizer: heap-use-after-free\n",
        "\n",
        "{\"phase\":\"end\",\"index\":0,\"step\":\"initialize\",\"status\":{\"status\":\"completed\"}}\n",
    );
    let records = read_records(stream.as_bytes());
    assert_eq!(
        records,
        vec![
            begin(0, "initialize"),
            end(0, "initialize", StepStatus::Completed)
        ]
    );
}

/// Writes an executable shell script standing in for the harness binary.
fn fake_worker(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.path().join("fake-worker");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

// One test so the scripts are never written while another test forks.
#[test]
fn worker_processes_are_isolated_and_bounded() {
    let dir = tempfile::tempdir().unwrap();

    let crashing = fake_worker(
        &dir,
        r#"echo '{"phase":"begin","index":0,"step":"destroy_again"}'
echo 'double free or corruption' >&2
kill -SEGV $$"#,
    );
    let run =
        run_worker_process(&crashing, "double_destroy", "{}", Duration::from_secs(10)).unwrap();
    assert_eq!(
        run.termination,
        Termination::Signaled {
            signal: "SIGSEGV".to_string(),
            number: 11,
        }
    );
    assert_eq!(run.records, vec![begin(0, "destroy_again")]);

    let hanging = fake_worker(&dir, "exec sleep 30");
    let run = run_worker_process(&hanging, "hang", "{}", Duration::from_millis(200)).unwrap();
    assert_eq!(run.termination, Termination::TimedOut);
    assert!(run.elapsed < Duration::from_secs(10));

    let exiting = fake_worker(&dir, "exit 3");
    let run = run_worker_process(&exiting, "setup", "{}", Duration::from_secs(10)).unwrap();
    assert_eq!(run.termination, Termination::Exited { code: 3 });

    // A worker the runner gives up on is killed and reaped, closing its pipe.
    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .stdout(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    let stdout = child.stdout.take().unwrap();
    let reader = std::thread::spawn(move || read_records(stdout));
    assert!(super::isolation::stop_worker(&mut child));
    let status = child.try_wait().unwrap().expect("worker reaped");
    assert_eq!(
        std::os::unix::process::ExitStatusExt::signal(&status),
        Some(libc::SIGKILL)
    );
    assert!(reader.join().unwrap().is_empty());
}
