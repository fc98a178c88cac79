// src/runner/mod.rs

//! Sequences scenarios through isolated worker processes and judges them.
//!
//! Every attempt runs in a fresh `<exe> worker <name>` child so a fault kills
//! only that child. The runner turns the child's step records and its
//! termination into an [`ObservedResult`], compares it with the scenario's
//! declared expectation and produces an [`OutcomeRecord`].

mod isolation;
pub mod worker;

pub use isolation::{read_records, run_worker_process, Termination, WorkerRun};

use crate::compute::{ClStatus, DispatchOutcome};
use crate::config::Config;
use crate::scenario::{Detectability, Expectation, Preconditions, Scenario, StepRecord, StepStatus};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// --- Classification ---

/// What a scenario attempt did, as seen from outside the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ObservedResult {
    /// Every step completed normally.
    Success,
    /// The library returned null from `call`.
    NullReturned { step: String, call: String },
    /// The lifecycle model refused `step`.
    HostRejected {
        step: String,
        violated: Preconditions,
    },
    /// The compute runtime refused an oversized launch with a range status.
    NativeError { step: String, status: ClStatus },
    /// The compute runtime refused a launch within the device limits.
    CompliantLaunchFailed { step: String, status: ClStatus },
    /// An oversized launch was refused with a status unrelated to its range.
    UnexpectedStatus { step: String, status: ClStatus },
    /// The worker died in `step`.
    Fault {
        step: Option<String>,
        signal: Option<String>,
        exit_code: Option<i32>,
    },
    /// The worker was still running at the deadline.
    Hang { step: Option<String> },
    /// A launch completed with output differing from its input.
    OutputMismatch { step: String, offset: usize },
    /// A launch exceeding the device limits completed anyway.
    UnexpectedlyAccepted { step: String },
    /// The scenario could not be carried out as authored.
    HarnessError { message: String },
}

impl ObservedResult {
    /// The detection layer this result evidences, if any.
    pub fn detectability(&self) -> Option<Detectability> {
        match self {
            ObservedResult::HostRejected { .. } => Some(Detectability::HostAnalyzer),
            ObservedResult::NullReturned { .. } | ObservedResult::NativeError { .. } => {
                Some(Detectability::RuntimeError)
            }
            ObservedResult::Fault { .. } => Some(Detectability::SanitizerOnly),
            _ => None,
        }
    }

    /// Variant name, used to compare repeated attempts.
    pub fn kind(&self) -> &'static str {
        match self {
            ObservedResult::Success => "success",
            ObservedResult::NullReturned { .. } => "null_returned",
            ObservedResult::HostRejected { .. } => "host_rejected",
            ObservedResult::NativeError { .. } => "native_error",
            ObservedResult::CompliantLaunchFailed { .. } => "compliant_launch_failed",
            ObservedResult::UnexpectedStatus { .. } => "unexpected_status",
            ObservedResult::Fault { .. } => "fault",
            ObservedResult::Hang { .. } => "hang",
            ObservedResult::OutputMismatch { .. } => "output_mismatch",
            ObservedResult::UnexpectedlyAccepted { .. } => "unexpectedly_accepted",
            ObservedResult::HarnessError { .. } => "harness_error",
        }
    }

    /// Whether the worker process ended abnormally.
    pub fn is_abnormal_termination(&self) -> bool {
        matches!(self, ObservedResult::Fault { .. } | ObservedResult::Hang { .. })
    }
}

impl std::fmt::Display for ObservedResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservedResult::Success => f.write_str("success"),
            ObservedResult::NullReturned { step, call } => {
                write!(f, "{} returned null in {}", call, step)
            }
            ObservedResult::HostRejected { step, violated } => {
                write!(f, "host rejected {} ({})", step, violated)
            }
            ObservedResult::NativeError { step, status } => write!(f, "{} in {}", status, step),
            ObservedResult::CompliantLaunchFailed { step, status } => {
                write!(f, "compliant launch failed with {} in {}", status, step)
            }
            ObservedResult::UnexpectedStatus { step, status } => {
                write!(f, "oversized launch refused with unrelated {} in {}", status, step)
            }
            ObservedResult::Fault {
                step,
                signal,
                exit_code,
            } => {
                match (signal, exit_code) {
                    (Some(signal), _) => write!(f, "fault: {}", signal)?,
                    (None, Some(code)) => write!(f, "fault: exit status {}", code)?,
                    (None, None) => f.write_str("fault")?,
                }
                match step {
                    Some(step) => write!(f, " in {}", step),
                    None => Ok(()),
                }
            }
            ObservedResult::Hang { step } => match step {
                Some(step) => write!(f, "hang in {}", step),
                None => f.write_str("hang"),
            },
            ObservedResult::OutputMismatch { step, offset } => {
                write!(f, "output mismatch at byte {} in {}", offset, step)
            }
            ObservedResult::UnexpectedlyAccepted { step } => {
                write!(f, "non-compliant launch accepted in {}", step)
            }
            ObservedResult::HarnessError { message } => write!(f, "harness error: {}", message),
        }
    }
}

/// The step that was announced but never finished, if any.
fn in_flight(records: &[StepRecord]) -> Option<String> {
    match records.last() {
        Some(StepRecord::Begin { step, .. }) => Some(step.clone()),
        _ => None,
    }
}

/// Classifies one attempt from its records and termination.
pub fn classify(run: &WorkerRun) -> ObservedResult {
    let pending = in_flight(&run.records);
    match &run.termination {
        Termination::TimedOut => return ObservedResult::Hang { step: pending },
        Termination::Signaled { signal, .. } => {
            return ObservedResult::Fault {
                step: pending,
                signal: Some(signal.clone()),
                exit_code: None,
            }
        }
        Termination::Exited { code } if *code != 0 && pending.is_some() => {
            return ObservedResult::Fault {
                step: pending,
                signal: None,
                exit_code: Some(*code),
            }
        }
        Termination::Exited { code } if *code != 0 => {
            let message = run
                .records
                .iter()
                .find_map(|r| match r {
                    StepRecord::SetupFailed { message } => Some(message.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| format!("worker exited with status {}", code));
            return ObservedResult::HarnessError { message };
        }
        Termination::Exited { .. } => {}
    }
    classify_steps(&run.records)
}

fn classify_steps(records: &[StepRecord]) -> ObservedResult {
    let ends: Vec<(&String, &StepStatus)> = records
        .iter()
        .filter_map(|r| match r {
            StepRecord::End { step, status, .. } => Some((step, status)),
            _ => None,
        })
        .collect();
    if ends.is_empty() {
        return ObservedResult::HarnessError {
            message: "worker reported no steps".to_string(),
        };
    }

    // A launch that broke its contract outranks anything else the scenario
    // did, wherever it happened.
    let worst = ends
        .iter()
        .filter_map(|(step, status)| match status {
            StepStatus::Dispatched { outcome } => breach(step, outcome),
            _ => None,
        })
        .min_by_key(|(rank, _)| *rank);
    if let Some((_, observed)) = worst {
        return observed;
    }

    for (step, status) in ends {
        let step = step.clone();
        match status {
            StepStatus::Completed => continue,
            StepStatus::NullReturned { call } => {
                return ObservedResult::NullReturned {
                    step,
                    call: call.clone(),
                }
            }
            StepStatus::HostRejected { violated, .. } => {
                return ObservedResult::HostRejected {
                    step,
                    violated: *violated,
                }
            }
            StepStatus::Dispatched {
                outcome: DispatchOutcome::Rejected { status },
            } => {
                return ObservedResult::NativeError {
                    step,
                    status: *status,
                }
            }
            StepStatus::Dispatched { .. } => continue,
            StepStatus::Skipped { reason } => {
                return ObservedResult::HarnessError {
                    message: format!("{} skipped: {}", step, reason),
                }
            }
        }
    }
    ObservedResult::Success
}

/// A launch outcome that broke the dispatch contract, ranked so a corrupted
/// copy outranks a refused compliant launch, which outranks a wrong status,
/// which outranks silent acceptance.
fn breach(step: &str, outcome: &DispatchOutcome) -> Option<(u8, ObservedResult)> {
    let step = step.to_string();
    match *outcome {
        DispatchOutcome::Mismatch { offset } => {
            Some((0, ObservedResult::OutputMismatch { step, offset }))
        }
        DispatchOutcome::CompliantRejected { status } => {
            Some((1, ObservedResult::CompliantLaunchFailed { step, status }))
        }
        DispatchOutcome::UnexpectedStatus { status } => {
            Some((2, ObservedResult::UnexpectedStatus { step, status }))
        }
        DispatchOutcome::UnexpectedlyAccepted => {
            Some((3, ObservedResult::UnexpectedlyAccepted { step }))
        }
        DispatchOutcome::Identical | DispatchOutcome::Rejected { .. } => None,
    }
}

// --- Verdicts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Observed what was declared.
    Pass,
    /// Observed something else.
    Fail,
    /// Behavior is undocumented; the observation is recorded as found.
    Recorded,
    /// Repeated attempts disagreed.
    Inconclusive,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Recorded => "RECORDED",
            Verdict::Inconclusive => "INCONCLUSIVE",
        })
    }
}

/// Judges a single observation against a declared expectation.
pub fn verdict(expected: Expectation, observed: &ObservedResult) -> Verdict {
    match (expected, observed) {
        (_, ObservedResult::HarnessError { .. }) => Verdict::Fail,
        (Expectation::Discover, _) => Verdict::Recorded,
        (Expectation::Succeeds, ObservedResult::Success) => Verdict::Pass,
        (Expectation::Detected(layer), observed) if observed.detectability() == Some(layer) => {
            Verdict::Pass
        }
        _ => Verdict::Fail,
    }
}

/// Judges a series of attempts. Attempts of different kinds are inconclusive.
pub fn verdict_over(expected: Expectation, attempts: &[ObservedResult]) -> Verdict {
    match attempts.split_first() {
        None => Verdict::Fail,
        Some((first, rest)) if rest.iter().any(|o| o.kind() != first.kind()) => {
            Verdict::Inconclusive
        }
        Some((first, _)) => verdict(expected, first),
    }
}

// --- Outcome records ---

/// The result of running one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub scenario: String,
    pub summary: String,
    pub violates: Preconditions,
    pub expected: Expectation,
    pub observed: ObservedResult,
    pub verdict: Verdict,
    pub attempts: u32,
    /// Termination of the last attempt, when a worker ran.
    pub termination: Option<Termination>,
    /// Step records of the last attempt.
    pub steps: Vec<StepRecord>,
    pub elapsed_ms: u64,
}

// --- Runner ---

/// Runs scenarios in worker processes of `exe`.
pub struct ScenarioRunner {
    exe: PathBuf,
    handoff: String,
    timeout: Duration,
    repeats: u32,
}

impl ScenarioRunner {
    /// A runner re-executing the current binary.
    pub fn new(config: &Config) -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate the harness executable")?;
        Self::with_executable(config, exe)
    }

    pub fn with_executable(config: &Config, exe: PathBuf) -> Result<Self> {
        Ok(ScenarioRunner {
            exe,
            handoff: config.to_handoff()?,
            timeout: Duration::from_millis(config.runner.timeout_ms),
            repeats: config.runner.repeats.max(1),
        })
    }

    /// Runs every attempt of `scenario` and judges them together.
    pub fn run(&self, scenario: &Scenario) -> OutcomeRecord {
        let mut observations = Vec::with_capacity(self.repeats as usize);
        let mut last = None;
        let mut elapsed = Duration::ZERO;

        for attempt in 1..=self.repeats {
            log::info!(
                "Running '{}' (attempt {}/{})",
                scenario.name,
                attempt,
                self.repeats
            );
            match run_worker_process(&self.exe, scenario.name, &self.handoff, self.timeout) {
                Ok(run) => {
                    let observed = classify(&run);
                    log::info!("'{}' attempt {}: {}", scenario.name, attempt, observed);
                    elapsed += run.elapsed;
                    observations.push(observed);
                    last = Some(run);
                }
                Err(e) => {
                    log::error!("'{}' attempt {} failed: {:#}", scenario.name, attempt, e);
                    observations.push(ObservedResult::HarnessError {
                        message: format!("{:#}", e),
                    });
                }
            }
        }

        let verdict = verdict_over(scenario.expected, &observations);
        let observed = observations
            .pop()
            .unwrap_or(ObservedResult::HarnessError {
                message: "no attempts were made".to_string(),
            });
        let (termination, steps) = match last {
            Some(run) => (Some(run.termination), run.records),
            None => (None, Vec::new()),
        };

        OutcomeRecord {
            scenario: scenario.name.to_string(),
            summary: scenario.summary.to_string(),
            violates: scenario.violates,
            expected: scenario.expected,
            observed,
            verdict,
            attempts: self.repeats,
            termination,
            steps,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn run_all<'s, I>(&self, scenarios: I) -> Vec<OutcomeRecord>
    where
        I: IntoIterator<Item = &'s Scenario>,
    {
        scenarios.into_iter().map(|s| self.run(s)).collect()
    }
}

#[cfg(test)]
mod tests;
