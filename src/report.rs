// src/report.rs

//! Renders outcome records for people (text) and for tools (JSON).

use crate::runner::{OutcomeRecord, Verdict};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write;

/// Process exit status when every scenario passed or was recorded.
pub const EXIT_OK: i32 = 0;
/// Process exit status when any scenario failed or was inconclusive.
pub const EXIT_FINDINGS: i32 = 1;
/// Process exit status for usage and configuration errors.
pub const EXIT_USAGE: i32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub recorded: usize,
    pub inconclusive: usize,
}

impl Summary {
    pub fn of(outcomes: &[OutcomeRecord]) -> Self {
        let mut summary = Summary::default();
        for outcome in outcomes {
            match outcome.verdict {
                Verdict::Pass => summary.passed += 1,
                Verdict::Fail => summary.failed += 1,
                Verdict::Recorded => summary.recorded += 1,
                Verdict::Inconclusive => summary.inconclusive += 1,
            }
        }
        summary
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: Summary,
    outcomes: &'a [OutcomeRecord],
}

/// Exit status for a finished run.
pub fn exit_code(outcomes: &[OutcomeRecord]) -> i32 {
    let all_good = outcomes
        .iter()
        .all(|o| matches!(o.verdict, Verdict::Pass | Verdict::Recorded));
    if all_good {
        EXIT_OK
    } else {
        EXIT_FINDINGS
    }
}

pub fn render_json(outcomes: &[OutcomeRecord]) -> Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        summary: Summary::of(outcomes),
        outcomes,
    })
    .context("Failed to serialize report")
}

/// A table of verdicts, then the abnormal terminations that were expected,
/// then anything that did not match its expectation.
pub fn render_text(outcomes: &[OutcomeRecord]) -> String {
    let name_width = outcomes
        .iter()
        .map(|o| o.scenario.len())
        .max()
        .unwrap_or(0)
        .max("SCENARIO".len());
    let expected_width = outcomes
        .iter()
        .map(|o| o.expected.to_string().len())
        .max()
        .unwrap_or(0)
        .max("EXPECTED".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<nw$}  {:<ew$}  {:<12}  OBSERVED",
        "SCENARIO",
        "EXPECTED",
        "VERDICT",
        nw = name_width,
        ew = expected_width
    );
    for o in outcomes {
        let _ = writeln!(
            out,
            "{:<nw$}  {:<ew$}  {:<12}  {}",
            o.scenario,
            o.expected.to_string(),
            o.verdict.to_string(),
            o.observed,
            nw = name_width,
            ew = expected_width
        );
    }

    let expected_crashes: Vec<_> = outcomes
        .iter()
        .filter(|o| o.observed.is_abnormal_termination() && o.verdict != Verdict::Fail)
        .collect();
    if !expected_crashes.is_empty() {
        out.push_str("\nExpected abnormal terminations:\n");
        for o in expected_crashes {
            let _ = writeln!(out, "  {}: {}", o.scenario, o.observed);
        }
    }

    let findings: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o.verdict, Verdict::Fail | Verdict::Inconclusive))
        .collect();
    if !findings.is_empty() {
        out.push_str("\nFindings:\n");
        for o in findings {
            let _ = writeln!(
                out,
                "  {} [{}]: expected {}, observed {} ({} attempt(s))",
                o.scenario, o.verdict, o.expected, o.observed, o.attempts
            );
        }
    }

    let s = Summary::of(outcomes);
    let _ = writeln!(
        out,
        "\n{} passed, {} failed, {} recorded, {} inconclusive",
        s.passed, s.failed, s.recorded, s.inconclusive
    );
    out
}
