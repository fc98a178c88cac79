// src/scenario/exec.rs

//! Runs a scenario's steps in order and reports each one as it goes.
//!
//! A step is announced with a `Begin` record before its call is made, and
//! the sink flushes it. If the call takes the process down, the last record
//! on the stream names the step that was in flight.

use super::{Preconditions, Scenario, Step};
use crate::compute::{DispatchOutcome, DispatchValidator};
use crate::lifecycle::{DestroyedHandle, ImageBuffer, LifecycleError, Session};
use crate::native::CasApi;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// How a step ended, when it ended at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// The call returned normally.
    Completed,
    /// `call` returned a null pointer.
    NullReturned { call: String },
    /// The lifecycle model refused the call; nothing native ran.
    HostRejected {
        reason: String,
        violated: Preconditions,
    },
    /// A kernel launch finished with `outcome`.
    Dispatched { outcome: DispatchOutcome },
    /// The step could not be attempted.
    Skipped { reason: String },
}

impl StepStatus {
    /// Whether the step ran and its result matches a normal call.
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed
                | StepStatus::Dispatched {
                    outcome: DispatchOutcome::Identical
                }
        )
    }
}

/// One line of the worker's step stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StepRecord {
    Begin {
        index: usize,
        step: String,
    },
    End {
        index: usize,
        step: String,
        status: StepStatus,
    },
    /// The worker could not prepare a backend the scenario needs.
    SetupFailed { message: String },
}

/// Receives step records as they happen.
pub trait StepSink {
    fn record(&mut self, record: StepRecord) -> Result<()>;
}

impl StepSink for Vec<StepRecord> {
    fn record(&mut self, record: StepRecord) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

/// Writes each record as one JSON line and flushes it.
pub struct JsonLines<W: Write> {
    out: W,
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W) -> Self {
        JsonLines { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StepSink for JsonLines<W> {
    fn record(&mut self, record: StepRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, &record).context("Failed to encode step record")?;
        self.out
            .write_all(b"\n")
            .and_then(|_| self.out.flush())
            .context("Failed to write step record")
    }
}

/// The backends a scenario's steps run against.
pub struct Executor<'a> {
    cas: Option<&'a dyn CasApi>,
    validator: Option<DispatchValidator>,
    validate_params: bool,
}

impl<'a> Executor<'a> {
    pub fn new(cas: Option<&'a dyn CasApi>, validator: Option<DispatchValidator>) -> Self {
        Executor {
            cas,
            validator,
            validate_params: false,
        }
    }

    /// Refuse out-of-range sharpen parameters host-side.
    pub fn with_param_validation(mut self, enabled: bool) -> Self {
        self.validate_params = enabled;
        self
    }

    /// Runs every step of `scenario`, reporting to `sink`.
    ///
    /// Refused or failed steps do not stop the run. A context left live at
    /// the end is released when the session drops.
    pub fn run(&mut self, scenario: &Scenario, sink: &mut dyn StepSink) -> Result<()> {
        log::info!("Running scenario '{}'", scenario.name);
        let mut session = None;
        let mut destroyed = None;

        for (index, step) in scenario.steps.iter().enumerate() {
            let label = step.label();
            sink.record(StepRecord::Begin {
                index,
                step: label.clone(),
            })?;
            let status = self.perform(step, &mut session, &mut destroyed);
            log::debug!("Step {} ({}) ended: {:?}", index, label, status);
            sink.record(StepRecord::End {
                index,
                step: label,
                status,
            })?;
        }
        Ok(())
    }

    fn perform(
        &mut self,
        step: &Step,
        session: &mut Option<Session<'a, dyn CasApi + 'a>>,
        destroyed: &mut Option<DestroyedHandle>,
    ) -> StepStatus {
        match *step {
            Step::Dispatch(range) | Step::DispatchOversized(range) => {
                let Some(validator) = self.validator.as_mut() else {
                    return skipped("no compute queue");
                };
                let oversized = matches!(step, Step::DispatchOversized(_));
                let limits = validator.limits();
                if range.fits(limits) == oversized {
                    return skipped(&format!(
                        "{} {} the limits of {} (max work-group {})",
                        range,
                        if oversized { "is within" } else { "exceeds" },
                        limits.device_name,
                        limits.max_work_group_size
                    ));
                }
                match validator.dispatch(&range) {
                    Ok(outcome) => StepStatus::Dispatched { outcome },
                    Err(err) => skipped(&format!("{:#}", err)),
                }
            }

            Step::Initialize => {
                let Some(cas) = self.cas else {
                    return skipped("no CAS library");
                };
                if session.is_some() {
                    return StepStatus::HostRejected {
                        reason: "a context is already live in this session".to_string(),
                        violated: Preconditions::empty(),
                    };
                }
                match Session::initialize(cas) {
                    Ok(s) => {
                        *session = Some(s.with_param_validation(self.validate_params));
                        StepStatus::Completed
                    }
                    Err(err) => status_for(err),
                }
            }

            Step::SupplyImage {
                width,
                height,
                fill,
                has_alpha,
                shortfall,
            } => {
                let Some(s) = session.as_mut() else {
                    return skipped("no live session");
                };
                let Some(image) = ImageBuffer::filled(width, height, fill) else {
                    return skipped("image dimensions overflow");
                };
                let image = image.truncated(shortfall);
                match s.supply_image(image, has_alpha) {
                    Ok(()) => StepStatus::Completed,
                    Err(err) => status_for(err),
                }
            }

            Step::SupplyNullImage {
                width,
                height,
                has_alpha,
            } => {
                let Some(s) = session.as_mut() else {
                    return skipped("no live session");
                };
                // SAFETY: not sound; the library is handed a null image.
                match unsafe { s.supply_image_unchecked(std::ptr::null(), has_alpha, height, width) }
                {
                    Ok(()) => StepStatus::Completed,
                    Err(err) => status_for(err),
                }
            }

            Step::Sharpen(params) => {
                let Some(s) = session.as_mut() else {
                    return skipped("no live session");
                };
                match s.sharpen_image(params) {
                    Ok(_) => StepStatus::Completed,
                    Err(err) => status_for(err),
                }
            }

            Step::Destroy => {
                let Some(s) = session.take() else {
                    return skipped("no live session");
                };
                match s.destroy() {
                    Ok(handle) => {
                        *destroyed = Some(handle);
                        StepStatus::Completed
                    }
                    Err(err) => status_for(err),
                }
            }

            Step::DestroyAgain => {
                let (Some(cas), Some(handle)) = (self.cas, destroyed.take()) else {
                    return skipped("no destroyed context");
                };
                // SAFETY: not sound; this is the double destroy under test.
                unsafe { handle.destroy_again(cas) };
                StepStatus::Completed
            }
        }
    }
}

fn skipped(reason: &str) -> StepStatus {
    StepStatus::Skipped {
        reason: reason.to_string(),
    }
}

fn status_for(err: LifecycleError) -> StepStatus {
    match err {
        LifecycleError::AllocationFailed => StepStatus::NullReturned {
            call: "CAS_initialize".to_string(),
        },
        LifecycleError::SharpenFailed => StepStatus::NullReturned {
            call: "CAS_sharpenImage".to_string(),
        },
        err => StepStatus::HostRejected {
            reason: err.to_string(),
            violated: err.violated(),
        },
    }
}
