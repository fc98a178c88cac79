// src/runner/worker.rs

//! The child side of the isolation boundary.

use crate::compute::{self, DispatchValidator};
use crate::config::{Config, NativeBackend};
use crate::native::{CasApi, CasLibrary, SimulatedCas};
use crate::scenario::{self, Executor, JsonLines, StepRecord, StepSink};
use anyhow::{anyhow, Result};

/// Exit status of a worker that ran every step.
pub const EXIT_COMPLETED: i32 = 0;
/// Exit status of a worker whose scenario could not be set up.
pub const EXIT_SETUP_FAILED: i32 = 3;

/// Runs scenario `name` in this process, streaming step records to stdout.
///
/// Only the backends the scenario touches are opened. A backend that fails
/// to open is reported as a `setup_failed` record and [`EXIT_SETUP_FAILED`].
pub fn run_worker(name: &str, config: &Config) -> Result<i32> {
    let scenario = scenario::find(name).ok_or_else(|| anyhow!("Unknown scenario '{}'", name))?;
    let mut sink = JsonLines::new(std::io::stdout().lock());

    let simulated;
    let cas: Option<&dyn CasApi> = if !scenario.uses_library() {
        None
    } else {
        match config.library.backend {
            NativeBackend::Simulated => {
                simulated = SimulatedCas::new();
                Some(&simulated as &dyn CasApi)
            }
            NativeBackend::Native => match CasLibrary::shared(&config.library.resolved_path()) {
                Ok(library) => Some(library as &dyn CasApi),
                Err(e) => return setup_failed(&mut sink, e),
            },
        }
    };

    let validator = if scenario.uses_compute() {
        match compute::open_queue(&config.compute) {
            Ok(queue) => Some(DispatchValidator::new(queue)),
            Err(e) => return setup_failed(&mut sink, e),
        }
    } else {
        None
    };

    Executor::new(cas, validator)
        .with_param_validation(config.library.validate_sharpen_params)
        .run(scenario, &mut sink)?;
    Ok(EXIT_COMPLETED)
}

fn setup_failed(sink: &mut dyn StepSink, err: anyhow::Error) -> Result<i32> {
    log::error!("Scenario setup failed: {:#}", err);
    sink.record(StepRecord::SetupFailed {
        message: format!("{:#}", err),
    })?;
    Ok(EXIT_SETUP_FAILED)
}
