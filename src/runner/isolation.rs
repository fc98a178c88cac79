// src/runner/isolation.rs

//! One worker process per scenario attempt.
//!
//! The worker's stdout carries step records and is drained on its own thread
//! so a chatty worker never blocks on a full pipe. Its stderr is forwarded to
//! the log at debug level. The wait is bounded; a worker still running at
//! the deadline is killed with `SIGKILL`.

use crate::config::CONFIG_HANDOFF_ENV;
use crate::scenario::StepRecord;
use anyhow::{anyhow, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How a worker process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    Exited { code: i32 },
    Signaled { signal: String, number: i32 },
    /// Killed by the runner at the deadline.
    TimedOut,
}

impl Termination {
    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Termination::Exited { code };
        }
        let number = status.signal().unwrap_or_default();
        let signal = Signal::try_from(number)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| format!("signal {}", number));
        Termination::Signaled { signal, number }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Exited { code } => write!(f, "exit status {}", code),
            Termination::Signaled { signal, .. } => write!(f, "killed by {}", signal),
            Termination::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Everything observed about one worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRun {
    pub records: Vec<StepRecord>,
    pub termination: Termination,
    pub elapsed: Duration,
}

/// Runs `<exe> worker <scenario>` with `handoff` as its config and waits at
/// most `timeout` for it.
pub fn run_worker_process(
    exe: &Path,
    scenario: &str,
    handoff: &str,
    timeout: Duration,
) -> Result<WorkerRun> {
    let started = Instant::now();
    let mut child = Command::new(exe)
        .arg("worker")
        .arg(scenario)
        .env(CONFIG_HANDOFF_ENV, handoff)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn worker {} for '{}'", exe.display(), scenario))?;
    log::debug!("Worker for '{}' started as pid {}", scenario, child.id());

    let (reader, forwarder) = match spawn_readers(&mut child, scenario) {
        Ok(threads) => threads,
        Err(err) => {
            stop_worker(&mut child);
            return Err(err);
        }
    };

    let termination = match wait_bounded(&mut child, scenario, started + timeout, timeout) {
        Ok(termination) => termination,
        Err(err) => {
            if stop_worker(&mut child) {
                let _ = reader.join();
                let _ = forwarder.join();
            }
            return Err(err);
        }
    };

    let records = reader
        .join()
        .map_err(|_| anyhow!("stdout reader thread panicked"))?;
    if forwarder.join().is_err() {
        log::warn!("stderr forwarder for '{}' panicked", scenario);
    }

    log::debug!("Worker for '{}' ended: {}", scenario, termination);
    Ok(WorkerRun {
        records,
        termination,
        elapsed: started.elapsed(),
    })
}

type Readers = (JoinHandle<Vec<StepRecord>>, JoinHandle<()>);

/// Starts the threads draining the worker's stdout and stderr.
fn spawn_readers(child: &mut Child, scenario: &str) -> Result<Readers> {
    let stdout = child
        .stdout
        .take()
        .context("Worker stdout was not captured")?;
    let stderr = child
        .stderr
        .take()
        .context("Worker stderr was not captured")?;

    let reader = thread::Builder::new()
        .name(format!("{}-stdout", scenario))
        .spawn(move || read_records(stdout))
        .context("Failed to spawn stdout reader thread")?;
    let label = scenario.to_string();
    let forwarder = thread::Builder::new()
        .name(format!("{}-stderr", scenario))
        .spawn(move || forward_stderr(stderr, &label))
        .context("Failed to spawn stderr forwarder thread")?;
    Ok((reader, forwarder))
}

/// Polls `child` until it exits, killing it once `deadline` passes.
fn wait_bounded(
    child: &mut Child,
    scenario: &str,
    deadline: Instant,
    timeout: Duration,
) -> Result<Termination> {
    let pid = Pid::from_raw(child.id() as i32);
    loop {
        if let Some(status) = child.try_wait().context("Failed to poll worker")? {
            return Ok(Termination::from_status(status));
        }
        if Instant::now() >= deadline {
            log::warn!(
                "Worker for '{}' still running after {:?}; sending SIGKILL",
                scenario,
                timeout
            );
            match kill(pid, Signal::SIGKILL) {
                Ok(()) | Err(nix::Error::ESRCH) => {}
                Err(e) => return Err(anyhow!("Failed to kill worker {}: {}", pid, e)),
            }
            child.wait().context("Failed to reap killed worker")?;
            return Ok(Termination::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kills and reaps a worker the runner is giving up on. Returns whether the
/// worker is gone, so its pipes are closed.
pub(super) fn stop_worker(child: &mut Child) -> bool {
    if let Err(e) = child.kill() {
        log::error!("Failed to kill worker {}: {}", child.id(), e);
        return false;
    }
    if let Err(e) = child.wait() {
        log::warn!("Failed to reap worker {}: {}", child.id(), e);
    }
    true
}

/// Parses one step record per line until the pipe closes.
pub fn read_records<R: Read>(source: R) -> Vec<StepRecord> {
    let mut records = Vec::new();
    for line in BufReader::new(source).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Worker stdout read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Ignoring malformed worker line {:?}: {}", line, e),
        }
    }
    records
}

fn forward_stderr<R: Read>(source: R, scenario: &str) {
    for line in BufReader::new(source).lines().map_while(Result::ok) {
        log::debug!("[{}] {}", scenario, line);
    }
}
