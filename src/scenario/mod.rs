// src/scenario/mod.rs

//! Misuse scenarios: what each one does and what it is expected to provoke.
//!
//! A [`Scenario`] is authored data. Its expected classification is declared
//! next to its steps and never derived from running it, so a misuse that
//! stops faulting (or starts) shows up as a changed verdict.

mod catalog;
mod exec;

pub use catalog::{find, CATALOG};
pub use exec::{Executor, JsonLines, StepRecord, StepSink, StepStatus};

use crate::compute::WorkRange;
use crate::lifecycle::SharpenParams;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Documented preconditions of the CAS API and of kernel dispatch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Preconditions: u16 {
        /// `supplyImage` is given a readable image pointer.
        const NON_NULL_IMAGE = 1 << 0;
        /// The image buffer covers `rows * cols * 4` bytes.
        const BUFFER_LENGTH = 1 << 1;
        /// Sharpen strengths lie in the library's range.
        const PARAMETER_RANGE = 1 << 2;
        /// The context has been initialized and not destroyed.
        const HANDLE_LIVE = 1 << 3;
        /// `sharpenImage` follows a `supplyImage`.
        const IMAGE_SUPPLIED = 1 << 4;
        /// The local work size respects the device limits.
        const WORK_GROUP_LIMIT = 1 << 5;
    }
}

impl std::fmt::Display for Preconditions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        bitflags::parser::to_writer(self, f)
    }
}

/// Which layer can observe a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Detectability {
    /// Refused by host-side checks before reaching native code.
    HostAnalyzer,
    /// Only visible as a native memory fault (ASan, Valgrind, a signal).
    SanitizerOnly,
    /// Reported by the library or compute runtime as a status/null return.
    RuntimeError,
}

impl std::fmt::Display for Detectability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Detectability::HostAnalyzer => "host-analyzer-detectable",
            Detectability::SanitizerOnly => "sanitizer-only-detectable",
            Detectability::RuntimeError => "runtime-error-detectable",
        })
    }
}

/// What a scenario is declared to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detectability", rename_all = "snake_case")]
pub enum Expectation {
    /// Every step completes normally.
    Succeeds,
    /// The violation is observed by the given layer.
    Detected(Detectability),
    /// Behavior is undocumented; whatever happens is recorded.
    Discover,
}

impl std::fmt::Display for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expectation::Succeeds => f.write_str("succeeds"),
            Expectation::Detected(d) => d.fmt(f),
            Expectation::Discover => f.write_str("discover"),
        }
    }
}

/// One call a scenario makes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Initialize,
    /// Supply a `width` x `height` image filled with `fill`, `shortfall`
    /// bytes shorter than its dimensions require.
    SupplyImage {
        width: u32,
        height: u32,
        fill: u8,
        has_alpha: bool,
        shortfall: usize,
    },
    /// Supply a null image pointer, bypassing the model's buffer check.
    SupplyNullImage {
        width: u32,
        height: u32,
        has_alpha: bool,
    },
    Sharpen(SharpenParams),
    Destroy,
    /// Destroy the context destroyed by the preceding `Destroy` once more.
    DestroyAgain,
    /// Launch the copy kernel with a range the device accepts.
    Dispatch(WorkRange),
    /// Launch the copy kernel with a range exceeding the device limits.
    DispatchOversized(WorkRange),
}

impl Step {
    pub fn label(&self) -> String {
        match self {
            Step::Initialize => "initialize".to_string(),
            Step::SupplyImage {
                width,
                height,
                shortfall: 0,
                ..
            } => format!("supply_image({}x{})", width, height),
            Step::SupplyImage {
                width,
                height,
                shortfall,
                ..
            } => format!("supply_image({}x{}, {} bytes short)", width, height, shortfall),
            Step::SupplyNullImage { width, height, .. } => {
                format!("supply_image({}x{}, null)", width, height)
            }
            Step::Sharpen(p) => format!(
                "sharpen(mode={}, strength={}, contrast={})",
                p.mode, p.sharpen_strength, p.contrast_adaption
            ),
            Step::Destroy => "destroy".to_string(),
            Step::DestroyAgain => "destroy_again".to_string(),
            Step::Dispatch(range) | Step::DispatchOversized(range) => {
                format!("dispatch({})", range)
            }
        }
    }

    pub fn uses_library(&self) -> bool {
        !self.uses_compute()
    }

    pub fn uses_compute(&self) -> bool {
        matches!(self, Step::Dispatch(_) | Step::DispatchOversized(_))
    }
}

/// A hand-authored misuse case.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub summary: &'static str,
    pub violates: Preconditions,
    pub expected: Expectation,
    pub steps: &'static [Step],
}

impl Scenario {
    pub fn uses_library(&self) -> bool {
        self.steps.iter().any(Step::uses_library)
    }

    pub fn uses_compute(&self) -> bool {
        self.steps.iter().any(Step::uses_compute)
    }
}
