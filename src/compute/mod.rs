// src/compute/mod.rs

//! Compute dispatch validation.
//!
//! The validator launches the copy kernel from [`kernel`] over an image whose
//! size equals the launch's global range and checks what comes back: an
//! identical copy for a compliant range, a specific range-rejection status
//! for a non-compliant one. Anything else is reported as found, never
//! smoothed over.

pub mod kernel;
#[cfg(feature = "opencl")]
mod opencl;
mod simulated;
mod status;

#[cfg(feature = "opencl")]
pub use opencl::OpenClQueue;
pub use simulated::SimulatedQueue;
pub use status::ClStatus;

use crate::config::{ComputeBackend, ComputeConfig};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Global and local sizes of a two-dimensional launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRange {
    pub global: [usize; 2],
    pub local: [usize; 2],
}

impl WorkRange {
    pub const fn new(global: [usize; 2], local: [usize; 2]) -> Self {
        WorkRange { global, local }
    }

    /// Work-items per group.
    pub fn work_group_size(&self) -> usize {
        self.local[0].saturating_mul(self.local[1])
    }

    /// Whether the range respects `limits` and tiles the global range evenly.
    ///
    /// Even tiling is the OpenCL 1.2 rule. The copy kernel is built for
    /// OpenCL C 1.2 (see [`kernel::COPY_KERNEL_BUILD_OPTIONS`]), so 2.0 devices
    /// enforce it too instead of launching non-uniform groups.
    pub fn fits(&self, limits: &DeviceLimits) -> bool {
        (0..2).all(|d| {
            let local = self.local[d];
            local != 0
                && self.global[d] != 0
                && self.global[d] % local == 0
                && limits
                    .max_work_item_sizes
                    .get(d)
                    .is_some_and(|&max| local <= max)
        }) && self.work_group_size() <= limits.max_work_group_size
    }
}

impl std::fmt::Display for WorkRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "global {}x{} / local {}x{}",
            self.global[0], self.global[1], self.local[0], self.local[1]
        )
    }
}

/// Execution limits reported by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimits {
    pub device_name: String,
    pub max_work_group_size: usize,
    pub max_work_item_sizes: Vec<usize>,
}

/// A command queue able to run the copy kernel.
pub trait ComputeQueue {
    fn limits(&self) -> &DeviceLimits;

    /// Runs the copy kernel over `input` (`width` x `height` RGBA) with
    /// `range`, waits for completion and reads the output back.
    fn dispatch_copy(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
        range: &WorkRange,
    ) -> Result<Vec<u8>, ClStatus>;
}

/// What a single launch produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Completed and the output equals the input.
    Identical,
    /// Completed but the output differs from the input at `offset`.
    Mismatch { offset: usize },
    /// A non-compliant range was refused with a range-rejection status.
    Rejected { status: ClStatus },
    /// A non-compliant range was refused, but not for its range.
    UnexpectedStatus { status: ClStatus },
    /// A range within the device limits was refused or failed.
    CompliantRejected { status: ClStatus },
    /// A range exceeding the device limits completed anyway.
    UnexpectedlyAccepted,
}

/// Opens the queue selected by `config`.
pub fn open_queue(config: &ComputeConfig) -> Result<Box<dyn ComputeQueue>> {
    match config.backend {
        ComputeBackend::Simulated => Ok(Box::new(SimulatedQueue::new(DeviceLimits {
            device_name: "simulated".to_string(),
            max_work_group_size: config.simulated_max_work_group_size,
            max_work_item_sizes: config.simulated_max_work_item_sizes.to_vec(),
        }))),
        #[cfg(feature = "opencl")]
        ComputeBackend::OpenCl => Ok(Box::new(OpenClQueue::open(
            config.platform_index,
            config.device_index,
        )?)),
        #[cfg(not(feature = "opencl"))]
        ComputeBackend::OpenCl => Err(anyhow::anyhow!(
            "compute backend 'opencl' requested but the harness was built without the `opencl` feature"
        )),
    }
}

/// Drives launches on one queue and judges their results.
pub struct DispatchValidator {
    queue: Box<dyn ComputeQueue>,
}

impl DispatchValidator {
    pub fn new(queue: Box<dyn ComputeQueue>) -> Self {
        DispatchValidator { queue }
    }

    pub fn limits(&self) -> &DeviceLimits {
        self.queue.limits()
    }

    /// Launches the copy kernel over a `global[0]` x `global[1]` test image.
    ///
    /// Fails only if the test image cannot be built for the range.
    pub fn dispatch(&mut self, range: &WorkRange) -> Result<DispatchOutcome> {
        let [width, height] = range.global;
        let (width, height) = match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => return Err(anyhow!("global range {} exceeds the test image size", range)),
        };
        let compliant = range.fits(self.queue.limits());
        let input = test_pattern(width, height)?;
        log::debug!(
            "Dispatching copy kernel on {} with {} (compliant: {})",
            self.queue.limits().device_name,
            range,
            compliant
        );

        let outcome = match self.queue.dispatch_copy(&input, width, height, range) {
            Ok(output) => match first_difference(&input, &output) {
                Some(offset) => {
                    log::warn!("Copy output diverges at byte {}", offset);
                    DispatchOutcome::Mismatch { offset }
                }
                None if !compliant => {
                    log::warn!("Non-compliant launch ({}) completed", range);
                    DispatchOutcome::UnexpectedlyAccepted
                }
                None => DispatchOutcome::Identical,
            },
            Err(status) if compliant => {
                log::warn!("Compliant launch with {} failed: {}", range, status);
                DispatchOutcome::CompliantRejected { status }
            }
            Err(status) if status.is_range_rejection() => {
                log::info!("Launch with {} rejected: {}", range, status);
                DispatchOutcome::Rejected { status }
            }
            Err(status) => {
                log::warn!("Launch with {} refused with unrelated {}", range, status);
                DispatchOutcome::UnexpectedStatus { status }
            }
        };
        Ok(outcome)
    }
}

/// Deterministic, non-uniform RGBA bytes so a partial copy cannot pass.
pub fn test_pattern(width: u32, height: u32) -> Result<Vec<u8>> {
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| anyhow!("{}x{} test image overflows", width, height))?;
    Ok((0..len)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8)
        .collect())
}

fn first_difference(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected
        .iter()
        .zip(actual)
        .position(|(a, b)| a != b)
        .or_else(|| (expected.len() != actual.len()).then(|| expected.len().min(actual.len())))
}
