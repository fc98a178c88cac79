// src/compute/simulated.rs

use super::kernel::COPY_KERNEL_NAME;
use super::{ClStatus, ComputeQueue, DeviceLimits, WorkRange};

/// A CPU stand-in for an OpenCL queue.
///
/// Launch ranges are checked in the order an OpenCL 1.2 runtime documents for
/// `clEnqueueNDRangeKernel`, then the copy kernel runs work-item by work-item.
#[derive(Debug)]
pub struct SimulatedQueue {
    limits: DeviceLimits,
    launches: usize,
}

impl SimulatedQueue {
    pub fn new(limits: DeviceLimits) -> Self {
        SimulatedQueue {
            limits,
            launches: 0,
        }
    }

    /// Launches that passed validation and ran.
    pub fn launches(&self) -> usize {
        self.launches
    }

    fn check_range(&self, range: &WorkRange) -> Result<(), ClStatus> {
        if range.global.iter().any(|&g| g == 0) {
            return Err(ClStatus::INVALID_GLOBAL_WORK_SIZE);
        }
        if range.local.iter().any(|&l| l == 0) {
            return Err(ClStatus::INVALID_WORK_GROUP_SIZE);
        }
        if range
            .global
            .iter()
            .zip(&range.local)
            .any(|(g, l)| g % l != 0)
        {
            return Err(ClStatus::INVALID_WORK_GROUP_SIZE);
        }
        if range.work_group_size() > self.limits.max_work_group_size {
            return Err(ClStatus::INVALID_WORK_GROUP_SIZE);
        }
        for (d, &local) in range.local.iter().enumerate() {
            match self.limits.max_work_item_sizes.get(d) {
                Some(&max) if local <= max => {}
                _ => return Err(ClStatus::INVALID_WORK_ITEM_SIZE),
            }
        }
        Ok(())
    }
}

impl ComputeQueue for SimulatedQueue {
    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn dispatch_copy(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
        range: &WorkRange,
    ) -> Result<Vec<u8>, ClStatus> {
        self.check_range(range)?;
        let (width, height) = (width as usize, height as usize);
        if input.len() < width * height * 4 {
            return Err(ClStatus::INVALID_BUFFER_SIZE);
        }

        let mut output = vec![0u8; input.len()];
        for y in 0..range.global[1] {
            for x in 0..range.global[0] {
                if x >= width || y >= height {
                    continue;
                }
                let idx = (y * width + x) * 4;
                output[idx..idx + 4].copy_from_slice(&input[idx..idx + 4]);
            }
        }
        self.launches += 1;
        log::trace!(
            "SimulatedQueue: {} launch {} completed",
            COPY_KERNEL_NAME,
            self.launches
        );
        Ok(output)
    }
}
