// src/compute/opencl.rs

//! Copy-kernel dispatch through the OpenCL ICD loader via `opencl3`.

use super::kernel::{COPY_KERNEL_BUILD_OPTIONS, COPY_KERNEL_NAME, COPY_KERNEL_SOURCE};
use super::{ClStatus, ComputeQueue, DeviceLimits, WorkRange};
use anyhow::{anyhow, Context as _, Result};
use log::{debug, info};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{Device, CL_DEVICE_TYPE_ALL};
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MEM_COPY_HOST_PTR, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY};
use opencl3::platform::get_platforms;
use opencl3::program::Program;
use opencl3::types::{cl_uchar, cl_uint, CL_BLOCKING};

/// A context, in-order queue and built copy kernel on one device.
///
/// Every OpenCL object is released when the queue is dropped.
pub struct OpenClQueue {
    limits: DeviceLimits,
    kernel: Kernel,
    _program: Program,
    queue: CommandQueue,
    context: Context,
}

impl std::fmt::Debug for OpenClQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClQueue")
            .field("limits", &self.limits)
            .finish()
    }
}

impl OpenClQueue {
    /// Opens device `device_index` of platform `platform_index` and builds
    /// the copy kernel on it.
    pub fn open(platform_index: usize, device_index: usize) -> Result<Self> {
        let platforms = get_platforms()
            .map_err(ClStatus::from)
            .context("Failed to enumerate OpenCL platforms")?;
        let platform = platforms.get(platform_index).with_context(|| {
            format!(
                "OpenCL platform {} not found ({} available)",
                platform_index,
                platforms.len()
            )
        })?;
        debug!(
            "Using OpenCL platform: {}",
            platform.name().unwrap_or_default()
        );

        let device_ids = platform
            .get_devices(CL_DEVICE_TYPE_ALL)
            .map_err(ClStatus::from)
            .context("Failed to enumerate OpenCL devices")?;
        let device_id = *device_ids.get(device_index).with_context(|| {
            format!(
                "OpenCL device {} not found ({} available)",
                device_index,
                device_ids.len()
            )
        })?;
        let device = Device::new(device_id);

        let limits = DeviceLimits {
            device_name: device.name().unwrap_or_default(),
            max_work_group_size: device
                .max_work_group_size()
                .map_err(ClStatus::from)
                .context("Failed to query CL_DEVICE_MAX_WORK_GROUP_SIZE")?,
            max_work_item_sizes: device
                .max_work_item_sizes()
                .map_err(ClStatus::from)
                .context("Failed to query CL_DEVICE_MAX_WORK_ITEM_SIZES")?,
        };
        info!(
            "OpenCL device: {} (max work-group {}, max work-items {:?})",
            limits.device_name, limits.max_work_group_size, limits.max_work_item_sizes
        );

        let context = Context::from_device(&device)
            .map_err(ClStatus::from)
            .context("Failed to create OpenCL context")?;
        let queue = CommandQueue::create_default_with_properties(&context, 0, 0)
            .map_err(ClStatus::from)
            .context("Failed to create command queue")?;
        let program = Program::create_and_build_from_source(
            &context,
            COPY_KERNEL_SOURCE,
            COPY_KERNEL_BUILD_OPTIONS,
        )
            .map_err(|build_log| anyhow!("Failed to build copy kernel: {}", build_log))?;
        let kernel = Kernel::create(&program, COPY_KERNEL_NAME)
            .map_err(ClStatus::from)
            .context("Failed to create copy kernel")?;

        Ok(OpenClQueue {
            limits,
            kernel,
            _program: program,
            queue,
            context,
        })
    }
}

impl ComputeQueue for OpenClQueue {
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
        let len = input.len();

        // SAFETY: CL_MEM_COPY_HOST_PTR copies `input` during creation; the
        // host pointer is not retained.
        let input_buffer = unsafe {
            Buffer::<cl_uchar>::create(
                &self.context,
                CL_MEM_READ_ONLY | CL_MEM_COPY_HOST_PTR,
                len,
                input.as_ptr() as *mut std::ffi::c_void,
            )?
        };
        // SAFETY: no host pointer.
        let output_buffer = unsafe {
            Buffer::<cl_uchar>::create(&self.context, CL_MEM_WRITE_ONLY, len, std::ptr::null_mut())?
        };

        let width: cl_uint = width;
        let height: cl_uint = height;

        // SAFETY: argument order and types match `process_image`.
        let event = unsafe {
            ExecuteKernel::new(&self.kernel)
                .set_arg(&input_buffer)
                .set_arg(&output_buffer)
                .set_arg(&width)
                .set_arg(&height)
                .set_global_work_sizes(&range.global)
                .set_local_work_sizes(&range.local)
                .enqueue_nd_range(&self.queue)?
        };
        event.wait()?;
        self.queue.finish()?;

        let mut output = vec![0u8; len];
        // SAFETY: `output` has room for the whole buffer; the read is blocking.
        unsafe {
            self.queue
                .enqueue_read_buffer(&output_buffer, CL_BLOCKING, 0, &mut output, &[])?;
        }
        Ok(output)
    }
}
