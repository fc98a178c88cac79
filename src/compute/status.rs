// src/compute/status.rs

//! OpenCL status codes as the harness reports them.

use serde::{Deserialize, Serialize};

/// A `cl_int` status returned by the compute runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClStatus(pub i32);

impl ClStatus {
    pub const SUCCESS: ClStatus = ClStatus(0);
    pub const DEVICE_NOT_FOUND: ClStatus = ClStatus(-1);
    pub const OUT_OF_RESOURCES: ClStatus = ClStatus(-5);
    pub const OUT_OF_HOST_MEMORY: ClStatus = ClStatus(-6);
    pub const BUILD_PROGRAM_FAILURE: ClStatus = ClStatus(-11);
    pub const INVALID_VALUE: ClStatus = ClStatus(-30);
    pub const INVALID_PLATFORM: ClStatus = ClStatus(-32);
    pub const INVALID_DEVICE: ClStatus = ClStatus(-33);
    pub const INVALID_COMMAND_QUEUE: ClStatus = ClStatus(-36);
    pub const INVALID_MEM_OBJECT: ClStatus = ClStatus(-38);
    pub const INVALID_KERNEL_ARGS: ClStatus = ClStatus(-52);
    pub const INVALID_WORK_DIMENSION: ClStatus = ClStatus(-53);
    pub const INVALID_WORK_GROUP_SIZE: ClStatus = ClStatus(-54);
    pub const INVALID_WORK_ITEM_SIZE: ClStatus = ClStatus(-55);
    pub const INVALID_GLOBAL_OFFSET: ClStatus = ClStatus(-56);
    pub const INVALID_BUFFER_SIZE: ClStatus = ClStatus(-61);
    pub const INVALID_GLOBAL_WORK_SIZE: ClStatus = ClStatus(-63);

    /// The `CL_*` name of the status, if it is one the harness knows.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "CL_SUCCESS",
            Self::DEVICE_NOT_FOUND => "CL_DEVICE_NOT_FOUND",
            Self::OUT_OF_RESOURCES => "CL_OUT_OF_RESOURCES",
            Self::OUT_OF_HOST_MEMORY => "CL_OUT_OF_HOST_MEMORY",
            Self::BUILD_PROGRAM_FAILURE => "CL_BUILD_PROGRAM_FAILURE",
            Self::INVALID_VALUE => "CL_INVALID_VALUE",
            Self::INVALID_PLATFORM => "CL_INVALID_PLATFORM",
            Self::INVALID_DEVICE => "CL_INVALID_DEVICE",
            Self::INVALID_COMMAND_QUEUE => "CL_INVALID_COMMAND_QUEUE",
            Self::INVALID_MEM_OBJECT => "CL_INVALID_MEM_OBJECT",
            Self::INVALID_KERNEL_ARGS => "CL_INVALID_KERNEL_ARGS",
            Self::INVALID_WORK_DIMENSION => "CL_INVALID_WORK_DIMENSION",
            Self::INVALID_WORK_GROUP_SIZE => "CL_INVALID_WORK_GROUP_SIZE",
            Self::INVALID_WORK_ITEM_SIZE => "CL_INVALID_WORK_ITEM_SIZE",
            Self::INVALID_GLOBAL_OFFSET => "CL_INVALID_GLOBAL_OFFSET",
            Self::INVALID_BUFFER_SIZE => "CL_INVALID_BUFFER_SIZE",
            Self::INVALID_GLOBAL_WORK_SIZE => "CL_INVALID_GLOBAL_WORK_SIZE",
            _ => return None,
        };
        Some(name)
    }

    /// Whether the runtime rejected the launch because of its execution range,
    /// which is the expected answer to an oversized work group.
    pub fn is_range_rejection(self) -> bool {
        matches!(
            self,
            Self::INVALID_WORK_GROUP_SIZE | Self::INVALID_WORK_ITEM_SIZE | Self::INVALID_VALUE
        )
    }
}

impl std::fmt::Display for ClStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "OpenCL status {}", self.0),
        }
    }
}

impl std::error::Error for ClStatus {}

#[cfg(feature = "opencl")]
impl From<opencl3::error_codes::ClError> for ClStatus {
    fn from(err: opencl3::error_codes::ClError) -> Self {
        ClStatus(err.0)
    }
}
