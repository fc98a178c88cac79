// src/lifecycle/mod.rs

//! The legal lifecycle of a CAS context and the preconditions of each call.
//!
//! [`LifecycleState::transition`] is the pure model. [`Session`] owns a live
//! context handle and enforces the same model in front of the native calls,
//! so an out-of-order call is refused host-side instead of reaching the
//! library. A session that refuses a call becomes [`LifecycleState::Invalid`]
//! and stays there.

mod session;

pub use session::{DestroyedHandle, ImageBuffer, Session, SharpenParams};

use crate::scenario::Preconditions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    ImageSupplied,
    Sharpened,
    Destroyed,
    /// Absorbing: some call was made outside its precondition.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Initialize,
    SupplyImage,
    SharpenImage,
    Destroy,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Initialize => "initialize",
            Operation::SupplyImage => "supply_image",
            Operation::SharpenImage => "sharpen_image",
            Operation::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

impl LifecycleState {
    /// The state reached by performing `op` in `self`.
    ///
    /// A call outside its precondition is an error naming the violated
    /// precondition; the caller's state becomes [`LifecycleState::Invalid`].
    pub fn transition(self, op: Operation) -> Result<LifecycleState, LifecycleError> {
        use LifecycleState::*;
        let next = match (self, op) {
            (Invalid, _) => None,
            (Uninitialized, Operation::Initialize) => Some(Initialized),
            (Initialized | ImageSupplied | Sharpened, Operation::SupplyImage) => {
                Some(ImageSupplied)
            }
            (ImageSupplied, Operation::SharpenImage) => Some(Sharpened),
            (Destroyed, _) => None,
            (_, Operation::Destroy) => Some(Destroyed),
            _ => None,
        };
        next.ok_or(LifecycleError::OutOfOrder {
            op,
            state: self,
            violated: self.precondition_for(op),
        })
    }

    fn precondition_for(self, op: Operation) -> Preconditions {
        match (self, op) {
            (LifecycleState::Destroyed, _) => Preconditions::HANDLE_LIVE,
            (LifecycleState::Invalid, _) => Preconditions::empty(),
            (_, Operation::SharpenImage) => Preconditions::IMAGE_SUPPLIED,
            (LifecycleState::Uninitialized, _) => Preconditions::HANDLE_LIVE,
            _ => Preconditions::empty(),
        }
    }
}

/// A call the lifecycle model refused, or a failure the library reported.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleError {
    /// `CAS_initialize` returned null.
    AllocationFailed,
    /// The call is not legal in the current state.
    OutOfOrder {
        op: Operation,
        state: LifecycleState,
        violated: Preconditions,
    },
    /// The image buffer is shorter than `rows * cols * 4`.
    BufferTooSmall { required: usize, actual: usize },
    /// A sharpen parameter is outside `[0, 1]` and host validation is enabled.
    ParameterOutOfRange { name: &'static str, value: f32 },
    /// `CAS_sharpenImage` returned null.
    SharpenFailed,
}

impl LifecycleError {
    /// The precondition this error reports as violated.
    pub fn violated(&self) -> Preconditions {
        match self {
            LifecycleError::OutOfOrder { violated, .. } => *violated,
            LifecycleError::BufferTooSmall { .. } => Preconditions::BUFFER_LENGTH,
            LifecycleError::ParameterOutOfRange { .. } => Preconditions::PARAMETER_RANGE,
            LifecycleError::AllocationFailed | LifecycleError::SharpenFailed => {
                Preconditions::empty()
            }
        }
    }

    /// Whether the library itself reported the failure (null return), as
    /// opposed to the host-side model refusing the call.
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            LifecycleError::AllocationFailed | LifecycleError::SharpenFailed
        )
    }
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleError::AllocationFailed => write!(f, "CAS_initialize returned null"),
            LifecycleError::OutOfOrder { op, state, .. } => {
                write!(f, "{} is not allowed in state {:?}", op, state)
            }
            LifecycleError::BufferTooSmall { required, actual } => write!(
                f,
                "image buffer holds {} bytes, {} required",
                actual, required
            ),
            LifecycleError::ParameterOutOfRange { name, value } => {
                write!(f, "{} = {} is outside [0, 1]", name, value)
            }
            LifecycleError::SharpenFailed => write!(f, "CAS_sharpenImage returned null"),
        }
    }
}

impl std::error::Error for LifecycleError {}

#[cfg(test)]
mod tests;
