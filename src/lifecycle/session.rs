// src/lifecycle/session.rs

use super::{LifecycleError, LifecycleState, Operation};
use crate::native::{CasApi, RawContext};
use libc::{c_int, c_void};
use serde::{Deserialize, Serialize};
use std::ptr::NonNull;

/// A live CAS context. Only a `Session` holds one.
#[derive(Debug)]
struct ContextHandle(NonNull<c_void>);

impl ContextHandle {
    fn as_raw(&self) -> RawContext {
        self.0.as_ptr()
    }

    fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// What is left of a context after `destroy`: its former address.
///
/// The tag exists so the one scenario that must touch a dangling context can
/// do so explicitly; nothing else can reach the address again.
#[derive(Debug)]
pub struct DestroyedHandle(NonNull<c_void>);

impl DestroyedHandle {
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Calls `CAS_destroy` on the already-destroyed context.
    ///
    /// # Safety
    ///
    /// Never sound. This is a use-after-free by construction and is expected
    /// to fault the process.
    pub unsafe fn destroy_again<A: CasApi + ?Sized>(self, api: &A) {
        log::warn!("Destroying context {:#x} a second time", self.addr());
        api.destroy(self.0.as_ptr());
    }
}

/// An interleaved RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl ImageBuffer {
    /// A `width` x `height` image with every channel set to `value`, or
    /// `None` if its byte length does not fit in `usize`.
    pub fn filled(width: u32, height: u32, value: u8) -> Option<Self> {
        let len = Self::len_for(width, height)?;
        Some(ImageBuffer {
            width,
            height,
            bytes: vec![value; len],
        })
    }

    /// Drops the last `shortfall` bytes, keeping the dimensions.
    pub fn truncated(mut self, shortfall: usize) -> Self {
        let len = self.bytes.len().saturating_sub(shortfall);
        self.bytes.truncate(len);
        self
    }

    /// `width * height * 4`, or `None` on overflow.
    pub fn len_for(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes the library will read for this image's dimensions. Saturates,
    /// so no buffer covers dimensions whose length overflows.
    pub fn required_len(&self) -> usize {
        Self::len_for(self.width, self.height).unwrap_or(usize::MAX)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Arguments of `CAS_sharpenImage`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharpenParams {
    pub mode: i32,
    pub sharpen_strength: f32,
    pub contrast_adaption: f32,
}

impl SharpenParams {
    pub const fn new(mode: i32, sharpen_strength: f32, contrast_adaption: f32) -> Self {
        SharpenParams {
            mode,
            sharpen_strength,
            contrast_adaption,
        }
    }

    /// Checks both strengths against the library's documented `[0, 1]` range.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        for (name, value) in [
            ("sharpen_strength", self.sharpen_strength),
            ("contrast_adaption", self.contrast_adaption),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LifecycleError::ParameterOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

/// One CAS context from `initialize` to `destroy`.
///
/// The session keeps the last supplied image alive until the next supply or
/// until the context is destroyed, since the library may keep referencing it.
/// Dropping a session whose context is still live destroys the context.
pub struct Session<'a, A: CasApi + ?Sized> {
    api: &'a A,
    handle: Option<ContextHandle>,
    state: LifecycleState,
    image: Option<ImageBuffer>,
    validate_params: bool,
}

impl<'a, A: CasApi + ?Sized> std::fmt::Debug for Session<'a, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("api", &self.api.name())
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish()
    }
}

impl<'a, A: CasApi + ?Sized> Session<'a, A> {
    /// Calls `CAS_initialize` and takes ownership of the returned context.
    pub fn initialize(api: &'a A) -> Result<Self, LifecycleError> {
        let state = LifecycleState::Uninitialized.transition(Operation::Initialize)?;
        let raw = api.initialize();
        let handle = NonNull::new(raw).ok_or(LifecycleError::AllocationFailed)?;
        log::debug!("{}: initialized context {:p}", api.name(), raw);
        Ok(Session {
            api,
            handle: Some(ContextHandle(handle)),
            state,
            image: None,
            validate_params: false,
        })
    }

    /// Refuse out-of-range sharpen parameters host-side.
    pub fn with_param_validation(mut self, enabled: bool) -> Self {
        self.validate_params = enabled;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Checks `op` against the model. A refused call invalidates the session.
    fn admit(&mut self, op: Operation) -> Result<LifecycleState, LifecycleError> {
        self.state.transition(op).map_err(|err| {
            log::debug!("Lifecycle refused {}: {}", op, err);
            self.state = LifecycleState::Invalid;
            err
        })
    }

    fn reject(&mut self, err: LifecycleError) -> LifecycleError {
        log::debug!("Lifecycle refused call: {}", err);
        self.state = LifecycleState::Invalid;
        err
    }

    fn raw(&self) -> RawContext {
        self.handle
            .as_ref()
            .map_or(std::ptr::null_mut(), ContextHandle::as_raw)
    }

    /// Calls `CAS_supplyImage` with `image`, after checking the call order and
    /// that the buffer covers `rows * cols * 4` bytes.
    pub fn supply_image(
        &mut self,
        image: ImageBuffer,
        has_alpha: bool,
    ) -> Result<(), LifecycleError> {
        let next = self.admit(Operation::SupplyImage)?;
        let required = image.required_len();
        if image.as_bytes().len() < required {
            return Err(self.reject(LifecycleError::BufferTooSmall {
                required,
                actual: image.as_bytes().len(),
            }));
        }

        // SAFETY: the handle is live (checked by `admit`) and the buffer
        // covers the dimensions passed. The buffer is kept in `self.image`
        // until it is replaced or the context is destroyed.
        unsafe {
            self.api.supply_image(
                self.raw(),
                image.as_bytes().as_ptr(),
                has_alpha as c_int,
                image.height(),
                image.width(),
            );
        }
        self.image = Some(image);
        self.state = next;
        Ok(())
    }

    /// Calls `CAS_supplyImage` with an arbitrary pointer. Only the call order
    /// is checked.
    ///
    /// # Safety
    ///
    /// `image` must point to `rows * cols * 4` readable bytes that outlive the
    /// context's use of them. Misuse scenarios break this on purpose.
    pub unsafe fn supply_image_unchecked(
        &mut self,
        image: *const u8,
        has_alpha: bool,
        rows: u32,
        cols: u32,
    ) -> Result<(), LifecycleError> {
        let next = self.admit(Operation::SupplyImage)?;
        log::warn!(
            "Unchecked supply of {:p} ({}x{}) to context {:p}",
            image,
            cols,
            rows,
            self.raw()
        );
        self.api
            .supply_image(self.raw(), image, has_alpha as c_int, rows, cols);
        self.state = next;
        Ok(())
    }

    /// Calls `CAS_sharpenImage`, which dispatches the library's GPU kernel.
    ///
    /// A null return is [`LifecycleError::SharpenFailed`] and leaves the
    /// session in `ImageSupplied`.
    pub fn sharpen_image(&mut self, params: SharpenParams) -> Result<NonNull<u8>, LifecycleError> {
        let next = self.admit(Operation::SharpenImage)?;
        if self.validate_params {
            if let Err(err) = params.validate() {
                return Err(self.reject(err));
            }
        }

        // SAFETY: the handle is live and an image has been supplied.
        let out = unsafe {
            self.api.sharpen_image(
                self.raw(),
                params.mode,
                params.sharpen_strength,
                params.contrast_adaption,
            )
        };
        let out = NonNull::new(out as *mut u8).ok_or(LifecycleError::SharpenFailed)?;
        log::debug!("Sharpened image available at {:p}", out);
        self.state = next;
        Ok(out)
    }

    /// Calls `CAS_destroy` and gives up the context.
    ///
    /// If the model refuses the call, the session is still dropped and the
    /// drop releases the context.
    pub fn destroy(mut self) -> Result<DestroyedHandle, LifecycleError> {
        let next = self.admit(Operation::Destroy)?;
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                return Err(LifecycleError::OutOfOrder {
                    op: Operation::Destroy,
                    state: LifecycleState::Destroyed,
                    violated: crate::scenario::Preconditions::HANDLE_LIVE,
                })
            }
        };

        // SAFETY: the handle is live and is never used again by the session.
        unsafe { self.api.destroy(handle.as_raw()) };
        log::debug!("{}: destroyed context {:#x}", self.api.name(), handle.addr());
        self.state = next;
        self.image = None;
        Ok(DestroyedHandle(handle.0))
    }
}

impl<'a, A: CasApi + ?Sized> Drop for Session<'a, A> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!(
                "Releasing context {:#x} left live in state {:?}",
                handle.addr(),
                self.state
            );
            // SAFETY: the handle is live; the session is going away.
            unsafe { self.api.destroy(handle.as_raw()) };
        }
    }
}
