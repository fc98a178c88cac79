// src/native/mod.rs

//! Bindings to the CAS-2D library's four-function C API.
//!
//! The API is consumed through the [`CasApi`] trait so the lifecycle model and
//! the scenario executor never care whether they are talking to the real
//! shared library ([`CasLibrary`]) or to the in-crate model of it
//! ([`SimulatedCas`]).

mod library;
mod simulated;

pub use library::CasLibrary;
pub use simulated::SimulatedCas;

use libc::{c_float, c_int, c_uint, c_void};

/// The library's opaque per-session state, as the C API hands it out.
pub type RawContext = *mut c_void;

/// The four entry points of the CAS-2D C API.
///
/// Argument order follows the C ABI: the image pointer comes before the alpha
/// flag, and `rows` before `cols`. None of the entry points check their
/// arguments; every `unsafe` method inherits the library's preconditions.
pub trait CasApi {
    /// `CAS_initialize`. Returns null if the library could not allocate.
    fn initialize(&self) -> RawContext;

    /// `CAS_supplyImage`.
    ///
    /// # Safety
    ///
    /// `ctx` must be live and `image` must point to at least
    /// `rows * cols * 4` readable bytes that stay valid until the next supply
    /// or destroy.
    unsafe fn supply_image(
        &self,
        ctx: RawContext,
        image: *const u8,
        has_alpha: c_int,
        rows: c_uint,
        cols: c_uint,
    );

    /// `CAS_sharpenImage`. Returns the library-owned output buffer, or null.
    ///
    /// # Safety
    ///
    /// `ctx` must be live.
    unsafe fn sharpen_image(
        &self,
        ctx: RawContext,
        mode: c_int,
        sharpen_strength: c_float,
        contrast_adaption: c_float,
    ) -> *const u8;

    /// `CAS_destroy`.
    ///
    /// # Safety
    ///
    /// `ctx` must be live; it is dangling afterwards.
    unsafe fn destroy(&self, ctx: RawContext);

    /// Short name for logs and reports.
    fn name(&self) -> &'static str;
}
