// src/native/simulated.rs

//! An in-crate stand-in for the CAS-2D library.
//!
//! It mirrors what the unguarded C wrapper does with bad input, except that
//! the faults are raised deliberately instead of arising from undefined
//! behavior: a null image or a dangling context ends the process with
//! `SIGSEGV`, and destroying a context twice aborts the way a hardened
//! allocator does on a double free. Sharpening numerics are not modeled; the
//! output is a copy of the supplied image.

use super::{CasApi, RawContext};
use libc::{c_float, c_int, c_uint, c_void};
use nix::sys::signal::{self, SigHandler, Signal};
use std::collections::HashSet;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct SimContext {
    image: Option<Vec<u8>>,
    output: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct SimulatedCas {
    live: Mutex<HashSet<usize>>,
    fail_allocation: bool,
}

impl SimulatedCas {
    pub fn new() -> Self {
        Self::default()
    }

    /// A library whose `initialize` always reports allocation failure.
    pub fn failing_allocation() -> Self {
        SimulatedCas {
            live: Mutex::default(),
            fail_allocation: true,
        }
    }

    /// Number of contexts initialized and not yet destroyed.
    pub fn live_contexts(&self) -> usize {
        self.live().len()
    }

    fn live(&self) -> MutexGuard<'_, HashSet<usize>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resolves `ctx` the way the C wrapper's `static_cast` would, except that
    /// a context that is not live faults instead of being dereferenced.
    ///
    /// The returned pointer came from `Box::into_raw` in `initialize` and has
    /// not been freed. Callers borrow through it for one entry point only.
    fn context(&self, ctx: RawContext, entry: &str) -> NonNull<SimContext> {
        match NonNull::new(ctx as *mut SimContext) {
            Some(context) if self.live().contains(&(ctx as usize)) => context,
            _ => fault(
                Signal::SIGSEGV,
                &format!("{}: invalid context {:p}", entry, ctx),
            ),
        }
    }
}

impl CasApi for SimulatedCas {
    fn initialize(&self) -> RawContext {
        if self.fail_allocation {
            log::warn!("SimulatedCas: refusing allocation");
            return std::ptr::null_mut();
        }
        let ctx = Box::into_raw(Box::<SimContext>::default()) as *mut c_void;
        self.live().insert(ctx as usize);
        log::trace!("SimulatedCas: initialized context {:p}", ctx);
        ctx
    }

    unsafe fn supply_image(
        &self,
        ctx: RawContext,
        image: *const u8,
        has_alpha: c_int,
        rows: c_uint,
        cols: c_uint,
    ) {
        let mut context = self.context(ctx, "CAS_supplyImage");
        if image.is_null() {
            fault(Signal::SIGSEGV, "CAS_supplyImage: read through null image pointer");
        }
        let Some(len) = (rows as usize)
            .checked_mul(cols as usize)
            .and_then(|n| n.checked_mul(4))
        else {
            fault(Signal::SIGSEGV, "CAS_supplyImage: image size overflows");
        };
        let pixels = std::slice::from_raw_parts(image, len);
        log::trace!(
            "SimulatedCas: supplied {}x{} image (alpha={}) to {:p}",
            cols,
            rows,
            has_alpha,
            ctx
        );
        // SAFETY: the context is live and no other reference to it exists
        // while this call runs.
        context.as_mut().image = Some(pixels.to_vec());
    }

    unsafe fn sharpen_image(
        &self,
        ctx: RawContext,
        mode: c_int,
        sharpen_strength: c_float,
        contrast_adaption: c_float,
    ) -> *const u8 {
        // SAFETY: the context is live and no other reference to it exists
        // while this call runs.
        let context = self.context(ctx, "CAS_sharpenImage").as_mut();
        log::trace!(
            "SimulatedCas: sharpen mode={} strength={} contrast={}",
            mode,
            sharpen_strength,
            contrast_adaption
        );
        match &context.image {
            Some(image) => {
                context.output = image.clone();
                context.output.as_ptr()
            }
            None => std::ptr::null(),
        }
    }

    unsafe fn destroy(&self, ctx: RawContext) {
        if !self.live().remove(&(ctx as usize)) {
            fault(
                Signal::SIGABRT,
                &format!("CAS_destroy: double free or corruption ({:p})", ctx),
            );
        }
        drop(Box::from_raw(ctx as *mut SimContext));
        log::trace!("SimulatedCas: destroyed context {:p}", ctx);
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

impl Drop for SimulatedCas {
    fn drop(&mut self) {
        let live = self.live.get_mut().unwrap_or_else(|p| p.into_inner());
        for addr in live.drain() {
            // SAFETY: every address in the live set is an unfreed `Box<SimContext>`.
            drop(unsafe { Box::from_raw(addr as *mut SimContext) });
        }
    }
}

/// Terminates the process with `sig` and its default disposition.
///
/// The disposition is reset first because the Rust runtime installs its own
/// `SIGSEGV` handler for stack-overflow reporting.
fn fault(sig: Signal, what: &str) -> ! {
    log::error!("SimulatedCas: {} -> {}", what, sig);
    eprintln!("{}", what);
    // SAFETY: installs SIG_DFL, which carries no handler state.
    unsafe {
        let _ = signal::signal(sig, SigHandler::SigDfl);
    }
    let _ = signal::raise(sig);
    std::process::abort()
}
