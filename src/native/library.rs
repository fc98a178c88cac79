// src/native/library.rs

use super::{CasApi, RawContext};
use anyhow::{Context, Result};
use libc::{c_float, c_int, c_uint, c_void};
use libloading::Library;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

type InitializeFn = unsafe extern "C" fn() -> *mut c_void;
type SupplyImageFn = unsafe extern "C" fn(*mut c_void, *const u8, c_int, c_uint, c_uint);
type SharpenImageFn = unsafe extern "C" fn(*mut c_void, c_int, c_float, c_float) -> *const u8;
type DestroyFn = unsafe extern "C" fn(*mut c_void);

static SHARED: OnceCell<CasLibrary> = OnceCell::new();

/// The CAS-2D shared library, loaded at run time.
///
/// The four symbols are resolved once at load. The function pointers stay
/// valid because the `Library` is kept alive for as long as they are.
pub struct CasLibrary {
    path: PathBuf,
    initialize: InitializeFn,
    supply_image: SupplyImageFn,
    sharpen_image: SharpenImageFn,
    destroy: DestroyFn,
    _library: Library,
}

impl std::fmt::Debug for CasLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasLibrary")
            .field("path", &self.path)
            .finish()
    }
}

impl CasLibrary {
    /// Loads the library and resolves `CAS_initialize`, `CAS_supplyImage`,
    /// `CAS_sharpenImage` and `CAS_destroy`.
    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("Loading CAS library from {}", path.display());
        // SAFETY: running the library's initializers is the point of loading it.
        let library = unsafe { Library::new(path) }
            .with_context(|| format!("Failed to load CAS library {}", path.display()))?;

        // SAFETY: the signatures match the library's exported C declarations.
        let (initialize, supply_image, sharpen_image, destroy) = unsafe {
            (
                *library
                    .get::<InitializeFn>(b"CAS_initialize\0")
                    .context("Missing symbol CAS_initialize")?,
                *library
                    .get::<SupplyImageFn>(b"CAS_supplyImage\0")
                    .context("Missing symbol CAS_supplyImage")?,
                *library
                    .get::<SharpenImageFn>(b"CAS_sharpenImage\0")
                    .context("Missing symbol CAS_sharpenImage")?,
                *library
                    .get::<DestroyFn>(b"CAS_destroy\0")
                    .context("Missing symbol CAS_destroy")?,
            )
        };

        log::info!("CAS library loaded: {}", path.display());
        Ok(CasLibrary {
            path: path.to_path_buf(),
            initialize,
            supply_image,
            sharpen_image,
            destroy,
            _library: library,
        })
    }

    /// Loads the library once per process and hands out the shared instance.
    ///
    /// A worker runs a single scenario, so the first path wins.
    pub fn shared(path: &Path) -> Result<&'static CasLibrary> {
        SHARED.get_or_try_init(|| Self::load(path))
    }
}

impl CasApi for CasLibrary {
    fn initialize(&self) -> RawContext {
        // SAFETY: takes no arguments; failure is reported as null.
        unsafe { (self.initialize)() }
    }

    unsafe fn supply_image(
        &self,
        ctx: RawContext,
        image: *const u8,
        has_alpha: c_int,
        rows: c_uint,
        cols: c_uint,
    ) {
        (self.supply_image)(ctx, image, has_alpha, rows, cols)
    }

    unsafe fn sharpen_image(
        &self,
        ctx: RawContext,
        mode: c_int,
        sharpen_strength: c_float,
        contrast_adaption: c_float,
    ) -> *const u8 {
        (self.sharpen_image)(ctx, mode, sharpen_strength, contrast_adaption)
    }

    unsafe fn destroy(&self, ctx: RawContext) {
        (self.destroy)(ctx)
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn missing_library_is_a_load_error() {
        let err = CasLibrary::load(Path::new("/nonexistent/libCAS.so")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load CAS library"));
    }
}
