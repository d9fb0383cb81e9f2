//! Vendor driver handle using the libloading crate.
//!
//! All code that crosses into the vendor library lives here: loading the
//! shared object, resolving `SBIGUnivDrvCommand`, and issuing typed commands.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::mem;
use std::path::Path;
use std::ptr;

use libloading::Library;
use tracing::{debug, warn};

use crate::ffi::{
    self, DispatchFn, GetErrorString, GetErrorStringParams, VendorCommand, DEFAULT_LIBRARY,
    DISPATCH_SYMBOL,
};
use crate::traits::{DriverError, DriverResult, LoadError, UniversalDriver};

/// A loaded vendor library and its resolved dispatch function.
///
/// The function pointer is only reachable through this type, so it can never
/// outlive the library it was resolved from.
pub struct DriverLibrary {
    dispatch: DispatchFn,
    // Dropped after `dispatch` is last used; unloads the shared object.
    _library: Library,
}

impl std::fmt::Debug for DriverLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverLibrary").finish_non_exhaustive()
    }
}

/// Load the vendor library and resolve its dispatch entry point.
///
/// # Arguments
///
/// * `path` - Library to open; `None` opens [`DEFAULT_LIBRARY`] through the
///   dynamic linker search path.
///
/// # Errors
///
/// Returns [`LoadError`] carrying the loader's diagnostic if the library
/// cannot be opened or does not export `SBIGUnivDrvCommand`.
pub fn load_driver(path: Option<&Path>) -> Result<DriverLibrary, LoadError> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_LIBRARY));
    let load_error = |err: libloading::Error| LoadError {
        path: path.display().to_string(),
        message: err.to_string(),
    };

    // SAFETY: the vendor library has no initialisation routines with
    // preconditions beyond being loaded once per process.
    let library = unsafe { Library::new(path) }.map_err(load_error)?;
    // SAFETY: `DispatchFn` matches the exported signature of the vendor
    // entry point.
    let dispatch = unsafe {
        library
            .get::<DispatchFn>(DISPATCH_SYMBOL.as_bytes())
            .map(|symbol| *symbol)
    }
    .map_err(load_error)?;

    debug!(path = %path.display(), symbol = DISPATCH_SYMBOL, "vendor driver loaded");
    Ok(DriverLibrary {
        dispatch,
        _library: library,
    })
}

impl UniversalDriver for DriverLibrary {
    unsafe fn dispatch(&self, command: u16, params: *mut c_void, results: *mut c_void) -> i16 {
        (self.dispatch)(command, params, results)
    }
}

/// Userspace handle on the vendor driver.
///
/// Starts out empty; [`Handle::load`] attaches a library. Dropping the handle
/// unloads the library.
#[derive(Debug)]
pub struct Handle<D = DriverLibrary> {
    driver: Option<D>,
}

impl<D> Default for Handle<D> {
    fn default() -> Self {
        Self { driver: None }
    }
}

impl Handle<DriverLibrary> {
    /// Load the vendor library into this handle, replacing any previous one.
    pub fn load(&mut self, path: Option<&Path>) -> Result<(), LoadError> {
        self.driver = Some(load_driver(path)?);
        Ok(())
    }

    /// Create a handle and load the library in one step.
    pub fn open(path: Option<&Path>) -> Result<Self, LoadError> {
        let mut handle = Self::new();
        handle.load(path)?;
        Ok(handle)
    }
}

impl<D> Handle<D> {
    /// Create an empty handle with no library attached.
    #[must_use]
    pub const fn new() -> Self {
        Self { driver: None }
    }

    /// Wrap an already resolved driver.
    #[must_use]
    pub const fn with_driver(driver: D) -> Self {
        Self {
            driver: Some(driver),
        }
    }

    /// Whether a driver is attached.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.driver.is_some()
    }

    /// The attached driver, if any.
    #[must_use]
    pub const fn driver(&self) -> Option<&D> {
        self.driver.as_ref()
    }

    /// Detach and unload the driver, leaving an empty handle.
    pub fn unload(&mut self) {
        if self.driver.take().is_some() {
            debug!("vendor driver unloaded");
        }
    }
}

impl<D: UniversalDriver> Handle<D> {
    /// Issue `C` and return the vendor's raw status code with the results.
    fn dispatch<C: VendorCommand>(
        &self,
        params: &mut C::Params,
    ) -> DriverResult<(u16, C::Results)> {
        let driver = self.driver.as_ref().ok_or(DriverError::NotLoaded)?;
        let mut results = C::Results::default();

        let params_ptr = if mem::size_of::<C::Params>() == 0 {
            ptr::null_mut()
        } else {
            ptr::from_mut(params).cast::<c_void>()
        };
        let results_ptr = if mem::size_of::<C::Results>() == 0 {
            ptr::null_mut()
        } else {
            ptr::from_mut(&mut results).cast::<c_void>()
        };

        // SAFETY: `VendorCommand` ties `C::CODE` to the struct types the
        // vendor reads and writes for it, and both pointers are live for the
        // duration of the call.
        let status = unsafe { driver.dispatch(C::CODE, params_ptr, results_ptr) };
        Ok((u16::from_ne_bytes(status.to_ne_bytes()), results))
    }

    /// Issue a vendor command.
    ///
    /// A nonzero vendor status becomes [`DriverError::Command`] with the
    /// vendor's text for the code.
    pub fn issue<C: VendorCommand>(&self, mut params: C::Params) -> DriverResult<C::Results> {
        let (code, results) = self.dispatch::<C>(&mut params)?;
        if code == ffi::err::NO_ERROR {
            return Ok(results);
        }
        let message = self.get_error_string(code);
        debug!(command = C::NAME, code, %message, "vendor command failed");
        Err(DriverError::Command {
            command: C::NAME,
            code,
            message,
        })
    }

    /// Translate a vendor error code to text.
    ///
    /// Never fails: if the handle has no driver or the translation command
    /// itself fails, the text is `unknown error <code>`.
    pub fn get_error_string(&self, error_no: u16) -> String {
        let mut params = GetErrorStringParams { error_no };
        match self.dispatch::<GetErrorString>(&mut params) {
            Ok((ffi::err::NO_ERROR, results)) => ffi::c_field(&results.error_string),
            Ok((status, _)) => {
                warn!(error_no, status, "vendor could not translate error code");
                format!("unknown error {error_no}")
            }
            Err(_) => format!("unknown error {error_no}"),
        }
    }
}
