// SPDX-License-Identifier: Apache-2.0
//! Load QDAP backend shared libraries and resolve prefixed symbols.
//!
//! Backends export their entry points with a backend-specific prefix, e.g.
//! the mock test backend uses `MOCK`:
//!
//! ```text
//! MOCK_QDAP_device_initialize
//! MOCK_QDAP_device_finalize
//! MOCK_QDAP_device_session_alloc
//! MOCK_QDAP_device_session_set_parameter
//! MOCK_QDAP_device_session_init
//! MOCK_QDAP_device_session_free
//! MOCK_QDAP_device_session_query_device_property
//! ...
//! ```
//!
//! [`Device::load`] performs the `dlopen` + prefix-aware `dlsym` dance once,
//! storing the result as a table of typed function references; all later
//! dispatch is a plain call through the table, never a repeated string
//! lookup. Resolution runs no backend code: the first boundary call happens
//! in [`Device::initialize`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use libloading::{Library, Symbol};

use crate::error::{QdapError, Result, check};
use crate::ffi;

/// Base names of the 18 required entry points, in resolution order.
///
/// A backend missing any of these is rejected wholesale; the host never
/// calls through a null entry point.
pub const ENTRY_POINTS: [&str; 18] = [
    "QDAP_device_initialize",
    "QDAP_device_finalize",
    "QDAP_device_session_alloc",
    "QDAP_device_session_set_parameter",
    "QDAP_device_session_init",
    "QDAP_device_session_free",
    "QDAP_device_session_query_device_property",
    "QDAP_device_session_query_site_property",
    "QDAP_device_session_query_operation_property",
    "QDAP_device_session_create_device_job",
    "QDAP_device_job_set_parameter",
    "QDAP_device_job_query_property",
    "QDAP_device_job_submit",
    "QDAP_device_job_cancel",
    "QDAP_device_job_check",
    "QDAP_device_job_wait",
    "QDAP_device_job_get_results",
    "QDAP_device_job_free",
];

/// The resolved entry-point table for one backend library.
pub(crate) struct SymbolTable {
    // -- Device lifecycle ----------------------------------------------------
    pub(crate) fn_device_initialize: ffi::FnDeviceInitialize,
    pub(crate) fn_device_finalize: ffi::FnDeviceFinalize,

    // -- Session lifecycle ---------------------------------------------------
    pub(crate) fn_session_alloc: ffi::FnSessionAlloc,
    pub(crate) fn_session_set_parameter: ffi::FnSessionSetParameter,
    pub(crate) fn_session_init: ffi::FnSessionInit,
    pub(crate) fn_session_free: ffi::FnSessionFree,

    // -- Query interface -----------------------------------------------------
    pub(crate) fn_query_device_property: ffi::FnQueryDeviceProperty,
    pub(crate) fn_query_site_property: ffi::FnQuerySiteProperty,
    pub(crate) fn_query_operation_property: ffi::FnQueryOperationProperty,

    // -- Job interface -------------------------------------------------------
    pub(crate) fn_create_device_job: ffi::FnCreateDeviceJob,
    pub(crate) fn_job_set_parameter: ffi::FnJobSetParameter,
    pub(crate) fn_job_query_property: ffi::FnJobQueryProperty,
    pub(crate) fn_job_submit: ffi::FnJobSubmit,
    pub(crate) fn_job_cancel: ffi::FnJobCancel,
    pub(crate) fn_job_check: ffi::FnJobCheck,
    pub(crate) fn_job_wait: ffi::FnJobWait,
    pub(crate) fn_job_get_results: ffi::FnJobGetResults,
    pub(crate) fn_job_free: ffi::FnJobFree,
}

/// A loaded QDAP backend with all entry points resolved.
///
/// The library handle is kept alive for the lifetime of this struct so the
/// loaded `.so` is not unloaded while function pointers into it exist.
/// Sessions borrow the device and therefore cannot outlive it.
///
/// The device lifecycle is reference counted: [`Device::initialize`]
/// increments, [`Device::finalize`] decrements (clamped at zero), and
/// session allocation requires a live count. The count lock is held across
/// the backend's `device_initialize`/`device_finalize` calls, so a 0 ↔ 1
/// transition and the boundary call it triggers are observed as one step:
/// a concurrent `initialize` cannot return while the backend is still
/// mid-initialization, and a concurrent `finalize` cannot tear the backend
/// down underneath a count another thread just raised. The backend stays
/// loaded and resolvable at count zero; initializing again re-enters the
/// initialized state without reloading the library.
pub struct Device {
    /// Prevent the shared library from being unloaded.
    _library: Library,

    /// The backend-specific prefix (e.g. "MOCK").
    prefix: String,

    /// Path the library was loaded from (for diagnostics).
    library_path: String,

    /// Number of outstanding `initialize` calls. Per handle, never global:
    /// two loaded backends do not share a counter. Guarded by a mutex
    /// rather than an atomic because the 0 ↔ 1 transitions must stay
    /// serialized with the boundary calls they trigger.
    init_count: Mutex<u32>,

    pub(crate) table: SymbolTable,
}

impl Device {
    /// Load a backend shared library and resolve all 18 entry points.
    ///
    /// Resolution fails closed: if any required symbol is missing, the
    /// error lists *every* missing name and no handle is returned. No
    /// backend code runs during loading.
    ///
    /// # Errors
    ///
    /// [`QdapError::LoadFailed`] if `dlopen` fails,
    /// [`QdapError::MissingSymbols`] if the entry-point set is incomplete.
    pub fn load(path: &Path, prefix: &str) -> Result<Self> {
        let path_str = path.display().to_string();

        // SAFETY: we are loading an external shared library. The caller is
        // responsible for ensuring the library is trustworthy.
        let library = unsafe { Library::new(path) }.map_err(|e| QdapError::LoadFailed {
            path: path_str.clone(),
            cause: e.to_string(),
        })?;

        // First pass: check presence of every required symbol so that a
        // partially conformant backend is reported in one round trip.
        let mut missing = Vec::new();
        for base in ENTRY_POINTS {
            let sym_name = prefixed_symbol(prefix, base);
            let found = unsafe {
                library
                    .get::<*mut std::ffi::c_void>(sym_name.as_bytes())
                    .is_ok()
            };
            if !found {
                missing.push(sym_name);
            }
        }
        if !missing.is_empty() {
            return Err(QdapError::MissingSymbols {
                path: path_str,
                prefix: prefix.to_string(),
                missing,
            });
        }

        // Second pass: resolve each entry point at its typed signature.
        let table = SymbolTable {
            fn_device_initialize: resolve(&library, prefix, ENTRY_POINTS[0])?,
            fn_device_finalize: resolve(&library, prefix, ENTRY_POINTS[1])?,
            fn_session_alloc: resolve(&library, prefix, ENTRY_POINTS[2])?,
            fn_session_set_parameter: resolve(&library, prefix, ENTRY_POINTS[3])?,
            fn_session_init: resolve(&library, prefix, ENTRY_POINTS[4])?,
            fn_session_free: resolve(&library, prefix, ENTRY_POINTS[5])?,
            fn_query_device_property: resolve(&library, prefix, ENTRY_POINTS[6])?,
            fn_query_site_property: resolve(&library, prefix, ENTRY_POINTS[7])?,
            fn_query_operation_property: resolve(&library, prefix, ENTRY_POINTS[8])?,
            fn_create_device_job: resolve(&library, prefix, ENTRY_POINTS[9])?,
            fn_job_set_parameter: resolve(&library, prefix, ENTRY_POINTS[10])?,
            fn_job_query_property: resolve(&library, prefix, ENTRY_POINTS[11])?,
            fn_job_submit: resolve(&library, prefix, ENTRY_POINTS[12])?,
            fn_job_cancel: resolve(&library, prefix, ENTRY_POINTS[13])?,
            fn_job_check: resolve(&library, prefix, ENTRY_POINTS[14])?,
            fn_job_wait: resolve(&library, prefix, ENTRY_POINTS[15])?,
            fn_job_get_results: resolve(&library, prefix, ENTRY_POINTS[16])?,
            fn_job_free: resolve(&library, prefix, ENTRY_POINTS[17])?,
        };

        tracing::info!("loaded QDAP backend '{path_str}' with prefix '{prefix}'");

        Ok(Self {
            _library: library,
            prefix: prefix.to_string(),
            library_path: path_str,
            init_count: Mutex::new(0),
            table,
        })
    }

    fn lock_count(&self) -> MutexGuard<'_, u32> {
        self.init_count.lock().expect("device lifecycle lock poisoned")
    }

    /// Enter (or re-enter) the initialized state.
    ///
    /// The backend's `device_initialize` is invoked only on the 0 → 1
    /// transition; further calls just bump the count, supporting multiple
    /// independent consumers of the same loaded backend in one process.
    /// The count lock is held across the backend call, so once any
    /// `initialize` returns `Ok` the backend really is initialized, even
    /// if another thread performed the transition.
    pub fn initialize(&self) -> Result<()> {
        let mut count = self.lock_count();
        if *count > 0 {
            *count += 1;
            return Ok(());
        }

        let ret = unsafe { (self.table.fn_device_initialize)() };
        check(ret, "device_initialize")?;
        *count = 1;
        tracing::debug!("device '{}' initialized", self.prefix);
        Ok(())
    }

    /// Leave the initialized state.
    ///
    /// Decrements the reference count, clamped at zero: a finalize without
    /// a matching initialize is a no-op, never an underflow or an error.
    /// The backend's `device_finalize` runs on the 1 → 0 transition, under
    /// the same lock as the count update; the library stays mapped and can
    /// be re-initialized.
    pub fn finalize(&self) {
        let mut count = self.lock_count();
        match *count {
            0 => {
                tracing::debug!(
                    "finalize on device '{}' with zero initializations; ignored",
                    self.prefix
                );
            }
            1 => {
                let ret = unsafe { (self.table.fn_device_finalize)() };
                if ffi::is_success(ret) {
                    tracing::debug!("device '{}' finalized", self.prefix);
                } else {
                    tracing::error!("device_finalize failed for '{}' (code {ret})", self.prefix);
                }
                *count = 0;
            }
            _ => *count -= 1,
        }
    }

    /// Whether the device is currently in the initialized state.
    pub fn is_initialized(&self) -> bool {
        *self.lock_count() > 0
    }

    /// Current initialize reference count.
    pub fn init_count(&self) -> u32 {
        *self.lock_count()
    }

    /// The backend-specific prefix (e.g. `"MOCK"`).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Filesystem path the library was loaded from.
    pub fn library_path(&self) -> &str {
        &self.library_path
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let outstanding = *self.lock_count();
        if outstanding > 0 {
            tracing::warn!(
                "device '{}' dropped with {outstanding} outstanding initializations",
                self.prefix
            );
            let ret = unsafe { (self.table.fn_device_finalize)() };
            if !ffi::is_success(ret) {
                tracing::error!("device_finalize failed for '{}' (code {ret})", self.prefix);
            }
        }
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("prefix", &self.prefix)
            .field("library_path", &self.library_path)
            .field("init_count", &self.init_count())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Symbol resolution helpers
// ---------------------------------------------------------------------------

/// Construct the full prefixed symbol name: `{PREFIX}_{base_name}`.
fn prefixed_symbol(prefix: &str, base_name: &str) -> String {
    format!("{prefix}_{base_name}")
}

/// Resolve one entry point at its typed signature.
fn resolve<T: Copy>(library: &Library, prefix: &str, base_name: &str) -> Result<T> {
    let sym_name = prefixed_symbol(prefix, base_name);
    tracing::trace!("resolving symbol '{sym_name}'");

    // SAFETY: The caller guarantees the type `T` matches the actual function
    // signature exported by the library. This is the core FFI contract.
    unsafe {
        let sym: Symbol<T> =
            library
                .get(sym_name.as_bytes())
                .map_err(|e| QdapError::MissingSymbols {
                    path: String::new(),
                    prefix: prefix.to_string(),
                    missing: vec![format!("{sym_name}: {e}")],
                })?;
        Ok(*sym)
    }
}
