// Copyright The symdiag Authors
// SPDX-License-Identifier: Apache-2.0

//! Lazy binding to the optional symbol-information provider library.
//!
//! The provider is an external shared library that can map addresses within
//! the current process to symbol and line information. It is not required to
//! be present: every entry point in this module degrades to a safe default
//! when the library (or an individual entry point within it) cannot be
//! resolved. Loading is attempted at most once per process; after a failed
//! attempt all further calls bail out immediately.

use crate::{config, Address};
use std::ffi::{c_char, c_void, CStr, CString};
use std::mem;
use std::sync::OnceLock;

/// Result type shorthand.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Errors that can occur while binding the provider library.
#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("library name contains a NUL byte")]
    BadLibraryName,

    #[error("dlopen failed: {0}")]
    Load(String),

    #[error("dynamic loading is not supported on this platform")]
    UnsupportedPlatform,
}

/// Environment variable naming a provider library to try first.
pub const PROVIDER_ENV: &str = "SYMDIAG_PROVIDER";

#[cfg(target_os = "macos")]
const COMPAT_LIBRARY: &str = "libsymdiag_compat.dylib";
#[cfg(target_os = "macos")]
const DEFAULT_LIBRARY: &str = "libsymdiag_provider.dylib";

#[cfg(not(target_os = "macos"))]
const COMPAT_LIBRARY: &str = "libsymdiag_compat.so";
#[cfg(not(target_os = "macos"))]
const DEFAULT_LIBRARY: &str = "libsymdiag_provider.so";

/// Option flag instructing the provider to load line-number information.
pub const OPT_LOAD_LINES: u32 = 1 << 0;

/// Starts the provider's session for the current process.
pub type InitializeFn = unsafe extern "C" fn() -> bool;

/// Replaces the provider option mask, returning the previous mask.
pub type SetOptionsFn = unsafe extern "C" fn(u32) -> u32;

/// Writes the NUL-terminated name of the symbol covering the address into
/// the buffer and stores the address' displacement from the symbol start.
pub type SymFromAddrFn = unsafe extern "C" fn(Address, *mut u64, *mut c_char, usize) -> bool;

/// Writes the NUL-terminated source file path and the line number covering
/// the address.
pub type LineFromAddrFn =
    unsafe extern "C" fn(Address, *mut u32, *mut c_char, usize, *mut u32) -> bool;

/// Ends the provider's session for the current process.
pub type CleanupFn = unsafe extern "C" fn() -> bool;

/// Process-lifetime handle of the loaded provider library.
///
/// The raw handle is an opaque token that is only ever passed back to
/// `dlsym`; it is deliberately never closed.
struct ProviderLibrary(*mut c_void);

unsafe impl Send for ProviderLibrary {}
unsafe impl Sync for ProviderLibrary {}

static LIBRARY: OnceLock<Option<ProviderLibrary>> = OnceLock::new();

/// Returns the provider library, loading it on first call.
///
/// A failed load is recorded permanently; later calls return `None` without
/// touching the dynamic loader again.
fn library() -> Option<&'static ProviderLibrary> {
    LIBRARY.get_or_init(load_library).as_ref()
}

fn load_library() -> Option<ProviderLibrary> {
    if let Some(path) = config::env_str(PROVIDER_ENV) {
        match try_load(&path) {
            Ok(library) => return Some(library),
            Err(err) => log::warn!("{PROVIDER_ENV}={path} is not loadable: {err}"),
        }
    }

    // The compatibility shim understands symbol formats the default provider
    // does not. Its absence is expected on most installations.
    match try_load(COMPAT_LIBRARY) {
        Ok(library) => return Some(library),
        Err(err) => log::warn!("{COMPAT_LIBRARY} not found ({err}), trying {DEFAULT_LIBRARY}"),
    }

    match try_load(DEFAULT_LIBRARY) {
        Ok(library) => Some(library),
        Err(err) => {
            log::warn!("no symbol provider available ({err}): symbol names will not be resolved");
            None
        }
    }
}

#[cfg(unix)]
fn try_load(name: &str) -> Result<ProviderLibrary> {
    let name = CString::new(name).map_err(|_| Error::BadLibraryName)?;
    let handle = unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_LAZY) };
    if handle.is_null() {
        return Err(Error::Load(dlerror_string()));
    }
    Ok(ProviderLibrary(handle))
}

#[cfg(not(unix))]
fn try_load(_name: &str) -> Result<ProviderLibrary> {
    Err(Error::UnsupportedPlatform)
}

#[cfg(unix)]
fn lookup_symbol(library: &ProviderLibrary, name: &CStr) -> *mut c_void {
    unsafe { libc::dlsym(library.0, name.as_ptr()) }
}

#[cfg(not(unix))]
fn lookup_symbol(_library: &ProviderLibrary, _name: &CStr) -> *mut c_void {
    std::ptr::null_mut()
}

#[cfg(unix)]
fn dlerror_string() -> String {
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        "unknown error".into()
    } else {
        unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
    }
}

/// A lazily-resolved provider entry point.
///
/// Resolution happens exactly once; both outcomes (function pointer or
/// permanent absence) are cached for the remainder of the process.
struct Shim<F> {
    name: &'static CStr,
    slot: OnceLock<Option<F>>,
}

impl<F: Copy> Shim<F> {
    const fn new(name: &'static CStr) -> Self {
        Self {
            name,
            slot: OnceLock::new(),
        }
    }

    fn get(&self) -> Option<F> {
        *self.slot.get_or_init(|| resolve_entry_point(self.name))
    }
}

/// Looks up a named entry point within the provider library.
///
/// A missing entry point is not fatal: other entry points may still resolve.
fn resolve_entry_point<F: Copy>(name: &CStr) -> Option<F> {
    assert!(mem::size_of::<F>() == mem::size_of::<*mut c_void>());

    let library = library()?;
    let sym = lookup_symbol(library, name);
    if sym.is_null() {
        log::debug!("provider entry point {name:?} not found");
        return None;
    }

    Some(unsafe { mem::transmute_copy::<*mut c_void, F>(&sym) })
}

static INITIALIZE: Shim<InitializeFn> = Shim::new(c"symdiag_provider_initialize");
static SET_OPTIONS: Shim<SetOptionsFn> = Shim::new(c"symdiag_provider_set_options");
static SYM_FROM_ADDR: Shim<SymFromAddrFn> = Shim::new(c"symdiag_provider_sym_from_addr");
static LINE_FROM_ADDR: Shim<LineFromAddrFn> = Shim::new(c"symdiag_provider_line_from_addr");
static CLEANUP: Shim<CleanupFn> = Shim::new(c"symdiag_provider_cleanup");

/// Start the provider session. Returns `false` if unavailable.
pub fn initialize() -> bool {
    match INITIALIZE.get() {
        Some(f) => unsafe { f() },
        None => false,
    }
}

/// Replace the provider option mask, returning the previous mask.
///
/// Returns `0` if the provider is unavailable.
pub fn set_options(mask: u32) -> u32 {
    match SET_OPTIONS.get() {
        Some(f) => unsafe { f(mask) },
        None => 0,
    }
}

/// Look up the symbol covering `addr`.
///
/// On success the provider has written a NUL-terminated name into `name`
/// and the address' displacement from the symbol start into `displacement`.
/// Returns `false` on "no match" as well as when the provider is
/// unavailable; the two are indistinguishable by design.
pub fn sym_from_addr(addr: Address, displacement: &mut u64, name: &mut [u8]) -> bool {
    match SYM_FROM_ADDR.get() {
        Some(f) => unsafe { f(addr, displacement, name.as_mut_ptr().cast(), name.len()) },
        None => false,
    }
}

/// Look up the source file and line covering `addr`.
///
/// Line info is best-effort; `false` simply means "not available".
pub fn line_from_addr(
    addr: Address,
    displacement: &mut u32,
    file: &mut [u8],
    line: &mut u32,
) -> bool {
    match LINE_FROM_ADDR.get() {
        Some(f) => unsafe { f(addr, displacement, file.as_mut_ptr().cast(), file.len(), line) },
        None => false,
    }
}

/// End the provider session. Returns `false` if unavailable.
pub fn cleanup() -> bool {
    match CLEANUP.get() {
        Some(f) => unsafe { f() },
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The test environment has no provider library installed, so all of
    // these exercise the degraded path.

    #[test]
    fn missing_library_is_an_error() {
        assert!(try_load("libsymdiag_does_not_exist_0981.so").is_err());
    }

    #[test]
    fn nul_in_library_name_is_an_error() {
        assert!(matches!(
            try_load("lib\0diag.so"),
            Err(Error::BadLibraryName) | Err(Error::UnsupportedPlatform)
        ));
    }

    #[test]
    fn shims_return_safe_defaults() {
        assert!(!initialize());
        assert_eq!(set_options(OPT_LOAD_LINES), 0);

        let mut displacement = 0;
        let mut name = [0u8; 64];
        assert!(!sym_from_addr(0x1234, &mut displacement, &mut name));
        assert!(name.iter().all(|&b| b == 0));

        let mut line_displacement = 0;
        let mut line = 0;
        let mut file = [0u8; 64];
        assert!(!line_from_addr(0x1234, &mut line_displacement, &mut file, &mut line));

        assert!(!cleanup());
    }

    #[test]
    fn failed_load_is_permanent() {
        // Both calls hit the same cached outcome.
        assert!(library().is_none());
        assert!(library().is_none());
    }
}
