// Copyright The symdiag Authors
// SPDX-License-Identifier: Apache-2.0

//! Memoizing cache of resolved descriptions.
//!
//! The cache owns every stored string for the lifetime of the process;
//! nothing is ever evicted or mutated. Callers receive non-owning
//! references. Cardinality stays low in practice because only addresses
//! that show up in diagnostics are ever resolved.

use crate::{engine, Address};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::sync::{Mutex, OnceLock, PoisonError};

static CACHE: OnceLock<Mutex<HashMap<Address, &'static CStr>>> = OnceLock::new();

fn cache() -> &'static Mutex<HashMap<Address, &'static CStr>> {
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolve `addr` with memoization.
///
/// The first caller for a given address computes the description with the
/// cache lock held; concurrent callers for the same address block and then
/// observe the inserted value. The full fallback chain thus runs at most
/// once per distinct address.
pub fn describe_cached(addr: Address) -> &'static str {
    describe_cached_cstr(addr)
        .to_str()
        .expect("descriptions are built from strings")
}

/// Like [`describe_cached`], as a C string for FFI consumers.
pub fn describe_cached_cstr(addr: Address) -> &'static CStr {
    let mut map = cache().lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(&name) = map.get(&addr) {
        return name;
    }

    let name = intern(engine::describe(addr));
    map.insert(addr, name);
    name
}

/// Hand the string over to the process: it is never freed again.
fn intern(name: String) -> &'static CStr {
    // Descriptions are assembled from NUL-free parts.
    let owned = unsafe { CString::from_vec_unchecked(name.into_bytes()) };
    Box::leak(owned.into_boxed_c_str())
}
