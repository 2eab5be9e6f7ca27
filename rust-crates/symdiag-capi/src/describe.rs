// Copyright The symdiag Authors
// SPDX-License-Identifier: Apache-2.0

use std::ffi::c_char;
use std::slice;
use symdiag::{cache, engine, Address};

/// Write the description of `addr` into `buf`.
///
/// The result is always NUL-terminated within `size` bytes; longer
/// descriptions are silently truncated. A null `buf` or zero `size` is a
/// no-op.
///
/// # Safety
///
/// `buf` must either be null or be valid for writes of `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn symdiag_describe(addr: Address, buf: *mut c_char, size: usize) {
    if buf.is_null() || size == 0 {
        return;
    }

    let out = unsafe { slice::from_raw_parts_mut(buf.cast::<u8>(), size) };
    engine::describe_into(addr, out);
}

/// Resolve `addr` through the process-wide cache.
///
/// The returned string is borrowed from the cache: it is valid for the
/// remainder of the process and must not be freed by the caller.
#[no_mangle]
pub extern "C" fn symdiag_describe_cached(addr: Address) -> *const c_char {
    cache::describe_cached_cstr(addr).as_ptr()
}

/// Resolve `addr` and emit the description to the diagnostic log.
#[no_mangle]
pub extern "C" fn symdiag_log(addr: Address) {
    log::debug!("\t{}", engine::describe(addr));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn writes_nul_terminated_description() {
        let mut buf = [0x7fu8; 64];
        unsafe { symdiag_describe(0xdeadbeef, buf.as_mut_ptr().cast(), buf.len()) };

        let text = CStr::from_bytes_until_nul(&buf).unwrap();
        assert!(!text.to_bytes().is_empty());
    }

    #[test]
    fn truncates_to_capacity() {
        let mut buf = [0x7fu8; 4];
        unsafe { symdiag_describe(0xdeadbeef, buf.as_mut_ptr().cast(), buf.len()) };
        assert_eq!(buf[3], 0);
    }

    #[test]
    fn null_buffer_is_ignored() {
        unsafe { symdiag_describe(0xdeadbeef, std::ptr::null_mut(), 16) };
    }

    #[test]
    fn cached_pointer_is_stable() {
        let first = symdiag_describe_cached(0xdeadbeef);
        let second = symdiag_describe_cached(0xdeadbeef);
        assert_eq!(first, second);
        assert!(!first.is_null());
    }
}
