// Copyright The symdiag Authors
// SPDX-License-Identifier: Apache-2.0

//! Symbol resolution engine: provider session lifecycle and the fidelity
//! fallback chain.
//!
//! Resolution never fails. Each lookup walks down a chain of decreasingly
//! informative renderings and the last level, the bare hexadecimal address,
//! always succeeds:
//!
//! 1. `<name> at <file>:<line>`
//! 2. `<name>`
//! 3. `<address> at <module>+0x<offset>`
//! 4. `<address>`

use crate::modulemap::ModuleMap;
use crate::{config, demangle, provider, Address};
use std::sync::OnceLock;

/// Scratch capacity handed to the provider for names and file paths.
const SCRATCH_LEN: usize = 512;

/// Environment switch forcing session teardown and re-init on first use.
const FORCE_REINIT_ENV: &str = "SYMDIAG_FORCE_REINIT";

/// Session state: unset = uninitialized, `true` = initialized, `false` =
/// permanently failed. The provider session must be started once per
/// process before symbol lookups can succeed.
static SESSION: OnceLock<bool> = OnceLock::new();

fn session_ok() -> bool {
    *SESSION.get_or_init(init_session)
}

/// The single session initialization attempt.
///
/// Whatever the outcome, it is never repeated: a failed provider stays
/// failed and every later lookup goes straight to the fallback levels.
fn init_session() -> bool {
    if config::env_bool(FORCE_REINIT_ENV, false) {
        // Another in-process consumer may already have started a session in
        // an incompatible mode. Drop it and start over; the cost is a brief
        // window with no symbol information.
        provider::cleanup();
    }

    provider::set_options(provider::OPT_LOAD_LINES);

    let ok = provider::initialize();
    log::debug!(
        "symbol provider session {}",
        if ok { "initialized" } else { "unavailable" }
    );
    ok
}

/// Resolve `addr` to the most informative description available.
pub fn describe(addr: Address) -> String {
    if let Some(name) = provider_symbol(addr) {
        return name;
    }

    match module_fallback(addr, &ModuleMap::current()) {
        Some(name) => name,
        None => format!("{addr:#x}"),
    }
}

/// Write the description of `addr` into `out`.
///
/// The result is always NUL-terminated within the buffer's capacity;
/// truncation is silent. Zero-capacity buffers are left untouched.
pub fn describe_into(addr: Address, out: &mut [u8]) {
    write_truncated(out, &describe(addr));
}

/// Fidelity levels 1 and 2: ask the provider for symbol and line info.
fn provider_symbol(addr: Address) -> Option<String> {
    if !session_ok() {
        return None;
    }

    let mut name_buf = [0u8; SCRATCH_LEN];
    let mut displacement = 0u64;
    if !provider::sym_from_addr(addr, &mut displacement, &mut name_buf) {
        return None;
    }
    let raw = terminated_str(&name_buf)?;
    let name = demangle::demangle(&raw);

    // Line info is best-effort; symbol-only output is not an error.
    let mut file_buf = [0u8; SCRATCH_LEN];
    let mut line_displacement = 0u32;
    let mut line = 0u32;
    if provider::line_from_addr(addr, &mut line_displacement, &mut file_buf, &mut line) {
        if let Some(file) = terminated_str(&file_buf) {
            return Some(format!("{name} at {file}:{line}"));
        }
    }

    Some(name.into_owned())
}

/// Fidelity level 3: name the module containing the address.
fn module_fallback(addr: Address, modules: &ModuleMap) -> Option<String> {
    let module = modules.find(addr)?;
    Some(format!(
        "{addr:#x} at {}+{:#x}",
        module.path,
        addr - module.base
    ))
}

/// Extract the NUL-terminated prefix a provider wrote into a scratch buffer.
///
/// Returns `None` for an empty string and for a buffer the provider failed
/// to terminate.
fn terminated_str(buf: &[u8]) -> Option<String> {
    let end = buf.iter().position(|&b| b == 0)?;
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Copy `text` into `out`, truncating to capacity and NUL-terminating.
fn write_truncated(out: &mut [u8], text: &str) {
    if out.is_empty() {
        return;
    }
    let len = text.len().min(out.len() - 1);
    out[..len].copy_from_slice(&text.as_bytes()[..len]);
    out[len] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulemap::Module;

    // No provider library is installed in the test environment: these tests
    // exercise the module and raw-address fallback levels.

    #[test]
    fn unmapped_address_renders_raw() {
        assert_eq!(describe(0xdeadbeef), "0xdeadbeef");
    }

    #[test]
    fn arbitrary_bit_patterns_always_resolve() {
        for addr in [0, 1, 0xdeadbeef, u64::MAX] {
            assert!(!describe(addr).is_empty());
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn own_code_resolves_to_module_and_offset() {
        fn probe() {}

        let desc = describe(probe as usize as Address);
        assert!(desc.contains(" at "), "got: {desc}");
        assert!(desc.contains("+0x"), "got: {desc}");
    }

    #[test]
    fn module_fallback_offsets_from_base() {
        let map = ModuleMap::from_modules(vec![Module {
            path: "/usr/lib/libdemo.so".into(),
            base: 0x1000,
            size: 0x2000,
        }]);

        let desc = module_fallback(0x1500, &map).unwrap();
        assert!(desc.contains("/usr/lib/libdemo.so"), "got: {desc}");
        assert!(desc.contains("+0x500"), "got: {desc}");

        assert!(module_fallback(0x3000, &map).is_none());
    }

    #[test]
    fn truncation_is_nul_terminated() {
        let mut buf = [0xffu8; 4];
        describe_into(0xdeadbeef, &mut buf);
        assert_eq!(&buf, b"0xd\0");
    }

    #[test]
    fn zero_capacity_buffer_is_untouched() {
        describe_into(0xdeadbeef, &mut []);
    }

    #[test]
    fn ample_buffer_holds_full_description() {
        let mut buf = [0xffu8; 64];
        describe_into(0xdeadbeef, &mut buf);
        assert_eq!(&buf[..11], b"0xdeadbeef\0");
    }

    #[test]
    fn scratch_parsing_tolerates_bad_providers() {
        assert_eq!(terminated_str(b"name\0rest"), Some("name".into()));
        assert_eq!(terminated_str(b"\0"), None);
        assert_eq!(terminated_str(b"unterminated"), None);
    }
}
