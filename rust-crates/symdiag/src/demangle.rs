// Copyright The symdiag Authors
// SPDX-License-Identifier: Apache-2.0

//! Demangling of provider-supplied symbol names.

use std::borrow::Cow;

/// Heuristic check whether a name uses one of the Rust mangling schemes.
///
/// V0 names carry an unambiguous `_R` prefix. Legacy names share the `_ZN`
/// prefix with Itanium C++ mangling and are only accepted when the trailing
/// `17h<16 hex digits>E` hash is present.
fn could_be_rust(name: &str) -> bool {
    if name.starts_with("_R") {
        return true;
    }

    name.is_ascii()
        && name.starts_with("_ZN")
        && name.ends_with('E')
        && name.len() > 3 + 3 + 16 + 1
        && name[..name.len() - 17].ends_with("17h")
        && name[name.len() - 17..name.len() - 1]
            .bytes()
            .all(|b| b.is_ascii_hexdigit())
}

/// Demangles the given symbol name.
///
/// Handles Rust and Itanium-ABI C++ names; anything else is passed through
/// unchanged. Demangling failures are not errors, the mangled name is still
/// a usable diagnostic.
pub fn demangle(name: &str) -> Cow<'_, str> {
    if could_be_rust(name) {
        if let Ok(demangler) = rustc_demangle::try_demangle(name) {
            // The alternate formatting suppresses the hash suffix.
            return Cow::Owned(format!("{demangler:#}"));
        }
    }

    if name.starts_with("_Z") || name.starts_with("___Z") {
        if let Ok(sym) = cpp_demangle::BorrowedSymbol::new(name.as_bytes()) {
            if let Ok(out) = sym.demangle(&cpp_demangle::DemangleOptions::default()) {
                return Cow::Owned(out);
            }
        }
    }

    Cow::Borrowed(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(demangle("main"), "main");
        assert_eq!(demangle("do_composite"), "do_composite");
        assert_eq!(
            demangle("_RustIsNotTheOnlyLangWhoseSymbolsCanStartWith_R"),
            "_RustIsNotTheOnlyLangWhoseSymbolsCanStartWith_R",
        );
    }

    #[test]
    fn rust_legacy() {
        let mangled = concat!(
            "_ZN71_$LT$rustc_demangle..legacy..Demangle$u20",
            "$as$u20$core..fmt..Display$GT$3fmt17h48ee277748f854a8E",
        );
        assert_eq!(
            demangle(mangled),
            "<rustc_demangle::legacy::Demangle as core::fmt::Display>::fmt",
        );
    }

    #[test]
    fn cxx() {
        assert_eq!(demangle("_ZN5space3fooEibc"), "space::foo(int, bool, char)");
    }
}
