// Copyright The symdiag Authors
// SPDX-License-Identifier: Apache-2.0

//! Environment-backed configuration switches.

/// Read a boolean environment switch, using `default` when unset.
pub(crate) fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => parse_bool(&value),
        Err(_) => default,
    }
}

/// Read a non-empty string environment variable.
pub(crate) fn env_str(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Everything that is not an explicit "no" counts as enabled.
fn parse_bool(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "n" | "no" | "f" | "false"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing() {
        for on in ["1", "true", "yes", "y", "whatever", " TRUE "] {
            assert!(parse_bool(on), "{on:?} should parse as enabled");
        }
        for off in ["0", "n", "no", "f", "false", "FALSE", " No "] {
            assert!(!parse_bool(off), "{off:?} should parse as disabled");
        }
    }
}
