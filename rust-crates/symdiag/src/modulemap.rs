// Copyright The symdiag Authors
// SPDX-License-Identifier: Apache-2.0

//! Snapshot of the modules loaded into the current process.
//!
//! Used as the middle fallback level: when no symbol is available for an
//! address, naming the containing module and the offset from its load base
//! is still a lot better than a bare pointer value.

use crate::Address;

/// Result type shorthand.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Errors that can occur while enumerating loaded modules.
#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("module enumeration is not supported on this platform")]
    Unsupported,
}

/// A module (executable or shared library) mapped into the process.
#[derive(Debug, Clone)]
pub struct Module {
    /// Filesystem path the module was mapped from.
    pub path: String,
    /// Lowest address the module is mapped at.
    pub base: Address,
    /// Extent of the mapping, covering all of the module's segments.
    pub size: u64,
}

impl Module {
    /// Whether `addr` falls within this module's mapping.
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

/// Modules loaded into the current process at one point in time.
#[derive(Debug, Default)]
pub struct ModuleMap {
    modules: Vec<Module>,
}

impl ModuleMap {
    /// Snapshot the modules currently loaded into this process.
    ///
    /// Enumeration failures degrade to an empty snapshot: module lookups
    /// will miss and callers fall through to the raw-address rendering.
    pub fn current() -> Self {
        Self::load().unwrap_or_else(|err| {
            log::debug!("module map unavailable: {err}");
            Self::default()
        })
    }

    /// Snapshot the modules currently loaded into this process.
    #[cfg(target_os = "linux")]
    pub fn load() -> Result<Self> {
        const MAPS: &str = "/proc/self/maps";

        let maps = std::fs::read_to_string(MAPS).map_err(|source| Error::Io {
            path: MAPS.into(),
            source,
        })?;

        Ok(Self::from_modules(parse_maps(&maps)))
    }

    /// Snapshot the modules currently loaded into this process.
    #[cfg(not(target_os = "linux"))]
    pub fn load() -> Result<Self> {
        Err(Error::Unsupported)
    }

    /// Build a map from explicit entries.
    pub fn from_modules(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    /// Returns the module containing `addr`, if any.
    pub fn find(&self, addr: Address) -> Option<&Module> {
        self.modules.iter().find(|module| module.contains(addr))
    }
}

/// Parse `/proc/self/maps` content into per-module extents.
///
/// A module is typically mapped as several segments; all mappings sharing a
/// pathname are coalesced into one entry spanning from the lowest start to
/// the highest end. Mappings without a filesystem path (heap, stack, anon)
/// are skipped, as are lines that fail to parse.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_maps(text: &str) -> Vec<Module> {
    let mut extents: Vec<(String, Address, Address)> = Vec::new();

    for line in text.lines() {
        let Some((range, _)) = line.split_once(' ') else {
            continue;
        };
        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (
            Address::from_str_radix(start, 16),
            Address::from_str_radix(end, 16),
        ) else {
            continue;
        };

        // The pathname is the only field that can contain a '/'.
        let Some(idx) = line.find('/') else {
            continue;
        };
        let path = line[idx..].trim_end();

        match extents.iter_mut().find(|(p, _, _)| p == path) {
            Some((_, base, max_end)) => {
                *base = (*base).min(start);
                *max_end = (*max_end).max(end);
            }
            None => extents.push((path.to_string(), start, end)),
        }
    }

    extents
        .into_iter()
        .map(|(path, base, end)| Module {
            path,
            base,
            size: end - base,
        })
        .collect()
}
