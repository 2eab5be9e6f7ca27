// Copyright The symdiag Authors
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod cache;
mod config;
pub mod demangle;
pub mod engine;
pub mod modulemap;
pub mod provider;

/// In-process memory address.
///
/// Any bit pattern is accepted; addresses are never validated as actually
/// pointing at code.
pub type Address = u64;
