// Copyright The symdiag Authors
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]

mod describe;

pub use describe::*;
