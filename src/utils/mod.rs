// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Utility modules
//!
//! Common utilities for the pageflow CLI.

pub mod colors;

pub use colors::*;
