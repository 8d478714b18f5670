// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Cache key hashing
//!
//! Uses BLAKE3 so arbitrary keys (queries, params) map to fixed-length file names.

use blake3::Hasher;

/// Hex-encoded BLAKE3 hash of a cache key
pub fn hash_key(key: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(key.as_bytes());
    hasher.finalize().to_hex().to_string()
}
