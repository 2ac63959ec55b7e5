// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Codec configuration.

use serde::{Deserialize, Serialize};

use super::error::{CodecError, Result};
use super::Endianness;

/// Default nesting limit for aggregates during encode and decode.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default upper bound on elements in a single decoded collection.
pub const DEFAULT_MAX_COLLECTION_LEN: usize = 10_000_000;

/// Default initial capacity of encode buffers.
pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

/// Options shared by every call made through a codec.
///
/// # Example
///
/// ```
/// use cdrstream::core::{CodecOptions, Endianness};
///
/// let options = CodecOptions::from_toml_str("endianness = \"big\"\nmax_depth = 16").unwrap();
/// assert_eq!(options.endianness, Endianness::Big);
/// assert_eq!(options.max_depth, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// Byte order of encoded data and key-only samples
    pub endianness: Endianness,
    /// Maximum aggregate nesting before a call fails
    pub max_depth: usize,
    /// Maximum element count of a decoded array or sequence
    pub max_collection_len: usize,
    /// Initial capacity of encode buffers
    pub initial_capacity: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            endianness: Endianness::native(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_collection_len: DEFAULT_MAX_COLLECTION_LEN,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

impl CodecOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output byte order.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Set the nesting limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the collection length limit.
    pub fn with_max_collection_len(mut self, max_collection_len: usize) -> Self {
        self.max_collection_len = max_collection_len;
        self
    }

    /// Set the initial encode buffer capacity.
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Parse options from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: CodecOptions =
            toml::from_str(text).map_err(|e| CodecError::parse("codec options", e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Reject option combinations that would make every call fail.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(CodecError::parse("codec options", "max_depth must be > 0"));
        }
        Ok(())
    }
}
