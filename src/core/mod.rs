// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core types used throughout cdrstream.
//!
//! This module provides the foundational types for the library:
//! - [`CodecError`] - Comprehensive error handling
//! - [`Value`] - In-memory sample representation
//! - [`CodecOptions`] - Codec configuration
//! - [`TypeRegistry`] - Registered type descriptors
//! - [`XcdrVersion`] / [`Endianness`] - Wire encoding selectors

pub mod error;
pub mod options;
pub mod registry;
pub mod value;

pub use error::{CodecError, Result};
pub use options::CodecOptions;
pub use registry::TypeRegistry;
pub use value::{PrimitiveType, Value};

use serde::{Deserialize, Serialize};

/// Extended CDR encoding version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XcdrVersion {
    /// Classic CDR: 8-byte scalars aligned to 8, 4-byte enums, no member headers.
    Xcdr1,
    /// XTypes CDR2: alignment capped at 4, DHEADER/EMHEADER framing.
    Xcdr2,
}

impl XcdrVersion {
    /// Alignment used for 8-byte scalars.
    #[must_use]
    pub const fn eight_byte_alignment(self) -> usize {
        match self {
            XcdrVersion::Xcdr1 => 8,
            XcdrVersion::Xcdr2 => 4,
        }
    }

    /// Alignment of a scalar of `width` bytes under this version.
    #[must_use]
    pub const fn alignment_of(self, width: usize) -> usize {
        if width >= 8 {
            self.eight_byte_alignment()
        } else {
            width
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            XcdrVersion::Xcdr1 => "xcdr1",
            XcdrVersion::Xcdr2 => "xcdr2",
        }
    }
}

/// Byte order of a CDR stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Little endian
    Little,
    /// Big endian (the canonical "wire" order)
    Big,
}

impl Endianness {
    /// Byte order of the host.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Self::native()
    }
}

/// Error returned when parsing an `Endianness` from string fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseEndiannessError {
    _private: (),
}

impl std::fmt::Display for ParseEndiannessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid byte order, expected 'little', 'big', or 'native'"
        )
    }
}

impl std::error::Error for ParseEndiannessError {}

impl std::str::FromStr for Endianness {
    type Err = ParseEndiannessError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "little" | "le" => Ok(Endianness::Little),
            "big" | "be" => Ok(Endianness::Big),
            "native" => Ok(Endianness::native()),
            _ => Err(ParseEndiannessError { _private: () }),
        }
    }
}
