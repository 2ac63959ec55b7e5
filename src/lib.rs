// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # cdrstream
//!
//! Instruction-stream driven CDR codec with XTypes extensibility and key
//! projection.
//!
//! A type is described by a flat program of instructions, verified once
//! into a [`TypeDescriptor`]. A [`CdrStreamCodec`] built on it encodes and
//! decodes samples in XCDR1 or XCDR2, in either byte order, and derives keys
//! both from in-memory samples and straight from serialized data.
//!
//! ## Architecture
//!
//! - `core/` - errors, the sample value model, options and the type registry
//! - `encoding/cdr/` - instruction stream, verifier, cursor/encoder primitives,
//!   extensibility framing and the encode/decode/key interpreters
//!
//! ## Example
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use cdrstream::{
//!     Adr, CdrStreamCodec, CodecOptions, Endianness, KeyField, KeyFormat, Op, PrimitiveType,
//!     TypeCode, TypeRegistry, Value, XcdrVersion,
//! };
//!
//! let registry = TypeRegistry::new();
//! registry.register(cdrstream::TypeDescriptor::build(
//!     "Sensor",
//!     vec![
//!         Op::Dlc,
//!         Op::Adr(Adr::new(0, TypeCode::Primitive(PrimitiveType::UInt32)).key()),
//!         Op::Adr(Adr::new(1, TypeCode::Primitive(PrimitiveType::Float64))),
//!         Op::Rts,
//!         Op::Kof { path: vec![1] },
//!     ],
//!     vec![KeyField::new("id", 4, 0)],
//! )?)?;
//!
//! let options = CodecOptions::default().with_endianness(Endianness::Little);
//! let codec = CdrStreamCodec::from_registry(&registry, "Sensor", options)?;
//! let sample = Value::Struct(vec![Value::UInt32(7), Value::Float64(21.5)]);
//!
//! let data = codec.encode(&sample, XcdrVersion::Xcdr2)?;
//! assert_eq!(codec.decode(&data, XcdrVersion::Xcdr2, Endianness::Little)?, sample);
//!
//! let key = codec.extract_key_from_data(&data, XcdrVersion::Xcdr2, Endianness::Little, KeyFormat::Canonical)?;
//! assert_eq!(key, vec![0, 0, 0, 7]);
//! # Ok(())
//! # }
//! ```

// Core types
pub mod core;

// Re-export core types for convenience
pub use core::{
    CodecError, CodecOptions, Endianness, PrimitiveType, Result, TypeRegistry, Value, XcdrVersion,
};

// Encoding/decoding
pub mod encoding;

pub use encoding::cdr::{
    Adr, Case, CdrStreamCodec, Extensibility, KeyField, KeyFormat, MemberFlags, Op, ProgramError,
    TypeCode, TypeDescriptor,
};
