// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! CDR (Common Data Representation) stream codec.
//!
//! Types are described by an instruction stream ([`Op`]) that is verified
//! once into a [`TypeDescriptor`]. Three interpreters walk it:
//!
//! - the encoder, driving a [`CdrSink`] (a real [`CdrEncoder`] or a
//!   [`CdrCalculator`] that only counts bytes),
//! - the decoder, reading untrusted input through a bounded [`CdrCursor`],
//! - the key projection, producing key-only samples and canonical keys.
//!
//! [`CdrStreamCodec`] is the entry point for all of them.

pub mod calculator;
pub mod codec;
pub mod cursor;
pub mod descriptor;
pub mod encoder;
pub mod framing;
pub mod key;
pub mod ops;
mod read;
mod write;

pub use calculator::CdrCalculator;
pub use codec::CdrStreamCodec;
pub use cursor::{CdrCursor, CDR_HEADER_SIZE};
pub use descriptor::{Extensibility, KeyField, KeyRole, ProgramError, TypeDescriptor};
pub use encoder::{CdrEncoder, CdrSink, EncapsulationKind};
pub use framing::{LengthCode, MemberHeader};
pub use key::KeyFormat;
pub use ops::{Adr, Case, MemberFlags, Op, TypeCode};
