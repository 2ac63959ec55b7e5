// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Wire encodings.
//!
//! - [`cdr`] - CDR/XCDR stream encoding, decoding and key projection

pub mod cdr;

pub use cdr::{CdrStreamCodec, KeyFormat, TypeDescriptor};
