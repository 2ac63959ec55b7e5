// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Instruction stream for CDR serialization.
//!
//! A type is described by a flat vector of [`Op`]s produced ahead of time by
//! an IDL compiler. Jump operands are absolute indices into that vector, so
//! nested types, union case tables and key paths are all plain array lookups.
//!
//! Layout conventions:
//! - A structure body starts at its index with an optional [`Op::Dlc`]
//!   (appendable) or [`Op::Plc`] (mutable) marker, continues with members
//!   ([`Op::Adr`] or [`Op::Jsr`]) and ends with [`Op::Rts`].
//! - A mutable body holds only [`Op::Plm`] entries before its `Rts`. Each
//!   entry targets a one-member sub-program (`Adr`, `Rts`) or, when `base`
//!   is set, the `Plc` body of an inherited type.
//! - Union case tables are runs of [`Op::Jeq`].
//! - Key paths are [`Op::Kof`] entries, referenced by the key descriptor.

use serde::{Deserialize, Serialize};

use crate::core::{PrimitiveType, XcdrVersion};

/// Per-member flags of an `ADR` instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberFlags {
    /// Member is (part of) the key
    pub key: bool,
    /// Readers must understand this member (EMHEADER `M` flag)
    pub must_understand: bool,
    /// Member may be absent
    pub optional: bool,
}

/// Address-with-type instruction: one member of a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adr {
    /// Slot index of the member in the record layout
    pub offset: usize,
    /// Wire shape of the member
    pub ty: TypeCode,
    /// Member flags
    #[serde(default)]
    pub flags: MemberFlags,
}

impl Adr {
    /// Create a plain member.
    pub fn new(offset: usize, ty: TypeCode) -> Self {
        Self {
            offset,
            ty,
            flags: MemberFlags::default(),
        }
    }

    /// Mark the member as key; keys are always must-understand.
    pub fn key(mut self) -> Self {
        self.flags.key = true;
        self.flags.must_understand = true;
        self
    }

    /// Mark the member as optional.
    pub fn optional(mut self) -> Self {
        self.flags.optional = true;
        self
    }

    /// Mark the member as must-understand.
    pub fn must_understand(mut self) -> Self {
        self.flags.must_understand = true;
        self
    }
}

/// Value type tag of an `ADR` instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeCode {
    /// Fixed-width scalar
    Primitive(PrimitiveType),
    /// Enumeration of `width` bytes (XCDR2) with ordinals `0..=max`
    Enum {
        /// Width in bytes: 1, 2 or 4
        width: u8,
        /// Largest valid ordinal
        max: u32,
    },
    /// Bitmask of `width` bytes; only bits in `valid` may be set
    Bitmask {
        /// Width in bytes: 1, 2, 4 or 8
        width: u8,
        /// Declared flag bits
        valid: u64,
    },
    /// String, optionally bounded to `bound` characters
    String {
        /// Maximum number of characters, excluding the terminator
        bound: Option<u32>,
    },
    /// Fixed-length array
    Array {
        /// Number of elements
        count: u32,
        /// Element shape
        element: Box<TypeCode>,
    },
    /// Variable-length sequence, optionally bounded
    Sequence {
        /// Maximum number of elements
        bound: Option<u32>,
        /// Element shape
        element: Box<TypeCode>,
    },
    /// Discriminated union
    Union {
        /// Discriminant shape: an integral primitive or enum of at most 4 bytes
        discriminant: Box<TypeCode>,
        /// Index of the first `JEQ` case entry
        cases: usize,
        /// Number of `JEQ` case entries
        count: u32,
    },
    /// Nested structure stored inline
    Struct {
        /// Index of the nested body
        body: usize,
    },
    /// Nested structure stored out of line
    External {
        /// Index of the nested body
        body: usize,
    },
}

impl TypeCode {
    /// Unbounded string.
    pub fn string() -> Self {
        TypeCode::String { bound: None }
    }

    /// String of at most `bound` characters.
    pub fn bounded_string(bound: u32) -> Self {
        TypeCode::String { bound: Some(bound) }
    }

    /// Unbounded sequence of `element`.
    pub fn sequence(element: TypeCode) -> Self {
        TypeCode::Sequence {
            bound: None,
            element: Box::new(element),
        }
    }

    /// Sequence of at most `bound` elements.
    pub fn bounded_sequence(bound: u32, element: TypeCode) -> Self {
        TypeCode::Sequence {
            bound: Some(bound),
            element: Box::new(element),
        }
    }

    /// Array of `count` elements.
    pub fn array(count: u32, element: TypeCode) -> Self {
        TypeCode::Array {
            count,
            element: Box::new(element),
        }
    }

    /// Union with the given discriminant and case table.
    pub fn union(discriminant: TypeCode, cases: usize, count: u32) -> Self {
        TypeCode::Union {
            discriminant: Box::new(discriminant),
            cases,
            count,
        }
    }

    /// Whether this is a primitive in the XTypes sense.
    ///
    /// Collections of non-primitive elements get a DHEADER under XCDR2.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeCode::Primitive(_) | TypeCode::Enum { .. } | TypeCode::Bitmask { .. }
        )
    }

    /// Encoded width of a primitive under `xcdr`, `None` for everything else.
    pub fn wire_width(&self, xcdr: XcdrVersion) -> Option<usize> {
        match self {
            TypeCode::Primitive(p) => Some(p.size()),
            TypeCode::Enum { width, .. } => Some(match xcdr {
                XcdrVersion::Xcdr1 => 4,
                XcdrVersion::Xcdr2 => usize::from(*width),
            }),
            TypeCode::Bitmask { width, .. } => Some(usize::from(*width)),
            _ => None,
        }
    }

    /// Nested body index of a structure reference.
    pub fn body(&self) -> Option<usize> {
        match self {
            TypeCode::Struct { body } | TypeCode::External { body } => Some(*body),
            _ => None,
        }
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            TypeCode::Primitive(_) => "primitive",
            TypeCode::Enum { .. } => "enum",
            TypeCode::Bitmask { .. } => "bitmask",
            TypeCode::String { .. } => "string",
            TypeCode::Array { .. } => "array",
            TypeCode::Sequence { .. } => "sequence",
            TypeCode::Union { .. } => "union",
            TypeCode::Struct { .. } => "struct",
            TypeCode::External { .. } => "external",
        }
    }
}

/// One `JEQ` entry of a union case table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Discriminant value selecting this case
    pub label: i64,
    /// Shape of the case value
    pub ty: TypeCode,
    /// Selected when no other label matches
    #[serde(default)]
    pub default: bool,
}

impl Case {
    /// Case selected by `label`.
    pub fn new(label: i64, ty: TypeCode) -> Self {
        Self {
            label,
            ty,
            default: false,
        }
    }

    /// Default case.
    pub fn default_case(label: i64, ty: TypeCode) -> Self {
        Self {
            label,
            ty,
            default: true,
        }
    }
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Member at a slot with a value type
    Adr(Adr),
    /// Run the body at `target` against the current record, then continue
    Jsr {
        /// Index of the inlined body
        target: usize,
    },
    /// End of the current body
    Rts,
    /// Union case entry
    Jeq(Case),
    /// Key path: `ADR` indices from the top-level member down to the key field
    Kof {
        /// `ADR` indices, outermost first
        path: Vec<usize>,
    },
    /// Appendable body marker (DHEADER)
    Dlc,
    /// Mutable body marker (DHEADER + member list)
    Plc,
    /// Mutable member entry
    Plm {
        /// Member id written in the EMHEADER
        id: u32,
        /// Index of the member sub-program, or of the base `Plc` body
        target: usize,
        /// `target` is an inherited member list
        #[serde(default)]
        base: bool,
    },
}

impl Op {
    /// Opcode mnemonic.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Adr(_) => "ADR",
            Op::Jsr { .. } => "JSR",
            Op::Rts => "RTS",
            Op::Jeq(_) => "JEQ",
            Op::Kof { .. } => "KOF",
            Op::Dlc => "DLC",
            Op::Plc => "PLC",
            Op::Plm { .. } => "PLM",
        }
    }
}
