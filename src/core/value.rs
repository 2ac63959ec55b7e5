// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Sample value model.
//!
//! A [`Value`] tree is the in-memory form of a record. A structure is a flat
//! table of member slots, and the `offset` operand of every `ADR` instruction
//! indexes into that table, so the interpreter never has to infer layout.
//! All variants are serde-serializable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// In-memory value of a record member.
///
/// # Memory Layout
///
/// - Structures hold their members positionally (`Struct(slots)`).
/// - Unions hold the discriminant and only the active case, so no storage
///   for an inactive case ever exists.
/// - `Null` marks an absent optional member. For strings and sequences it
///   is accepted on encode as the empty value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    // Boolean
    Bool(bool),

    // Signed integers
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),

    // Unsigned integers
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),

    // Floating point
    Float32(f32),
    Float64(f64),

    /// Enumerator ordinal
    Enum(u32),

    /// Bitmask flags
    Bitmask(u64),

    // String (UTF-8, no interior NUL)
    String(String),

    /// Fixed-length array
    Array(Vec<Value>),

    /// Variable-length sequence
    Sequence(Vec<Value>),

    /// Discriminated union holding only its active case
    Union {
        /// Discriminant value
        discriminant: i64,
        /// Active case, `None` when no case is selected
        value: Option<Box<Value>>,
    },

    /// Structure members by slot
    Struct(Vec<Value>),

    // Absent optional member
    Null,
}

impl Value {
    /// Build a union value with an active case.
    pub fn union(discriminant: i64, value: Value) -> Self {
        Value::Union {
            discriminant,
            value: Some(Box::new(value)),
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to convert this value to i64 (for integral values only).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(v) => Some(i64::from(*v)),
            Value::Int8(v) => Some(i64::from(*v)),
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::UInt8(v) => Some(i64::from(*v)),
            Value::UInt16(v) => Some(i64::from(*v)),
            Value::UInt32(v) => Some(i64::from(*v)),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            Value::Enum(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get structure members.
    pub fn as_struct(&self) -> Option<&[Value]> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Get the type name of this value as a string.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::UInt8(_) => "uint8",
            Value::UInt16(_) => "uint16",
            Value::UInt32(_) => "uint32",
            Value::UInt64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Enum(_) => "enum",
            Value::Bitmask(_) => "bitmask",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Sequence(_) => "sequence",
            Value::Union { .. } => "union",
            Value::Struct(_) => "struct",
            Value::Null => "null",
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    write!(f, "{{")?;
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(f, ",")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "}}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Enum(v) => write!(f, "{v}"),
            Value::Bitmask(v) => write!(f, "{v:#x}"),
            Value::String(v) => write!(f, "\"{v}\""),
            Value::Array(items) | Value::Sequence(items) | Value::Struct(items) => {
                write_list(f, items)
            }
            Value::Union {
                discriminant,
                value: Some(v),
            } => write!(f, "{discriminant}:{v}"),
            Value::Union {
                discriminant,
                value: None,
            } => write!(f, "{discriminant}:"),
            Value::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// Primitive Type Enum
// =============================================================================

/// Fixed-width scalar types carried by `ADR` instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    /// Boolean
    Bool,
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
}

impl PrimitiveType {
    /// Get the wire size in bytes.
    pub const fn size(self) -> usize {
        match self {
            PrimitiveType::Bool | PrimitiveType::Int8 | PrimitiveType::UInt8 => 1,
            PrimitiveType::Int16 | PrimitiveType::UInt16 => 2,
            PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::Float32 => 4,
            PrimitiveType::Int64 | PrimitiveType::UInt64 | PrimitiveType::Float64 => 8,
        }
    }

    /// Whether this type may serve as a union discriminant.
    pub const fn is_integral(self) -> bool {
        !matches!(self, PrimitiveType::Float32 | PrimitiveType::Float64)
    }

    /// Extract the raw bit pattern of `value`, zero-extended to 64 bits.
    ///
    /// Returns `None` when the value variant does not match this type.
    pub fn to_bits(self, value: &Value) -> Option<u64> {
        match (self, value) {
            (PrimitiveType::Bool, Value::Bool(v)) => Some(u64::from(*v)),
            (PrimitiveType::Int8, Value::Int8(v)) => Some(u64::from(*v as u8)),
            (PrimitiveType::UInt8, Value::UInt8(v)) => Some(u64::from(*v)),
            (PrimitiveType::Int16, Value::Int16(v)) => Some(u64::from(*v as u16)),
            (PrimitiveType::UInt16, Value::UInt16(v)) => Some(u64::from(*v)),
            (PrimitiveType::Int32, Value::Int32(v)) => Some(u64::from(*v as u32)),
            (PrimitiveType::UInt32, Value::UInt32(v)) => Some(u64::from(*v)),
            (PrimitiveType::Int64, Value::Int64(v)) => Some(*v as u64),
            (PrimitiveType::UInt64, Value::UInt64(v)) => Some(*v),
            (PrimitiveType::Float32, Value::Float32(v)) => Some(u64::from(v.to_bits())),
            (PrimitiveType::Float64, Value::Float64(v)) => Some(v.to_bits()),
            _ => None,
        }
    }

    /// Build a value from a raw bit pattern read off the wire.
    ///
    /// Only the low `size()` bytes of `bits` are meaningful.
    pub fn from_bits(self, bits: u64) -> Value {
        match self {
            PrimitiveType::Bool => Value::Bool(bits != 0),
            PrimitiveType::Int8 => Value::Int8(bits as u8 as i8),
            PrimitiveType::UInt8 => Value::UInt8(bits as u8),
            PrimitiveType::Int16 => Value::Int16(bits as u16 as i16),
            PrimitiveType::UInt16 => Value::UInt16(bits as u16),
            PrimitiveType::Int32 => Value::Int32(bits as u32 as i32),
            PrimitiveType::UInt32 => Value::UInt32(bits as u32),
            PrimitiveType::Int64 => Value::Int64(bits as i64),
            PrimitiveType::UInt64 => Value::UInt64(bits),
            PrimitiveType::Float32 => Value::Float32(f32::from_bits(bits as u32)),
            PrimitiveType::Float64 => Value::Float64(f64::from_bits(bits)),
        }
    }

    /// Zero value of this type.
    pub fn zero(self) -> Value {
        self.from_bits(0)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrimitiveType::Bool => write!(f, "bool"),
            PrimitiveType::Int8 => write!(f, "int8"),
            PrimitiveType::Int16 => write!(f, "int16"),
            PrimitiveType::Int32 => write!(f, "int32"),
            PrimitiveType::Int64 => write!(f, "int64"),
            PrimitiveType::UInt8 => write!(f, "uint8"),
            PrimitiveType::UInt16 => write!(f, "uint16"),
            PrimitiveType::UInt32 => write!(f, "uint32"),
            PrimitiveType::UInt64 => write!(f, "uint64"),
            PrimitiveType::Float32 => write!(f, "float32"),
            PrimitiveType::Float64 => write!(f, "float64"),
        }
    }
}
