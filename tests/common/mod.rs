// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Common fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use cdrstream::{
    Adr, Case, CdrStreamCodec, CodecOptions, Endianness, KeyField, Op, PrimitiveType, TypeCode,
    TypeDescriptor, Value,
};

// ============================================================================
// Builders
// ============================================================================

pub fn prim(p: PrimitiveType) -> TypeCode {
    TypeCode::Primitive(p)
}

pub fn plm(id: u32, target: usize) -> Op {
    Op::Plm {
        id,
        target,
        base: false,
    }
}

pub fn codec(desc: TypeDescriptor, endianness: Endianness) -> CdrStreamCodec {
    CdrStreamCodec::new(
        Arc::new(desc),
        CodecOptions::default().with_endianness(endianness),
    )
    .expect("valid options")
}

pub const ORDERS: [Endianness; 2] = [Endianness::Little, Endianness::Big];

// ============================================================================
// Fixture Types
// ============================================================================

/// Key ordering for [`keyed_mutable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrder {
    /// `a` then `d`
    Declaration,
    /// `d` then `a`
    Reversed,
}

/// `@mutable struct { @key u8 a; u8 b; @key u64 d; }` with member ids 1, 2, 3.
pub fn keyed_mutable(order: KeyOrder) -> TypeDescriptor {
    let keys = match order {
        KeyOrder::Declaration => vec![KeyField::new("a", 11, 0), KeyField::new("d", 12, 1)],
        KeyOrder::Reversed => vec![KeyField::new("a", 11, 1), KeyField::new("d", 12, 0)],
    };
    TypeDescriptor::new(
        "KeyedMutable",
        vec![
            Op::Plc,
            plm(1, 5),
            plm(2, 7),
            plm(3, 9),
            Op::Rts,
            Op::Adr(Adr::new(0, prim(PrimitiveType::UInt8)).key()),
            Op::Rts,
            Op::Adr(Adr::new(1, prim(PrimitiveType::UInt8))),
            Op::Rts,
            Op::Adr(Adr::new(2, prim(PrimitiveType::UInt64)).key()),
            Op::Rts,
            Op::Kof { path: vec![5] },
            Op::Kof { path: vec![9] },
        ],
        keys,
    )
    .expect("valid program")
}

pub fn keyed_mutable_sample(a: u8, b: u8, d: u64) -> Value {
    Value::Struct(vec![Value::UInt8(a), Value::UInt8(b), Value::UInt64(d)])
}

/// `@mutable struct Outer { @key u32 id; Inner inner; }`
/// `@appendable struct Inner { u16 x; string s; }`
pub fn appendable_in_mutable() -> TypeDescriptor {
    TypeDescriptor::new(
        "AppendableInMutable",
        vec![
            Op::Plc,
            plm(1, 4),
            plm(2, 6),
            Op::Rts,
            Op::Adr(Adr::new(0, prim(PrimitiveType::UInt32)).key()),
            Op::Rts,
            Op::Adr(Adr::new(1, TypeCode::Struct { body: 8 })),
            Op::Rts,
            Op::Dlc,
            Op::Adr(Adr::new(0, prim(PrimitiveType::UInt16))),
            Op::Adr(Adr::new(1, TypeCode::string())),
            Op::Rts,
            Op::Kof { path: vec![4] },
        ],
        vec![KeyField::new("id", 12, 0)],
    )
    .expect("valid program")
}

pub fn appendable_in_mutable_sample(id: u32, x: u16, s: &str) -> Value {
    Value::Struct(vec![
        Value::UInt32(id),
        Value::Struct(vec![Value::UInt16(x), Value::String(s.into())]),
    ])
}

/// `@appendable struct Outer { @key Inner inner; sequence<u8> blob; }`
/// `@mutable struct Inner { @key i32 k; f32 v; }` with member ids 5, 6.
pub fn mutable_in_appendable() -> TypeDescriptor {
    TypeDescriptor::new(
        "MutableInAppendable",
        vec![
            Op::Dlc,
            Op::Adr(Adr::new(0, TypeCode::Struct { body: 4 }).key()),
            Op::Adr(Adr::new(1, TypeCode::sequence(prim(PrimitiveType::UInt8)))),
            Op::Rts,
            Op::Plc,
            plm(5, 8),
            plm(6, 10),
            Op::Rts,
            Op::Adr(Adr::new(0, prim(PrimitiveType::Int32)).key()),
            Op::Rts,
            Op::Adr(Adr::new(1, prim(PrimitiveType::Float32))),
            Op::Rts,
            Op::Kof { path: vec![1, 8] },
        ],
        vec![KeyField::new("inner.k", 12, 0)],
    )
    .expect("valid program")
}

pub fn mutable_in_appendable_sample(k: i32, v: f32, blob: &[u8]) -> Value {
    Value::Struct(vec![
        Value::Struct(vec![Value::Int32(k), Value::Float32(v)]),
        Value::Sequence(blob.iter().map(|&b| Value::UInt8(b)).collect()),
    ])
}

/// Final type covering every shape encodable in XCDR1:
///
/// ```text
/// struct Record {
///     @key u16 tag[4];
///     string name;
///     string<8> label;
///     sequence<i64, 4> values;
///     sequence<string> notes;
///     union switch (i32) { case 1: f64; case 2: string; default: u8; } choice;
///     enum16 { 0..=3 } mode;
///     @key i64 serial;
///     bool flag;
///     Point point;   // struct Point { f32 x; f32 y; }
/// };
/// ```
///
/// Keys in order `serial`, `tag`.
pub fn record() -> TypeDescriptor {
    TypeDescriptor::new(
        "Record",
        vec![
            Op::Adr(Adr::new(0, TypeCode::array(4, prim(PrimitiveType::UInt16))).key()),
            Op::Adr(Adr::new(1, TypeCode::string())),
            Op::Adr(Adr::new(2, TypeCode::bounded_string(8))),
            Op::Adr(Adr::new(3, TypeCode::bounded_sequence(4, prim(PrimitiveType::Int64)))),
            Op::Adr(Adr::new(4, TypeCode::sequence(TypeCode::string()))),
            Op::Adr(Adr::new(5, TypeCode::union(prim(PrimitiveType::Int32), 14, 3))),
            Op::Adr(Adr::new(6, TypeCode::Enum { width: 2, max: 3 })),
            Op::Adr(Adr::new(7, prim(PrimitiveType::Int64)).key()),
            Op::Adr(Adr::new(8, prim(PrimitiveType::Bool))),
            Op::Adr(Adr::new(9, TypeCode::Struct { body: 11 })),
            Op::Rts,
            Op::Adr(Adr::new(0, prim(PrimitiveType::Float32))),
            Op::Adr(Adr::new(1, prim(PrimitiveType::Float32))),
            Op::Rts,
            Op::Jeq(Case::new(1, prim(PrimitiveType::Float64))),
            Op::Jeq(Case::new(2, TypeCode::string())),
            Op::Jeq(Case::default_case(0, prim(PrimitiveType::UInt8))),
            Op::Kof { path: vec![7] },
            Op::Kof { path: vec![0] },
        ],
        vec![KeyField::new("serial", 17, 0), KeyField::new("tag", 18, 1)],
    )
    .expect("valid program")
}

pub fn record_sample(serial: i64, choice: Value) -> Value {
    Value::Struct(vec![
        Value::Array(vec![
            Value::UInt16(0x0102),
            Value::UInt16(0x0304),
            Value::UInt16(0),
            Value::UInt16(0xFFFF),
        ]),
        Value::String("record".into()),
        Value::String("lbl".into()),
        Value::Sequence(vec![Value::Int64(-1), Value::Int64(i64::MAX)]),
        Value::Sequence(vec![Value::String("n1".into()), Value::String(String::new())]),
        choice,
        Value::Enum(2),
        Value::Int64(serial),
        Value::Bool(true),
        Value::Struct(vec![Value::Float32(1.5), Value::Float32(-0.25)]),
    ])
}

/// Union values exercising every case of [`record`].
pub fn record_choices() -> Vec<Value> {
    vec![
        Value::union(1, Value::Float64(2.5)),
        Value::union(2, Value::String("text".into())),
        Value::union(7, Value::UInt8(9)),
    ]
}
