// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Key projection tests: key-only samples, canonical keys and agreement
//! between keys computed from samples and keys extracted from data.

mod common;

use common::*;
use cdrstream::{
    Adr, CdrStreamCodec, Endianness, KeyField, KeyFormat, Op, PrimitiveType, TypeCode,
    TypeDescriptor, Value, XcdrVersion,
};

const FORMATS: [KeyFormat; 2] = [KeyFormat::Sample, KeyFormat::Canonical];

fn assert_keys_agree(codec: &CdrStreamCodec, sample: &Value, xcdr: XcdrVersion) {
    let data = codec.encode(sample, xcdr).expect("encode");
    let data_order = codec.options().endianness;
    for format in FORMATS {
        let from_sample = codec.extract_key_from_sample(sample, format).expect("key from sample");
        let from_data = codec
            .extract_key_from_data(&data, xcdr, data_order, format)
            .expect("key from data");
        assert_eq!(
            from_sample,
            from_data,
            "{} {xcdr:?} {data_order:?} {format:?}",
            codec.descriptor().name()
        );
    }
}

// ============================================================================
// Key-Only Sample Layout
// ============================================================================

#[test]
fn test_mutable_key_only_sample_bytes() {
    let codec = codec(keyed_mutable(KeyOrder::Declaration), Endianness::Little);
    let sample = keyed_mutable_sample(1, 2, 0x0807_0605_0403_0201);

    let mut expected = Vec::new();
    expected.extend_from_slice(&20u32.to_le_bytes());
    expected.extend_from_slice(&0x8000_0001u32.to_le_bytes());
    expected.extend_from_slice(&[1, 0, 0, 0]);
    expected.extend_from_slice(&0xB000_0003u32.to_le_bytes());
    expected.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

    assert_eq!(
        codec.extract_key_from_sample(&sample, KeyFormat::Sample).unwrap(),
        expected
    );
    let data = codec.encode(&sample, XcdrVersion::Xcdr2).unwrap();
    assert_eq!(&data[..4], &28u32.to_le_bytes());
    assert_eq!(
        codec
            .extract_key_from_data(&data, XcdrVersion::Xcdr2, Endianness::Little, KeyFormat::Sample)
            .unwrap(),
        expected
    );
}

#[test]
fn test_non_key_value_does_not_change_key() {
    let codec = codec(keyed_mutable(KeyOrder::Declaration), Endianness::Big);
    for format in FORMATS {
        let first = codec
            .extract_key_from_sample(&keyed_mutable_sample(4, 0, 99), format)
            .unwrap();
        let second = codec
            .extract_key_from_sample(&keyed_mutable_sample(4, 200, 99), format)
            .unwrap();
        assert_eq!(first, second);
    }
}

// ============================================================================
// Key Stability
// ============================================================================

#[test]
fn test_record_keys_agree_across_encodings() {
    for endianness in ORDERS {
        let codec = codec(record(), endianness);
        for xcdr in [XcdrVersion::Xcdr1, XcdrVersion::Xcdr2] {
            for choice in record_choices() {
                assert_keys_agree(&codec, &record_sample(-42, choice), xcdr);
            }
        }
    }
}

#[test]
fn test_key_independent_of_source_encoding() {
    let sample = record_sample(77, Value::union(2, Value::String("variant".into())));
    for format in FORMATS {
        let mut keys = Vec::new();
        for data_order in ORDERS {
            let writer = codec(record(), data_order);
            let reader = codec(record(), Endianness::Little);
            for xcdr in [XcdrVersion::Xcdr1, XcdrVersion::Xcdr2] {
                let data = writer.encode(&sample, xcdr).unwrap();
                keys.push(
                    reader
                        .extract_key_from_data(&data, xcdr, data_order, format)
                        .unwrap(),
                );
            }
        }
        assert!(keys.windows(2).all(|pair| pair[0] == pair[1]), "{format:?}");
    }
}

#[test]
fn test_nested_extensible_keys_agree() {
    for endianness in ORDERS {
        assert_keys_agree(
            &codec(appendable_in_mutable(), endianness),
            &appendable_in_mutable_sample(0xDEAD_BEEF, 12, "nested"),
            XcdrVersion::Xcdr2,
        );
        assert_keys_agree(
            &codec(mutable_in_appendable(), endianness),
            &mutable_in_appendable_sample(-9, 3.25, &[5; 17]),
            XcdrVersion::Xcdr2,
        );
        assert_keys_agree(
            &codec(keyed_mutable(KeyOrder::Reversed), endianness),
            &keyed_mutable_sample(0xAB, 0xCD, u64::MAX - 1),
            XcdrVersion::Xcdr2,
        );
    }
}

#[test]
fn test_mutable_in_appendable_key_layout() {
    let codec = codec(mutable_in_appendable(), Endianness::Big);
    let key = codec
        .extract_key_from_sample(&mutable_in_appendable_sample(-2, 1.0, &[1, 2]), KeyFormat::Sample)
        .unwrap();
    // Outer DHEADER, inner DHEADER, EMHEADER(k), k
    let mut expected = Vec::new();
    expected.extend_from_slice(&12u32.to_be_bytes());
    expected.extend_from_slice(&8u32.to_be_bytes());
    expected.extend_from_slice(&0xA000_0005u32.to_be_bytes());
    expected.extend_from_slice(&(-2i32).to_be_bytes());
    assert_eq!(key, expected);
}

// ============================================================================
// Canonical Keys
// ============================================================================

#[test]
fn test_canonical_key_follows_key_order() {
    let sample = keyed_mutable_sample(0x11, 0x22, 0x0102_0304_0506_0708);
    let declared = codec(keyed_mutable(KeyOrder::Declaration), Endianness::Little);
    let reversed = codec(keyed_mutable(KeyOrder::Reversed), Endianness::Little);
    assert_eq!(
        declared.extract_key_from_sample(&sample, KeyFormat::Canonical).unwrap(),
        vec![0x11, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8]
    );
    assert_eq!(
        reversed.extract_key_from_sample(&sample, KeyFormat::Canonical).unwrap(),
        vec![1, 2, 3, 4, 5, 6, 7, 8, 0x11, 0, 0, 0]
    );
    // The key-only sample keeps declaration order either way
    assert_eq!(
        declared.extract_key_from_sample(&sample, KeyFormat::Sample).unwrap(),
        reversed.extract_key_from_sample(&sample, KeyFormat::Sample).unwrap()
    );
}

#[test]
fn test_canonical_key_independent_of_declaration_order() {
    // final struct { @key u64 d; u32 pad; @key u8 a; } with keys ordered a, d
    let desc = TypeDescriptor::new(
        "Shuffled",
        vec![
            Op::Adr(Adr::new(0, prim(PrimitiveType::UInt64)).key()),
            Op::Adr(Adr::new(1, prim(PrimitiveType::UInt32))),
            Op::Adr(Adr::new(2, prim(PrimitiveType::UInt8)).key()),
            Op::Rts,
            Op::Kof { path: vec![2] },
            Op::Kof { path: vec![0] },
        ],
        vec![KeyField::new("a", 4, 0), KeyField::new("d", 5, 1)],
    )
    .unwrap();
    let shuffled = codec(desc, Endianness::Little);
    let declared = codec(keyed_mutable(KeyOrder::Declaration), Endianness::Big);

    let shuffled_sample = Value::Struct(vec![
        Value::UInt64(0x0102_0304_0506_0708),
        Value::UInt32(5),
        Value::UInt8(0x11),
    ]);
    let declared_sample = keyed_mutable_sample(0x11, 0x22, 0x0102_0304_0506_0708);
    assert_eq!(
        shuffled
            .extract_key_from_sample(&shuffled_sample, KeyFormat::Canonical)
            .unwrap(),
        declared
            .extract_key_from_sample(&declared_sample, KeyFormat::Canonical)
            .unwrap()
    );
}

#[test]
fn test_record_canonical_key_bytes() {
    let codec = codec(record(), Endianness::Little);
    let sample = record_sample(-42, Value::union(1, Value::Float64(1.0)));
    let mut expected = (-42i64).to_be_bytes().to_vec();
    expected.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0xFF, 0xFF]);
    assert_eq!(
        codec.extract_key_from_sample(&sample, KeyFormat::Canonical).unwrap(),
        expected
    );

    let data = codec.encode(&sample, XcdrVersion::Xcdr1).unwrap();
    assert_eq!(
        codec
            .extract_key_from_data(&data, XcdrVersion::Xcdr1, Endianness::Little, KeyFormat::Canonical)
            .unwrap(),
        expected
    );
}

#[test]
fn test_canonical_key_from_key_sample() {
    for endianness in ORDERS {
        let codec = codec(appendable_in_mutable(), endianness);
        let sample = appendable_in_mutable_sample(0x0A0B_0C0D, 1, "x");
        let key = codec.extract_key_from_sample(&sample, KeyFormat::Sample).unwrap();
        assert_eq!(
            codec.canonical_key_from_key(&key, endianness).unwrap(),
            vec![0x0A, 0x0B, 0x0C, 0x0D]
        );
    }
}

#[test]
fn test_keyless_type_has_empty_canonical_key() {
    // final struct { u32 value; }
    let desc = TypeDescriptor::new(
        "Keyless",
        vec![Op::Adr(Adr::new(0, prim(PrimitiveType::UInt32))), Op::Rts],
        vec![],
    )
    .unwrap();
    assert!(!desc.has_keys());
    let codec = codec(desc, Endianness::Little);
    let sample = Value::Struct(vec![Value::UInt32(7)]);

    assert!(codec
        .extract_key_from_sample(&sample, KeyFormat::Canonical)
        .unwrap()
        .is_empty());
    // No key members, so nothing of the payload is consulted
    assert!(codec
        .extract_key_from_data(&[0xFF; 3], XcdrVersion::Xcdr2, Endianness::Little, KeyFormat::Canonical)
        .unwrap()
        .is_empty());
}

// ============================================================================
// Early Exit
// ============================================================================

#[test]
fn test_key_extraction_stops_after_last_key() {
    // final struct { @key u32 id; string body; }
    let desc = TypeDescriptor::new(
        "Leading",
        vec![
            Op::Adr(Adr::new(0, prim(PrimitiveType::UInt32)).key()),
            Op::Adr(Adr::new(1, TypeCode::string())),
            Op::Rts,
            Op::Kof { path: vec![0] },
        ],
        vec![KeyField::new("id", 3, 0)],
    )
    .unwrap();
    let codec = codec(desc, Endianness::Big);
    let sample = Value::Struct(vec![Value::UInt32(3), Value::String("a long trailing body".into())]);
    let data = codec.encode(&sample, XcdrVersion::Xcdr1).unwrap();
    let head = &data[..4];

    assert!(codec
        .decode(head, XcdrVersion::Xcdr1, Endianness::Big)
        .is_err());
    assert_eq!(
        codec
            .extract_key_from_data(head, XcdrVersion::Xcdr1, Endianness::Big, KeyFormat::Sample)
            .unwrap(),
        vec![0, 0, 0, 3]
    );
}

#[test]
fn test_key_extraction_skips_unknown_mutable_member() {
    let codec = codec(keyed_mutable(KeyOrder::Declaration), Endianness::Little);
    let sample = keyed_mutable_sample(1, 2, 3);
    let expected = codec.extract_key_from_sample(&sample, KeyFormat::Sample).unwrap();

    // Prepend an unknown optional member with a NEXTINT length
    let data = codec.encode(&sample, XcdrVersion::Xcdr2).unwrap();
    let mut patched = Vec::new();
    patched.extend_from_slice(&(28u32 + 12).to_le_bytes());
    patched.extend_from_slice(&0x4000_0040u32.to_le_bytes());
    patched.extend_from_slice(&4u32.to_le_bytes());
    patched.extend_from_slice(&[0xEE; 4]);
    patched.extend_from_slice(&data[4..]);

    assert_eq!(
        codec
            .extract_key_from_data(&patched, XcdrVersion::Xcdr2, Endianness::Little, KeyFormat::Sample)
            .unwrap(),
        expected
    );
    assert_eq!(
        codec.decode(&patched, XcdrVersion::Xcdr2, Endianness::Little).unwrap(),
        sample
    );
}
