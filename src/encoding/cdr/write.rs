// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Encode interpreter.
//!
//! Walks the instruction stream against a sample and drives a [`CdrSink`].
//! The same walk produces full samples, key-only samples (members without a
//! key role are left out) and the unframed canonical key layout.

use super::descriptor::{KeyRole, TypeDescriptor};
use super::encoder::CdrSink;
use super::framing::{begin_delimited, begin_member, end_delimited, end_member};
use super::ops::{Adr, Op, TypeCode};
use crate::core::{CodecError, Result as CoreResult, Value, XcdrVersion};

/// Whether aggregates get their extensibility headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// DHEADER/EMHEADER per XCDR2 rules
    Xtypes,
    /// Members back to back, used for canonical keys
    Flat,
}

/// Must-understand flag written for a mutable member.
pub(crate) fn must_understand(adr: &Adr, role: KeyRole) -> bool {
    adr.flags.must_understand || adr.flags.key || role != KeyRole::None
}

fn mismatch(ty: &TypeCode, found: &Value) -> CodecError {
    let expected = match ty {
        TypeCode::Primitive(p) => p.to_string(),
        other => other.name().to_string(),
    };
    CodecError::sample_mismatch(expected, found.type_name())
}

pub(crate) struct Writer<'d, 's, S: CdrSink> {
    desc: &'d TypeDescriptor,
    sink: &'s mut S,
    framing: Framing,
    max_depth: usize,
    depth: usize,
}

impl<'d, 's, S: CdrSink> Writer<'d, 's, S> {
    pub(crate) fn new(desc: &'d TypeDescriptor, sink: &'s mut S, max_depth: usize) -> Self {
        Self {
            desc,
            sink,
            framing: Framing::Xtypes,
            max_depth,
            depth: 0,
        }
    }

    pub(crate) fn flat(mut self) -> Self {
        self.framing = Framing::Flat;
        self
    }

    fn xcdr2_framing(&self) -> bool {
        self.framing == Framing::Xtypes && self.sink.xcdr() == XcdrVersion::Xcdr2
    }

    /// Write a top-level sample, or only its key members.
    pub(crate) fn write_sample(&mut self, sample: &Value, keys_only: bool) -> CoreResult<()> {
        let fields = sample
            .as_struct()
            .ok_or_else(|| CodecError::sample_mismatch("struct", sample.type_name()))?;
        self.write_struct(0, fields, keys_only)
    }

    pub(crate) fn write_struct(
        &mut self,
        body: usize,
        fields: &[Value],
        keys_only: bool,
    ) -> CoreResult<()> {
        if self.depth >= self.max_depth {
            return Err(CodecError::limit_exceeded("max_depth", self.max_depth));
        }
        self.depth += 1;
        let result = self.write_struct_body(body, fields, keys_only);
        self.depth -= 1;
        result
    }

    fn write_struct_body(&mut self, body: usize, fields: &[Value], keys_only: bool) -> CoreResult<()> {
        let desc = self.desc;
        match desc.op(body) {
            Op::Plc | Op::Dlc
                if self.framing == Framing::Xtypes && self.sink.xcdr() == XcdrVersion::Xcdr1 =>
            {
                Err(CodecError::unsupported(format!(
                    "extensible type '{}' in XCDR1",
                    desc.name()
                )))
            }
            Op::Plc => {
                if self.framing == Framing::Flat {
                    for &pc in desc.body_members(body) {
                        self.write_member(pc, fields, keys_only)?;
                    }
                    return Ok(());
                }
                let at = begin_delimited(&mut *self.sink);
                self.write_pl_members(body, fields, keys_only)?;
                end_delimited(&mut *self.sink, at)
            }
            Op::Dlc => {
                if self.framing == Framing::Flat {
                    return self.write_members(body + 1, fields, keys_only);
                }
                let at = begin_delimited(&mut *self.sink);
                self.write_members(body + 1, fields, keys_only)?;
                end_delimited(&mut *self.sink, at)
            }
            _ => self.write_members(body, fields, keys_only),
        }
    }

    fn write_members(&mut self, mut pc: usize, fields: &[Value], keys_only: bool) -> CoreResult<()> {
        let desc = self.desc;
        loop {
            match desc.op(pc) {
                Op::Adr(_) => self.write_member(pc, fields, keys_only)?,
                Op::Jsr { target } => self.write_members(*target, fields, keys_only)?,
                Op::Rts => return Ok(()),
                other => unreachable!("{} in structure body at op {pc}", other.name()),
            }
            pc += 1;
        }
    }

    fn field<'v>(&self, fields: &'v [Value], adr: &Adr) -> CoreResult<&'v Value> {
        fields.get(adr.offset).ok_or_else(|| {
            CodecError::sample_mismatch(
                format!("struct with member slot {}", adr.offset),
                format!("struct with {} slots", fields.len()),
            )
        })
    }

    /// Member of a final or appendable body.
    fn write_member(&mut self, pc: usize, fields: &[Value], keys_only: bool) -> CoreResult<()> {
        let desc = self.desc;
        let adr = desc.adr(pc);
        let role = desc.key_role(pc);
        if keys_only && role == KeyRole::None {
            return Ok(());
        }
        let value = self.field(fields, adr)?;
        let nested_keys = keys_only && role == KeyRole::Path;
        if adr.flags.optional && self.framing == Framing::Xtypes {
            if value.is_null() {
                self.sink.put_u8(0);
                return Ok(());
            }
            self.sink.put_u8(1);
        }
        self.write_value(&adr.ty, value, nested_keys)
    }

    fn write_pl_members(&mut self, plc: usize, fields: &[Value], keys_only: bool) -> CoreResult<()> {
        let desc = self.desc;
        let mut pc = plc + 1;
        while let Op::Plm { id, target, base } = desc.op(pc) {
            if *base {
                self.write_pl_members(*target, fields, keys_only)?;
            } else {
                let adr = desc.adr(*target);
                let role = desc.key_role(*target);
                let value = self.field(fields, adr)?;
                if (keys_only && role == KeyRole::None) || (adr.flags.optional && value.is_null()) {
                    pc += 1;
                    continue;
                }
                let width = adr.ty.wire_width(XcdrVersion::Xcdr2);
                let open = begin_member(&mut *self.sink, *id, must_understand(adr, role), width);
                self.write_value(&adr.ty, value, keys_only && role == KeyRole::Path)?;
                end_member(&mut *self.sink, open)?;
            }
            pc += 1;
        }
        Ok(())
    }

    pub(crate) fn write_value(&mut self, ty: &TypeCode, value: &Value, keys_only: bool) -> CoreResult<()> {
        let desc = self.desc;
        match ty {
            TypeCode::Primitive(p) => {
                let bits = p.to_bits(value).ok_or_else(|| mismatch(ty, value))?;
                self.sink.put_scalar(p.size(), bits);
            }
            TypeCode::Enum { max, .. } => match value {
                Value::Enum(ordinal) if ordinal <= max => {
                    let width = ty.wire_width(self.sink.xcdr()).unwrap_or(4);
                    self.sink.put_scalar(width, u64::from(*ordinal));
                }
                Value::Enum(ordinal) => {
                    return Err(CodecError::sample_mismatch(
                        format!("enum ordinal <= {max}"),
                        ordinal.to_string(),
                    ))
                }
                _ => return Err(mismatch(ty, value)),
            },
            TypeCode::Bitmask { width, valid } => match value {
                Value::Bitmask(bits) if bits & !valid == 0 => {
                    self.sink.put_scalar(usize::from(*width), *bits);
                }
                Value::Bitmask(bits) => {
                    return Err(CodecError::sample_mismatch(
                        format!("bitmask within {valid:#x}"),
                        format!("{bits:#x}"),
                    ))
                }
                _ => return Err(mismatch(ty, value)),
            },
            TypeCode::String { bound } => {
                let text = match value {
                    Value::String(s) => s.as_str(),
                    Value::Null => "",
                    _ => return Err(mismatch(ty, value)),
                };
                self.write_string(text, *bound)?;
            }
            TypeCode::Array { count, element } => {
                let items = match value {
                    Value::Array(items) => items,
                    _ => return Err(mismatch(ty, value)),
                };
                if items.len() != *count as usize {
                    return Err(CodecError::sample_mismatch(
                        format!("array of {count} elements"),
                        format!("{} elements", items.len()),
                    ));
                }
                self.write_collection(element, items, None)?;
            }
            TypeCode::Sequence { bound, element } => {
                let items: &[Value] = match value {
                    Value::Sequence(items) => items,
                    Value::Null => &[],
                    _ => return Err(mismatch(ty, value)),
                };
                if let Some(bound) = bound {
                    if items.len() > *bound as usize {
                        return Err(CodecError::sample_mismatch(
                            format!("sequence of at most {bound} elements"),
                            format!("{} elements", items.len()),
                        ));
                    }
                }
                let count = u32::try_from(items.len())
                    .map_err(|_| CodecError::limit_exceeded("sequence length", u32::MAX as usize))?;
                self.write_collection(element, items, Some(count))?;
            }
            TypeCode::Union {
                discriminant,
                cases,
                count,
            } => {
                let (label, active) = match value {
                    Value::Union {
                        discriminant,
                        value,
                    } => (*discriminant, value),
                    _ => return Err(mismatch(ty, value)),
                };
                self.write_discriminant(discriminant, label)?;
                match desc.find_case(*cases, *count, label) {
                    Some(case) => {
                        let inner = active.as_deref().ok_or_else(|| {
                            CodecError::sample_mismatch(
                                format!("value for union case {label}"),
                                "no value",
                            )
                        })?;
                        self.write_value(&case.ty, inner, false)?;
                    }
                    // Only the discriminant goes on the wire
                    None => {
                        if let Some(inner) = active.as_deref() {
                            return Err(CodecError::sample_mismatch(
                                format!("no value for unmatched discriminant {label}"),
                                inner.type_name(),
                            ));
                        }
                    }
                }
            }
            TypeCode::Struct { body } | TypeCode::External { body } => {
                let fields = value.as_struct().ok_or_else(|| mismatch(ty, value))?;
                self.write_struct(*body, fields, keys_only)?;
            }
        }
        Ok(())
    }

    fn write_string(&mut self, text: &str, bound: Option<u32>) -> CoreResult<()> {
        if text.as_bytes().contains(&0) {
            return Err(CodecError::sample_mismatch(
                "string without NUL",
                "string with embedded NUL",
            ));
        }
        if let Some(bound) = bound {
            if text.len() > bound as usize {
                return Err(CodecError::sample_mismatch(
                    format!("string of at most {bound} bytes"),
                    format!("{} bytes", text.len()),
                ));
            }
        }
        let len = u32::try_from(text.len() + 1)
            .map_err(|_| CodecError::limit_exceeded("string length", u32::MAX as usize))?;
        self.sink.put_u32(len);
        self.sink.put_bytes(text.as_bytes());
        self.sink.put_u8(0);
        Ok(())
    }

    fn write_discriminant(&mut self, ty: &TypeCode, label: i64) -> CoreResult<()> {
        let bits = match ty {
            TypeCode::Primitive(p) => {
                let bits = label as u64;
                if p.from_bits(bits).as_i64() != Some(label) {
                    return Err(CodecError::sample_mismatch(
                        format!("{p} discriminant"),
                        label.to_string(),
                    ));
                }
                bits
            }
            TypeCode::Enum { max, .. } => match u32::try_from(label) {
                Ok(ordinal) if ordinal <= *max => u64::from(ordinal),
                _ => {
                    return Err(CodecError::sample_mismatch(
                        format!("enum discriminant <= {max}"),
                        label.to_string(),
                    ))
                }
            },
            other => unreachable!("{} discriminant in a verified program", other.name()),
        };
        let width = ty.wire_width(self.sink.xcdr()).unwrap_or(4);
        self.sink.put_scalar(width, bits);
        Ok(())
    }

    /// Array or sequence body, with the DHEADER for non-primitive elements.
    fn write_collection(
        &mut self,
        element: &TypeCode,
        items: &[Value],
        count: Option<u32>,
    ) -> CoreResult<()> {
        let delimited = self.xcdr2_framing() && !element.is_primitive();
        let at = delimited.then(|| begin_delimited(&mut *self.sink));
        if let Some(count) = count {
            self.sink.put_u32(count);
        }
        for item in items {
            self.write_value(element, item, false)?;
        }
        match at {
            Some(at) => end_delimited(&mut *self.sink, at),
            None => Ok(()),
        }
    }
}
