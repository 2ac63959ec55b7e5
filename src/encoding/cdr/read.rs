// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Decode interpreter.
//!
//! Walks the instruction stream against untrusted input. Every length on the
//! wire is checked against the cursor limit before it is used, and nested
//! frames narrow the limit, so malformed input ends in an error and never in
//! an out-of-bounds read. With `keep` unset the walk only validates and
//! skips, which is how non-key members are consumed during key extraction.

use byteorder::ByteOrder;
use tracing::warn;

use super::cursor::CdrCursor;
use super::descriptor::{Extensibility, KeyRole, TypeDescriptor};
use super::framing::{read_delimited, read_member};
use super::ops::{Adr, Op, TypeCode};
use crate::core::{CodecError, CodecOptions, PrimitiveType, Result as CoreResult, Value, XcdrVersion};

pub(crate) struct Reader<'d, 'a, B: ByteOrder> {
    desc: &'d TypeDescriptor,
    pub(crate) cursor: CdrCursor<'a, B>,
    max_depth: usize,
    max_collection_len: usize,
    depth: usize,
}

impl<'d, 'a, B: ByteOrder> Reader<'d, 'a, B> {
    pub(crate) fn new(
        desc: &'d TypeDescriptor,
        cursor: CdrCursor<'a, B>,
        options: &CodecOptions,
    ) -> Self {
        Self {
            desc,
            cursor,
            max_depth: options.max_depth,
            max_collection_len: options.max_collection_len,
            depth: 0,
        }
    }

    /// Decode the top-level type. With `keys_only`, the input is a key-only
    /// sample and non-key members take their defaults.
    pub(crate) fn read_sample(&mut self, keys_only: bool) -> CoreResult<Value> {
        self.read_struct(0, keys_only, true)
    }

    /// Validate the top-level type without building a sample.
    pub(crate) fn skip_sample(&mut self) -> CoreResult<()> {
        self.read_struct(0, false, false).map(|_| ())
    }

    pub(crate) fn enter(&mut self) -> CoreResult<()> {
        if self.depth >= self.max_depth {
            return Err(CodecError::limit_exceeded("max_depth", self.max_depth));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth -= 1;
    }

    pub(crate) fn read_struct(&mut self, body: usize, keys_only: bool, keep: bool) -> CoreResult<Value> {
        self.enter()?;
        let result = self.read_struct_body(body, keys_only, keep);
        self.leave();
        result
    }

    fn read_struct_body(&mut self, body: usize, keys_only: bool, keep: bool) -> CoreResult<Value> {
        let desc = self.desc;
        let ext = desc.body_extensibility(body);
        if ext != Extensibility::Final && self.cursor.xcdr() == XcdrVersion::Xcdr1 {
            return Err(CodecError::unsupported(format!(
                "extensible type '{}' in XCDR1",
                desc.name()
            )));
        }

        let mut fields: Vec<Option<Value>> = if keep {
            vec![None; desc.slot_count(body)]
        } else {
            Vec::new()
        };

        match ext {
            Extensibility::Final => self.read_members(body, &mut fields, keys_only, keep, false)?,
            Extensibility::Appendable => {
                let end = read_delimited(&mut self.cursor)?;
                let saved = self.cursor.narrow(end)?;
                self.read_members(body + 1, &mut fields, keys_only, keep, true)?;
                self.cursor.restore_limit(saved);
                self.cursor.seek(end)?;
            }
            Extensibility::Mutable => self.read_pl_members(body, &mut fields, keys_only, keep)?,
        }

        if !keep {
            return Ok(Value::Null);
        }
        for &pc in desc.body_members(body) {
            let adr = desc.adr(pc);
            if fields[adr.offset].is_none() && !adr.flags.optional {
                fields[adr.offset] = Some(desc.default_value(&adr.ty));
            }
        }
        Ok(Value::Struct(
            fields.into_iter().map(|f| f.unwrap_or(Value::Null)).collect(),
        ))
    }

    /// Members of a final or appendable body. An appendable body may end
    /// early; the remaining members keep their defaults.
    fn read_members(
        &mut self,
        mut pc: usize,
        fields: &mut [Option<Value>],
        keys_only: bool,
        keep: bool,
        appendable: bool,
    ) -> CoreResult<()> {
        let desc = self.desc;
        loop {
            match desc.op(pc) {
                Op::Adr(adr) => {
                    if appendable && self.cursor.is_at_end() {
                        return Ok(());
                    }
                    let role = desc.key_role(pc);
                    if !(keys_only && role == KeyRole::None) {
                        let value = self.read_member(adr, keys_only && role == KeyRole::Path, keep)?;
                        if keep {
                            fields[adr.offset] = Some(value);
                        }
                    }
                }
                Op::Jsr { target } => {
                    self.read_members(*target, fields, keys_only, keep, appendable)?
                }
                Op::Rts => return Ok(()),
                other => unreachable!("{} in structure body at op {pc}", other.name()),
            }
            pc += 1;
        }
    }

    pub(crate) fn read_member(&mut self, adr: &Adr, keys_only: bool, keep: bool) -> CoreResult<Value> {
        if adr.flags.optional {
            let position = self.cursor.position();
            match self.cursor.read_u8()? {
                0 => return Ok(Value::Null),
                1 => {}
                flag => {
                    return Err(CodecError::invalid_data(
                        position,
                        format!("optional presence flag {flag}"),
                    ))
                }
            }
        }
        self.read_value(&adr.ty, keys_only, keep)
    }

    fn read_pl_members(
        &mut self,
        plc: usize,
        fields: &mut [Option<Value>],
        keys_only: bool,
        keep: bool,
    ) -> CoreResult<()> {
        let desc = self.desc;
        let end = read_delimited(&mut self.cursor)?;
        let saved = self.cursor.narrow(end)?;
        while align_up(self.cursor.position(), 4) < end {
            let extent = read_member(&mut self.cursor)?;
            match desc.find_member(plc, extent.header.id) {
                Some(pc) if !keys_only || desc.key_role(pc) != KeyRole::None => {
                    let adr = desc.adr(pc);
                    let nested_keys = keys_only && desc.key_role(pc) == KeyRole::Path;
                    let outer = self.cursor.narrow(extent.end)?;
                    let value = self.read_value(&adr.ty, nested_keys, keep)?;
                    self.cursor.restore_limit(outer);
                    self.cursor.seek(extent.end)?;
                    if keep {
                        fields[adr.offset] = Some(value);
                    }
                }
                Some(_) => self.cursor.seek(extent.end)?,
                None => {
                    if extent.header.must_understand {
                        return Err(CodecError::invalid_data(
                            extent.start,
                            format!(
                                "unknown must-understand member id {}",
                                extent.header.id
                            ),
                        ));
                    }
                    warn!(
                        context = "cdr_decode",
                        type_name = desc.name(),
                        member_id = extent.header.id,
                        "Skipping unknown mutable member"
                    );
                    self.cursor.seek(extent.end)?;
                }
            }
        }
        self.cursor.restore_limit(saved);
        self.cursor.seek(end)
    }

    pub(crate) fn read_value(&mut self, ty: &TypeCode, keys_only: bool, keep: bool) -> CoreResult<Value> {
        let desc = self.desc;
        let xcdr = self.cursor.xcdr();
        let value = match ty {
            TypeCode::Primitive(p) => {
                let position = self.cursor.position();
                let bits = self.cursor.read_scalar(p.size())?;
                if *p == PrimitiveType::Bool && bits > 1 {
                    return Err(CodecError::invalid_data(position, format!("boolean value {bits}")));
                }
                p.from_bits(bits)
            }
            TypeCode::Enum { max, .. } => {
                let position = self.cursor.position();
                let bits = self.cursor.read_scalar(ty.wire_width(xcdr).unwrap_or(4))?;
                if bits > u64::from(*max) {
                    return Err(CodecError::invalid_data(
                        position,
                        format!("enum ordinal {bits} exceeds {max}"),
                    ));
                }
                Value::Enum(bits as u32)
            }
            TypeCode::Bitmask { width, valid } => {
                let position = self.cursor.position();
                let bits = self.cursor.read_scalar(usize::from(*width))?;
                if bits & !valid != 0 {
                    return Err(CodecError::invalid_data(
                        position,
                        format!("bitmask {bits:#x} has undeclared bits"),
                    ));
                }
                Value::Bitmask(bits)
            }
            TypeCode::String { bound } => self.read_string(*bound, keep)?,
            TypeCode::Array { count, element } => {
                let items = self.read_collection(element, Some(*count as usize), None, keep)?;
                if !keep {
                    return Ok(Value::Null);
                }
                Value::Array(items)
            }
            TypeCode::Sequence { bound, element } => {
                let items = self.read_collection(element, None, *bound, keep)?;
                if !keep {
                    return Ok(Value::Null);
                }
                Value::Sequence(items)
            }
            TypeCode::Union {
                discriminant,
                cases,
                count,
            } => {
                let label = self.read_discriminant(discriminant)?;
                let active = match desc.find_case(*cases, *count, label) {
                    Some(case) => Some(Box::new(self.read_value(&case.ty, false, keep)?)),
                    None => None,
                };
                Value::Union {
                    discriminant: label,
                    value: active,
                }
            }
            TypeCode::Struct { body } | TypeCode::External { body } => {
                return self.read_struct(*body, keys_only, keep)
            }
        };
        Ok(if keep { value } else { Value::Null })
    }

    fn read_string(&mut self, bound: Option<u32>, keep: bool) -> CoreResult<Value> {
        let position = self.cursor.position();
        let len = self.cursor.read_length()?;
        if len == 0 {
            return Err(CodecError::invalid_data(position, "string length 0 has no terminator"));
        }
        if let Some(bound) = bound {
            if len - 1 > bound as usize {
                return Err(CodecError::invalid_data(
                    position,
                    format!("string of {} bytes exceeds bound {bound}", len - 1),
                ));
            }
        }
        let bytes = self.cursor.read_bytes(len)?;
        let (text, terminator) = bytes.split_at(len - 1);
        if terminator[0] != 0 {
            return Err(CodecError::invalid_data(position, "string is not NUL-terminated"));
        }
        let text = std::str::from_utf8(text)
            .map_err(|e| CodecError::invalid_data(position, format!("string is not UTF-8: {e}")))?;
        Ok(if keep {
            Value::String(text.to_string())
        } else {
            Value::Null
        })
    }

    pub(crate) fn read_discriminant(&mut self, ty: &TypeCode) -> CoreResult<i64> {
        let position = self.cursor.position();
        match ty {
            TypeCode::Primitive(p) => {
                let bits = self.cursor.read_scalar(p.size())?;
                if *p == PrimitiveType::Bool && bits > 1 {
                    return Err(CodecError::invalid_data(position, format!("boolean value {bits}")));
                }
                p.from_bits(bits)
                    .as_i64()
                    .ok_or_else(|| CodecError::invalid_data(position, "discriminant out of range"))
            }
            TypeCode::Enum { max, .. } => {
                let bits = self
                    .cursor
                    .read_scalar(ty.wire_width(self.cursor.xcdr()).unwrap_or(4))?;
                if bits > u64::from(*max) {
                    return Err(CodecError::invalid_data(
                        position,
                        format!("enum discriminant {bits} exceeds {max}"),
                    ));
                }
                Ok(bits as i64)
            }
            other => unreachable!("{} discriminant in a verified program", other.name()),
        }
    }

    /// Reject element counts the remaining input cannot possibly hold.
    pub(crate) fn check_count(&self, element: &TypeCode, count: usize) -> CoreResult<()> {
        if count > self.max_collection_len {
            return Err(CodecError::limit_exceeded(
                "max_collection_len",
                self.max_collection_len,
            ));
        }
        let min = self.desc.min_wire_size(element, self.cursor.xcdr()).max(1);
        match count.checked_mul(min) {
            Some(needed) if needed <= self.cursor.remaining() => Ok(()),
            _ => Err(CodecError::length_exceeded(
                count,
                self.cursor.position(),
                self.cursor.limit(),
            )),
        }
    }

    /// Array (`count` given by the type) or sequence (`count` read from the
    /// wire), with the DHEADER for non-primitive elements under XCDR2.
    fn read_collection(
        &mut self,
        element: &TypeCode,
        count: Option<usize>,
        bound: Option<u32>,
        keep: bool,
    ) -> CoreResult<Vec<Value>> {
        let delimited = self.cursor.xcdr() == XcdrVersion::Xcdr2 && !element.is_primitive();
        let frame = if delimited {
            let end = read_delimited(&mut self.cursor)?;
            Some((end, self.cursor.narrow(end)?))
        } else {
            None
        };

        let count = match count {
            Some(count) => count,
            None => {
                let position = self.cursor.position();
                let count = self.cursor.read_length()?;
                if let Some(bound) = bound {
                    if count > bound as usize {
                        return Err(CodecError::invalid_data(
                            position,
                            format!("sequence of {count} elements exceeds bound {bound}"),
                        ));
                    }
                }
                count
            }
        };

        let items = if count == 0 {
            Vec::new()
        } else {
            self.check_count(element, count)?;
            match element {
                TypeCode::Primitive(p) => self.read_primitive_run(*p, count, keep)?,
                _ => {
                    let mut items = Vec::with_capacity(if keep { count } else { 0 });
                    for _ in 0..count {
                        let item = self.read_value(element, false, keep)?;
                        if keep {
                            items.push(item);
                        }
                    }
                    items
                }
            }
        };

        if let Some((end, saved)) = frame {
            self.cursor.restore_limit(saved);
            self.cursor.seek(end)?;
        }
        Ok(items)
    }

    /// Consecutive primitives, read as one bounds-checked slice.
    fn read_primitive_run(&mut self, p: PrimitiveType, count: usize, keep: bool) -> CoreResult<Vec<Value>> {
        let size = p.size();
        self.cursor.align(self.cursor.xcdr().alignment_of(size))?;
        let position = self.cursor.position();
        let bytes = self.cursor.read_bytes(count * size)?;
        if p == PrimitiveType::Bool {
            if let Some(idx) = bytes.iter().position(|&b| b > 1) {
                return Err(CodecError::invalid_data(
                    position + idx,
                    format!("boolean value {}", bytes[idx]),
                ));
            }
        }
        if !keep {
            return Ok(Vec::new());
        }
        Ok(bytes
            .chunks_exact(size)
            .map(|chunk| p.from_bits(read_bits::<B>(chunk)))
            .collect())
    }
}

/// Read a 1, 2, 4 or 8 byte scalar from `chunk` in byte order `B`.
pub(crate) fn read_bits<B: ByteOrder>(chunk: &[u8]) -> u64 {
    match chunk.len() {
        1 => u64::from(chunk[0]),
        2 => u64::from(B::read_u16(chunk)),
        4 => u64::from(B::read_u32(chunk)),
        _ => B::read_u64(chunk),
    }
}

pub(crate) fn align_up(position: usize, size: usize) -> usize {
    position.div_ceil(size) * size
}
