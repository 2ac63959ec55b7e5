// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Key projection.
//!
//! A key comes in two layouts:
//!
//! - **Sample**: the key-only sample. XCDR2 framing is kept, members without
//!   a key role are left out, and key members appear in declaration order.
//!   The key descriptor's order is ignored.
//! - **Canonical**: XCDR2 big-endian with no framing. This is the only
//!   layout that follows the key descriptor's order, one field per `Kof`.
//!
//! Two types that declare the same keys in different member orders thus
//! share canonical keys but not key-only samples.
//!
//! A key computed from a sample and a key extracted from the serialized form
//! of that sample are byte-identical, whatever encoding version and byte
//! order the serialized form used.

use byteorder::ByteOrder;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::cursor::CdrCursor;
use super::descriptor::{Extensibility, KeyField, KeyRole, TypeDescriptor};
use super::encoder::CdrSink;
use super::framing::{
    begin_delimited, begin_member, end_delimited, end_member, read_delimited, read_member,
    MemberExtent,
};
use super::ops::{Adr, Op, TypeCode};
use super::read::{align_up, Reader};
use super::write::{must_understand, Writer};
use crate::core::{CodecError, CodecOptions, PrimitiveType, Result as CoreResult, Value, XcdrVersion};

/// Layout of an extracted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// Key-only sample in the configured byte order
    #[default]
    Sample,
    /// Key fields in key order, big-endian and unframed
    Canonical,
}

/// Write the key-only sample of `sample`.
pub(crate) fn write_key_sample<S: CdrSink>(
    desc: &TypeDescriptor,
    sample: &Value,
    sink: &mut S,
    max_depth: usize,
) -> CoreResult<()> {
    Writer::new(desc, sink, max_depth).write_sample(sample, true)
}

/// Write the canonical key of `sample`. The sink should be a big-endian
/// XCDR2 encoder.
pub(crate) fn write_canonical_key<S: CdrSink>(
    desc: &TypeDescriptor,
    sample: &Value,
    sink: &mut S,
    max_depth: usize,
) -> CoreResult<()> {
    let mut writer = Writer::new(desc, sink, max_depth).flat();
    for key in desc.keys() {
        let (ty, value) = key_field(desc, sample, key)?;
        writer.write_value(ty, value, false)?;
    }
    Ok(())
}

/// Follow a key path down to the key field.
fn key_field<'d, 'v>(
    desc: &'d TypeDescriptor,
    sample: &'v Value,
    key: &KeyField,
) -> CoreResult<(&'d TypeCode, &'v Value)> {
    let mut value = sample;
    let mut leaf = None;
    for &pc in desc.key_path(key) {
        let adr = desc.adr(pc);
        let fields = value
            .as_struct()
            .ok_or_else(|| CodecError::sample_mismatch("struct", value.type_name()))?;
        value = fields.get(adr.offset).ok_or_else(|| {
            CodecError::sample_mismatch(
                format!("struct with member slot {} for key '{}'", adr.offset, key.name),
                format!("struct with {} slots", fields.len()),
            )
        })?;
        leaf = Some(&adr.ty);
    }
    match leaf {
        Some(ty) => Ok((ty, value)),
        None => unreachable!("empty path for key '{}' in a verified program", key.name),
    }
}

/// Projects serialized data onto its key-only sample without building the
/// full sample.
///
/// The walk follows the program in lock-step with the input. Members
/// without a key role are validated and skipped, key leaves are copied and
/// key containers are walked. Once every key leaf has been written the
/// rest of the input is left unread.
pub(crate) struct KeyExtractor<'d, 'a, 's, B: ByteOrder, S: CdrSink> {
    desc: &'d TypeDescriptor,
    reader: Reader<'d, 'a, B>,
    sink: &'s mut S,
    max_depth: usize,
    remaining: usize,
}

impl<'d, 'a, 's, B: ByteOrder, S: CdrSink> KeyExtractor<'d, 'a, 's, B, S> {
    pub(crate) fn new(
        desc: &'d TypeDescriptor,
        cursor: CdrCursor<'a, B>,
        sink: &'s mut S,
        options: &CodecOptions,
    ) -> Self {
        Self {
            desc,
            reader: Reader::new(desc, cursor, options),
            sink,
            max_depth: options.max_depth,
            remaining: desc.key_leaf_count(),
        }
    }

    /// Run the projection. Returns the input position where reading stopped.
    pub(crate) fn extract(mut self) -> CoreResult<usize> {
        self.walk_struct(0)?;
        Ok(self.reader.cursor.position())
    }

    fn walk_struct(&mut self, body: usize) -> CoreResult<()> {
        self.reader.enter()?;
        let result = self.walk_struct_body(body);
        self.reader.leave();
        result
    }

    fn walk_struct_body(&mut self, body: usize) -> CoreResult<()> {
        let desc = self.desc;
        let ext = desc.body_extensibility(body);
        if ext != Extensibility::Final && self.reader.cursor.xcdr() == XcdrVersion::Xcdr1 {
            return Err(CodecError::unsupported(format!(
                "extensible type '{}' in XCDR1",
                desc.name()
            )));
        }
        match ext {
            Extensibility::Final => self.walk_members(body, false),
            Extensibility::Appendable => {
                let end = read_delimited(&mut self.reader.cursor)?;
                let saved = self.reader.cursor.narrow(end)?;
                let at = begin_delimited(&mut *self.sink);
                self.walk_members(body + 1, true)?;
                end_delimited(&mut *self.sink, at)?;
                self.reader.cursor.restore_limit(saved);
                self.reader.cursor.seek(end)
            }
            Extensibility::Mutable => self.walk_pl_members(body),
        }
    }

    fn walk_members(&mut self, mut pc: usize, appendable: bool) -> CoreResult<()> {
        let desc = self.desc;
        loop {
            match desc.op(pc) {
                Op::Adr(adr) => {
                    if self.remaining == 0 {
                        return Ok(());
                    }
                    let role = desc.key_role(pc);
                    let present = !(appendable && self.reader.cursor.is_at_end());
                    match (role, present) {
                        (KeyRole::None, true) => {
                            self.reader.read_member(adr, false, false)?;
                        }
                        (KeyRole::None, false) => {}
                        (_, true) => self.copy_member(adr, role)?,
                        // Absent in data from an older type version
                        (_, false) => self.write_default(adr, role)?,
                    }
                }
                Op::Jsr { target } => self.walk_members(*target, appendable)?,
                Op::Rts => return Ok(()),
                other => unreachable!("{} in structure body at op {pc}", other.name()),
            }
            pc += 1;
        }
    }

    /// Mutable bodies may list members in any order, so locate every key
    /// member first and then emit them in declaration order.
    fn walk_pl_members(&mut self, plc: usize) -> CoreResult<()> {
        let desc = self.desc;
        let members = desc.body_members(plc);
        let ids = desc.body_member_ids(plc);

        let end = read_delimited(&mut self.reader.cursor)?;
        let saved = self.reader.cursor.narrow(end)?;
        let mut found: Vec<Option<MemberExtent>> = vec![None; members.len()];
        while align_up(self.reader.cursor.position(), 4) < end {
            let extent = read_member(&mut self.reader.cursor)?;
            match ids.iter().position(|&id| id == extent.header.id) {
                Some(i) => {
                    if desc.key_role(members[i]) != KeyRole::None {
                        found[i] = Some(extent);
                    }
                }
                None if extent.header.must_understand => {
                    return Err(CodecError::invalid_data(
                        extent.start,
                        format!("unknown must-understand member id {}", extent.header.id),
                    ));
                }
                None => {
                    warn!(
                        context = "cdr_key",
                        type_name = desc.name(),
                        member_id = extent.header.id,
                        "Skipping unknown mutable member"
                    );
                }
            }
            self.reader.cursor.seek(extent.end)?;
        }

        let at = begin_delimited(&mut *self.sink);
        for (i, &pc) in members.iter().enumerate() {
            let role = desc.key_role(pc);
            if role == KeyRole::None {
                continue;
            }
            let adr = desc.adr(pc);
            let width = adr.ty.wire_width(XcdrVersion::Xcdr2);
            let open = begin_member(&mut *self.sink, ids[i], must_understand(adr, role), width);
            match found[i] {
                Some(extent) => {
                    self.reader.cursor.seek(extent.start)?;
                    let outer = self.reader.cursor.narrow(extent.end)?;
                    self.copy_member(adr, role)?;
                    self.reader.cursor.restore_limit(outer);
                }
                None => self.write_default(adr, role)?,
            }
            end_member(&mut *self.sink, open)?;
        }
        end_delimited(&mut *self.sink, at)?;

        self.reader.cursor.restore_limit(saved);
        self.reader.cursor.seek(end)
    }

    fn copy_member(&mut self, adr: &Adr, role: KeyRole) -> CoreResult<()> {
        if role == KeyRole::Path {
            return match adr.ty.body() {
                Some(body) => self.walk_struct(body),
                None => unreachable!("key container of type {}", adr.ty.name()),
            };
        }
        self.copy_leaf(&adr.ty)?;
        self.remaining = self.remaining.saturating_sub(1);
        Ok(())
    }

    fn copy_leaf(&mut self, ty: &TypeCode) -> CoreResult<()> {
        if let TypeCode::Array { count, element } = ty {
            if let TypeCode::Primitive(p) = element.as_ref() {
                return self.copy_primitive_run(element, *p, *count as usize);
            }
        }
        let value = self.reader.read_value(ty, false, true)?;
        Writer::new(self.desc, &mut *self.sink, self.max_depth).write_value(ty, &value, false)
    }

    /// Copy a primitive array as one block and fix its byte order in place.
    fn copy_primitive_run(&mut self, element: &TypeCode, p: PrimitiveType, count: usize) -> CoreResult<()> {
        if count == 0 {
            return Ok(());
        }
        self.reader.check_count(element, count)?;
        let size = p.size();
        let cursor = &mut self.reader.cursor;
        let alignment = cursor.xcdr().alignment_of(size);
        cursor.align(alignment)?;
        let position = cursor.position();
        let bytes = cursor.read_bytes(count * size)?;
        if p == PrimitiveType::Bool {
            if let Some(idx) = bytes.iter().position(|&b| b > 1) {
                return Err(CodecError::invalid_data(
                    position + idx,
                    format!("boolean value {}", bytes[idx]),
                ));
            }
        }

        let alignment = self.sink.xcdr().alignment_of(size);
        self.sink.align(alignment);
        let start = self.sink.position();
        self.sink.put_bytes(bytes);
        if size > 1 && cursor.is_little_endian() != self.sink.is_little_endian() {
            self.sink.swap_region(start, size, count);
        }
        Ok(())
    }

    fn write_default(&mut self, adr: &Adr, role: KeyRole) -> CoreResult<()> {
        let desc = self.desc;
        let value = desc.default_value(&adr.ty);
        let nested_keys = role == KeyRole::Path;
        Writer::new(desc, &mut *self.sink, self.max_depth).write_value(&adr.ty, &value, nested_keys)?;
        let leaves = match adr.ty.body() {
            Some(body) if nested_keys => desc.count_key_leaves(body),
            _ => 1,
        };
        self.remaining = self.remaining.saturating_sub(leaves);
        Ok(())
    }
}
