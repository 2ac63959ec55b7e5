// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! XCDR2 extensibility framing.
//!
//! Appendable aggregates and collections of non-primitive elements carry a
//! DHEADER: a 4-byte byte count of what follows. Mutable aggregates carry a
//! DHEADER plus an EMHEADER in front of every member:
//!
//! ```text
//!  31  30..28  27..0
//! +---+------+-----------+
//! | M |  LC  | member id |   [NEXTINT when LC >= 4]
//! +---+------+-----------+
//! ```
//!
//! Encode side writes a zero placeholder and patches it once the body is
//! done. Decode side turns headers into absolute extents the reader can
//! narrow its cursor to.

use byteorder::ByteOrder;

use super::cursor::CdrCursor;
use super::encoder::CdrSink;
use crate::core::{CodecError, Result as CoreResult};

/// Must-understand flag of an EMHEADER.
pub const EMHEADER_FLAG_MUST_UNDERSTAND: u32 = 1 << 31;

/// Length code field of an EMHEADER.
pub const EMHEADER_LC_MASK: u32 = 0x7000_0000;

/// Bit position of the length code.
pub const EMHEADER_LC_SHIFT: u32 = 28;

/// Member id field of an EMHEADER.
pub const EMHEADER_MEMBER_ID_MASK: u32 = 0x0fff_ffff;

/// EMHEADER length code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthCode {
    /// 1-byte member
    One,
    /// 2-byte member
    Two,
    /// 4-byte member
    Four,
    /// 8-byte member
    Eight,
    /// NEXTINT holds the member length
    NextInt,
    /// Member starts with NEXTINT; length is `4 + NEXTINT`
    NextIntBytes,
    /// Member starts with NEXTINT; length is `4 + 4 * NEXTINT`
    NextIntWords,
    /// Member starts with NEXTINT; length is `4 + 8 * NEXTINT`
    NextIntDoubleWords,
}

impl LengthCode {
    /// Fixed length code for a primitive of `width` bytes.
    pub fn for_width(width: usize) -> Option<Self> {
        match width {
            1 => Some(LengthCode::One),
            2 => Some(LengthCode::Two),
            4 => Some(LengthCode::Four),
            8 => Some(LengthCode::Eight),
            _ => None,
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => LengthCode::One,
            1 => LengthCode::Two,
            2 => LengthCode::Four,
            3 => LengthCode::Eight,
            4 => LengthCode::NextInt,
            5 => LengthCode::NextIntBytes,
            6 => LengthCode::NextIntWords,
            _ => LengthCode::NextIntDoubleWords,
        }
    }

    fn bits(self) -> u32 {
        match self {
            LengthCode::One => 0,
            LengthCode::Two => 1,
            LengthCode::Four => 2,
            LengthCode::Eight => 3,
            LengthCode::NextInt => 4,
            LengthCode::NextIntBytes => 5,
            LengthCode::NextIntWords => 6,
            LengthCode::NextIntDoubleWords => 7,
        }
    }
}

/// Decoded EMHEADER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberHeader {
    /// Member id
    pub id: u32,
    /// Must-understand flag
    pub must_understand: bool,
    /// Length code
    pub length_code: LengthCode,
}

impl MemberHeader {
    /// Pack into the 32-bit wire form.
    pub fn to_u32(self) -> u32 {
        let flag = if self.must_understand {
            EMHEADER_FLAG_MUST_UNDERSTAND
        } else {
            0
        };
        flag | (self.length_code.bits() << EMHEADER_LC_SHIFT) | (self.id & EMHEADER_MEMBER_ID_MASK)
    }

    /// Unpack from the 32-bit wire form.
    pub fn from_u32(raw: u32) -> Self {
        Self {
            id: raw & EMHEADER_MEMBER_ID_MASK,
            must_understand: raw & EMHEADER_FLAG_MUST_UNDERSTAND != 0,
            length_code: LengthCode::from_bits((raw & EMHEADER_LC_MASK) >> EMHEADER_LC_SHIFT),
        }
    }
}

/// Position of a length field still to be patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder(usize);

/// Open member, returned by [`begin_member`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMember(Option<Placeholder>);

fn length_u32(len: usize) -> CoreResult<u32> {
    u32::try_from(len).map_err(|_| CodecError::limit_exceeded("serialized length", u32::MAX as usize))
}

/// Write a zero DHEADER and return its position.
pub fn begin_delimited<S: CdrSink + ?Sized>(sink: &mut S) -> Placeholder {
    sink.put_u32(0);
    Placeholder(sink.position() - 4)
}

/// Patch the DHEADER with the number of bytes written after it.
pub fn end_delimited<S: CdrSink + ?Sized>(sink: &mut S, at: Placeholder) -> CoreResult<()> {
    let len = sink.position() - (at.0 + 4);
    sink.patch_u32(at.0, length_u32(len)?);
    Ok(())
}

/// Write an EMHEADER for member `id`.
///
/// `width` is the encoded width of a primitive member; any other member gets
/// a NEXTINT placeholder.
pub fn begin_member<S: CdrSink + ?Sized>(
    sink: &mut S,
    id: u32,
    must_understand: bool,
    width: Option<usize>,
) -> OpenMember {
    let fixed = width.and_then(LengthCode::for_width);
    let header = MemberHeader {
        id,
        must_understand,
        length_code: fixed.unwrap_or(LengthCode::NextInt),
    };
    sink.put_u32(header.to_u32());
    match fixed {
        Some(_) => OpenMember(None),
        None => OpenMember(Some(begin_delimited(sink))),
    }
}

/// Patch the NEXTINT of a member, if it has one.
pub fn end_member<S: CdrSink + ?Sized>(sink: &mut S, member: OpenMember) -> CoreResult<()> {
    match member.0 {
        Some(at) => end_delimited(sink, at),
        None => Ok(()),
    }
}

/// Read a DHEADER and return the absolute end of the delimited region.
pub fn read_delimited<B: ByteOrder>(cursor: &mut CdrCursor<'_, B>) -> CoreResult<usize> {
    let len = cursor.read_length()?;
    region_end(cursor, cursor.position(), Some(len))
}

fn region_end<B: ByteOrder>(
    cursor: &CdrCursor<'_, B>,
    start: usize,
    len: Option<usize>,
) -> CoreResult<usize> {
    match len.and_then(|len| start.checked_add(len)) {
        Some(end) if end <= cursor.limit() => Ok(end),
        _ => Err(CodecError::length_exceeded(
            len.unwrap_or(usize::MAX),
            start,
            cursor.limit(),
        )),
    }
}

/// Extent of one mutable member on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberExtent {
    /// Decoded EMHEADER
    pub header: MemberHeader,
    /// First byte of the member value
    pub start: usize,
    /// One past the last byte of the member value
    pub end: usize,
}

/// Read an EMHEADER (and NEXTINT) and compute the member extent.
pub fn read_member<B: ByteOrder>(cursor: &mut CdrCursor<'_, B>) -> CoreResult<MemberExtent> {
    let header = MemberHeader::from_u32(cursor.read_u32()?);
    let (start, len) = match header.length_code {
        LengthCode::One => (cursor.position(), Some(1)),
        LengthCode::Two => (cursor.position(), Some(2)),
        LengthCode::Four => (cursor.position(), Some(4)),
        LengthCode::Eight => (cursor.position(), Some(8)),
        LengthCode::NextInt => {
            let len = cursor.read_length()?;
            (cursor.position(), Some(len))
        }
        code => {
            // NEXTINT doubles as the first word of the member value
            let start = cursor.position();
            let next = cursor.read_length()?;
            cursor.seek(start)?;
            let scale = match code {
                LengthCode::NextIntBytes => 1,
                LengthCode::NextIntWords => 4,
                _ => 8,
            };
            (start, next.checked_mul(scale).and_then(|n| n.checked_add(4)))
        }
    };
    let end = region_end(cursor, start, len)?;
    Ok(MemberExtent { header, start, end })
}
