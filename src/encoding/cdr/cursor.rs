// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! CDR cursor for reading CDR-encoded data with proper alignment.
//!
//! Every read is bounds-checked against a movable `limit`. Delimited
//! aggregates and mutable members narrow the limit to their declared extent
//! so a hostile length can never make a nested read escape its frame.

use std::marker::PhantomData;

use byteorder::ByteOrder;

use crate::core::XcdrVersion;
use crate::CodecError;
use crate::Result as CoreResult;

/// Size of the CDR encapsulation header (4 bytes).
pub const CDR_HEADER_SIZE: usize = 4;

/// Bounded CDR cursor over a borrowed buffer.
///
/// The byte order `B` is fixed for the lifetime of the cursor. Alignment is
/// computed relative to the start of the buffer, which is the first byte
/// after the encapsulation header.
///
/// # Example
///
/// ```
/// use byteorder::LittleEndian;
/// use cdrstream::core::XcdrVersion;
/// use cdrstream::encoding::cdr::cursor::CdrCursor;
///
/// let data = [0x01, 0x00, 0x00, 0x00, 0x2A, 0x00, 0x00, 0x00];
/// let mut cursor = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr2);
/// assert_eq!(cursor.read_u8().unwrap(), 1);
/// assert_eq!(cursor.read_u32().unwrap(), 42);
/// assert!(cursor.is_at_end());
/// ```
pub struct CdrCursor<'a, B: ByteOrder> {
    /// The data buffer
    data: &'a [u8],
    /// Current read position
    offset: usize,
    /// Reads may not go past this position
    limit: usize,
    /// Encoding version, decides 8-byte alignment
    xcdr: XcdrVersion,
    _order: PhantomData<B>,
}

impl<'a, B: ByteOrder> CdrCursor<'a, B> {
    /// Create a cursor over `data` (without encapsulation header).
    pub fn new(data: &'a [u8], xcdr: XcdrVersion) -> Self {
        Self {
            data,
            offset: 0,
            limit: data.len(),
            xcdr,
            _order: PhantomData,
        }
    }

    /// Encoding version of the stream.
    #[inline]
    pub fn xcdr(&self) -> XcdrVersion {
        self.xcdr
    }

    /// Whether the stream is little endian.
    #[inline]
    pub fn is_little_endian(&self) -> bool {
        B::read_u16(&[1, 0]) == 1
    }

    /// Current read position.
    #[inline]
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Current read limit.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes left before the limit.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.offset)
    }

    /// Check if the cursor reached its limit.
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.offset >= self.limit
    }

    /// Restrict reads to `[position, end)`; returns the previous limit.
    ///
    /// Fails when `end` lies beyond the current limit.
    pub fn narrow(&mut self, end: usize) -> CoreResult<usize> {
        if end > self.limit || end < self.offset {
            return Err(CodecError::length_exceeded(
                end.saturating_sub(self.offset),
                self.offset,
                self.limit,
            ));
        }
        let previous = self.limit;
        self.limit = end;
        Ok(previous)
    }

    /// Restore a limit saved by [`narrow`](Self::narrow).
    #[inline]
    pub fn restore_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Move to `position`, which must not exceed the limit.
    pub fn seek(&mut self, position: usize) -> CoreResult<()> {
        if position > self.limit {
            return Err(CodecError::buffer_too_short(
                position - self.offset.min(position),
                self.remaining(),
                self.offset as u64,
            ));
        }
        self.offset = position;
        Ok(())
    }

    /// Align to the specified boundary.
    pub fn align(&mut self, size: usize) -> CoreResult<()> {
        let alignment = self.offset % size;
        if alignment > 0 {
            let padding = size - alignment;
            if padding > self.remaining() {
                return Err(CodecError::buffer_too_short(
                    padding,
                    self.remaining(),
                    self.offset as u64,
                ));
            }
            self.offset += padding;
        }
        Ok(())
    }

    fn take(&mut self, count: usize) -> CoreResult<&'a [u8]> {
        if count > self.remaining() {
            return Err(CodecError::buffer_too_short(
                count,
                self.remaining(),
                self.offset as u64,
            ));
        }
        let start = self.offset;
        self.offset += count;
        Ok(&self.data[start..self.offset])
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a u16 value.
    pub fn read_u16(&mut self) -> CoreResult<u16> {
        self.align(2)?;
        Ok(B::read_u16(self.take(2)?))
    }

    /// Read a u32 value.
    pub fn read_u32(&mut self) -> CoreResult<u32> {
        self.align(4)?;
        Ok(B::read_u32(self.take(4)?))
    }

    /// Read a u64 value, aligned per encoding version.
    pub fn read_u64(&mut self) -> CoreResult<u64> {
        self.align(self.xcdr.eight_byte_alignment())?;
        Ok(B::read_u64(self.take(8)?))
    }

    /// Read an aligned scalar of `width` bytes, zero-extended.
    pub fn read_scalar(&mut self, width: usize) -> CoreResult<u64> {
        match width {
            1 => self.read_u8().map(u64::from),
            2 => self.read_u16().map(u64::from),
            4 => self.read_u32().map(u64::from),
            8 => self.read_u64(),
            _ => unreachable!("scalar width {width}"),
        }
    }

    /// Read a 4-byte length or count.
    pub fn read_length(&mut self) -> CoreResult<usize> {
        Ok(self.read_u32()? as usize)
    }

    /// Read a byte slice.
    pub fn read_bytes(&mut self, count: usize) -> CoreResult<&'a [u8]> {
        self.take(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, LittleEndian};

    #[test]
    fn test_read_u8() {
        let data = [0x42];
        let mut cursor = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr2);
        assert_eq!(cursor.read_u8().unwrap(), 0x42);
        assert!(cursor.is_at_end());
        assert!(cursor.read_u8().is_err());
    }

    #[test]
    fn test_read_u16_aligned() {
        let data = [0xFF, 0x00, 0x34, 0x12];
        let mut cursor = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr2);
        cursor.read_u8().unwrap();
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_read_u32_big_endian() {
        let data = [0x00, 0x00, 0x01, 0x02];
        let mut cursor = CdrCursor::<BigEndian>::new(&data, XcdrVersion::Xcdr1);
        assert!(!cursor.is_little_endian());
        assert_eq!(cursor.read_u32().unwrap(), 0x0102);
    }

    #[test]
    fn test_u64_alignment_depends_on_version() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&7u64.to_le_bytes());
        data.extend_from_slice(&[0; 4]);

        let mut xcdr2 = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr2);
        xcdr2.read_u8().unwrap();
        assert_eq!(xcdr2.read_u64().unwrap(), 7);
        assert_eq!(xcdr2.position(), 12);

        let mut xcdr1 = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr1);
        xcdr1.read_u8().unwrap();
        xcdr1.read_u64().unwrap();
        assert_eq!(xcdr1.position(), 16);
    }

    #[test]
    fn test_read_past_end() {
        let data = [0x01, 0x02, 0x03];
        let mut cursor = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr2);
        let err = cursor.read_u32().unwrap_err();
        assert!(matches!(err, CodecError::BufferTooShort { requested: 4, .. }));
    }

    #[test]
    fn test_align_past_end() {
        let data = [0x01, 0x02];
        let mut cursor = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr2);
        cursor.read_u8().unwrap();
        assert!(cursor.align(4).is_err());
    }

    #[test]
    fn test_narrow_and_restore() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut cursor = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr2);
        let saved = cursor.narrow(2).unwrap();
        assert_eq!(cursor.remaining(), 2);
        assert!(cursor.read_u32().is_err());
        assert_eq!(cursor.read_bytes(2).unwrap(), &[1, 2]);
        assert!(cursor.is_at_end());
        cursor.restore_limit(saved);
        assert_eq!(cursor.read_u8().unwrap(), 3);
    }

    #[test]
    fn test_narrow_beyond_limit() {
        let data = [0u8; 4];
        let mut cursor = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr2);
        cursor.narrow(2).unwrap();
        let err = cursor.narrow(3).unwrap_err();
        assert!(matches!(err, CodecError::LengthExceeded { .. }));
    }

    #[test]
    fn test_seek() {
        let data = [0u8; 8];
        let mut cursor = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr2);
        cursor.seek(6).unwrap();
        assert_eq!(cursor.remaining(), 2);
        assert!(cursor.seek(9).is_err());
    }

    #[test]
    fn test_read_scalar_widths() {
        let data = [0xAA, 0x00, 0xBB, 0xCC, 0x01, 0x00, 0x00, 0x00];
        let mut cursor = CdrCursor::<LittleEndian>::new(&data, XcdrVersion::Xcdr2);
        assert_eq!(cursor.read_scalar(1).unwrap(), 0xAA);
        assert_eq!(cursor.read_scalar(2).unwrap(), 0xCCBB);
        assert_eq!(cursor.read_scalar(4).unwrap(), 1);
    }
}
