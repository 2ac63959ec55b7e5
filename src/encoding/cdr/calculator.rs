// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! CDR size calculator for computing the size of CDR-encoded data.

use super::encoder::CdrSink;
use crate::core::XcdrVersion;

/// CDR size calculator.
///
/// A [`CdrSink`] that tracks the write position without storing bytes. The
/// interpreters drive it exactly like an encoder, so the result always
/// matches the unpadded length of the real encoding.
///
/// # Example
///
/// ```
/// use cdrstream::core::XcdrVersion;
/// use cdrstream::encoding::cdr::calculator::CdrCalculator;
/// use cdrstream::encoding::cdr::encoder::CdrSink;
///
/// let mut calc = CdrCalculator::new(XcdrVersion::Xcdr1);
/// calc.put_u8(1);   // 1 byte
/// calc.put_u64(2);  // 7 bytes padding + 8 bytes
/// assert_eq!(calc.size(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct CdrCalculator {
    /// Current size offset
    offset: usize,
    /// Encoding version
    xcdr: XcdrVersion,
}

impl CdrCalculator {
    /// Create a new calculator.
    #[must_use]
    pub fn new(xcdr: XcdrVersion) -> Self {
        Self { offset: 0, xcdr }
    }

    /// Get the current calculated size.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.offset
    }

    /// Align, then count `byte_count` bytes.
    fn increment(&mut self, alignment: usize, byte_count: usize) {
        self.align(alignment);
        self.offset += byte_count;
    }
}

impl CdrSink for CdrCalculator {
    fn xcdr(&self) -> XcdrVersion {
        self.xcdr
    }

    fn is_little_endian(&self) -> bool {
        cfg!(target_endian = "little")
    }

    fn position(&self) -> usize {
        self.offset
    }

    fn align(&mut self, size: usize) {
        let alignment = self.offset % size;
        if alignment > 0 {
            self.offset += size - alignment;
        }
    }

    fn put_u8(&mut self, _value: u8) {
        self.offset += 1;
    }

    fn put_u16(&mut self, _value: u16) {
        self.increment(2, 2);
    }

    fn put_u32(&mut self, _value: u32) {
        self.increment(4, 4);
    }

    fn put_u64(&mut self, _value: u64) {
        self.increment(self.xcdr.eight_byte_alignment(), 8);
    }

    fn put_bytes(&mut self, data: &[u8]) {
        self.offset += data.len();
    }

    fn patch_u32(&mut self, _position: usize, _value: u32) {}

    fn swap_region(&mut self, _start: usize, _width: usize, _count: usize) {}
}
