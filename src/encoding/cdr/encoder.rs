// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! CDR encoder for writing CDR-encoded data.
//!
//! [`CdrSink`] is the write side of the primitive codec. [`CdrEncoder`]
//! produces bytes into a growable buffer; [`CdrCalculator`](super::CdrCalculator)
//! only counts them. The interpreters are generic over the sink, so size
//! calculation and encoding share one code path.

use std::marker::PhantomData;

use byteorder::ByteOrder;

use super::cursor::CDR_HEADER_SIZE;
use super::descriptor::Extensibility;
use crate::core::{Endianness, XcdrVersion};

/// Default initial capacity for the encoder buffer.
const DEFAULT_CAPACITY: usize = 64;

/// Output stream of the primitive codec.
///
/// Positions are relative to the start of the serialized payload, after any
/// encapsulation header. Scalar writers align first.
pub trait CdrSink {
    /// Encoding version, decides 8-byte alignment.
    fn xcdr(&self) -> XcdrVersion;

    /// Whether multi-byte scalars are written little endian.
    fn is_little_endian(&self) -> bool;

    /// Current write position.
    fn position(&self) -> usize;

    /// Pad with zeros up to a multiple of `size`.
    fn align(&mut self, size: usize);

    /// Write a byte.
    fn put_u8(&mut self, value: u8);

    /// Write an aligned u16.
    fn put_u16(&mut self, value: u16);

    /// Write an aligned u32.
    fn put_u32(&mut self, value: u32);

    /// Write a u64 aligned per encoding version.
    fn put_u64(&mut self, value: u64);

    /// Write raw bytes without alignment.
    fn put_bytes(&mut self, data: &[u8]);

    /// Overwrite a previously written u32 at `position`.
    fn patch_u32(&mut self, position: usize, value: u32);

    /// Reverse the bytes of `count` elements of `width` bytes from `start`.
    fn swap_region(&mut self, start: usize, width: usize, count: usize);

    /// Write an aligned scalar of `width` bytes from its low bits.
    fn put_scalar(&mut self, width: usize, bits: u64) {
        match width {
            1 => self.put_u8(bits as u8),
            2 => self.put_u16(bits as u16),
            4 => self.put_u32(bits as u32),
            8 => self.put_u64(bits),
            _ => unreachable!("scalar width {width}"),
        }
    }
}

/// Reverse the byte order of every `width`-byte element of `data` in place.
pub fn swap_in_place(data: &mut [u8], width: usize) {
    if width > 1 {
        data.chunks_exact_mut(width).for_each(<[u8]>::reverse);
    }
}

/// CDR encapsulation kind.
///
/// The 2-byte representation identifier at the start of an encapsulated
/// stream, always stored big endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EncapsulationKind {
    /// CDR, Big Endian
    CdrBe = 0x0000,
    /// CDR, Little Endian
    CdrLe = 0x0001,
    /// PL CDR, Big Endian
    PlCdrBe = 0x0002,
    /// PL CDR, Little Endian
    PlCdrLe = 0x0003,
    /// CDR2, Big Endian
    Cdr2Be = 0x0006,
    /// CDR2, Little Endian
    Cdr2Le = 0x0007,
    /// Delimited CDR2, Big Endian
    DelimitedCdr2Be = 0x0008,
    /// Delimited CDR2, Little Endian
    DelimitedCdr2Le = 0x0009,
    /// PL CDR2, Big Endian
    PlCdr2Be = 0x000a,
    /// PL CDR2, Little Endian
    PlCdr2Le = 0x000b,
}

impl EncapsulationKind {
    /// Identifier for a top-level type of the given extensibility.
    pub fn for_type(xcdr: XcdrVersion, endianness: Endianness, ext: Extensibility) -> Self {
        let little = endianness == Endianness::Little;
        match (xcdr, ext, little) {
            (XcdrVersion::Xcdr1, _, false) => Self::CdrBe,
            (XcdrVersion::Xcdr1, _, true) => Self::CdrLe,
            (XcdrVersion::Xcdr2, Extensibility::Final, false) => Self::Cdr2Be,
            (XcdrVersion::Xcdr2, Extensibility::Final, true) => Self::Cdr2Le,
            (XcdrVersion::Xcdr2, Extensibility::Appendable, false) => Self::DelimitedCdr2Be,
            (XcdrVersion::Xcdr2, Extensibility::Appendable, true) => Self::DelimitedCdr2Le,
            (XcdrVersion::Xcdr2, Extensibility::Mutable, false) => Self::PlCdr2Be,
            (XcdrVersion::Xcdr2, Extensibility::Mutable, true) => Self::PlCdr2Le,
        }
    }

    /// Parse a representation identifier.
    pub fn from_id(id: u16) -> Option<Self> {
        Some(match id {
            0x0000 => Self::CdrBe,
            0x0001 => Self::CdrLe,
            0x0002 => Self::PlCdrBe,
            0x0003 => Self::PlCdrLe,
            0x0006 => Self::Cdr2Be,
            0x0007 => Self::Cdr2Le,
            0x0008 => Self::DelimitedCdr2Be,
            0x0009 => Self::DelimitedCdr2Le,
            0x000a => Self::PlCdr2Be,
            0x000b => Self::PlCdr2Le,
            _ => return None,
        })
    }

    /// Representation identifier.
    #[must_use]
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Check if this encapsulation uses CDR2 encoding rules.
    #[must_use]
    pub const fn is_cdr2(self) -> bool {
        matches!(
            self,
            Self::Cdr2Le
                | Self::Cdr2Be
                | Self::PlCdr2Le
                | Self::PlCdr2Be
                | Self::DelimitedCdr2Le
                | Self::DelimitedCdr2Be
        )
    }

    /// Encoding version of the payload.
    #[must_use]
    pub const fn xcdr(self) -> XcdrVersion {
        if self.is_cdr2() {
            XcdrVersion::Xcdr2
        } else {
            XcdrVersion::Xcdr1
        }
    }

    /// Byte order of the payload.
    #[must_use]
    pub const fn endianness(self) -> Endianness {
        if self.id() & 1 == 1 {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }
}

/// CDR encoder for writing CDR-encoded data.
///
/// Writes scalars in byte order `B`, pads with zeros, and grows its buffer by
/// doubling. When created [`with_header`](Self::with_header), the first four
/// bytes hold the encapsulation header and alignment is computed from the
/// byte after it.
///
/// # Example
///
/// ```
/// use byteorder::LittleEndian;
/// use cdrstream::core::XcdrVersion;
/// use cdrstream::encoding::cdr::encoder::{CdrEncoder, CdrSink};
///
/// let mut encoder = CdrEncoder::<LittleEndian>::new(XcdrVersion::Xcdr2);
/// encoder.put_u8(1);
/// encoder.put_u32(42);
/// assert_eq!(encoder.finish(), vec![1, 0, 0, 0, 42, 0, 0, 0]);
/// ```
pub struct CdrEncoder<B: ByteOrder> {
    /// Output buffer
    buffer: Vec<u8>,
    /// Current write position in `buffer`
    offset: usize,
    /// Start of the payload in `buffer`
    origin: usize,
    /// Encoding version
    xcdr: XcdrVersion,
    _order: PhantomData<B>,
}

impl<B: ByteOrder> CdrEncoder<B> {
    /// Create an encoder without encapsulation header.
    #[must_use]
    pub fn new(xcdr: XcdrVersion) -> Self {
        Self::with_capacity(xcdr, DEFAULT_CAPACITY)
    }

    /// Create an encoder with the given initial capacity.
    #[must_use]
    pub fn with_capacity(xcdr: XcdrVersion, capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity.max(CDR_HEADER_SIZE)],
            offset: 0,
            origin: 0,
            xcdr,
            _order: PhantomData,
        }
    }

    /// Create an encoder that starts with the encapsulation header for `kind`.
    #[must_use]
    pub fn with_header(kind: EncapsulationKind, capacity: usize) -> Self {
        let mut encoder = Self::with_capacity(kind.xcdr(), capacity);
        encoder.buffer[..2].copy_from_slice(&kind.id().to_be_bytes());
        encoder.offset = CDR_HEADER_SIZE;
        encoder.origin = CDR_HEADER_SIZE;
        encoder
    }

    /// Get a reference to the encoded payload so far.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buffer[self.origin..self.offset]
    }

    /// Pad to a multiple of 4 and return the buffer.
    ///
    /// With a header, the number of pad bytes goes into the low two bits of
    /// the options field.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        let before = self.offset;
        self.align(4);
        let padding = self.offset - before;
        if self.origin == CDR_HEADER_SIZE {
            self.buffer[3] = padding as u8;
        }
        self.buffer.truncate(self.offset);
        self.buffer
    }

    /// Ensure there's enough capacity for additional bytes.
    fn reserve(&mut self, additional: usize) {
        let needed = self.offset + additional;
        if needed > self.buffer.len() {
            self.buffer.resize(needed.max(self.buffer.len() * 2), 0);
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.buffer[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
    }
}

impl<B: ByteOrder> CdrSink for CdrEncoder<B> {
    fn xcdr(&self) -> XcdrVersion {
        self.xcdr
    }

    fn is_little_endian(&self) -> bool {
        B::read_u16(&[1, 0]) == 1
    }

    fn position(&self) -> usize {
        self.offset - self.origin
    }

    fn align(&mut self, size: usize) {
        let alignment = (self.offset - self.origin) % size;
        if alignment > 0 {
            let padding = size - alignment;
            self.reserve(padding);
            self.buffer[self.offset..self.offset + padding].fill(0);
            self.offset += padding;
        }
    }

    fn put_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    fn put_u16(&mut self, value: u16) {
        self.align(2);
        let mut bytes = [0; 2];
        B::write_u16(&mut bytes, value);
        self.write_bytes(&bytes);
    }

    fn put_u32(&mut self, value: u32) {
        self.align(4);
        let mut bytes = [0; 4];
        B::write_u32(&mut bytes, value);
        self.write_bytes(&bytes);
    }

    fn put_u64(&mut self, value: u64) {
        self.align(self.xcdr.eight_byte_alignment());
        let mut bytes = [0; 8];
        B::write_u64(&mut bytes, value);
        self.write_bytes(&bytes);
    }

    fn put_bytes(&mut self, data: &[u8]) {
        self.write_bytes(data);
    }

    fn patch_u32(&mut self, position: usize, value: u32) {
        let at = self.origin + position;
        B::write_u32(&mut self.buffer[at..at + 4], value);
    }

    fn swap_region(&mut self, start: usize, width: usize, count: usize) {
        let at = self.origin + start;
        swap_in_place(&mut self.buffer[at..at + width * count], width);
    }
}
