// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Per-type codec entry points.
//!
//! A [`CdrStreamCodec`] binds a validated [`TypeDescriptor`] to a set of
//! [`CodecOptions`]. The byte order is picked once per call and every
//! interpreter underneath is monomorphized over it.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::warn;

use super::calculator::CdrCalculator;
use super::cursor::{CdrCursor, CDR_HEADER_SIZE};
use super::descriptor::TypeDescriptor;
use super::encoder::{CdrEncoder, EncapsulationKind};
use super::key::{write_canonical_key, write_key_sample, KeyExtractor, KeyFormat};
use super::read::Reader;
use super::write::Writer;
use crate::core::{CodecError, CodecOptions, Endianness, Result, TypeRegistry, Value, XcdrVersion};

/// Codec for one registered type.
///
/// Holds no per-call state, so a single instance can serve any number of
/// threads at once.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cdrstream::core::{CodecOptions, Endianness, Value, XcdrVersion};
/// use cdrstream::encoding::cdr::{Adr, CdrStreamCodec, Op, TypeCode, TypeDescriptor};
/// use cdrstream::PrimitiveType;
///
/// let desc = TypeDescriptor::build(
///     "Point",
///     vec![
///         Op::Adr(Adr::new(0, TypeCode::Primitive(PrimitiveType::Int32))),
///         Op::Adr(Adr::new(1, TypeCode::Primitive(PrimitiveType::Int32))),
///         Op::Rts,
///     ],
///     vec![],
/// )
/// .unwrap();
/// let options = CodecOptions::default().with_endianness(Endianness::Little);
/// let codec = CdrStreamCodec::new(Arc::new(desc), options).unwrap();
///
/// let sample = Value::Struct(vec![Value::Int32(3), Value::Int32(-4)]);
/// let data = codec.encode(&sample, XcdrVersion::Xcdr2).unwrap();
/// assert_eq!(data.len(), 8);
/// assert_eq!(codec.decode(&data, XcdrVersion::Xcdr2, Endianness::Little).unwrap(), sample);
/// ```
#[derive(Debug, Clone)]
pub struct CdrStreamCodec {
    descriptor: Arc<TypeDescriptor>,
    options: CodecOptions,
}

impl CdrStreamCodec {
    /// Create a codec for `descriptor`.
    pub fn new(descriptor: Arc<TypeDescriptor>, options: CodecOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            descriptor,
            options,
        })
    }

    /// Create a codec for a type registered in `registry`.
    pub fn from_registry(
        registry: &TypeRegistry,
        type_name: &str,
        options: CodecOptions,
    ) -> Result<Self> {
        Self::new(registry.get(type_name)?, options)
    }

    /// Get the type descriptor.
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Get the codec options.
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Zero/empty-initialized sample of the type.
    pub fn default_sample(&self) -> Value {
        self.descriptor.default_sample()
    }

    fn check_version(&self, xcdr: XcdrVersion) -> Result<()> {
        if xcdr == XcdrVersion::Xcdr1 && self.descriptor.min_xcdr_version() == XcdrVersion::Xcdr2 {
            return Err(CodecError::unsupported(format!(
                "type '{}' requires XCDR2",
                self.descriptor.name()
            )));
        }
        Ok(())
    }

    fn log_rejected(&self, operation: &'static str, err: &CodecError) {
        if err.is_wire_error() {
            warn!(
                context = operation,
                type_name = self.descriptor.name(),
                error = %err,
                "Rejected input"
            );
        }
    }

    // ------------------------------------------------------------------
    // Encode
    // ------------------------------------------------------------------

    /// Encode `sample` in the configured byte order.
    ///
    /// The result is padded with zeros to a multiple of 4 bytes.
    pub fn encode(&self, sample: &Value, xcdr: XcdrVersion) -> Result<Vec<u8>> {
        self.check_version(xcdr)?;
        let capacity = self.options.initial_capacity;
        let data = match self.options.endianness {
            Endianness::Little => {
                self.encode_into(sample, CdrEncoder::<LittleEndian>::with_capacity(xcdr, capacity))
            }
            Endianness::Big => {
                self.encode_into(sample, CdrEncoder::<BigEndian>::with_capacity(xcdr, capacity))
            }
        }?;
        tracing::debug!(
            type_name = self.descriptor.name(),
            xcdr = xcdr.as_str(),
            endianness = self.options.endianness.as_str(),
            len = data.len(),
            "encoded sample"
        );
        Ok(data)
    }

    /// Encode `sample` behind a 4-byte encapsulation header.
    pub fn encode_with_header(&self, sample: &Value, xcdr: XcdrVersion) -> Result<Vec<u8>> {
        self.check_version(xcdr)?;
        let endianness = self.options.endianness;
        let kind = EncapsulationKind::for_type(xcdr, endianness, self.descriptor.extensibility());
        let capacity = self.options.initial_capacity + CDR_HEADER_SIZE;
        let data = match endianness {
            Endianness::Little => {
                self.encode_into(sample, CdrEncoder::<LittleEndian>::with_header(kind, capacity))
            }
            Endianness::Big => {
                self.encode_into(sample, CdrEncoder::<BigEndian>::with_header(kind, capacity))
            }
        }?;
        tracing::debug!(
            type_name = self.descriptor.name(),
            encapsulation = kind.id(),
            len = data.len(),
            "encoded sample with header"
        );
        Ok(data)
    }

    fn encode_into<B: ByteOrder>(&self, sample: &Value, mut encoder: CdrEncoder<B>) -> Result<Vec<u8>> {
        Writer::new(&self.descriptor, &mut encoder, self.options.max_depth)
            .write_sample(sample, false)?;
        Ok(encoder.finish())
    }

    /// Exact unpadded size of the encoding of `sample`.
    pub fn serialized_size(&self, sample: &Value, xcdr: XcdrVersion) -> Result<usize> {
        self.check_version(xcdr)?;
        let mut calculator = CdrCalculator::new(xcdr);
        Writer::new(&self.descriptor, &mut calculator, self.options.max_depth)
            .write_sample(sample, false)?;
        Ok(calculator.size())
    }

    // ------------------------------------------------------------------
    // Decode
    // ------------------------------------------------------------------

    /// Decode `data` written with `xcdr` in byte order `endianness`.
    pub fn decode(&self, data: &[u8], xcdr: XcdrVersion, endianness: Endianness) -> Result<Value> {
        self.check_version(xcdr)?;
        let result = match endianness {
            Endianness::Little => self.decode_as::<LittleEndian>(data, xcdr),
            Endianness::Big => self.decode_as::<BigEndian>(data, xcdr),
        };
        match &result {
            Ok(_) => tracing::debug!(
                type_name = self.descriptor.name(),
                xcdr = xcdr.as_str(),
                endianness = endianness.as_str(),
                len = data.len(),
                "decoded sample"
            ),
            Err(err) => self.log_rejected("cdr_decode", err),
        }
        result
    }

    /// Decode `data` that starts with an encapsulation header.
    pub fn decode_with_header(&self, data: &[u8]) -> Result<Value> {
        if data.len() < CDR_HEADER_SIZE {
            return Err(CodecError::buffer_too_short(CDR_HEADER_SIZE, data.len(), 0));
        }
        let id = BigEndian::read_u16(&data[..2]);
        let kind = EncapsulationKind::from_id(id).ok_or_else(|| {
            CodecError::invalid_data(0, format!("unknown encapsulation identifier {id:#06x}"))
        })?;
        if matches!(kind, EncapsulationKind::PlCdrBe | EncapsulationKind::PlCdrLe) {
            return Err(CodecError::unsupported("XCDR1 parameter list encapsulation"));
        }
        let padding = usize::from(data[3] & 0x3);
        let payload = &data[CDR_HEADER_SIZE..];
        if padding > payload.len() {
            return Err(CodecError::invalid_data(3, format!("padding {padding} exceeds payload")));
        }
        self.decode(&payload[..payload.len() - padding], kind.xcdr(), kind.endianness())
    }

    fn decode_as<B: ByteOrder>(&self, data: &[u8], xcdr: XcdrVersion) -> Result<Value> {
        let cursor = CdrCursor::<B>::new(data, xcdr);
        Reader::new(&self.descriptor, cursor, &self.options).read_sample(false)
    }

    /// Check that `data` decodes, without building a sample.
    pub fn validate(&self, data: &[u8], xcdr: XcdrVersion, endianness: Endianness) -> Result<()> {
        self.check_version(xcdr)?;
        let result = match endianness {
            Endianness::Little => self.validate_as::<LittleEndian>(data, xcdr),
            Endianness::Big => self.validate_as::<BigEndian>(data, xcdr),
        };
        if let Err(err) = &result {
            self.log_rejected("cdr_validate", err);
        }
        result
    }

    fn validate_as<B: ByteOrder>(&self, data: &[u8], xcdr: XcdrVersion) -> Result<()> {
        let cursor = CdrCursor::<B>::new(data, xcdr);
        Reader::new(&self.descriptor, cursor, &self.options).skip_sample()
    }

    /// Render `data` as text, prefixed with the type name.
    pub fn print_sample(&self, data: &[u8], xcdr: XcdrVersion, endianness: Endianness) -> Result<String> {
        let sample = self.decode(data, xcdr, endianness)?;
        Ok(format!("{} {}", self.descriptor.name(), sample))
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    /// Key of an in-memory sample.
    pub fn extract_key_from_sample(&self, sample: &Value, format: KeyFormat) -> Result<Vec<u8>> {
        let key = match format {
            KeyFormat::Sample => match self.options.endianness {
                Endianness::Little => self.key_sample_of::<LittleEndian>(sample),
                Endianness::Big => self.key_sample_of::<BigEndian>(sample),
            },
            KeyFormat::Canonical => self.canonical_key_of(sample),
        }?;
        tracing::debug!(
            type_name = self.descriptor.name(),
            format = ?format,
            key = %hex::encode(&key),
            "extracted key from sample"
        );
        Ok(key)
    }

    fn key_sample_of<B: ByteOrder>(&self, sample: &Value) -> Result<Vec<u8>> {
        let mut encoder =
            CdrEncoder::<B>::with_capacity(XcdrVersion::Xcdr2, self.options.initial_capacity);
        write_key_sample(&self.descriptor, sample, &mut encoder, self.options.max_depth)?;
        Ok(encoder.finish())
    }

    fn canonical_key_of(&self, sample: &Value) -> Result<Vec<u8>> {
        let mut encoder =
            CdrEncoder::<BigEndian>::with_capacity(XcdrVersion::Xcdr2, self.options.initial_capacity);
        write_canonical_key(&self.descriptor, sample, &mut encoder, self.options.max_depth)?;
        Ok(encoder.finish())
    }

    /// Key of serialized data, without decoding the whole sample.
    ///
    /// Equals [`extract_key_from_sample`](Self::extract_key_from_sample) of
    /// the decoded sample.
    pub fn extract_key_from_data(
        &self,
        data: &[u8],
        xcdr: XcdrVersion,
        endianness: Endianness,
        format: KeyFormat,
    ) -> Result<Vec<u8>> {
        self.check_version(xcdr)?;
        let result = match format {
            KeyFormat::Sample => match (endianness, self.options.endianness) {
                (Endianness::Little, Endianness::Little) => {
                    self.project::<LittleEndian, LittleEndian>(data, xcdr)
                }
                (Endianness::Little, Endianness::Big) => {
                    self.project::<LittleEndian, BigEndian>(data, xcdr)
                }
                (Endianness::Big, Endianness::Little) => {
                    self.project::<BigEndian, LittleEndian>(data, xcdr)
                }
                (Endianness::Big, Endianness::Big) => self.project::<BigEndian, BigEndian>(data, xcdr),
            },
            // Every sample of a keyless type shares the empty key
            KeyFormat::Canonical if !self.descriptor.has_keys() => Ok(Vec::new()),
            KeyFormat::Canonical => {
                let key_sample = match endianness {
                    Endianness::Little => self.project::<LittleEndian, BigEndian>(data, xcdr),
                    Endianness::Big => self.project::<BigEndian, BigEndian>(data, xcdr),
                }?;
                self.canonical_from_key_as::<BigEndian>(&key_sample)
            }
        };
        match &result {
            Ok(key) => tracing::debug!(
                type_name = self.descriptor.name(),
                xcdr = xcdr.as_str(),
                format = ?format,
                key = %hex::encode(key),
                "extracted key from data"
            ),
            Err(err) => self.log_rejected("cdr_key", err),
        }
        result
    }

    /// Project data in byte order `I` onto a key-only sample in byte order `O`.
    fn project<I: ByteOrder, O: ByteOrder>(&self, data: &[u8], xcdr: XcdrVersion) -> Result<Vec<u8>> {
        let cursor = CdrCursor::<I>::new(data, xcdr);
        let mut encoder =
            CdrEncoder::<O>::with_capacity(XcdrVersion::Xcdr2, self.options.initial_capacity);
        KeyExtractor::new(&self.descriptor, cursor, &mut encoder, &self.options).extract()?;
        Ok(encoder.finish())
    }

    /// Reorder a key-only sample in byte order `endianness` into the
    /// canonical key.
    pub fn canonical_key_from_key(&self, key: &[u8], endianness: Endianness) -> Result<Vec<u8>> {
        let result = match endianness {
            Endianness::Little => self.canonical_from_key_as::<LittleEndian>(key),
            Endianness::Big => self.canonical_from_key_as::<BigEndian>(key),
        };
        if let Err(err) = &result {
            self.log_rejected("cdr_key", err);
        }
        result
    }

    fn canonical_from_key_as<B: ByteOrder>(&self, key: &[u8]) -> Result<Vec<u8>> {
        let cursor = CdrCursor::<B>::new(key, XcdrVersion::Xcdr2);
        let key_sample = Reader::new(&self.descriptor, cursor, &self.options).read_sample(true)?;
        self.canonical_key_of(&key_sample)
    }
}
