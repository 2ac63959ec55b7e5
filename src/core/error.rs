// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core error types for cdrstream.
//!
//! Provides error types for codec operations:
//! - Malformed, truncated or hostile wire data
//! - Samples that do not match their type
//! - Invalid instruction streams rejected at registration
//! - Unsupported encoding combinations

use std::fmt;

/// Errors that can occur during encode, decode and key extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Parse error in an encapsulation header or descriptor document
    ParseError {
        /// What was being parsed
        context: String,
        /// Error message
        message: String,
    },

    /// Instruction stream rejected by the program verifier
    InvalidProgram {
        /// Type name of the rejected descriptor
        type_name: String,
        /// Validation error message
        reason: String,
    },

    /// Type not found in registry
    TypeNotFound {
        /// Type name that was not found
        type_name: String,
    },

    /// Buffer too short for requested read
    BufferTooShort {
        /// Requested bytes
        requested: usize,
        /// Available bytes
        available: usize,
        /// Cursor position when error occurred
        cursor_pos: u64,
    },

    /// A length read from the wire exceeded the remaining input
    LengthExceeded {
        /// Length that was read
        length: usize,
        /// Position in buffer
        position: usize,
        /// End of the enclosing region
        buffer_len: usize,
    },

    /// Wire data that is well-sized but not valid for the type
    InvalidData {
        /// Cursor position when error occurred
        position: usize,
        /// What was wrong
        reason: String,
    },

    /// In-memory sample does not match the shape its type describes
    SampleMismatch {
        /// Shape the instruction stream expected
        expected: String,
        /// Shape that was found in the sample
        found: String,
    },

    /// A configured safety limit was hit
    LimitExceeded {
        /// Name of the limit
        limit_name: String,
        /// Configured value
        limit: usize,
    },

    /// Unsupported type or feature
    Unsupported {
        /// What is not supported
        feature: String,
    },

    /// Other error
    Other(String),
}

impl CodecError {
    /// Create a parse error.
    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        CodecError::ParseError {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an invalid program error.
    pub fn invalid_program(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::InvalidProgram {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a "type not found" error.
    pub fn type_not_found(type_name: impl Into<String>) -> Self {
        CodecError::TypeNotFound {
            type_name: type_name.into(),
        }
    }

    /// Create a buffer too short error.
    pub fn buffer_too_short(requested: usize, available: usize, cursor_pos: u64) -> Self {
        CodecError::BufferTooShort {
            requested,
            available,
            cursor_pos,
        }
    }

    /// Create a length exceeded error.
    pub fn length_exceeded(length: usize, position: usize, buffer_len: usize) -> Self {
        CodecError::LengthExceeded {
            length,
            position,
            buffer_len,
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(position: usize, reason: impl Into<String>) -> Self {
        CodecError::InvalidData {
            position,
            reason: reason.into(),
        }
    }

    /// Create a sample mismatch error.
    pub fn sample_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        CodecError::SampleMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a limit exceeded error.
    pub fn limit_exceeded(limit_name: impl Into<String>, limit: usize) -> Self {
        CodecError::LimitExceeded {
            limit_name: limit_name.into(),
            limit,
        }
    }

    /// Create an unsupported feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        CodecError::Unsupported {
            feature: feature.into(),
        }
    }

    /// Whether this error was caused by the bytes being decoded.
    ///
    /// These are the failures hostile input can trigger; everything else
    /// points at the caller or the registered type.
    pub fn is_wire_error(&self) -> bool {
        matches!(
            self,
            CodecError::BufferTooShort { .. }
                | CodecError::LengthExceeded { .. }
                | CodecError::InvalidData { .. }
                | CodecError::LimitExceeded { .. }
                | CodecError::ParseError { .. }
        )
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::ParseError { context, message } => {
                write!(f, "Parse error in {context}: {message}")
            }
            CodecError::InvalidProgram { type_name, reason } => {
                write!(f, "Invalid instruction stream for '{type_name}': {reason}")
            }
            CodecError::TypeNotFound { type_name } => {
                write!(f, "Type not found: '{type_name}'")
            }
            CodecError::BufferTooShort {
                requested,
                available,
                cursor_pos,
            } => write!(
                f,
                "Buffer too short: requested {requested} bytes at position {cursor_pos}, but only {available} bytes available"
            ),
            CodecError::LengthExceeded {
                length,
                position,
                buffer_len,
            } => write!(
                f,
                "Length {length} exceeds buffer at position {position} (buffer length: {buffer_len})"
            ),
            CodecError::InvalidData { position, reason } => {
                write!(f, "Invalid data at position {position}: {reason}")
            }
            CodecError::SampleMismatch { expected, found } => {
                write!(f, "Sample mismatch: expected {expected}, found {found}")
            }
            CodecError::LimitExceeded { limit_name, limit } => {
                write!(f, "Limit exceeded: {limit_name} (limit {limit})")
            }
            CodecError::Unsupported { feature } => {
                write!(f, "Unsupported feature: '{feature}'")
            }
            CodecError::Other(msg) => write!(f, "Other error: {msg}"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for cdrstream operations.
pub type Result<T> = std::result::Result<T, CodecError>;
