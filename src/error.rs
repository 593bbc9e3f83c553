//! Error types for the gp5-reader library

use nom::error::{ErrorKind, ParseError};
use std::io;

/// Library error type for Guitar Pro decoding operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GpError {
    /// Fewer bytes available than a read requires
    #[error("stream error: {0}")]
    StreamError(String),

    /// The version field is not of the form `...v<major>.<minor>`
    #[error("invalid version string format: {0}")]
    VersionFormatError(String),

    /// The version is well-formed but not handled by the decoder
    #[error("unsupported version: {0}")]
    UnsupportedVersionError(String),

    /// An enumerated wire field holds a value outside of its domain
    #[error("invalid {field} value: {value}")]
    InvalidValueError { field: &'static str, value: i64 },

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),
}

impl GpError {
    pub fn invalid_value(field: &'static str, value: impl Into<i64>) -> Self {
        Self::InvalidValueError {
            field,
            value: value.into(),
        }
    }
}

impl From<io::Error> for GpError {
    fn from(error: io::Error) -> Self {
        Self::IoError(error.to_string())
    }
}

// nom reports short reads through `from_error_kind`, the only way the
// combinators can fail on their own.
impl<'a> ParseError<&'a [u8]> for GpError {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        Self::StreamError(format!(
            "{kind:?} while reading, {} bytes remaining",
            input.len()
        ))
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl From<nom::Err<GpError>> for GpError {
    fn from(error: nom::Err<GpError>) -> Self {
        match error {
            nom::Err::Incomplete(needed) => Self::StreamError(format!("incomplete data {needed:?}")),
            nom::Err::Error(e) | nom::Err::Failure(e) => e,
        }
    }
}
