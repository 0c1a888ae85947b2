//! Error types for archive metadata extraction.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when parsing archive volumes, along with a convenient
//! [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. Errors
//! always propagate to the caller; no parser retries or falls back silently.
//! The only tolerated local recovery is zero padding between RAR volumes and
//! up to three padding bytes between PAR2 packets.
//!
//! ```rust,no_run
//! use volparse::{Error, list_files_7z};
//! use std::fs::File;
//!
//! fn inspect(path: &str) -> volparse::Result<()> {
//!     let mut file = File::open(path)?;
//!     match list_files_7z(&mut file) {
//!         Ok(entries) => println!("{} entries", entries.len()),
//!         Err(Error::UnsupportedFeature { feature }) => {
//!             eprintln!("archive uses an unsupported feature: {}", feature);
//!         }
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```

use std::io;

/// The main error type for archive metadata operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | File system operations |
/// | Format | [`InvalidSignature`][Self::InvalidSignature], [`MalformedFrame`][Self::MalformedFrame], [`CorruptHeader`][Self::CorruptHeader] | Invalid archive data |
/// | Truncation | [`TruncatedInput`][Self::TruncatedInput] | Incomplete volume set |
/// | Compatibility | [`UnsupportedFeature`][Self::UnsupportedFeature] | 7z features outside the Copy-codec subset |
/// | Side channel | [`Par2`][Self::Par2] | Corrupt PAR2 packet stream |
/// | Dispatch | [`TypeUnknown`][Self::TypeUnknown] | No extension or magic match |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading a volume.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The volume does not start with the expected magic bytes.
    ///
    /// Expected signatures:
    /// - RAR4: `Rar!\x1a\x07\x00` (7 bytes)
    /// - RAR5: `Rar!\x1a\x07\x01\x00` (8 bytes)
    /// - 7z: `7z\xbc\xaf\x27\x1c` (6 bytes)
    #[error("invalid {format} signature")]
    InvalidSignature {
        /// The format whose signature was expected.
        format: &'static str,
    },

    /// The stream ended while a frame or field was still expected.
    ///
    /// This usually indicates a missing volume or an incomplete download.
    #[error("truncated input at offset {offset:#x}: expected {expected}")]
    TruncatedInput {
        /// The logical offset at which more data was expected.
        offset: u64,
        /// A description of what was being read.
        expected: &'static str,
    },

    /// A frame declares sizes that are inconsistent or overflow.
    #[error("malformed frame at offset {offset:#x}: {reason}")]
    MalformedFrame {
        /// The logical offset of the offending frame.
        offset: u64,
        /// A description of the inconsistency.
        reason: String,
    },

    /// A 7z header failed CRC validation or is structurally corrupt.
    ///
    /// Only header CRCs are validated; file-content CRCs are surfaced on
    /// entries and never checked.
    #[error("corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The archive uses a feature outside the supported subset.
    ///
    /// Raised for 7z encoded headers, multi-coder folders, complex (binding)
    /// coders, external folder data, and any codec other than Copy.
    #[error("unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// The PAR2 packet stream is missing or corrupt.
    #[error("PAR2 parse error at offset {offset:#x}: {reason}")]
    Par2 {
        /// The byte offset of the offending packet.
        offset: u64,
        /// A description of the problem.
        reason: String,
    },

    /// The dispatcher could not determine the archive type.
    ///
    /// Neither the filename extension nor the magic bytes matched a known
    /// format. An obfuscated set may still be resolvable through PAR2.
    #[error("could not determine archive type for '{filename}'")]
    TypeUnknown {
        /// The filename of the first volume.
        filename: String,
    },
}

impl Error {
    /// Creates a `TruncatedInput` error.
    pub(crate) fn truncated(offset: u64, expected: &'static str) -> Self {
        Error::TruncatedInput { offset, expected }
    }

    /// Creates a `MalformedFrame` error.
    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Error::MalformedFrame {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a `CorruptHeader` error.
    pub(crate) fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a `Par2` error.
    pub(crate) fn par2(offset: u64, reason: impl Into<String>) -> Self {
        Error::Par2 {
            offset,
            reason: reason.into(),
        }
    }

    /// Maps an `io::Error` from a fixed-size read into `TruncatedInput`
    /// when the underlying cause is an unexpected EOF.
    pub(crate) fn from_read(e: io::Error, offset: u64, expected: &'static str) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::truncated(offset, expected)
        } else {
            Error::Io(e)
        }
    }

    /// Returns `true` if this error indicates data that is structurally
    /// invalid (as opposed to merely unsupported or unreadable).
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::InvalidSignature { .. }
                | Error::TruncatedInput { .. }
                | Error::MalformedFrame { .. }
                | Error::CorruptHeader { .. }
                | Error::Par2 { .. }
        )
    }

    /// Returns `true` if this error is about an unsupported archive
    /// feature rather than invalid data.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedFeature { .. })
    }
}

/// A specialized Result type for archive metadata operations.
pub type Result<T> = std::result::Result<T, Error>;
