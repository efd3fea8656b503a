//! Error types for archive parsing and extraction.
//!
//! Parse-level errors (`TooSmall`, `Truncated`, `BadMagic`, `InvalidHeader`,
//! `CorruptToc`) abort [`ArchiveParser::parse`](super::ArchiveParser::parse).
//! Extraction-level errors are reported per entry in the
//! [`Summary`](super::Summary) and never abort a batch.

use serde::Serialize;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("archive is too small: {size} bytes, the trailer alone needs {required}")]
    TooSmall { size: u64, required: u64 },

    #[error("truncated read at offset {offset}: expected {expected} bytes, got {actual}")]
    Truncated {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("bad archive magic {found:02x?}")]
    BadMagic { found: [u8; 8] },

    #[error("invalid trailer: {0}")]
    InvalidHeader(String),

    #[error("corrupt TOC at offset {offset}: {reason}")]
    CorruptToc { offset: u64, reason: String },

    #[error(
        "entry '{name}' spans {offset}..{offset}+{length}, beyond archive length {archive_len}"
    )]
    OutOfBounds {
        name: String,
        offset: u64,
        length: u64,
        archive_len: u64,
    },

    #[error("unsafe entry path '{name}': {reason}")]
    UnsafePath { name: String, reason: String },

    #[error("failed to inflate '{name}': {reason}")]
    DecompressionFailed { name: String, reason: String },

    #[error("failed to write '{}': {source}", .path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    #[error("archive TOC has {invalid} invalid entries; refusing to extract all without allow_partial")]
    PartiallyCorrupt { invalid: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Fieldless classification of [`Error`], suitable for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    TooSmall,
    Truncated,
    BadMagic,
    InvalidHeader,
    CorruptToc,
    OutOfBounds,
    UnsafePath,
    DecompressionFailed,
    WriteFailed,
    PartiallyCorrupt,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TooSmall { .. } => ErrorKind::TooSmall,
            Error::Truncated { .. } => ErrorKind::Truncated,
            Error::BadMagic { .. } => ErrorKind::BadMagic,
            Error::InvalidHeader(_) => ErrorKind::InvalidHeader,
            Error::CorruptToc { .. } => ErrorKind::CorruptToc,
            Error::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            Error::UnsafePath { .. } => ErrorKind::UnsafePath,
            Error::DecompressionFailed { .. } => ErrorKind::DecompressionFailed,
            Error::WriteFailed { .. } => ErrorKind::WriteFailed,
            Error::PartiallyCorrupt { .. } => ErrorKind::PartiallyCorrupt,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn corrupt_toc(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptToc {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsafe_path(name: &str, reason: impl Into<String>) -> Self {
        Error::UnsafePath {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
