//! Bundled-executable archive parsing and extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: trailer, TOC entry and TOC snapshot types
//! - [`parser`]: locates the trailer and decodes the TOC
//! - [`extractor`]: reads, inflates and writes entries
//! - [`sanitize`]: maps entry names to paths under the output root
//!
//! ## Format Overview
//!
//! A bundle consists of:
//! 1. The executable stub and the packed entry payloads
//! 2. The table of contents (TOC): variable-length records, one per entry
//! 3. An 88-byte trailer at the very end holding the magic, the package and
//!    TOC lengths, the runtime version and the runtime library name
//!
//! All integers are big-endian.
//!
//! ## Limitations
//!
//! - Extracted bytecode and nested PYZ archives are written as-is
//! - No encryption support

mod error;
mod extractor;
mod options;
mod parser;
mod sanitize;
mod structures;
mod summary;

pub use error::{Error, ErrorKind, Result};
pub use extractor::ArchiveExtractor;
pub use options::{DEFAULT_MAX_ENTRY_SIZE, ExtractOptions};
pub use parser::{ArchiveParser, parse_toc};
pub use sanitize::{resolve_under, sanitize_entry_name};
pub use structures::*;
pub use summary::{ExtractedEntry, Failure, Summary};
