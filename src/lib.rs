//! # pyiunpack
//!
//! Reader and extractor for the archive embedded in PyInstaller-style
//! bundled executables.
//!
//! The bundle ends with a fixed-size trailer that locates a table of contents
//! (TOC). Each TOC record points at a payload inside the file, optionally
//! deflate-compressed. This crate recovers the TOC without trusting any
//! length or offset found in the file and writes every entry below a chosen
//! output directory, refusing names that would escape it.
//!
//! ## Features
//!
//! - Bound-checked trailer and TOC decoding with typed errors
//! - Partial recovery: out-of-bounds entries are reported, not fatal
//! - Path sanitization against absolute names and `..` traversal
//! - Raw deflate / zlib inflation with a zip-bomb guard
//! - Atomic writes and optional bounded parallel extraction
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use pyiunpack::{ArchiveExtractor, ArchiveParser, ExtractOptions, LocalFileReader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader = Arc::new(LocalFileReader::new(Path::new("app.exe"))?);
//!
//!     let toc = ArchiveParser::new(reader.clone()).parse().await?;
//!     for entry in &toc.entries {
//!         println!("{} ({} bytes)", entry.name, entry.stored_length);
//!     }
//!
//!     let extractor = ArchiveExtractor::with_options(reader, ExtractOptions::new().allow_partial(true));
//!     let summary = extractor.extract_all(&toc, Path::new("app.exe_extracted")).await?;
//!     println!("{} of {} extracted", summary.succeeded, summary.requested);
//!
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod io;

pub use archive::{
    ArchiveExtractor, ArchiveParser, EntryKind, Error, ErrorKind, ExtractOptions, Summary, Toc,
    TocEntry, Trailer,
};
pub use cli::Cli;
pub use io::{LocalFileReader, MemoryReader, ReadAt};
