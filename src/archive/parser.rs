//! Archive locator and TOC parser.
//!
//! This module handles the binary parsing of the bundle's trailer and table
//! of contents, reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! The archive is read from the end:
//! 1. Read the fixed 88-byte trailer at the very end of the file
//! 2. Validate its magic and lengths against the real file size
//! 3. Read the TOC region that sits in front of the trailer
//! 4. Decode the variable-length TOC records and bound-check every payload
//!
//! No length or offset taken from the file is trusted before it has been
//! checked against the source size.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;
use std::sync::Arc;

use crate::io::{ReadAt, read_exact_at};

use super::error::{Error, Result};
use super::structures::*;

/// Low-level archive parser.
///
/// Generic over the reader type so that local files and in-memory buffers
/// go through the same code.
///
/// ## Example
///
/// ```ignore
/// let parser = ArchiveParser::new(reader);
/// let toc = parser.parse().await?;
/// for entry in &toc.entries {
///     println!("{} ({} bytes)", entry.name, entry.stored_length);
/// }
/// ```
pub struct ArchiveParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ArchiveParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Read and validate the trailer at the end of the archive.
    ///
    /// # Errors
    ///
    /// [`Error::TooSmall`] if the source cannot hold a trailer,
    /// [`Error::Truncated`] on a short read, [`Error::BadMagic`] if the
    /// signature does not match and [`Error::InvalidHeader`] if the declared
    /// lengths do not fit the file.
    pub async fn read_trailer(&self) -> Result<Trailer> {
        let trailer_size = Trailer::SIZE as u64;
        if self.size < trailer_size {
            return Err(Error::TooSmall {
                size: self.size,
                required: trailer_size,
            });
        }

        let offset = self.size - trailer_size;
        let buf = read_exact_at(self.reader.as_ref(), offset, Trailer::SIZE).await?;
        let trailer = Trailer::from_bytes(&buf)?;

        log::debug!(
            "trailer at {:#x}: package_length={} toc_length={} runtime_version={} library={:?}",
            offset,
            trailer.package_length,
            trailer.toc_length,
            trailer.runtime_version,
            trailer.library_name()
        );

        let package_length = trailer.package_length as u64;
        let toc_length = trailer.toc_length as u64;

        if package_length > self.size {
            return Err(Error::InvalidHeader(format!(
                "package length {} exceeds archive length {}",
                package_length, self.size
            )));
        }
        if toc_length > package_length {
            return Err(Error::InvalidHeader(format!(
                "TOC length {} exceeds package length {}",
                toc_length, package_length
            )));
        }
        if self.toc_start(&trailer).is_none() {
            return Err(Error::InvalidHeader(format!(
                "package length {} does not fit in front of the trailer",
                package_length
            )));
        }

        Ok(trailer)
    }

    /// Parse the whole archive into an immutable [`Toc`].
    ///
    /// Entries whose payload lies beyond the end of the file do not abort the
    /// parse; they are listed in [`Toc::invalid`] and the TOC is flagged as
    /// partially corrupt.
    pub async fn parse(&self) -> Result<Toc> {
        let trailer = self.read_trailer().await?;

        // read_trailer has already checked that the region fits
        let toc_start = self.toc_start(&trailer).unwrap_or_default();
        let toc_data =
            read_exact_at(self.reader.as_ref(), toc_start, trailer.toc_length as usize).await?;

        let entries = parse_toc(&toc_data, toc_start)?;
        let invalid = self.validate_entries(&entries);

        log::debug!(
            "TOC at {:#x}: {} entries, {} out of bounds",
            toc_start,
            entries.len(),
            invalid.len()
        );

        Ok(Toc {
            trailer,
            entries,
            invalid,
        })
    }

    /// Start of the TOC region, `None` if it would lie before the file start.
    fn toc_start(&self, trailer: &Trailer) -> Option<u64> {
        self.size
            .checked_sub(Trailer::SIZE as u64)?
            .checked_sub(trailer.package_length as u64)
    }

    fn validate_entries(&self, entries: &[TocEntry]) -> Vec<InvalidEntry> {
        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.fits_within(self.size))
            .map(|(index, entry)| {
                let reason = entry.bounds_error(self.size).to_string();
                log::warn!("{}", reason);
                InvalidEntry {
                    index,
                    name: entry.name.clone(),
                    reason,
                }
            })
            .collect()
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Decode a TOC region into entries.
///
/// `base_offset` is the absolute position of `data` in the archive and is
/// only used for error messages.
pub fn parse_toc(data: &[u8], base_offset: u64) -> Result<Vec<TocEntry>> {
    let mut entries = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let at = base_offset + pos as u64;
        let remaining = data.len() - pos;

        if remaining < 4 {
            return Err(Error::corrupt_toc(at, "record size field is truncated"));
        }

        let record_size = Cursor::new(&data[pos..pos + 4]).read_u32::<BigEndian>()? as usize;
        if record_size == 0 {
            return Err(Error::corrupt_toc(at, "zero record size"));
        }
        if record_size < TOC_ENTRY_HEADER_SIZE {
            return Err(Error::corrupt_toc(
                at,
                format!(
                    "record size {} is smaller than the {}-byte entry header",
                    record_size, TOC_ENTRY_HEADER_SIZE
                ),
            ));
        }
        if record_size > remaining {
            return Err(Error::corrupt_toc(
                at,
                format!(
                    "record size {} runs past the TOC region ({} bytes left)",
                    record_size, remaining
                ),
            ));
        }

        let record = &data[pos..pos + record_size];
        entries.push(parse_record(record, at)?);
        pos += record_size;
    }

    Ok(entries)
}

/// Parse one TOC record whose length has already been validated.
fn parse_record(record: &[u8], at: u64) -> Result<TocEntry> {
    let mut cursor = Cursor::new(&record[4..TOC_ENTRY_HEADER_SIZE]);

    let payload_offset = cursor.read_u32::<BigEndian>()? as u64;
    let stored_length = cursor.read_u32::<BigEndian>()? as u64;
    let uncompressed_length = cursor.read_u32::<BigEndian>()? as u64;
    let compression_flag = cursor.read_u8()?;
    let type_code = cursor.read_u8()?;

    let name_bytes = until_nul(&record[TOC_ENTRY_HEADER_SIZE..]);
    let name = std::str::from_utf8(name_bytes)
        .map_err(|e| Error::corrupt_toc(at, format!("entry name is not valid UTF-8: {}", e)))?
        .to_string();

    Ok(TocEntry {
        name,
        payload_offset,
        stored_length,
        uncompressed_length,
        is_compressed: compression_flag != 0,
        kind: EntryKind::from_u8(type_code),
    })
}
