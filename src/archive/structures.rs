use byteorder::{BigEndian, ReadBytesExt};
use serde::Serialize;
use std::io::{Cursor, Read};

use super::error::{Error, Result};

/// Archive trailer (cookie) - 88 bytes at the very end of the bundle
///
/// Layout, big-endian: 8-byte magic, package length, TOC length, runtime
/// version, secondary version, 64-byte library name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub magic: [u8; 8],
    pub package_length: u32,
    pub toc_length: u32,
    pub runtime_version: i32,
    pub secondary_version: i32,
    pub library_name: [u8; 64],
}

impl Trailer {
    pub const MAGIC: [u8; 8] = *b"MEI\x0c\x0b\x0a\x0b\x0e";
    pub const SIZE: usize = 88;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Truncated {
                offset: 0,
                expected: Self::SIZE as u64,
                actual: data.len() as u64,
            });
        }

        let mut cursor = Cursor::new(&data[..Self::SIZE]);

        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic)?;
        if magic != Self::MAGIC {
            return Err(Error::BadMagic { found: magic });
        }

        let package_length = cursor.read_u32::<BigEndian>()?;
        let toc_length = cursor.read_u32::<BigEndian>()?;
        let runtime_version = cursor.read_i32::<BigEndian>()?;
        let secondary_version = cursor.read_i32::<BigEndian>()?;
        let mut library_name = [0u8; 64];
        cursor.read_exact(&mut library_name)?;

        Ok(Self {
            magic,
            package_length,
            toc_length,
            runtime_version,
            secondary_version,
            library_name,
        })
    }

    /// Runtime version as `major.minor`.
    ///
    /// Newer packers store `major * 100 + minor` (e.g. `312`), older ones
    /// `major * 10 + minor` (e.g. `27`).
    pub fn python_version(&self) -> String {
        let v = self.runtime_version;
        if v >= 100 {
            format!("{}.{}", v / 100, v % 100)
        } else {
            format!("{}.{}", v / 10, v % 10)
        }
    }

    /// Library name up to the first NUL. Informational only.
    pub fn library_name(&self) -> String {
        String::from_utf8_lossy(until_nul(&self.library_name)).into_owned()
    }
}

/// Size of the fixed part of a TOC record: record size, position,
/// stored length, uncompressed length, compression flag and type code.
pub const TOC_ENTRY_HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 1 + 1;

/// Type code carried by each TOC record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    Binary,
    Pyz,
    Zipfile,
    Module,
    Package,
    Script,
    Data,
    RuntimeOption,
    Splash,
    Dependency,
    Symlink,
    Unknown(u8),
}

impl EntryKind {
    pub fn from_u8(value: u8) -> Self {
        match value {
            b'b' => EntryKind::Binary,
            b'z' => EntryKind::Pyz,
            b'Z' => EntryKind::Zipfile,
            b'm' => EntryKind::Module,
            b'M' => EntryKind::Package,
            b's' => EntryKind::Script,
            b'x' => EntryKind::Data,
            b'o' => EntryKind::RuntimeOption,
            b'l' => EntryKind::Splash,
            b'd' => EntryKind::Dependency,
            b'n' => EntryKind::Symlink,
            other => EntryKind::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            EntryKind::Binary => b'b',
            EntryKind::Pyz => b'z',
            EntryKind::Zipfile => b'Z',
            EntryKind::Module => b'm',
            EntryKind::Package => b'M',
            EntryKind::Script => b's',
            EntryKind::Data => b'x',
            EntryKind::RuntimeOption => b'o',
            EntryKind::Splash => b'l',
            EntryKind::Dependency => b'd',
            EntryKind::Symlink => b'n',
            EntryKind::Unknown(v) => *v,
        }
    }
}

/// One packed resource described by the TOC
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub name: String,
    pub payload_offset: u64,
    pub stored_length: u64,
    pub uncompressed_length: u64,
    pub is_compressed: bool,
    pub kind: EntryKind,
}

impl TocEntry {
    /// End of the payload, or `None` if it overflows.
    pub fn payload_end(&self) -> Option<u64> {
        self.payload_offset.checked_add(self.stored_length)
    }

    /// Whether the payload lies entirely within `[0, archive_len)`.
    pub fn fits_within(&self, archive_len: u64) -> bool {
        self.payload_end().is_some_and(|end| end <= archive_len)
    }

    pub(crate) fn bounds_error(&self, archive_len: u64) -> Error {
        Error::OutOfBounds {
            name: self.name.clone(),
            offset: self.payload_offset,
            length: self.stored_length,
            archive_len,
        }
    }
}

/// Entry that failed the parse-time bound check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidEntry {
    /// Position of the entry in [`Toc::entries`]
    pub index: usize,
    pub name: String,
    pub reason: String,
}

/// Immutable snapshot produced by the parser
#[derive(Debug, Clone)]
pub struct Toc {
    pub trailer: Trailer,
    /// Entries in archive order, including ones listed in `invalid`
    pub entries: Vec<TocEntry>,
    pub invalid: Vec<InvalidEntry>,
}

impl Toc {
    pub fn is_partially_corrupt(&self) -> bool {
        !self.invalid.is_empty()
    }

    pub fn is_valid_index(&self, index: usize) -> bool {
        !self.invalid.iter().any(|e| e.index == index)
    }
}

pub(crate) fn until_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailer_bytes(magic: &[u8; 8], version: i32) -> Vec<u8> {
        let mut out = magic.to_vec();
        out.extend_from_slice(&120u32.to_be_bytes());
        out.extend_from_slice(&40u32.to_be_bytes());
        out.extend_from_slice(&version.to_be_bytes());
        out.extend_from_slice(&0i32.to_be_bytes());
        let mut name = [0u8; 64];
        name[..13].copy_from_slice(b"python312.dll");
        out.extend_from_slice(&name);
        out
    }

    #[test]
    fn trailer_decodes_big_endian_fields() {
        let trailer = Trailer::from_bytes(&trailer_bytes(&Trailer::MAGIC, 312)).unwrap();
        assert_eq!(trailer.package_length, 120);
        assert_eq!(trailer.toc_length, 40);
        assert_eq!(trailer.python_version(), "3.12");
        assert_eq!(trailer.library_name(), "python312.dll");
    }

    #[test]
    fn trailer_old_style_version() {
        let trailer = Trailer::from_bytes(&trailer_bytes(&Trailer::MAGIC, 27)).unwrap();
        assert_eq!(trailer.python_version(), "2.7");
    }

    #[test]
    fn trailer_rejects_bad_magic() {
        let err = Trailer::from_bytes(&trailer_bytes(b"MEI\x0c\x0b\x0a\x0b\x0f", 312)).unwrap_err();
        assert!(matches!(err, Error::BadMagic { .. }));
    }

    #[test]
    fn trailer_rejects_short_input() {
        let err = Trailer::from_bytes(&Trailer::MAGIC).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn entry_kind_codes() {
        assert_eq!(EntryKind::from_u8(b's'), EntryKind::Script);
        assert_eq!(EntryKind::from_u8(b'z'), EntryKind::Pyz);
        assert_eq!(EntryKind::from_u8(b'?'), EntryKind::Unknown(b'?'));
        assert_eq!(EntryKind::Package.as_u8(), b'M');
    }

    #[test]
    fn payload_bounds() {
        let entry = TocEntry {
            name: "x".into(),
            payload_offset: u64::MAX - 1,
            stored_length: 4,
            uncompressed_length: 4,
            is_compressed: false,
            kind: EntryKind::Data,
        };
        assert_eq!(entry.payload_end(), None);
        assert!(!entry.fits_within(u64::MAX));

        let entry = TocEntry {
            payload_offset: 10,
            ..entry
        };
        assert!(entry.fits_within(14));
        assert!(!entry.fits_within(13));
    }
}
