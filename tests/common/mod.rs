//! Shared helpers for building bundle fixtures in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::{self, Write};
use std::sync::Arc;

use pyiunpack::{ArchiveParser, MemoryReader, ReadAt, Toc, Trailer};

pub const STUB: &[u8] = b"\x7fELF\x02\x01\x01\0stub-bootloader-code";

/// One TOC record to emit
#[derive(Clone)]
pub struct TestEntry {
    pub name: Vec<u8>,
    pub payload: Vec<u8>,
    pub uncompressed_length: u32,
    pub compressed: bool,
    pub kind: u8,
    /// Replace the real payload offset in the TOC record
    pub offset_override: Option<u32>,
    /// Replace the real payload length in the TOC record
    pub length_override: Option<u32>,
}

impl TestEntry {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            payload: data.to_vec(),
            uncompressed_length: data.len() as u32,
            compressed: false,
            kind: b'x',
            offset_override: None,
            length_override: None,
        }
    }

    pub fn compressed(name: &str, data: &[u8]) -> Self {
        Self {
            payload: raw_deflate(data),
            compressed: true,
            kind: b'm',
            ..Self::stored(name, data)
        }
    }
}

/// Lays out `[stub][payloads][TOC][padding][trailer]`.
pub struct ArchiveBuilder {
    pub entries: Vec<TestEntry>,
    pub package_padding: usize,
    pub runtime_version: i32,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            package_padding: 0,
            runtime_version: 311,
        }
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(TestEntry::stored(name, data))
    }

    pub fn compressed(self, name: &str, data: &[u8]) -> Self {
        self.entry(TestEntry::compressed(name, data))
    }

    pub fn entry(mut self, entry: TestEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = STUB.to_vec();
        let mut toc = Vec::new();

        for entry in &self.entries {
            let offset = out.len() as u32;
            out.extend_from_slice(&entry.payload);
            toc.extend(toc_record(
                &entry.name,
                entry.offset_override.unwrap_or(offset),
                entry.length_override.unwrap_or(entry.payload.len() as u32),
                entry.uncompressed_length,
                entry.compressed,
                entry.kind,
            ));
        }

        let package_length = (toc.len() + self.package_padding) as u32;
        out.extend_from_slice(&toc);
        out.extend(std::iter::repeat_n(0u8, self.package_padding));
        out.extend(trailer(package_length, toc.len() as u32, self.runtime_version));
        out
    }
}

/// Encode one TOC record; the name field is NUL-padded to a 16-byte multiple.
pub fn toc_record(
    name: &[u8],
    offset: u32,
    length: u32,
    uncompressed_length: u32,
    compressed: bool,
    kind: u8,
) -> Vec<u8> {
    let name_field = (name.len() / 16 + 1) * 16;
    let record_size = (18 + name_field) as u32;

    let mut out = Vec::with_capacity(record_size as usize);
    out.extend_from_slice(&record_size.to_be_bytes());
    out.extend_from_slice(&offset.to_be_bytes());
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&uncompressed_length.to_be_bytes());
    out.push(compressed as u8);
    out.push(kind);
    out.extend_from_slice(name);
    out.resize(record_size as usize, 0);
    out
}

pub fn trailer(package_length: u32, toc_length: u32, runtime_version: i32) -> Vec<u8> {
    let mut out = Trailer::MAGIC.to_vec();
    out.extend_from_slice(&package_length.to_be_bytes());
    out.extend_from_slice(&toc_length.to_be_bytes());
    out.extend_from_slice(&runtime_version.to_be_bytes());
    out.extend_from_slice(&0i32.to_be_bytes());
    let mut library = [0u8; 64];
    library[..13].copy_from_slice(b"python311.dll");
    out.extend_from_slice(&library);
    out
}

pub fn raw_deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::best());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub async fn parse_bytes(bytes: Vec<u8>) -> pyiunpack::archive::Result<Toc> {
    ArchiveParser::new(Arc::new(MemoryReader::new(bytes))).parse().await
}

/// Claims to be `claimed` bytes long but only holds `data`.
pub struct LyingReader {
    pub data: Vec<u8>,
    pub claimed: u64,
}

#[async_trait]
impl ReadAt for LyingReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = (offset as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.claimed
    }
}

/// Relative paths of every file below `root`, sorted.
pub fn list_files(root: &std::path::Path) -> Vec<String> {
    fn walk(dir: &std::path::Path, root: &std::path::Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                let rel = path.strip_prefix(root).unwrap();
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    let mut out = Vec::new();
    if root.exists() {
        walk(root, root, &mut out);
    }
    out.sort();
    out
}
