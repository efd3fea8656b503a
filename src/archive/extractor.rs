use flate2::{Decompress, FlushDecompress, Status};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::io::{ReadAt, read_exact_at};

use super::error::{Error, Result};
use super::options::ExtractOptions;
use super::parser::ArchiveParser;
use super::sanitize::resolve_under;
use super::structures::{Toc, TocEntry};
use super::summary::{ExtractedEntry, Summary};

/// Inflated output may exceed the declared size by this factor plus slack.
const EXPANSION_FACTOR: u64 = 2;
const EXPANSION_SLACK: u64 = 64 * 1024;

/// Output buffer growth step while inflating.
const INFLATE_CHUNK: u64 = 256 * 1024;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Archive entry extractor
pub struct ArchiveExtractor<R: ReadAt> {
    reader: Arc<R>,
    options: ExtractOptions,
}

impl<R: ReadAt> Clone for ArchiveExtractor<R> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            options: self.options.clone(),
        }
    }
}

impl<R: ReadAt + 'static> ArchiveExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self::with_options(reader, ExtractOptions::default())
    }

    pub fn with_options(reader: Arc<R>, options: ExtractOptions) -> Self {
        Self { reader, options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Parse the archive this extractor reads from
    pub async fn parse(&self) -> Result<Toc> {
        ArchiveParser::new(Arc::clone(&self.reader)).parse().await
    }

    /// Read an entry's payload and inflate it if needed
    ///
    /// The entry's bounds are checked against the live source length, so a
    /// TOC parsed from a different (larger) source cannot cause reads past
    /// the end of this one.
    pub async fn read_entry(&self, entry: &TocEntry) -> Result<Vec<u8>> {
        let archive_len = self.reader.size();
        if !entry.fits_within(archive_len) {
            return Err(entry.bounds_error(archive_len));
        }
        let length =
            usize::try_from(entry.stored_length).map_err(|_| entry.bounds_error(archive_len))?;

        let data = read_exact_at(self.reader.as_ref(), entry.payload_offset, length).await?;

        if entry.is_compressed {
            inflate(entry, &data, self.options.max_entry_size)
        } else {
            Ok(data)
        }
    }

    /// Extract a single entry under `output_root`
    pub async fn extract_one(&self, entry: &TocEntry, output_root: &Path) -> Result<ExtractedEntry> {
        let output_path = resolve_under(output_root, &entry.name)?;
        let data = self.read_entry(entry).await?;

        prepare_parent(output_root, &output_path, &entry.name).await?;

        log::info!("extracting {} -> {}", entry.name, output_path.display());
        write_atomically(&output_path, &data).await?;

        Ok(ExtractedEntry {
            name: entry.name.clone(),
            path: output_path,
            bytes: data.len() as u64,
        })
    }

    /// Extract every entry of `toc` under `output_root`
    ///
    /// A single entry's failure never stops the batch; it is recorded in the
    /// returned [`Summary`].
    ///
    /// # Errors
    ///
    /// [`Error::PartiallyCorrupt`] if the TOC has out-of-bounds entries and
    /// neither `allow_partial` nor `skip_invalid` is set.
    pub async fn extract_all(&self, toc: &Toc, output_root: &Path) -> Result<Summary> {
        if toc.is_partially_corrupt() && !self.options.allow_partial {
            return Err(Error::PartiallyCorrupt {
                invalid: toc.invalid.len(),
            });
        }

        let mut summary = Summary::new(toc.entries.len());
        let mut queue = Vec::with_capacity(toc.entries.len());

        for (index, entry) in toc.entries.iter().enumerate() {
            if self.options.skip_invalid && !toc.is_valid_index(index) {
                log::warn!("skipping out-of-bounds entry {}", entry.name);
                summary.skipped.push(entry.name.clone());
            } else {
                queue.push(entry);
            }
        }

        let results = if self.options.jobs > 1 {
            self.run_parallel(&queue, output_root).await?
        } else {
            self.run_sequential(&queue, output_root).await
        };

        for (entry, result) in queue.iter().zip(results) {
            match result {
                Some(result) => summary.record(&entry.name, result),
                None => summary.timed_out = true,
            }
        }

        if summary.timed_out {
            log::warn!(
                "deadline reached, {} of {} entries were not started",
                queue.len() - summary.attempted,
                queue.len()
            );
        }
        log::info!(
            "extracted {} of {} entries ({} bytes) to {}",
            summary.succeeded,
            summary.requested,
            summary.total_bytes(),
            output_root.display()
        );

        Ok(summary)
    }

    /// `None` marks an entry that was not started before the deadline.
    async fn run_sequential(
        &self,
        queue: &[&TocEntry],
        output_root: &Path,
    ) -> Vec<Option<Result<ExtractedEntry>>> {
        let mut results = Vec::with_capacity(queue.len());
        for entry in queue {
            if self.options.deadline_passed() {
                results.push(None);
                continue;
            }
            results.push(Some(self.extract_one(entry, output_root).await));
        }
        results
    }

    async fn run_parallel(
        &self,
        queue: &[&TocEntry],
        output_root: &Path,
    ) -> Result<Vec<Option<Result<ExtractedEntry>>>> {
        let semaphore = Arc::new(Semaphore::new(self.options.jobs));
        let mut tasks = JoinSet::new();
        let mut results: Vec<Option<Result<ExtractedEntry>>> =
            (0..queue.len()).map(|_| None).collect();

        for (slot, entry) in queue.iter().enumerate() {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if self.options.deadline_passed() {
                break;
            }

            let this = self.clone();
            let entry = (*entry).clone();
            let root = output_root.to_path_buf();
            tasks.spawn(async move {
                let result = this.extract_one(&entry, &root).await;
                drop(permit);
                (slot, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (slot, result) = joined.map_err(io::Error::other)?;
            results[slot] = Some(result);
        }

        Ok(results)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Whether `data` starts with a zlib header (deflate, no preset dictionary).
fn has_zlib_header(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => {
            cmf & 0x0f == 8
                && cmf >> 4 <= 7
                && flg & 0x20 == 0
                && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0
        }
        _ => false,
    }
}

/// Inflate a raw deflate (or zlib-wrapped) payload.
///
/// Output is capped at `min(max_entry_size, uncompressed_length * 2 + 64 KiB)`;
/// anything larger, or a stream that does not reach its end marker, fails.
fn inflate(entry: &TocEntry, data: &[u8], max_entry_size: u64) -> Result<Vec<u8>> {
    let fail = |reason: String| Error::DecompressionFailed {
        name: entry.name.clone(),
        reason,
    };

    let limit = entry
        .uncompressed_length
        .saturating_mul(EXPANSION_FACTOR)
        .saturating_add(EXPANSION_SLACK)
        .min(max_entry_size);

    let mut inflater = Decompress::new(has_zlib_header(data));
    let initial = entry.uncompressed_length.min(limit).min(INFLATE_CHUNK * 16);
    let mut out = Vec::with_capacity(initial as usize);

    loop {
        if out.len() == out.capacity() {
            if out.len() as u64 > limit {
                break;
            }
            // One byte past the limit is enough to detect an overrun
            let room = (limit + 1 - out.len() as u64).min(INFLATE_CHUNK);
            out.reserve_exact(room as usize);
        }

        let in_before = inflater.total_in();
        let out_before = inflater.total_out();
        let consumed = in_before as usize;

        let status = inflater
            .decompress_vec(&data[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| fail(e.to_string()))?;

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                let stalled =
                    inflater.total_in() == in_before && inflater.total_out() == out_before;
                if stalled && out.len() < out.capacity() {
                    return Err(fail(format!(
                        "stream ends early after {} of {} input bytes",
                        inflater.total_in(),
                        data.len()
                    )));
                }
            }
        }
    }

    if out.len() as u64 > limit {
        return Err(fail(format!(
            "output exceeds {} bytes (declared {})",
            limit, entry.uncompressed_length
        )));
    }

    if out.len() as u64 != entry.uncompressed_length {
        log::debug!(
            "{} inflated to {} bytes, TOC declares {}",
            entry.name,
            out.len(),
            entry.uncompressed_length
        );
    }

    Ok(out)
}

/// Create the parent directories of `output_path` and make sure they did not
/// lead outside `output_root` through an existing symlink.
async fn prepare_parent(output_root: &Path, output_path: &Path, name: &str) -> Result<()> {
    let parent = output_path.parent().unwrap_or(output_root);

    fs::create_dir_all(parent)
        .await
        .map_err(|source| Error::WriteFailed {
            path: parent.to_path_buf(),
            source,
        })?;

    let canonical = |path: &Path| {
        let path = path.to_path_buf();
        async move {
            fs::canonicalize(&path)
                .await
                .map_err(|source| Error::WriteFailed { path, source })
        }
    };
    let root = canonical(output_root).await?;
    let real_parent = canonical(parent).await?;
    if !real_parent.starts_with(&root) {
        return Err(Error::unsafe_path(name, "parent directory escapes the output root"));
    }

    Ok(())
}

/// Write `data` to a temporary sibling and rename it over `path`.
///
/// On failure the temporary file is removed, so no partial output is left
/// under the final name.
async fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = temp_sibling(path);

    let written = async {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(source) = written {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(Error::WriteFailed {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.part", file_name, std::process::id(), unique))
}
