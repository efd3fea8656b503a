mod local;
mod memory;

pub use local::LocalFileReader;
pub use memory::MemoryReader;

use async_trait::async_trait;
use std::io;

use crate::archive::{Error, Result};

/// Trait for random access reading from a data source
///
/// Every read carries an explicit offset, so implementations must not rely on
/// a shared cursor between calls.
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    ///
    /// Returns the number of bytes read; `0` means end of data.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// Read exactly `len` bytes starting at `offset`.
///
/// A source that runs out of data before `len` bytes were read yields
/// [`Error::Truncated`].
pub async fn read_exact_at<R: ReadAt + ?Sized>(reader: &R, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;

    while filled < len {
        let n = reader.read_at(offset + filled as u64, &mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::Truncated {
                offset,
                expected: len as u64,
                actual: filled as u64,
            });
        }
        filled += n;
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most three bytes per call.
    struct Trickle(Vec<u8>);

    #[async_trait]
    impl ReadAt for Trickle {
        async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let start = (offset as usize).min(self.0.len());
            let n = buf.len().min(3).min(self.0.len() - start);
            buf[..n].copy_from_slice(&self.0[start..start + n]);
            Ok(n)
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }
    }

    #[tokio::test]
    async fn read_exact_at_loops_over_short_reads() {
        let reader = Trickle((0u8..20).collect());
        let data = read_exact_at(&reader, 4, 10).await.unwrap();
        assert_eq!(data, (4u8..14).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn read_exact_at_reports_truncation() {
        let reader = Trickle(vec![7u8; 8]);
        let err = read_exact_at(&reader, 5, 10).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated {
                offset: 5,
                expected: 10,
                actual: 3
            }
        ));
    }
}
