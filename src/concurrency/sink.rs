//! Random-access sinks and sources shared by transfer workers
//!
//! Workers never coordinate with each other: each one only touches its own byte range, so the
//! only requirement on a sink is positional `write_at`/`read_at` through a shared reference.

use crate::error::{LibraryError, Result};
use std::fs::File;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Destination of a download
pub trait PositionalSink: Send + Sync {
    /// Write all of `buf` starting at absolute `offset`
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Read back previously written bytes; returns 0 past the end
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

/// Origin of an upload
pub trait PositionalSource: Send + Sync {
    fn len(&self) -> io::Result<u64>;

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Fill `buf` completely from `offset`, or return how many bytes were available
pub fn read_full_at(source: &dyn PositionalSource, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(unix)]
fn file_write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(unix)]
fn file_read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn file_write_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_write(buf, offset)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer"));
        }
        buf = &buf[n..];
        offset += n as u64;
    }
    Ok(())
}

#[cfg(windows)]
fn file_read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

impl PositionalSink for File {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        file_write_at(self, buf, offset)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        file_read_at(self, buf, offset)
    }
}

impl PositionalSource for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        file_read_at(self, buf, offset)
    }
}

/// In-memory sink/source that grows on demand
#[derive(Debug, Default)]
pub struct MemoryBuffer {
    data: Mutex<Vec<u8>>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        match self.data.into_inner() {
            Ok(data) => data,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        match self.data.lock() {
            Ok(data) => data.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Vec<u8>>> {
        self.data
            .lock()
            .map_err(|_| io::Error::other("memory buffer lock poisoned"))
    }

    fn read_locked(data: &[u8], buf: &mut [u8], offset: u64) -> usize {
        let offset = offset as usize;
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        n
    }
}

impl From<Vec<u8>> for MemoryBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }
}

impl PositionalSink for MemoryBuffer {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut data = self.lock()?;
        let start = offset as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Ok(Self::read_locked(&self.lock()?, buf, offset))
    }
}

impl PositionalSource for MemoryBuffer {
    fn len(&self) -> io::Result<u64> {
        Ok(self.lock()?.len() as u64)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Ok(Self::read_locked(&self.lock()?, buf, offset))
    }
}

/// Write `buf` at `offset` on the blocking thread pool
///
/// File sinks issue a real `pwrite`, which must not run on a runtime worker thread.
pub async fn write_at_blocking<B>(sink: &Arc<dyn PositionalSink>, buf: B, offset: u64) -> Result<()>
where
    B: AsRef<[u8]> + Send + 'static,
{
    let sink = Arc::clone(sink);
    tokio::task::spawn_blocking(move || sink.write_at(buf.as_ref(), offset)).await??;
    Ok(())
}

/// Read exactly `len` bytes at `offset` on the blocking thread pool
pub async fn read_exact_at_blocking(
    source: &Arc<dyn PositionalSource>,
    len: usize,
    offset: u64,
) -> Result<Vec<u8>> {
    let source = Arc::clone(source);
    let buf = tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; len];
        let n = read_full_at(source.as_ref(), &mut buf, offset)?;
        Ok::<_, io::Error>((buf, n))
    })
    .await??;

    let (buf, n) = buf;
    if n != len {
        return Err(LibraryError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("source ended after {} of {} bytes at offset {}", n, len, offset),
        )));
    }
    Ok(buf)
}

/// Sequential [`AsyncRead`] view over a [`PositionalSource`]
pub struct SourceReader<'a> {
    source: &'a dyn PositionalSource,
    offset: u64,
    end: u64,
}

impl<'a> SourceReader<'a> {
    pub fn new(source: &'a dyn PositionalSource) -> io::Result<Self> {
        let end = source.len()?;
        Ok(Self::with_range(source, 0, end))
    }

    /// Read `[start, end)` of the source
    pub fn with_range(source: &'a dyn PositionalSource, start: u64, end: u64) -> Self {
        Self {
            source,
            offset: start,
            end,
        }
    }
}

impl AsyncRead for SourceReader<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let remaining = this.end.saturating_sub(this.offset);
        if remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let want = (buf.remaining() as u64).min(remaining) as usize;
        let dst = buf.initialize_unfilled_to(want);
        match this.source.read_at(dst, this.offset) {
            Ok(n) => {
                buf.advance(n);
                this.offset += n as u64;
                Poll::Ready(Ok(()))
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_blocking_helpers() {
        let buffer = Arc::new(MemoryBuffer::new());
        let sink: Arc<dyn PositionalSink> = buffer.clone();
        write_at_blocking(&sink, b"world".to_vec(), 6).await.unwrap();
        write_at_blocking(&sink, *b"hello ", 0).await.unwrap();
        assert_eq!(buffer.to_vec(), b"hello world");

        let source: Arc<dyn PositionalSource> = buffer;
        assert_eq!(read_exact_at_blocking(&source, 5, 6).await.unwrap(), b"world");
        assert!(matches!(
            read_exact_at_blocking(&source, 5, 8).await,
            Err(LibraryError::Io(_))
        ));
    }

    #[test]
    fn test_memory_buffer_out_of_order_writes() {
        let buffer = MemoryBuffer::new();
        buffer.write_at(b"world", 6).unwrap();
        buffer.write_at(b"hello ", 0).unwrap();
        assert_eq!(buffer.to_vec(), b"hello world");

        let mut out = [0u8; 5];
        assert_eq!(PositionalSink::read_at(&buffer, &mut out, 6).unwrap(), 5);
        assert_eq!(&out, b"world");
        assert_eq!(PositionalSink::read_at(&buffer, &mut out, 11).unwrap(), 0);
    }

    #[test]
    fn test_file_positional_io() {
        let file = tempfile::tempfile().unwrap();
        PositionalSink::write_at(&file, b"def", 3).unwrap();
        PositionalSink::write_at(&file, b"abc", 0).unwrap();

        let mut out = [0u8; 6];
        assert_eq!(read_full_at(&file, &mut out, 0).unwrap(), 6);
        assert_eq!(&out, b"abcdef");
        assert_eq!(PositionalSource::len(&file).unwrap(), 6);
    }

    #[tokio::test]
    async fn test_source_reader_range() {
        let source = MemoryBuffer::from(b"0123456789".to_vec());
        let mut reader = SourceReader::with_range(&source, 2, 7);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"23456");
    }
}
