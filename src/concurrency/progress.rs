//! Progress reporting capability used by transfers
//!
//! The engine only ever calls into a [`ProgressReporter`]; it never renders anything itself.
//! [`NoopProgress`] is for callers that want no feedback at all, [`ConsoleProgress`] draws the
//! single-line bar through the [`Logger`].

use crate::logging::{Logger, TransferState};
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, ReadBuf};

pub type BoxedReader<'a> = Box<dyn AsyncRead + Send + Unpin + 'a>;

pub trait ProgressReporter: Send + Sync {
    /// Called once with the full transfer size before any bytes move
    fn init(&self, total_size: i64);

    fn increment_by(&self, bytes: u64);

    /// The transfer failed; `drop` asks the reporter to discard its display
    fn abort(&self, drop: bool);

    /// Block until the reporter has finished rendering
    fn wait(&self);

    /// Hook for single-stream transfers: wrap a reader so bytes are counted as they are read
    fn wrap_reader<'a>(&'a self, reader: BoxedReader<'a>) -> BoxedReader<'a> {
        reader
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn init(&self, _total_size: i64) {}
    fn increment_by(&self, _bytes: u64) {}
    fn abort(&self, _drop: bool) {}
    fn wait(&self) {}
}

/// Minimum interval between two redraws of the progress line
const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

pub struct ConsoleProgress {
    output: Logger,
    state: Mutex<TransferState>,
    last_draw: Mutex<Option<Instant>>,
    aborted: AtomicBool,
}

impl ConsoleProgress {
    pub fn new(output: Logger) -> Self {
        Self {
            output,
            state: Mutex::new(TransferState::new(0)),
            last_draw: Mutex::new(None),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn processed_bytes(&self) -> u64 {
        self.state.lock().map(|s| s.processed_bytes).unwrap_or(0)
    }

    fn redraw(&self, force: bool) {
        let Ok(mut last) = self.last_draw.lock() else {
            return;
        };
        let due = last.is_none_or(|t| t.elapsed() >= REDRAW_INTERVAL);
        if !force && !due {
            return;
        }
        if let Ok(state) = self.state.lock() {
            self.output.display_live_progress(&state);
            *last = Some(Instant::now());
        }
    }
}

impl ProgressReporter for ConsoleProgress {
    fn init(&self, total_size: i64) {
        if let Ok(mut state) = self.state.lock() {
            *state = TransferState::new(total_size.max(0) as u64);
        }
        self.aborted.store(false, Ordering::SeqCst);
        self.redraw(true);
    }

    fn increment_by(&self, bytes: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.processed_bytes += bytes;
        }
        self.redraw(false);
    }

    fn abort(&self, drop: bool) {
        self.aborted.store(true, Ordering::SeqCst);
        if !self.output.quiet {
            if drop {
                print!("\r\x1b[K");
            }
            println!();
        }
    }

    fn wait(&self) {
        if self.aborted.load(Ordering::SeqCst) {
            return;
        }
        self.redraw(true);
        if !self.output.quiet {
            println!();
        }
        if let Ok(state) = self.state.lock() {
            let elapsed = state.start_time.elapsed();
            self.output.detail(&format!(
                "Transferred {} in {}",
                self.output.format_size(state.processed_bytes),
                self.output.format_duration(elapsed)
            ));
        }
    }

    fn wrap_reader<'a>(&'a self, reader: BoxedReader<'a>) -> BoxedReader<'a> {
        Box::new(ProgressReader::new(reader, self))
    }
}

/// Reader that reports every byte read to a [`ProgressReporter`]
pub struct ProgressReader<'a> {
    inner: BoxedReader<'a>,
    progress: &'a dyn ProgressReporter,
}

impl<'a> ProgressReader<'a> {
    pub fn new(inner: BoxedReader<'a>, progress: &'a dyn ProgressReporter) -> Self {
        Self { inner, progress }
    }
}

impl AsyncRead for ProgressReader<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = buf.filled().len() - before;
            if read > 0 {
                this.progress.increment_by(read as u64);
            }
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_progress_reader_counts_bytes() {
        let progress = ConsoleProgress::new(Logger::new_quiet());
        progress.init(11);
        let data: &[u8] = b"hello world";
        let mut reader = progress.wrap_reader(Box::new(data));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(progress.processed_bytes(), 11);
    }

    #[tokio::test]
    async fn test_noop_wrap_is_identity() {
        let data: &[u8] = b"abc";
        let mut reader = NoopProgress.wrap_reader(Box::new(data));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
    }
}
