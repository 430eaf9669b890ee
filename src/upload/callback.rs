//! Upload callback strategy
//!
//! Push operations hand their data reader to an [`UploadCallback`] before sending it, which
//! lets callers count bytes, throttle or swap the reader entirely.

use crate::concurrency::progress::{BoxedReader, NoopProgress, ProgressReporter};

pub trait UploadCallback: Send + Sync {
    /// Called before the first byte is read, with the full upload size
    fn init_upload(&self, total_size: i64);

    /// Return the reader the upload should actually consume
    fn reader<'a>(&'a self, reader: BoxedReader<'a>) -> BoxedReader<'a>;

    fn finish(&self);

    /// The upload failed
    fn terminate(&self);

    /// Reporter for uploads that run as concurrent parts instead of one reader
    fn part_progress(&self) -> &dyn ProgressReporter {
        &NoopProgress
    }
}

/// [`UploadCallback`] that forwards to a [`ProgressReporter`]
pub struct ReporterUploadCallback<'p> {
    progress: &'p dyn ProgressReporter,
}

impl<'p> ReporterUploadCallback<'p> {
    pub fn new(progress: &'p dyn ProgressReporter) -> Self {
        Self { progress }
    }
}

impl UploadCallback for ReporterUploadCallback<'_> {
    fn init_upload(&self, total_size: i64) {
        self.progress.init(total_size);
    }

    fn reader<'a>(&'a self, reader: BoxedReader<'a>) -> BoxedReader<'a> {
        self.progress.wrap_reader(reader)
    }

    fn finish(&self) {
        self.progress.wait();
    }

    fn terminate(&self) {
        self.progress.abort(true);
    }

    fn part_progress(&self) -> &dyn ProgressReporter {
        self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::progress::ConsoleProgress;
    use crate::logging::Logger;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_reporter_callback_counts_reads() {
        let progress = ConsoleProgress::new(Logger::new_quiet());
        let callback = ReporterUploadCallback::new(&progress);
        callback.init_upload(5);

        let data: &[u8] = b"bytes";
        let mut reader = callback.reader(Box::new(data));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        drop(reader);
        callback.finish();

        assert_eq!(out, b"bytes");
        assert_eq!(progress.processed_bytes(), 5);
    }
}
