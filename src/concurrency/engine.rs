//! Worker pool that moves planned parts in parallel
//!
//! Every part runs as its own spawned task, so parts proceed on separate runtime worker threads.
//! A semaphore bounds how many are in flight. Parts are dispatched in plan order; the first
//! failing part closes the semaphore so nothing queued behind it starts. Parts already in
//! flight are left to finish, and the first error is what the caller sees.
//!
//! Bytes that reached the sink before a failure are not rolled back.

use crate::concurrency::config::TransferSpec;
use crate::concurrency::partition::{self, PartDescriptor};
use crate::concurrency::progress::ProgressReporter;
use crate::error::{LibraryError, Result};
use crate::logging::Logger;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct TransferEngine {
    output: Logger,
}

impl TransferEngine {
    pub fn new(output: Logger) -> Self {
        Self { output }
    }

    /// Plan `size` bytes with `spec` and run every part through `transfer_one`
    pub async fn transfer<F, Fut>(
        &self,
        size: i64,
        spec: &TransferSpec,
        transfer_one: F,
        progress: &dyn ProgressReporter,
    ) -> Result<u64>
    where
        F: Fn(PartDescriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<u64>> + Send + 'static,
    {
        let plan = partition::plan(size, spec)?;
        self.run(plan.parts, plan.concurrency, transfer_one, progress)
            .await
    }

    /// Run `parts` with at most `workers` in flight; returns total bytes moved
    pub async fn run<F, Fut>(
        &self,
        parts: Vec<PartDescriptor>,
        workers: usize,
        transfer_one: F,
        progress: &dyn ProgressReporter,
    ) -> Result<u64>
    where
        F: Fn(PartDescriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<u64>> + Send + 'static,
    {
        if parts.is_empty() {
            return Ok(0);
        }

        let workers = workers.clamp(1, parts.len());
        let part_count = parts.len();
        let start = Instant::now();
        self.output.detail(&format!(
            "Transferring {} parts with {} workers",
            part_count, workers
        ));

        let semaphore = Arc::new(Semaphore::new(workers));
        let transfer_one = Arc::new(transfer_one);
        let mut queue = VecDeque::from(parts);
        let mut tasks: JoinSet<(usize, Result<u64>)> = JoinSet::new();
        let mut first_error: Option<LibraryError> = None;
        let mut moved = 0u64;

        loop {
            tokio::select! {
                biased;

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    let (index, result) = match joined {
                        Ok((index, result)) => (Some(index), result),
                        Err(join_error) => (None, Err(LibraryError::from(join_error))),
                    };
                    match result {
                        Ok(bytes) => {
                            moved += bytes;
                            progress.increment_by(bytes);
                        }
                        Err(error) if first_error.is_none() => {
                            self.output.warning(&format!(
                                "Part {} failed, cancelling remaining parts: {}",
                                index.map_or_else(|| "?".to_string(), |i| i.to_string()),
                                error
                            ));
                            semaphore.close();
                            queue.clear();
                            progress.abort(true);
                            first_error = Some(error);
                        }
                        Err(error) => {
                            self.output
                                .debug(&format!("part failed after cancellation: {}", error));
                        }
                    }
                }

                permit = Arc::clone(&semaphore).acquire_owned(),
                    if first_error.is_none() && !queue.is_empty() =>
                {
                    // closed by a failing part
                    let Ok(permit) = permit else {
                        queue.clear();
                        continue;
                    };
                    let Some(part) = queue.pop_front() else {
                        continue;
                    };

                    self.output.debug(&format!(
                        "starting part {} (bytes {}-{})",
                        part.index, part.start, part.end
                    ));
                    let transfer_one = Arc::clone(&transfer_one);
                    let semaphore = Arc::clone(&semaphore);
                    tasks.spawn(async move {
                        let index = part.index;
                        let result = transfer_one(part).await;
                        if result.is_err() {
                            semaphore.close();
                        }
                        drop(permit);
                        (index, result)
                    });
                }

                else => break,
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        self.output.detail(&format!(
            "{} parts ({}) transferred in {}",
            part_count,
            self.output.format_size(moved),
            self.output.format_duration(start.elapsed())
        ));
        Ok(moved)
    }
}
