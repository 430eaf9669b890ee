//! Transfer tuning: how many workers and how large each part is

use serde::{Deserialize, Serialize};

/// Default part size for ranged downloads (5 MiB)
pub const DEFAULT_PART_SIZE: i64 = 5 * 1024 * 1024;

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSpec {
    /// Upper bound on workers; 0 is treated as 1
    pub concurrency: usize,
    /// Bytes per part; must be positive
    pub part_size: i64,
}

impl Default for TransferSpec {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

impl TransferSpec {
    pub fn new(concurrency: usize, part_size: i64) -> Self {
        Self {
            concurrency,
            part_size,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_part_size(mut self, part_size: i64) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}
