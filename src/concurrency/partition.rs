//! Splitting an artifact into contiguous byte ranges

use crate::concurrency::config::TransferSpec;
use crate::error::{LibraryError, Result};

/// One contiguous byte range, transferred as a single unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartDescriptor {
    /// Zero-based position of the part in the plan
    pub index: usize,
    /// First byte, absolute within the artifact
    pub start: u64,
    /// Last byte, inclusive
    pub end: u64,
    /// Bytes of this part already moved; the next write lands at `start + cursor`
    pub cursor: u64,
}

impl PartDescriptor {
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        Self {
            index,
            start,
            end,
            cursor: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn remaining(&self) -> u64 {
        self.len() - self.cursor
    }

    /// Absolute offset for the next byte of this part
    pub fn position(&self) -> u64 {
        self.start + self.cursor
    }

    /// Value for an HTTP `Range` request header
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub size: u64,
    pub parts: Vec<PartDescriptor>,
    /// Workers to run: never more than there are parts
    pub concurrency: usize,
}

/// Compute the ordered parts covering `[0, size-1]`
pub fn plan(size: i64, spec: &TransferSpec) -> Result<TransferPlan> {
    if size <= 0 {
        return Err(LibraryError::InvalidSize(size));
    }
    if spec.part_size <= 0 {
        return Err(LibraryError::InvalidPartSize(spec.part_size));
    }

    let size = size as u64;
    let part_size = spec.part_size as u64;
    let count = size.div_ceil(part_size) as usize;

    let parts = (0..count)
        .map(|i| {
            let start = i as u64 * part_size;
            let end = (start + part_size - 1).min(size - 1);
            PartDescriptor::new(i, start, end)
        })
        .collect::<Vec<_>>();

    Ok(TransferPlan {
        size,
        concurrency: spec.effective_concurrency().min(parts.len()),
        parts,
    })
}
