//! Range partitioner: splits an input of length `L` into `n` contiguous,
//! non-overlapping inclusive index ranges.

use serde::{Deserialize, Serialize};
use wheelhouse_core::PartitionError;

/// Inclusive index range `[start, end]` assigned to one execution unit.
///
/// `end` may be `start - 1` (empty range) or run past the input; readers clip
/// with [`IndexRange::clip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: i64,
    pub end: i64,
}

impl IndexRange {
    /// Slice bounds of this range against an input of length `len`.
    pub fn clip(&self, len: usize) -> std::ops::Range<usize> {
        let len = len as i64;
        let start = self.start.clamp(0, len);
        let end = (self.end + 1).clamp(start, len);
        start as usize..end as usize
    }
}

/// Largest number of ranges one task may fan out to.
pub const MAX_RANGES: i64 = 1 << 16;

/// Split `len` elements into `threads` ranges of `ceil(len / threads)` elements.
///
/// Always returns exactly `threads` ranges; trailing ranges may be empty or
/// extend past `len - 1`. `threads` must lie in `1..=MAX_RANGES`.
pub fn partition(len: i64, threads: i64) -> Result<Vec<IndexRange>, PartitionError> {
    if len < 0 {
        return Err(PartitionError::NegativeLength(len));
    }
    if !(1..=MAX_RANGES).contains(&threads) {
        return Err(PartitionError::InvalidThreadCount(threads));
    }
    let size = (len + threads - 1) / threads;
    Ok((0..threads)
        .map(|k| IndexRange {
            start: k * size,
            end: (k + 1) * size - 1,
        })
        .collect())
}

/// [`partition`] for an in-memory input length.
pub fn partition_len(len: usize, threads: usize) -> Result<Vec<IndexRange>, PartitionError> {
    let l = i64::try_from(len).map_err(|_| PartitionError::LengthOverflow(len))?;
    let n = i64::try_from(threads).map_err(|_| PartitionError::InvalidThreadCount(i64::MAX))?;
    partition(l, n)
}
