//! Batch partitioning.

use std::ops::Range;

/// Splits `len` rows into contiguous ranges of at most `batch_size`.
///
/// The ranges cover `0..len` exactly, in order; only the last may be shorter.
/// A zero batch size is treated as one.
#[must_use]
pub fn batch_ranges(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let size = batch_size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}
