//! Shared row-partition parallelism helpers.
//!
//! Passes that work row-wise split a batch into fixed-size partitions and
//! process them on the rayon pool. Partition boundaries depend only on the
//! row count and the configured partition size, never on the thread count,
//! so results merged in partition order are identical to a sequential run.
use std::ops::Range;

use rayon::prelude::*;

/// Split `0..num_rows` into consecutive ranges of at most `partition_rows`.
///
/// A `partition_rows` of zero is treated as one. Zero rows yield no ranges.
pub fn partition_ranges(num_rows: usize, partition_rows: usize) -> Vec<Range<usize>> {
    let step = partition_rows.max(1);
    (0..num_rows.div_ceil(step))
        .map(|i| {
            let start = i * step;
            start..(start + step).min(num_rows)
        })
        .collect()
}

/// Run `f` over every range in parallel and return the results in range order.
///
/// When several partitions fail, the error of the earliest one is returned.
pub fn map_partitions<T, E, F>(ranges: &[Range<usize>], f: F) -> Result<Vec<T>, E>
where
    T: Send,
    E: Send,
    F: Fn(Range<usize>) -> Result<T, E> + Sync,
{
    if ranges.len() <= 1 {
        return ranges.iter().cloned().map(&f).collect();
    }
    let results: Vec<Result<T, E>> = ranges.par_iter().cloned().map(&f).collect();
    results.into_iter().collect()
}
