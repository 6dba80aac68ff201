//! Contiguous partitioning of work across workers.

use std::ops::Range;

/// Splits `0..count` into at most `workers` contiguous ranges.
///
/// Every range but the last has `count / workers` elements, the last one also takes the
/// remainder. No more ranges than elements are returned, and `workers == 0` yields a single range.
pub fn chunk_ranges(count: usize, workers: usize) -> Vec<Range<usize>> {
    if count == 0 {
        return Vec::new();
    }

    let workers = workers.clamp(1, count);
    let size = count / workers;

    (0..workers)
        .map(|w| {
            let end = if w == workers - 1 { count } else { (w + 1) * size };
            w * size..end
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::even(8, 2, vec![0..4, 4..8])]
    #[case::remainder(10, 3, vec![0..3, 3..6, 6..10])]
    #[case::single_threaded(5, 0, vec![0..5])]
    #[case::more_workers(2, 4, vec![0..1, 1..2])]
    #[case::empty(0, 4, vec![])]
    fn test_chunk_ranges(
        #[case] count: usize,
        #[case] workers: usize,
        #[case] expected: Vec<Range<usize>>,
    ) {
        assert_eq!(chunk_ranges(count, workers), expected);
    }
}
