//! Path counting and successor trimming.
//!
//! Every analysis run owns one [`PathCounter`]. It approximates the number of
//! open paths in the ARG: a root opens a path, every additional child of an
//! already expanded parent opens another one, and covering or merging a state
//! closes one. The count is signed: coverings can close more paths than the
//! approximation opened, and then it goes below zero. When the count exceeds
//! a configured bound, successor batches are down-sampled with
//! [`trimmed_indices`].

use log::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathCounter {
    count: i64,
}

impl PathCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> i64 {
        self.count
    }

    pub fn inc(&mut self) {
        self.count += 1;
    }

    pub fn dec(&mut self, n: u64) {
        self.count -= i64::try_from(n).unwrap_or(i64::MAX);
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Indices of the successors to keep out of a batch of `n`, or `None` if
    /// the whole batch is kept.
    pub fn trimmed_indices(&self, n: usize, bound: u64) -> Option<Vec<usize>> {
        trimmed_indices(n, self.count, bound)
    }
}

/// Down-sample a batch of `n` successors when `counter` exceeds `bound`.
///
/// With `delta = counter - bound`, a batch smaller than or equal to `delta`
/// shrinks to its first element. Otherwise `n - delta` elements are kept,
/// evenly spaced with stride `n / kept` starting at offset `n % kept`.
/// A `bound` of zero disables trimming.
pub fn trimmed_indices(n: usize, counter: i64, bound: u64) -> Option<Vec<usize>> {
    let limit = i64::try_from(bound).unwrap_or(i64::MAX);
    if bound == 0 || counter <= limit || n == 0 {
        return None;
    }
    let delta = (counter - limit) as u64;
    let kept = if (delta as u128) < n as u128 { n - delta as usize } else { 1 };
    let stride = n / kept;
    let offset = n % kept;
    let indices: Vec<usize> = (0..kept).map(|i| offset + i * stride).collect();
    debug!(
        "trimming {} successors to {} (counter {}, bound {}): {:?}",
        n, kept, counter, bound, indices
    );
    Some(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_inactive_below_bound() {
        assert_eq!(trimmed_indices(5, 3, 10), None);
        assert_eq!(trimmed_indices(5, 10, 10), None);
        assert_eq!(trimmed_indices(5, 100, 0), None);
    }

    #[test]
    fn test_overshoot_smaller_than_batch() {
        // delta = 2, kept = 4, stride = 1, offset = 2
        assert_eq!(trimmed_indices(6, 12, 10), Some(vec![2, 3, 4, 5]));
        // delta = 5, kept = 5, stride = 2, offset = 0
        assert_eq!(trimmed_indices(10, 15, 10), Some(vec![0, 2, 4, 6, 8]));
        // delta = 4, kept = 3, stride = 2, offset = 1
        assert_eq!(trimmed_indices(7, 14, 10), Some(vec![1, 3, 5]));
    }

    #[test]
    fn test_overshoot_at_least_batch_keeps_one() {
        // kept = 1, stride = n, offset = 0
        assert_eq!(trimmed_indices(3, 13, 10), Some(vec![0]));
        assert_eq!(trimmed_indices(3, 100, 10), Some(vec![0]));
    }

    #[test]
    fn test_counter_goes_negative() {
        let mut c = PathCounter::new();
        c.inc();
        c.dec(5);
        assert_eq!(c.get(), -4);
        // Closed paths are owed back before trimming starts.
        for _ in 0..5 {
            c.inc();
        }
        assert_eq!(c.get(), 1);
        assert_eq!(c.trimmed_indices(4, 1), None);
        c.inc();
        assert_eq!(c.trimmed_indices(4, 1), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_negative_counter_never_trims() {
        assert_eq!(trimmed_indices(8, -3, 1), None);
    }
}
