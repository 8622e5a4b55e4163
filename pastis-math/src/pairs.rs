//! Mode pair enumeration for symmetric matrix fills
//!
//! A symmetric `n x n` matrix is fully determined by its upper triangle
//! including the diagonal, so only `(n² + n) / 2` pair measurements are
//! needed. [`ModePairs`] walks exactly those pairs in row-major order:
//! `(0,0), (0,1), ..., (0,n-1), (1,1), ..., (n-1,n-1)`.

/// Number of measurements needed to fill a symmetric `n x n` matrix
pub fn pair_measurement_count(n: usize) -> usize {
    (n * n + n) / 2
}

/// Lazy iterator over all unordered pairs `(i, j)` with `i <= j < n`
///
/// The iterator is cheap to clone, and cloning a fresh one restarts the
/// sequence. It reports its exact remaining length so callers can size
/// buffers and progress bars up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModePairs {
    n: usize,
    i: usize,
    j: usize,
    remaining: usize,
}

impl ModePairs {
    /// Create the pair sequence for `n` modes
    pub fn new(n: usize) -> Self {
        Self {
            n,
            i: 0,
            j: 0,
            remaining: pair_measurement_count(n),
        }
    }

    /// Number of modes this enumerator covers
    pub fn num_modes(&self) -> usize {
        self.n
    }
}

impl Iterator for ModePairs {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let pair = (self.i, self.j);
        self.remaining -= 1;

        self.j += 1;
        if self.j == self.n {
            self.i += 1;
            self.j = self.i;
        }

        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ModePairs {}

impl std::iter::FusedIterator for ModePairs {}

/// All non-repeating pairs for `n` modes, diagonal included
///
/// For modes 0, 1, 2 this yields `00, 01, 02, 11, 12, 22`.
pub fn mode_pairs_non_repeating(n: usize) -> ModePairs {
    ModePairs::new(n)
}

/// Full Cartesian product of `n` modes with themselves, `n²` ordered pairs
///
/// For modes 0, 1, 2 this yields `00, 01, 02, 10, 11, 12, 20, 21, 22`.
pub fn mode_pairs_all(n: usize) -> impl Iterator<Item = (usize, usize)> + Clone {
    (0..n).flat_map(move |i| (0..n).map(move |j| (i, j)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_three_mode_sequence() {
        let pairs: Vec<_> = mode_pairs_non_repeating(3).collect();
        assert_eq!(pairs, vec![(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)]);
    }

    #[test]
    fn test_counts_and_uniqueness() {
        for n in [1usize, 3, 10, 120] {
            let pairs: Vec<_> = mode_pairs_non_repeating(n).collect();
            assert_eq!(pairs.len(), pair_measurement_count(n));
            assert_eq!(pairs.len(), (n * n + n) / 2);

            let unique: HashSet<_> = pairs.iter().copied().collect();
            assert_eq!(unique.len(), pairs.len(), "duplicate pair for n={n}");

            // Every upper-triangle cell must be present
            for i in 0..n {
                for j in i..n {
                    assert!(unique.contains(&(i, j)), "missing ({i},{j}) for n={n}");
                }
            }
        }
    }

    #[test]
    fn test_enumeration_is_restartable() {
        let pairs = mode_pairs_non_repeating(10);
        let first: Vec<_> = pairs.clone().collect();
        let second: Vec<_> = pairs.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_exact_size_tracks_progress() {
        let mut pairs = mode_pairs_non_repeating(4);
        assert_eq!(pairs.len(), 10);
        pairs.next();
        pairs.next();
        assert_eq!(pairs.len(), 8);
        let rest: Vec<_> = pairs.by_ref().collect();
        assert_eq!(rest.len(), 8);
        assert_eq!(pairs.next(), None);
    }

    #[test]
    fn test_zero_modes() {
        assert_eq!(mode_pairs_non_repeating(0).count(), 0);
        assert_eq!(mode_pairs_all(0).count(), 0);
    }

    #[test]
    fn test_all_pairs() {
        let pairs: Vec<_> = mode_pairs_all(3).collect();
        assert_eq!(pairs.len(), 9);
        assert_eq!(pairs[3], (1, 0));
    }
}
