//! Seeded data partitioning
//!
//! Two partitions, both reproducible from `(row count, seed)`:
//!
//! - [`DataSplit`]: train / held-out test, taken once before any search
//! - [`FoldAssignment`]: k disjoint folds over the training rows, shared by
//!   every configuration of a search

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn shuffled(n: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    indices
}

/// Train / test partition of row indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSplit {
    train: Vec<usize>,
    test: Vec<usize>,
    seed: u64,
}

impl DataSplit {
    /// Hold out `ceil(test_fraction * n)` shuffled rows for testing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` unless `0 < test_fraction < 1` and both sides
    /// end up non-empty.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn train_test(n: usize, test_fraction: f64, seed: u64) -> Result<Self> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(Error::InvalidInput(format!(
                "test_fraction must be in (0, 1), got {test_fraction}"
            )));
        }
        let n_test = (test_fraction * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(Error::InvalidInput(format!(
                "cannot hold out {n_test} of {n} rows"
            )));
        }

        let mut order = shuffled(n, seed);
        let train = order.split_off(n_test);
        Ok(Self {
            train,
            test: order,
            seed,
        })
    }

    /// Training row indices.
    #[must_use]
    pub fn train(&self) -> &[usize] {
        &self.train
    }

    /// Held-out test row indices.
    #[must_use]
    pub fn test(&self) -> &[usize] {
        &self.test
    }

    /// Seed the split was drawn with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

/// k disjoint folds over `n` rows.
///
/// Fold sizes differ by at most one: the first `n % k` folds take the extra
/// row. Indices inside a fold are sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldAssignment {
    folds: Vec<Vec<usize>>,
    n_rows: usize,
    seed: u64,
}

impl FoldAssignment {
    /// Partition `n` rows into `k` folds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `k < 2` or `k > n`.
    pub fn new(n: usize, k: usize, seed: u64) -> Result<Self> {
        if k < 2 {
            return Err(Error::InvalidInput(format!(
                "cross-validation needs at least 2 folds, got {k}"
            )));
        }
        if k > n {
            return Err(Error::InvalidInput(format!(
                "cannot split {n} rows into {k} folds"
            )));
        }

        let order = shuffled(n, seed);
        let (base, extra) = (n / k, n % k);
        let mut folds = Vec::with_capacity(k);
        let mut start = 0;
        for i in 0..k {
            let size = base + usize::from(i < extra);
            let mut fold = order[start..start + size].to_vec();
            fold.sort_unstable();
            folds.push(fold);
            start += size;
        }

        Ok(Self {
            folds,
            n_rows: n,
            seed,
        })
    }

    /// Number of folds.
    #[must_use]
    pub fn k(&self) -> usize {
        self.folds.len()
    }

    /// Number of rows partitioned.
    #[must_use]
    pub const fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Seed the assignment was drawn with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Rows of fold `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= k`.
    #[must_use]
    pub fn fold(&self, i: usize) -> &[usize] {
        &self.folds[i]
    }

    /// Rows used for fitting when fold `i` is held out.
    #[must_use]
    pub fn fit_rows(&self, i: usize) -> Vec<usize> {
        self.folds
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .flat_map(|(_, fold)| fold.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_folds_partition_rows() {
        let folds = FoldAssignment::new(10, 3, 42).unwrap();
        let sizes: Vec<usize> = (0..3).map(|i| folds.fold(i).len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);

        let all: HashSet<usize> = (0..3).flat_map(|i| folds.fold(i).to_vec()).collect();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_fit_rows_exclude_holdout() {
        let folds = FoldAssignment::new(9, 3, 7).unwrap();
        for i in 0..3 {
            let fit = folds.fit_rows(i);
            assert_eq!(fit.len(), 6);
            assert!(fit.iter().all(|r| !folds.fold(i).contains(r)));
        }
    }

    #[test]
    fn test_folds_are_seeded() {
        assert_eq!(
            FoldAssignment::new(50, 5, 42).unwrap(),
            FoldAssignment::new(50, 5, 42).unwrap()
        );
        assert_ne!(
            FoldAssignment::new(50, 5, 42).unwrap(),
            FoldAssignment::new(50, 5, 43).unwrap()
        );
    }

    #[test]
    fn test_fold_count_validation() {
        assert!(FoldAssignment::new(10, 1, 0).is_err());
        assert!(FoldAssignment::new(2, 3, 0).is_err());
    }

    #[test]
    fn test_train_test_split_sizes() {
        let split = DataSplit::train_test(101, 0.2, 42).unwrap();
        assert_eq!(split.test().len(), 21);
        assert_eq!(split.train().len(), 80);

        let test: HashSet<_> = split.test().iter().collect();
        assert!(split.train().iter().all(|i| !test.contains(i)));
    }

    #[test]
    fn test_train_test_split_validation() {
        assert!(DataSplit::train_test(10, 0.0, 1).is_err());
        assert!(DataSplit::train_test(10, 1.0, 1).is_err());
        assert!(DataSplit::train_test(1, 0.5, 1).is_err());
    }
}
