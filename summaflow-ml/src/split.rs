//! Seeded train/validation/test splitting.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use summaflow_core::{PipelineError, Result, SplitRatios, Table};

/// Absorbs float noise such as `(1.0 - 0.8) * 10.0 = 1.9999999999999996`.
const CEIL_EPSILON: f64 = 1e-9;

/// Row indices on each side of a two-way split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split `0..n` into a train and a test side.
///
/// The test side gets `ceil(test_size * n)` rows; the rest go to train.
/// Indices are drawn from a permutation seeded with `seed`, the first
/// `n_test` of which form the test side.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::invalid_input(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    let n_test = ((test_size * n as f64) - CEIL_EPSILON).ceil().max(0.0) as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(PipelineError::invalid_input(format!(
            "with n_samples={n} and test_size={test_size} one side of the split would be empty"
        )));
    }

    let mut permutation: Vec<usize> = (0..n).collect();
    permutation.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = permutation.split_off(n_test);
    Ok(SplitIndices {
        train,
        test: permutation,
    })
}

/// The three partitions produced by [`three_way_split`].
#[derive(Debug, Clone, PartialEq)]
pub struct Partitions {
    pub train: Table,
    pub val: Table,
    pub test: Table,
}

/// Hold out `1 - train_size` of the rows, then split the held-out part into
/// validation and test in proportion to `val_size : test_size`. Both stages
/// use `random_state` as their seed.
pub fn three_way_split(table: &Table, ratios: &SplitRatios) -> Result<Partitions> {
    ratios.validate()?;
    let holdout_size = 1.0 - ratios.train_size;
    let first = train_test_split(table.row_count(), holdout_size, ratios.random_state)?;
    let holdout = table.select(&first.test);

    let second = train_test_split(
        holdout.row_count(),
        ratios.test_share_of_holdout(),
        ratios.random_state,
    )?;

    let partitions = Partitions {
        train: table.select(&first.train),
        val: holdout.select(&second.train),
        test: holdout.select(&second.test),
    };
    tracing::info!(
        train = partitions.train.row_count(),
        val = partitions.val.row_count(),
        test = partitions.test.row_count(),
        seed = ratios.random_state,
        "Dataset split"
    );
    Ok(partitions)
}
