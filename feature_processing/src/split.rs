use std::ops::Range;

use crate::error::FeatureError;

/// Row ranges of one time-ordered evaluation: every training row precedes every test row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSplit {
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Holds out the most recent `test_fraction` of `n` rows.
pub fn chronological_split(n: usize, test_fraction: f64) -> Result<TimeSplit, FeatureError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(FeatureError::InvalidSplit(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let n_test = ((n as f64 * test_fraction).round() as usize).max(1);
    if n_test >= n {
        return Err(FeatureError::InvalidSplit(format!(
            "{} rows cannot hold both a training and a test window",
            n
        )));
    }

    let n_train = n - n_test;
    Ok(TimeSplit {
        train: 0..n_train,
        test: n_train..n,
    })
}

/// Expanding-window forward chaining. The first fold trains on `min_train`
/// rows; each later fold trains on everything before its test window. The
/// last test window absorbs the remainder.
pub fn walk_forward_splits(n: usize, n_splits: usize, min_train: usize) -> Result<Vec<TimeSplit>, FeatureError> {
    if n_splits == 0 {
        return Err(FeatureError::InvalidSplit("need at least one split".to_string()));
    }
    if min_train == 0 || min_train >= n {
        return Err(FeatureError::InvalidSplit(format!(
            "minimum training size {} does not fit {} rows",
            min_train, n
        )));
    }

    let test_size = (n - min_train) / n_splits;
    if test_size == 0 {
        return Err(FeatureError::InvalidSplit(format!(
            "{} rows after the first training window cannot form {} test windows",
            n - min_train,
            n_splits
        )));
    }

    let splits = (0..n_splits)
        .map(|k| {
            let start = min_train + k * test_size;
            let end = if k + 1 == n_splits { n } else { start + test_size };
            TimeSplit {
                train: 0..start,
                test: start..end,
            }
        })
        .collect();
    Ok(splits)
}
