//! Time-ordered evaluation: one hold-out window plus walk-forward folds.

use chrono::NaiveDate;
use data_ingestion::config::{EvaluationConfig, ModelConfig};
use feature_processing::split::{chronological_split, walk_forward_splits};
use feature_processing::{Dataset, TimeSplit};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::ModelError;
use crate::logistic::LogisticRegression;
use crate::metrics::ClassificationReport;
use crate::scaler::StandardScaler;

#[derive(Debug, Clone, Serialize)]
pub struct FoldReport {
    pub fold: usize,
    pub train_rows: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub metrics: ClassificationReport,
}

impl FoldReport {
    pub fn summary(&self) -> String {
        format!(
            "fold {} train {}..{} ({} rows) test {}..{}: {}",
            self.fold,
            self.train_start,
            self.train_end,
            self.train_rows,
            self.test_start,
            self.test_end,
            self.metrics.summary()
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub holdout: FoldReport,
    pub walk_forward: Vec<FoldReport>,
    /// Mean over folds with a defined AUC.
    pub mean_auc: Option<f64>,
    pub mean_accuracy: Option<f64>,
}

impl EvaluationReport {
    pub fn log(&self) {
        info!("Hold-out {}", self.holdout.summary());
        for fold in &self.walk_forward {
            info!("Walk-forward {}", fold.summary());
        }
        if let (Some(auc), Some(accuracy)) = (self.mean_auc, self.mean_accuracy) {
            info!(
                "Walk-forward mean over {} folds: auc={:.4} accuracy={:.4}",
                self.walk_forward.len(),
                auc,
                accuracy
            );
        }
    }
}

/// Fits scaler and model on `split.train` and scores `split.test`.
pub fn evaluate_split(
    dataset: &Dataset,
    split: &TimeSplit,
    fold: usize,
    config: &ModelConfig,
) -> Result<FoldReport, ModelError> {
    let train = dataset.slice(split.train.clone());
    let test = dataset.slice(split.test.clone());
    let (Some(train_start), Some(train_end), Some(test_start), Some(test_end)) = (
        train.first_date(),
        train.last_date(),
        test.first_date(),
        test.last_date(),
    ) else {
        return Err(ModelError::EmptyTrainingSet);
    };

    let scaler = StandardScaler::fit(&train.features)?;
    let mut model = LogisticRegression::from_config(config);
    model.fit(&scaler.transform(&train.features)?, &train.labels)?;

    let p_up = model.predict_proba(&scaler.transform(&test.features)?)?;
    let metrics = ClassificationReport::compute(&test.labels, &p_up, config.threshold);

    Ok(FoldReport {
        fold,
        train_rows: train.len(),
        train_start,
        train_end,
        test_start,
        test_end,
        metrics,
    })
}

pub fn evaluate_holdout(dataset: &Dataset, config: &ModelConfig, test_fraction: f64) -> Result<FoldReport, ModelError> {
    let split = chronological_split(dataset.len(), test_fraction)?;
    evaluate_split(dataset, &split, 0, config)
}

/// Folds run on the rayon pool and come back in chronological order.
pub fn evaluate_walk_forward(
    dataset: &Dataset,
    config: &ModelConfig,
    n_splits: usize,
    min_train: usize,
) -> Result<Vec<FoldReport>, ModelError> {
    let splits = walk_forward_splits(dataset.len(), n_splits, min_train)?;
    splits
        .par_iter()
        .enumerate()
        .map(|(k, split)| evaluate_split(dataset, split, k + 1, config))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Hold-out plus walk-forward. A walk-forward layout that does not fit the
/// data is skipped with a warning rather than failing the run.
pub fn evaluate(
    dataset: &Dataset,
    model_config: &ModelConfig,
    eval_config: &EvaluationConfig,
) -> Result<EvaluationReport, ModelError> {
    let holdout = evaluate_holdout(dataset, model_config, eval_config.test_fraction)?;

    let walk_forward = match evaluate_walk_forward(
        dataset,
        model_config,
        eval_config.walk_forward_splits,
        eval_config.min_train_size,
    ) {
        Ok(folds) => folds,
        Err(ModelError::Feature(e)) => {
            warn!("Skipping walk-forward evaluation: {}", e);
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    Ok(EvaluationReport {
        mean_auc: mean(walk_forward.iter().filter_map(|f| f.metrics.auc)),
        mean_accuracy: mean(walk_forward.iter().map(|f| f.metrics.accuracy)),
        holdout,
        walk_forward,
    })
}
