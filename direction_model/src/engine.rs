use chrono::{DateTime, NaiveDate, Utc};
use data_ingestion::config::ModelConfig;
use feature_processing::{Dataset, Direction};
use log::{debug, info};
use serde::Serialize;

use crate::artifact::ModelArtifact;
use crate::error::ModelError;
use crate::logistic::LogisticRegression;
use crate::scaler::StandardScaler;

/// Forecast for the day after `as_of`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub symbol: String,
    /// Last closed UTC day the features were computed from.
    pub as_of: NaiveDate,
    pub target_date: NaiveDate,
    pub p_up: f64,
    pub direction: Direction,
    pub generated_at: DateTime<Utc>,
}

pub struct Forecaster {
    config: ModelConfig,
    symbol: String,
}

impl Forecaster {
    pub fn new(config: ModelConfig, symbol: impl Into<String>) -> Self {
        Self {
            config,
            symbol: symbol.into(),
        }
    }

    /// Fits the scaler and model on every labeled row.
    pub fn train(&self, dataset: &Dataset) -> Result<ModelArtifact, ModelError> {
        let trained_through = dataset.last_date().ok_or(ModelError::EmptyTrainingSet)?;

        let scaler = StandardScaler::fit(&dataset.features)?;
        let mut model = LogisticRegression::from_config(&self.config);
        model.fit(&scaler.transform(&dataset.features)?, &dataset.labels)?;
        debug!("{}", model.summary(&dataset.feature_names));

        let coefficients = model.coefficients.ok_or(ModelError::NotFitted)?;
        let intercept = model.intercept.ok_or(ModelError::NotFitted)?;

        info!(
            "Trained on {} rows through {} (up-rate {:.3})",
            dataset.len(),
            trained_through,
            dataset.up_rate()
        );

        Ok(ModelArtifact {
            symbol: self.symbol.clone(),
            feature_names: dataset.feature_names.clone(),
            scaler,
            coefficients: coefficients.to_vec(),
            intercept,
            trained_through,
            trained_at: Utc::now(),
        })
    }

    /// Scores the dataset's latest unlabeled row; `None` when there is none.
    pub fn predict_latest(&self, artifact: &ModelArtifact, dataset: &Dataset) -> Result<Option<Prediction>, ModelError> {
        artifact.check_features(&dataset.feature_names)?;
        let Some(latest) = &dataset.latest else {
            return Ok(None);
        };
        let Some(target_date) = latest.date.succ_opt() else {
            return Ok(None);
        };

        let p_up = artifact.predict_proba_row(&latest.features)?;
        Ok(Some(Prediction {
            symbol: artifact.symbol.clone(),
            as_of: latest.date,
            target_date,
            p_up,
            direction: Direction::from_probability(p_up, self.config.threshold),
            generated_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::tests::synthetic_dataset;
    use feature_processing::LatestRow;
    use ndarray::array;

    #[test]
    fn test_train_records_layout_and_date() {
        let dataset = synthetic_dataset(150);
        let forecaster = Forecaster::new(ModelConfig::default(), "BTC/USD");
        let artifact = forecaster.train(&dataset).unwrap();

        assert_eq!(artifact.feature_names, dataset.feature_names);
        assert_eq!(artifact.coefficients.len(), 2);
        assert_eq!(artifact.trained_through, dataset.last_date().unwrap());
        assert!(artifact.coefficients[0] > 0.0);
    }

    #[test]
    fn test_predicts_the_next_day() {
        let mut dataset = synthetic_dataset(150);
        let as_of = dataset.last_date().unwrap().succ_opt().unwrap();
        dataset.latest = Some(LatestRow {
            date: as_of,
            features: array![0.9, 0.0],
        });

        let forecaster = Forecaster::new(ModelConfig::default(), "BTC/USD");
        let artifact = forecaster.train(&dataset).unwrap();
        let prediction = forecaster.predict_latest(&artifact, &dataset).unwrap().unwrap();

        assert_eq!(prediction.as_of, as_of);
        assert_eq!(prediction.target_date, as_of.succ_opt().unwrap());
        assert!(prediction.p_up > 0.5);
        assert_eq!(prediction.direction, Direction::Up);
        assert_eq!(prediction.symbol, "BTC/USD");
    }

    #[test]
    fn test_no_latest_row_means_no_prediction() {
        let dataset = synthetic_dataset(150);
        let forecaster = Forecaster::new(ModelConfig::default(), "BTC/USD");
        let artifact = forecaster.train(&dataset).unwrap();

        assert!(forecaster.predict_latest(&artifact, &dataset).unwrap().is_none());
    }

    #[test]
    fn test_single_class_history_is_rejected() {
        let mut dataset = synthetic_dataset(50);
        dataset.labels.fill(1.0);
        let forecaster = Forecaster::new(ModelConfig::default(), "BTC/USD");

        assert!(matches!(forecaster.train(&dataset), Err(ModelError::SingleClass)));
    }
}
