use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::ModelError;
use crate::logistic::LogisticRegression;
use crate::scaler::StandardScaler;

/// Everything needed to score a feature row later: the fitted scaler and the
/// logistic coefficients, tagged with the feature layout they expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub symbol: String,
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Date of the last labeled row used for training.
    pub trained_through: NaiveDate,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;
        info!("Saved model artifact to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let reader = BufReader::new(File::open(path)?);
        let artifact: ModelArtifact = bincode::deserialize_from(reader)?;
        if artifact.coefficients.len() != artifact.scaler.n_features() {
            return Err(ModelError::DimensionMismatch {
                expected: artifact.scaler.n_features(),
                got: artifact.coefficients.len(),
            });
        }
        Ok(artifact)
    }

    /// Loads and checks that the stored feature layout matches `feature_names`.
    pub fn load_for(path: &Path, feature_names: &[String]) -> Result<Self, ModelError> {
        let artifact = Self::load(path)?;
        artifact.check_features(feature_names)?;
        Ok(artifact)
    }

    pub fn check_features(&self, feature_names: &[String]) -> Result<(), ModelError> {
        if self.feature_names != feature_names {
            return Err(ModelError::FeatureMismatch {
                expected: self.feature_names.clone(),
                got: feature_names.to_vec(),
            });
        }
        Ok(())
    }

    pub fn model(&self) -> LogisticRegression {
        LogisticRegression::from_parameters(Array1::from_vec(self.coefficients.clone()), self.intercept)
    }

    /// P(up) for one unscaled feature row.
    pub fn predict_proba_row(&self, row: &Array1<f64>) -> Result<f64, ModelError> {
        let scaled = self.scaler.transform_row(row)?;
        self.model().predict_proba_row(&scaled)
    }
}
