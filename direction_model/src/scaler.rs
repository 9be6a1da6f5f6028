use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

const MIN_STD: f64 = 1e-12;

/// Per-column z-scoring. Fit on training rows only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl StandardScaler {
    /// Constant columns get a unit std so they transform to zero.
    pub fn fit(x: &Array2<f64>) -> Result<Self, ModelError> {
        let means = x.mean_axis(Axis(0)).ok_or(ModelError::EmptyTrainingSet)?;
        let stds = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > MIN_STD { s } else { 1.0 });

        Ok(Self {
            means: means.to_vec(),
            stds: stds.to_vec(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        self.check(x.ncols())?;
        let means = Array1::from_vec(self.means.clone());
        let stds = Array1::from_vec(self.stds.clone());
        Ok((x - &means) / &stds)
    }

    pub fn transform_row(&self, row: &Array1<f64>) -> Result<Array1<f64>, ModelError> {
        self.check(row.len())?;
        Ok(Array1::from_iter(
            row.iter()
                .zip(self.means.iter().zip(&self.stds))
                .map(|(v, (m, s))| (v - m) / s),
        ))
    }

    fn check(&self, got: usize) -> Result<(), ModelError> {
        if got != self.n_features() {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features(),
                got,
            });
        }
        Ok(())
    }
}
