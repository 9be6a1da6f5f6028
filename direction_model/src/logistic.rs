//! Binary logistic regression for next-day direction.
//!
//! Batch gradient descent on mean log loss with an optional L2 penalty on the
//! coefficients (the intercept is not penalised).

use data_ingestion::config::ModelConfig;
use log::debug;
use ndarray::{Array1, Array2};

use crate::error::ModelError;

const EPS: f64 = 1e-15;

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    learning_rate: f64,
    max_iter: usize,
    tolerance: f64,
    l2: f64,
    /// Penalised log loss after each iteration of the last fit.
    pub cost_history: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(0.1, 5000, 1e-7, 0.01)
    }
}

impl LogisticRegression {
    pub fn new(learning_rate: f64, max_iter: usize, tolerance: f64, l2: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            learning_rate,
            max_iter,
            tolerance,
            l2,
            cost_history: Vec::new(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.learning_rate, config.max_iter, config.tolerance, config.l2)
    }

    /// Rebuilds a fitted model from stored parameters.
    pub fn from_parameters(coefficients: Array1<f64>, intercept: f64) -> Self {
        Self {
            coefficients: Some(coefficients),
            intercept: Some(intercept),
            ..Self::default()
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    /// Numerically stable sigmoid.
    pub fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let exp_z = z.exp();
            exp_z / (1.0 + exp_z)
        }
    }

    fn log_loss(y: &Array1<f64>, p: &Array1<f64>) -> f64 {
        let n = y.len() as f64;
        -y.iter()
            .zip(p.iter())
            .map(|(&t, &p)| {
                let p = p.clamp(EPS, 1.0 - EPS);
                t * p.ln() + (1.0 - t) * (1.0 - p).ln()
            })
            .sum::<f64>()
            / n
    }

    /// `y` holds 0/1 labels, one per row of `x`.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        if x.nrows() != y.len() {
            return Err(ModelError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        let ups = y.iter().filter(|&&t| t >= 0.5).count();
        if ups == 0 || ups == y.len() {
            return Err(ModelError::SingleClass);
        }

        let n_samples = x.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        self.cost_history.clear();

        for iter in 0..self.max_iter {
            let predictions = (x.dot(&weights) + bias).mapv(Self::sigmoid);
            let errors = &predictions - y;

            let dw = x.t().dot(&errors) / n_samples + &weights * self.l2;
            let db = errors.sum() / n_samples;

            let penalty = 0.5 * self.l2 * weights.dot(&weights);
            let cost = Self::log_loss(y, &predictions) + penalty;

            weights = &weights - &(dw * self.learning_rate);
            bias -= self.learning_rate * db;

            if let Some(&previous) = self.cost_history.last() {
                if (previous - cost).abs() < self.tolerance {
                    self.cost_history.push(cost);
                    debug!("Converged at iteration {} with cost {:.6}", iter, cost);
                    break;
                }
            }
            self.cost_history.push(cost);
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        Ok(())
    }

    /// P(up) for each row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let weights = self.coefficients.as_ref().ok_or(ModelError::NotFitted)?;
        let bias = self.intercept.ok_or(ModelError::NotFitted)?;
        if x.ncols() != weights.len() {
            return Err(ModelError::DimensionMismatch {
                expected: weights.len(),
                got: x.ncols(),
            });
        }
        Ok((x.dot(weights) + bias).mapv(Self::sigmoid))
    }

    pub fn predict_proba_row(&self, row: &Array1<f64>) -> Result<f64, ModelError> {
        let weights = self.coefficients.as_ref().ok_or(ModelError::NotFitted)?;
        let bias = self.intercept.ok_or(ModelError::NotFitted)?;
        if row.len() != weights.len() {
            return Err(ModelError::DimensionMismatch {
                expected: weights.len(),
                got: row.len(),
            });
        }
        Ok(Self::sigmoid(row.dot(weights) + bias))
    }

    /// 0/1 calls at `threshold`.
    pub fn predict(&self, x: &Array2<f64>, threshold: f64) -> Result<Array1<f64>, ModelError> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p >= threshold { 1.0 } else { 0.0 }))
    }

    pub fn summary(&self, feature_names: &[String]) -> String {
        let (Some(coef), Some(intercept)) = (&self.coefficients, self.intercept) else {
            return "Model not fitted yet.".to_string();
        };

        let mut s = format!("Intercept: {:.6}\nCoefficients (log-odds per std):\n", intercept);
        for (name, c) in feature_names.iter().zip(coef.iter()) {
            s.push_str(&format!("  {:16} {:>10.6} (OR: {:.4})\n", name, c, c.exp()));
        }
        s.push_str(&format!(
            "Iterations: {}, final cost: {:.6}",
            self.cost_history.len(),
            self.cost_history.last().copied().unwrap_or(f64::NAN)
        ));
        s
    }
}
