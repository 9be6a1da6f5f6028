use anyhow::{Context, Result};
use data_ingestion::config::{EvaluationConfig, ModelConfig};
use data_ingestion::{AppConfig, Candle, CandleStore};
use feature_processing::Dataset;
use log::info;

use crate::artifact::ModelArtifact;
use crate::engine::{Forecaster, Prediction};
use crate::error::ModelError;
use crate::evaluation::{EvaluationReport, evaluate};

pub struct PipelineOutput {
    pub report: EvaluationReport,
    pub prediction: Option<Prediction>,
    pub artifact: ModelArtifact,
}

/// Builds the dataset, evaluates out of sample, then trains on all labeled
/// rows and scores the newest closed day.
pub fn train_and_evaluate(
    candles: &[Candle],
    symbol: &str,
    model_config: &ModelConfig,
    eval_config: &EvaluationConfig,
) -> Result<PipelineOutput, ModelError> {
    let dataset = Dataset::from_candles(candles)?;
    info!(
        "Dataset: {} labeled rows, {} features, {:?} to {:?}",
        dataset.len(),
        dataset.n_features(),
        dataset.first_date(),
        dataset.last_date()
    );

    let report = evaluate(&dataset, model_config, eval_config)?;

    let forecaster = Forecaster::new(model_config.clone(), symbol);
    let artifact = forecaster.train(&dataset)?;
    let prediction = forecaster.predict_latest(&artifact, &dataset)?;

    Ok(PipelineOutput {
        report,
        prediction,
        artifact,
    })
}

/// Loads daily candles (fetching when `fresh`) and runs the CPU-bound part
/// off the async runtime.
pub async fn run_pipeline(config: &AppConfig, store: &CandleStore, fresh: bool) -> Result<PipelineOutput> {
    let candles = store.daily(fresh).await.context("Failed to load daily candles")?;
    info!("Loaded {} daily candles for {}", candles.len(), store.symbol());

    let symbol = store.symbol().to_string();
    let model_config = config.model.clone();
    let eval_config = config.evaluation.clone();

    let output = tokio::task::spawn_blocking(move || {
        train_and_evaluate(&candles, &symbol, &model_config, &eval_config)
    })
    .await
    .context("Training task panicked")??;

    Ok(output)
}
