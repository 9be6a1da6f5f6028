use anyhow::{Context, Result};
use data_ingestion::logger::init_logger;
use data_ingestion::{AppConfig, CandleStore};
use feature_processing::Dataset;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let config = AppConfig::from_env()?;
    let store = CandleStore::new(&config)?;
    let candles = store.daily(false).await?;

    let dataset = Dataset::from_candles(&candles).context("Failed to build the daily feature set")?;

    let stem = config.exchange.symbol.to_lowercase().replace(['/', '-'], "_");
    let path = config
        .data
        .processed_data_dir
        .join(format!("{}_features_1d.csv", stem));
    dataset.write_csv(&path)?;

    info!(
        "Wrote {} labeled rows ({} features, up-rate {:.3}) to {}",
        dataset.len(),
        dataset.n_features(),
        dataset.up_rate(),
        path.display()
    );
    if let Some(latest) = &dataset.latest {
        info!("Latest unlabeled day: {}", latest.date);
    }

    Ok(())
}
