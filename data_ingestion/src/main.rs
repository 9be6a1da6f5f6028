use anyhow::Result;
use data_ingestion::logger::init_logger;
use data_ingestion::{AppConfig, Candle, CandleStore};
use log::info;

const PREVIEW_ROWS: usize = 3;

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let config = AppConfig::from_env()?;
    let store = CandleStore::new(&config)?;

    let hourly = store.get(config.data.hourly()?).await?;
    summarize("Hourly", &hourly);

    let daily = store.daily(false).await?;
    summarize("Daily (UTC candles)", &daily);

    Ok(())
}

fn summarize(label: &str, candles: &[Candle]) {
    info!("{}:", label);
    let tail_start = candles.len().saturating_sub(PREVIEW_ROWS).max(PREVIEW_ROWS.min(candles.len()));
    for candle in candles.iter().take(PREVIEW_ROWS).chain(&candles[tail_start..]) {
        info!(
            "  {}  o={:.2} h={:.2} l={:.2} c={:.2} v={:.4}",
            candle.timestamp, candle.open, candle.high, candle.low, candle.close, candle.volume
        );
    }

    match (candles.first(), candles.last()) {
        (Some(first), Some(last)) => info!(
            "rows: {} range: {} -> {}",
            candles.len(),
            first.timestamp,
            last.timestamp
        ),
        _ => info!("rows: 0"),
    }
}
