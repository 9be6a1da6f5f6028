use chrono::NaiveDate;
use data_ingestion::Candle;
use polars::prelude::*;
use std::collections::BTreeMap;

use crate::error::FeatureError;
use crate::labels::label_candles;

pub const FEATURE_NAMES: [&str; 9] = [
    "return_1d",
    "return_3d",
    "return_7d",
    "momentum_5d",
    "volatility_10d",
    "range_pct",
    "body_pct",
    "volume_ratio",
    "acceleration",
];

fn window(size: usize) -> RollingOptions {
    RollingOptions {
        window_size: Duration::parse(&format!("{}i", size)),
        min_periods: size,
        ..Default::default()
    }
}

fn trailing_return(periods: i64) -> Expr {
    col("close") / col("close").shift(lit(periods)) - lit(1.0)
}

/// Candles as a frame on a complete UTC calendar: `timestamp` (ms), OHLCV and
/// the nullable next-day `label`. Days missing from `candles` become all-null
/// rows, so look-back windows that cross a gap come out null instead of
/// silently spanning it.
pub fn to_dataframe(candles: &[Candle]) -> Result<DataFrame, FeatureError> {
    let labels = label_candles(candles)?;
    let by_date: BTreeMap<NaiveDate, (&Candle, Option<f64>)> = candles
        .iter()
        .zip(labels)
        .map(|(c, label)| (c.date(), (c, label.map(|d| d.as_f64()))))
        .collect();

    let mut timestamp: Vec<i64> = Vec::with_capacity(by_date.len());
    let mut open: Vec<Option<f64>> = Vec::with_capacity(by_date.len());
    let mut high: Vec<Option<f64>> = Vec::with_capacity(by_date.len());
    let mut low: Vec<Option<f64>> = Vec::with_capacity(by_date.len());
    let mut close: Vec<Option<f64>> = Vec::with_capacity(by_date.len());
    let mut volume: Vec<Option<f64>> = Vec::with_capacity(by_date.len());
    let mut label: Vec<Option<f64>> = Vec::with_capacity(by_date.len());

    if let (Some(&first), Some(&last)) = (by_date.keys().next(), by_date.keys().next_back()) {
        for date in first.iter_days().take_while(|d| *d <= last) {
            match by_date.get(&date) {
                Some((c, l)) => {
                    timestamp.push(c.timestamp.timestamp_millis());
                    open.push(Some(c.open));
                    high.push(Some(c.high));
                    low.push(Some(c.low));
                    close.push(Some(c.close));
                    volume.push(Some(c.volume));
                    label.push(*l);
                }
                None => {
                    let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
                        continue;
                    };
                    timestamp.push(midnight.and_utc().timestamp_millis());
                    open.push(None);
                    high.push(None);
                    low.push(None);
                    close.push(None);
                    volume.push(None);
                    label.push(None);
                }
            }
        }
    }

    let df = DataFrame::new(vec![
        Series::new("timestamp", timestamp),
        Series::new("open", open),
        Series::new("high", high),
        Series::new("low", low),
        Series::new("close", close),
        Series::new("volume", volume),
        Series::new("label", label),
    ])?;
    Ok(df)
}

/// Adds every column of [`FEATURE_NAMES`] and drops the warm-up rows.
///
/// Each feature on a row only looks at that row and earlier ones, so the
/// label column never leaks into the inputs.
pub fn extract_features(df: DataFrame) -> Result<DataFrame, FeatureError> {
    let lf = df.lazy();

    let df = lf
        .with_columns([
            trailing_return(1).alias("return_1d"),
            trailing_return(3).alias("return_3d"),
            trailing_return(7).alias("return_7d"),
            // Intraday range relative to the close
            ((col("high") - col("low")) / col("close")).alias("range_pct"),
            ((col("close") - col("open")) / col("open")).alias("body_pct"),
            // Volume ratio (current volume vs 10-period average)
            (col("volume") / col("volume").rolling_mean(window(10))).alias("volume_ratio"),
        ])
        .with_columns([
            // Price momentum (5-period mean of daily returns)
            col("return_1d").rolling_mean(window(5)).alias("momentum_5d"),
            // Price volatility (10-period std of daily returns)
            col("return_1d").rolling_std(window(10)).alias("volatility_10d"),
            // Price acceleration (difference of daily returns)
            (col("return_1d") - col("return_1d").shift(lit(1))).alias("acceleration"),
        ])
        .drop_nulls(Some(FEATURE_NAMES.iter().map(|&name| col(name)).collect()))
        .collect()?;

    Ok(df)
}

pub fn build_feature_frame(candles: &[Candle]) -> Result<DataFrame, FeatureError> {
    extract_features(to_dataframe(candles)?)
}
