use chrono::{DateTime, Utc};
use csv::{Reader, Writer};
use log::{info, warn};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::aggregate::aggregate_daily;
use crate::candle::{Candle, Timeframe, drop_incomplete, normalize_candles};
use crate::config::{AppConfig, DailySource};
use crate::error::DataIngestionError;
use crate::fetcher::CandleFetcher;

/// `data/raw` + `BTC/USD` + `1d` -> `data/raw/btc_usd_1d.csv`
pub fn cache_path(raw_dir: &Path, symbol: &str, timeframe: Timeframe) -> PathBuf {
    let stem = symbol.to_lowercase().replace(['/', '-', ' '], "_");
    raw_dir.join(format!("{}_{}.csv", stem, timeframe))
}

pub fn load_candles(path: &Path) -> Result<Vec<Candle>, DataIngestionError> {
    let file = File::open(path)?;
    let mut reader = Reader::from_reader(file);

    let mut candles = Vec::new();
    for result in reader.deserialize() {
        let candle: Candle = result?;
        candles.push(candle);
    }

    Ok(normalize_candles(candles))
}

pub fn save_candles(path: &Path, candles: &[Candle]) -> Result<(), DataIngestionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(path)?;
    for candle in candles {
        writer.serialize(candle)?;
    }
    writer.flush()?;
    Ok(())
}

/// Cache-first access to closed candles for the configured market.
pub struct CandleStore {
    fetcher: CandleFetcher,
    raw_dir: PathBuf,
    symbol: String,
    use_cache: bool,
    daily_source: DailySource,
    hourly: Timeframe,
    daily: Timeframe,
}

impl CandleStore {
    pub fn new(config: &AppConfig) -> Result<Self, DataIngestionError> {
        Ok(Self {
            fetcher: CandleFetcher::new(&config.exchange, config.data.years_of_history)?,
            raw_dir: config.data.raw_data_dir.clone(),
            symbol: config.exchange.symbol.clone(),
            use_cache: config.data.use_cache,
            daily_source: config.data.daily_source,
            hourly: config.data.hourly()?,
            daily: config.data.daily()?,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn cache_path(&self, timeframe: Timeframe) -> PathBuf {
        cache_path(&self.raw_dir, &self.symbol, timeframe)
    }

    /// Reads the cache when enabled and present, otherwise fetches and caches.
    pub async fn get(&self, timeframe: Timeframe) -> Result<Vec<Candle>, DataIngestionError> {
        let path = self.cache_path(timeframe);
        if self.use_cache && path.exists() {
            let candles = load_candles(&path)?;
            info!("Loaded {} {} candles from {}", candles.len(), timeframe, path.display());
            return Ok(candles);
        }
        self.refresh_at(timeframe, Utc::now()).await
    }

    /// Always fetches, replacing the cache file when caching is enabled.
    pub async fn refresh(&self, timeframe: Timeframe) -> Result<Vec<Candle>, DataIngestionError> {
        self.refresh_at(timeframe, Utc::now()).await
    }

    async fn refresh_at(&self, timeframe: Timeframe, now: DateTime<Utc>) -> Result<Vec<Candle>, DataIngestionError> {
        let fetched = self.fetcher.fetch_full(timeframe, now).await?;
        let candles = drop_incomplete(fetched, timeframe, now);
        if candles.is_empty() {
            warn!("No closed {} candles returned for {}", timeframe, self.symbol);
        }

        if self.use_cache {
            let path = self.cache_path(timeframe);
            save_candles(&path, &candles)?;
            info!("Cached {} {} candles at {}", candles.len(), timeframe, path.display());
        }
        Ok(candles)
    }

    /// Closed UTC daily candles, either native or rebuilt from hourly ones.
    pub async fn daily(&self, fresh: bool) -> Result<Vec<Candle>, DataIngestionError> {
        match self.daily_source {
            DailySource::Exchange if fresh => self.refresh(self.daily).await,
            DailySource::Exchange => self.get(self.daily).await,
            DailySource::Hourly => {
                let hourly = if fresh {
                    self.refresh(self.hourly).await?
                } else {
                    self.get(self.hourly).await?
                };
                // a stale cache or the current UTC day may cover only part of a day
                Ok(drop_incomplete(aggregate_daily(&hourly, self.hourly), Timeframe::DAILY, Utc::now()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use tempfile::tempdir;

    fn candle(day: u32, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 2, day, 0, 0, 0).unwrap(),
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 5.5,
        }
    }

    #[test]
    fn test_cache_path_naming() {
        let path = cache_path(Path::new("data/raw"), "BTC/USD", Timeframe::DAILY);
        assert_eq!(path, PathBuf::from("data/raw/btc_usd_1d.csv"));
    }

    #[test]
    fn test_save_and_load_candles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("btc_usd_1d.csv");

        save_candles(&path, &[candle(2, 102.0), candle(1, 101.0)]).unwrap();
        let loaded = load_candles(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], candle(1, 101.0));
        assert_eq!(loaded[1].close, 102.0);
    }

    #[test]
    fn test_load_dedupes_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dupes.csv");
        fs::write(
            &path,
            "timestamp,open,high,low,close,volume\n\
             2024-02-02T00:00:00Z,1,3,0.5,2,10\n\
             2024-02-01T00:00:00Z,1,3,0.5,2,10\n\
             2024-02-02T00:00:00Z,9,9,9,9,9\n",
        )
        .unwrap();

        let loaded = load_candles(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].close, 2.0);
    }

    #[tokio::test]
    async fn test_store_prefers_cache() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.data.raw_data_dir = dir.path().to_path_buf();
        // unreachable, the cache must satisfy the request
        config.exchange.base_url = Some("http://127.0.0.1:9".to_string());

        let store = CandleStore::new(&config).unwrap();
        save_candles(&store.cache_path(Timeframe::DAILY), &[candle(1, 101.0), candle(2, 99.0)]).unwrap();

        let candles = store.daily(false).await.unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(store.symbol(), "BTC/USD");
    }

    #[tokio::test]
    async fn test_hourly_source_ignores_partially_cached_day() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.data.raw_data_dir = dir.path().to_path_buf();
        config.data.daily_source = DailySource::Hourly;
        config.exchange.base_url = Some("http://127.0.0.1:9".to_string());

        let hour = |day: u32, h: u32| Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, h, 0, 0).unwrap(),
            open: 100.0,
            high: 120.0,
            low: 90.0,
            close: 100.0 + h as f64,
            volume: 1.0,
        };
        let mut hourly: Vec<Candle> = (0..24).map(|h| hour(1, h)).collect();
        hourly.extend((0..12).map(|h| hour(2, h)));

        let store = CandleStore::new(&config).unwrap();
        save_candles(&store.cache_path(Timeframe::HOURLY), &hourly).unwrap();

        let daily = store.daily(false).await.unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(daily[0].close, 123.0);
    }
}
