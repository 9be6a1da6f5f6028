use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DataIngestionError;

/// One OHLCV candle keyed by its UTC open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// UTC calendar date the candle opened on.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Candle width, written the way exchanges spell it: `1h`, `4h`, `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Hours(u32),
    Days(u32),
}

impl Timeframe {
    pub const HOURLY: Timeframe = Timeframe::Hours(1);
    pub const DAILY: Timeframe = Timeframe::Days(1);

    pub fn duration(&self) -> Duration {
        match *self {
            Timeframe::Hours(n) => Duration::hours(n as i64),
            Timeframe::Days(n) => Duration::days(n as i64),
        }
    }

    /// How close to "now" the last fetched candle must be before pagination stops.
    pub fn near_now_delta(&self) -> Duration {
        match *self {
            Timeframe::Hours(n) => Duration::hours((n as i64 * 2).max(2)),
            Timeframe::Days(n) => Duration::days((n as i64).max(1)),
        }
    }
}

impl FromStr for Timeframe {
    type Err = DataIngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || DataIngestionError::InvalidTimeframe(s.to_string());

        let parse_count = |count: &str| match count.parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(invalid()),
        };

        if let Some(count) = s.strip_suffix('h') {
            Ok(Timeframe::Hours(parse_count(count)?))
        } else if let Some(count) = s.strip_suffix('d') {
            Ok(Timeframe::Days(parse_count(count)?))
        } else {
            Err(invalid())
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Hours(n) => write!(f, "{}h", n),
            Timeframe::Days(n) => write!(f, "{}d", n),
        }
    }
}

pub fn validate_candle(data: &Candle) -> bool {
    let mut is_valid = true;
    let fields = [
        ("open", data.open),
        ("high", data.high),
        ("low", data.low),
        ("close", data.close),
        ("volume", data.volume),
    ];

    for (name, value) in fields {
        if !value.is_finite() {
            warn!("{} at {} is not a finite number", name, data.timestamp);
            is_valid = false;
        } else if value < 0.0 {
            warn!("{} at {} cannot be negative", name, data.timestamp);
            is_valid = false;
        }
    }

    if data.high < data.low {
        warn!("High below low at {}", data.timestamp);
        is_valid = false;
    }

    is_valid
}

/// Drops invalid rows, sorts ascending by timestamp and keeps the first row per timestamp.
pub fn normalize_candles(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.retain(validate_candle);
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    candles
}

/// Removes candles that had not closed yet at `now`.
pub fn drop_incomplete(mut candles: Vec<Candle>, timeframe: Timeframe, now: DateTime<Utc>) -> Vec<Candle> {
    let width = timeframe.duration();
    candles.retain(|c| c.timestamp + width <= now);
    candles
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(day: u32, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn test_parse_timeframes() {
        assert_eq!("1h".parse::<Timeframe>().unwrap(), Timeframe::HOURLY);
        assert_eq!("1d".parse::<Timeframe>().unwrap(), Timeframe::DAILY);
        assert_eq!(" 4h ".parse::<Timeframe>().unwrap(), Timeframe::Hours(4));
        assert!("0d".parse::<Timeframe>().is_err());
        assert!("1w".parse::<Timeframe>().is_err());
        assert!("h".parse::<Timeframe>().is_err());
        assert_eq!(Timeframe::Days(3).to_string(), "3d");
    }

    #[test]
    fn test_near_now_delta() {
        assert_eq!(Timeframe::HOURLY.near_now_delta(), Duration::hours(2));
        assert_eq!(Timeframe::DAILY.near_now_delta(), Duration::days(1));
        assert_eq!(Timeframe::Hours(4).near_now_delta(), Duration::hours(8));
        assert_eq!(Timeframe::Days(3).near_now_delta(), Duration::days(3));
    }

    #[test]
    fn test_normalize_sorts_dedupes_and_drops_invalid() {
        let mut bad = candle(4, 100.0);
        bad.close = -1.0;
        let mut duplicate = candle(1, 100.0);
        duplicate.close = 999.0;

        let cleaned = normalize_candles(vec![candle(3, 103.0), candle(1, 101.0), duplicate, bad, candle(2, 102.0)]);

        let closes: Vec<f64> = cleaned.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![101.0, 102.0, 103.0]);
    }

    #[test]
    fn test_validate_rejects_nan_and_inverted_range() {
        let mut nan = candle(1, 100.0);
        nan.volume = f64::NAN;
        assert!(!validate_candle(&nan));

        let mut inverted = candle(1, 100.0);
        inverted.high = 90.0;
        assert!(!validate_candle(&inverted));

        assert!(validate_candle(&candle(1, 100.0)));
    }

    #[test]
    fn test_drop_incomplete_removes_open_candle() {
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let kept = drop_incomplete(vec![candle(1, 1.0), candle(2, 2.0), candle(3, 3.0)], Timeframe::DAILY, now);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.last().unwrap().date(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }
}
