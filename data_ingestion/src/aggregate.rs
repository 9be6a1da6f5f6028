use chrono::{NaiveDate, TimeZone, Utc};
use log::debug;
use std::collections::BTreeMap;

use crate::candle::{Candle, Timeframe};

/// Rolls `intraday` candles up into UTC daily candles. Input order does not
/// matter; each day's open comes from its earliest candle and close from its latest.
///
/// A day is kept only when its latest candle closes at the following
/// midnight, so a partially downloaded day never reports an intraday close.
pub fn aggregate_daily(candles: &[Candle], intraday: Timeframe) -> Vec<Candle> {
    let mut days: BTreeMap<NaiveDate, Vec<&Candle>> = BTreeMap::new();
    for candle in candles {
        days.entry(candle.date()).or_default().push(candle);
    }

    let width = intraday.duration();
    days.into_iter()
        .filter_map(|(date, mut bucket)| {
            bucket.sort_by_key(|c| c.timestamp);
            let first = bucket.first()?;
            let last = bucket.last()?;
            let timestamp = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
            let next_midnight = Utc.from_utc_datetime(&date.succ_opt()?.and_hms_opt(0, 0, 0)?);

            if last.timestamp + width < next_midnight {
                debug!("Skipping {}: intraday candles end at {}", date, last.timestamp + width);
                return None;
            }

            Some(Candle {
                timestamp,
                open: first.open,
                high: bucket.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max),
                low: bucket.iter().map(|c| c.low).fold(f64::INFINITY, f64::min),
                close: last.close,
                volume: bucket.iter().map(|c| c.volume).sum(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly(day: u32, hour: u32, open: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap(),
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
            volume: 2.0,
        }
    }

    #[test]
    fn test_aggregate_daily_groups_by_utc_date() {
        let candles = vec![
            hourly(2, 23, 200.0, 201.0),
            hourly(1, 23, 110.0, 120.0),
            hourly(1, 0, 100.0, 105.0),
            hourly(1, 12, 105.0, 95.0),
        ];

        let daily = aggregate_daily(&candles, Timeframe::HOURLY);

        assert_eq!(daily.len(), 1);
        let first = &daily[0];
        assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(first.open, 100.0);
        assert_eq!(first.close, 120.0);
        assert_eq!(first.high, 121.0);
        assert_eq!(first.low, 94.0);
        assert_eq!(first.volume, 6.0);
        assert_eq!(daily[1].close, 201.0);
    }

    #[test]
    fn test_partial_day_is_not_a_closed_day() {
        let mut candles: Vec<Candle> = (0..24).map(|h| hourly(1, h, 100.0, 100.0 + h as f64)).collect();
        // hourly cache written at 12:00 on the 2nd
        candles.extend((0..12).map(|h| hourly(2, h, 100.0, 100.0 + h as f64)));

        let daily = aggregate_daily(&candles, Timeframe::HOURLY);

        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(daily[0].close, 123.0);
        assert_eq!(daily[0].volume, 48.0);
    }

    #[test]
    fn test_wider_intraday_candles_close_the_day() {
        let candles: Vec<Candle> = [0, 6, 12, 18].iter().map(|&h| hourly(1, h, 100.0, 101.0)).collect();

        assert!(aggregate_daily(&candles, Timeframe::Hours(4)).is_empty());
        assert_eq!(aggregate_daily(&candles, Timeframe::Hours(6)).len(), 1);
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate_daily(&[], Timeframe::HOURLY).is_empty());
    }
}
