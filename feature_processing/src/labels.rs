use chrono::NaiveDate;
use data_ingestion::Candle;
use serde::{Deserialize, Serialize};

use crate::error::FeatureError;

/// Next-day move of the close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Down = 0,
    Up = 1,
}

impl Direction {
    pub fn as_f64(self) -> f64 {
        self as u8 as f64
    }

    pub fn from_probability(p_up: f64, threshold: f64) -> Self {
        if p_up >= threshold { Direction::Up } else { Direction::Down }
    }
}

/// `Up` only when the next close is strictly higher; an unchanged close is `Down`.
pub fn direction_label(close: f64, next_close: f64) -> Direction {
    if next_close > close { Direction::Up } else { Direction::Down }
}

/// Labels each daily close against the close of the following calendar day.
///
/// A date gets `None` when the next calendar day is not the next record, which
/// always includes the final date of the series.
pub fn label_daily_closes(closes: &[(NaiveDate, f64)]) -> Result<Vec<Option<Direction>>, FeatureError> {
    if let Some(pair) = closes.windows(2).find(|w| w[0].0 >= w[1].0) {
        return Err(FeatureError::UnorderedDates {
            previous: pair[0].0,
            next: pair[1].0,
        });
    }

    let labels = closes
        .iter()
        .enumerate()
        .map(|(i, &(date, close))| {
            closes
                .get(i + 1)
                .filter(|(next_date, _)| date.succ_opt() == Some(*next_date))
                .map(|&(_, next_close)| direction_label(close, next_close))
        })
        .collect();
    Ok(labels)
}

pub fn label_candles(candles: &[Candle]) -> Result<Vec<Option<Direction>>, FeatureError> {
    let closes: Vec<(NaiveDate, f64)> = candles.iter().map(|c| (c.date(), c.close)).collect();
    label_daily_closes(&closes)
}
