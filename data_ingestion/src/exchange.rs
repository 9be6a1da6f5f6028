use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::candle::{Candle, Timeframe};
use crate::error::DataIngestionError;

const COINBASE_GRANULARITIES: [i64; 6] = [60, 300, 900, 3600, 21600, 86400];
const KRAKEN_INTERVALS: [i64; 9] = [1, 5, 15, 30, 60, 240, 1440, 10080, 21600];
const BINANCE_INTERVALS: [&str; 8] = ["1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d"];

/// Public OHLCV venues. None of them need API keys for candle history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Coinbase,
    Kraken,
    Binance,
}

/// A single REST call: path relative to the base URL plus query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleRequest {
    pub path: String,
    pub query: Vec<(&'static str, String)>,
}

impl Exchange {
    pub fn id(&self) -> &'static str {
        match self {
            Exchange::Coinbase => "coinbase",
            Exchange::Kraken => "kraken",
            Exchange::Binance => "binance",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Exchange::Coinbase => "https://api.exchange.coinbase.com",
            Exchange::Kraken => "https://api.kraken.com",
            Exchange::Binance => "https://api.binance.com",
        }
    }

    /// Largest page the venue returns for one OHLCV request.
    pub fn default_limit(&self) -> usize {
        match self {
            Exchange::Coinbase => 300,
            Exchange::Kraken => 720,
            Exchange::Binance => 1000,
        }
    }

    /// Maps a unified `BASE/QUOTE` symbol onto the venue's market id.
    pub fn market_symbol(&self, symbol: &str) -> Result<String, DataIngestionError> {
        let (base, quote) = symbol
            .split_once('/')
            .filter(|(b, q)| !b.is_empty() && !q.is_empty())
            .ok_or_else(|| DataIngestionError::InvalidSymbol(symbol.to_string()))?;
        let base = base.trim().to_uppercase();
        let quote = quote.trim().to_uppercase();

        let market = match self {
            Exchange::Coinbase => format!("{}-{}", base, quote),
            Exchange::Kraken => {
                let base = if base == "BTC" { "XBT".to_string() } else { base };
                format!("{}{}", base, quote)
            }
            Exchange::Binance => {
                let quote = if quote == "USD" { "USDT".to_string() } else { quote };
                format!("{}{}", base, quote)
            }
        };
        Ok(market)
    }

    /// Venue-specific spelling of the candle width.
    pub fn interval(&self, timeframe: Timeframe) -> Result<String, DataIngestionError> {
        let seconds = timeframe.duration().num_seconds();
        let interval = match self {
            Exchange::Coinbase => COINBASE_GRANULARITIES
                .contains(&seconds)
                .then(|| seconds.to_string()),
            Exchange::Kraken => KRAKEN_INTERVALS
                .contains(&(seconds / 60))
                .then(|| (seconds / 60).to_string()),
            Exchange::Binance => {
                let name = timeframe.to_string();
                BINANCE_INTERVALS.contains(&name.as_str()).then_some(name)
            }
        };

        interval.ok_or_else(|| DataIngestionError::UnsupportedTimeframe {
            exchange: self.to_string(),
            timeframe: timeframe.to_string(),
        })
    }

    pub fn candle_request(
        &self,
        market: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<CandleRequest, DataIngestionError> {
        let interval = self.interval(timeframe)?;
        let request = match self {
            Exchange::Coinbase => {
                // start and end are both inclusive
                let end = since + timeframe.duration() * (limit.max(1) as i32 - 1);
                CandleRequest {
                    path: format!("/products/{}/candles", market),
                    query: vec![
                        ("granularity", interval),
                        ("start", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
                        ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ],
                }
            }
            Exchange::Kraken => CandleRequest {
                path: "/0/public/OHLC".to_string(),
                query: vec![
                    ("pair", market.to_string()),
                    ("interval", interval),
                    ("since", since.timestamp().to_string()),
                ],
            },
            Exchange::Binance => CandleRequest {
                path: "/api/v3/klines".to_string(),
                query: vec![
                    ("symbol", market.to_string()),
                    ("interval", interval),
                    ("startTime", since.timestamp_millis().to_string()),
                    ("limit", limit.to_string()),
                ],
            },
        };
        Ok(request)
    }

    /// Decodes one response body into candles sorted ascending by time.
    /// Rows that cannot be read are skipped with a warning.
    pub fn parse_batch(&self, body: &Value) -> Result<Vec<Candle>, DataIngestionError> {
        let rows = match self {
            Exchange::Coinbase => coinbase_rows(body)?,
            Exchange::Kraken => kraken_rows(body)?,
            Exchange::Binance => binance_rows(body)?,
        };

        let mut candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| {
                let candle = self.parse_row(row);
                if candle.is_none() {
                    warn!("Skipping unreadable {} row: {}", self, row);
                }
                candle
            })
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    fn parse_row(&self, row: &Value) -> Option<Candle> {
        let row = row.as_array()?;
        let field = |i: usize| row.get(i).and_then(number);

        match self {
            // [time, low, high, open, close, volume]
            Exchange::Coinbase => Some(Candle {
                timestamp: from_seconds(field(0)?)?,
                low: field(1)?,
                high: field(2)?,
                open: field(3)?,
                close: field(4)?,
                volume: field(5)?,
            }),
            // [time, open, high, low, close, vwap, volume, count]
            Exchange::Kraken => Some(Candle {
                timestamp: from_seconds(field(0)?)?,
                open: field(1)?,
                high: field(2)?,
                low: field(3)?,
                close: field(4)?,
                volume: field(6)?,
            }),
            // [open time ms, open, high, low, close, volume, close time, ...]
            Exchange::Binance => Some(Candle {
                timestamp: Utc.timestamp_millis_opt(field(0)? as i64).single()?,
                open: field(1)?,
                high: field(2)?,
                low: field(3)?,
                close: field(4)?,
                volume: field(5)?,
            }),
        }
    }
}

impl FromStr for Exchange {
    type Err = DataIngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coinbase" => Ok(Exchange::Coinbase),
            "kraken" => Ok(Exchange::Kraken),
            "binance" => Ok(Exchange::Binance),
            other => Err(DataIngestionError::UnknownExchange(other.to_string())),
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn from_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds as i64, 0).single()
}

fn coinbase_rows(body: &Value) -> Result<&Vec<Value>, DataIngestionError> {
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        return Err(DataIngestionError::ExchangeError(message.to_string()));
    }
    body.as_array()
        .ok_or_else(|| DataIngestionError::MalformedResponse("expected an array of candles".to_string()))
}

fn kraken_rows(body: &Value) -> Result<&Vec<Value>, DataIngestionError> {
    let errors: Vec<&str> = body
        .get("error")
        .and_then(Value::as_array)
        .map(|errs| errs.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !errors.is_empty() {
        return Err(DataIngestionError::ExchangeError(errors.join(", ")));
    }

    // result holds one array keyed by Kraken's own pair name, next to "last"
    body.get("result")
        .and_then(Value::as_object)
        .and_then(|result| {
            result
                .iter()
                .filter(|(key, _)| key.as_str() != "last")
                .find_map(|(_, value)| value.as_array())
        })
        .ok_or_else(|| DataIngestionError::MalformedResponse("missing OHLC result".to_string()))
}

fn binance_rows(body: &Value) -> Result<&Vec<Value>, DataIngestionError> {
    if let Some(message) = body.get("msg").and_then(Value::as_str) {
        return Err(DataIngestionError::ExchangeError(message.to_string()));
    }
    body.as_array()
        .ok_or_else(|| DataIngestionError::MalformedResponse("expected an array of klines".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_market_symbols() {
        assert_eq!(Exchange::Coinbase.market_symbol("BTC/USD").unwrap(), "BTC-USD");
        assert_eq!(Exchange::Kraken.market_symbol("btc/usd").unwrap(), "XBTUSD");
        assert_eq!(Exchange::Binance.market_symbol("BTC/USD").unwrap(), "BTCUSDT");
        assert!(Exchange::Binance.market_symbol("BTCUSD").is_err());
    }

    #[test]
    fn test_intervals() {
        assert_eq!(Exchange::Coinbase.interval(Timeframe::DAILY).unwrap(), "86400");
        assert_eq!(Exchange::Kraken.interval(Timeframe::HOURLY).unwrap(), "60");
        assert_eq!(Exchange::Binance.interval(Timeframe::DAILY).unwrap(), "1d");
        assert!(Exchange::Coinbase.interval(Timeframe::Hours(4)).is_err());
        assert!(Exchange::Kraken.interval(Timeframe::Days(3)).is_err());
    }

    #[test]
    fn test_parse_exchange_id() {
        assert_eq!("Kraken".parse::<Exchange>().unwrap(), Exchange::Kraken);
        assert!("bitstamp".parse::<Exchange>().is_err());
    }

    #[test]
    fn test_coinbase_request_window_holds_limit_candles() {
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = Exchange::Coinbase
            .candle_request("BTC-USD", Timeframe::DAILY, since, 300)
            .unwrap();

        assert_eq!(request.path, "/products/BTC-USD/candles");
        assert!(request.query.contains(&("start", "2024-01-01T00:00:00Z".to_string())));
        assert!(request.query.contains(&("end", "2024-10-26T00:00:00Z".to_string())));
    }

    #[test]
    fn test_parse_coinbase_batch_is_ascending() {
        // newest first, [time, low, high, open, close, volume]
        let body = json!([
            [1704153600, 41000.0, 43000.0, 42000.0, 42500.0, 12.5],
            [1704067200, 40000.0, 42500.0, 41000.0, 42000.0, 10.0]
        ]);
        let candles = Exchange::Coinbase.parse_batch(&body).unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 42000.0);
        assert_eq!(candles[0].low, 40000.0);
        assert_eq!(candles[1].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_kraken_batch() {
        let body = json!({
            "error": [],
            "result": {
                "XXBTZUSD": [
                    [1704067200, "42000.0", "42500.0", "41000.0", "42200.0", "42100.0", "150.5", 1000]
                ],
                "last": 1704067200
            }
        });
        let candles = Exchange::Kraken.parse_batch(&body).unwrap();

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open, 42000.0);
        assert_eq!(candles[0].volume, 150.5);
    }

    #[test]
    fn test_kraken_error_array_is_an_error() {
        let body = json!({ "error": ["EQuery:Unknown asset pair"] });
        let err = Exchange::Kraken.parse_batch(&body).unwrap_err();
        assert!(matches!(err, DataIngestionError::ExchangeError(msg) if msg.contains("Unknown asset pair")));
    }

    #[test]
    fn test_parse_binance_batch_skips_bad_rows() {
        let body = json!([
            [1704067200000u64, "42000.0", "42500.0", "41000.0", "42200.0", "150.5", 1704153599999u64],
            [1704153600000u64, "not-a-number", "1", "1", "1", "1", 1704239999999u64],
            ["short"]
        ]);
        let candles = Exchange::Binance.parse_batch(&body).unwrap();

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(candles[0].close, 42200.0);
    }
}
