use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use reqwest::Client;
use serde_json::Value;
use tokio::time::sleep;

use crate::candle::{Candle, Timeframe, normalize_candles};
use crate::config::ExchangeConfig;
use crate::error::DataIngestionError;
use crate::exchange::Exchange;

const USER_AGENT: &str = concat!("btc-direction/", env!("CARGO_PKG_VERSION"));

/// Paginating OHLCV client for one exchange market.
pub struct CandleFetcher {
    client: Client,
    exchange: Exchange,
    base_url: String,
    symbol: String,
    market: String,
    limit: usize,
    pause: std::time::Duration,
    years_of_history: u32,
}

impl CandleFetcher {
    pub fn new(config: &ExchangeConfig, years_of_history: u32) -> Result<Self, DataIngestionError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            exchange: config.id,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            symbol: config.symbol.clone(),
            market: config.id.market_symbol(&config.symbol)?,
            limit: config.limit(),
            pause: std::time::Duration::from_secs_f64(config.sleep_seconds.max(0.0)),
            years_of_history,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// One page of candles starting at `since`, ascending.
    pub async fn fetch_batch(
        &self,
        timeframe: Timeframe,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>, DataIngestionError> {
        let request = self
            .exchange
            .candle_request(&self.market, timeframe, since, limit)?;
        let url = format!("{}{}", self.base_url, request.path);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(&request.query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataIngestionError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response.json().await?;
        self.exchange.parse_batch(&json)
    }

    /// Walks forward from `years_of_history` before `now` until the newest
    /// candle is within the timeframe's near-now window.
    pub async fn fetch_full(
        &self,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataIngestionError> {
        let mut since = now - Duration::days(365 * self.years_of_history as i64);
        let near_now = timeframe.near_now_delta();
        let mut all_rows: Vec<Candle> = Vec::new();

        info!(
            "Fetching {} {} candles from {} since {} (limit {})",
            self.symbol, timeframe, self.exchange, since, self.limit
        );

        loop {
            let batch = self.fetch_batch(timeframe, since, self.limit).await?;
            let (first, last) = match (batch.first(), batch.last()) {
                (Some(first), Some(last)) => (first.timestamp, last.timestamp),
                _ => {
                    debug!("No rows returned; stopping");
                    break;
                }
            };
            debug!("Fetched {} rows: {} -> {}", batch.len(), first, last);
            all_rows.extend(batch);

            let next_since = last + Duration::milliseconds(1);
            if next_since <= since {
                debug!("Stopping because the last candle timestamp did not advance");
                break;
            }

            if last >= now - near_now {
                debug!("Stopping near now: last candle {}, now {}", last, now);
                break;
            }

            since = next_since;
            sleep(self.pause).await;
        }

        let candles = normalize_candles(all_rows);
        info!("Fetched {} {} candles for {}", candles.len(), timeframe, self.symbol);
        Ok(candles)
    }
}
