use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;

use crate::candle::Timeframe;
use crate::error::DataIngestionError;
use crate::exchange::Exchange;

const CONFIG_PATH_VAR: &str = "PREDICTOR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "predictor.toml";
const ENV_PREFIX: &str = "PREDICTOR";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub id: Exchange,
    pub symbol: String,
    pub base_url: Option<String>,
    pub fetch_limit: Option<usize>,
    pub sleep_seconds: f64,
    pub request_timeout_seconds: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            id: Exchange::Coinbase,
            symbol: "BTC/USD".to_string(),
            base_url: None,
            fetch_limit: None,
            sleep_seconds: 0.2,
            request_timeout_seconds: 30,
        }
    }
}

impl ExchangeConfig {
    pub fn limit(&self) -> usize {
        self.fetch_limit.unwrap_or_else(|| self.id.default_limit())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.id.default_base_url())
    }
}

/// Where daily candles come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DailySource {
    /// The exchange's own 1d candles.
    #[default]
    Exchange,
    /// UTC days rebuilt from hourly candles.
    Hourly,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub years_of_history: u32,
    pub raw_data_dir: PathBuf,
    pub processed_data_dir: PathBuf,
    pub use_cache: bool,
    pub daily_source: DailySource,
    pub hourly_timeframe: String,
    pub daily_timeframe: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            years_of_history: 3,
            raw_data_dir: PathBuf::from("data/raw"),
            processed_data_dir: PathBuf::from("data/processed"),
            use_cache: true,
            daily_source: DailySource::Exchange,
            hourly_timeframe: "1h".to_string(),
            daily_timeframe: "1d".to_string(),
        }
    }
}

impl DataConfig {
    pub fn hourly(&self) -> Result<Timeframe, DataIngestionError> {
        self.hourly_timeframe.parse()
    }

    pub fn daily(&self) -> Result<Timeframe, DataIngestionError> {
        self.daily_timeframe.parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    pub l2: f64,
    /// P(up) at or above which a day is called `Up`.
    pub threshold: f64,
    pub artifact_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 5000,
            tolerance: 1e-7,
            l2: 0.01,
            threshold: 0.5,
            artifact_path: PathBuf::from("data/models/btc_direction.bin"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub test_fraction: f64,
    pub walk_forward_splits: usize,
    pub min_train_size: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            walk_forward_splits: 5,
            min_train_size: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind: String,
    pub refresh_interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "0.0.0.0:3000".to_string(),
            refresh_interval_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
    pub evaluation: EvaluationConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Loads `predictor.toml` (or the file named by `PREDICTOR_CONFIG`) and
    /// applies `PREDICTOR__SECTION__KEY` environment overrides. A `.env` file is
    /// read first when present.
    pub fn from_env() -> Result<Self, DataIngestionError> {
        let _ = dotenvy::dotenv();
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let cfg = Config::builder()
            .add_source(File::new(&path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::finish(cfg)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, DataIngestionError> {
        let cfg = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        Self::finish(cfg)
    }

    fn finish(cfg: Config) -> Result<Self, DataIngestionError> {
        let app: AppConfig = cfg.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    fn validate(&self) -> Result<(), DataIngestionError> {
        let invalid = |msg: String| -> Result<(), DataIngestionError> {
            Err(ConfigError::Message(msg).into())
        };

        if self.exchange.limit() == 0 {
            return invalid("exchange.fetch_limit must be positive".to_string());
        }
        if !(self.exchange.sleep_seconds >= 0.0) {
            return invalid("exchange.sleep_seconds cannot be negative".to_string());
        }
        if self.data.years_of_history == 0 {
            return invalid("data.years_of_history must be at least 1".to_string());
        }
        self.exchange.id.market_symbol(&self.exchange.symbol)?;
        self.data.hourly()?;
        self.data.daily()?;

        if !(self.evaluation.test_fraction > 0.0 && self.evaluation.test_fraction < 1.0) {
            return invalid(format!(
                "evaluation.test_fraction must be in (0, 1), got {}",
                self.evaluation.test_fraction
            ));
        }
        if !(self.model.threshold > 0.0 && self.model.threshold < 1.0) {
            return invalid(format!("model.threshold must be in (0, 1), got {}", self.model.threshold));
        }
        if !(self.model.learning_rate > 0.0) || self.model.max_iter == 0 {
            return invalid("model.learning_rate and model.max_iter must be positive".to_string());
        }
        if self.model.l2 < 0.0 {
            return invalid("model.l2 cannot be negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();

        assert_eq!(cfg.exchange.id, Exchange::Coinbase);
        assert_eq!(cfg.exchange.symbol, "BTC/USD");
        assert_eq!(cfg.exchange.limit(), 300);
        assert_eq!(cfg.data.years_of_history, 3);
        assert_eq!(cfg.data.daily().unwrap(), Timeframe::DAILY);
        assert_eq!(cfg.data.daily_source, DailySource::Exchange);
        assert!(!cfg.server.enabled);
    }

    #[test]
    fn test_sections_override_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [exchange]
            id = "kraken"
            sleep_seconds = 0.0

            [data]
            daily_source = "hourly"
            use_cache = false

            [evaluation]
            test_fraction = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(cfg.exchange.id, Exchange::Kraken);
        assert_eq!(cfg.exchange.limit(), 720);
        assert_eq!(cfg.exchange.base_url(), "https://api.kraken.com");
        assert_eq!(cfg.data.daily_source, DailySource::Hourly);
        assert!(!cfg.data.use_cache);
        assert_eq!(cfg.evaluation.test_fraction, 0.25);
        assert_eq!(cfg.model.threshold, 0.5);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AppConfig::from_toml_str("[evaluation]\ntest_fraction = 1.5").is_err());
        assert!(AppConfig::from_toml_str("[exchange]\nid = \"bitstamp\"").is_err());
        assert!(AppConfig::from_toml_str("[exchange]\nfetch_limit = 0").is_err());
        assert!(AppConfig::from_toml_str("[data]\ndaily_timeframe = \"1w\"").is_err());
        assert!(AppConfig::from_toml_str("[exchange]\nsymbol = \"BTCUSD\"").is_err());
    }
}
