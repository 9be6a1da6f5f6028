use config;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataIngestionError {
    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Exchange responded with HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("JSON deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("{exchange} does not serve {timeframe} candles")]
    UnsupportedTimeframe { exchange: String, timeframe: String },

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("Invalid symbol {0}, expected BASE/QUOTE")]
    InvalidSymbol(String),

    #[error("Malformed exchange response: {0}")]
    MalformedResponse(String),

    #[error("Exchange returned an error: {0}")]
    ExchangeError(String),
}
