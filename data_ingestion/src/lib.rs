pub mod aggregate;
pub mod cache;
pub mod candle;
pub mod config;
pub mod error;
pub mod exchange;
pub mod fetcher;
pub mod logger;

pub use cache::CandleStore;
pub use candle::{Candle, Timeframe};
pub use config::AppConfig;
pub use error::DataIngestionError;
pub use exchange::Exchange;
