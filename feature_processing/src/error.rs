use chrono::NaiveDate;
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),

    #[error("Dates must be strictly ascending, {previous} is followed by {next}")]
    UnorderedDates { previous: NaiveDate, next: NaiveDate },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    #[error("Shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
