use chrono::{DateTime, NaiveDate, Utc};
use csv::Writer;
use data_ingestion::Candle;
use log::debug;
use ndarray::{Array1, Array2, Axis, s};
use polars::prelude::*;
use std::fs;
use std::ops::Range;
use std::path::Path;

use crate::error::FeatureError;
use crate::features::{FEATURE_NAMES, build_feature_frame};

/// Feature row of the newest closed day, whose label is not known yet.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestRow {
    pub date: NaiveDate,
    pub features: Array1<f64>,
}

/// Chronologically ordered design matrix with next-day direction labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
    pub latest: Option<LatestRow>,
}

impl Dataset {
    /// `latest` is kept only when it is the newest candle's own day.
    pub fn from_candles(candles: &[Candle]) -> Result<Self, FeatureError> {
        let frame = build_feature_frame(candles)?;
        let mut dataset = Self::from_frame(&frame)?;

        let newest = candles.iter().map(|c| c.date()).max();
        if dataset.latest.as_ref().is_some_and(|l| Some(l.date) != newest) {
            debug!("Dropping stale latest row; newest candle is {:?}", newest);
            dataset.latest = None;
        }
        Ok(dataset)
    }

    /// Splits a feature frame into labeled rows and the trailing unlabeled row.
    /// Rows with non-finite features, and unlabeled rows before the end, are skipped.
    pub fn from_frame(frame: &DataFrame) -> Result<Self, FeatureError> {
        let timestamps = frame.column("timestamp")?.i64()?;
        let labels = frame.column("label")?.f64()?;
        let columns = FEATURE_NAMES
            .iter()
            .map(|name| frame.column(name).and_then(|s| s.f64()))
            .collect::<PolarsResult<Vec<_>>>()?;

        let height = frame.height();
        let mut dates = Vec::with_capacity(height);
        let mut flat = Vec::with_capacity(height * FEATURE_NAMES.len());
        let mut targets = Vec::with_capacity(height);
        let mut latest = None;

        for i in 0..height {
            let Some(date) = timestamps
                .get(i)
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|ts| ts.date_naive())
            else {
                continue;
            };

            let row: Option<Vec<f64>> = columns
                .iter()
                .map(|c| c.get(i).filter(|v| v.is_finite()))
                .collect();
            let Some(row) = row else {
                debug!("Skipping {}: non-finite feature", date);
                continue;
            };

            match labels.get(i) {
                Some(label) => {
                    dates.push(date);
                    flat.extend(row);
                    targets.push(label);
                }
                None if i + 1 == height => {
                    latest = Some(LatestRow {
                        date,
                        features: Array1::from_vec(row),
                    });
                }
                None => debug!("Skipping {}: next day missing", date),
            }
        }

        if dates.is_empty() {
            return Err(FeatureError::InsufficientData(format!(
                "no labeled rows out of {} feature rows",
                height
            )));
        }

        let features = Array2::from_shape_vec((dates.len(), FEATURE_NAMES.len()), flat)?;
        Ok(Self {
            feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            dates,
            features,
            labels: Array1::from_vec(targets),
            latest,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Share of `Up` labels.
    pub fn up_rate(&self) -> f64 {
        self.labels.mean().unwrap_or(0.0)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Contiguous rows `range`; the slice carries no latest row.
    pub fn slice(&self, range: Range<usize>) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            dates: self.dates[range.clone()].to_vec(),
            features: self.features.slice(s![range.clone(), ..]).to_owned(),
            labels: self.labels.slice(s![range]).to_owned(),
            latest: None,
        }
    }

    /// Writes `date,<features...>,label`; the latest row is written with an empty label.
    pub fn write_csv(&self, path: &Path) -> Result<(), FeatureError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = Writer::from_path(path)?;
        let mut header = vec!["date".to_string()];
        header.extend(self.feature_names.iter().cloned());
        header.push("label".to_string());
        writer.write_record(&header)?;

        for (i, row) in self.features.axis_iter(Axis(0)).enumerate() {
            let mut record = vec![self.dates[i].to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            record.push(self.labels[i].to_string());
            writer.write_record(&record)?;
        }

        if let Some(latest) = &self.latest {
            let mut record = vec![latest.date.to_string()];
            record.extend(latest.features.iter().map(|v| v.to_string()));
            record.push(String::new());
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}
