use anyhow::Result;
use axum::{
    extract::State,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use log::info;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::engine::Prediction;
use crate::evaluation::EvaluationReport;

/// Results of one pipeline run, published together.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub prediction: Option<Prediction>,
    pub report: Option<EvaluationReport>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Shared application state holding the latest pipeline results.
#[derive(Clone, Default)]
pub struct AppState {
    latest: Arc<RwLock<Snapshot>>,
}

impl AppState {
    pub fn update(&self, prediction: Option<Prediction>, report: EvaluationReport) {
        let snapshot = Snapshot {
            prediction,
            report: Some(report),
            updated_at: Some(Utc::now()),
        };
        *self.latest.write() = snapshot;
    }

    pub fn snapshot(&self) -> Snapshot {
        self.latest.read().clone()
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub updated_at: Option<DateTime<Utc>>,
}

/// GET /prediction returns the latest P(up) forecast.
pub async fn get_prediction(State(state): State<AppState>) -> Json<Option<Prediction>> {
    let latest = state.latest.read();
    Json(latest.prediction.clone())
}

/// GET /report returns the latest evaluation.
pub async fn get_report(State(state): State<AppState>) -> Json<Option<EvaluationReport>> {
    let latest = state.latest.read();
    Json(latest.report.clone())
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        updated_at: state.latest.read().updated_at,
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/prediction", get(get_prediction))
        .route("/report", get(get_report))
        .route("/health", get(health))
        .with_state(state)
}

pub struct Server {
    state: AppState,
    bind: String,
}

impl Server {
    pub fn init(state: AppState, bind: impl Into<String>) -> Self {
        Self {
            state,
            bind: bind.into(),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let app = router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(&self.bind).await?;
        info!("HTTP server running on {}", listener.local_addr()?);
        axum::serve(listener, app).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::FoldReport;
    use crate::metrics::ClassificationReport;
    use chrono::NaiveDate;
    use feature_processing::Direction;
    use ndarray::array;

    fn report() -> EvaluationReport {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let metrics = ClassificationReport::compute(&array![1.0, 0.0], &array![0.7, 0.4], 0.5);
        EvaluationReport {
            holdout: FoldReport {
                fold: 0,
                train_rows: 10,
                train_start: day(1),
                train_end: day(10),
                test_start: day(11),
                test_end: day(12),
                metrics,
            },
            walk_forward: Vec::new(),
            mean_auc: None,
            mean_accuracy: None,
        }
    }

    fn prediction() -> Prediction {
        Prediction {
            symbol: "BTC/USD".to_string(),
            as_of: NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
            target_date: NaiveDate::from_ymd_opt(2024, 1, 13).unwrap(),
            p_up: 0.56,
            direction: Direction::Up,
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_empty_state_serves_null() {
        let state = AppState::default();

        let Json(prediction) = get_prediction(State(state.clone())).await;
        assert!(prediction.is_none());

        let Json(health) = health(State(state)).await;
        assert_eq!(health.status, "ok");
        assert!(health.updated_at.is_none());
    }

    #[tokio::test]
    async fn test_update_is_visible_to_handlers() {
        let state = AppState::default();
        state.update(Some(prediction()), report());

        let Json(prediction) = get_prediction(State(state.clone())).await;
        assert_eq!(prediction.unwrap().p_up, 0.56);

        let Json(report) = get_report(State(state.clone())).await;
        assert_eq!(report.unwrap().holdout.metrics.n_samples, 2);

        let Json(health) = health(State(state)).await;
        assert!(health.updated_at.is_some());
    }

    #[test]
    fn test_readers_see_whole_updates() {
        let state = AppState::default();
        state.update(Some(prediction()), report());

        let writer = {
            let state = state.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let mut next = prediction();
                    next.p_up = 1.0 + i as f64;
                    let mut r = report();
                    r.holdout.train_rows = i;
                    state.update(Some(next), r);
                }
            })
        };

        for _ in 0..200 {
            let snapshot = state.snapshot();
            let p_up = snapshot.prediction.unwrap().p_up;
            let train_rows = snapshot.report.unwrap().holdout.train_rows;
            if p_up != 0.56 {
                assert_eq!(p_up, 1.0 + train_rows as f64);
            } else {
                assert_eq!(train_rows, 10);
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_prediction_json_shape() {
        let json = serde_json::to_value(prediction()).unwrap();
        assert_eq!(json["direction"], "Up");
        assert_eq!(json["as_of"], "2024-01-12");
        assert_eq!(json["target_date"], "2024-01-13");
    }
}
