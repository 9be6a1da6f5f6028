pub mod artifact;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod logistic;
pub mod metrics;
pub mod pipeline;
pub mod scaler;
pub mod scheduler;
pub mod server;

pub use artifact::ModelArtifact;
pub use engine::{Forecaster, Prediction};
pub use error::ModelError;
pub use evaluation::EvaluationReport;
pub use pipeline::{PipelineOutput, run_pipeline};
