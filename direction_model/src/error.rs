use feature_processing::FeatureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model has not been fitted yet")]
    NotFitted,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Training labels contain a single class")]
    SingleClass,

    #[error("Artifact was trained on features {expected:?}, current features are {got:?}")]
    FeatureMismatch { expected: Vec<String>, got: Vec<String> },

    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Artifact encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
